//! Core abstractions for the wireflow engine.
//!
//! This crate provides the data model (nodes, ports, connections,
//! workflows), the validation layer, and the two event subsystems the
//! runtime builds on: the event bus and the event propagator.

mod error;
pub mod events;
mod node;
mod validation;
mod value;
mod workflow;

pub use error::{GraphError, NodeError, PropagateError};
pub use events::{
    Event, EventBus, EventPropagator, FilterId, PropagateOptions, SubscribeOptions, Subscription,
    SubscriberError,
};
pub use node::{Node, NodeStatus, Port, PortDirection};
pub use validation::{
    NodeValidation, RuleViolation, ValidationRule, Validator, WorkflowValidation,
};
pub use value::{PortValues, Value};
pub use workflow::{Connection, Workflow};
