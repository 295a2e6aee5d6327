mod bus;
mod propagator;

pub use bus::{Event, EventBus, SubscribeOptions, Subscription, SubscriberError};
pub use propagator::{EventPropagator, FilterId, PropagateOptions};

/// Stable event-name catalog.
///
/// These are wire-stable string identifiers consumed by observers; the
/// engine and node executor publish under them.
pub mod names {
    pub const WORKFLOW_STARTED: &str = "workflow:started";
    pub const WORKFLOW_COMPLETED: &str = "workflow:completed";
    pub const WORKFLOW_FAILED: &str = "workflow:failed";
    pub const WORKFLOW_PAUSED: &str = "workflow:paused";
    pub const WORKFLOW_RESUMED: &str = "workflow:resumed";

    pub const NODE_EXECUTION_STARTED: &str = "node:execution:started";
    pub const NODE_EXECUTION_COMPLETED: &str = "node:execution:completed";
    pub const NODE_EXECUTION_FAILED: &str = "node:execution:failed";

    pub const DATA_FLOW_STARTED: &str = "data:flow:started";
    pub const DATA_FLOW_COMPLETED: &str = "data:flow:completed";
    pub const DATA_FLOW_FAILED: &str = "data:flow:failed";

    pub const SYSTEM_ERROR: &str = "system:error";
    pub const SYSTEM_WARNING: &str = "system:warning";
    pub const SYSTEM_INFO: &str = "system:info";

    /// Address an event to a specific node: `node:<nodeId>:<eventType>`
    pub fn node_address(node_id: &str, event_type: &str) -> String {
        format!("node:{node_id}:{event_type}")
    }
}
