//! Single-node execution: the per-type registry and the interceptor
//! pipeline wrapped around each executor.
//!
//! A node type is a string key. Each registered type carries one
//! executor plus four ordered interceptor chains (input transforms,
//! input validators, output validators, output transforms) — the seam
//! through which all node behavior is installed.

use crate::ExecutionContext;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::{Future, FutureExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use wirecore::events::names;
use wirecore::{EventBus, Node, NodeError, PortValues, Value};

/// Executor slot: the node's computation. Receives the node itself
/// (id, config, ports), the gathered inputs, and the run context.
pub type ExecutorFn = Arc<
    dyn Fn(Node, PortValues, ExecutionContext) -> BoxFuture<'static, Result<PortValues, NodeError>>
        + Send
        + Sync,
>;

/// Rewrites a value map before validation (inputs) or after it (outputs)
pub type TransformFn =
    Arc<dyn Fn(PortValues, &Node, &ExecutionContext) -> Result<PortValues, NodeError> + Send + Sync>;

/// Accepts or rejects a value map; `false` fails the node
pub type ValidatorFn = Arc<dyn Fn(&PortValues, &Node, &ExecutionContext) -> bool + Send + Sync>;

/// Trait-object counterpart to closure registration, for node
/// implementations that carry state (clients, handles)
#[async_trait]
pub trait NodeBehavior: Send + Sync {
    /// Registry key, e.g. "http.request"
    fn node_type(&self) -> &str;

    async fn execute(
        &self,
        node: &Node,
        inputs: PortValues,
        ctx: &ExecutionContext,
    ) -> Result<PortValues, NodeError>;
}

#[derive(Clone, Default)]
struct TypeEntry {
    executor: Option<ExecutorFn>,
    input_transforms: Vec<TransformFn>,
    input_validators: Vec<ValidatorFn>,
    output_validators: Vec<ValidatorFn>,
    output_transforms: Vec<TransformFn>,
}

/// Executes single nodes end-to-end, emitting lifecycle events.
///
/// Owns the per-type registry. Stateless across calls: all run state
/// lives in the [`ExecutionContext`].
pub struct NodeExecutor {
    registry: RwLock<HashMap<String, TypeEntry>>,
    bus: EventBus,
}

impl NodeExecutor {
    pub fn new(bus: EventBus) -> Self {
        Self { registry: RwLock::new(HashMap::new()), bus }
    }

    /// Register the executor for a node type. Registering the same type
    /// twice replaces the prior executor (last-wins); interceptor chains
    /// are kept.
    pub async fn register_executor<F, Fut>(&self, node_type: impl Into<String>, executor: F)
    where
        F: Fn(Node, PortValues, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<PortValues, NodeError>> + Send + 'static,
    {
        let node_type = node_type.into();
        tracing::debug!(%node_type, "registering node executor");
        let mut registry = self.registry.write().await;
        registry.entry(node_type).or_default().executor =
            Some(Arc::new(move |node, inputs, ctx| executor(node, inputs, ctx).boxed()));
    }

    /// Register a stateful node implementation under its own type key
    pub async fn register_behavior(&self, behavior: Arc<dyn NodeBehavior>) {
        let node_type = behavior.node_type().to_string();
        self.register_executor(node_type, move |node, inputs, ctx| {
            let behavior = behavior.clone();
            async move { behavior.execute(&node, inputs, &ctx).await }
        })
        .await;
    }

    pub async fn register_input_transform<F>(&self, node_type: impl Into<String>, transform: F)
    where
        F: Fn(PortValues, &Node, &ExecutionContext) -> Result<PortValues, NodeError>
            + Send
            + Sync
            + 'static,
    {
        let mut registry = self.registry.write().await;
        registry
            .entry(node_type.into())
            .or_default()
            .input_transforms
            .push(Arc::new(transform));
    }

    pub async fn register_input_validator<F>(&self, node_type: impl Into<String>, validator: F)
    where
        F: Fn(&PortValues, &Node, &ExecutionContext) -> bool + Send + Sync + 'static,
    {
        let mut registry = self.registry.write().await;
        registry
            .entry(node_type.into())
            .or_default()
            .input_validators
            .push(Arc::new(validator));
    }

    pub async fn register_output_validator<F>(&self, node_type: impl Into<String>, validator: F)
    where
        F: Fn(&PortValues, &Node, &ExecutionContext) -> bool + Send + Sync + 'static,
    {
        let mut registry = self.registry.write().await;
        registry
            .entry(node_type.into())
            .or_default()
            .output_validators
            .push(Arc::new(validator));
    }

    pub async fn register_output_transform<F>(&self, node_type: impl Into<String>, transform: F)
    where
        F: Fn(PortValues, &Node, &ExecutionContext) -> Result<PortValues, NodeError>
            + Send
            + Sync
            + 'static,
    {
        let mut registry = self.registry.write().await;
        registry
            .entry(node_type.into())
            .or_default()
            .output_transforms
            .push(Arc::new(transform));
    }

    pub async fn has_executor(&self, node_type: &str) -> bool {
        let registry = self.registry.read().await;
        registry.get(node_type).map(|e| e.executor.is_some()).unwrap_or(false)
    }

    pub async fn registered_types(&self) -> Vec<String> {
        let registry = self.registry.read().await;
        let mut types: Vec<String> = registry
            .iter()
            .filter(|(_, entry)| entry.executor.is_some())
            .map(|(node_type, _)| node_type.clone())
            .collect();
        types.sort();
        types
    }

    /// Execute one node end-to-end: transforms, validation, executor,
    /// output validation, output transforms, with lifecycle events on
    /// the bus. Missing registration fails before any event is emitted.
    pub async fn execute_node(
        &self,
        node: &Node,
        inputs: PortValues,
        ctx: &ExecutionContext,
    ) -> Result<PortValues, NodeError> {
        let entry = {
            let registry = self.registry.read().await;
            registry.get(&node.node_type).cloned()
        };
        let entry = match entry {
            Some(entry) if entry.executor.is_some() => entry,
            _ => return Err(NodeError::NoExecutor(node.node_type.clone())),
        };

        self.bus
            .publish(
                names::NODE_EXECUTION_STARTED,
                Value::object([
                    ("nodeId", Value::from(node.id.as_str())),
                    ("nodeType", Value::from(node.node_type.as_str())),
                    ("inputs", Value::Object(inputs.clone())),
                ]),
            )
            .await;

        match run_pipeline(&entry, node, inputs, ctx).await {
            Ok(outputs) => {
                self.bus
                    .publish(
                        names::NODE_EXECUTION_COMPLETED,
                        Value::object([
                            ("nodeId", Value::from(node.id.as_str())),
                            ("nodeType", Value::from(node.node_type.as_str())),
                            ("outputs", Value::Object(outputs.clone())),
                        ]),
                    )
                    .await;
                Ok(outputs)
            }
            Err(error) => {
                tracing::error!(node_id = %node.id, %error, "node execution failed");
                self.bus
                    .publish(
                        names::NODE_EXECUTION_FAILED,
                        Value::object([
                            ("nodeId", Value::from(node.id.as_str())),
                            ("nodeType", Value::from(node.node_type.as_str())),
                            ("error", Value::from(error.to_string())),
                        ]),
                    )
                    .await;
                Err(error)
            }
        }
    }
}

async fn run_pipeline(
    entry: &TypeEntry,
    node: &Node,
    inputs: PortValues,
    ctx: &ExecutionContext,
) -> Result<PortValues, NodeError> {
    let mut inputs = inputs;
    for transform in &entry.input_transforms {
        inputs = transform(inputs, node, ctx)?;
    }
    for (index, validator) in entry.input_validators.iter().enumerate() {
        if !validator(&inputs, node, ctx) {
            return Err(NodeError::InputValidation { node_id: node.id.clone(), index });
        }
    }

    let executor = entry
        .executor
        .clone()
        .ok_or_else(|| NodeError::NoExecutor(node.node_type.clone()))?;
    let mut outputs = executor(node.clone(), inputs, ctx.clone()).await?;

    for (index, validator) in entry.output_validators.iter().enumerate() {
        if !validator(&outputs, node, ctx) {
            return Err(NodeError::OutputValidation { node_id: node.id.clone(), index });
        }
    }
    for transform in &entry.output_transforms {
        outputs = transform(outputs, node, ctx)?;
    }
    Ok(outputs)
}
