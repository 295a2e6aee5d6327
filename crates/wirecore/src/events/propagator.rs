//! Routes events from a node along its outgoing connections.
//!
//! Propagation is distinct from data flow: a node chooses to emit a
//! message, and the propagator publishes it on the bus under the
//! per-node address `node:<targetId>:<eventType>` for every admitted
//! edge, optionally chaining onward from each target.

use crate::events::{names, EventBus};
use crate::{PropagateError, Value, Workflow};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Handle for a registered propagation filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterId(Uuid);

type Filter = Arc<dyn Fn(&str, &Value) -> bool + Send + Sync>;
type Transform = Arc<dyn Fn(Value, &str, &str) -> Value + Send + Sync>;

/// Per-call propagation settings
#[derive(Clone, Default)]
pub struct PropagateOptions {
    /// Recurse from each reached target along its own outgoing edges
    pub propagate_chain: bool,
    /// Rewrite the payload per edge: `(payload, source, target) -> payload`
    pub transform: Option<Transform>,
}

impl PropagateOptions {
    pub fn chained() -> Self {
        Self { propagate_chain: true, transform: None }
    }

    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value, &str, &str) -> Value + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }
}

/// Routes events along workflow edges with filterable, transformable
/// payloads and cycle-safe traversal.
pub struct EventPropagator {
    bus: EventBus,
    workflows: RwLock<HashMap<String, Workflow>>,
    filters: RwLock<Vec<(FilterId, Filter)>>,
}

impl EventPropagator {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            workflows: RwLock::new(HashMap::new()),
            filters: RwLock::new(Vec::new()),
        }
    }

    pub async fn register_workflow(&self, workflow: Workflow) {
        let mut workflows = self.workflows.write().await;
        workflows.insert(workflow.id.clone(), workflow);
    }

    pub async fn unregister_workflow(&self, workflow_id: &str) -> bool {
        let mut workflows = self.workflows.write().await;
        workflows.remove(workflow_id).is_some()
    }

    pub async fn has_workflow(&self, workflow_id: &str) -> bool {
        let workflows = self.workflows.read().await;
        workflows.contains_key(workflow_id)
    }

    /// Add a predicate over `(event_type, payload)`. All filters must
    /// admit an edge's payload for it to be published.
    pub async fn add_event_filter<F>(&self, filter: F) -> FilterId
    where
        F: Fn(&str, &Value) -> bool + Send + Sync + 'static,
    {
        let id = FilterId(Uuid::new_v4());
        let mut filters = self.filters.write().await;
        filters.push((id, Arc::new(filter)));
        id
    }

    pub async fn remove_event_filter(&self, id: FilterId) -> bool {
        let mut filters = self.filters.write().await;
        let before = filters.len();
        filters.retain(|(fid, _)| *fid != id);
        filters.len() != before
    }

    pub async fn clear_event_filters(&self) {
        let mut filters = self.filters.write().await;
        filters.clear();
    }

    /// Propagate an event from `source_node_id` along outgoing
    /// connections. Returns the number of publishes performed.
    ///
    /// With chaining, a per-call visited set guarantees each node
    /// receives the event at most once, so propagation terminates on
    /// cyclic graphs.
    pub async fn propagate_event(
        &self,
        workflow_id: &str,
        source_node_id: &str,
        event_type: &str,
        payload: Value,
        options: PropagateOptions,
    ) -> Result<usize, PropagateError> {
        let workflow = {
            let workflows = self.workflows.read().await;
            workflows
                .get(workflow_id)
                .cloned()
                .ok_or_else(|| PropagateError::WorkflowNotFound(workflow_id.to_string()))?
        };
        let filters: Vec<(FilterId, Filter)> = self.filters.read().await.clone();

        let mut visited = HashSet::new();
        visited.insert(source_node_id.to_string());

        let published = self
            .propagate_from(&workflow, source_node_id, event_type, payload, &options, &filters, &mut visited)
            .await;
        Ok(published)
    }

    /// Depth-first hop from one source node. Boxed for async recursion.
    #[allow(clippy::too_many_arguments)]
    fn propagate_from<'a>(
        &'a self,
        workflow: &'a Workflow,
        source: &'a str,
        event_type: &'a str,
        payload: Value,
        options: &'a PropagateOptions,
        filters: &'a [(FilterId, Filter)],
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, usize> {
        async move {
            let mut published = 0;
            let targets: Vec<String> = workflow
                .outgoing(source)
                .map(|c| c.target_node.clone())
                .collect();

            for target in targets {
                if visited.contains(&target) {
                    continue;
                }

                let mut edge_payload = payload.clone();
                if let Value::Object(ref mut fields) = edge_payload {
                    fields.insert("sourceNodeId".to_string(), Value::from(source));
                }
                if let Some(transform) = &options.transform {
                    edge_payload = transform(edge_payload, source, &target);
                }

                if !filters.iter().all(|(_, f)| f(event_type, &edge_payload)) {
                    continue;
                }

                self.bus
                    .publish(names::node_address(&target, event_type), edge_payload.clone())
                    .await;
                visited.insert(target.clone());
                published += 1;

                if options.propagate_chain {
                    published += self
                        .propagate_from(workflow, &target, event_type, edge_payload, options, filters, visited)
                        .await;
                }
            }
            published
        }
        .boxed()
    }
}
