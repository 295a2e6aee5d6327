use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use wirecore::{NodeStatus, PortValues, Value};

/// Status of a run, live or terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

struct ContextState {
    node_outputs: HashMap<String, PortValues>,
    variables: HashMap<String, Value>,
    node_status: HashMap<String, NodeStatus>,
    status: RunStatus,
}

/// Per-run state: node outputs, variables, statuses, timing.
///
/// Created fresh for each run and dropped when the run settles. The
/// handle is cheap to clone; clones share state, and concurrent node
/// invocations write disjoint output keys. Workflows themselves are
/// never mutated by a run; per-node status lives here.
#[derive(Clone)]
pub struct ExecutionContext {
    workflow_id: String,
    started_at: DateTime<Utc>,
    span: tracing::Span,
    state: Arc<RwLock<ContextState>>,
}

impl ExecutionContext {
    pub fn new(workflow_id: impl Into<String>, variables: HashMap<String, Value>) -> Self {
        let workflow_id = workflow_id.into();
        let span = tracing::info_span!("workflow_run", workflow_id = %workflow_id);
        Self {
            workflow_id,
            started_at: Utc::now(),
            span,
            state: Arc::new(RwLock::new(ContextState {
                node_outputs: HashMap::new(),
                variables,
                node_status: HashMap::new(),
                status: RunStatus::Running,
            })),
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Span covering this run; node logging happens inside it
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub async fn status(&self) -> RunStatus {
        self.state.read().await.status
    }

    pub async fn set_status(&self, status: RunStatus) {
        self.state.write().await.status = status;
    }

    pub async fn variable(&self, key: &str) -> Option<Value> {
        self.state.read().await.variables.get(key).cloned()
    }

    pub async fn set_variable(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.state.write().await.variables.insert(key.into(), value.into());
    }

    /// Outputs recorded for a node, if it has completed
    pub async fn node_outputs(&self, node_id: &str) -> Option<PortValues> {
        self.state.read().await.node_outputs.get(node_id).cloned()
    }

    pub async fn record_outputs(&self, node_id: impl Into<String>, outputs: PortValues) {
        self.state.write().await.node_outputs.insert(node_id.into(), outputs);
    }

    pub async fn node_status(&self, node_id: &str) -> NodeStatus {
        self.state
            .read()
            .await
            .node_status
            .get(node_id)
            .copied()
            .unwrap_or_default()
    }

    pub async fn set_node_status(&self, node_id: impl Into<String>, status: NodeStatus) {
        self.state.write().await.node_status.insert(node_id.into(), status);
    }

    /// Everything recorded so far. Tolerates partial state, e.g. for a
    /// post-mortem of a failed run.
    pub async fn outputs_snapshot(&self) -> HashMap<String, PortValues> {
        self.state.read().await.node_outputs.clone()
    }
}
