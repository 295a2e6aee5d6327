//! Workflow engine: validates a graph, derives its execution order,
//! drives nodes under sequential or parallel regimes, threads data
//! across connections, and exposes pause / resume / cancel / timeout
//! controls.

use crate::{execution_order, level_partition, ExecutionContext, NodeExecutor, RunStatus};
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use wirecore::events::names;
use wirecore::{EventBus, GraphError, Node, NodeError, NodeStatus, PortValues, Value, Workflow};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("node '{node_id}' failed: {source}")]
    NodeFailed {
        node_id: String,
        #[source]
        source: NodeError,
    },

    #[error("workflow '{0}' was cancelled")]
    Cancelled(String),

    #[error("workflow '{0}' timed out after {1:?}")]
    Timeout(String, Duration),

    #[error("workflow '{0}' already has an active run")]
    AlreadyRunning(String),

    #[error("no active run for workflow '{0}'")]
    NotRunning(String),

    #[error("workflow '{workflow_id}' is {actual:?}, expected {expected:?}")]
    InvalidTransition {
        workflow_id: String,
        expected: RunStatus,
        actual: RunStatus,
    },
}

#[derive(Debug, Clone, Copy)]
enum StopReason {
    Cancelled,
    Timeout(Duration),
}

/// Per-run bookkeeping, owned by the engine and keyed by workflow id.
/// Inserted at run start, removed when the run settles.
struct RunHandle {
    context: ExecutionContext,
    cancel: CancellationToken,
    pause: watch::Sender<bool>,
    stop_reason: Arc<Mutex<Option<StopReason>>>,
}

/// Options for a single run
#[derive(Clone, Default)]
pub struct ExecuteOptions {
    /// Seed inputs merged into every entry node's gathered inputs
    pub inputs: PortValues,
    /// Zero means no timeout
    pub timeout: Duration,
    /// Execute level cohorts concurrently instead of one node at a time
    pub parallel: bool,
    /// Initial run variables
    pub variables: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct RunStats {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub nodes_executed: usize,
}

#[derive(Clone, Debug)]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub status: RunStatus,
    /// Outputs of each exit node
    pub outputs: HashMap<String, PortValues>,
    pub stats: RunStats,
}

/// Coordinates workflow runs over a [`NodeExecutor`] and an [`EventBus`].
///
/// Pause genuinely gates the scheduler: a paused run starts no further
/// nodes (sequential steps and level transitions wait on the pause gate)
/// until resumed or cancelled. Cancellation is level-bounded — nodes
/// already started run to completion, nothing further begins.
pub struct WorkflowEngine {
    executor: Arc<NodeExecutor>,
    bus: EventBus,
    runs: RwLock<HashMap<String, RunHandle>>,
}

impl WorkflowEngine {
    pub fn new(bus: EventBus) -> Self {
        let executor = Arc::new(NodeExecutor::new(bus.clone()));
        Self::with_executor(executor, bus)
    }

    pub fn with_executor(executor: Arc<NodeExecutor>, bus: EventBus) -> Self {
        Self { executor, bus, runs: RwLock::new(HashMap::new()) }
    }

    /// The node executor, for registering node types
    pub fn executor(&self) -> &Arc<NodeExecutor> {
        &self.executor
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Run a workflow to completion.
    ///
    /// Resolves once the run settles; lifecycle events mirror the
    /// transitions for observers that cannot await this future.
    pub async fn execute_workflow(
        &self,
        workflow: &Workflow,
        options: ExecuteOptions,
    ) -> Result<WorkflowResult, EngineError> {
        let context = ExecutionContext::new(&workflow.id, options.variables.clone());
        let cancel = CancellationToken::new();
        let (pause_tx, pause_rx) = watch::channel(false);
        let stop_reason = Arc::new(Mutex::new(None));

        {
            let mut runs = self.runs.write().await;
            if runs.contains_key(&workflow.id) {
                return Err(EngineError::AlreadyRunning(workflow.id.clone()));
            }
            runs.insert(
                workflow.id.clone(),
                RunHandle {
                    context: context.clone(),
                    cancel: cancel.clone(),
                    pause: pause_tx,
                    stop_reason: stop_reason.clone(),
                },
            );
        }

        tracing::info!(workflow_id = %workflow.id, parallel = options.parallel, "starting workflow run");
        self.bus
            .publish(names::WORKFLOW_STARTED, workflow_payload(&workflow.id, []))
            .await;

        let timer = if options.timeout > Duration::ZERO {
            let cancel = cancel.clone();
            let stop_reason = stop_reason.clone();
            let timeout = options.timeout;
            Some(tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let mut reason = stop_reason.lock().await;
                if reason.is_none() {
                    *reason = Some(StopReason::Timeout(timeout));
                }
                drop(reason);
                cancel.cancel();
            }))
        } else {
            None
        };

        let outcome = self
            .drive(workflow, &context, &cancel, pause_rx, &stop_reason, &options)
            .instrument(context.span().clone())
            .await;

        if let Some(timer) = timer {
            timer.abort();
        }
        {
            let mut runs = self.runs.write().await;
            runs.remove(&workflow.id);
        }

        let finished_at = Utc::now();
        let duration_ms = (finished_at - context.started_at()).num_milliseconds().max(0) as u64;

        match outcome {
            Ok(nodes_executed) => {
                context.set_status(RunStatus::Completed).await;

                let mut outputs = HashMap::new();
                for exit in &workflow.exit_points {
                    if let Some(values) = context.node_outputs(exit).await {
                        outputs.insert(exit.clone(), values);
                    }
                }

                tracing::info!(
                    workflow_id = %workflow.id,
                    nodes_executed,
                    duration_ms,
                    "workflow run completed"
                );
                self.bus
                    .publish(
                        names::WORKFLOW_COMPLETED,
                        workflow_payload(
                            &workflow.id,
                            [
                                ("nodesExecuted", Value::from(nodes_executed as i64)),
                                ("durationMs", Value::from(duration_ms as i64)),
                            ],
                        ),
                    )
                    .await;

                Ok(WorkflowResult {
                    workflow_id: workflow.id.clone(),
                    status: RunStatus::Completed,
                    outputs,
                    stats: RunStats {
                        started_at: context.started_at(),
                        finished_at,
                        duration_ms,
                        nodes_executed,
                    },
                })
            }
            Err(error) => {
                let status = match &error {
                    EngineError::Cancelled(_) => RunStatus::Cancelled,
                    _ => RunStatus::Failed,
                };
                context.set_status(status).await;

                tracing::error!(workflow_id = %workflow.id, %error, "workflow run failed");
                self.bus
                    .publish(
                        names::WORKFLOW_FAILED,
                        workflow_payload(&workflow.id, [("error", Value::from(error.to_string()))]),
                    )
                    .await;

                Err(error)
            }
        }
    }

    async fn drive(
        &self,
        workflow: &Workflow,
        context: &ExecutionContext,
        cancel: &CancellationToken,
        mut pause_rx: watch::Receiver<bool>,
        stop_reason: &Arc<Mutex<Option<StopReason>>>,
        options: &ExecuteOptions,
    ) -> Result<usize, EngineError> {
        let order = execution_order(workflow)?;
        for node_id in &order {
            context.set_node_status(node_id, NodeStatus::Waiting).await;
        }

        let mut executed = 0;

        if options.parallel {
            let levels = level_partition(workflow, &order);
            for level in levels {
                self.gate(workflow, cancel, &mut pause_rx, stop_reason).await?;

                let mut running = FuturesUnordered::new();
                for node_id in level {
                    let node = workflow
                        .find_node(&node_id)
                        .ok_or_else(|| GraphError::NodeNotFound(node_id.clone()))?
                        .clone();
                    let inputs = self.gather_inputs(workflow, &node, context, options).await;
                    context.set_node_status(&node.id, NodeStatus::Processing).await;

                    let executor = self.executor.clone();
                    let ctx = context.clone();
                    running.push(async move {
                        let result = executor.execute_node(&node, inputs, &ctx).await;
                        (node.id, result)
                    });
                }

                let mut failure: Option<EngineError> = None;
                while let Some((node_id, result)) = running.next().await {
                    match result {
                        Ok(outputs) => {
                            self.record_outputs(&node_id, outputs, context).await;
                            executed += 1;
                        }
                        Err(error) => {
                            context.set_node_status(&node_id, NodeStatus::Failed).await;
                            self.bus
                                .publish(
                                    names::DATA_FLOW_FAILED,
                                    workflow_payload(
                                        &workflow.id,
                                        [("nodeId", Value::from(node_id.as_str()))],
                                    ),
                                )
                                .await;
                            // First failure wins; siblings still join
                            cancel.cancel();
                            if failure.is_none() {
                                failure = Some(EngineError::NodeFailed { node_id, source: error });
                            }
                        }
                    }
                }
                if let Some(error) = failure {
                    return Err(error);
                }
            }
        } else {
            for node_id in &order {
                self.gate(workflow, cancel, &mut pause_rx, stop_reason).await?;

                let node = workflow
                    .find_node(node_id)
                    .ok_or_else(|| GraphError::NodeNotFound(node_id.clone()))?;
                let inputs = self.gather_inputs(workflow, node, context, options).await;
                context.set_node_status(&node.id, NodeStatus::Processing).await;

                match self.executor.execute_node(node, inputs, context).await {
                    Ok(outputs) => {
                        self.record_outputs(&node.id, outputs, context).await;
                        executed += 1;
                    }
                    Err(error) => {
                        context.set_node_status(&node.id, NodeStatus::Failed).await;
                        self.bus
                            .publish(
                                names::DATA_FLOW_FAILED,
                                workflow_payload(
                                    &workflow.id,
                                    [("nodeId", Value::from(node_id.as_str()))],
                                ),
                            )
                            .await;
                        cancel.cancel();
                        return Err(EngineError::NodeFailed {
                            node_id: node_id.clone(),
                            source: error,
                        });
                    }
                }
            }
        }

        Ok(executed)
    }

    /// Wait out a pause, and stop when the run token has fired.
    async fn gate(
        &self,
        workflow: &Workflow,
        cancel: &CancellationToken,
        pause_rx: &mut watch::Receiver<bool>,
        stop_reason: &Arc<Mutex<Option<StopReason>>>,
    ) -> Result<(), EngineError> {
        loop {
            if cancel.is_cancelled() {
                let reason = stop_reason.lock().await;
                return Err(match *reason {
                    Some(StopReason::Timeout(after)) => {
                        EngineError::Timeout(workflow.id.clone(), after)
                    }
                    _ => EngineError::Cancelled(workflow.id.clone()),
                });
            }
            if !*pause_rx.borrow() {
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => {}
                changed = pause_rx.changed() => {
                    // Sender dropped means the handle is gone; stop gating
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Read a node's inputs off the run state: one value per incoming
    /// connection, seed inputs merged in for entry nodes (connection
    /// values win), port defaults for anything still missing.
    async fn gather_inputs(
        &self,
        workflow: &Workflow,
        node: &Node,
        context: &ExecutionContext,
        options: &ExecuteOptions,
    ) -> PortValues {
        self.bus
            .publish(
                names::DATA_FLOW_STARTED,
                workflow_payload(&workflow.id, [("nodeId", Value::from(node.id.as_str()))]),
            )
            .await;

        let mut inputs = PortValues::new();
        if workflow.entry_points.iter().any(|id| id == &node.id) {
            inputs.extend(options.inputs.clone());
        }
        for conn in workflow.incoming(&node.id) {
            if let Some(outputs) = context.node_outputs(&conn.source_node).await {
                if let Some(value) = outputs.get(&conn.source_port) {
                    inputs.insert(conn.target_port.clone(), value.clone());
                }
            }
        }
        for port in &node.inputs {
            if !inputs.contains_key(&port.id) {
                if let Some(default) = &port.default_value {
                    inputs.insert(port.id.clone(), default.clone());
                }
            }
        }
        inputs
    }

    async fn record_outputs(&self, node_id: &str, outputs: PortValues, context: &ExecutionContext) {
        context.record_outputs(node_id, outputs).await;
        context.set_node_status(node_id, NodeStatus::Completed).await;
        self.bus
            .publish(
                names::DATA_FLOW_COMPLETED,
                workflow_payload(context.workflow_id(), [("nodeId", Value::from(node_id))]),
            )
            .await;
    }

    /// Pause an active run. The scheduler starts no further nodes until
    /// the run is resumed or cancelled; pause is a real gate, not an
    /// advisory flag.
    pub async fn pause_workflow(&self, workflow_id: &str) -> Result<(), EngineError> {
        {
            let runs = self.runs.read().await;
            let handle = runs
                .get(workflow_id)
                .ok_or_else(|| EngineError::NotRunning(workflow_id.to_string()))?;

            let status = handle.context.status().await;
            if status != RunStatus::Running {
                return Err(EngineError::InvalidTransition {
                    workflow_id: workflow_id.to_string(),
                    expected: RunStatus::Running,
                    actual: status,
                });
            }
            handle.context.set_status(RunStatus::Paused).await;
            let _ = handle.pause.send(true);
        }

        tracing::info!(workflow_id, "workflow paused");
        self.bus
            .publish(names::WORKFLOW_PAUSED, workflow_payload(workflow_id, []))
            .await;
        Ok(())
    }

    /// Resume a paused run
    pub async fn resume_workflow(&self, workflow_id: &str) -> Result<(), EngineError> {
        {
            let runs = self.runs.read().await;
            let handle = runs
                .get(workflow_id)
                .ok_or_else(|| EngineError::NotRunning(workflow_id.to_string()))?;

            let status = handle.context.status().await;
            if status != RunStatus::Paused {
                return Err(EngineError::InvalidTransition {
                    workflow_id: workflow_id.to_string(),
                    expected: RunStatus::Paused,
                    actual: status,
                });
            }
            handle.context.set_status(RunStatus::Running).await;
            let _ = handle.pause.send(false);
        }

        tracing::info!(workflow_id, "workflow resumed");
        self.bus
            .publish(names::WORKFLOW_RESUMED, workflow_payload(workflow_id, []))
            .await;
        Ok(())
    }

    /// Cancel an active run. Nodes already started finish; nothing
    /// further begins. The run future rejects with a cancellation error
    /// and `workflow:failed` is emitted once as the run settles.
    pub async fn stop_workflow(&self, workflow_id: &str) -> Result<(), EngineError> {
        let runs = self.runs.read().await;
        let handle = runs
            .get(workflow_id)
            .ok_or_else(|| EngineError::NotRunning(workflow_id.to_string()))?;

        {
            let mut reason = handle.stop_reason.lock().await;
            if reason.is_none() {
                *reason = Some(StopReason::Cancelled);
            }
        }
        handle.context.set_status(RunStatus::Cancelled).await;
        handle.cancel.cancel();
        tracing::info!(workflow_id, "workflow cancelled");
        Ok(())
    }

    /// Status of a run. Absence of a handle means the run settled, which
    /// reads as `Completed`.
    pub async fn workflow_status(&self, workflow_id: &str) -> RunStatus {
        let runs = self.runs.read().await;
        match runs.get(workflow_id) {
            Some(handle) => handle.context.status().await,
            None => RunStatus::Completed,
        }
    }
}

fn workflow_payload<const N: usize>(workflow_id: &str, extra: [(&str, Value); N]) -> Value {
    let mut fields: Vec<(&str, Value)> = vec![("workflowId", Value::from(workflow_id))];
    fields.extend(extra);
    Value::object(fields)
}
