use thiserror::Error;

/// Structural problems in a workflow graph.
///
/// These are raised synchronously when a graph is built or analyzed and
/// are fatal to the run they would have started.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("cycle detected at node '{node_id}'")]
    CycleDetected { node_id: String },

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("port '{port_id}' not found on node '{node_id}'")]
    PortNotFound { node_id: String, port_id: String },

    #[error("port '{port_id}' on node '{node_id}' has direction {actual}, expected {expected}")]
    WrongDirection {
        node_id: String,
        port_id: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error(
        "type mismatch: {source_node}.{source_port} ({source_type}) cannot feed \
         {target_node}.{target_port} ({target_type})"
    )]
    TypeMismatch {
        source_node: String,
        source_port: String,
        source_type: String,
        target_node: String,
        target_port: String,
        target_type: String,
    },

    #[error("input port '{port_id}' on node '{node_id}' already has an incoming connection")]
    FanInViolation { node_id: String, port_id: String },

    #[error("duplicate connection {source_node}.{source_port} -> {target_node}.{target_port}")]
    DuplicateConnection {
        source_node: String,
        source_port: String,
        target_node: String,
        target_port: String,
    },

    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),
}

/// Failures of a single node execution.
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("no executor registered for node type '{0}'")]
    NoExecutor(String),

    #[error("input validation rejected node '{node_id}' (validator #{index})")]
    InputValidation { node_id: String, index: usize },

    #[error("output validation rejected node '{node_id}' (validator #{index})")]
    OutputValidation { node_id: String, index: usize },

    #[error("missing required input: {0}")]
    MissingInput(String),

    #[error("invalid input '{port}': expected {expected}")]
    InvalidInput { port: String, expected: String },

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("cancelled")]
    Cancelled,
}

/// Failures of an event propagation call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropagateError {
    #[error("workflow not registered: {0}")]
    WorkflowNotFound(String),
}
