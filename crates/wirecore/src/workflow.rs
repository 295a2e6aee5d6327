use crate::{GraphError, Node, PortDirection, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Directed edge from an output port of one node to an input port of another
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Connection {
    pub id: String,
    pub source_node: String,
    pub source_port: String,
    pub target_node: String,
    pub target_port: String,
}

/// A directed graph of nodes and connections with named entry and exit nodes.
///
/// Workflows are value-like: the engine reads them during a run but never
/// mutates them. Structural invariants (port directions, type tags, fan-in
/// of one, no duplicate edges) are enforced when connections are added.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
    /// Nodes seeded with initial inputs at run start
    #[serde(default)]
    pub entry_points: Vec<String>,
    /// Nodes whose outputs form the workflow result
    #[serde(default)]
    pub exit_points: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Workflow {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            connections: Vec::new(),
            entry_points: Vec::new(),
            exit_points: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Add a node. Node ids must be unique within the workflow.
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        if self.find_node(&node.id).is_some() {
            return Err(GraphError::DuplicateNodeId(node.id));
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn find_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Connect an output port to an input port, enforcing the connection
    /// invariants. Returns the generated connection id.
    pub fn connect(
        &mut self,
        source_node: &str,
        source_port: &str,
        target_node: &str,
        target_port: &str,
    ) -> Result<String, GraphError> {
        let source = self
            .find_node(source_node)
            .ok_or_else(|| GraphError::NodeNotFound(source_node.to_string()))?;
        let target = self
            .find_node(target_node)
            .ok_or_else(|| GraphError::NodeNotFound(target_node.to_string()))?;

        let out_port = source.find_output(source_port).ok_or_else(|| {
            // An input port with that id means the caller got the direction wrong
            if source.find_input(source_port).is_some() {
                GraphError::WrongDirection {
                    node_id: source_node.to_string(),
                    port_id: source_port.to_string(),
                    expected: PortDirection::Out.as_str(),
                    actual: PortDirection::In.as_str(),
                }
            } else {
                GraphError::PortNotFound {
                    node_id: source_node.to_string(),
                    port_id: source_port.to_string(),
                }
            }
        })?;
        let in_port = target.find_input(target_port).ok_or_else(|| {
            if target.find_output(target_port).is_some() {
                GraphError::WrongDirection {
                    node_id: target_node.to_string(),
                    port_id: target_port.to_string(),
                    expected: PortDirection::In.as_str(),
                    actual: PortDirection::Out.as_str(),
                }
            } else {
                GraphError::PortNotFound {
                    node_id: target_node.to_string(),
                    port_id: target_port.to_string(),
                }
            }
        })?;

        if out_port.data_type != in_port.data_type {
            return Err(GraphError::TypeMismatch {
                source_node: source_node.to_string(),
                source_port: source_port.to_string(),
                source_type: out_port.data_type.clone(),
                target_node: target_node.to_string(),
                target_port: target_port.to_string(),
                target_type: in_port.data_type.clone(),
            });
        }

        for existing in &self.connections {
            if existing.source_node == source_node
                && existing.source_port == source_port
                && existing.target_node == target_node
                && existing.target_port == target_port
            {
                return Err(GraphError::DuplicateConnection {
                    source_node: source_node.to_string(),
                    source_port: source_port.to_string(),
                    target_node: target_node.to_string(),
                    target_port: target_port.to_string(),
                });
            }
            // A target input port admits at most one incoming connection
            if existing.target_node == target_node && existing.target_port == target_port {
                return Err(GraphError::FanInViolation {
                    node_id: target_node.to_string(),
                    port_id: target_port.to_string(),
                });
            }
        }

        let id = Uuid::new_v4().to_string();
        self.connections.push(Connection {
            id: id.clone(),
            source_node: source_node.to_string(),
            source_port: source_port.to_string(),
            target_node: target_node.to_string(),
            target_port: target_port.to_string(),
        });
        Ok(id)
    }

    /// Connections arriving at the given node
    pub fn incoming<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.target_node == node_id)
    }

    /// Connections leaving the given node
    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.source_node == node_id)
    }

    pub fn mark_entry(&mut self, node_id: impl Into<String>) {
        self.entry_points.push(node_id.into());
    }

    pub fn mark_exit(&mut self, node_id: impl Into<String>) {
        self.exit_points.push(node_id.into());
    }
}
