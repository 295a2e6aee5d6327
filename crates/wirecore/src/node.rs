use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Direction of a port. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    In,
    Out,
}

impl PortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortDirection::In => "in",
            PortDirection::Out => "out",
        }
    }
}

/// Typed, named attachment point for a connection on a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub name: String,
    /// Data-type tag. Connections require exact tag equality.
    pub data_type: String,
    pub direction: PortDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Substituted when no value was gathered for this input port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl Port {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        data_type: impl Into<String>,
        direction: PortDirection,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            data_type: data_type.into(),
            direction,
            description: None,
            default_value: None,
        }
    }

    /// Shorthand for an input port whose id doubles as its display name
    pub fn input(id: impl Into<String> + Clone, data_type: impl Into<String>) -> Self {
        Self::new(id.clone(), id, data_type, PortDirection::In)
    }

    /// Shorthand for an output port whose id doubles as its display name
    pub fn output(id: impl Into<String> + Clone, data_type: impl Into<String>) -> Self {
        Self::new(id.clone(), id, data_type, PortDirection::Out)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// Lifecycle status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Idle,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Waiting,
}

/// A typed unit of computation with input and output ports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique within its workflow
    pub id: String,
    /// Key into the executor registry
    pub node_type: String,
    pub name: String,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default)]
    pub status: NodeStatus,
}

impl Node {
    pub fn new(
        id: impl Into<String>,
        node_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            config: HashMap::new(),
            metadata: HashMap::new(),
            status: NodeStatus::Idle,
        }
    }

    pub fn with_input(mut self, port: Port) -> Self {
        debug_assert_eq!(port.direction, PortDirection::In);
        self.inputs.push(port);
        self
    }

    pub fn with_output(mut self, port: Port) -> Self {
        debug_assert_eq!(port.direction, PortDirection::Out);
        self.outputs.push(port);
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn find_input(&self, port_id: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.id == port_id)
    }

    pub fn find_output(&self, port_id: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.id == port_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assembles_ports_and_config() {
        let node = Node::new("n1", "math.double", "Double")
            .with_input(Port::input("v", "number").with_default(0.0))
            .with_output(Port::output("v", "number"))
            .with_config("factor", 2.0);

        assert_eq!(node.status, NodeStatus::Idle);
        assert_eq!(node.find_input("v").unwrap().direction, PortDirection::In);
        assert_eq!(node.find_output("v").unwrap().direction, PortDirection::Out);
        assert!(node.find_input("missing").is_none());
        assert_eq!(node.config["factor"].as_f64(), Some(2.0));
    }
}
