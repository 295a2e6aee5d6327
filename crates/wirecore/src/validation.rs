//! Rule-based validation for nodes, connections, and whole workflows.
//!
//! Structural connection invariants are also enforced eagerly by
//! [`Workflow::connect`]; this module re-checks them for graphs assembled
//! elsewhere (e.g. deserialized from an editor) and adds the extensible
//! per-node rule registry.

use crate::{Connection, GraphError, Node, Workflow};
use std::collections::HashMap;
use std::sync::Arc;

type RulePredicate = Arc<dyn Fn(&Node) -> bool + Send + Sync>;

/// A named predicate over a node
#[derive(Clone)]
pub struct ValidationRule {
    pub id: String,
    pub name: String,
    pub message: String,
    predicate: RulePredicate,
}

impl ValidationRule {
    pub fn new<F>(
        id: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
        predicate: F,
    ) -> Self
    where
        F: Fn(&Node) -> bool + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            name: name.into(),
            message: message.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn check(&self, node: &Node) -> bool {
        (self.predicate)(node)
    }
}

impl std::fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationRule")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// A failed rule for a specific node
#[derive(Debug, Clone, PartialEq)]
pub struct RuleViolation {
    pub rule_id: String,
    pub message: String,
}

/// Result of validating a single node
#[derive(Debug, Clone)]
pub struct NodeValidation {
    pub ok: bool,
    pub errors: Vec<RuleViolation>,
}

/// Result of validating a whole workflow
#[derive(Debug, Clone)]
pub struct WorkflowValidation {
    pub ok: bool,
    pub node_errors: HashMap<String, Vec<RuleViolation>>,
    pub connection_errors: Vec<GraphError>,
}

/// Registry of validation rules plus the built-in structural checks
pub struct Validator {
    rules: Vec<ValidationRule>,
}

impl Validator {
    /// Create a validator carrying the built-in rules
    pub fn new() -> Self {
        let mut validator = Self { rules: Vec::new() };
        validator.add_rule(ValidationRule::new(
            "node-id-required",
            "Node id required",
            "node id must not be empty",
            |node| !node.id.is_empty(),
        ));
        validator.add_rule(ValidationRule::new(
            "node-name-required",
            "Node name required",
            "node name must not be empty",
            |node| !node.name.is_empty(),
        ));
        validator
    }

    /// Register a rule. Re-registering an id replaces the prior rule.
    pub fn add_rule(&mut self, rule: ValidationRule) {
        if let Some(existing) = self.rules.iter_mut().find(|r| r.id == rule.id) {
            *existing = rule;
        } else {
            self.rules.push(rule);
        }
    }

    pub fn get_rule(&self, id: &str) -> Option<&ValidationRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn remove_rule(&mut self, id: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        self.rules.len() != before
    }

    /// Run every rule, or the named subset, against one node
    pub fn validate_node(&self, node: &Node, rule_ids: Option<&[&str]>) -> NodeValidation {
        let errors: Vec<RuleViolation> = self
            .rules
            .iter()
            .filter(|rule| match rule_ids {
                Some(ids) => ids.contains(&rule.id.as_str()),
                None => true,
            })
            .filter(|rule| !rule.check(node))
            .map(|rule| RuleViolation {
                rule_id: rule.id.clone(),
                message: rule.message.clone(),
            })
            .collect();

        NodeValidation { ok: errors.is_empty(), errors }
    }

    /// Check that a connection's endpoints exist and its type tags match
    pub fn validate_connection(
        &self,
        connection: &Connection,
        workflow: &Workflow,
    ) -> Result<(), GraphError> {
        let source = workflow
            .find_node(&connection.source_node)
            .ok_or_else(|| GraphError::NodeNotFound(connection.source_node.clone()))?;
        let target = workflow
            .find_node(&connection.target_node)
            .ok_or_else(|| GraphError::NodeNotFound(connection.target_node.clone()))?;

        let out_port = source.find_output(&connection.source_port).ok_or_else(|| {
            GraphError::PortNotFound {
                node_id: connection.source_node.clone(),
                port_id: connection.source_port.clone(),
            }
        })?;
        let in_port = target.find_input(&connection.target_port).ok_or_else(|| {
            GraphError::PortNotFound {
                node_id: connection.target_node.clone(),
                port_id: connection.target_port.clone(),
            }
        })?;

        if out_port.data_type != in_port.data_type {
            return Err(GraphError::TypeMismatch {
                source_node: connection.source_node.clone(),
                source_port: connection.source_port.clone(),
                source_type: out_port.data_type.clone(),
                target_node: connection.target_node.clone(),
                target_port: connection.target_port.clone(),
                target_type: in_port.data_type.clone(),
            });
        }
        Ok(())
    }

    /// Aggregate node and connection validation over a workflow
    pub fn validate_workflow(&self, workflow: &Workflow) -> WorkflowValidation {
        let mut node_errors = HashMap::new();
        for node in &workflow.nodes {
            let report = self.validate_node(node, None);
            if !report.ok {
                node_errors.insert(node.id.clone(), report.errors);
            }
        }

        let connection_errors: Vec<GraphError> = workflow
            .connections
            .iter()
            .filter_map(|c| self.validate_connection(c, workflow).err())
            .collect();

        WorkflowValidation {
            ok: node_errors.is_empty() && connection_errors.is_empty(),
            node_errors,
            connection_errors,
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}
