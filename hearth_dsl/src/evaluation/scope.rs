//! Variable bindings for one evaluation

use super::error::{RuntimeError, RuntimeResult};
use super::value::Value;
use crate::grammar::ast::nodes::ValueNode;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Scope {
    bindings: HashMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, replacing any earlier binding
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Turn a value node into a runtime value, resolving `$name` here
    pub fn resolve(&self, node: &ValueNode) -> RuntimeResult<Value> {
        if let Some(name) = node.variable_name() {
            return self
                .lookup(name)
                .cloned()
                .ok_or_else(|| RuntimeError::UnboundVariable {
                    position: node.position,
                    name: name.to_string(),
                });
        }

        Value::from_literal(node.kind, &node.literal).map_err(|message| {
            RuntimeError::TypeMismatch {
                position: node.position,
                message,
            }
        })
    }
}
