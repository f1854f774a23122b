use std::collections::HashMap;

use super::node::Ast;
use super::variable::Variables;

/// Define key that fixes the stack size in bytes.
pub const DEFINE_STACK_SIZE: &str = "stack_size";

/// A validation assertion: after a trial run `name` must equal `expected`.
///
/// `expected` is either a numeric literal or the name of another variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub name: String,
    pub expected: String,
}

impl Validation {
    pub fn new(name: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expected: expected.into(),
        }
    }
}

/// Everything upstream passes hand to the compiler for one script.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub name: String,
    pub ast: Ast,
    pub variables: Variables,
    pub defines: HashMap<String, String>,
    pub validations: Vec<Validation>,
}

impl Script {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_define(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.insert(key.into(), value.into());
        self
    }

    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validations.push(validation);
        self
    }
}
