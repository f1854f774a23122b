use thiserror::Error;

use crate::lang::node::{Ast, NodeId};
use crate::lang::variable::Variables;
use crate::package::PackageError;

/// Errors raised while turning a syntax tree into a package.
///
/// Variants raised for a node carry it rendered with [`Ast::describe`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// A node is missing a required child or has children of the wrong kind.
    #[error("compile error: malformed {node}: {reason}")]
    Malformed { node: String, reason: String },

    /// A variable, function or data offset binding is absent.
    #[error("compile error: unresolved reference in {node}: {what}")]
    Unresolved { node: String, what: String },

    /// Parameter count outside the function's declared bounds.
    #[error("compile error: {node}: expected {min}..={max} parameters, got {got}")]
    Arity {
        node: String,
        min: u8,
        max: u8,
        got: usize,
    },

    /// Nesting left behind that later stages cannot flatten.
    #[error("compile error: error_unresolved_nested_statements in {node}: {reason}")]
    UnresolvedNesting { node: String, reason: String },

    /// A node appeared where this stage does not accept it.
    #[error("compile error: {node}: {reason}")]
    Structural {
        node: String,
        reason: String,
        hint: Option<String>,
    },

    /// A value does not fit its encoding.
    #[error("compile error: encoding limit in {node}: {reason}")]
    EncodingLimit { node: String, reason: String },

    #[error(transparent)]
    Package(#[from] PackageError),

    /// The trial run used for stack measurement failed.
    #[error("compile error: trial run failed: {0}")]
    TrialRun(String),

    #[error("compile error: jump resolution failed: {0}")]
    JumpResolution(String),

    /// Internal compiler error (an earlier pass left an impossible state).
    #[error("compile error: internal error: {0}")]
    Internal(String),
}

/// Renders nodes for error messages.
///
/// Emission code holds the tree and the variable table; this keeps the
/// error constructors short.
#[derive(Clone, Copy)]
pub struct Subject<'a> {
    pub ast: &'a Ast,
    pub variables: Option<&'a Variables>,
}

impl Subject<'_> {
    pub fn describe(&self, id: NodeId) -> String {
        self.ast.describe(id, self.variables)
    }
}

impl CompileError {
    pub fn malformed(subject: Subject<'_>, id: NodeId, reason: impl Into<String>) -> Self {
        CompileError::Malformed {
            node: subject.describe(id),
            reason: reason.into(),
        }
    }

    pub fn unresolved(subject: Subject<'_>, id: NodeId, what: impl Into<String>) -> Self {
        CompileError::Unresolved {
            node: subject.describe(id),
            what: what.into(),
        }
    }

    pub fn arity(subject: Subject<'_>, id: NodeId, min: u8, max: u8, got: usize) -> Self {
        CompileError::Arity {
            node: subject.describe(id),
            min,
            max,
            got,
        }
    }

    pub fn unresolved_nesting(subject: Subject<'_>, id: NodeId, reason: impl Into<String>) -> Self {
        CompileError::UnresolvedNesting {
            node: subject.describe(id),
            reason: reason.into(),
        }
    }

    pub fn structural(subject: Subject<'_>, id: NodeId, reason: impl Into<String>) -> Self {
        CompileError::Structural {
            node: subject.describe(id),
            reason: reason.into(),
            hint: None,
        }
    }

    pub fn structural_with_hint(
        subject: Subject<'_>,
        id: NodeId,
        reason: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        CompileError::Structural {
            node: subject.describe(id),
            reason: reason.into(),
            hint: Some(hint.into()),
        }
    }

    pub fn encoding_limit(subject: Subject<'_>, id: NodeId, reason: impl Into<String>) -> Self {
        CompileError::EncodingLimit {
            node: subject.describe(id),
            reason: reason.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }

    /// Rendered node the error was raised for, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            CompileError::Malformed { node, .. }
            | CompileError::Unresolved { node, .. }
            | CompileError::Arity { node, .. }
            | CompileError::UnresolvedNesting { node, .. }
            | CompileError::Structural { node, .. }
            | CompileError::EncodingLimit { node, .. } => Some(node),
            CompileError::Package(_)
            | CompileError::TrialRun(_)
            | CompileError::JumpResolution(_)
            | CompileError::Internal(_) => None,
        }
    }

    pub fn hint(&self) -> Option<&str> {
        match self {
            CompileError::Structural { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }
}
