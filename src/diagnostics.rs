use serde::{Deserialize, Serialize};
use tracing::{error, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Trace,
    Warning,
    Error,
}

/// One entry of a compilation's message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Rendered identity of the node the message is about.
    pub node: Option<String>,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.severity {
            Severity::Trace => "trace",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match &self.node {
            Some(node) => write!(f, "{}: {} [{}]", level, self.message, node),
            None => write!(f, "{}: {}", level, self.message),
        }
    }
}

/// Ordered message log owned by one compilation. Every entry is also
/// forwarded to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trace(&mut self, message: impl Into<String>, node: Option<String>) {
        let message = message.into();
        trace!(node = node.as_deref(), "{}", message);
        self.push(Severity::Trace, message, node);
    }

    pub fn warning(&mut self, message: impl Into<String>, node: Option<String>) {
        let message = message.into();
        warn!(node = node.as_deref(), "{}", message);
        self.push(Severity::Warning, message, node);
    }

    pub fn error(&mut self, message: impl Into<String>, node: Option<String>) {
        let message = message.into();
        error!(node = node.as_deref(), "{}", message);
        self.push(Severity::Error, message, node);
    }

    fn push(&mut self, severity: Severity, message: String, node: Option<String>) {
        self.entries.push(Diagnostic {
            severity,
            message,
            node,
        });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.severity == severity)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
