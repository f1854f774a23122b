//! Bytecode compiler for Blast scripts.
//!
//! Takes a resolved syntax tree with its variable table, emits the compact
//! bytecode the Blast interpreter runs and lays it out as a Normal or SSMD
//! package.
//!
//! ```text
//! Script ─► prepare ─► emit ─► resolve jumps ─► size stack ─► package
//! ```

pub mod bytecode;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod lang;
pub mod package;

pub use bytecode::{BlastOp, Buffer, CompileError, ExtendedOp};
pub use compiler::{
    Compilation, CompiledScript, JumpResolver, StackSource, TrialRun, TrialRunner, compile,
};
pub use config::CompilerOptions;
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use lang::node::{Ast, Node, NodeId, NodeType};
pub use lang::script::{Script, Validation};
pub use lang::variable::{VariableId, Variables};
pub use package::{Package, PackageError, PackageMode};
