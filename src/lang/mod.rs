//! # Blast Abstract Syntax Tree
//!
//! This module defines the syntax tree, the operator tokens and the variable
//! table consumed by the bytecode compiler. Trees arrive here already
//! flattened and annotated by earlier passes (identifier resolution, offset
//! assignment, vector-size inference).
//!
//! ## Documentation conventions
//!
//! - Script snippets are written in Blast surface syntax: `a = 1 + 2;`.
//! - `( a b c )` denotes a vector literal.

pub mod node;
pub mod script;
pub mod token;
pub mod variable;
