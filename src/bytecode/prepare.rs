//! Tree rewrites that run before emission.
//!
//! Everything that mutates the tree or the variable table happens here, once
//! and sequentially. Emission afterwards only reads, which is what lets
//! top-level statements compile in parallel.

use std::collections::HashSet;

use tracing::debug;

use crate::bytecode::compile_error::{CompileError, Subject};
use crate::bytecode::normalize::{constant_value, is_negated_constant, normalize};
use crate::config::CompilerOptions;
use crate::diagnostics::Diagnostics;
use crate::lang::node::{Ast, NodeId, NodeType};
use crate::lang::variable::Variables;

pub fn prepare(
    ast: &mut Ast,
    variables: &mut Variables,
    options: &CompilerOptions,
    diagnostics: &mut Diagnostics,
) -> Result<(), CompileError> {
    let root = ast.root();

    normalize(ast, root, variables)?;
    collapse_single_child_compounds(ast, variables, diagnostics);
    fold_negated_constants(ast, variables, options.constant_epsilon)?;
    ensure_unique_identifiers(ast);

    Ok(())
}

/// Replace `compound(x)` by `x` everywhere except directly below a loop.
/// The compound's dependencies move onto `x`.
pub fn collapse_single_child_compounds(
    ast: &mut Ast,
    variables: &Variables,
    diagnostics: &mut Diagnostics,
) -> usize {
    let mut collapsed = 0;

    for id in ast.reachable(ast.root()) {
        let node = ast.node(id);
        if node.node_type != NodeType::Compound || node.is_vector {
            continue;
        }
        let [child] = node.children.as_slice() else {
            continue;
        };
        let child = *child;
        let Some(parent) = node.parent else {
            continue;
        };
        if ast.node(parent).node_type.is_loop() {
            continue;
        }

        diagnostics.warning(
            "collapsing compound with a single child",
            Some(ast.describe(id, Some(variables))),
        );

        let moved = {
            let node = ast.node_mut(id);
            node.children.clear();
            node.parent = None;
            std::mem::take(&mut node.depends_on)
        };

        {
            let child_node = ast.node_mut(child);
            child_node.parent = Some(parent);
            // the compound's dependencies ran before anything inside it; they
            // are compiled last-to-first, so they go at the end
            child_node.depends_on.extend(moved);
        }

        for slot in ast.node_mut(parent).children.iter_mut() {
            if *slot == id {
                *slot = child;
            }
        }

        collapsed += 1;
    }

    collapsed
}

/// Turn `-c` vector elements into references to an interned constant `-c`.
///
/// Reuses a constant variable within `epsilon` of the negated value when one
/// exists; otherwise declares one and recalculates every offset.
pub fn fold_negated_constants(
    ast: &mut Ast,
    variables: &mut Variables,
    epsilon: f32,
) -> Result<usize, CompileError> {
    let mut folded = 0;

    for id in ast.reachable(ast.root()) {
        let node = ast.node(id);
        let is_vector_target = match node.node_type {
            NodeType::Assignment => true,
            NodeType::Function => node.function.is_some_and(|f| f.is_push()),
            _ => false,
        };
        if !is_vector_target || !node.is_vector {
            continue;
        }

        let elements = node.children.clone();
        for element in elements {
            if !is_negated_constant(ast, element, variables) {
                continue;
            }
            fold_element(ast, variables, element, epsilon)?;
            folded += 1;
        }
    }

    Ok(folded)
}

fn fold_element(
    ast: &mut Ast,
    variables: &mut Variables,
    element: NodeId,
    epsilon: f32,
) -> Result<(), CompileError> {
    let (minus, operand) = match ast.children(element) {
        [minus, operand] => (*minus, *operand),
        _ => {
            let subject = Subject {
                ast,
                variables: Some(variables),
            };
            return Err(CompileError::malformed(
                subject,
                element,
                "negated constant must have exactly two children",
            ));
        }
    };

    let value = {
        let operand = ast.node(operand);
        constant_value(operand.constant_op, operand.variable, variables)
    };
    let Some(value) = value else {
        let subject = Subject {
            ast,
            variables: Some(variables),
        };
        return Err(CompileError::unresolved(
            subject,
            operand,
            "constant has no numeric value",
        ));
    };

    let negated = -value;
    let constant = match variables.find_constant(negated, epsilon) {
        Some(existing) => existing,
        None => {
            let created = variables.declare_constant(negated);
            variables.calculate_offsets();
            debug!(value = negated, id = %created, "interned negated constant");
            created
        }
    };

    ast.node_mut(minus).parent = None;
    ast.node_mut(operand).parent = None;

    let node = ast.node_mut(element);
    node.node_type = NodeType::Parameter;
    node.children.clear();
    node.variable = Some(constant);
    node.constant_op = None;
    node.token = None;
    node.is_vector = false;
    node.vector_size = 1;

    Ok(())
}

fn needs_identifier(node_type: NodeType) -> bool {
    matches!(
        node_type,
        NodeType::Condition
            | NodeType::IfThenElse
            | NodeType::IfThen
            | NodeType::IfElse
            | NodeType::While
            | NodeType::WhileLoop
            | NodeType::WhileCompound
    )
}

/// Give every control-flow node an identifier no other node uses.
///
/// Names derive from the node kind and arena index, so compiling the same
/// tree twice yields the same labels.
pub fn ensure_unique_identifiers(ast: &mut Ast) {
    let reachable = ast.reachable(ast.root());

    // user labels are referenced by name from jump_to and must not move
    let mut used: HashSet<String> = reachable
        .iter()
        .map(|id| ast.node(*id))
        .filter(|n| n.node_type == NodeType::Label && !n.identifier.is_empty())
        .map(|n| n.identifier.clone())
        .collect();

    for id in reachable {
        let node = ast.node(id);
        if !needs_identifier(node.node_type) {
            continue;
        }

        if node.identifier.is_empty() || used.contains(&node.identifier) {
            let base = format!("{}_{}", node.node_type.name(), id.index());
            let mut candidate = base.clone();
            let mut suffix = 1;
            while used.contains(&candidate) {
                candidate = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            ast.node_mut(id).identifier = candidate;
        }

        used.insert(ast.node(id).identifier.clone());
    }
}
