use thiserror::Error;

use crate::lang::node::{Ast, NodeId, NodeType};
use crate::lang::variable::Variables;

/// Bytes per stack element.
const SLOT_BYTES: u32 = 4;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("stack-check error: {message}")]
pub struct StackCheckError {
    pub message: String,
}

impl StackCheckError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// What a node does to the stack once its children have run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    /// Pushes one entry of the given size in slots.
    Push(u32),
    /// Pops the top entry.
    Pop,
    None,
}

fn effect(ast: &Ast, variables: &Variables, id: NodeId) -> Effect {
    let node = ast.node(id);

    if node.is_pop() {
        return Effect::Pop;
    }

    let Some(function) = node.function.filter(|_| node.node_type == NodeType::Function) else {
        return Effect::None;
    };

    if function.is_pop() {
        return Effect::Pop;
    }
    if !function.is_push() {
        return Effect::None;
    }

    // a vector literal pushes one entry holding all elements
    let slots: u32 = if node.is_vector && node.children.len() > 1 {
        node.children
            .iter()
            .map(|c| element_slots(ast, variables, *c))
            .sum()
    } else {
        match node.children.as_slice() {
            [only] if ast.node(*only).is_simplex() => element_slots(ast, variables, *only),
            _ => node.vector_size.max(1) as u32,
        }
    };

    Effect::Push(slots)
}

fn element_slots(ast: &Ast, variables: &Variables, id: NodeId) -> u32 {
    let node = ast.node(id);
    node.variable
        .and_then(|v| variables.get(v))
        .map_or(node.vector_size.max(1) as u32, |v| v.slots() as u32)
}

/// Peak stack use in bytes, walking statements in emission order.
///
/// Every loop body is visited once, so code that grows the stack per
/// iteration is under-estimated; the trial run catches that case.
pub fn peak_stack_bytes(ast: &Ast, variables: &Variables) -> Result<u32, StackCheckError> {
    let mut stack: Vec<u32> = Vec::new();
    let mut height = 0u32;
    let mut peak = 0u32;
    let mut seen = vec![false; ast.len()];

    walk(
        ast,
        variables,
        ast.root(),
        &mut seen,
        &mut stack,
        &mut height,
        &mut peak,
    )?;

    Ok(peak * SLOT_BYTES)
}

fn walk(
    ast: &Ast,
    variables: &Variables,
    id: NodeId,
    seen: &mut [bool],
    stack: &mut Vec<u32>,
    height: &mut u32,
    peak: &mut u32,
) -> Result<(), StackCheckError> {
    if seen[id.index()] {
        return Ok(());
    }
    seen[id.index()] = true;

    let node = ast.node(id);
    for &dep in node.depends_on.iter().rev() {
        walk(ast, variables, dep, seen, stack, height, peak)?;
    }
    for &child in &node.children {
        walk(ast, variables, child, seen, stack, height, peak)?;
    }

    match effect(ast, variables, id) {
        Effect::Push(slots) => {
            stack.push(slots);
            *height += slots;
            *peak = (*peak).max(*height);
        }
        Effect::Pop => {
            let Some(slots) = stack.pop() else {
                return Err(StackCheckError::new(format!(
                    "stack underflow at {}",
                    ast.describe(id, Some(variables))
                )));
            };
            *height -= slots;
        }
        Effect::None => {}
    }

    Ok(())
}

/// Static estimate floored by `floor` bytes.
pub fn estimate_stack_bytes(
    ast: &Ast,
    variables: &Variables,
    floor: u32,
) -> Result<u32, StackCheckError> {
    peak_stack_bytes(ast, variables).map(|peak| peak.max(floor))
}
