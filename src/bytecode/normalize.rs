//! Compound-nesting normalizer.
//!
//! Assignments and pushes often arrive wrapped: `a = ((1 2 3));` parses to an
//! assignment holding a compound holding a compound. Emission expects the
//! values as direct children, so wrappers are spliced away until none is left.

use crate::bytecode::compile_error::{CompileError, Subject};
use crate::bytecode::op::BlastOp;
use crate::lang::node::{Ast, NodeId, NodeType};
use crate::lang::token::Token;
use crate::lang::variable::{VariableId, Variables};

/// Collapse wrapper compounds below every assignment and push reachable from
/// `start`, dependency subtrees included.
pub fn normalize(ast: &mut Ast, start: NodeId, variables: &Variables) -> Result<(), CompileError> {
    let mut seen = vec![false; ast.len()];
    let mut pending = vec![start];

    while let Some(id) = pending.pop() {
        if seen[id.index()] {
            continue;
        }
        seen[id.index()] = true;

        collapse_wrappers(ast, id, variables)?;

        let node = ast.node(id);
        pending.extend(node.children.iter().rev().copied());
        // dependency subtrees are not connected to the tree; start from them directly
        pending.extend(node.depends_on.iter().copied());
    }

    Ok(())
}

fn is_participant(ast: &Ast, id: NodeId) -> bool {
    let node = ast.node(id);
    match node.node_type {
        NodeType::Assignment => true,
        NodeType::Function => node.function.is_some_and(|f| f.is_push()),
        _ => false,
    }
}

fn single_wrapper(ast: &Ast, id: NodeId) -> Option<NodeId> {
    match ast.children(id) {
        [only] if ast.node(*only).node_type == NodeType::Compound => Some(*only),
        _ => None,
    }
}

/// A compound listing vector elements rather than an expression.
fn is_vector_literal(ast: &Ast, id: NodeId) -> bool {
    let node = ast.node(id);
    node.is_vector
        && node.children.len() > 1
        && node.children.iter().all(|c| !ast.node(*c).is_operation())
}

fn collapse_wrappers(ast: &mut Ast, id: NodeId, variables: &Variables) -> Result<(), CompileError> {
    if !is_participant(ast, id) {
        return Ok(());
    }

    let limit = ast.len();
    let mut rounds = 0;

    while let Some(wrapper) = single_wrapper(ast, id) {
        rounds += 1;
        if rounds > limit {
            let subject = Subject {
                ast,
                variables: Some(variables),
            };
            return Err(CompileError::unresolved_nesting(
                subject,
                id,
                "wrapper chain does not terminate",
            ));
        }

        let vector_literal = is_vector_literal(ast, wrapper);
        splice(ast, id, wrapper);

        if vector_literal {
            check_flat_elements(ast, id, variables)?;
        }
    }

    Ok(())
}

/// Move the wrapper's children and dependencies onto `outer`.
fn splice(ast: &mut Ast, outer: NodeId, wrapper: NodeId) {
    let (children, depends_on, is_vector, vector_size) = {
        let node = ast.node_mut(wrapper);
        node.parent = None;
        (
            std::mem::take(&mut node.children),
            std::mem::take(&mut node.depends_on),
            node.is_vector,
            node.vector_size,
        )
    };

    for child in &children {
        ast.node_mut(*child).parent = Some(outer);
    }

    let node = ast.node_mut(outer);
    node.children = children;
    node.depends_on.extend(depends_on);
    if is_vector && !node.is_vector {
        node.is_vector = true;
        node.vector_size = vector_size;
    }
}

fn check_flat_elements(ast: &Ast, id: NodeId, variables: &Variables) -> Result<(), CompileError> {
    for &child in ast.children(id) {
        let node = ast.node(child);
        let flat = node.is_simplex()
            || is_negated_constant(ast, child, variables)
            || (node.node_type == NodeType::Compound
                && matches!(node.children.as_slice(), [only] if ast.node(*only).is_simplex()));

        if !flat {
            let subject = Subject {
                ast,
                variables: Some(variables),
            };
            return Err(CompileError::unresolved_nesting(
                subject,
                child,
                "vector element does not reduce to a single value",
            ));
        }
    }
    Ok(())
}

/// `-c` where `c` is a known constant: a compound of a unary minus followed by
/// a constant parameter.
pub fn is_negated_constant(ast: &Ast, id: NodeId, variables: &Variables) -> bool {
    let node = ast.node(id);
    if node.node_type != NodeType::Compound {
        return false;
    }
    let [minus, value] = node.children.as_slice() else {
        return false;
    };
    let minus = ast.node(*minus);
    let value = ast.node(*value);

    minus.is_operation()
        && minus.token == Some(Token::Substract)
        && value.is_simplex()
        && constant_value(value.constant_op, value.variable, variables).is_some()
}

/// Numeric value of a parameter bound to a well-known constant or a constant variable.
pub fn constant_value(
    constant_op: Option<BlastOp>,
    variable: Option<VariableId>,
    variables: &Variables,
) -> Option<f32> {
    if let Some(op) = constant_op {
        return op.constant_value();
    }
    variable
        .and_then(|v| variables.get(v))
        .and_then(|v| v.constant_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::function;
    use crate::lang::node::Node;

    #[test]
    fn test_nested_wrappers_below_assignment_are_spliced() {
        let mut vars = Variables::new();
        let a = vars.declare("a", 3);
        let mut ast = Ast::new();
        let root = ast.root();
        let assign = ast.add(root, Node::assignment(a).with_vector(3));
        let outer = ast.add(assign, Node::new(NodeType::Compound));
        let inner = ast.add(outer, Node::new(NodeType::Compound).with_vector(3));
        let p1 = ast.add(inner, Node::constant(BlastOp::Value1));
        let p2 = ast.add(inner, Node::constant(BlastOp::Value2));
        let p3 = ast.add(inner, Node::constant(BlastOp::Value3));

        normalize(&mut ast, root, &vars).unwrap();

        assert_eq!(ast.children(assign), &[p1, p2, p3]);
        assert_eq!(ast.parent(p1), Some(assign));
        assert_eq!(ast.parent(inner), None);
    }

    #[test]
    fn test_wrapper_dependencies_are_merged() {
        let mut vars = Variables::new();
        let a = vars.declare("a", 1);
        let mut ast = Ast::new();
        let root = ast.root();
        let assign = ast.add(root, Node::assignment(a));
        let wrapper = ast.add(assign, Node::new(NodeType::Compound));
        ast.add(wrapper, Node::constant(BlastOp::Value1));
        let dep = ast.add_detached(Node::new(NodeType::Compound));
        ast.add_dependency(wrapper, dep);

        normalize(&mut ast, root, &vars).unwrap();

        assert_eq!(ast.node(assign).depends_on, vec![dep]);
        assert!(ast.node(wrapper).depends_on.is_empty());
    }

    #[test]
    fn test_push_wrapper_is_spliced() {
        let vars = Variables::new();
        let mut ast = Ast::new();
        let root = ast.root();
        let push = ast.add(root, Node::function(function("push").unwrap()));
        let wrapper = ast.add(push, Node::new(NodeType::Compound).with_vector(2));
        let p1 = ast.add(wrapper, Node::constant(BlastOp::Value1));
        let p2 = ast.add(wrapper, Node::constant(BlastOp::Value2));

        normalize(&mut ast, root, &vars).unwrap();

        assert_eq!(ast.children(push), &[p1, p2]);
        assert!(ast.node(push).is_vector);
        assert_eq!(ast.node(push).vector_size, 2);
    }

    #[test]
    fn test_dependency_subtree_is_normalized() {
        let mut vars = Variables::new();
        let a = vars.declare("a", 1);
        let mut ast = Ast::new();
        let root = ast.root();
        let stmt = ast.add(root, Node::new(NodeType::Compound));
        let dep = ast.add_detached(Node::assignment(a));
        let wrapper = ast.add(dep, Node::new(NodeType::Compound));
        let value = ast.add(wrapper, Node::constant(BlastOp::Value4));
        ast.add_dependency(stmt, dep);

        normalize(&mut ast, root, &vars).unwrap();

        assert_eq!(ast.children(dep), &[value]);
    }

    #[test]
    fn test_nested_vector_element_is_reported() {
        let mut vars = Variables::new();
        let a = vars.declare("a", 2);
        let b = vars.declare("b", 1);
        let mut ast = Ast::new();
        let root = ast.root();
        let assign = ast.add(root, Node::assignment(a).with_vector(2));
        let wrapper = ast.add(assign, Node::new(NodeType::Compound).with_vector(2));
        let element = ast.add(wrapper, Node::new(NodeType::Compound));
        ast.add(element, Node::parameter(b));
        ast.add(element, Node::operation(Token::Multiply));
        ast.add(element, Node::constant(BlastOp::Value2));
        ast.add(wrapper, Node::constant(BlastOp::Value1));

        let err = normalize(&mut ast, root, &vars).unwrap_err();

        assert!(matches!(err, CompileError::UnresolvedNesting { .. }));
    }

    #[test]
    fn test_negated_constant_element_is_flat() {
        let mut vars = Variables::new();
        let a = vars.declare("a", 2);
        let mut ast = Ast::new();
        let root = ast.root();
        let assign = ast.add(root, Node::assignment(a).with_vector(2));
        let wrapper = ast.add(assign, Node::new(NodeType::Compound).with_vector(2));
        let negated = ast.add(wrapper, Node::new(NodeType::Compound));
        ast.add(negated, Node::operation(Token::Substract));
        ast.add(negated, Node::constant(BlastOp::Value2));
        ast.add(wrapper, Node::constant(BlastOp::Value1));

        normalize(&mut ast, root, &vars).unwrap();

        assert!(is_negated_constant(&ast, negated, &vars));
        assert_eq!(ast.children(assign).len(), 2);
    }

    #[test]
    fn test_expression_compound_is_not_a_vector_literal() {
        let mut vars = Variables::new();
        let a = vars.declare("a", 1);
        let mut ast = Ast::new();
        let root = ast.root();
        let assign = ast.add(root, Node::assignment(a));
        let wrapper = ast.add(assign, Node::new(NodeType::Compound));
        ast.add(wrapper, Node::constant(BlastOp::Value1));
        ast.add(wrapper, Node::operation(Token::Add));
        ast.add(wrapper, Node::constant(BlastOp::Value2));

        normalize(&mut ast, root, &vars).unwrap();

        assert_eq!(ast.children(assign).len(), 3);
        assert!(!ast.node(assign).is_vector);
    }
}
