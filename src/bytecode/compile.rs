use rayon::prelude::*;
use tracing::{debug, trace};

use crate::bytecode::buffer::Buffer;
use crate::bytecode::compile_error::{CompileError, Subject};
use crate::bytecode::op::BlastOp;
use crate::config::CompilerOptions;
use crate::lang::node::{Ast, Node, NodeId, NodeType};
use crate::lang::token::Token;
use crate::lang::variable::Variables;

/// Walks a prepared tree and appends bytecode.
///
/// The emitter only reads the tree and the variable table, so one emitter
/// can serve several threads compiling different statements.
pub struct Emitter<'a> {
    pub(super) ast: &'a Ast,
    pub(super) variables: &'a Variables,
    pub(super) options: &'a CompilerOptions,
}

impl<'a> Emitter<'a> {
    pub fn new(ast: &'a Ast, variables: &'a Variables, options: &'a CompilerOptions) -> Self {
        Self {
            ast,
            variables,
            options,
        }
    }

    pub(super) fn node(&self, id: NodeId) -> &'a Node {
        self.ast.node(id)
    }

    pub(super) fn subject(&self) -> Subject<'a> {
        Subject {
            ast: self.ast,
            variables: Some(self.variables),
        }
    }

    /// Compile a node's dependencies, last first, then the node itself.
    pub fn compile_node(&self, id: NodeId, buf: &mut Buffer) -> Result<(), CompileError> {
        self.compile_dependencies(id, buf)?;
        self.compile_body(id, buf)
    }

    pub fn compile_dependencies(&self, id: NodeId, buf: &mut Buffer) -> Result<(), CompileError> {
        for &dep in self.node(id).depends_on.iter().rev() {
            self.compile_node(dep, buf)?;
        }
        Ok(())
    }

    fn compile_body(&self, id: NodeId, buf: &mut Buffer) -> Result<(), CompileError> {
        let node = self.node(id);
        trace!(node = id.index(), kind = node.node_type.name(), "compile");

        match node.node_type {
            NodeType::Compound
            | NodeType::Condition
            | NodeType::IfThen
            | NodeType::IfElse
            | NodeType::WhileCompound => {
                buf.add_op(BlastOp::Begin);
                for &child in &node.children {
                    self.compile_node(child, buf)?;
                }
                buf.add_op(BlastOp::End);
                Ok(())
            }

            NodeType::Assignment => self.compile_assignment(id, buf),
            NodeType::Function => self.compile_statement_function(id, buf),
            NodeType::Parameter => self.compile_parameter(id, buf, true),
            NodeType::Operation => self.compile_operation(id, buf),
            NodeType::Yield => self.compile_yield(id, buf),

            NodeType::JumpTo => {
                let target = self.identifier(id, "jump_to without a target label")?;
                buf.add_jump(BlastOp::Jump, target);
                Ok(())
            }
            NodeType::Label => {
                let name = self.identifier(id, "label without a name")?;
                buf.add_label(name);
                Ok(())
            }

            NodeType::IfThenElse => self.compile_if(id, buf),
            NodeType::While | NodeType::WhileLoop => self.compile_while(id, buf),

            NodeType::Root => Err(CompileError::internal(format!(
                "root reached as a statement: {}",
                self.subject().describe(id)
            ))),
            NodeType::None => Err(CompileError::internal(format!(
                "untyped node reached the emitter: {}",
                self.subject().describe(id)
            ))),
            NodeType::Index
            | NodeType::Switch
            | NodeType::SwitchCase
            | NodeType::SwitchDefault
            | NodeType::For => Err(CompileError::internal(format!(
                "{} should have been removed by an earlier pass",
                self.subject().describe(id)
            ))),
        }
    }

    fn identifier(&self, id: NodeId, missing: &str) -> Result<&'a str, CompileError> {
        let identifier = self.node(id).identifier.as_str();
        if identifier.is_empty() {
            return Err(CompileError::malformed(self.subject(), id, missing));
        }
        Ok(identifier)
    }

    /// A function used as a statement: only procedures are allowed at the
    /// root, and debug output may be left out entirely.
    fn compile_statement_function(&self, id: NodeId, buf: &mut Buffer) -> Result<(), CompileError> {
        let function = self.function_of(id)?;

        if self.ast.parent(id) == Some(self.ast.root()) && !function.is_root_procedure() {
            return Err(CompileError::structural_with_hint(
                self.subject(),
                id,
                format!("function '{}' cannot be used as a statement", function.name),
                "assign the result to a variable or push it",
            ));
        }

        if function.is_debug() && !self.options.include_debug_functions {
            debug!(function = function.name, "skipping debug statement");
            return Ok(());
        }

        self.compile_function(id, buf)
    }

    fn compile_assignment(&self, id: NodeId, buf: &mut Buffer) -> Result<(), CompileError> {
        let destination = self.destination_byte(id)?;
        let node = self.node(id);
        let children = node.children.as_slice();

        if children.is_empty() {
            return Err(CompileError::malformed(self.subject(), id, "assignment without a value"));
        }

        match children {
            // x = 1;
            [only] if self.is_single_value(*only) => {
                buf.add_op(BlastOp::Assigns);
                buf.add(destination);
                self.compile_single_value(*only, buf)
            }

            // x = sqrt(4);
            [only] if self.is_plain_call(*only) => {
                let function = self.function_of(*only)?;
                buf.add_op(if function.is_extended() {
                    BlastOp::Assignfe
                } else {
                    BlastOp::Assignf
                });
                buf.add(destination);
                self.compile_call(*only, function, buf, false)
            }

            // x = -sqrt(4);
            [sign, call] if self.is_negation(*sign) && self.is_plain_call(*call) => {
                let function = self.function_of(*call)?;
                buf.add_op(if function.is_extended() {
                    BlastOp::Assignfen
                } else {
                    BlastOp::Assignfn
                });
                buf.add(destination);
                self.compile_call(*call, function, buf, false)
            }

            // x = (1 2 3 4);
            _ if self.is_flat_vector(id) && self.fills_destination(id) => {
                buf.add_op(BlastOp::Assignv);
                buf.add(destination);
                for &child in children {
                    self.compile_parameter(child, buf, false)?;
                }
                Ok(())
            }

            _ => {
                buf.add_op(BlastOp::Assign);
                buf.add(destination);
                self.compile_operation_list(children, buf)?;
                buf.add_op(BlastOp::Nop);
                Ok(())
            }
        }
    }

    /// A simplex parameter, or a bare `pop` call.
    fn is_single_value(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.is_simplex()
            || (node.is_function()
                && node.children.is_empty()
                && node.function.is_some_and(|f| f.is_pop()))
    }

    fn compile_single_value(&self, id: NodeId, buf: &mut Buffer) -> Result<(), CompileError> {
        if self.node(id).node_type == NodeType::Function {
            buf.add_op(BlastOp::Pop);
            return Ok(());
        }
        self.compile_parameter(id, buf, true)
    }

    /// Function call that can be assigned directly: not a stack function.
    fn is_plain_call(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.is_function() && node.function.is_some_and(|f| !f.is_stack_function())
    }

    fn is_negation(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.is_operation() && node.token.is_some_and(Token::is_negation)
    }

    /// Element sizes add up to the destination's vector size.
    fn fills_destination(&self, id: NodeId) -> bool {
        let Some(target) = self.node(id).variable.and_then(|v| self.variables.get(v)) else {
            return false;
        };
        let total: usize = self
            .node(id)
            .children
            .iter()
            .map(|c| {
                self.node(*c)
                    .variable
                    .and_then(|v| self.variables.get(v))
                    .map_or(1, |v| v.slots())
            })
            .sum();
        total == target.slots()
    }

    fn compile_yield(&self, id: NodeId, buf: &mut Buffer) -> Result<(), CompileError> {
        if !self.options.support_yield {
            return Err(CompileError::structural_with_hint(
                self.subject(),
                id,
                "yield is not supported by this compilation",
                "enable support_yield in the compiler options",
            ));
        }

        buf.add_op(BlastOp::Yield);
        match self.node(id).children.as_slice() {
            [] => {
                buf.add_op(BlastOp::Value0);
                Ok(())
            }
            [frames] => match self.node(*frames).node_type {
                NodeType::Function => self.compile_function(*frames, buf),
                _ => self.compile_parameter(*frames, buf, true),
            },
            children => Err(CompileError::arity(self.subject(), id, 0, 1, children.len())),
        }
    }

    /// `label(cond) [cond deps] jz→exit (cond) (body) jump_back→cond label(exit)`
    fn compile_while(&self, id: NodeId, buf: &mut Buffer) -> Result<(), CompileError> {
        let condition = self
            .ast
            .child_of_type(id, NodeType::Condition)
            .ok_or_else(|| {
                CompileError::malformed(self.subject(), id, "while without a condition")
            })?;
        let body = self
            .ast
            .child_of_type(id, NodeType::WhileCompound)
            .ok_or_else(|| CompileError::malformed(self.subject(), id, "while without a body"))?;

        let start = self.identifier(condition, "loop condition has no identifier")?;
        let exit = self.identifier(body, "loop body has no identifier")?;

        buf.add_label(start);
        self.compile_dependencies(condition, buf)?;
        buf.add_jump(BlastOp::Jz, exit);
        self.compile_body(condition, buf)?;
        self.compile_node(body, buf)?;
        buf.add_jump(BlastOp::JumpBack, start);
        buf.add_label(exit);

        Ok(())
    }

    fn compile_if(&self, id: NodeId, buf: &mut Buffer) -> Result<(), CompileError> {
        let condition = self
            .ast
            .child_of_type(id, NodeType::Condition)
            .ok_or_else(|| CompileError::malformed(self.subject(), id, "if without a condition"))?;
        let then_branch = self.ast.child_of_type(id, NodeType::IfThen);
        let else_branch = self.ast.child_of_type(id, NodeType::IfElse);

        self.compile_dependencies(condition, buf)?;

        match (then_branch, else_branch) {
            (Some(then_branch), Some(else_branch)) => {
                let else_label = self.identifier(else_branch, "else branch has no identifier")?;
                let end_label = self.identifier(id, "if statement has no identifier")?;

                buf.add_jump(BlastOp::Jz, else_label);
                self.compile_body(condition, buf)?;
                self.compile_node(then_branch, buf)?;
                buf.add_jump(BlastOp::Jump, end_label);
                buf.add_label(else_label);
                self.compile_node(else_branch, buf)?;
                buf.add_label(end_label);
            }
            (Some(then_branch), None) => {
                let end_label = self.identifier(then_branch, "then branch has no identifier")?;

                buf.add_jump(BlastOp::Jz, end_label);
                self.compile_body(condition, buf)?;
                self.compile_node(then_branch, buf)?;
                buf.add_label(end_label);
            }
            (None, Some(else_branch)) => {
                let end_label = self.identifier(else_branch, "else branch has no identifier")?;

                // no then branch to skip: jump past the else when the condition holds
                buf.add_jump(BlastOp::Jnz, end_label);
                self.compile_body(condition, buf)?;
                self.compile_node(else_branch, buf)?;
                buf.add_label(end_label);
            }
            (None, None) => {
                return Err(CompileError::malformed(
                    self.subject(),
                    id,
                    "if without a then or else branch",
                ));
            }
        }

        Ok(())
    }
}

/// Compile every statement under the root and terminate with `nop`.
///
/// With `parallel_compilation` each statement goes into its own segment on
/// the rayon pool; segments are joined in statement order.
pub fn compile_program(
    ast: &Ast,
    variables: &Variables,
    options: &CompilerOptions,
) -> Result<Buffer, CompileError> {
    let emitter = Emitter::new(ast, variables, options);
    let root = ast.root();
    let statements = ast.children(root);

    let mut head = Buffer::new();
    emitter.compile_dependencies(root, &mut head)?;

    if !options.parallel_compilation {
        let mut buffer = head;
        for &statement in statements {
            emitter.compile_node(statement, &mut buffer)?;
        }
        buffer.add_op(BlastOp::Nop);
        debug!(statements = statements.len(), bytes = buffer.len(), "compiled program");
        return Ok(buffer);
    }

    let results: Vec<Result<Buffer, CompileError>> = statements
        .par_iter()
        .map(|&statement| {
            let mut segment = Buffer::new();
            emitter.compile_node(statement, &mut segment)?;
            Ok(segment)
        })
        .collect();

    let mut segments = Vec::with_capacity(results.len() + 2);
    segments.push(head);
    for result in results {
        segments.push(result?);
    }

    let mut terminator = Buffer::new();
    terminator.add_op(BlastOp::Nop);
    segments.push(terminator);

    let buffer = Buffer::from_segments(segments);
    debug!(
        statements = statements.len(),
        bytes = buffer.len(),
        "compiled program in parallel segments"
    );
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::buffer::JumpLabelKind;
    use crate::bytecode::op::function;
    use crate::bytecode::prepare::ensure_unique_identifiers;
    use crate::lang::variable::VariableId;

    fn compile(ast: &Ast, vars: &Variables) -> Buffer {
        compile_program(ast, vars, &CompilerOptions::default()).unwrap()
    }

    fn var_byte(vars: &Variables, id: VariableId) -> u8 {
        u8::try_from(vars.get(id).unwrap().offset.unwrap()).unwrap() + 128
    }

    #[test]
    fn test_generic_assignment() {
        // a = 1 + 2;
        let mut vars = Variables::new();
        let a = vars.declare("a", 1);
        vars.calculate_offsets();
        let mut ast = Ast::new();
        let root = ast.root();
        let assign = ast.add(root, Node::assignment(a));
        ast.add(assign, Node::constant(BlastOp::Value1));
        ast.add(assign, Node::operation(Token::Add));
        ast.add(assign, Node::constant(BlastOp::Value2));

        let buffer = compile(&ast, &vars);

        assert_eq!(
            buffer.bytes(),
            &[
                BlastOp::Assign.byte(),
                var_byte(&vars, a),
                BlastOp::Value1.byte(),
                BlastOp::Add.byte(),
                BlastOp::Value2.byte(),
                BlastOp::Nop.byte(),
                BlastOp::Nop.byte(),
            ]
        );
    }

    #[test]
    fn test_assignment_variants() {
        let mut vars = Variables::new();
        let x = vars.declare("x", 1);
        let v = vars.declare("v", 4);
        vars.calculate_offsets();
        let mut ast = Ast::new();
        let root = ast.root();

        // x = 1;
        let single = ast.add(root, Node::assignment(x));
        ast.add(single, Node::constant(BlastOp::Value1));

        // x = sqrt(4);
        let call = ast.add(root, Node::assignment(x));
        let sqrt = ast.add(call, Node::function(function("sqrt").unwrap()));
        ast.add(sqrt, Node::constant(BlastOp::Value4));

        // x = -sqrt(4);
        let negated = ast.add(root, Node::assignment(x));
        ast.add(negated, Node::operation(Token::Substract));
        let sqrt = ast.add(negated, Node::function(function("sqrt").unwrap()));
        ast.add(sqrt, Node::constant(BlastOp::Value4));

        // v = (1 2 3 4);
        let vector = ast.add(root, Node::assignment(v).with_vector(4));
        for op in [BlastOp::Value1, BlastOp::Value2, BlastOp::Value3, BlastOp::Value4] {
            ast.add(vector, Node::constant(op));
        }

        let options = CompilerOptions::default();
        let emitter = Emitter::new(&ast, &vars, &options);
        let first_byte = |id| {
            let mut buf = Buffer::new();
            emitter.compile_node(id, &mut buf).unwrap();
            buf.bytes()[0]
        };

        assert_eq!(first_byte(single), BlastOp::Assigns.byte());
        assert_eq!(first_byte(call), BlastOp::Assignf.byte());
        assert_eq!(first_byte(negated), BlastOp::Assignfn.byte());
        assert_eq!(first_byte(vector), BlastOp::Assignv.byte());
    }

    #[test]
    fn test_extended_function_assignment_drops_prefix() {
        let mut vars = Variables::new();
        let x = vars.declare("x", 1);
        let y = vars.declare("y", 1);
        vars.calculate_offsets();
        let mut ast = Ast::new();
        let root = ast.root();
        let assign = ast.add(root, Node::assignment(x));
        ast.add(assign, Node::operation(Token::Substract));
        let pow = ast.add(assign, Node::function(function("pow").unwrap()));
        ast.add(pow, Node::parameter(y));
        ast.add(pow, Node::constant(BlastOp::Value2));

        let options = CompilerOptions::default();
        let emitter = Emitter::new(&ast, &vars, &options);
        let mut buf = Buffer::new();
        emitter.compile_node(assign, &mut buf).unwrap();

        assert_eq!(
            buf.bytes(),
            &[
                BlastOp::Assignfen.byte(),
                var_byte(&vars, x),
                3,
                var_byte(&vars, y),
                BlastOp::Value2.byte(),
            ]
        );
    }

    #[test]
    fn test_vector_size_mismatch_falls_back_to_generic() {
        let mut vars = Variables::new();
        let v = vars.declare("v", 3);
        vars.calculate_offsets();
        let mut ast = Ast::new();
        let root = ast.root();
        let assign = ast.add(root, Node::assignment(v).with_vector(2));
        ast.add(assign, Node::constant(BlastOp::Value1));
        ast.add(assign, Node::constant(BlastOp::Value2));

        let options = CompilerOptions::default();
        let emitter = Emitter::new(&ast, &vars, &options);
        let mut buf = Buffer::new();
        emitter.compile_node(assign, &mut buf).unwrap();

        assert_eq!(buf.bytes()[0], BlastOp::Assign.byte());
        assert_eq!(buf.last(), Some(BlastOp::Nop.byte()));
    }

    #[test]
    fn test_assignment_to_constant_is_rejected() {
        let mut vars = Variables::new();
        let c = vars.declare_constant(3.5);
        vars.calculate_offsets();
        let mut ast = Ast::new();
        let root = ast.root();
        let assign = ast.add(root, Node::assignment(c));
        ast.add(assign, Node::constant(BlastOp::Value1));

        let err = compile_program(&ast, &vars, &CompilerOptions::default()).unwrap_err();
        assert!(matches!(err, CompileError::Structural { .. }));
    }

    fn while_loop(vars: &mut Variables) -> (Ast, NodeId, NodeId) {
        // while (i < 10) (i = i + 1;)
        let i = vars.declare("i", 1);
        vars.calculate_offsets();
        let mut ast = Ast::new();
        let root = ast.root();
        let while_node = ast.add(root, Node::new(NodeType::While));
        let condition = ast.add(while_node, Node::new(NodeType::Condition));
        ast.add(condition, Node::parameter(i));
        ast.add(condition, Node::operation(Token::SmallerThen));
        ast.add(condition, Node::constant(BlastOp::Value10));
        let body = ast.add(while_node, Node::new(NodeType::WhileCompound));
        let step = ast.add(body, Node::assignment(i));
        ast.add(step, Node::parameter(i));
        ast.add(step, Node::operation(Token::Add));
        ast.add(step, Node::constant(BlastOp::Value1));
        // keep the loop away from the terminator
        let tail = ast.add(root, Node::assignment(i));
        ast.add(tail, Node::constant(BlastOp::Value0));
        ensure_unique_identifiers(&mut ast);
        (ast, condition, body)
    }

    #[test]
    fn test_while_loop_layout() {
        let mut vars = Variables::new();
        let (ast, condition, body) = while_loop(&mut vars);
        let start = ast.node(condition).identifier.clone();
        let exit = ast.node(body).identifier.clone();
        assert_ne!(start, exit);

        let buffer = compile(&ast, &vars);
        let annotated: Vec<(usize, JumpLabelKind, String)> = buffer
            .labels()
            .map(|(i, l)| (i, l.kind, l.name.clone()))
            .collect();

        // label, jz + offset, condition (5 bytes), body (8 bytes), jump_back + offset, label
        assert_eq!(
            annotated,
            vec![
                (0, JumpLabelKind::Label, start.clone()),
                (1, JumpLabelKind::Jump, exit.clone()),
                (2, JumpLabelKind::Offset, exit.clone()),
                (16, JumpLabelKind::Jump, start.clone()),
                (17, JumpLabelKind::Offset, start.clone()),
                (18, JumpLabelKind::Label, exit.clone()),
            ]
        );
        assert_eq!(buffer.bytes()[1], BlastOp::Jz.byte());
        assert_eq!(buffer.bytes()[3], BlastOp::Begin.byte());
        assert_eq!(buffer.bytes()[16], BlastOp::JumpBack.byte());
    }

    #[test]
    fn test_loop_identifiers_are_stable() {
        let mut first_vars = Variables::new();
        let (first, _, _) = while_loop(&mut first_vars);
        let mut second_vars = Variables::new();
        let (second, _, _) = while_loop(&mut second_vars);

        assert_eq!(compile(&first, &first_vars), compile(&second, &second_vars));
    }

    #[test]
    fn test_while_without_condition_is_malformed() {
        let mut vars = Variables::new();
        vars.calculate_offsets();
        let mut ast = Ast::new();
        let root = ast.root();
        let while_node = ast.add(root, Node::new(NodeType::While));
        ast.add(while_node, Node::new(NodeType::WhileCompound).with_identifier("body"));

        let err = compile_program(&ast, &vars, &CompilerOptions::default()).unwrap_err();
        assert!(matches!(err, CompileError::Malformed { .. }));
    }

    #[test]
    fn test_if_shapes() {
        let mut vars = Variables::new();
        let a = vars.declare("a", 1);
        vars.calculate_offsets();

        let build = |then: bool, otherwise: bool| {
            let mut ast = Ast::new();
            let root = ast.root();
            let node = ast.add(root, Node::new(NodeType::IfThenElse));
            let condition = ast.add(node, Node::new(NodeType::Condition));
            ast.add(condition, Node::parameter(a));
            let then_branch = then.then(|| {
                let branch = ast.add(node, Node::new(NodeType::IfThen));
                let assign = ast.add(branch, Node::assignment(a));
                ast.add(assign, Node::constant(BlastOp::Value1));
                branch
            });
            let else_branch = otherwise.then(|| {
                let branch = ast.add(node, Node::new(NodeType::IfElse));
                let assign = ast.add(branch, Node::assignment(a));
                ast.add(assign, Node::constant(BlastOp::Value2));
                branch
            });
            ensure_unique_identifiers(&mut ast);
            (ast, node, then_branch, else_branch)
        };
        let annotations = |ast: &Ast| -> Vec<(usize, JumpLabelKind, String)> {
            compile(ast, &vars)
                .labels()
                .map(|(i, l)| (i, l.kind, l.name.clone()))
                .collect()
        };
        let name = |ast: &Ast, id: Option<NodeId>| ast.node(id.unwrap()).identifier.clone();

        // jz + offset, condition (3 bytes), then (5 bytes), jump + offset, label, else, label
        let (ast, node, _, else_branch) = build(true, true);
        let end = ast.node(node).identifier.clone();
        let other = name(&ast, else_branch);
        assert_ne!(end, other);
        assert_eq!(
            annotations(&ast),
            vec![
                (0, JumpLabelKind::Jump, other.clone()),
                (1, JumpLabelKind::Offset, other.clone()),
                (10, JumpLabelKind::Jump, end.clone()),
                (11, JumpLabelKind::Offset, end.clone()),
                (12, JumpLabelKind::Label, other.clone()),
                (18, JumpLabelKind::Label, end.clone()),
            ]
        );
        let buffer = compile(&ast, &vars);
        assert_eq!(buffer.bytes()[0], BlastOp::Jz.byte());
        assert_eq!(buffer.bytes()[10], BlastOp::Jump.byte());

        let (ast, _, then_branch, _) = build(true, false);
        let skip = name(&ast, then_branch);
        assert_eq!(
            annotations(&ast),
            vec![
                (0, JumpLabelKind::Jump, skip.clone()),
                (1, JumpLabelKind::Offset, skip.clone()),
                (10, JumpLabelKind::Label, skip.clone()),
            ]
        );
        assert_eq!(compile(&ast, &vars).bytes()[0], BlastOp::Jz.byte());

        let (ast, _, _, else_branch) = build(false, true);
        let skip = name(&ast, else_branch);
        assert_eq!(
            annotations(&ast),
            vec![
                (0, JumpLabelKind::Jump, skip.clone()),
                (1, JumpLabelKind::Offset, skip.clone()),
                (10, JumpLabelKind::Label, skip.clone()),
            ]
        );
        assert_eq!(compile(&ast, &vars).bytes()[0], BlastOp::Jnz.byte());

        let (ast, _, _, _) = build(false, false);
        let err = compile_program(&ast, &vars, &CompilerOptions::default()).unwrap_err();
        assert!(matches!(err, CompileError::Malformed { .. }));
    }

    #[test]
    fn test_dependencies_compile_first_in_reverse() {
        let mut vars = Variables::new();
        let a = vars.declare("a", 1);
        let b = vars.declare("b", 1);
        vars.calculate_offsets();
        let mut ast = Ast::new();
        let root = ast.root();
        let stmt = ast.add(root, Node::assignment(a));
        ast.add(stmt, Node::parameter(b));
        let first = ast.add_detached(Node::assignment(b));
        ast.add(first, Node::constant(BlastOp::Value1));
        let second = ast.add_detached(Node::assignment(b));
        ast.add(second, Node::constant(BlastOp::Value2));
        ast.add_dependency(stmt, first);
        ast.add_dependency(stmt, second);

        let buffer = compile(&ast, &vars);

        let b_byte = var_byte(&vars, b);
        assert_eq!(
            &buffer.bytes()[..6],
            &[
                BlastOp::Assigns.byte(),
                b_byte,
                BlastOp::Value2.byte(),
                BlastOp::Assigns.byte(),
                b_byte,
                BlastOp::Value1.byte(),
            ]
        );
    }

    #[test]
    fn test_root_function_allow_list() {
        let mut vars = Variables::new();
        let a = vars.declare("a", 1);
        vars.calculate_offsets();

        let mut ast = Ast::new();
        let root = ast.root();
        let sqrt = ast.add(root, Node::function(function("sqrt").unwrap()));
        ast.add(sqrt, Node::parameter(a));
        let err = compile_program(&ast, &vars, &CompilerOptions::default()).unwrap_err();
        assert!(matches!(err, CompileError::Structural { .. }));

        let mut ast = Ast::new();
        let root = ast.root();
        let seed = ast.add(root, Node::function(function("seed").unwrap()));
        ast.add(seed, Node::parameter(a));
        let buffer = compile(&ast, &vars);
        assert_eq!(buffer.bytes(), &[BlastOp::Seed.byte(), 128, BlastOp::Nop.byte()]);
    }

    #[test]
    fn test_debug_statements_can_be_skipped() {
        let mut vars = Variables::new();
        let a = vars.declare("a", 1);
        vars.calculate_offsets();
        let mut ast = Ast::new();
        let root = ast.root();
        let debug = ast.add(root, Node::function(function("debug").unwrap()));
        ast.add(debug, Node::parameter(a));

        let included = compile(&ast, &vars);
        assert_eq!(
            included.bytes(),
            &[BlastOp::ExOp.byte(), 1, 1, 128, BlastOp::Nop.byte()]
        );

        let mut options = CompilerOptions::default();
        options.include_debug_functions = false;
        let skipped = compile_program(&ast, &vars, &options).unwrap();
        assert_eq!(skipped.bytes(), &[BlastOp::Nop.byte()]);
    }

    #[test]
    fn test_yield_requires_support() {
        let mut vars = Variables::new();
        vars.calculate_offsets();
        let mut ast = Ast::new();
        let root = ast.root();
        ast.add(root, Node::new(NodeType::Yield));

        let err = compile_program(&ast, &vars, &CompilerOptions::default()).unwrap_err();
        assert!(err.hint().is_some());

        let options = CompilerOptions::default().with_yield(true);
        let buffer = compile_program(&ast, &vars, &options).unwrap();
        assert_eq!(
            buffer.bytes(),
            &[BlastOp::Yield.byte(), BlastOp::Value0.byte(), BlastOp::Nop.byte()]
        );
    }

    #[test]
    fn test_jump_to_and_label() {
        let vars = Variables::new();
        let mut ast = Ast::new();
        let root = ast.root();
        ast.add(root, Node::new(NodeType::Label).with_identifier("top"));
        ast.add(root, Node::new(NodeType::JumpTo).with_identifier("top"));

        let buffer = compile(&ast, &vars);

        assert_eq!(
            buffer.bytes(),
            &[BlastOp::Nop.byte(), BlastOp::Jump.byte(), 0, BlastOp::Nop.byte()]
        );
        assert_eq!(buffer.find_label("top"), Some(0));
    }

    #[test]
    fn test_transform_only_node_is_internal_error() {
        let vars = Variables::new();
        let mut ast = Ast::new();
        let root = ast.root();
        ast.add(root, Node::new(NodeType::Switch));

        let err = compile_program(&ast, &vars, &CompilerOptions::default()).unwrap_err();
        assert!(matches!(err, CompileError::Internal(_)));
    }

    #[test]
    fn test_program_ends_with_single_terminator() {
        let mut vars = Variables::new();
        let a = vars.declare("a", 1);
        vars.calculate_offsets();
        let mut ast = Ast::new();
        let root = ast.root();
        let assign = ast.add(root, Node::assignment(a));
        ast.add(assign, Node::constant(BlastOp::Value3));

        let buffer = compile(&ast, &vars);

        assert_eq!(buffer.last(), Some(BlastOp::Nop.byte()));
        assert_eq!(buffer.bytes(), &[BlastOp::Assigns.byte(), 128, BlastOp::Value3.byte(), 0]);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut vars = Variables::new();
        let (ast, _, _) = while_loop(&mut vars);

        let sequential = compile(&ast, &vars);
        let parallel = compile_program(
            &ast,
            &vars,
            &CompilerOptions::default().with_parallel_compilation(true),
        )
        .unwrap();

        assert_eq!(sequential, parallel);
        assert_eq!(parallel.last(), Some(BlastOp::Nop.byte()));
    }
}
