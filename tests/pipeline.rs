//! End-to-end compilation scenarios through the public API.

use blast::bytecode::disasm::disassemble;
use blast::bytecode::op::function;
use blast::lang::token::Token;
use blast::{
    Ast, BlastOp, Compilation, CompileError, CompilerOptions, Node, NodeId, NodeType, PackageMode,
    Script, Severity, StackSource, VariableId, compile,
};

fn slot_byte(script: &Script, id: VariableId) -> u8 {
    u8::try_from(script.variables.get(id).unwrap().offset.unwrap()).unwrap() + 128
}

/// a = 1 + 2;
fn addition() -> (Script, VariableId) {
    let mut script = Script::new("addition");
    let a = script.variables.declare("a", 1);
    script.variables.calculate_offsets();
    let root = script.ast.root();
    let assign = script.ast.add(root, Node::assignment(a));
    script.ast.add(assign, Node::constant(BlastOp::Value1));
    script.ast.add(assign, Node::operation(Token::Add));
    script.ast.add(assign, Node::constant(BlastOp::Value2));
    (script, a)
}

/// i = 0; while (i < 10) (i = i + 1;) x = i;
fn counting_loop() -> Script {
    let mut script = Script::new("loop");
    let i = script.variables.declare("i", 1);
    let x = script.variables.declare("x", 1);
    script.variables.calculate_offsets();
    let ast: &mut Ast = &mut script.ast;
    let root = ast.root();

    let init = ast.add(root, Node::assignment(i));
    ast.add(init, Node::constant(BlastOp::Value0));

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

    let tail = ast.add(root, Node::assignment(x));
    ast.add(tail, Node::parameter(i));
    script
}

/// v = (-2, 1);
fn negated_vector() -> (Script, VariableId) {
    let mut script = Script::new("negated");
    let v = script.variables.declare("v", 2);
    script.variables.calculate_offsets();
    let ast = &mut script.ast;
    let root = ast.root();
    let assign = ast.add(root, Node::assignment(v).with_vector(2));
    let minus_two = ast.add(assign, Node::new(NodeType::Compound));
    ast.add(minus_two, Node::operation(Token::Substract));
    ast.add(minus_two, Node::constant(BlastOp::Value2));
    ast.add(assign, Node::constant(BlastOp::Value1));
    (script, v)
}

#[test]
fn test_addition_compiles_to_normal_package() {
    let (script, a) = addition();
    let a_byte = slot_byte(&script, a);

    let compiled = compile(script, CompilerOptions::default()).unwrap();

    assert_eq!(
        compiled.package.code(),
        &[
            BlastOp::Assign.byte(),
            a_byte,
            BlastOp::Value1.byte(),
            BlastOp::Add.byte(),
            BlastOp::Value2.byte(),
            BlastOp::Nop.byte(),
            BlastOp::Nop.byte(),
        ]
    );
    assert_eq!(compiled.package.mode(), PackageMode::Normal);
    assert_eq!(compiled.package.data_values(), vec![0.0]);
    assert_eq!(compiled.stack_source, StackSource::Estimate);
    assert_eq!(compiled.package.sizes().stack, 16);
    // one data slot and four stack slots
    assert_eq!(compiled.package.metadata().len(), 5);
}

#[test]
fn test_loop_keeps_jump_annotations() {
    let compiled = compile(counting_loop(), CompilerOptions::default()).unwrap();
    let bytecode = &compiled.bytecode;

    assert!(bytecode.has_labels());
    assert!(bytecode.bytes().contains(&BlastOp::Jz.byte()));
    assert!(bytecode.bytes().contains(&BlastOp::JumpBack.byte()));
    assert_eq!(bytecode.last(), Some(BlastOp::Nop.byte()));
    // no resolver attached: the package carries the unresolved bytes
    assert_eq!(compiled.package.code(), bytecode.bytes());

    let listing = disassemble(bytecode, None);
    assert!(listing.contains("JZ"));
    assert!(listing.contains("┌──"));
}

#[test]
fn test_parallel_compilation_is_deterministic() {
    let sequential = compile(counting_loop(), CompilerOptions::default()).unwrap();
    let parallel = compile(
        counting_loop(),
        CompilerOptions::default().with_parallel_compilation(true),
    )
    .unwrap();

    assert_eq!(parallel.bytecode, sequential.bytecode);
    assert_eq!(parallel.package, sequential.package);
}

#[test]
fn test_negated_constant_is_folded_once() {
    let (script, _) = negated_vector();
    let mut compilation = Compilation::new(script, CompilerOptions::default());

    let first = compilation.compile_bytecode().unwrap();
    let variables_after_first = compilation.script().variables.len();
    let second = compilation.compile_bytecode().unwrap();

    assert_eq!(first, second);
    assert_eq!(variables_after_first, 2);
    assert_eq!(compilation.script().variables.len(), 2);
    let constant = compilation.script().variables.find("-2").unwrap();
    assert!(constant.is_constant);
    assert_eq!(constant.offset, Some(0));
}

#[test]
fn test_negated_constant_lands_in_normal_data() {
    let (script, _) = negated_vector();

    let compiled = compile(script, CompilerOptions::default()).unwrap();

    assert_eq!(compiled.package.data_values(), vec![-2.0, 0.0, 0.0]);
}

#[test]
fn test_ssmd_inlines_constants() {
    let (script, _) = negated_vector();

    let compiled = compile(script, CompilerOptions::ssmd()).unwrap();
    let package = &compiled.package;

    assert_eq!(package.mode(), PackageMode::Ssmd);
    // only `v` has lane data
    assert_eq!(package.data_values(), vec![0.0, 0.0]);
    assert_eq!(package.sizes().metadata * 4, package.sizes().data + package.sizes().stack);
    assert_eq!(package.shared().len(), package.boundaries().o2 as usize);

    let lanes = package.lane_records(4).unwrap();
    assert_eq!(lanes.len(), 4);
    assert!(lanes.iter().all(|lane| lane == package.record().unwrap()));
}

#[test]
fn test_ssmd_data_references_skip_constants() {
    let mut script = Script::new("offsets");
    script.variables.declare_constant(7.25);
    let a = script.variables.declare("a", 1);
    script.variables.calculate_offsets();
    let root = script.ast.root();
    let assign = script.ast.add(root, Node::assignment(a));
    script.ast.add(assign, Node::constant(BlastOp::Value1));

    let normal = compile(script.clone(), CompilerOptions::default()).unwrap();
    let ssmd = compile(script, CompilerOptions::ssmd()).unwrap();

    assert_eq!(normal.package.code()[1], 129);
    assert_eq!(ssmd.package.code()[1], 128);
}

#[test]
fn test_unsupported_root_function_reports_hint() {
    let mut script = Script::new("bad_root");
    let a = script.variables.declare("a", 1);
    script.variables.calculate_offsets();
    let root = script.ast.root();
    let sqrt = script.ast.add(root, Node::function(function("sqrt").unwrap()));
    script.ast.add(sqrt, Node::parameter(a));
    let mut compilation = Compilation::new(script, CompilerOptions::default());

    let err = compilation.compile().unwrap_err();

    assert!(matches!(err, CompileError::Structural { hint: Some(_), .. }));
    assert_eq!(compilation.diagnostics().with_severity(Severity::Error).count(), 1);
}

#[test]
fn test_single_child_compound_is_collapsed_before_emission() {
    // a = 1 + (3);
    let mut script = Script::new("collapse");
    let a = script.variables.declare("a", 1);
    script.variables.calculate_offsets();
    let root = script.ast.root();
    let assign = script.ast.add(root, Node::assignment(a));
    script.ast.add(assign, Node::constant(BlastOp::Value1));
    script.ast.add(assign, Node::operation(Token::Add));
    let wrapper: NodeId = script.ast.add(assign, Node::new(NodeType::Compound));
    script.ast.add(wrapper, Node::constant(BlastOp::Value3));
    let mut compilation = Compilation::new(script, CompilerOptions::default());

    let compiled = compilation.compile().unwrap();

    assert_eq!(
        compiled.package.code(),
        &[
            BlastOp::Assign.byte(),
            128,
            BlastOp::Value1.byte(),
            BlastOp::Add.byte(),
            BlastOp::Value3.byte(),
            BlastOp::Nop.byte(),
            BlastOp::Nop.byte(),
        ]
    );
    assert_eq!(compilation.diagnostics().with_severity(Severity::Warning).count(), 1);
}
