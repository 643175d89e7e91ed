/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

mod common;

use common::{compile, compile_with, count, function, has_line, mnemonics};
use ts2panda::ast::{AstBuilder, BinaryOp, DeclarationKind, FunctionKind, NoTypes, Program, StatementKind};
use ts2panda::{CompileError, CompileOptions, CompiledFunction, CompiledProgram, compile_program};

/// `function f() { let a = 1; while (a) { { let unused = 0; } g = () => a; } }`
///
/// With `loop_let` the loop body also declares `let c = 2` and the arrow
/// returns `a + c`.
fn closure_in_loop(loop_let: bool) -> Program {
    let mut b = AstBuilder::new();
    let one = b.number(1.0);
    let outer = b.declare(DeclarationKind::Let, "a", Some(one));
    let zero = b.number(0.0);
    let unused = b.declare(DeclarationKind::Let, "unused", Some(zero));
    let block = b.block_statement(vec![unused]);
    let mut body = vec![block];
    let captured = b.ident("a");
    let result = if loop_let {
        let two = b.number(2.0);
        body.push(b.declare(DeclarationKind::Let, "c", Some(two)));
        let c = b.ident("c");
        b.binary(BinaryOp::Add, captured, c)
    } else {
        captured
    };
    let arrow = b.arrow(&[], result);
    let store = b.assign("g", arrow);
    body.push(b.expression_statement(store));
    let body = b.block_statement(body);
    let test = b.ident("a");
    let while_loop = b.node(StatementKind::While {
        test,
        body: Box::new(body),
    });
    let f = b.function_declaration("f", &[], vec![outer, while_loop]);
    b.program(vec![f])
}

fn arrow_of(compiled: &CompiledProgram) -> &CompiledFunction {
    compiled
        .functions
        .iter()
        .find(|f| !["#*#f", "func_main_0"].contains(&f.name.as_str()))
        .unwrap()
}

#[test]
fn function_declarations_are_defined_before_the_first_statement() {
    let mut b = AstBuilder::new();
    let callee = b.ident("x");
    let call = b.call(callee, vec![]);
    let statement = b.expression_statement(call);
    let declaration = b.function_declaration("x", &[], vec![]);
    let program = b.program(vec![statement, declaration]);

    let compiled = compile(&program);
    let main = mnemonics(function(&compiled, "func_main_0"));
    assert_eq!(&main[..2], &["definefunc", "stglobalvar"]);
    let load = main.iter().position(|m| *m == "ldglobalvar").unwrap();
    assert!(load > 1);
    assert_eq!(main.last(), Some(&"returnundefined"));
}

#[test]
fn hoisted_vars_start_out_undefined() {
    let mut b = AstBuilder::new();
    let read = b.ident("v");
    let ret = b.return_statement(Some(read));
    let one = b.number(1.0);
    let declaration = b.declare(DeclarationKind::Var, "v", Some(one));
    let f = b.function_declaration("f", &[], vec![ret, declaration]);
    let program = b.program(vec![f]);

    let compiled = compile(&program);
    let f = function(&compiled, "#*#f");
    assert_eq!(&mnemonics(f)[..2], &["ldundefined", "sta"]);
    assert_eq!(count(f, "throw.undefinedifhole"), 0);
}

#[test]
fn reading_a_let_before_its_declaration_throws() {
    let mut b = AstBuilder::new();
    let early = b.ident("x");
    let early = b.expression_statement(early);
    let one = b.number(1.0);
    let declaration = b.declare(DeclarationKind::Let, "x", Some(one));
    let late = b.ident("x");
    let ret = b.return_statement(Some(late));
    let f = b.function_declaration("f", &[], vec![early, declaration, ret]);
    let program = b.program(vec![f]);

    let compiled = compile(&program);
    let f = function(&compiled, "#*#f");
    let listing = mnemonics(f);
    assert_eq!(count(f, "throw.undefinedifhole"), 1);
    let hole = listing.iter().position(|m| *m == "ldhole").unwrap();
    assert_eq!(listing[hole + 1], "throw.undefinedifhole");
}

#[test]
fn assigning_a_local_const_throws() {
    let mut b = AstBuilder::new();
    let one = b.number(1.0);
    let declaration = b.declare(DeclarationKind::Const, "c", Some(one));
    let two = b.number(2.0);
    let assignment = b.assign("c", two);
    let assignment = b.expression_statement(assignment);
    let f = b.function_declaration("f", &[], vec![declaration, assignment]);
    let program = b.program(vec![f]);

    let compiled = compile(&program);
    let f = function(&compiled, "#*#f");
    assert_eq!(count(f, "throw.constassignment"), 1);
    let listing = mnemonics(f);
    let guard = listing.iter().position(|m| *m == "throw.constassignment").unwrap();
    assert_eq!(&listing[guard - 2..guard], &["lda.str", "sta"]);
}

#[test]
fn top_level_lexical_bindings_live_in_the_global_record() {
    let mut b = AstBuilder::new();
    let one = b.number(1.0);
    let constant = b.declare(DeclarationKind::Const, "c", Some(one));
    let two = b.number(2.0);
    let lexical = b.declare(DeclarationKind::Let, "l", Some(two));
    let three = b.number(3.0);
    let assignment = b.assign("c", three);
    let assignment = b.expression_statement(assignment);
    let program = b.program(vec![constant, lexical, assignment]);

    let compiled = compile(&program);
    let main = function(&compiled, "func_main_0");
    assert_eq!(count(main, "stconsttoglobalrecord"), 1);
    assert_eq!(count(main, "stlettoglobalrecord"), 1);
    assert_eq!(count(main, "throw.constassignment"), 1);
}

#[test]
fn closures_address_environments_by_level() {
    // function outer() {
    //     let a = 1;
    //     function middle() { let b = 2; return () => a + b; }
    //     return middle;
    // }
    let mut b = AstBuilder::new();
    let lhs = b.ident("a");
    let rhs = b.ident("b");
    let sum = b.binary(BinaryOp::Add, lhs, rhs);
    let arrow = b.arrow(&[], sum);
    let two = b.number(2.0);
    let inner_let = b.declare(DeclarationKind::Let, "b", Some(two));
    let inner_return = b.return_statement(Some(arrow));
    let middle = b.function_declaration("middle", &[], vec![inner_let, inner_return]);
    let one = b.number(1.0);
    let outer_let = b.declare(DeclarationKind::Let, "a", Some(one));
    let result = b.ident("middle");
    let outer_return = b.return_statement(Some(result));
    let outer = b.function_declaration("outer", &[], vec![outer_let, middle, outer_return]);
    let program = b.program(vec![outer]);

    let compiled = compile(&program);
    let outer = function(&compiled, "#*#outer");
    assert!(has_line(outer, "newlexenv 1"));
    assert!(has_line(outer, "stlexvar 0, 0"));

    let middle = function(&compiled, "#*#middle");
    assert!(has_line(middle, "newlexenv 1"));

    let arrow = compiled
        .functions
        .iter()
        .find(|f| !["#*#outer", "#*#middle", "func_main_0"].contains(&f.name.as_str()))
        .unwrap();
    assert!(arrow.name.starts_with('#') && arrow.name.ends_with('#'));
    assert!(has_line(arrow, "ldlexvar 1, 0"));
    assert!(has_line(arrow, "ldlexvar 0, 0"));
    assert_eq!(count(arrow, "newlexenv"), 0);
}

#[test]
fn blocks_and_loops_without_captures_add_no_level() {
    let compiled = compile(&closure_in_loop(false));
    let f = function(&compiled, "#*#f");
    assert_eq!(count(f, "newlexenv"), 1);
    let arrow = arrow_of(&compiled);
    assert!(has_line(arrow, "ldlexvar 0, 0"));
    assert_eq!(count(arrow, "ldlexvar"), 1);
}

#[test]
fn loops_with_captured_bindings_add_a_level() {
    let compiled = compile(&closure_in_loop(true));
    let f = function(&compiled, "#*#f");
    assert_eq!(count(f, "newlexenv"), 2);
    let arrow = arrow_of(&compiled);
    assert!(has_line(arrow, "ldlexvar 1, 0"));
    assert!(has_line(arrow, "ldlexvar 0, 0"));
}

#[test]
fn commonjs_roots_take_the_module_wrapper_parameters() {
    let mut b = AstBuilder::new();
    let one = b.number(1.0);
    let declaration = b.declare(DeclarationKind::Let, "x", Some(one));
    let exports = b.ident("exports");
    let exports = b.expression_statement(exports);
    let program = b.program(vec![declaration, exports]);

    let options = CompileOptions {
        commonjs: true,
        ..CompileOptions::default()
    };
    let compiled = compile_with(&program, &options);
    let main = function(&compiled, "func_main_0");
    assert_eq!(main.parameter_count, 8);
    assert_eq!(count(main, "stlettoglobalrecord"), 0);
    assert_eq!(count(main, "tryldglobalbyname"), 0);

    let compiled = compile(&program);
    let main = function(&compiled, "func_main_0");
    assert_eq!(main.parameter_count, 3);
    assert_eq!(count(main, "stlettoglobalrecord"), 1);
    assert_eq!(count(main, "tryldglobalbyname"), 1);
}

#[test]
fn generators_are_rejected() {
    let mut b = AstBuilder::new();
    let generator = b.function(FunctionKind::Generator, Some("g"), &[], vec![]);
    let expression = b.function_expression(generator);
    let statement = b.expression_statement(expression);
    let program = b.program(vec![statement]);

    match compile_program(&program, &CompileOptions::default(), &NoTypes) {
        Err(CompileError::Unsupported { construct, .. }) => assert_eq!(construct, "generator and async functions"),
        other => panic!("unexpected result: {other:?}"),
    }
}
