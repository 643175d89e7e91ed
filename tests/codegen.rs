/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

mod common;

use common::{compile, compile_with, count, function, has_line, mnemonics};
use ts2panda::CompileOptions;
use ts2panda::ast::*;

fn class_declaration(b: &mut AstBuilder, name: &str, super_class: Option<&str>, members: Vec<ClassMember>) -> Statement {
    let super_class = super_class.map(|name| Box::new(b.ident(name)));
    let class = ClassData {
        id: b.next_id(),
        range: b.range(),
        name: Some(b.identifier(name)),
        super_class,
        members,
        is_expression: false,
    };
    b.node(StatementKind::ClassDeclaration {
        class: Box::new(class),
        export: ExportKind::None,
    })
}

fn method(b: &mut AstBuilder, key: &str, is_static: bool) -> ClassMember {
    let data = b.function(FunctionKind::Method, None, &[], vec![]);
    ClassMember {
        id: b.next_id(),
        range: b.range(),
        key: PropertyKey::Identifier(key.to_string()),
        is_static,
        kind: ClassMemberKind::Method(Box::new(data)),
    }
}

fn declarator(b: &mut AstBuilder, kind: DeclarationKind, target: BindingTarget, init: Option<Expression>) -> VariableDeclaration {
    VariableDeclaration {
        kind,
        declarators: vec![VariableDeclarator {
            id: b.next_id(),
            range: b.range(),
            target,
            init,
        }],
    }
}

// =============================================================================
// Classes
// =============================================================================

#[test]
fn class_declarations_define_classes_from_a_literal_buffer() {
    let mut b = AstBuilder::new();
    let m = method(&mut b, "m", false);
    let s = method(&mut b, "s", true);
    let class = class_declaration(&mut b, "A", None, vec![m, s]);
    let program = b.program(vec![class]);

    let compiled = compile(&program);
    let main = function(&compiled, "func_main_0");
    assert_eq!(count(main, "defineclasswithbuffer"), 1);
    assert_eq!(count(main, "stclasstoglobalrecord"), 1);
    // Both methods fit in the buffer.
    assert_eq!(count(main, "definemethod"), 0);
    assert_eq!(compiled.functions.len(), 4);

    let constructor = function(&compiled, "#*#A");
    assert_eq!(mnemonics(constructor).last(), Some(&"return"));
    assert_eq!(count(constructor, "supercallspread"), 0);
}

#[test]
fn derived_default_constructors_forward_their_arguments() {
    let mut b = AstBuilder::new();
    let base = class_declaration(&mut b, "A", None, vec![]);
    let derived = class_declaration(&mut b, "B", Some("A"), vec![]);
    let program = b.program(vec![base, derived]);

    let compiled = compile(&program);
    let constructor = function(&compiled, "#*#B");
    assert_eq!(constructor.parameter_count, 4);
    let listing = mnemonics(constructor);
    let rest = listing.iter().position(|m| *m == "copyrestargs").unwrap();
    let call = listing.iter().position(|m| *m == "supercallspread").unwrap();
    assert!(rest < call);
    assert!(count(constructor, "throw.ifsupernotcorrectcall") >= 1);
    assert_eq!(listing.last(), Some(&"return"));
}

#[test]
fn derived_constructors_check_super_before_returning() {
    // class B extends A { constructor() { super(); return o; } }
    let mut b = AstBuilder::new();
    let base = class_declaration(&mut b, "A", None, vec![]);
    let call = b.node(ExpressionKind::SuperCall(Vec::new()));
    let call = b.expression_statement(call);
    let o = b.ident("o");
    let ret = b.return_statement(Some(o));
    let data = b.function(FunctionKind::Constructor, None, &[], vec![call, ret]);
    let constructor = ClassMember {
        id: b.next_id(),
        range: b.range(),
        key: PropertyKey::Identifier("constructor".to_string()),
        is_static: false,
        kind: ClassMemberKind::Method(Box::new(data)),
    };
    let derived = class_declaration(&mut b, "B", Some("A"), vec![constructor]);
    let program = b.program(vec![base, derived]);

    let compiled = compile(&program);
    let constructor = function(&compiled, "#*#B");
    let listing = mnemonics(constructor);
    assert_eq!(count(constructor, "supercallthisrange"), 1);
    assert_eq!(count(constructor, "throw.ifsupernotcorrectcall"), 2);
    let call = listing.iter().position(|m| *m == "supercallthisrange").unwrap();
    let compare = listing.iter().position(|m| *m == "stricteq").unwrap();
    assert!(call < compare);
    assert_eq!(listing.last(), Some(&"return"));
}

#[test]
fn computed_members_are_defined_after_the_class() {
    let mut b = AstBuilder::new();
    let data = b.function(FunctionKind::Method, None, &[], vec![]);
    let key = b.ident("k");
    let computed = ClassMember {
        id: b.next_id(),
        range: b.range(),
        key: PropertyKey::Computed(Box::new(key)),
        is_static: false,
        kind: ClassMemberKind::Method(Box::new(data)),
    };
    let class = class_declaration(&mut b, "A", None, vec![computed]);
    let program = b.program(vec![class]);

    let compiled = compile(&program);
    let main = mnemonics(function(&compiled, "func_main_0"));
    let define = main.iter().position(|m| *m == "defineclasswithbuffer").unwrap();
    let method = main.iter().position(|m| *m == "definemethod").unwrap();
    assert!(define < method);
    assert!(main[method..].contains(&"stownbyvalue"));
}

#[test]
fn computed_field_keys_are_evaluated_once_with_the_class() {
    // let k = "x"; class A { [k] = 1; constructor(k) {} }
    let mut b = AstBuilder::new();
    let x = b.string("x");
    let outer = b.declare(DeclarationKind::Let, "k", Some(x));
    let key = b.ident("k");
    let one = b.number(1.0);
    let field = ClassMember {
        id: b.next_id(),
        range: b.range(),
        key: PropertyKey::Computed(Box::new(key)),
        is_static: false,
        kind: ClassMemberKind::Field(Some(Box::new(one))),
    };
    let data = b.function(FunctionKind::Constructor, None, &["k"], vec![]);
    let constructor = ClassMember {
        id: b.next_id(),
        range: b.range(),
        key: PropertyKey::Identifier("constructor".to_string()),
        is_static: false,
        kind: ClassMemberKind::Method(Box::new(data)),
    };
    let class = class_declaration(&mut b, "A", None, vec![field, constructor]);
    let program = b.program(vec![outer, class]);

    let compiled = compile(&program);
    let main = function(&compiled, "func_main_0");
    let listing = mnemonics(main);
    let define = listing.iter().position(|m| *m == "defineclasswithbuffer").unwrap();
    let load = listing.iter().position(|m| *m == "tryldglobalbyname").unwrap();
    assert!(define < load);
    assert_eq!(count(main, "tryldglobalbyname"), 1);
    assert!(has_line(main, "stlexvar 0, 0"));

    let constructor = function(&compiled, "#*#A");
    let listing = mnemonics(constructor);
    assert_eq!(count(constructor, "tryldglobalbyname"), 0);
    assert_eq!(count(constructor, "throw.undefinedifhole"), 0);
    assert!(has_line(constructor, "ldlexvar 0, 0"));
    let key = listing.iter().position(|m| *m == "ldlexvar").unwrap();
    let store = listing.iter().position(|m| *m == "stownbyvalue").unwrap();
    assert!(key < store);
}

// =============================================================================
// Control flow
// =============================================================================

#[test]
fn while_loops_test_then_jump_back() {
    // function f() { let i = 0; while (i < 3) { i = i + 1; } return i; }
    let mut b = AstBuilder::new();
    let zero = b.number(0.0);
    let counter = b.declare(DeclarationKind::Let, "i", Some(zero));
    let i = b.ident("i");
    let three = b.number(3.0);
    let test = b.binary(BinaryOp::Lt, i, three);
    let i = b.ident("i");
    let one = b.number(1.0);
    let sum = b.binary(BinaryOp::Add, i, one);
    let step = b.assign("i", sum);
    let step = b.expression_statement(step);
    let body = b.block_statement(vec![step]);
    let while_loop = b.node(StatementKind::While {
        test,
        body: Box::new(body),
    });
    let i = b.ident("i");
    let ret = b.return_statement(Some(i));
    let f = b.function_declaration("f", &[], vec![counter, while_loop, ret]);
    let program = b.program(vec![f]);

    let compiled = compile(&program);
    let f = function(&compiled, "#*#f");
    let listing = mnemonics(f);
    let less = listing.iter().position(|m| *m == "less").unwrap();
    assert_eq!(listing[less + 1], "jeqz");
    assert_eq!(count(f, "jmp"), 1);
    assert_eq!(count(f, "add2"), 1);
    assert_eq!(listing.last(), Some(&"return"));
}

#[test]
fn returning_a_value_leaves_the_loop_environment() {
    // function f() { let a = 1; while (a) { let c = 2; g = () => c; return a; } }
    let mut b = AstBuilder::new();
    let one = b.number(1.0);
    let outer = b.declare(DeclarationKind::Let, "a", Some(one));
    let two = b.number(2.0);
    let captured = b.declare(DeclarationKind::Let, "c", Some(two));
    let c = b.ident("c");
    let arrow = b.arrow(&[], c);
    let store = b.assign("g", arrow);
    let store = b.expression_statement(store);
    let a = b.ident("a");
    let ret = b.return_statement(Some(a));
    let body = b.block_statement(vec![captured, store, ret]);
    let test = b.ident("a");
    let while_loop = b.node(StatementKind::While {
        test,
        body: Box::new(body),
    });
    let f = b.function_declaration("f", &[], vec![outer, while_loop]);
    let program = b.program(vec![f]);

    let compiled = compile(&program);
    let f = function(&compiled, "#*#f");
    let listing = mnemonics(f);
    let ret = listing.iter().position(|m| *m == "return").unwrap();
    assert_eq!(listing[ret - 1], "poplexenv");
    assert_eq!(count(f, "return"), 1);
    assert_eq!(listing.last(), Some(&"returnundefined"));
}

#[test]
fn finally_blocks_run_on_return_and_on_throw() {
    // function f() { try { return 1; } finally { g(); } }
    let mut b = AstBuilder::new();
    let one = b.number(1.0);
    let ret = b.return_statement(Some(one));
    let block = b.block(vec![ret]);
    let g = b.ident("g");
    let call = b.call(g, vec![]);
    let call = b.expression_statement(call);
    let finalizer = b.block(vec![call]);
    let try_statement = b.node(StatementKind::Try {
        block,
        handler: None,
        finalizer: Some(finalizer),
    });
    let f = b.function_declaration("f", &[], vec![try_statement]);
    let program = b.program(vec![f]);

    let compiled = compile(&program);
    let f = function(&compiled, "#*#f");
    assert_eq!(f.catch_tables.len(), 1);
    assert_eq!(count(f, "callargs"), 2);
    assert_eq!(count(f, "throw"), 1);

    // The inlined copy before `return` is not protected by its own handler.
    assert_eq!(f.catch_tables[0].ranges.len(), 2);
}

#[test]
fn catch_clauses_bind_the_exception() {
    // function f() { try { g(); } catch (e) { return e; } }
    let mut b = AstBuilder::new();
    let g = b.ident("g");
    let call = b.call(g, vec![]);
    let call = b.expression_statement(call);
    let block = b.block(vec![call]);
    let e = b.ident("e");
    let ret = b.return_statement(Some(e));
    let body = b.block(vec![ret]);
    let handler = CatchClause {
        id: b.next_id(),
        range: b.range(),
        param: Some(BindingTarget::Identifier(b.identifier("e"))),
        body,
    };
    let try_statement = b.node(StatementKind::Try {
        block,
        handler: Some(handler),
        finalizer: None,
    });
    let f = b.function_declaration("f", &[], vec![try_statement]);
    let program = b.program(vec![f]);

    let compiled = compile(&program);
    let f = function(&compiled, "#*#f");
    assert_eq!(f.catch_tables.len(), 1);
    assert_eq!(f.catch_tables[0].ranges.len(), 1);
    // The handler starts by storing the exception to `e`.
    let listing = mnemonics(f);
    let skip = listing.iter().position(|m| *m == "jmp").unwrap();
    assert_eq!(listing[skip + 1], "sta");
    assert_eq!(count(f, "return"), 1);
}

#[test]
fn for_of_closes_the_iterator_on_abrupt_exit() {
    // function f(xs) { for (const v of xs) { v; } }
    let mut b = AstBuilder::new();
    let target = BindingTarget::Identifier(b.identifier("v"));
    let declaration = declarator(&mut b, DeclarationKind::Const, target, None);
    let xs = b.ident("xs");
    let v = b.ident("v");
    let v = b.expression_statement(v);
    let body = b.block_statement(vec![v]);
    let for_of = b.node(StatementKind::ForOf {
        lhs: ForInOfLhs::Declaration(declaration),
        rhs: xs,
        body: Box::new(body),
    });
    let f = b.function_declaration("f", &["xs"], vec![for_of]);
    let program = b.program(vec![f]);

    let compiled = compile(&program);
    let f = function(&compiled, "#*#f");
    assert_eq!(count(f, "getiterator"), 1);
    assert_eq!(count(f, "throw.ifnotobject"), 1);
    assert_eq!(count(f, "closeiterator"), 1);
    assert_eq!(f.catch_tables.len(), 1);
}

#[test]
fn labelled_breaks_leave_the_outer_loop() {
    // outer: while (a) { while (b) { break outer; } }
    let mut b = AstBuilder::new();
    let inner_test = b.ident("b");
    let exit = b.node(StatementKind::Break(Some("outer".to_string())));
    let inner_body = b.block_statement(vec![exit]);
    let inner = b.node(StatementKind::While {
        test: inner_test,
        body: Box::new(inner_body),
    });
    let outer_test = b.ident("a");
    let outer_body = b.block_statement(vec![inner]);
    let outer = b.node(StatementKind::While {
        test: outer_test,
        body: Box::new(outer_body),
    });
    let labelled = b.node(StatementKind::Labelled {
        label: "outer".to_string(),
        body: Box::new(outer),
    });
    let program = b.program(vec![labelled]);

    let compiled = compile(&program);
    let main = function(&compiled, "func_main_0");
    // Two back edges and the break.
    assert_eq!(count(main, "jmp"), 3);
}

// =============================================================================
// Temporaries
// =============================================================================

#[test]
fn temporaries_are_released_by_every_construct() {
    // function f(xs, o) {
    //     let [p, q] = xs;
    //     g(...xs);
    //     o.k += p ?? q;
    //     return { [p]: q, r: 1 };
    // }
    let mut b = AstBuilder::new();

    let p = BindingTarget::Identifier(b.identifier("p"));
    let q = BindingTarget::Identifier(b.identifier("q"));
    let pattern = BindingPattern {
        id: b.next_id(),
        range: b.range(),
        kind: PatternKind::Array,
        elements: vec![
            BindingElement {
                key: None,
                target: Some(p),
                default: None,
                is_rest: false,
            },
            BindingElement {
                key: None,
                target: Some(q),
                default: None,
                is_rest: false,
            },
        ],
    };
    let xs = b.ident("xs");
    let destructure = declarator(
        &mut b,
        DeclarationKind::Let,
        BindingTarget::Pattern(Box::new(pattern)),
        Some(xs),
    );
    let destructure = b.node(StatementKind::Variable {
        declaration: destructure,
        exported: false,
    });

    let g = b.ident("g");
    let xs = b.ident("xs");
    let spread = b.node(ExpressionKind::Spread(Box::new(xs)));
    let call = b.call(g, vec![spread]);
    let call = b.expression_statement(call);

    let o = b.ident("o");
    let member = b.member(o, "k");
    let lhs = b.ident("p");
    let rhs = b.ident("q");
    let nullish = b.node(ExpressionKind::Logical {
        op: LogicalOp::Nullish,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    });
    let compound = b.node(ExpressionKind::Assignment {
        op: AssignmentOp::Compound(BinaryOp::Add),
        target: AssignmentTarget::Simple(Box::new(member)),
        value: Box::new(nullish),
    });
    let compound = b.expression_statement(compound);

    let key = b.ident("p");
    let value = b.ident("q");
    let one = b.number(1.0);
    let object = b.node(ExpressionKind::Object(vec![
        ObjectProperty::KeyValue {
            key: PropertyKey::Computed(Box::new(key)),
            value,
        },
        ObjectProperty::KeyValue {
            key: PropertyKey::Identifier("r".to_string()),
            value: one,
        },
    ]));
    let ret = b.return_statement(Some(object));

    let f = b.function_declaration("f", &["xs", "o"], vec![destructure, call, compound, ret]);
    let program = b.program(vec![f]);

    let compiled = compile(&program);
    let f = function(&compiled, "#*#f");
    assert_eq!(count(f, "callspread"), 1);
    assert_eq!(count(f, "getiterator"), 1);
    assert_eq!(count(f, "stobjbyname"), 1);
    assert!(f.register_count >= 5);
}

// =============================================================================
// Debug information
// =============================================================================

#[test]
fn debug_mode_records_bounds_and_variables() {
    let mut b = AstBuilder::new();
    b.at(2, 4);
    let one = b.number(1.0);
    let declaration = b.declare(DeclarationKind::Let, "x", Some(one));
    b.at(3, 4);
    let x = b.ident("x");
    let ret = b.return_statement(Some(x));
    b.at(1, 0);
    let f = b.function_declaration("f", &[], vec![declaration, ret]);
    let program = b.program(vec![f]);

    let options = CompileOptions {
        debug_mode: true,
        ..CompileOptions::default()
    };
    let compiled = compile_with(&program, &options);
    let f = function(&compiled, "#*#f");

    let mut offset = 0;
    for emitted in &f.instructions {
        assert_eq!(emitted.debug.bound_left, offset);
        offset = emitted.debug.bound_right;
    }
    assert!(offset > 0);
    assert!(f.instructions.iter().any(|emitted| emitted.debug.line == 3));
    assert!(f.variables.iter().any(|variable| variable.name == "x"));
    assert_eq!(count(f, "getunmappedargs"), 1);

    let compiled = compile(&program);
    let f = function(&compiled, "#*#f");
    assert!(f.variables.is_empty());
    assert!(f.instructions.iter().all(|emitted| emitted.debug.bound_right == 0));
    assert_eq!(count(f, "getunmappedargs"), 0);
}
