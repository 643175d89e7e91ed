/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

//! Expression lowering.
//!
//! Every `generate_*` function here leaves the expression's value in the
//! accumulator and returns all temporaries it took.

use rustc_hash::FxHashSet;

use super::class;
use super::codegen::{CodeGen, define_function, define_method, is_global_name, is_unscoped, load_this, load_variable, store_variable};
use super::generator::KeyOperand;
use super::instruction::Instruction;
use super::literal::{Literal, LiteralBuffer};
use super::operand::{Label, Register};
use crate::ast::*;
use crate::error::{CompileError, Result};
use crate::scope::MANDATORY_NEW_TARGET;
use crate::u32_from_usize;

/// How a pattern's targets are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindingMode {
    /// Initializes a declared binding.
    Declaration,
    /// Assigns an existing binding, with TDZ and const checks.
    Assignment,
}

/// A property key after evaluation.
#[derive(Debug, Clone)]
pub(crate) enum EvaluatedKey {
    Name(String),
    Index(u32),
    /// A computed key, held in a temporary.
    Value(Register),
}

impl EvaluatedKey {
    pub(crate) fn operand(&self) -> KeyOperand<'_> {
        match self {
            EvaluatedKey::Name(name) => KeyOperand::Name(name),
            EvaluatedKey::Index(index) => KeyOperand::Index(*index),
            EvaluatedKey::Value(register) => KeyOperand::Value(*register),
        }
    }

    pub(crate) fn free(&self, cg: &mut CodeGen<'_, '_>) {
        if let EvaluatedKey::Value(register) = self {
            cg.bc.free_temps(&[*register]);
        }
    }
}

/// Numeric keys that are array indices use the indexed instructions.
fn numeric_key(value: f64) -> EvaluatedKey {
    if value >= 0.0 && value.fract() == 0.0 && value < f64::from(u32::MAX) {
        EvaluatedKey::Index(value as u32)
    } else {
        EvaluatedKey::Name(format_number(value))
    }
}

pub(crate) fn evaluate_property_key<'a>(key: &'a PropertyKey, cg: &mut CodeGen<'a, '_>) -> Result<EvaluatedKey> {
    Ok(match key {
        PropertyKey::Identifier(name) | PropertyKey::String(name) => EvaluatedKey::Name(name.clone()),
        PropertyKey::Number(value) => numeric_key(*value),
        PropertyKey::Computed(expression) => evaluate_computed_key(expression, cg)?,
    })
}

fn evaluate_computed_key<'a>(expression: &'a Expression, cg: &mut CodeGen<'a, '_>) -> Result<EvaluatedKey> {
    Ok(match &expression.inner {
        ExpressionKind::String(name) => EvaluatedKey::Name(name.clone()),
        ExpressionKind::Number(value) => numeric_key(*value),
        _ => {
            generate_expression(expression, cg)?;
            let key = cg.bc.get_temp();
            cg.bc.store_accumulator(key);
            EvaluatedKey::Value(key)
        }
    })
}

/// Put a key into a temporary, as the by-value instructions expect.
pub(crate) fn key_register(key: EvaluatedKey, cg: &mut CodeGen<'_, '_>) -> Register {
    match key {
        EvaluatedKey::Value(register) => register,
        EvaluatedKey::Name(name) => {
            let register = cg.bc.get_temp();
            cg.bc.load_string(&name);
            cg.bc.store_accumulator(register);
            register
        }
        EvaluatedKey::Index(index) => {
            let register = cg.bc.get_temp();
            cg.bc.load_number(f64::from(index));
            cg.bc.store_accumulator(register);
            register
        }
    }
}

// =============================================================================
// References
// =============================================================================

/// An evaluated assignment target.
pub(crate) enum Reference<'a> {
    Variable(&'a str),
    Property { object: Register, key: EvaluatedKey },
    SuperProperty { this: Register, key: EvaluatedKey },
}

/// Evaluate the object and key parts of an assignment target.
pub(crate) fn evaluate_reference<'a>(target: &'a Expression, cg: &mut CodeGen<'a, '_>) -> Result<Reference<'a>> {
    match &target.inner {
        ExpressionKind::Identifier(ident) => Ok(Reference::Variable(&ident.name)),
        ExpressionKind::Member { object, property } => {
            generate_expression(object, cg)?;
            let object = cg.bc.get_temp();
            cg.bc.store_accumulator(object);
            Ok(Reference::Property {
                object,
                key: EvaluatedKey::Name(property.clone()),
            })
        }
        ExpressionKind::ComputedMember { object, property } => {
            generate_expression(object, cg)?;
            let object = cg.bc.get_temp();
            cg.bc.store_accumulator(object);
            let key = evaluate_computed_key(property, cg)?;
            Ok(Reference::Property { object, key })
        }
        ExpressionKind::SuperMember(property) => {
            load_this(cg)?;
            let this = cg.bc.get_temp();
            cg.bc.store_accumulator(this);
            Ok(Reference::SuperProperty {
                this,
                key: EvaluatedKey::Name(property.clone()),
            })
        }
        ExpressionKind::SuperComputedMember(property) => {
            load_this(cg)?;
            let this = cg.bc.get_temp();
            cg.bc.store_accumulator(this);
            let key = evaluate_computed_key(property, cg)?;
            Ok(Reference::SuperProperty { this, key })
        }
        _ => Err(CompileError::unsupported("assignment to this kind of target", &target.range)),
    }
}

pub(crate) fn load_reference(reference: &Reference<'_>, cg: &mut CodeGen<'_, '_>) -> Result<()> {
    match reference {
        Reference::Variable(name) => load_variable(name, cg)?,
        Reference::Property { object, key } => cg.bc.load_obj_property(*object, key.operand()),
        Reference::SuperProperty { this, key } => load_super_property(*this, key, cg),
    }
    Ok(())
}

/// Store `acc` through `reference`; the value stays in `acc`.
pub(crate) fn store_reference(reference: &Reference<'_>, cg: &mut CodeGen<'_, '_>) -> Result<()> {
    match reference {
        Reference::Variable(name) => store_variable(name, false, cg)?,
        Reference::Property { object, key } => cg.bc.store_obj_property(*object, key.operand()),
        Reference::SuperProperty { this, key } => match key {
            EvaluatedKey::Value(key) => cg.bc.emit(Instruction::StSuperByValue {
                object: *this,
                key: *key,
            }),
            EvaluatedKey::Name(name) => {
                let name = cg.bc.intern(name);
                cg.bc.emit(Instruction::StSuperByName { name, object: *this });
            }
            EvaluatedKey::Index(index) => {
                let name = cg.bc.intern(&index.to_string());
                cg.bc.emit(Instruction::StSuperByName { name, object: *this });
            }
        },
    }
    Ok(())
}

pub(crate) fn free_reference(reference: Reference<'_>, cg: &mut CodeGen<'_, '_>) {
    match reference {
        Reference::Variable(_) => {}
        Reference::Property { object, key } => {
            key.free(cg);
            cg.bc.free_temps(&[object]);
        }
        Reference::SuperProperty { this, key } => {
            key.free(cg);
            cg.bc.free_temps(&[this]);
        }
    }
}

/// `super[key]` with `this` in a register.
fn load_super_property(this: Register, key: &EvaluatedKey, cg: &mut CodeGen<'_, '_>) {
    match key {
        EvaluatedKey::Value(key) => {
            cg.bc.load_accumulator(*key);
            cg.bc.emit(Instruction::LdSuperByValue { object: this });
        }
        EvaluatedKey::Name(name) => {
            let name = cg.bc.intern(name);
            cg.bc.load_accumulator(this);
            cg.bc.emit(Instruction::LdSuperByName { name });
        }
        EvaluatedKey::Index(index) => {
            let name = cg.bc.intern(&index.to_string());
            cg.bc.load_accumulator(this);
            cg.bc.emit(Instruction::LdSuperByName { name });
        }
    }
}

// =============================================================================
// Dispatch
// =============================================================================

pub(crate) fn generate_expression<'a>(expression: &'a Expression, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    match &expression.inner {
        ExpressionKind::Number(value) => cg.bc.load_number(*value),
        ExpressionKind::BigInt(literal) => cg.bc.load_bigint(literal)?,
        ExpressionKind::String(value) => cg.bc.load_string(value),
        ExpressionKind::Boolean(true) => cg.bc.emit(Instruction::LdTrue {}),
        ExpressionKind::Boolean(false) => cg.bc.emit(Instruction::LdFalse {}),
        ExpressionKind::Null => cg.bc.emit(Instruction::LdNull {}),
        ExpressionKind::RegExp { pattern, flags } => generate_regexp(pattern, flags, expression, cg)?,
        ExpressionKind::Template { quasis, expressions } => generate_template(quasis, expressions, cg)?,
        ExpressionKind::TaggedTemplate {
            tag,
            quasis,
            raw_quasis,
            expressions,
        } => generate_tagged_template(tag, quasis, raw_quasis, expressions, cg)?,
        ExpressionKind::Identifier(ident) => load_variable(&ident.name, cg)?,
        ExpressionKind::This => load_this(cg)?,
        ExpressionKind::NewTarget => load_variable(MANDATORY_NEW_TARGET, cg)?,
        ExpressionKind::Array(elements) => generate_array(elements, cg)?,
        ExpressionKind::Object(properties) => generate_object(properties, cg)?,
        ExpressionKind::Member { object, property } => {
            generate_expression(object, cg)?;
            let name = cg.bc.intern(property);
            cg.bc.emit(Instruction::LdObjByName { name });
        }
        ExpressionKind::ComputedMember { object, property } => {
            generate_expression(object, cg)?;
            let object = cg.bc.get_temp();
            cg.bc.store_accumulator(object);
            let key = evaluate_computed_key(property, cg)?;
            cg.bc.load_obj_property(object, key.operand());
            key.free(cg);
            cg.bc.free_temps(&[object]);
        }
        ExpressionKind::SuperMember(_) | ExpressionKind::SuperComputedMember(_) => {
            let reference = evaluate_reference(expression, cg)?;
            load_reference(&reference, cg)?;
            free_reference(reference, cg);
        }
        ExpressionKind::Call { callee, arguments } => generate_call(callee, arguments, cg)?,
        ExpressionKind::SuperCall(arguments) => class::generate_super_call(arguments, cg)?,
        ExpressionKind::New { callee, arguments } => generate_new(expression, callee, arguments, cg)?,
        ExpressionKind::Spread(_) => {
            return Err(CompileError::internal("spread element outside of a call or array literal"));
        }
        ExpressionKind::Function(function) => define_function(function, cg)?,
        ExpressionKind::Class(class) => class::generate_class(class, None, cg)?,
        ExpressionKind::Unary { op, operand } => generate_unary(*op, operand, cg)?,
        ExpressionKind::Update { op, prefix, target } => generate_update(*op, *prefix, target, cg)?,
        ExpressionKind::Binary { op, lhs, rhs } => {
            generate_expression(lhs, cg)?;
            let left = cg.bc.get_temp();
            cg.bc.store_accumulator(left);
            generate_expression(rhs, cg)?;
            cg.bc.binary(*op, left);
            cg.bc.free_temps(&[left]);
        }
        ExpressionKind::Logical { op, lhs, rhs } => generate_logical(*op, lhs, rhs, cg)?,
        ExpressionKind::Assignment { op, target, value } => generate_assignment(expression, *op, target, value, cg)?,
        ExpressionKind::Conditional {
            test,
            consequent,
            alternate,
        } => {
            let else_label = Label::fresh();
            let end = Label::fresh();
            generate_condition(test, else_label, cg)?;
            generate_expression(consequent, cg)?;
            cg.bc.branch(end);
            cg.bc.label(else_label);
            generate_expression(alternate, cg)?;
            cg.bc.label(end);
        }
        ExpressionKind::Sequence(expressions) => {
            for expression in expressions {
                generate_expression(expression, cg)?;
            }
        }
        ExpressionKind::Yield(_) => return Err(CompileError::unsupported("yield", &expression.range)),
        ExpressionKind::Await(_) => return Err(CompileError::unsupported("await", &expression.range)),
    }
    Ok(())
}

/// Evaluate `test` and jump to `if_false` when it is falsy. Comparisons
/// branch on their result directly and `&&`/`||` short-circuit without
/// materializing a value.
pub(crate) fn generate_condition<'a>(test: &'a Expression, if_false: Label, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    match &test.inner {
        ExpressionKind::Binary { op, lhs, rhs } if yields_boolean(*op) => {
            generate_expression(lhs, cg)?;
            let left = cg.bc.get_temp();
            cg.bc.store_accumulator(left);
            generate_expression(rhs, cg)?;
            cg.bc.condition(*op, left, if_false);
            cg.bc.free_temps(&[left]);
        }
        ExpressionKind::Logical {
            op: LogicalOp::And,
            lhs,
            rhs,
        } => {
            generate_condition(lhs, if_false, cg)?;
            generate_condition(rhs, if_false, cg)?;
        }
        ExpressionKind::Logical {
            op: LogicalOp::Or,
            lhs,
            rhs,
        } => {
            let next = Label::fresh();
            let taken = Label::fresh();
            generate_condition(lhs, next, cg)?;
            cg.bc.branch(taken);
            cg.bc.label(next);
            generate_condition(rhs, if_false, cg)?;
            cg.bc.label(taken);
        }
        ExpressionKind::Unary {
            op: UnaryOp::Not,
            operand,
        } => {
            generate_expression(operand, cg)?;
            cg.bc.jump_if_true(if_false);
        }
        _ => {
            generate_expression(test, cg)?;
            cg.bc.jump_if_false(if_false);
        }
    }
    Ok(())
}

fn yields_boolean(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::StrictEq
            | BinaryOp::StrictNotEq
            | BinaryOp::Lt
            | BinaryOp::LtEq
            | BinaryOp::Gt
            | BinaryOp::GtEq
            | BinaryOp::In
            | BinaryOp::InstanceOf
    )
}

// =============================================================================
// Literals
// =============================================================================

fn regexp_flags(flags: &str, expression: &Expression) -> Result<u32> {
    let mut bits = 0;
    for flag in flags.chars() {
        bits |= match flag {
            'g' => 1,
            'i' => 2,
            'm' => 4,
            's' => 8,
            'u' => 16,
            'y' => 32,
            _ => return Err(CompileError::unsupported("regular expression flag", &expression.range)),
        };
    }
    Ok(bits)
}

fn generate_regexp(pattern: &str, flags: &str, expression: &Expression, cg: &mut CodeGen<'_, '_>) -> Result<()> {
    let flags = regexp_flags(flags, expression)?;
    let pattern = cg.bc.intern(pattern);
    cg.bc.emit(Instruction::CreateRegExpWithLiteral { pattern, flags });
    Ok(())
}

/// `` `a${x}b` `` is `"a" + x + "b"`; empty strings between substitutions
/// are skipped.
fn generate_template<'a>(quasis: &'a [String], expressions: &'a [Expression], cg: &mut CodeGen<'a, '_>) -> Result<()> {
    cg.bc.load_string(quasis.first().map_or("", String::as_str));
    let partial = cg.bc.get_temp();
    for (index, expression) in expressions.iter().enumerate() {
        cg.bc.store_accumulator(partial);
        generate_expression(expression, cg)?;
        cg.bc.emit(Instruction::Add2 { lhs: partial });
        if let Some(quasi) = quasis.get(index + 1)
            && !quasi.is_empty()
        {
            cg.bc.store_accumulator(partial);
            cg.bc.load_string(quasi);
            cg.bc.emit(Instruction::Add2 { lhs: partial });
        }
    }
    cg.bc.free_temps(&[partial]);
    Ok(())
}

fn string_array(strings: &[String], cg: &mut CodeGen<'_, '_>) {
    let mut buffer = LiteralBuffer::new();
    for string in strings {
        buffer.push(Literal::String(string.clone()));
    }
    let literal = cg.bc.add_literal_buffer(buffer);
    cg.bc.emit(Instruction::CreateArrayWithBuffer { literal });
}

fn generate_tagged_template<'a>(
    tag: &'a Expression,
    quasis: &'a [String],
    raw_quasis: &'a [String],
    expressions: &'a [Expression],
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    let (function, this) = generate_callee(tag, cg)?;

    let raw = cg.bc.get_temp();
    string_array(raw_quasis, cg);
    cg.bc.store_accumulator(raw);
    let cooked = cg.bc.get_temp();
    string_array(quasis, cg);
    cg.bc.store_accumulator(cooked);
    let pair = cg.bc.get_temp();
    cg.bc.emit(Instruction::CreateEmptyArray {});
    cg.bc.store_accumulator(pair);
    cg.bc.load_accumulator(raw);
    cg.bc.emit(Instruction::StOwnByIndex { object: pair, index: 0 });
    cg.bc.load_accumulator(cooked);
    cg.bc.emit(Instruction::StOwnByIndex { object: pair, index: 1 });
    cg.bc.load_accumulator(pair);
    cg.bc.emit(Instruction::GetTemplateObject {});
    cg.bc.free_temps(&[raw, cooked, pair]);

    let mut args = vec![cg.bc.get_temp()];
    cg.bc.store_accumulator(args[0]);
    for expression in expressions {
        generate_expression(expression, cg)?;
        let arg = cg.bc.get_temp();
        cg.bc.store_accumulator(arg);
        args.push(arg);
    }
    emit_call(function, this, args, cg);
    Ok(())
}

/// Literal values that can live in a literal buffer.
fn constant_literal(expression: &Expression) -> Option<Literal> {
    match &expression.inner {
        ExpressionKind::Number(value) => Some(Literal::number(*value)),
        ExpressionKind::String(value) => Some(Literal::String(value.clone())),
        ExpressionKind::Boolean(value) => Some(Literal::Boolean(*value)),
        ExpressionKind::Null => Some(Literal::Null),
        _ => None,
    }
}

fn generate_array<'a>(elements: &'a [Option<Expression>], cg: &mut CodeGen<'a, '_>) -> Result<()> {
    let constants: Option<Vec<Literal>> = elements
        .iter()
        .map(|element| element.as_ref().and_then(constant_literal))
        .collect();
    if let Some(constants) = constants
        && !constants.is_empty()
    {
        let literal = cg.bc.add_literal_buffer(LiteralBuffer { literals: constants });
        cg.bc.emit(Instruction::CreateArrayWithBuffer { literal });
        return Ok(());
    }
    let elements: Vec<Option<&'a Expression>> = elements.iter().map(Option::as_ref).collect();
    generate_array_elements(&elements, cg)
}

/// Build an array from `elements`; `None` is a hole. Once a spread has
/// been seen the next index is only known at runtime.
pub(crate) fn generate_array_elements<'a>(
    elements: &[Option<&'a Expression>],
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    let array = cg.bc.get_temp();
    cg.bc.emit(Instruction::CreateEmptyArray {});
    cg.bc.store_accumulator(array);
    let mut next_index: Option<Register> = None;

    for (position, element) in elements.iter().enumerate() {
        let Some(element) = element else {
            if let Some(index) = next_index {
                cg.bc.load_accumulator(index);
                cg.bc.emit(Instruction::Inc {});
                cg.bc.store_accumulator(index);
            }
            continue;
        };
        match &element.inner {
            ExpressionKind::Spread(inner) => {
                let index = match next_index {
                    Some(index) => index,
                    None => {
                        let index = cg.bc.get_temp();
                        cg.bc.load_number(position as f64);
                        cg.bc.store_accumulator(index);
                        next_index = Some(index);
                        index
                    }
                };
                generate_expression(inner, cg)?;
                cg.bc.emit(Instruction::StArraySpread { array, index });
                cg.bc.store_accumulator(index);
            }
            _ => {
                generate_expression(element, cg)?;
                match next_index {
                    None => cg.bc.emit(Instruction::StOwnByIndex {
                        object: array,
                        index: u32_from_usize(position),
                    }),
                    Some(index) => {
                        cg.bc.emit(Instruction::StOwnByValue { object: array, key: index });
                        cg.bc.load_accumulator(index);
                        cg.bc.emit(Instruction::Inc {});
                        cg.bc.store_accumulator(index);
                    }
                }
            }
        }
    }

    // A trailing hole is only visible through `length`.
    if let Some(None) = elements.last() {
        match next_index {
            Some(index) => cg.bc.load_accumulator(index),
            None => cg.bc.load_number(elements.len() as f64),
        }
        cg.bc.store_obj_property(array, KeyOperand::Name("length"));
    }

    cg.bc.load_accumulator(array);
    cg.bc.free_temps(&[array]);
    if let Some(index) = next_index {
        cg.bc.free_temps(&[index]);
    }
    Ok(())
}

fn generate_object<'a>(properties: &'a [ObjectProperty], cg: &mut CodeGen<'a, '_>) -> Result<()> {
    // Leading constant properties go into a literal buffer.
    let mut buffer = LiteralBuffer::new();
    let mut buffered = 0;
    for property in properties {
        let ObjectProperty::KeyValue { key, value } = property else {
            break;
        };
        let (Some(name), Some(literal)) = (key.literal_name(), constant_literal(value)) else {
            break;
        };
        if name == "__proto__" {
            break;
        }
        buffer.push(Literal::String(name));
        buffer.push(literal);
        buffered += 1;
    }

    let object = cg.bc.get_temp();
    if buffered > 0 {
        let literal = cg.bc.add_literal_buffer(buffer);
        cg.bc.emit(Instruction::CreateObjectWithBuffer { literal });
    } else {
        cg.bc.emit(Instruction::CreateEmptyObject {});
    }
    cg.bc.store_accumulator(object);

    let rest = &properties[buffered..];
    let mut defined_accessors = FxHashSet::default();
    for (index, property) in rest.iter().enumerate() {
        match property {
            ObjectProperty::KeyValue { key, value } => {
                let key = evaluate_property_key(key, cg)?;
                generate_expression(value, cg)?;
                match &key {
                    // `__proto__: value` sets the prototype.
                    EvaluatedKey::Name(name) if name == "__proto__" => {
                        cg.bc.store_obj_property(object, key.operand())
                    }
                    _ => cg.bc.store_own_property(object, key.operand()),
                }
                key.free(cg);
            }
            ObjectProperty::Shorthand(ident) => {
                load_variable(&ident.name, cg)?;
                cg.bc.store_own_property(object, KeyOperand::Name(&ident.name));
            }
            ObjectProperty::Method { key, function } => match function.kind {
                FunctionKind::Getter | FunctionKind::Setter => {
                    let name = key.literal_name();
                    if let Some(name) = &name
                        && !defined_accessors.insert(name.clone())
                    {
                        continue;
                    }
                    let partner = name.as_deref().and_then(|name| find_accessor_partner(&rest[index + 1..], name, function.kind));
                    let (getter, setter) = match function.kind {
                        FunctionKind::Getter => (Some(function.as_ref()), partner),
                        _ => (partner, Some(function.as_ref())),
                    };
                    let key = evaluate_property_key(key, cg)?;
                    let key = key_register(key, cg);
                    define_accessor(object, key, getter, setter, false, cg)?;
                    cg.bc.free_temps(&[key]);
                }
                _ => {
                    let key = evaluate_property_key(key, cg)?;
                    cg.bc.load_accumulator(object);
                    define_method(function, false, cg)?;
                    cg.bc.store_own_property(object, key.operand());
                    key.free(cg);
                }
            },
            ObjectProperty::Spread(value) => {
                generate_expression(value, cg)?;
                cg.bc.emit(Instruction::CopyDataProperties { target: object });
            }
        }
    }

    cg.bc.load_accumulator(object);
    cg.bc.free_temps(&[object]);
    Ok(())
}

/// The other half of an accessor pair with literal key `name`.
fn find_accessor_partner<'a>(properties: &'a [ObjectProperty], name: &str, kind: FunctionKind) -> Option<&'a FunctionData> {
    let wanted = match kind {
        FunctionKind::Getter => FunctionKind::Setter,
        _ => FunctionKind::Getter,
    };
    properties.iter().find_map(|property| match property {
        ObjectProperty::Method { key, function }
            if function.kind == wanted && key.literal_name().as_deref() == Some(name) =>
        {
            Some(function.as_ref())
        }
        _ => None,
    })
}

/// `definegettersetterbyvalue` on `object`; a missing half is `undefined`.
pub(crate) fn define_accessor<'a>(
    object: Register,
    key: Register,
    getter: Option<&'a FunctionData>,
    setter: Option<&'a FunctionData>,
    strict: bool,
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    let getter_register = cg.bc.get_temp();
    let setter_register = cg.bc.get_temp();
    for (function, register) in [(getter, getter_register), (setter, setter_register)] {
        match function {
            Some(function) => {
                cg.bc.load_accumulator(object);
                define_method(function, strict, cg)?;
            }
            None => cg.bc.emit(Instruction::LdUndefined {}),
        }
        cg.bc.store_accumulator(register);
    }
    cg.bc.emit(Instruction::DefineGetterSetterByValue {
        object,
        key,
        getter: getter_register,
        setter: setter_register,
    });
    cg.bc.free_temps(&[getter_register, setter_register]);
    Ok(())
}

// =============================================================================
// Calls
// =============================================================================

fn is_spread(expression: &Expression) -> bool {
    matches!(expression.inner, ExpressionKind::Spread(_))
}

/// Evaluate a callee into a register, with the receiver for member callees.
fn generate_callee<'a>(callee: &'a Expression, cg: &mut CodeGen<'a, '_>) -> Result<(Register, Option<Register>)> {
    let this = match &callee.inner {
        ExpressionKind::Member { .. }
        | ExpressionKind::ComputedMember { .. }
        | ExpressionKind::SuperMember(_)
        | ExpressionKind::SuperComputedMember(_) => {
            let reference = evaluate_reference(callee, cg)?;
            load_reference(&reference, cg)?;
            match reference {
                Reference::Property { object, key } | Reference::SuperProperty { this: object, key } => {
                    key.free(cg);
                    Some(object)
                }
                Reference::Variable(_) => None,
            }
        }
        _ => {
            generate_expression(callee, cg)?;
            None
        }
    };
    let function = cg.bc.get_temp();
    cg.bc.store_accumulator(function);
    Ok((function, this))
}

/// Call `function` with `args`, then free every register involved.
fn emit_call(function: Register, this: Option<Register>, args: Vec<Register>, cg: &mut CodeGen<'_, '_>) {
    cg.bc.load_accumulator(function);
    let temps: Vec<Register> = args.iter().rev().copied().collect();
    match this {
        Some(this) => cg.bc.emit(Instruction::CallThis { this, args }),
        None => cg.bc.emit(Instruction::CallArgs { args }),
    }
    cg.bc.free_temps(&temps);
    cg.bc.free_temps(&[function]);
    if let Some(this) = this {
        cg.bc.free_temps(&[this]);
    }
}

fn generate_call<'a>(callee: &'a Expression, arguments: &'a [Expression], cg: &mut CodeGen<'a, '_>) -> Result<()> {
    let (function, this) = generate_callee(callee, cg)?;

    if arguments.iter().any(is_spread) {
        let elements: Vec<Option<&'a Expression>> = arguments.iter().map(Some).collect();
        generate_array_elements(&elements, cg)?;
        let args = cg.bc.get_temp();
        cg.bc.store_accumulator(args);
        let receiver = match this {
            Some(this) => this,
            None => {
                let undefined = cg.bc.get_temp();
                cg.bc.emit(Instruction::LdUndefined {});
                cg.bc.store_accumulator(undefined);
                undefined
            }
        };
        cg.bc.emit(Instruction::CallSpread {
            function,
            this: receiver,
            args,
        });
        cg.bc.free_temps(&[function, receiver, args]);
        return Ok(());
    }

    let mut args = Vec::with_capacity(arguments.len());
    for argument in arguments {
        generate_expression(argument, cg)?;
        let arg = cg.bc.get_temp();
        cg.bc.store_accumulator(arg);
        args.push(arg);
    }
    emit_call(function, this, args, cg);
    Ok(())
}

fn generate_new<'a>(
    expression: &'a Expression,
    callee: &'a Expression,
    arguments: &'a [Expression],
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    if arguments.iter().any(is_spread) {
        return Err(CompileError::unsupported("spread arguments to new", &expression.range));
    }
    generate_expression(callee, cg)?;
    let constructor = cg.bc.get_temp();
    cg.bc.store_accumulator(constructor);
    let mut args = Vec::with_capacity(arguments.len());
    for argument in arguments {
        generate_expression(argument, cg)?;
        let arg = cg.bc.get_temp();
        cg.bc.store_accumulator(arg);
        args.push(arg);
    }
    let temps: Vec<Register> = args.iter().rev().copied().collect();
    cg.bc.emit(Instruction::NewObjRange {
        callee: constructor,
        args,
    });
    cg.bc.free_temps(&temps);
    cg.bc.free_temps(&[constructor]);
    Ok(())
}

// =============================================================================
// Operators
// =============================================================================

fn generate_unary<'a>(op: UnaryOp, operand: &'a Expression, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    match op {
        UnaryOp::TypeOf => {
            match operand.as_identifier() {
                // Reading an unscoped name must not throw.
                Some(ident) if is_unscoped(&ident.name, cg)? => {
                    if cg.bc.watch_mode {
                        cg.bc.load_by_name_via_debugger(&ident.name, false);
                    } else {
                        cg.bc.emit(Instruction::LdGlobal {});
                        let name = cg.bc.intern(&ident.name);
                        cg.bc.emit(Instruction::LdObjByName { name });
                    }
                }
                _ => generate_expression(operand, cg)?,
            }
            cg.bc.emit(Instruction::TypeOf {});
        }
        UnaryOp::Delete => generate_delete(operand, cg)?,
        UnaryOp::Not => {
            let is_false = Label::fresh();
            let end = Label::fresh();
            generate_expression(operand, cg)?;
            cg.bc.jump_if_false(is_false);
            cg.bc.emit(Instruction::LdFalse {});
            cg.bc.branch(end);
            cg.bc.label(is_false);
            cg.bc.emit(Instruction::LdTrue {});
            cg.bc.label(end);
        }
        UnaryOp::Void => {
            generate_expression(operand, cg)?;
            cg.bc.emit(Instruction::LdUndefined {});
        }
        UnaryOp::Minus => {
            generate_expression(operand, cg)?;
            cg.bc.emit(Instruction::Neg {});
        }
        UnaryOp::Plus => {
            generate_expression(operand, cg)?;
            cg.bc.emit(Instruction::ToNumber {});
        }
        UnaryOp::BitNot => {
            generate_expression(operand, cg)?;
            cg.bc.emit(Instruction::Not {});
        }
    }
    Ok(())
}

fn generate_delete<'a>(operand: &'a Expression, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    match &operand.inner {
        ExpressionKind::Identifier(ident) => {
            if is_global_name(&ident.name, cg)? {
                let global = cg.bc.get_temp();
                cg.bc.emit(Instruction::LdGlobal {});
                cg.bc.store_accumulator(global);
                cg.bc.load_string(&ident.name);
                cg.bc.emit(Instruction::DelObjProp { object: global });
                cg.bc.free_temps(&[global]);
            } else {
                cg.bc.emit(Instruction::LdFalse {});
            }
        }
        ExpressionKind::Member { .. } | ExpressionKind::ComputedMember { .. } => {
            let Reference::Property { object, key } = evaluate_reference(operand, cg)? else {
                return Err(CompileError::internal("member expression evaluated to a non-property reference"));
            };
            match &key {
                EvaluatedKey::Name(name) => cg.bc.load_string(name),
                EvaluatedKey::Index(index) => cg.bc.load_number(f64::from(*index)),
                EvaluatedKey::Value(register) => cg.bc.load_accumulator(*register),
            }
            cg.bc.emit(Instruction::DelObjProp { object });
            key.free(cg);
            cg.bc.free_temps(&[object]);
        }
        ExpressionKind::SuperMember(_) | ExpressionKind::SuperComputedMember(_) => {
            cg.bc.emit(Instruction::ThrowDeleteSuperProperty {});
        }
        _ => {
            generate_expression(operand, cg)?;
            cg.bc.emit(Instruction::LdTrue {});
        }
    }
    Ok(())
}

fn generate_update<'a>(op: UpdateOp, prefix: bool, target: &'a Expression, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    let reference = evaluate_reference(target, cg)?;
    load_reference(&reference, cg)?;
    cg.bc.emit(Instruction::ToNumeric {});
    let old_value = (!prefix).then(|| {
        let old_value = cg.bc.get_temp();
        cg.bc.store_accumulator(old_value);
        old_value
    });
    cg.bc.emit(match op {
        UpdateOp::Increment => Instruction::Inc {},
        UpdateOp::Decrement => Instruction::Dec {},
    });
    store_reference(&reference, cg)?;
    if let Some(old_value) = old_value {
        cg.bc.load_accumulator(old_value);
        cg.bc.free_temps(&[old_value]);
    }
    free_reference(reference, cg);
    Ok(())
}

fn generate_logical<'a>(op: LogicalOp, lhs: &'a Expression, rhs: &'a Expression, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    let short_circuit = Label::fresh();
    let end = Label::fresh();
    generate_expression(lhs, cg)?;
    let left = cg.bc.get_temp();
    cg.bc.store_accumulator(left);
    match op {
        LogicalOp::And => cg.bc.jump_if_false(short_circuit),
        LogicalOp::Or => cg.bc.jump_if_true(short_circuit),
        LogicalOp::Nullish => {
            // `lhs ?? rhs` keeps `lhs` unless it is nullish.
            let use_rhs = Label::fresh();
            cg.bc.branch_if_nullish(left, use_rhs);
            cg.bc.load_accumulator(left);
            cg.bc.branch(end);
            cg.bc.label(use_rhs);
            cg.bc.free_temps(&[left]);
            generate_expression(rhs, cg)?;
            cg.bc.label(end);
            return Ok(());
        }
    }
    generate_expression(rhs, cg)?;
    cg.bc.branch(end);
    cg.bc.label(short_circuit);
    cg.bc.load_accumulator(left);
    cg.bc.label(end);
    cg.bc.free_temps(&[left]);
    Ok(())
}

fn generate_assignment<'a>(
    expression: &'a Expression,
    op: AssignmentOp,
    target: &'a AssignmentTarget,
    value: &'a Expression,
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    match (op, target) {
        (AssignmentOp::Assign, AssignmentTarget::Simple(target)) => {
            let reference = evaluate_reference(target, cg)?;
            generate_expression(value, cg)?;
            store_reference(&reference, cg)?;
            free_reference(reference, cg);
        }
        (AssignmentOp::Compound(op), AssignmentTarget::Simple(target)) => {
            let reference = evaluate_reference(target, cg)?;
            load_reference(&reference, cg)?;
            let current = cg.bc.get_temp();
            cg.bc.store_accumulator(current);
            generate_expression(value, cg)?;
            cg.bc.binary(op, current);
            cg.bc.free_temps(&[current]);
            store_reference(&reference, cg)?;
            free_reference(reference, cg);
        }
        (AssignmentOp::Assign, AssignmentTarget::Pattern(pattern)) => {
            generate_expression(value, cg)?;
            let source = cg.bc.get_temp();
            cg.bc.store_accumulator(source);
            generate_binding_pattern(pattern, source, BindingMode::Assignment, cg)?;
            cg.bc.load_accumulator(source);
            cg.bc.free_temps(&[source]);
        }
        (AssignmentOp::Compound(_), AssignmentTarget::Pattern(_)) => {
            return Err(CompileError::unsupported("compound assignment to a pattern", &expression.range));
        }
    }
    Ok(())
}

// =============================================================================
// Destructuring
// =============================================================================

/// Bind the parts of the value in `value` to the targets of `pattern`.
pub(crate) fn generate_binding_pattern<'a>(
    pattern: &'a BindingPattern,
    value: Register,
    mode: BindingMode,
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    match pattern.kind {
        PatternKind::Array => generate_array_pattern(pattern, value, mode, cg),
        PatternKind::Object => generate_object_pattern(pattern, value, mode, cg),
    }
}

/// Store `acc` to a pattern target.
fn bind_target<'a>(target: &'a BindingTarget, mode: BindingMode, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    match target {
        BindingTarget::Identifier(ident) => store_variable(&ident.name, mode == BindingMode::Declaration, cg),
        BindingTarget::Pattern(pattern) => {
            let nested = cg.bc.get_temp();
            cg.bc.store_accumulator(nested);
            generate_binding_pattern(pattern, nested, mode, cg)?;
            cg.bc.free_temps(&[nested]);
            Ok(())
        }
    }
}

/// Load `value`, or evaluate `default` if it is `undefined`.
fn load_with_default<'a>(value: Register, default: Option<&'a Expression>, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    let Some(default) = default else {
        cg.bc.load_accumulator(value);
        return Ok(());
    };
    let has_value = Label::fresh();
    let end = Label::fresh();
    let undefined = cg.bc.get_temp();
    cg.bc.emit(Instruction::LdUndefined {});
    cg.bc.store_accumulator(undefined);
    cg.bc.load_accumulator(value);
    cg.bc.emit(Instruction::StrictEq { lhs: undefined });
    cg.bc.free_temps(&[undefined]);
    cg.bc.emit(Instruction::Jeqz { target: has_value });
    generate_expression(default, cg)?;
    cg.bc.branch(end);
    cg.bc.label(has_value);
    cg.bc.load_accumulator(value);
    cg.bc.label(end);
    Ok(())
}

/// Registers of an array pattern's iteration.
struct PatternIterator {
    iterator: Register,
    next: Register,
    done: Register,
    result: Register,
}

impl PatternIterator {
    /// Step the iterator. Leaves the next value, or `undefined` once the
    /// iterator is done, in `element`.
    fn step(&self, element: Register, cg: &mut CodeGen<'_, '_>) {
        let end = Label::fresh();
        cg.bc.emit(Instruction::LdUndefined {});
        cg.bc.store_accumulator(element);
        cg.bc.load_accumulator(self.done);
        cg.bc.emit(Instruction::Jnez { target: end });
        self.call_next(cg);
        cg.bc.emit(Instruction::Jnez { target: end });
        cg.bc.load_obj_property(self.result, KeyOperand::Name("value"));
        cg.bc.store_accumulator(element);
        cg.bc.label(end);
    }

    /// Call `next()`; leaves the new `done` flag in `acc`.
    fn call_next(&self, cg: &mut CodeGen<'_, '_>) {
        cg.bc.load_accumulator(self.next);
        cg.bc.emit(Instruction::CallThis {
            this: self.iterator,
            args: Vec::new(),
        });
        cg.bc.store_accumulator(self.result);
        cg.bc.emit(Instruction::ThrowIfNotObject { value: self.result });
        cg.bc.load_obj_property(self.result, KeyOperand::Name("done"));
        cg.bc.emit(Instruction::IsTrue {});
        cg.bc.store_accumulator(self.done);
    }
}

fn generate_array_pattern<'a>(
    pattern: &'a BindingPattern,
    value: Register,
    mode: BindingMode,
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    let iteration = PatternIterator {
        iterator: cg.bc.get_temp(),
        next: cg.bc.get_temp(),
        done: cg.bc.get_temp(),
        result: cg.bc.get_temp(),
    };
    cg.bc.load_accumulator(value);
    cg.bc.emit(Instruction::GetIterator {});
    cg.bc.store_accumulator(iteration.iterator);
    cg.bc.load_obj_property(iteration.iterator, KeyOperand::Name("next"));
    cg.bc.store_accumulator(iteration.next);
    cg.bc.emit(Instruction::LdFalse {});
    cg.bc.store_accumulator(iteration.done);

    let element = cg.bc.get_temp();
    for binding in &pattern.elements {
        if binding.is_rest {
            generate_array_rest(&iteration, element, cg);
        } else {
            iteration.step(element, cg);
        }
        let Some(target) = &binding.target else {
            continue;
        };
        load_with_default(element, binding.default.as_ref(), cg)?;
        bind_target(target, mode, cg)?;
    }

    let closed = Label::fresh();
    cg.bc.load_accumulator(iteration.done);
    cg.bc.emit(Instruction::Jnez { target: closed });
    cg.bc.emit(Instruction::CloseIterator {
        iterator: iteration.iterator,
    });
    cg.bc.label(closed);
    cg.bc.free_temps(&[
        iteration.iterator,
        iteration.next,
        iteration.done,
        iteration.result,
        element,
    ]);
    Ok(())
}

/// Drain the iterator into a new array in `element`.
fn generate_array_rest(iteration: &PatternIterator, element: Register, cg: &mut CodeGen<'_, '_>) {
    let index = cg.bc.get_temp();
    let start = Label::fresh();
    let end = Label::fresh();
    cg.bc.emit(Instruction::CreateEmptyArray {});
    cg.bc.store_accumulator(element);
    cg.bc.load_number(0.0);
    cg.bc.store_accumulator(index);

    cg.bc.label(start);
    cg.bc.load_accumulator(iteration.done);
    cg.bc.emit(Instruction::Jnez { target: end });
    iteration.call_next(cg);
    cg.bc.emit(Instruction::Jnez { target: end });
    cg.bc.load_obj_property(iteration.result, KeyOperand::Name("value"));
    cg.bc.emit(Instruction::StOwnByValue { object: element, key: index });
    cg.bc.load_accumulator(index);
    cg.bc.emit(Instruction::Inc {});
    cg.bc.store_accumulator(index);
    cg.bc.branch(start);
    cg.bc.label(end);
    cg.bc.free_temps(&[index]);
}

fn generate_object_pattern<'a>(
    pattern: &'a BindingPattern,
    value: Register,
    mode: BindingMode,
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    let mut seen_names: Vec<String> = Vec::new();
    for binding in &pattern.elements {
        let Some(target) = &binding.target else {
            continue;
        };
        if binding.is_rest {
            let rest = cg.bc.get_temp();
            cg.bc.emit(Instruction::CreateEmptyObject {});
            cg.bc.store_accumulator(rest);
            cg.bc.load_accumulator(value);
            cg.bc.emit(Instruction::CopyDataProperties { target: rest });
            for name in &seen_names {
                cg.bc.load_string(name);
                cg.bc.emit(Instruction::DelObjProp { object: rest });
            }
            cg.bc.load_accumulator(rest);
            bind_target(target, mode, cg)?;
            cg.bc.free_temps(&[rest]);
            continue;
        }

        let key = match (&binding.key, target) {
            (Some(key), _) => evaluate_property_key(key, cg)?,
            (None, BindingTarget::Identifier(ident)) => EvaluatedKey::Name(ident.name.clone()),
            (None, BindingTarget::Pattern(inner)) => {
                return Err(CompileError::unsupported("object pattern element without a key", &inner.range));
            }
        };
        match &key {
            EvaluatedKey::Name(name) => seen_names.push(name.clone()),
            EvaluatedKey::Index(index) => seen_names.push(index.to_string()),
            EvaluatedKey::Value(_) => {}
        }
        cg.bc.load_obj_property(value, key.operand());
        key.free(cg);
        if binding.default.is_some() {
            let property = cg.bc.get_temp();
            cg.bc.store_accumulator(property);
            load_with_default(property, binding.default.as_ref(), cg)?;
            cg.bc.free_temps(&[property]);
        }
        bind_target(target, mode, cg)?;
    }
    Ok(())
}
