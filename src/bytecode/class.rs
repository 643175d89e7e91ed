/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

//! Classes, constructors and `super`.
//!
//! A class is created by one `defineclasswithbuffer`. Methods with literal
//! keys that precede the first computed key or accessor travel in the
//! class literal buffer; every other member is defined afterwards, in
//! source order, on the prototype or on the class itself.
//!
//! Instance fields are stored on `this` by the constructor: at entry for
//! base classes and right after `super(...)` returns for derived ones.
//! Their computed keys are evaluated with the class and kept in class
//! scope bindings the constructor reads.

use rustc_hash::FxHashSet;

use super::codegen::{
    CodeGen, UnitSource, define_method, generate_parameter_bindings, load_this, load_variable, load_variable_id,
    store_variable, store_variable_id,
};
use super::debug::SourcePosition;
use super::expression::{
    EvaluatedKey, define_accessor, evaluate_property_key, generate_array_elements, generate_expression, key_register,
};
use super::generator::KeyOperand;
use super::instruction::Instruction;
use super::literal::{Literal, LiteralBuffer};
use super::operand::{Label, Register};
use crate::ast::*;
use crate::error::{CompileError, Result};
use crate::scope::{MANDATORY_FUNC_OBJ, MANDATORY_THIS};

/// `throw.ifsupernotcorrectcall` kinds.
const THIS_MUST_BE_INITIALIZED: i32 = 0;
const THIS_MUST_NOT_BE_INITIALIZED: i32 = 1;

/// Methods that go into the class literal buffer: the plain methods with
/// literal keys before the first computed key or accessor.
fn buffered_methods(class: &ClassData) -> Vec<&ClassMember> {
    let mut methods = Vec::new();
    for member in &class.members {
        let ClassMemberKind::Method(function) = &member.kind else {
            continue;
        };
        match function.kind {
            FunctionKind::Constructor => continue,
            FunctionKind::Method if member.key.literal_name().is_some() => methods.push(member),
            _ => break,
        }
    }
    // Prototype methods come first; the trailing integer counts them.
    methods.sort_by_key(|member| member.is_static);
    methods
}

fn class_literal_buffer(methods: &[&ClassMember], cg: &CodeGen<'_, '_>) -> Result<LiteralBuffer> {
    let mut buffer = LiteralBuffer::new();
    let mut instance_methods = 0;
    for member in methods {
        let ClassMemberKind::Method(function) = &member.kind else {
            return Err(CompileError::internal("class literal buffer holds a field"));
        };
        let name = member
            .key
            .literal_name()
            .ok_or_else(|| CompileError::internal("class literal buffer holds a computed key"))?;
        let length = cg.ctx.recording.function(function.id)?.parameter_length;
        buffer.push(Literal::String(name));
        buffer.push(Literal::Method(cg.internal_name(function.id)?.to_string()));
        buffer.push(Literal::MethodAffiliate(u16::try_from(length).unwrap_or(u16::MAX)));
        if !member.is_static {
            instance_methods += 1;
        }
    }
    buffer.push(Literal::Integer(instance_methods));
    Ok(buffer)
}

/// Create `class`, leaving it in `acc`. `binding` is the name a class
/// declaration (or default export) initializes in the enclosing scope.
pub(crate) fn generate_class<'a>(class: &'a ClassData, binding: Option<&str>, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    cg.bc.at(&class.range);
    let recording = cg.ctx.recording;
    let class_scope = cg.scope_of(class.id)?;
    let constructor = *recording
        .class_constructors
        .get(&class.id)
        .ok_or_else(|| CompileError::internal(format!("class node {} has no constructor", class.id.0)))?;

    let base = cg.bc.get_temp();
    match &class.super_class {
        Some(super_class) => generate_expression(super_class, cg)?,
        None => cg.bc.emit(Instruction::LdHole {}),
    }
    cg.bc.store_accumulator(base);

    let buffered = buffered_methods(class);
    let buffer = class_literal_buffer(&buffered, cg)?;
    let literal = cg.bc.add_literal_buffer(buffer);
    let constructor_name = cg.bc.intern(cg.internal_name(constructor)?);
    cg.bc.emit(Instruction::DefineClassWithBuffer {
        constructor: constructor_name,
        literal,
        length: recording.function(constructor)?.parameter_length,
        base,
    });
    cg.bc.free_temps(&[base]);
    let class_object = cg.bc.get_temp();
    cg.bc.store_accumulator(class_object);

    cg.nested.push(match class.constructor() {
        Some(function) => UnitSource::Function {
            function,
            class: Some(class),
            strict: true,
        },
        None => UnitSource::DefaultConstructor {
            class,
            function: constructor,
        },
    });
    let mut defined: FxHashSet<NodeId> = FxHashSet::default();
    for member in &buffered {
        if let ClassMemberKind::Method(function) = &member.kind {
            defined.insert(member.id);
            cg.nested.push(UnitSource::Function {
                function,
                class: None,
                strict: true,
            });
        }
    }

    if let Some(name) = binding {
        store_variable(name, true, cg)?;
    }

    cg.with_scope(class_scope, |cg| {
        if class.is_expression
            && let Some(ident) = &class.name
        {
            cg.bc.load_accumulator(class_object);
            store_variable(&ident.name, true, cg)?;
        }
        generate_class_members(class, class_object, &mut defined, cg)
    })?;

    cg.bc.load_accumulator(class_object);
    cg.bc.free_temps(&[class_object]);
    Ok(())
}

/// Define the members the literal buffer did not carry.
fn generate_class_members<'a>(
    class: &'a ClassData,
    class_object: Register,
    defined: &mut FxHashSet<NodeId>,
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    let mut prototype: Option<Register> = None;
    for (index, member) in class.members.iter().enumerate() {
        if defined.contains(&member.id) {
            continue;
        }
        cg.bc.at(&member.range);
        match &member.kind {
            ClassMemberKind::Method(function) if function.kind == FunctionKind::Constructor => {}
            ClassMemberKind::Method(function) => {
                let target = if member.is_static {
                    class_object
                } else {
                    *prototype.get_or_insert_with(|| {
                        let register = cg.bc.get_temp();
                        cg.bc.load_obj_property(class_object, KeyOperand::Name("prototype"));
                        cg.bc.store_accumulator(register);
                        register
                    })
                };
                match function.kind {
                    FunctionKind::Getter | FunctionKind::Setter => {
                        let partner = accessor_partner(&class.members[index + 1..], member, function.kind);
                        if let Some((partner, _)) = partner {
                            defined.insert(partner);
                        }
                        let partner = partner.map(|(_, partner)| partner);
                        let (getter, setter) = match function.kind {
                            FunctionKind::Getter => (Some(function.as_ref()), partner),
                            _ => (partner, Some(function.as_ref())),
                        };
                        let key = evaluate_property_key(&member.key, cg)?;
                        let key = key_register(key, cg);
                        define_accessor(target, key, getter, setter, true, cg)?;
                        cg.bc.free_temps(&[key]);
                    }
                    _ => {
                        let key = evaluate_property_key(&member.key, cg)?;
                        cg.bc.load_accumulator(target);
                        define_method(function, true, cg)?;
                        cg.bc.store_own_property(target, key.operand());
                        key.free(cg);
                    }
                }
            }
            ClassMemberKind::Field(initializer) if member.is_static => {
                define_field(class_object, member, initializer.as_deref(), cg)?;
            }
            ClassMemberKind::Field(_) => {
                let recording = cg.ctx.recording;
                if let (PropertyKey::Computed(key), Some(binding)) =
                    (&member.key, recording.computed_field_keys.get(&member.id))
                {
                    generate_expression(key, cg)?;
                    store_variable(binding, true, cg)?;
                }
            }
        }
        defined.insert(member.id);
    }
    if let Some(prototype) = prototype {
        cg.bc.free_temps(&[prototype]);
    }
    Ok(())
}

/// The accessor completing `member`'s pair: same literal key, same
/// placement, opposite kind.
fn accessor_partner<'a>(
    members: &'a [ClassMember],
    member: &ClassMember,
    kind: FunctionKind,
) -> Option<(NodeId, &'a FunctionData)> {
    let name = member.key.literal_name()?;
    let wanted = if kind == FunctionKind::Getter {
        FunctionKind::Setter
    } else {
        FunctionKind::Getter
    };
    members.iter().find_map(|other| match &other.kind {
        ClassMemberKind::Method(function)
            if function.kind == wanted
                && other.is_static == member.is_static
                && other.key.literal_name().as_deref() == Some(name.as_str()) =>
        {
            Some((other.id, function.as_ref()))
        }
        _ => None,
    })
}

fn define_field<'a>(
    object: Register,
    member: &'a ClassMember,
    initializer: Option<&'a Expression>,
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    let recording = cg.ctx.recording;
    let key = match recording.computed_field_keys.get(&member.id) {
        Some(binding) => {
            load_variable(binding, cg)?;
            let key = cg.bc.get_temp();
            cg.bc.store_accumulator(key);
            EvaluatedKey::Value(key)
        }
        None => evaluate_property_key(&member.key, cg)?,
    };
    match initializer {
        Some(initializer) => generate_expression(initializer, cg)?,
        None => cg.bc.emit(Instruction::LdUndefined {}),
    }
    cg.bc.store_own_property(object, key.operand());
    key.free(cg);
    Ok(())
}

/// Store the instance fields of `class` on `this`.
pub(crate) fn initialize_instance_fields<'a>(class: &'a ClassData, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    let mut fields = class.members.iter().filter_map(|member| match &member.kind {
        ClassMemberKind::Field(initializer) if !member.is_static => Some((member, initializer.as_deref())),
        _ => None,
    });
    let Some(first) = fields.next() else {
        return Ok(());
    };
    cg.with_scope(cg.function_scope, |cg| {
        let this = cg.bc.get_temp();
        load_variable(MANDATORY_THIS, cg)?;
        cg.bc.store_accumulator(this);
        for (member, initializer) in std::iter::once(first).chain(fields) {
            cg.bc.at(&member.range);
            define_field(this, member, initializer, cg)?;
        }
        cg.bc.free_temps(&[this]);
        Ok(())
    })
}

/// Whether code in the current scope runs as part of a derived class
/// constructor, arrows included.
pub(crate) fn in_derived_constructor(cg: &CodeGen<'_, '_>) -> bool {
    let tree = cg.tree();
    let scope = tree.nearest_non_arrow_variable_scope(cg.scope);
    let recording = cg.ctx.recording;
    recording.functions.get(&tree.scope(scope).node).is_some_and(|info| {
        info.kind == FunctionKind::Constructor
            && info
                .class
                .is_some_and(|class| recording.derived_classes.contains(&class))
    })
}

/// Whether `super(...)` in the current scope belongs to this unit's own
/// constructor rather than to an enclosing one reached through arrows.
fn calls_own_constructor(cg: &CodeGen<'_, '_>) -> bool {
    cg.tree().nearest_non_arrow_variable_scope(cg.scope) == cg.function_scope
}

/// Initialize `this` from the value in `acc` that the super constructor
/// returned, then run the field initializers.
fn bind_super_result(cg: &mut CodeGen<'_, '_>) -> Result<()> {
    let result = cg.bc.get_temp();
    cg.bc.store_accumulator(result);
    load_variable(MANDATORY_THIS, cg)?;
    cg.bc.emit(Instruction::ThrowIfSuperNotCorrectCall {
        kind: THIS_MUST_NOT_BE_INITIALIZED,
    });
    cg.bc.load_accumulator(result);
    store_variable(MANDATORY_THIS, true, cg)?;
    if calls_own_constructor(cg)
        && let Some(class) = cg.class
    {
        initialize_instance_fields(class, cg)?;
    }
    cg.bc.load_accumulator(result);
    cg.bc.free_temps(&[result]);
    Ok(())
}

pub(crate) fn generate_super_call<'a>(arguments: &'a [Expression], cg: &mut CodeGen<'a, '_>) -> Result<()> {
    if arguments
        .iter()
        .any(|argument| matches!(argument.inner, ExpressionKind::Spread(_)))
    {
        let elements: Vec<Option<&'a Expression>> = arguments.iter().map(Some).collect();
        generate_array_elements(&elements, cg)?;
        let args = cg.bc.get_temp();
        cg.bc.store_accumulator(args);
        load_variable(MANDATORY_FUNC_OBJ, cg)?;
        cg.bc.emit(Instruction::SuperCallSpread { args });
        cg.bc.free_temps(&[args]);
    } else {
        let mut args = Vec::with_capacity(arguments.len());
        for argument in arguments {
            generate_expression(argument, cg)?;
            let arg = cg.bc.get_temp();
            cg.bc.store_accumulator(arg);
            args.push(arg);
        }
        load_variable(MANDATORY_FUNC_OBJ, cg)?;
        let temps = args.clone();
        cg.bc.emit(Instruction::SuperCallThisRange { args });
        cg.bc.free_temps(&temps);
    }
    bind_super_result(cg)
}

/// Value a `return` in a derived constructor hands back: the returned
/// value unless it is `undefined`, else `this`, which must be initialized.
pub(crate) fn generate_derived_constructor_return_value<'a>(
    value: Option<&'a Expression>,
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    let Some(value) = value else {
        return load_this(cg);
    };
    match &value.inner {
        ExpressionKind::This => load_this(cg),
        _ if value.is_undefined_identifier() => load_this(cg),
        ExpressionKind::SuperCall(_) => generate_expression(value, cg),
        _ => {
            let use_value = Label::fresh();
            let check = Label::fresh();
            generate_expression(value, cg)?;
            let returned = cg.bc.get_temp();
            cg.bc.store_accumulator(returned);
            cg.bc.emit(Instruction::LdUndefined {});
            cg.bc.emit(Instruction::StrictEq { lhs: returned });
            cg.bc.emit(Instruction::Jeqz { target: use_value });
            load_variable(MANDATORY_THIS, cg)?;
            cg.bc.branch(check);
            cg.bc.label(use_value);
            cg.bc.load_accumulator(returned);
            cg.bc.label(check);
            cg.bc.emit(Instruction::ThrowIfSuperNotCorrectCall {
                kind: THIS_MUST_BE_INITIALIZED,
            });
            cg.bc.free_temps(&[returned]);
            Ok(())
        }
    }
}

/// Return `this` at the end of a constructor body.
pub(crate) fn generate_constructor_fall_off(cg: &mut CodeGen<'_, '_>) -> Result<()> {
    load_variable(MANDATORY_THIS, cg)?;
    if in_derived_constructor(cg) {
        cg.bc.emit(Instruction::ThrowIfSuperNotCorrectCall {
            kind: THIS_MUST_BE_INITIALIZED,
        });
    }
    cg.bc.emit(Instruction::Return {});
    Ok(())
}

/// Body of a constructor the class did not declare: forward every argument
/// to the super constructor for derived classes, only initialize fields
/// otherwise.
pub(crate) fn generate_default_constructor<'a>(class: &'a ClassData, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    cg.bc.set_position(SourcePosition::FunctionStart);
    generate_parameter_bindings(cg);
    cg.bc.enter_debug_scope(cg.function_scope);
    cg.bc.at(&class.range);

    if class.super_class.is_some() {
        let tree = cg.tree();
        let parameters = &tree.variable_scope_data(cg.function_scope).parameters;
        let rest = *parameters
            .last()
            .ok_or_else(|| CompileError::internal("derived default constructor has no rest parameter"))?;
        cg.bc.emit(Instruction::CopyRestArgs { index: 0 });
        store_variable_id(rest, true, cg)?;

        let spread = cg.bc.get_temp();
        let index = cg.bc.get_temp();
        cg.bc.emit(Instruction::CreateEmptyArray {});
        cg.bc.store_accumulator(spread);
        cg.bc.emit(Instruction::Ldai { value: 0 });
        cg.bc.store_accumulator(index);
        load_variable_id(rest, cg)?;
        cg.bc.emit(Instruction::StArraySpread { array: spread, index });
        load_variable(MANDATORY_FUNC_OBJ, cg)?;
        cg.bc.emit(Instruction::SuperCallSpread { args: spread });
        cg.bc.free_temps(&[spread, index]);
        bind_super_result(cg)?;
    } else {
        initialize_instance_fields(class, cg)?;
    }

    generate_constructor_fall_off(cg)?;
    cg.bc.exit_debug_scope();
    Ok(())
}
