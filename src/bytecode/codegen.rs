/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

//! Bytecode generation from the AST.
//!
//! One `CodeGen` compiles one compilation unit: the program root, a
//! function, or a synthesized class constructor. Nested functions are not
//! compiled inline; defining one queues it in `CodeGen::nested` and the
//! driver compiles it as its own unit.
//!
//! ## Conventions
//!
//! Every expression leaves its value in the accumulator. Statements leave
//! nothing behind. Temporaries are taken with `get_temp` and returned with
//! `free_temps` before the statement that took them ends; the body walk
//! checks this after every top-level statement.
//!
//! `CodeGen::scope` always names the scope the recorder recorded the code
//! being emitted in, so that `resolver::resolve` sees the same scope chain
//! the resolver promoted variables from.
//!
//! ## File organization
//!
//! - **Units**: `generate_unit` and the prologues of program and function units
//! - **Variables**: load and store by resolution, `this`
//! - **Statements**: dispatch, blocks, declarations
//! - **Control flow**: if, loops, labels, switch, break/continue/return/throw
//! - **Try/catch/finally**: protected regions and finalizer inlining
//!
//! Expressions and patterns live in `expression`, classes and `super` in
//! `class`.

use rustc_hash::FxHashMap;

use super::class;
use super::debug::SourcePosition;
use super::expression::{
    BindingMode, evaluate_reference, free_reference, generate_binding_pattern, generate_condition,
    generate_expression, store_reference,
};
use super::generator::{BlockBoundaryType, GeneratedCode, Generator, KeyOperand, ProgramTables};
use super::instruction::Instruction;
use super::operand::{Label, Register};
use crate::ast::*;
use crate::error::{CompileError, Result};
use crate::options::CompileOptions;
use crate::recorder::Recording;
use crate::resolver::{self, Resolution};
use crate::scope::{
    DEFAULT_EXPORT_NAME, DeclKind, InitStatus, MANDATORY_ARGUMENTS, MANDATORY_FUNC_OBJ, MANDATORY_THIS, ScopeId, ScopeKind,
    ScopeTree, Storage, VarKind, VariableId,
};
use crate::u32_from_usize;

/// Program-wide inputs shared by every unit.
#[derive(Clone, Copy)]
pub struct UnitContext<'a> {
    pub program: &'a Program,
    pub recording: &'a Recording,
    pub options: &'a CompileOptions,
    /// Function node -> internal name.
    pub internal_names: &'a FxHashMap<NodeId, String>,
}

/// A compilation unit waiting to be generated.
#[derive(Debug, Clone, Copy)]
pub enum UnitSource<'a> {
    Program,
    Function {
        function: &'a FunctionData,
        /// Set when `function` is the constructor of this class.
        class: Option<&'a ClassData>,
        strict: bool,
    },
    DefaultConstructor {
        class: &'a ClassData,
        function: NodeId,
    },
}

impl UnitSource<'_> {
    pub fn node(&self, program: &Program) -> NodeId {
        match self {
            UnitSource::Program => program.id,
            UnitSource::Function { function, .. } => function.id,
            UnitSource::DefaultConstructor { function, .. } => *function,
        }
    }

    pub fn range(&self, program: &Program) -> SourceRange {
        match self {
            UnitSource::Program => program.range,
            UnitSource::Function { function, .. } => function.range,
            UnitSource::DefaultConstructor { class, .. } => class.range,
        }
    }
}

/// Output of one unit, before debug annotation.
pub struct GeneratedUnit<'a> {
    pub scope: ScopeId,
    pub parameter_count: u32,
    pub code: GeneratedCode,
    /// Units defined by this one, in definition order.
    pub nested: Vec<UnitSource<'a>>,
}

/// Code that must run when control leaves a protected statement.
#[derive(Debug, Clone, Copy)]
enum Finalizer<'a> {
    /// A `finally` block, compiled in the scope of its `try` statement.
    Block { block: &'a Block, scope: ScopeId },
    /// The iterator of an enclosing `for-of`.
    CloseIterator(Register),
}

pub struct CodeGen<'a, 't> {
    pub(crate) ctx: UnitContext<'a>,
    pub(crate) bc: Generator<'t>,
    /// Scope the code being emitted was recorded in.
    pub(crate) scope: ScopeId,
    /// Variable scope of the unit.
    pub(crate) function_scope: ScopeId,
    pub(crate) strict: bool,
    /// Class whose constructor this unit is.
    pub(crate) class: Option<&'a ClassData>,
    finalizers: Vec<Finalizer<'a>>,
    pub(crate) nested: Vec<UnitSource<'a>>,
}

impl<'a, 't> CodeGen<'a, 't> {
    pub(crate) fn tree(&self) -> &'a ScopeTree {
        &self.ctx.recording.tree
    }

    pub(crate) fn scope_of(&self, node: NodeId) -> Result<ScopeId> {
        self.ctx.recording.scope_of(node)
    }

    pub(crate) fn internal_name(&self, node: NodeId) -> Result<&'a str> {
        self.ctx
            .internal_names
            .get(&node)
            .map(String::as_str)
            .ok_or_else(|| CompileError::internal(format!("function node {} has no internal name", node.0)))
    }

    /// Kind of the unit's function; `None` for the program root.
    pub(crate) fn unit_kind(&self) -> Option<FunctionKind> {
        let node = self.tree().scope(self.function_scope).node;
        self.ctx.recording.functions.get(&node).map(|info| info.kind)
    }

    /// Run `f` with `scope` as the current scope.
    pub(crate) fn with_scope<R>(&mut self, scope: ScopeId, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let saved = std::mem::replace(&mut self.scope, scope);
        let result = f(self);
        self.scope = saved;
        result
    }
}

// =============================================================================
// Units
// =============================================================================

/// Generate one compilation unit.
pub fn generate_unit<'a>(
    ctx: UnitContext<'a>,
    tables: &mut ProgramTables,
    source: UnitSource<'a>,
) -> Result<GeneratedUnit<'a>> {
    let scope = ctx.recording.scope_of(source.node(ctx.program))?;
    let (strict, class) = match source {
        UnitSource::Program => (ctx.options.strict || ctx.program.is_strict, None),
        UnitSource::Function { class, strict, .. } => (ctx.options.strict || strict, class),
        UnitSource::DefaultConstructor { class, .. } => (true, Some(class)),
    };
    let mut cg = CodeGen {
        ctx,
        bc: Generator::new(tables, ctx.options),
        scope,
        function_scope: scope,
        strict,
        class,
        finalizers: Vec::new(),
        nested: Vec::new(),
    };
    match source {
        UnitSource::Program => generate_program(&mut cg)?,
        UnitSource::Function { function, .. } => generate_function(function, &mut cg)?,
        UnitSource::DefaultConstructor { class, .. } => class::generate_default_constructor(class, &mut cg)?,
    }

    let parameter_count = u32_from_usize(cg.tree().variable_scope_data(scope).parameters.len());
    let CodeGen { bc, nested, .. } = cg;
    Ok(GeneratedUnit {
        scope,
        parameter_count,
        code: bc.finish()?,
        nested,
    })
}

/// Bind every parameter to its register, push the function environment and
/// copy captured parameters into it.
pub(crate) fn generate_parameter_bindings(cg: &mut CodeGen<'_, '_>) {
    let tree = cg.tree();
    let scope = cg.function_scope;
    let parameters = &tree.variable_scope_data(scope).parameters;
    for &parameter in parameters {
        cg.bc.bind_parameter(parameter);
    }
    if let Some(env) = tree.scope(scope).env.as_ref().filter(|env| env.needs_env) {
        cg.bc.new_lexical_env(&env.slot_names);
    }
    for &parameter in parameters {
        if let Some(slot) = tree.variable(parameter).lex_slot {
            let register = cg.bc.register_for(parameter);
            cg.bc.load_accumulator(register);
            cg.bc.store_lex_var(0, slot);
        }
    }
}

fn generate_program(cg: &mut CodeGen<'_, '_>) -> Result<()> {
    let program = cg.ctx.program;
    cg.bc.set_position(SourcePosition::FunctionStart);
    generate_parameter_bindings(cg);
    cg.bc.enter_debug_scope(cg.function_scope);

    if let Some(record) = &cg.ctx.recording.module_record {
        for (index, entry) in record.namespace_imports.iter().enumerate() {
            cg.bc.emit(Instruction::GetModuleNamespace {
                index: u32_from_usize(index),
            });
            store_variable(&entry.local_name, true, cg)?;
        }
    }
    generate_hoisting(&program.statements, cg)?;
    generate_body_statements(&program.statements, cg)?;
    if !cg.bc.is_terminated() {
        cg.bc.emit(Instruction::ReturnUndefined {});
    }
    cg.bc.exit_debug_scope();
    Ok(())
}

fn generate_function<'a>(function: &'a FunctionData, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    let tree = cg.tree();
    let scope = cg.function_scope;
    let kind = function.kind;
    cg.bc.set_position(SourcePosition::FunctionStart);
    generate_parameter_bindings(cg);
    cg.bc.enter_debug_scope(scope);

    // A named function expression sees itself under its own name.
    if function.is_expression
        && let Some(ident) = &function.name
        && let Some(variable) = tree.find_local(scope, &ident.name)
        && tree.variable(variable).kind == VarKind::Function
        && !tree.variable(variable).is_parameter
    {
        load_variable(MANDATORY_FUNC_OBJ, cg)?;
        store_variable_id(variable, true, cg)?;
    }

    if let Some(arguments) = tree.find_local(scope, MANDATORY_ARGUMENTS)
        && !tree.variable(arguments).is_parameter
        && tree.variable(arguments).kind == VarKind::Const
    {
        cg.bc.emit(Instruction::GetUnmappedArgs {});
        store_variable_id(arguments, true, cg)?;
    }

    generate_parameter_initializers(function, cg)?;

    match &function.body {
        FunctionBody::Block(block) => {
            generate_hoisting(&block.statements, cg)?;
            if kind == FunctionKind::Constructor
                && let Some(class) = cg.class
                && !cg.ctx.recording.derived_classes.contains(&class.id)
            {
                class::initialize_instance_fields(class, cg)?;
            }

            let body_scope = cg.scope_of(block.id)?;
            cg.with_scope(body_scope, |cg| {
                cg.bc.enter_debug_scope(body_scope);
                generate_body_statements(&block.statements, cg)?;
                cg.bc.exit_debug_scope();
                Ok(())
            })?;
            if !cg.bc.is_terminated() {
                if kind == FunctionKind::Constructor {
                    class::generate_constructor_fall_off(cg)?;
                } else {
                    cg.bc.emit(Instruction::ReturnUndefined {});
                }
            }
        }
        FunctionBody::Expression(expression) => {
            generate_expression(expression, cg)?;
            cg.bc.emit(Instruction::Return {});
        }
    }
    cg.bc.exit_debug_scope();
    Ok(())
}

/// Rest parameters, defaults and destructured parameters, in order.
fn generate_parameter_initializers<'a>(function: &'a FunctionData, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    let parameters = &cg.tree().variable_scope_data(cg.function_scope).parameters;
    let hidden = parameters
        .len()
        .checked_sub(function.parameters.len())
        .ok_or_else(|| CompileError::internal("function has fewer bound parameters than declared"))?;

    for (index, parameter) in function.parameters.iter().enumerate() {
        let variable = parameters[hidden + index];
        cg.bc.at(&parameter.range);
        if parameter.is_rest {
            cg.bc.emit(Instruction::CopyRestArgs {
                index: u32_from_usize(index),
            });
            store_variable_id(variable, true, cg)?;
        } else if let Some(default) = &parameter.default {
            let has_value = Label::fresh();
            let undefined = cg.bc.get_temp();
            cg.bc.emit(Instruction::LdUndefined {});
            cg.bc.store_accumulator(undefined);
            load_variable_id(variable, cg)?;
            cg.bc.emit(Instruction::StrictEq { lhs: undefined });
            cg.bc.free_temps(&[undefined]);
            cg.bc.emit(Instruction::Jeqz { target: has_value });
            generate_expression(default, cg)?;
            store_variable_id(variable, true, cg)?;
            cg.bc.label(has_value);
        }

        if let BindingTarget::Pattern(pattern) = &parameter.target {
            let value = cg.bc.get_temp();
            load_variable_id(variable, cg)?;
            cg.bc.store_accumulator(value);
            generate_binding_pattern(pattern, value, BindingMode::Declaration, cg)?;
            cg.bc.free_temps(&[value]);
        }
    }
    Ok(())
}

/// Initialize hoisted vars to `undefined` and define the function
/// declarations of a function body or of the program.
fn generate_hoisting<'a>(statements: &'a [Statement], cg: &mut CodeGen<'a, '_>) -> Result<()> {
    let tree = cg.tree();
    let scope = cg.function_scope;
    let is_global = tree.scope(scope).kind == ScopeKind::Global;
    for (name, decl) in &tree.variable_scope_data(scope).hoisted {
        if decl.kind != DeclKind::Var {
            continue;
        }
        // Parameters, `arguments` and functions of the same name win.
        let is_plain_var = tree
            .find_local(scope, name)
            .is_some_and(|variable| tree.variable(variable).kind == VarKind::Var && !tree.variable(variable).is_parameter);
        if !is_plain_var {
            continue;
        }
        cg.bc.emit(Instruction::LdUndefined {});
        if is_global {
            cg.bc.store_global_var(name);
        } else {
            store_variable(name, true, cg)?;
        }
    }

    for statement in statements {
        let StatementKind::FunctionDeclaration { function, export } = &statement.inner else {
            continue;
        };
        let name = match (&function.name, export) {
            (Some(ident), _) => ident.name.as_str(),
            (None, ExportKind::Default) => DEFAULT_EXPORT_NAME,
            (None, _) => continue,
        };
        cg.bc.at(&statement.range);
        define_function(function, cg)?;
        store_variable(name, true, cg)?;
    }
    Ok(())
}

/// Top-level statements of a unit. No temporary may outlive a statement.
fn generate_body_statements<'a>(statements: &'a [Statement], cg: &mut CodeGen<'a, '_>) -> Result<()> {
    for statement in statements {
        generate_statement(statement, cg)?;
        if cg.bc.live_temps() != 0 {
            return Err(CompileError::internal(format!(
                "{} temporary register(s) still live after the statement at {}:{}",
                cg.bc.live_temps(),
                statement.range.start.line,
                statement.range.start.column
            )));
        }
    }
    Ok(())
}

/// Emit `definefunc` for `function` and queue its unit.
pub(crate) fn define_function<'a>(function: &'a FunctionData, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    let length = cg.ctx.recording.function(function.id)?.parameter_length;
    let name = cg.internal_name(function.id)?;
    let function_name = cg.bc.intern(name);
    cg.bc.emit(Instruction::DefineFunc {
        function: function_name,
        length,
    });
    cg.nested.push(UnitSource::Function {
        function,
        class: None,
        strict: cg.strict || function.is_strict,
    });
    Ok(())
}

/// Emit `definemethod` for `function` with the home object in `acc`.
pub(crate) fn define_method<'a>(function: &'a FunctionData, strict: bool, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    let length = cg.ctx.recording.function(function.id)?.parameter_length;
    let name = cg.internal_name(function.id)?;
    let function_name = cg.bc.intern(name);
    cg.bc.emit(Instruction::DefineMethod {
        function: function_name,
        length,
    });
    cg.nested.push(UnitSource::Function {
        function,
        class: None,
        strict: strict || cg.strict || function.is_strict,
    });
    Ok(())
}

// =============================================================================
// Variables
// =============================================================================

fn resolve_name(name: &str, cg: &CodeGen<'_, '_>) -> Result<Resolution> {
    resolver::resolve(cg.tree(), cg.scope, name, cg.ctx.options.commonjs)
}

/// Resolution of a variable of the current unit, known by id.
fn local_resolution(variable: VariableId, cg: &CodeGen<'_, '_>) -> Resolution {
    let tree = cg.tree();
    match tree.variable(variable).lex_slot {
        Some(slot) => Resolution::Lexical {
            variable,
            level: resolver::level(tree, cg.scope, variable),
            slot,
        },
        None => Resolution::Register(variable),
    }
}

pub(crate) fn load_variable(name: &str, cg: &mut CodeGen<'_, '_>) -> Result<()> {
    let resolution = resolve_name(name, cg)?;
    load_resolved(name, resolution, cg)
}

pub(crate) fn load_variable_id(variable: VariableId, cg: &mut CodeGen<'_, '_>) -> Result<()> {
    let name = cg.tree().variable(variable).name.as_str();
    let resolution = local_resolution(variable, cg);
    load_resolved(name, resolution, cg)
}

/// Store `acc` to `name`. A declaration store initializes the binding and
/// skips the TDZ and const guards.
pub(crate) fn store_variable(name: &str, declaration: bool, cg: &mut CodeGen<'_, '_>) -> Result<()> {
    let resolution = resolve_name(name, cg)?;
    store_resolved(name, resolution, declaration, cg)
}

pub(crate) fn store_variable_id(variable: VariableId, declaration: bool, cg: &mut CodeGen<'_, '_>) -> Result<()> {
    let name = cg.tree().variable(variable).name.as_str();
    let resolution = local_resolution(variable, cg);
    store_resolved(name, resolution, declaration, cg)
}

/// The variable may still hold the hole at this point of the unit.
fn may_be_uninitialized(variable: VariableId, cg: &CodeGen<'_, '_>) -> bool {
    cg.tree().variable(variable).initial_status == InitStatus::Uninitialized && !cg.bc.is_initialized(variable)
}

fn has_temporal_dead_zone(variable: VariableId, cg: &CodeGen<'_, '_>) -> bool {
    let variable = cg.tree().variable(variable);
    variable.kind.has_temporal_dead_zone() && variable.initial_status == InitStatus::Uninitialized
}

/// Const bindings, and a class's own name seen from inside its body.
fn is_immutable(variable: VariableId, cg: &CodeGen<'_, '_>) -> bool {
    let data = cg.tree().variable(variable);
    let is_const = data.kind == VarKind::Const && !data.is_parameter && data.name != MANDATORY_ARGUMENTS;
    is_const || is_class_self_binding(variable, cg)
}

fn is_class_self_binding(variable: VariableId, cg: &CodeGen<'_, '_>) -> bool {
    let tree = cg.tree();
    let data = tree.variable(variable);
    if data.kind != VarKind::Class {
        return false;
    }
    tree.ancestors(cg.scope).any(|scope| {
        cg.ctx
            .recording
            .class_bindings
            .get(&scope)
            .is_some_and(|name| *name == data.name)
            && resolver::find(tree, scope, &data.name).is_some_and(|(found, _)| found == variable)
    })
}

fn module_slot(variable: VariableId, cg: &CodeGen<'_, '_>) -> Result<(u32, bool)> {
    match cg.tree().variable(variable).storage {
        Storage::Module { index, external } => Ok((index, external)),
        other => Err(CompileError::internal(format!(
            "module access to a variable with {other:?} storage"
        ))),
    }
}

fn load_resolved(name: &str, resolution: Resolution, cg: &mut CodeGen<'_, '_>) -> Result<()> {
    let tree = cg.tree();
    match resolution {
        Resolution::Unresolved => match name {
            "NaN" => cg.bc.emit(Instruction::LdNan {}),
            "Infinity" => cg.bc.emit(Instruction::LdInfinity {}),
            "globalThis" => cg.bc.emit(Instruction::LdGlobal {}),
            "undefined" => cg.bc.emit(Instruction::LdUndefined {}),
            _ => cg.bc.try_load_global_by_name(name),
        },
        Resolution::Global(variable) => match tree.variable(variable).kind {
            VarKind::Var | VarKind::Function => cg.bc.load_global_var(name),
            _ => cg.bc.try_load_global_by_name(name),
        },
        Resolution::GlobalRecord(_) => cg.bc.try_load_global_by_name(name),
        Resolution::Module(variable) => {
            let (index, external) = module_slot(variable, cg)?;
            if external {
                cg.bc.emit(Instruction::LdExternalModuleVar { index });
            } else {
                cg.bc.emit(Instruction::LdLocalModuleVar { index });
                if may_be_uninitialized(variable, cg) {
                    cg.bc.throw_undefined_if_hole(name);
                }
            }
        }
        Resolution::Register(variable) => {
            if may_be_uninitialized(variable, cg) {
                cg.bc.emit(Instruction::LdHole {});
                cg.bc.throw_undefined_if_hole(name);
            } else {
                let register = cg.bc.register_for(variable);
                cg.bc.load_accumulator(register);
            }
        }
        Resolution::Lexical { variable, level, slot } => {
            cg.bc.load_lex_var(level, slot);
            if has_temporal_dead_zone(variable, cg) {
                cg.bc.throw_undefined_if_hole(name);
            }
        }
    }
    Ok(())
}

/// `name = acc` for a name without an initialized binding.
fn store_global_by_name(name: &str, cg: &mut CodeGen<'_, '_>) {
    if cg.strict {
        cg.bc.try_store_global_by_name(name);
    } else {
        cg.bc.store_global_var(name);
    }
}

fn store_resolved(name: &str, resolution: Resolution, declaration: bool, cg: &mut CodeGen<'_, '_>) -> Result<()> {
    let tree = cg.tree();
    match resolution {
        Resolution::Unresolved => store_global_by_name(name, cg),
        Resolution::Global(variable) => match tree.variable(variable).kind {
            VarKind::Var | VarKind::Function => cg.bc.store_global_var(name),
            _ => store_global_by_name(name, cg),
        },
        Resolution::GlobalRecord(variable) => {
            if declaration {
                let name = cg.bc.intern(name);
                cg.bc.emit(match tree.variable(variable).kind {
                    VarKind::Const => Instruction::StConstToGlobalRecord { name },
                    VarKind::Class => Instruction::StClassToGlobalRecord { name },
                    _ => Instruction::StLetToGlobalRecord { name },
                });
            } else if is_immutable(variable, cg) {
                cg.bc.throw_const_assignment(name);
            } else {
                cg.bc.try_store_global_by_name(name);
            }
        }
        Resolution::Module(variable) => {
            let (index, external) = module_slot(variable, cg)?;
            if external {
                cg.bc.throw_const_assignment(name);
                return Ok(());
            }
            if !declaration {
                if may_be_uninitialized(variable, cg) {
                    let value = cg.bc.get_temp();
                    cg.bc.store_accumulator(value);
                    cg.bc.emit(Instruction::LdLocalModuleVar { index });
                    cg.bc.throw_undefined_if_hole(name);
                    cg.bc.load_accumulator(value);
                    cg.bc.free_temps(&[value]);
                }
                if is_immutable(variable, cg) {
                    cg.bc.throw_const_assignment(name);
                    return Ok(());
                }
            }
            cg.bc.emit(Instruction::StModuleVar { index });
            if declaration {
                cg.bc.mark_initialized(variable);
            }
        }
        Resolution::Register(variable) => {
            if !declaration {
                if may_be_uninitialized(variable, cg) {
                    let value = cg.bc.get_temp();
                    cg.bc.store_accumulator(value);
                    cg.bc.emit(Instruction::LdHole {});
                    cg.bc.throw_undefined_if_hole(name);
                    cg.bc.load_accumulator(value);
                    cg.bc.free_temps(&[value]);
                }
                if is_immutable(variable, cg) {
                    cg.bc.throw_const_assignment(name);
                    return Ok(());
                }
            }
            let register = cg.bc.register_for(variable);
            cg.bc.store_accumulator(register);
            if declaration {
                cg.bc.mark_initialized(variable);
            }
        }
        Resolution::Lexical { variable, level, slot } => {
            if !declaration {
                if has_temporal_dead_zone(variable, cg) {
                    let value = cg.bc.get_temp();
                    cg.bc.store_accumulator(value);
                    cg.bc.load_lex_var(level, slot);
                    cg.bc.throw_undefined_if_hole(name);
                    cg.bc.load_accumulator(value);
                    cg.bc.free_temps(&[value]);
                }
                if is_immutable(variable, cg) {
                    cg.bc.throw_const_assignment(name);
                    return Ok(());
                }
            }
            cg.bc.store_lex_var(level, slot);
        }
    }
    Ok(())
}

/// Whether an identifier has no binding a program could have initialized,
/// so that reading it must not throw.
pub(crate) fn is_unscoped(name: &str, cg: &CodeGen<'_, '_>) -> Result<bool> {
    Ok(match resolve_name(name, cg)? {
        Resolution::Unresolved => true,
        Resolution::Global(variable) => cg.tree().variable(variable).kind == VarKind::None,
        _ => false,
    })
}

/// Whether a `delete` of this identifier removes a property of the global object.
pub(crate) fn is_global_name(name: &str, cg: &CodeGen<'_, '_>) -> Result<bool> {
    Ok(matches!(
        resolve_name(name, cg)?,
        Resolution::Unresolved | Resolution::Global(_)
    ))
}

pub(crate) fn load_this(cg: &mut CodeGen<'_, '_>) -> Result<()> {
    if cg.bc.watch_mode {
        cg.bc.load_by_name_via_debugger("this", true);
        return Ok(());
    }
    load_variable(MANDATORY_THIS, cg)?;
    if class::in_derived_constructor(cg) {
        cg.bc.emit(Instruction::ThrowIfSuperNotCorrectCall { kind: 0 });
    }
    Ok(())
}

// =============================================================================
// Statements
// =============================================================================

pub(crate) fn generate_statement<'a>(statement: &'a Statement, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    cg.bc.at(&statement.range);
    match &statement.inner {
        StatementKind::Empty => {}
        StatementKind::Debugger => cg.bc.emit(Instruction::Debugger {}),
        StatementKind::Block(block) => generate_block(block, cg)?,
        StatementKind::Variable { declaration, .. } => generate_variable_declaration(declaration, cg)?,
        StatementKind::Expression(expression) => generate_expression(expression, cg)?,
        StatementKind::If {
            test,
            consequent,
            alternate,
        } => generate_if_statement(statement, test, consequent, alternate.as_deref(), cg)?,
        StatementKind::While { .. }
        | StatementKind::DoWhile { .. }
        | StatementKind::For { .. }
        | StatementKind::ForIn { .. }
        | StatementKind::ForOf { .. } => generate_loop(statement, Vec::new(), cg)?,
        StatementKind::Continue(label) => generate_continue(label.as_deref(), &statement.range, cg)?,
        StatementKind::Break(label) => generate_break(label.as_deref(), &statement.range, cg)?,
        StatementKind::Return(value) => generate_return(value.as_ref(), cg)?,
        StatementKind::Labelled { .. } => generate_labelled_statement(statement, Vec::new(), cg)?,
        StatementKind::Throw(expression) => generate_throw(expression, cg)?,
        StatementKind::Try {
            block,
            handler,
            finalizer,
        } => generate_try_statement(block, handler.as_ref(), finalizer.as_ref(), cg)?,
        StatementKind::Switch { discriminant, cases } => {
            generate_switch_statement(statement, discriminant, cases, Vec::new(), cg)?
        }
        // Defined on entry to the scope that binds them.
        StatementKind::FunctionDeclaration { .. } => {}
        StatementKind::ClassDeclaration { class, export } => {
            let binding = match (&class.name, export) {
                (Some(ident), _) => Some(ident.name.as_str()),
                (None, ExportKind::Default) => Some(DEFAULT_EXPORT_NAME),
                (None, _) => None,
            };
            class::generate_class(class, binding, cg)?;
        }
        StatementKind::Import(_) | StatementKind::Export(_) => {}
        StatementKind::ExportDefault(expression) => {
            generate_expression(expression, cg)?;
            store_variable(DEFAULT_EXPORT_NAME, true, cg)?;
        }
    }
    Ok(())
}

pub(crate) fn generate_block<'a>(block: &'a Block, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    let scope = cg.scope_of(block.id)?;
    cg.with_scope(scope, |cg| {
        cg.bc.enter_debug_scope(scope);
        instantiate_block_functions(&block.statements, cg)?;
        for statement in &block.statements {
            generate_statement(statement, cg)?;
        }
        cg.bc.exit_debug_scope();
        Ok(())
    })
}

/// Define the function declarations the current block scope binds.
fn instantiate_block_functions<'a>(
    statements: impl IntoIterator<Item = &'a Statement>,
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    let tree = cg.tree();
    for statement in statements {
        let StatementKind::FunctionDeclaration { function, .. } = &statement.inner else {
            continue;
        };
        let Some(ident) = &function.name else {
            continue;
        };
        if tree.find_local(cg.scope, &ident.name).is_none() {
            continue;
        }
        cg.bc.at(&statement.range);
        define_function(function, cg)?;
        store_variable(&ident.name, true, cg)?;
    }
    Ok(())
}

pub(crate) fn generate_variable_declaration<'a>(
    declaration: &'a VariableDeclaration,
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    for declarator in &declaration.declarators {
        cg.bc.at(&declarator.range);
        match (&declarator.target, &declarator.init) {
            (BindingTarget::Identifier(ident), Some(init)) => {
                generate_expression(init, cg)?;
                store_variable(&ident.name, true, cg)?;
            }
            (BindingTarget::Identifier(_), None) if declaration.kind == DeclarationKind::Var => {}
            (BindingTarget::Identifier(ident), None) => {
                cg.bc.emit(Instruction::LdUndefined {});
                store_variable(&ident.name, true, cg)?;
            }
            (BindingTarget::Pattern(pattern), init) => {
                match init {
                    Some(init) => generate_expression(init, cg)?,
                    None => cg.bc.emit(Instruction::LdUndefined {}),
                }
                let value = cg.bc.get_temp();
                cg.bc.store_accumulator(value);
                generate_binding_pattern(pattern, value, BindingMode::Declaration, cg)?;
                cg.bc.free_temps(&[value]);
            }
        }
    }
    Ok(())
}

// =============================================================================
// If
// =============================================================================

fn generate_if_statement<'a>(
    statement: &'a Statement,
    test: &'a Expression,
    consequent: &'a Statement,
    alternate: Option<&'a Statement>,
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    let scope = cg.scope_of(statement.id)?;
    cg.with_scope(scope, |cg| {
        instantiate_block_functions(std::iter::once(consequent).chain(alternate), cg)?;
        let else_label = Label::fresh();
        generate_condition(test, else_label, cg)?;
        generate_statement(consequent, cg)?;
        match alternate {
            Some(alternate) => {
                let end = Label::fresh();
                if !cg.bc.is_terminated() {
                    cg.bc.branch(end);
                }
                cg.bc.label(else_label);
                generate_statement(alternate, cg)?;
                cg.bc.label(end);
            }
            None => cg.bc.label(else_label),
        }
        Ok(())
    })
}

// =============================================================================
// Loops
// =============================================================================

fn is_loop(statement: &Statement) -> bool {
    matches!(
        statement.inner,
        StatementKind::While { .. }
            | StatementKind::DoWhile { .. }
            | StatementKind::For { .. }
            | StatementKind::ForIn { .. }
            | StatementKind::ForOf { .. }
    )
}

fn generate_loop<'a>(statement: &'a Statement, labels: Vec<String>, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    let scope = cg.scope_of(statement.id)?;
    match &statement.inner {
        StatementKind::While { test, body } => {
            cg.with_scope(scope, |cg| generate_while_statement(scope, test, body, labels, cg))
        }
        StatementKind::DoWhile { body, test } => {
            cg.with_scope(scope, |cg| generate_do_while_statement(scope, body, test, labels, cg))
        }
        StatementKind::For {
            init,
            test,
            update,
            body,
        } => cg.with_scope(scope, |cg| {
            generate_for_statement(scope, init.as_ref(), test.as_ref(), update.as_ref(), body, labels, cg)
        }),
        // The iterated value is evaluated before the loop scope is entered.
        StatementKind::ForIn { lhs, rhs, body } => {
            generate_expression(rhs, cg)?;
            cg.with_scope(scope, |cg| generate_for_in_statement(scope, lhs, body, labels, cg))
        }
        StatementKind::ForOf { lhs, rhs, body } => {
            generate_expression(rhs, cg)?;
            cg.with_scope(scope, |cg| generate_for_of_statement(scope, lhs, body, labels, cg))
        }
        _ => Err(CompileError::internal("loop lowering called on a non-loop statement")),
    }
}

/// Slot names of a loop scope that owns a per-iteration environment.
fn loop_environment<'a>(scope: ScopeId, cg: &CodeGen<'a, '_>) -> Option<&'a [String]> {
    cg.tree()
        .scope(scope)
        .env
        .as_ref()
        .filter(|env| env.needs_env)
        .map(|env| env.slot_names.as_slice())
}

fn push_loop_environment(environment: Option<&[String]>, cg: &mut CodeGen<'_, '_>) {
    if let Some(slot_names) = environment {
        cg.bc.new_lexical_env(slot_names);
        cg.bc.start_boundary(BlockBoundaryType::LeaveLexicalEnvironment);
    }
}

fn pop_loop_environment(environment: Option<&[String]>, cg: &mut CodeGen<'_, '_>) {
    if environment.is_some() {
        cg.bc.end_boundary(BlockBoundaryType::LeaveLexicalEnvironment);
        cg.bc.pop_lexical_env();
    }
}

fn generate_while_statement<'a>(
    scope: ScopeId,
    test: &'a Expression,
    body: &'a Statement,
    labels: Vec<String>,
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    let environment = loop_environment(scope, cg);
    let start = Label::fresh();
    let continue_target = Label::fresh();
    let exit = Label::fresh();
    let end = Label::fresh();

    cg.bc.begin_breakable_scope(end, labels.clone(), true);
    cg.bc.label(start);
    push_loop_environment(environment, cg);
    generate_condition(test, exit, cg)?;

    cg.bc.begin_continuable_scope(continue_target, labels);
    generate_statement(body, cg)?;
    cg.bc.end_continuable_scope();

    cg.bc.label(continue_target);
    if environment.is_some() {
        cg.bc.pop_lexical_env();
    }
    cg.bc.branch(start);

    cg.bc.label(exit);
    pop_loop_environment(environment, cg);
    cg.bc.end_breakable_scope();
    cg.bc.label(end);
    Ok(())
}

fn generate_do_while_statement<'a>(
    scope: ScopeId,
    body: &'a Statement,
    test: &'a Expression,
    labels: Vec<String>,
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    let environment = loop_environment(scope, cg);
    let start = Label::fresh();
    let continue_target = Label::fresh();
    let end = Label::fresh();

    cg.bc.begin_breakable_scope(end, labels.clone(), true);
    cg.bc.label(start);
    push_loop_environment(environment, cg);

    cg.bc.begin_continuable_scope(continue_target, labels);
    generate_statement(body, cg)?;
    cg.bc.end_continuable_scope();

    cg.bc.label(continue_target);
    generate_expression(test, cg)?;
    pop_loop_environment(environment, cg);
    cg.bc.jump_if_true(start);

    cg.bc.end_breakable_scope();
    cg.bc.label(end);
    Ok(())
}

fn generate_for_statement<'a>(
    scope: ScopeId,
    init: Option<&'a ForInit>,
    test: Option<&'a Expression>,
    update: Option<&'a Expression>,
    body: &'a Statement,
    labels: Vec<String>,
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    let environment = loop_environment(scope, cg);
    let start = Label::fresh();
    let continue_target = Label::fresh();
    let exit = Label::fresh();
    let end = Label::fresh();

    cg.bc.begin_breakable_scope(end, labels.clone(), true);
    push_loop_environment(environment, cg);
    match init {
        Some(ForInit::Declaration(declaration)) => generate_variable_declaration(declaration, cg)?,
        Some(ForInit::Expression(expression)) => generate_expression(expression, cg)?,
        None => {}
    }

    cg.bc.label(start);
    if let Some(test) = test {
        generate_condition(test, exit, cg)?;
    }

    cg.bc.begin_continuable_scope(continue_target, labels);
    generate_statement(body, cg)?;
    cg.bc.end_continuable_scope();

    cg.bc.label(continue_target);
    if let Some(slot_names) = environment {
        copy_iteration_environment(slot_names, cg);
    }
    if let Some(update) = update {
        generate_expression(update, cg)?;
    }
    cg.bc.branch(start);

    cg.bc.label(exit);
    pop_loop_environment(environment, cg);
    cg.bc.end_breakable_scope();
    cg.bc.label(end);
    Ok(())
}

/// Give the next iteration of a `for` loop a fresh environment holding the
/// current values.
fn copy_iteration_environment(slot_names: &[String], cg: &mut CodeGen<'_, '_>) {
    let temps: Vec<Register> = slot_names.iter().map(|_| cg.bc.get_temp()).collect();
    for (slot, temp) in temps.iter().enumerate() {
        cg.bc.load_lex_var(0, u32_from_usize(slot));
        cg.bc.store_accumulator(*temp);
    }
    cg.bc.pop_lexical_env();
    cg.bc.new_lexical_env(slot_names);
    for (slot, temp) in temps.iter().enumerate() {
        cg.bc.load_accumulator(*temp);
        cg.bc.store_lex_var(0, u32_from_usize(slot));
    }
    cg.bc.free_temps(&temps);
}

/// `for (lhs in acc) body`
fn generate_for_in_statement<'a>(
    scope: ScopeId,
    lhs: &'a ForInOfLhs,
    body: &'a Statement,
    labels: Vec<String>,
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    let environment = loop_environment(scope, cg);
    let start = Label::fresh();
    let continue_target = Label::fresh();
    let end = Label::fresh();

    let iterator = cg.bc.get_temp();
    let key = cg.bc.get_temp();
    cg.bc.emit(Instruction::GetPropIterator {});
    cg.bc.store_accumulator(iterator);

    cg.bc.begin_breakable_scope(end, labels.clone(), true);
    cg.bc.label(start);
    cg.bc.emit(Instruction::GetNextPropName { iterator });
    cg.bc.store_accumulator(key);
    cg.bc.emit(Instruction::LdUndefined {});
    cg.bc.emit(Instruction::StrictEq { lhs: key });
    cg.bc.emit(Instruction::Jnez { target: end });

    push_loop_environment(environment, cg);
    generate_for_in_of_binding(lhs, key, cg)?;
    cg.bc.begin_continuable_scope(continue_target, labels);
    generate_statement(body, cg)?;
    cg.bc.end_continuable_scope();

    cg.bc.label(continue_target);
    pop_loop_environment(environment, cg);
    cg.bc.branch(start);

    cg.bc.end_breakable_scope();
    cg.bc.label(end);
    cg.bc.free_temps(&[iterator, key]);
    Ok(())
}

/// `for (lhs of acc) body`. Leaving the loop early closes the iterator.
fn generate_for_of_statement<'a>(
    scope: ScopeId,
    lhs: &'a ForInOfLhs,
    body: &'a Statement,
    labels: Vec<String>,
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    let environment = loop_environment(scope, cg);
    let start = Label::fresh();
    let continue_target = Label::fresh();
    let handler = Label::fresh();
    let end = Label::fresh();

    let iterator = cg.bc.get_temp();
    let next = cg.bc.get_temp();
    let result = cg.bc.get_temp();
    let value = cg.bc.get_temp();
    cg.bc.emit(Instruction::GetIterator {});
    cg.bc.store_accumulator(iterator);
    cg.bc.load_obj_property(iterator, KeyOperand::Name("next"));
    cg.bc.store_accumulator(next);

    cg.bc.begin_breakable_scope(end, labels.clone(), true);
    let finalizer = cg.finalizers.len();
    cg.finalizers.push(Finalizer::CloseIterator(iterator));
    cg.bc.start_boundary(BlockBoundaryType::ReturnToFinally(finalizer));

    cg.bc.label(start);
    cg.bc.load_accumulator(next);
    cg.bc.emit(Instruction::CallThis {
        this: iterator,
        args: Vec::new(),
    });
    cg.bc.store_accumulator(result);
    cg.bc.emit(Instruction::ThrowIfNotObject { value: result });
    cg.bc.load_obj_property(result, KeyOperand::Name("done"));
    cg.bc.jump_if_true(end);
    cg.bc.load_obj_property(result, KeyOperand::Name("value"));
    cg.bc.store_accumulator(value);

    let region = cg.bc.begin_try_region(handler);
    push_loop_environment(environment, cg);
    generate_for_in_of_binding(lhs, value, cg)?;
    cg.bc.begin_continuable_scope(continue_target, labels);
    generate_statement(body, cg)?;
    cg.bc.end_continuable_scope();

    cg.bc.label(continue_target);
    pop_loop_environment(environment, cg);
    cg.bc.end_try_region(region);
    cg.bc.branch(start);

    cg.bc.label(handler);
    let exception = cg.bc.get_temp();
    cg.bc.store_accumulator(exception);
    cg.bc.emit(Instruction::CloseIterator { iterator });
    cg.bc.load_accumulator(exception);
    cg.bc.emit(Instruction::Throw {});
    cg.bc.free_temps(&[exception]);

    cg.bc.end_boundary(BlockBoundaryType::ReturnToFinally(finalizer));
    cg.bc.end_breakable_scope();
    cg.bc.label(end);
    cg.bc.free_temps(&[iterator, next, result, value]);
    Ok(())
}

/// Bind the value in `value` to the left-hand side of a for-in/of loop.
fn generate_for_in_of_binding<'a>(lhs: &'a ForInOfLhs, value: Register, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    match lhs {
        ForInOfLhs::Declaration(declaration) => {
            for declarator in &declaration.declarators {
                match &declarator.target {
                    BindingTarget::Identifier(ident) => {
                        cg.bc.load_accumulator(value);
                        store_variable(&ident.name, true, cg)?;
                    }
                    BindingTarget::Pattern(pattern) => {
                        generate_binding_pattern(pattern, value, BindingMode::Declaration, cg)?
                    }
                }
            }
        }
        ForInOfLhs::Target(target) => {
            let reference = evaluate_reference(target, cg)?;
            cg.bc.load_accumulator(value);
            store_reference(&reference, cg)?;
            free_reference(reference, cg);
        }
    }
    Ok(())
}

// =============================================================================
// Labels and switch
// =============================================================================

fn generate_labelled_statement<'a>(
    statement: &'a Statement,
    mut labels: Vec<String>,
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    let StatementKind::Labelled { label, body } = &statement.inner else {
        return Err(CompileError::internal("expected a labelled statement"));
    };
    labels.push(label.clone());
    let scope = cg.scope_of(statement.id)?;
    cg.with_scope(scope, |cg| {
        instantiate_block_functions(std::iter::once(body.as_ref()), cg)?;
        cg.bc.at(&body.range);
        match &body.inner {
            StatementKind::Labelled { .. } => generate_labelled_statement(body, labels, cg),
            StatementKind::Switch { discriminant, cases } => {
                generate_switch_statement(body, discriminant, cases, labels, cg)
            }
            _ if is_loop(body) => generate_loop(body, labels, cg),
            _ => {
                let end = Label::fresh();
                cg.bc.begin_breakable_scope(end, labels, false);
                generate_statement(body, cg)?;
                cg.bc.end_breakable_scope();
                cg.bc.label(end);
                Ok(())
            }
        }
    })
}

fn generate_switch_statement<'a>(
    statement: &'a Statement,
    discriminant: &'a Expression,
    cases: &'a [SwitchCase],
    labels: Vec<String>,
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    generate_expression(discriminant, cg)?;
    let value = cg.bc.get_temp();
    cg.bc.store_accumulator(value);

    let scope = cg.scope_of(statement.id)?;
    cg.with_scope(scope, |cg| {
        let end = Label::fresh();
        cg.bc.begin_breakable_scope(end, labels, true);
        instantiate_block_functions(cases.iter().flat_map(|case| &case.body), cg)?;

        let case_labels: Vec<Label> = cases.iter().map(|_| Label::fresh()).collect();
        let mut default = None;
        for (case, label) in cases.iter().zip(&case_labels) {
            match &case.test {
                Some(test) => {
                    generate_expression(test, cg)?;
                    cg.bc.emit(Instruction::StrictEq { lhs: value });
                    cg.bc.emit(Instruction::Jnez { target: *label });
                }
                None => default = Some(*label),
            }
        }
        cg.bc.branch(default.unwrap_or(end));

        for (case, label) in cases.iter().zip(case_labels) {
            cg.bc.label(label);
            for statement in &case.body {
                generate_statement(statement, cg)?;
            }
        }
        cg.bc.end_breakable_scope();
        cg.bc.label(end);
        Ok(())
    })?;
    cg.bc.free_temps(&[value]);
    Ok(())
}

// =============================================================================
// Jumps
// =============================================================================

fn generate_break(label: Option<&str>, range: &SourceRange, cg: &mut CodeGen<'_, '_>) -> Result<()> {
    let Some((target, depth)) = cg
        .bc
        .find_breakable_scope(label)
        .map(|scope| (scope.bytecode_target, scope.depth))
    else {
        return Err(CompileError::internal(format!(
            "no break target at {}:{}",
            range.start.line, range.start.column
        )));
    };
    unwind_boundaries(depth + 1, cg)?;
    cg.bc.branch(target);
    Ok(())
}

fn generate_continue(label: Option<&str>, range: &SourceRange, cg: &mut CodeGen<'_, '_>) -> Result<()> {
    let Some((target, depth)) = cg
        .bc
        .find_continuable_scope(label)
        .map(|scope| (scope.bytecode_target, scope.depth))
    else {
        return Err(CompileError::internal(format!(
            "no continue target at {}:{}",
            range.start.line, range.start.column
        )));
    };
    unwind_boundaries(depth + 1, cg)?;
    cg.bc.branch(target);
    Ok(())
}

fn generate_return<'a>(value: Option<&'a Expression>, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    let is_constructor = cg.unit_kind() == Some(FunctionKind::Constructor);
    if is_constructor && class::in_derived_constructor(cg) {
        class::generate_derived_constructor_return_value(value, cg)?;
    } else if let Some(value) = value {
        generate_expression(value, cg)?;
    } else if is_constructor {
        load_variable(MANDATORY_THIS, cg)?;
    } else {
        unwind_boundaries(0, cg)?;
        cg.bc.emit(Instruction::ReturnUndefined {});
        return Ok(());
    }
    emit_return(cg)
}

/// Return `acc`, popping loop environments and running every enclosing
/// finalizer first. `poplexenv` leaves `acc` alone; a finalizer does not.
fn emit_return(cg: &mut CodeGen<'_, '_>) -> Result<()> {
    let has_finalizer = cg
        .bc
        .boundaries
        .iter()
        .any(|boundary| matches!(boundary, BlockBoundaryType::ReturnToFinally(_)));
    if has_finalizer {
        let value = cg.bc.get_temp();
        cg.bc.store_accumulator(value);
        unwind_boundaries(0, cg)?;
        cg.bc.load_accumulator(value);
        cg.bc.free_temps(&[value]);
    } else {
        unwind_boundaries(0, cg)?;
    }
    cg.bc.emit(Instruction::Return {});
    Ok(())
}

fn generate_throw<'a>(expression: &'a Expression, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    generate_expression(expression, cg)?;
    // The handler runs in the environment that was current when its region began.
    for index in (0..cg.bc.boundaries.len()).rev() {
        match cg.bc.boundaries[index] {
            BlockBoundaryType::TryRegion(_) => break,
            BlockBoundaryType::LeaveLexicalEnvironment => cg.bc.pop_lexical_env(),
            _ => {}
        }
    }
    cg.bc.emit(Instruction::Throw {});
    Ok(())
}

/// Leave every boundary at or above `depth`, innermost first: pop loop
/// environments and run finalizers.
fn unwind_boundaries(depth: usize, cg: &mut CodeGen<'_, '_>) -> Result<()> {
    for index in (depth..cg.bc.boundaries.len()).rev() {
        match cg.bc.boundaries[index] {
            BlockBoundaryType::LeaveLexicalEnvironment => cg.bc.pop_lexical_env(),
            BlockBoundaryType::ReturnToFinally(finalizer) => inline_finalizer(index, finalizer, cg)?,
            BlockBoundaryType::Break | BlockBoundaryType::Continue | BlockBoundaryType::TryRegion(_) => {}
        }
    }
    Ok(())
}

/// Emit a copy of a finalizer as if control were at its boundary. The
/// copy is not protected by the regions it is leaving.
fn inline_finalizer(index: usize, finalizer: usize, cg: &mut CodeGen<'_, '_>) -> Result<()> {
    let saved = cg.bc.boundaries.split_off(index);
    let regions: Vec<usize> = saved
        .iter()
        .filter_map(|boundary| match boundary {
            BlockBoundaryType::TryRegion(region) => Some(*region),
            _ => None,
        })
        .collect();
    for &region in &regions {
        cg.bc.close_try_range(region);
    }

    match cg.finalizers[finalizer] {
        Finalizer::Block { block, scope } => {
            let saved_scope = std::mem::replace(&mut cg.scope, scope);
            let result = generate_block(block, cg);
            cg.scope = saved_scope;
            result?;
        }
        Finalizer::CloseIterator(iterator) => cg.bc.emit(Instruction::CloseIterator { iterator }),
    }

    for &region in &regions {
        cg.bc.resume_try_range(region);
    }
    cg.bc.boundaries.extend(saved);
    Ok(())
}

// =============================================================================
// Try/catch/finally
// =============================================================================

fn generate_try_statement<'a>(
    block: &'a Block,
    handler: Option<&'a CatchClause>,
    finalizer: Option<&'a Block>,
    cg: &mut CodeGen<'a, '_>,
) -> Result<()> {
    let Some(finalizer) = finalizer else {
        let handler = handler.ok_or_else(|| CompileError::internal("try statement without catch or finally"))?;
        return generate_try_catch(block, handler, cg);
    };

    let index = cg.finalizers.len();
    cg.finalizers.push(Finalizer::Block {
        block: finalizer,
        scope: cg.scope,
    });
    let exception_handler = Label::fresh();
    let end = Label::fresh();

    cg.bc.start_boundary(BlockBoundaryType::ReturnToFinally(index));
    let region = cg.bc.begin_try_region(exception_handler);
    match handler {
        Some(handler) => generate_try_catch(block, handler, cg)?,
        None => generate_block(block, cg)?,
    }
    let falls_through = !cg.bc.is_terminated();
    cg.bc.end_try_region(region);
    cg.bc.end_boundary(BlockBoundaryType::ReturnToFinally(index));

    if falls_through {
        generate_block(finalizer, cg)?;
        if !cg.bc.is_terminated() {
            cg.bc.branch(end);
        }
    }

    cg.bc.label(exception_handler);
    let exception = cg.bc.get_temp();
    cg.bc.store_accumulator(exception);
    generate_block(finalizer, cg)?;
    cg.bc.load_accumulator(exception);
    cg.bc.emit(Instruction::Throw {});
    cg.bc.free_temps(&[exception]);
    cg.bc.label(end);
    Ok(())
}

fn generate_try_catch<'a>(block: &'a Block, clause: &'a CatchClause, cg: &mut CodeGen<'a, '_>) -> Result<()> {
    let handler = Label::fresh();
    let end = Label::fresh();

    let region = cg.bc.begin_try_region(handler);
    generate_block(block, cg)?;
    let falls_through = !cg.bc.is_terminated();
    cg.bc.end_try_region(region);
    if falls_through {
        cg.bc.branch(end);
    }

    cg.bc.label(handler);
    let scope = cg.scope_of(clause.id)?;
    cg.with_scope(scope, |cg| {
        cg.bc.at(&clause.range);
        cg.bc.enter_debug_scope(scope);
        match &clause.param {
            Some(BindingTarget::Identifier(ident)) => store_variable(&ident.name, true, cg)?,
            Some(BindingTarget::Pattern(pattern)) => {
                let exception = cg.bc.get_temp();
                cg.bc.store_accumulator(exception);
                generate_binding_pattern(pattern, exception, BindingMode::Declaration, cg)?;
                cg.bc.free_temps(&[exception]);
            }
            None => {}
        }
        generate_block(&clause.body, cg)?;
        cg.bc.exit_debug_scope();
        Ok(())
    })?;
    cg.bc.label(end);
    Ok(())
}
