/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

//! Whole-program compilation.
//!
//! ```text
//! Program ──► recorder ──► binder ──► resolver ──► codegen (per unit) ──► debug
//! ```
//!
//! The recorder, binder and resolver each run once over the whole program.
//! Resolution must see every reference in traversal order before any code
//! is generated, because a late promotion changes the levels of earlier
//! accesses. Code generation then runs once per compilation unit, and units
//! are emitted in post-order: every function comes before the function that
//! defines it, and the program root comes last.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::ast::{NodeId, Program, TypeTable};
use crate::binder;
use crate::bytecode::codegen::{UnitContext, UnitSource, generate_unit};
use crate::bytecode::debug::{VariableDebugInfo, annotate_positions, collect_variables};
use crate::bytecode::generator::{CatchTable, EmittedInstruction, ProgramTables};
use crate::bytecode::literal::LiteralBuffer;
use crate::error::Result;
use crate::module_record::ModuleRecord;
use crate::options::CompileOptions;
use crate::recorder::{self, Recording};
use crate::resolver::Resolver;

/// Internal name of the program root.
pub const MAIN_FUNCTION_NAME: &str = "func_main_0";

/// One compiled function.
#[derive(Debug)]
pub struct CompiledFunction {
    pub name: String,
    pub parameter_count: u32,
    pub register_count: u32,
    pub instructions: Vec<EmittedInstruction>,
    pub catch_tables: Vec<CatchTable>,
    /// Local variable table; only filled in debug mode.
    pub variables: Vec<VariableDebugInfo>,
}

impl CompiledFunction {
    /// The instructions as text, one per line, labels included.
    pub fn listing(&self) -> Vec<String> {
        self.instructions
            .iter()
            .map(|emitted| emitted.instruction.to_string())
            .collect()
    }
}

#[derive(Debug)]
pub struct CompiledProgram {
    /// Compilation units in post-order; the program root is last.
    pub functions: Vec<CompiledFunction>,
    pub strings: Vec<String>,
    pub literals: Vec<LiteralBuffer>,
    pub module_record: Option<ModuleRecord>,
}

impl CompiledProgram {
    pub fn function(&self, name: &str) -> Option<&CompiledFunction> {
        self.functions.iter().find(|function| function.name == name)
    }

    pub fn main(&self) -> Option<&CompiledFunction> {
        self.function(MAIN_FUNCTION_NAME)
    }

    pub fn string(&self, id: crate::bytecode::operand::StringId) -> Option<&str> {
        self.strings.get(id.0 as usize).map(String::as_str)
    }
}

/// Record, bind and resolve `program`.
pub fn analyze(program: &Program, options: &CompileOptions, types: &dyn TypeTable) -> Result<Recording> {
    options.validate()?;
    let mut recording = recorder::record(program, options)?;
    binder::bind(&mut recording, program, options, types)?;
    let references = std::mem::take(&mut recording.references);
    Resolver::new(&mut recording.tree, options.commonjs).resolve_references(&references);
    recording.references = references;
    Ok(recording)
}

/// Internal name of every function unit, keyed by function node.
pub fn internal_names(program: &Program, recording: &Recording) -> FxHashMap<NodeId, String> {
    let mut names = FxHashMap::default();
    names.insert(program.id, MAIN_FUNCTION_NAME.to_string());
    for node in &recording.function_order {
        let Some(info) = recording.functions.get(node) else {
            continue;
        };
        let name = if info.name.is_empty() {
            format!("#{}#", info.sequence)
        } else if recording.func_name_map.get(&info.name) == Some(&1) {
            format!("#*#{}", info.name)
        } else {
            format!("#{}#{}", info.sequence, info.name)
        };
        names.insert(*node, name);
    }
    names
}

struct UnitCompiler<'a> {
    ctx: UnitContext<'a>,
    tables: ProgramTables,
    compiled: FxHashSet<NodeId>,
    functions: Vec<CompiledFunction>,
}

impl<'a> UnitCompiler<'a> {
    /// Compile `source`, then the units it defines, then append `source`
    /// after them.
    fn compile(&mut self, source: UnitSource<'a>) -> Result<()> {
        let program = self.ctx.program;
        let node = source.node(program);
        if !self.compiled.insert(node) {
            // A function defined inside an inlined finally block is queued
            // once per copy.
            return Ok(());
        }
        let name = self
            .ctx
            .internal_names
            .get(&node)
            .cloned()
            .ok_or_else(|| crate::error::CompileError::internal(format!("unit {} has no internal name", node.0)))?;
        debug!(name = %name, "generating unit");

        let unit = generate_unit(self.ctx, &mut self.tables, source)?;
        for nested in &unit.nested {
            self.compile(*nested)?;
        }

        let mut code = unit.code;
        annotate_positions(&mut code.instructions, &source.range(program), self.ctx.options.debug_mode);
        let variables = if self.ctx.options.debug_mode {
            collect_variables(
                &self.ctx.recording.tree,
                &code.scope_ranges,
                |variable| code.locals.get(&variable).copied(),
                |variable| code.initialized.contains(&variable),
            )
        } else {
            Vec::new()
        };
        debug!(
            name = %name,
            instructions = code.instructions.len(),
            registers = code.register_count,
            "generated unit"
        );
        self.functions.push(CompiledFunction {
            name,
            parameter_count: unit.parameter_count,
            register_count: code.register_count,
            instructions: code.instructions,
            catch_tables: code.catch_tables,
            variables,
        });
        Ok(())
    }
}

/// Compile `program` into its functions and program-wide tables.
///
/// Any internal error, reported or panicked, rejects the whole program.
pub fn compile_program(program: &Program, options: &CompileOptions, types: &dyn TypeTable) -> Result<CompiledProgram> {
    crate::catch_internal_errors(|| {
        let recording = analyze(program, options, types)?;
        let names = internal_names(program, &recording);
        let mut compiler = UnitCompiler {
            ctx: UnitContext {
                program,
                recording: &recording,
                options,
                internal_names: &names,
            },
            tables: ProgramTables::default(),
            compiled: FxHashSet::default(),
            functions: Vec::new(),
        };
        compiler.compile(UnitSource::Program)?;

        let UnitCompiler { tables, functions, .. } = compiler;
        debug!(
            functions = functions.len(),
            strings = tables.strings.len(),
            literals = tables.literals.len(),
            "compiled program"
        );
        Ok(CompiledProgram {
            functions,
            strings: tables.strings.into_iter().collect(),
            literals: tables.literals.buffers().to_vec(),
            module_record: recording.module_record.clone(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstBuilder, NoTypes};

    #[test]
    fn internal_names_follow_uniqueness() {
        let mut b = AstBuilder::new();
        let first = b.function_declaration("twice", &[], vec![]);
        let second = b.function_declaration("twice", &[], vec![]);
        let block = b.block_statement(vec![second]);
        let once = b.function_declaration("once", &[], vec![]);
        let program = b.program(vec![first, block, once]);
        let recording = analyze(&program, &CompileOptions::default(), &NoTypes).unwrap();
        let names = internal_names(&program, &recording);

        let mut values: Vec<&str> = names.values().map(String::as_str).collect();
        values.sort_unstable();
        assert_eq!(values, vec!["#*#once", "#1#twice", "#2#twice", MAIN_FUNCTION_NAME]);
    }

    #[test]
    fn root_is_emitted_last() {
        let mut b = AstBuilder::new();
        let inner = b.function_declaration("inner", &[], vec![]);
        let outer = b.function_declaration("outer", &[], vec![inner]);
        let program = b.program(vec![outer]);
        let compiled = compile_program(&program, &CompileOptions::default(), &NoTypes).unwrap();

        let order: Vec<&str> = compiled.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(order, vec!["#*#inner", "#*#outer", MAIN_FUNCTION_NAME]);
    }

    #[test]
    fn conflicting_options_are_rejected() {
        let program = AstBuilder::new().program(vec![]);
        let options = CompileOptions {
            commonjs: true,
            module: true,
            ..CompileOptions::default()
        };
        assert!(compile_program(&program, &options, &NoTypes).is_err());
    }
}
