/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

//! Bytecode generator.
//!
//! This module contains the `Generator` struct, which owns everything one
//! compilation unit needs while its instructions are emitted: the flat
//! instruction list, register allocation, the unwind boundary stack and the
//! catch tables. Tables shared by the whole program (strings and literal
//! buffers) are borrowed through `ProgramTables`.

use std::collections::VecDeque;

use indexmap::IndexSet;
use num_bigint::BigInt;
use num_traits::Num;
use rustc_hash::{FxHashMap, FxHashSet};

use super::debug::{DebugPosition, SourcePosition};
use super::instruction::Instruction;
use super::literal::{LiteralBuffer, LiteralPool};
use super::operand::{Label, Register, StringId};
use crate::ast::{BinaryOp, SourceRange};
use crate::error::{CompileError, Result};
use crate::options::CompileOptions;
use crate::scope::{ScopeId, VariableId};
use crate::u32_from_usize;

/// Tables shared by every compilation unit of a program.
#[derive(Debug, Default)]
pub struct ProgramTables {
    pub strings: IndexSet<String>,
    pub literals: LiteralPool,
}

impl ProgramTables {
    pub fn intern(&mut self, string: &str) -> StringId {
        if let Some(index) = self.strings.get_index_of(string) {
            return StringId(u32_from_usize(index));
        }
        let (index, _) = self.strings.insert_full(string.to_string());
        StringId(u32_from_usize(index))
    }
}

/// An instruction together with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedInstruction {
    pub instruction: Instruction,
    pub position: SourcePosition,
    /// Filled in by the debug annotator.
    pub debug: DebugPosition,
}

/// Block boundary types for unwind tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockBoundaryType {
    Break,
    Continue,
    /// A loop environment that must be popped when control leaves it.
    LeaveLexicalEnvironment,
    /// A finalizer (finally block or iterator close) that must run when
    /// control leaves it. Indexes the code generator's finalizer list.
    ReturnToFinally(usize),
    /// A protected range. Indexes `Generator::try_regions`.
    TryRegion(usize),
}

/// A break/continue scope with its target label and language labels.
#[derive(Debug, Clone)]
pub struct LabelableScope {
    pub bytecode_target: Label,
    pub language_label_set: Vec<String>,
    /// Labelled blocks are only reachable through one of their labels.
    pub accepts_unlabelled: bool,
    /// Boundary stack height when the scope was entered.
    pub depth: usize,
}

/// One exception handler and the ranges it protects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchTable {
    pub ranges: Vec<(Label, Label)>,
    pub handler: Label,
}

#[derive(Debug)]
struct TryRegion {
    table: usize,
    open_begin: Option<Label>,
}

/// Instruction range of a scope, for the variable debug table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeRange {
    pub scope: ScopeId,
    pub start: u32,
    pub end: u32,
}

/// Finished output of one compilation unit.
#[derive(Debug)]
pub struct GeneratedCode {
    pub instructions: Vec<EmittedInstruction>,
    pub catch_tables: Vec<CatchTable>,
    pub register_count: u32,
    pub locals: FxHashMap<VariableId, Register>,
    /// Variables stored as declarations somewhere in the unit.
    pub initialized: FxHashSet<VariableId>,
    pub scope_ranges: Vec<ScopeRange>,
}

/// Key operand of a property access.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyOperand<'s> {
    Name(&'s str),
    Index(u32),
    Value(Register),
}

/// The bytecode generator of one compilation unit.
pub struct Generator<'t> {
    tables: &'t mut ProgramTables,
    pub debug_mode: bool,
    pub watch_mode: bool,

    // --- Instruction emission ---
    instructions: Vec<EmittedInstruction>,
    position: SourcePosition,

    // --- Register allocation ---
    next_register: u32,
    free_temps: VecDeque<Register>,
    live_temps: usize,
    locals: FxHashMap<VariableId, Register>,
    initialized: FxHashSet<VariableId>,

    // --- Scope/unwind state ---
    pub boundaries: Vec<BlockBoundaryType>,
    breakable_scopes: Vec<LabelableScope>,
    continuable_scopes: Vec<LabelableScope>,
    catch_tables: Vec<CatchTable>,
    try_regions: Vec<TryRegion>,

    // --- Debug ranges ---
    open_scopes: Vec<(ScopeId, u32)>,
    scope_ranges: Vec<ScopeRange>,
}

impl<'t> Generator<'t> {
    pub fn new(tables: &'t mut ProgramTables, options: &CompileOptions) -> Self {
        Self {
            tables,
            debug_mode: options.debug_mode,
            watch_mode: options.watch_evaluate_expression,
            instructions: Vec::new(),
            position: SourcePosition::FunctionStart,
            next_register: 0,
            free_temps: VecDeque::new(),
            live_temps: 0,
            locals: FxHashMap::default(),
            initialized: FxHashSet::default(),
            boundaries: Vec::new(),
            breakable_scopes: Vec::new(),
            continuable_scopes: Vec::new(),
            catch_tables: Vec::new(),
            try_regions: Vec::new(),
            open_scopes: Vec::new(),
            scope_ranges: Vec::new(),
        }
    }

    // --- Program tables ---

    pub fn intern(&mut self, string: &str) -> StringId {
        self.tables.intern(string)
    }

    pub fn add_literal_buffer(&mut self, buffer: LiteralBuffer) -> u32 {
        self.tables.literals.add(buffer)
    }

    // --- Positions ---

    pub fn position(&self) -> SourcePosition {
        self.position
    }

    pub fn set_position(&mut self, position: SourcePosition) {
        self.position = position;
    }

    /// Attribute the following instructions to `range`.
    pub fn at(&mut self, range: &SourceRange) {
        self.position = SourcePosition::of(range);
    }

    // --- Instruction emission ---

    pub fn emit(&mut self, instruction: Instruction) {
        self.instructions.push(EmittedInstruction {
            instruction,
            position: self.position,
            debug: DebugPosition::default(),
        });
    }

    pub fn label(&mut self, label: Label) {
        self.emit(Instruction::Label { label });
    }

    pub fn instruction_count(&self) -> u32 {
        u32_from_usize(self.instructions.len())
    }

    pub fn instructions(&self) -> &[EmittedInstruction] {
        &self.instructions
    }

    /// Whether the last emitted instruction never falls through.
    pub fn is_terminated(&self) -> bool {
        self.instructions
            .last()
            .is_some_and(|emitted| emitted.instruction.is_terminator())
    }

    // --- Register management ---

    fn allocate_register(&mut self) -> Register {
        let register = Register(self.next_register);
        self.next_register += 1;
        register
    }

    /// Bind the next register to a parameter.
    pub fn bind_parameter(&mut self, variable: VariableId) -> Register {
        let register = self.allocate_register();
        self.locals.insert(variable, register);
        self.initialized.insert(variable);
        register
    }

    /// Register of a local variable, bound on first use.
    pub fn register_for(&mut self, variable: VariableId) -> Register {
        if let Some(register) = self.locals.get(&variable) {
            return *register;
        }
        let register = self.allocate_register();
        self.locals.insert(variable, register);
        register
    }

    /// A register with no other owner; must be returned with `free_temps`.
    pub fn get_temp(&mut self) -> Register {
        self.live_temps += 1;
        match self.free_temps.pop_front() {
            Some(register) => register,
            None => self.allocate_register(),
        }
    }

    pub fn free_temps(&mut self, temps: &[Register]) {
        for register in temps.iter().rev() {
            assert!(self.live_temps > 0, "freed {register} more often than it was allocated");
            self.live_temps -= 1;
            self.free_temps.push_front(*register);
        }
    }

    pub fn live_temps(&self) -> usize {
        self.live_temps
    }

    // --- Local variable initialization tracking ---

    pub fn is_initialized(&self, variable: VariableId) -> bool {
        self.initialized.contains(&variable)
    }

    pub fn mark_initialized(&mut self, variable: VariableId) {
        self.initialized.insert(variable);
    }

    // --- Accumulator moves ---

    pub fn load_accumulator(&mut self, src: Register) {
        self.emit(Instruction::Lda { src });
    }

    pub fn store_accumulator(&mut self, dst: Register) {
        self.emit(Instruction::Sta { dst });
    }

    pub fn move_register(&mut self, dst: Register, src: Register) {
        self.emit(Instruction::Mov { dst, src });
    }

    pub fn load_string(&mut self, string: &str) {
        let string = self.intern(string);
        self.emit(Instruction::LdaStr { string });
    }

    pub fn load_number(&mut self, value: f64) {
        if value.fract() == 0.0
            && value >= f64::from(i32::MIN)
            && value <= f64::from(i32::MAX)
            && !(value == 0.0 && value.is_sign_negative())
        {
            self.emit(Instruction::Ldai { value: value as i32 });
        } else {
            self.emit(Instruction::Fldai { value });
        }
    }

    /// Load a BigInt literal. The digits are normalised to decimal first.
    pub fn load_bigint(&mut self, literal: &str) -> Result<()> {
        let digits = literal.strip_suffix('n').unwrap_or(literal).replace('_', "");
        let value = parse_bigint(&digits)
            .ok_or_else(|| CompileError::internal(format!("malformed BigInt literal '{literal}'")))?;
        let value = self.intern(&value.to_string());
        self.emit(Instruction::LdBigInt { value });
        Ok(())
    }

    // --- Property access ---

    /// Load `object[key]` into `acc`.
    pub fn load_obj_property(&mut self, object: Register, key: KeyOperand<'_>) {
        match key {
            KeyOperand::Name(name) => {
                let name = self.intern(name);
                self.load_accumulator(object);
                self.emit(Instruction::LdObjByName { name });
            }
            KeyOperand::Index(index) => {
                self.load_accumulator(object);
                self.emit(Instruction::LdObjByIndex { index });
            }
            KeyOperand::Value(key) => {
                self.load_accumulator(key);
                self.emit(Instruction::LdObjByValue { object });
            }
        }
    }

    /// Store `acc` to `object[key]`.
    pub fn store_obj_property(&mut self, object: Register, key: KeyOperand<'_>) {
        match key {
            KeyOperand::Name(name) => {
                let name = self.intern(name);
                self.emit(Instruction::StObjByName { name, object });
            }
            KeyOperand::Index(index) => self.emit(Instruction::StObjByIndex { object, index }),
            KeyOperand::Value(key) => self.emit(Instruction::StObjByValue { object, key }),
        }
    }

    /// Define `acc` as an own property of `object`.
    pub fn store_own_property(&mut self, object: Register, key: KeyOperand<'_>) {
        match key {
            KeyOperand::Name(name) => {
                let name = self.intern(name);
                self.emit(Instruction::StOwnByName { name, object });
            }
            KeyOperand::Index(index) => self.emit(Instruction::StOwnByIndex { object, index }),
            KeyOperand::Value(key) => self.emit(Instruction::StOwnByValue { object, key }),
        }
    }

    // --- Operators ---

    /// `lhs <op> acc`, result in `acc`.
    pub fn binary(&mut self, op: BinaryOp, lhs: Register) {
        let instruction = match op {
            BinaryOp::Add => Instruction::Add2 { lhs },
            BinaryOp::Sub => Instruction::Sub2 { lhs },
            BinaryOp::Mul => Instruction::Mul2 { lhs },
            BinaryOp::Div => Instruction::Div2 { lhs },
            BinaryOp::Mod => Instruction::Mod2 { lhs },
            BinaryOp::Exp => Instruction::Exp { lhs },
            BinaryOp::Shl => Instruction::Shl2 { lhs },
            BinaryOp::Shr => Instruction::Ashr2 { lhs },
            BinaryOp::UShr => Instruction::Shr2 { lhs },
            BinaryOp::BitAnd => Instruction::And2 { lhs },
            BinaryOp::BitOr => Instruction::Or2 { lhs },
            BinaryOp::BitXor => Instruction::Xor2 { lhs },
            BinaryOp::Eq => Instruction::Eq { lhs },
            BinaryOp::NotEq => Instruction::NotEq { lhs },
            BinaryOp::StrictEq => Instruction::StrictEq { lhs },
            BinaryOp::StrictNotEq => Instruction::StrictNotEq { lhs },
            BinaryOp::Lt => Instruction::Less { lhs },
            BinaryOp::LtEq => Instruction::LessEq { lhs },
            BinaryOp::Gt => Instruction::Greater { lhs },
            BinaryOp::GtEq => Instruction::GreaterEq { lhs },
            BinaryOp::In => Instruction::IsIn { lhs },
            BinaryOp::InstanceOf => Instruction::InstanceOf { lhs },
        };
        self.emit(instruction);
    }

    /// Compare `lhs` with `acc` and jump to `if_false` when the comparison fails.
    pub fn condition(&mut self, op: BinaryOp, lhs: Register, if_false: Label) {
        self.binary(op, lhs);
        self.emit(Instruction::Jeqz { target: if_false });
    }

    pub fn branch(&mut self, target: Label) {
        self.emit(Instruction::Jmp { target });
    }

    /// Jump to `target` if `acc` converts to false.
    pub fn jump_if_false(&mut self, target: Label) {
        self.emit(Instruction::IsTrue {});
        self.emit(Instruction::Jeqz { target });
    }

    /// Jump to `target` if `acc` converts to true.
    pub fn jump_if_true(&mut self, target: Label) {
        self.emit(Instruction::IsFalse {});
        self.emit(Instruction::Jeqz { target });
    }

    /// Jump to `target` if `value` is `undefined` or `null`.
    pub fn branch_if_nullish(&mut self, value: Register, target: Label) {
        let compare = self.get_temp();
        self.emit(Instruction::LdUndefined {});
        self.store_accumulator(compare);
        self.load_accumulator(value);
        self.emit(Instruction::Eq { lhs: compare });
        self.emit(Instruction::Jnez { target });
        self.free_temps(&[compare]);
    }

    // --- Lexical environments ---

    /// Push a new environment. In debug mode it carries a scope description.
    pub fn new_lexical_env(&mut self, slot_names: &[String]) {
        let slots = u32_from_usize(slot_names.len());
        if self.debug_mode && !slot_names.is_empty() {
            let scope_info = self.add_literal_buffer(LiteralBuffer::scope_info(slot_names));
            self.emit(Instruction::NewLexEnvWithName { slots, scope_info });
        } else {
            self.emit(Instruction::NewLexEnv { slots });
        }
    }

    /// Pop the innermost environment. `acc` is left untouched.
    pub fn pop_lexical_env(&mut self) {
        self.emit(Instruction::PopLexEnv {});
    }

    pub fn load_lex_var(&mut self, level: u32, slot: u32) {
        self.emit(Instruction::LdLexVar { level, slot });
    }

    pub fn store_lex_var(&mut self, level: u32, slot: u32) {
        self.emit(Instruction::StLexVar { level, slot });
    }

    // --- Global access ---

    /// e.g. `print`
    pub fn try_load_global_by_name(&mut self, name: &str) {
        if self.watch_mode {
            self.load_by_name_via_debugger(name, true);
        } else {
            let name = self.intern(name);
            self.emit(Instruction::TryLdGlobalByName { name });
        }
    }

    /// e.g. `a = 1` in strict code
    pub fn try_store_global_by_name(&mut self, name: &str) {
        if self.watch_mode {
            self.store_by_name_via_debugger(name);
        } else {
            let name = self.intern(name);
            self.emit(Instruction::TryStGlobalByName { name });
        }
    }

    /// e.g. `var n; n;`
    pub fn load_global_var(&mut self, name: &str) {
        let name = self.intern(name);
        self.emit(Instruction::LdGlobalVar { name });
    }

    /// e.g. `var n = 1;`
    pub fn store_global_var(&mut self, name: &str) {
        let name = self.intern(name);
        self.emit(Instruction::StGlobalVar { name });
    }

    /// `globalThis.debuggerGetValue(name, flag)`. The flag tells the
    /// debugger whether a missing name should throw.
    pub fn load_by_name_via_debugger(&mut self, name: &str, flag: bool) {
        let get_value = self.get_temp();
        self.emit(Instruction::LdGlobal {});
        self.store_accumulator(get_value);
        self.load_obj_property(get_value, KeyOperand::Name("debuggerGetValue"));
        self.store_accumulator(get_value);
        let variable = self.get_temp();
        self.load_string(name);
        self.store_accumulator(variable);
        let flag_value = self.get_temp();
        self.emit(if flag {
            Instruction::LdTrue {}
        } else {
            Instruction::LdFalse {}
        });
        self.store_accumulator(flag_value);
        self.load_accumulator(get_value);
        self.emit(Instruction::CallArgs {
            args: vec![variable, flag_value],
        });
        self.free_temps(&[get_value, variable, flag_value]);
    }

    /// `globalThis.debuggerSetValue(name, acc)`. The stored value stays in `acc`.
    pub fn store_by_name_via_debugger(&mut self, name: &str) {
        let value = self.get_temp();
        self.store_accumulator(value);
        let set_value = self.get_temp();
        self.emit(Instruction::LdGlobal {});
        self.store_accumulator(set_value);
        self.load_obj_property(set_value, KeyOperand::Name("debuggerSetValue"));
        self.store_accumulator(set_value);
        let variable = self.get_temp();
        self.load_string(name);
        self.store_accumulator(variable);
        self.load_accumulator(set_value);
        self.emit(Instruction::CallArgs {
            args: vec![variable, value],
        });
        self.load_accumulator(value);
        self.free_temps(&[value, set_value, variable]);
    }

    // --- Guards ---

    pub fn throw_undefined_if_hole(&mut self, name: &str) {
        let name = self.intern(name);
        self.emit(Instruction::ThrowUndefinedIfHole { name });
    }

    /// Unconditionally throw the TypeError for assigning to constant `name`.
    pub fn throw_const_assignment(&mut self, name: &str) {
        let name_register = self.get_temp();
        self.load_string(name);
        self.store_accumulator(name_register);
        self.emit(Instruction::ThrowConstAssignment { name: name_register });
        self.free_temps(&[name_register]);
    }

    // --- Boundary management ---

    pub fn start_boundary(&mut self, ty: BlockBoundaryType) {
        self.boundaries.push(ty);
    }

    pub fn end_boundary(&mut self, ty: BlockBoundaryType) {
        assert_eq!(self.boundaries.last(), Some(&ty));
        self.boundaries.pop();
    }

    // --- Break/continue scope management ---

    pub fn begin_breakable_scope(&mut self, target: Label, label_set: Vec<String>, accepts_unlabelled: bool) {
        self.breakable_scopes.push(LabelableScope {
            bytecode_target: target,
            language_label_set: label_set,
            accepts_unlabelled,
            depth: self.boundaries.len(),
        });
        self.start_boundary(BlockBoundaryType::Break);
    }

    pub fn end_breakable_scope(&mut self) {
        self.end_boundary(BlockBoundaryType::Break);
        self.breakable_scopes.pop();
    }

    pub fn begin_continuable_scope(&mut self, target: Label, label_set: Vec<String>) {
        self.continuable_scopes.push(LabelableScope {
            bytecode_target: target,
            language_label_set: label_set,
            accepts_unlabelled: true,
            depth: self.boundaries.len(),
        });
        self.start_boundary(BlockBoundaryType::Continue);
    }

    pub fn end_continuable_scope(&mut self) {
        self.end_boundary(BlockBoundaryType::Continue);
        self.continuable_scopes.pop();
    }

    pub fn find_breakable_scope(&self, label: Option<&str>) -> Option<&LabelableScope> {
        find_scope(&self.breakable_scopes, label, self.boundaries.len())
    }

    pub fn find_continuable_scope(&self, label: Option<&str>) -> Option<&LabelableScope> {
        find_scope(&self.continuable_scopes, label, self.boundaries.len())
    }

    // --- Catch tables ---

    /// Open a protected range handled at `handler` and push its boundary.
    pub fn begin_try_region(&mut self, handler: Label) -> usize {
        let begin = Label::fresh();
        self.label(begin);
        self.catch_tables.push(CatchTable {
            ranges: Vec::new(),
            handler,
        });
        let region = self.try_regions.len();
        self.try_regions.push(TryRegion {
            table: self.catch_tables.len() - 1,
            open_begin: Some(begin),
        });
        self.start_boundary(BlockBoundaryType::TryRegion(region));
        region
    }

    pub fn end_try_region(&mut self, region: usize) {
        self.end_boundary(BlockBoundaryType::TryRegion(region));
        self.close_try_range(region);
    }

    /// Stop protecting code until `resume_try_range` is called.
    pub fn close_try_range(&mut self, region: usize) {
        if let Some(begin) = self.try_regions[region].open_begin.take() {
            let end = Label::fresh();
            self.label(end);
            let table = self.try_regions[region].table;
            self.catch_tables[table].ranges.push((begin, end));
        }
    }

    pub fn resume_try_range(&mut self, region: usize) {
        if self.try_regions[region].open_begin.is_none() {
            let begin = Label::fresh();
            self.label(begin);
            self.try_regions[region].open_begin = Some(begin);
        }
    }

    // --- Debug ranges ---

    pub fn enter_debug_scope(&mut self, scope: ScopeId) {
        if self.debug_mode {
            let start = self.instruction_count();
            self.open_scopes.push((scope, start));
        }
    }

    pub fn exit_debug_scope(&mut self) {
        if !self.debug_mode {
            return;
        }
        if let Some((scope, start)) = self.open_scopes.pop() {
            let end = self.instruction_count();
            self.scope_ranges.push(ScopeRange { scope, start, end });
        }
    }

    // --- Finishing ---

    /// Hand off the unit. Fails if a temporary was not returned.
    pub fn finish(self) -> Result<GeneratedCode> {
        if self.live_temps != 0 {
            return Err(CompileError::internal(format!(
                "{} temporary register(s) leaked",
                self.live_temps
            )));
        }
        let mut catch_tables = self.catch_tables;
        catch_tables.retain(|table| !table.ranges.is_empty());
        Ok(GeneratedCode {
            instructions: self.instructions,
            catch_tables,
            register_count: self.next_register,
            locals: self.locals,
            initialized: self.initialized,
            scope_ranges: self.scope_ranges,
        })
    }
}

fn find_scope<'s>(scopes: &'s [LabelableScope], label: Option<&str>, depth: usize) -> Option<&'s LabelableScope> {
    let mut reachable = scopes.iter().rev().filter(|scope| scope.depth < depth);
    match label {
        Some(label) => reachable.find(|scope| scope.language_label_set.iter().any(|l| l == label)),
        None => reachable.find(|scope| scope.accepts_unlabelled),
    }
}

/// Parse BigInt digits with an optional `0b`/`0o`/`0x` radix prefix.
pub fn parse_bigint(digits: &str) -> Option<BigInt> {
    let (radix, body) = match digits.get(..2) {
        Some("0b" | "0B") => (2, &digits[2..]),
        Some("0o" | "0O") => (8, &digits[2..]),
        Some("0x" | "0X") => (16, &digits[2..]),
        _ => (10, digits),
    };
    BigInt::from_str_radix(body, radix).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mnemonics(generator: &Generator<'_>) -> Vec<&'static str> {
        generator
            .instructions()
            .iter()
            .map(|emitted| emitted.instruction.mnemonic())
            .collect()
    }

    #[test]
    fn temps_are_reused_in_fifo_order() {
        let mut tables = ProgramTables::default();
        let mut generator = Generator::new(&mut tables, &CompileOptions::default());
        let a = generator.get_temp();
        let b = generator.get_temp();
        assert_eq!((a, b), (Register(0), Register(1)));
        generator.free_temps(&[a, b]);
        assert_eq!(generator.live_temps(), 0);
        assert_eq!(generator.get_temp(), a);
        assert_eq!(generator.get_temp(), b);
        generator.free_temps(&[a, b]);
        assert!(generator.finish().is_ok());
    }

    #[test]
    fn leaked_temps_fail_the_unit() {
        let mut tables = ProgramTables::default();
        let mut generator = Generator::new(&mut tables, &CompileOptions::default());
        generator.get_temp();
        assert!(matches!(generator.finish(), Err(CompileError::Internal { .. })));
    }

    #[test]
    fn locals_are_bound_lazily_after_parameters() {
        let mut tables = ProgramTables::default();
        let mut generator = Generator::new(&mut tables, &CompileOptions::default());
        assert_eq!(generator.bind_parameter(VariableId(7)), Register(0));
        assert_eq!(generator.register_for(VariableId(3)), Register(1));
        assert_eq!(generator.register_for(VariableId(3)), Register(1));
        assert!(generator.is_initialized(VariableId(7)));
        assert!(!generator.is_initialized(VariableId(3)));
    }

    #[test]
    fn debugger_bridge_uses_three_temps() {
        let mut tables = ProgramTables::default();
        let options = CompileOptions {
            watch_evaluate_expression: true,
            ..CompileOptions::default()
        };
        let mut generator = Generator::new(&mut tables, &options);
        generator.try_load_global_by_name("x");
        assert_eq!(generator.live_temps(), 0);
        assert_eq!(
            mnemonics(&generator),
            vec![
                "ldglobal", "sta", "lda", "ldobjbyname", "sta", "lda.str", "sta", "ldtrue", "sta", "lda", "callargs",
            ]
        );
        let code = generator.finish().unwrap();
        assert_eq!(code.register_count, 3);
    }

    #[test]
    fn split_try_ranges_exclude_the_gap() {
        let mut tables = ProgramTables::default();
        let mut generator = Generator::new(&mut tables, &CompileOptions::default());
        let handler = Label::fresh();
        let region = generator.begin_try_region(handler);
        generator.emit(Instruction::LdTrue {});
        generator.close_try_range(region);
        generator.emit(Instruction::LdFalse {});
        generator.resume_try_range(region);
        generator.emit(Instruction::LdNull {});
        generator.end_try_region(region);
        let code = generator.finish().unwrap();
        assert_eq!(code.catch_tables.len(), 1);
        assert_eq!(code.catch_tables[0].ranges.len(), 2);
        assert_eq!(code.catch_tables[0].handler, handler);
    }

    #[test]
    fn unlabelled_breaks_skip_labelled_blocks() {
        let mut tables = ProgramTables::default();
        let mut generator = Generator::new(&mut tables, &CompileOptions::default());
        let loop_end = Label::fresh();
        let block_end = Label::fresh();
        generator.begin_breakable_scope(loop_end, vec![], true);
        generator.begin_breakable_scope(block_end, vec!["outer".into()], false);
        assert_eq!(generator.find_breakable_scope(None).unwrap().bytecode_target, loop_end);
        assert_eq!(
            generator.find_breakable_scope(Some("outer")).unwrap().bytecode_target,
            block_end
        );
        assert!(generator.find_breakable_scope(Some("missing")).is_none());
        generator.end_breakable_scope();
        generator.end_breakable_scope();
    }

    #[test]
    fn bigints_are_normalised_to_decimal() {
        assert_eq!(parse_bigint("0x1f").unwrap().to_string(), "31");
        assert_eq!(parse_bigint("0b101").unwrap().to_string(), "5");
        assert_eq!(parse_bigint("42").unwrap().to_string(), "42");
        assert!(parse_bigint("0xz").is_none());
    }
}
