/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

//! Debug and position annotation.
//!
//! Runs once per compilation unit after code generation. It never adds,
//! removes or reorders instructions; it only fills in their positions and
//! collects the variable table.

use serde::Serialize;

use super::generator::{EmittedInstruction, ScopeRange};
use super::operand::Register;
use crate::ast::SourceRange;
use crate::scope::{InitStatus, ScopeTree, VariableId};

/// Where an instruction came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourcePosition {
    /// Synthesized code without a meaningful origin.
    #[default]
    Invalid,
    /// Prologue code, attributed to the start of the function.
    FunctionStart,
    At {
        line: u32,
        column: u32,
    },
}

impl SourcePosition {
    pub fn of(range: &SourceRange) -> Self {
        SourcePosition::At {
            line: range.start.line,
            column: range.start.column,
        }
    }
}

/// Resolved position of one instruction, in the backend's field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DebugPosition {
    #[serde(rename = "l")]
    pub line: i32,
    #[serde(rename = "c")]
    pub column: i32,
    #[serde(rename = "bl")]
    pub bound_left: u32,
    #[serde(rename = "br")]
    pub bound_right: u32,
}

impl Default for DebugPosition {
    fn default() -> Self {
        Self {
            line: -1,
            column: -1,
            bound_left: 0,
            bound_right: 0,
        }
    }
}

/// One row of a function's local variable table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableDebugInfo {
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "s")]
    pub signature: String,
    #[serde(rename = "st")]
    pub signature_type: String,
    #[serde(rename = "r")]
    pub register: u32,
    pub start: u32,
    #[serde(rename = "len")]
    pub length: u32,
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Fill in the debug position of every instruction.
///
/// Labels take the position of the next real instruction. Byte bounds are
/// only computed in debug mode.
pub fn annotate_positions(instructions: &mut [EmittedInstruction], function_range: &SourceRange, debug_mode: bool) {
    let function_start = SourcePosition::of(function_range);
    let mut next_real = SourcePosition::Invalid;
    for emitted in instructions.iter_mut().rev() {
        if emitted.instruction.is_label() {
            emitted.position = next_real;
        } else {
            next_real = emitted.position;
        }
    }

    let mut offset = 0;
    for emitted in instructions.iter_mut() {
        let position = match emitted.position {
            SourcePosition::FunctionStart => function_start,
            other => other,
        };
        let (line, column) = match position {
            SourcePosition::At { line, column } => (to_i32(line), to_i32(column)),
            _ => (-1, -1),
        };
        let size = emitted.instruction.encoded_size();
        emitted.debug = DebugPosition {
            line,
            column,
            bound_left: if debug_mode { offset } else { 0 },
            bound_right: if debug_mode { offset + size } else { 0 },
        };
        offset += size;
    }
}

/// Build the variable table from the scopes the generator tracked.
/// Bindings the unit never initializes are left out.
pub fn collect_variables(
    tree: &ScopeTree,
    scope_ranges: &[ScopeRange],
    register_of: impl Fn(VariableId) -> Option<Register>,
    is_initialized: impl Fn(VariableId) -> bool,
) -> Vec<VariableDebugInfo> {
    let mut variables = Vec::new();
    for range in scope_ranges {
        for &id in tree.scope(range.scope).names.values() {
            let variable = tree.variable(id);
            if variable.is_implicit || variable.scope != range.scope {
                continue;
            }
            if variable.initial_status == InitStatus::Uninitialized && !is_initialized(id) {
                continue;
            }
            let Some(register) = register_of(id) else {
                continue;
            };
            variables.push(VariableDebugInfo {
                name: variable.name.clone(),
                signature: "any".to_string(),
                signature_type: "any".to_string(),
                register: register.0,
                start: range.start,
                length: range.end.saturating_sub(range.start),
            });
        }
    }
    variables
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{NodeId, Position};
    use crate::bytecode::instruction::Instruction;
    use crate::bytecode::operand::Label;
    use crate::scope::{ModuleVarKind, ScopeKind, VarKind};

    fn emitted(instruction: Instruction, position: SourcePosition) -> EmittedInstruction {
        EmittedInstruction {
            instruction,
            position,
            debug: DebugPosition::default(),
        }
    }

    #[test]
    fn labels_inherit_the_next_position() {
        let mut instructions = vec![
            emitted(Instruction::LdUndefined {}, SourcePosition::FunctionStart),
            emitted(Instruction::Label { label: Label(9) }, SourcePosition::Invalid),
            emitted(Instruction::Return {}, SourcePosition::At { line: 4, column: 2 }),
        ];
        let range = SourceRange {
            start: Position {
                line: 1,
                column: 0,
                offset: 0,
            },
            end: Position::default(),
        };
        annotate_positions(&mut instructions, &range, true);

        assert_eq!(instructions[0].debug.line, 1);
        assert_eq!(instructions[1].debug.line, 4);
        assert_eq!(instructions[1].debug.column, 2);
        assert_eq!(instructions[0].debug.bound_left, 0);
        assert_eq!(instructions[0].debug.bound_right, 1);
        assert_eq!(instructions[1].debug.bound_left, 1);
        assert_eq!(instructions[1].debug.bound_right, 1);
        assert_eq!(instructions[2].debug.bound_right, 2);
    }

    #[test]
    fn variable_table_skips_bindings_never_initialized() {
        let mut tree = ScopeTree::new(ScopeKind::Global, NodeId(0));
        let function = tree.add_scope(ScopeKind::Function, NodeId(1), Some(tree.root()));
        let hoisted = tree.add(function, "v", VarKind::Var, ModuleVarKind::NotModule);
        let declared = tree.add(function, "a", VarKind::Let, ModuleVarKind::NotModule);
        let pending = tree.add(function, "b", VarKind::Let, ModuleVarKind::NotModule);
        let ranges = [ScopeRange {
            scope: function,
            start: 0,
            end: 5,
        }];
        let registers = [(hoisted, Register(0)), (declared, Register(1)), (pending, Register(2))];

        let variables = collect_variables(
            &tree,
            &ranges,
            |variable| registers.iter().find(|(id, _)| *id == variable).map(|(_, register)| *register),
            |variable| variable == declared,
        );
        let names: Vec<&str> = variables.iter().map(|variable| variable.name.as_str()).collect();
        assert_eq!(names, ["v", "a"]);
        assert_eq!(variables[1].register, 1);
        assert_eq!(variables[1].length, 5);
    }

    #[test]
    fn bounds_are_only_computed_in_debug_mode() {
        let mut instructions = vec![emitted(Instruction::Ldai { value: 1 }, SourcePosition::Invalid)];
        annotate_positions(&mut instructions, &SourceRange::default(), false);
        assert_eq!(instructions[0].debug, DebugPosition::default());
    }
}
