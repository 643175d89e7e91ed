/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

#![allow(dead_code)]

use ts2panda::ast::{NoTypes, Program};
use ts2panda::{CompileOptions, CompiledFunction, CompiledProgram, compile_program};

pub fn compile(program: &Program) -> CompiledProgram {
    compile_with(program, &CompileOptions::default())
}

pub fn compile_with(program: &Program, options: &CompileOptions) -> CompiledProgram {
    match compile_program(program, options, &NoTypes) {
        Ok(compiled) => compiled,
        Err(error) => panic!("compilation failed: {error}"),
    }
}

pub fn function<'a>(compiled: &'a CompiledProgram, name: &str) -> &'a CompiledFunction {
    compiled.function(name).unwrap_or_else(|| {
        let names: Vec<&str> = compiled.functions.iter().map(|f| f.name.as_str()).collect();
        panic!("no function named {name:?}, have {names:?}")
    })
}

/// Mnemonics of a function, labels left out.
pub fn mnemonics(function: &CompiledFunction) -> Vec<&'static str> {
    function
        .instructions
        .iter()
        .filter(|emitted| !emitted.instruction.is_label())
        .map(|emitted| emitted.instruction.mnemonic())
        .collect()
}

pub fn count(function: &CompiledFunction, mnemonic: &str) -> usize {
    mnemonics(function).iter().filter(|m| **m == mnemonic).count()
}

pub fn has_line(function: &CompiledFunction, line: &str) -> bool {
    function.listing().iter().any(|candidate| candidate == line)
}
