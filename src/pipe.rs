/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

//! Serialized hand-off to the native backend.
//!
//! The backend reads a stream of JSON pieces, each framed as `$<json>$`
//! with `$` and `*` escaped as `#$` and `#*`, followed by a lone `*` that
//! ends the program. Every piece is `{"t": <type>, "v": <payload>}`.

use std::io::Write;
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};

use serde::Serialize;
use tracing::{debug, warn};

use crate::bytecode::debug::{DebugPosition, VariableDebugInfo};
use crate::bytecode::instruction::Instruction;
use crate::bytecode::operand::{Immediate, Operand};
use crate::driver::{CompiledFunction, CompiledProgram};
use crate::error::{CompileError, Result};
use crate::options::CompileOptions;

/// Piece type tags understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PieceType {
    Function = 0,
    Record = 1,
    Strings = 2,
    LiteralBuffer = 3,
    ModuleRecord = 4,
    Options = 5,
    TypeInfo = 6,
    RecordName = 7,
    OutputFileName = 8,
}

#[derive(Serialize)]
struct Piece<T: Serialize> {
    t: u8,
    v: T,
}

/// Escape the framing characters of a serialized piece.
pub fn escape(json: &str) -> String {
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        if c == '$' || c == '*' {
            escaped.push('#');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Serialize)]
#[serde(untagged)]
enum ImmediateRecord {
    Int(i32),
    Float(f64),
}

#[derive(Serialize)]
struct InstructionRecord {
    /// Opcode; absent for labels.
    #[serde(rename = "o", skip_serializing_if = "Option::is_none")]
    opcode: Option<u32>,
    #[serde(rename = "r")]
    registers: Vec<u32>,
    #[serde(rename = "id")]
    strings: Vec<String>,
    #[serde(rename = "im")]
    immediates: Vec<ImmediateRecord>,
    #[serde(rename = "l", skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(rename = "d")]
    debug: DebugPosition,
}

#[derive(Serialize)]
struct CatchRecord {
    #[serde(rename = "tb_lab")]
    try_begin: String,
    #[serde(rename = "te_lab")]
    try_end: String,
    #[serde(rename = "cb_lab")]
    catch_begin: String,
}

#[derive(Serialize)]
struct FunctionRecord<'a> {
    #[serde(rename = "n")]
    name: &'a str,
    #[serde(rename = "p")]
    parameter_count: u32,
    #[serde(rename = "r")]
    register_count: u32,
    #[serde(rename = "i")]
    instructions: Vec<InstructionRecord>,
    #[serde(rename = "ca_tab")]
    catch_tables: Vec<CatchRecord>,
    #[serde(rename = "v")]
    variables: &'a [VariableDebugInfo],
}

fn instruction_record(instruction: &Instruction, debug: DebugPosition, program: &CompiledProgram) -> Result<InstructionRecord> {
    let mut record = InstructionRecord {
        opcode: None,
        registers: Vec::new(),
        strings: Vec::new(),
        immediates: Vec::new(),
        label: None,
        debug,
    };
    if let Instruction::Label { label } = instruction {
        record.label = Some(label.name());
        return Ok(record);
    }
    record.opcode = Some(instruction.opcode());
    for operand in instruction.operands() {
        match operand {
            Operand::Register(register) => record.registers.push(register.0),
            Operand::Immediate(Immediate::Int(value)) => record.immediates.push(ImmediateRecord::Int(value)),
            Operand::Immediate(Immediate::Float(value)) => record.immediates.push(ImmediateRecord::Float(value)),
            Operand::Label(label) => record.label = Some(label.name()),
            Operand::StringId(id) => {
                let string = program
                    .string(id)
                    .ok_or_else(|| CompileError::internal(format!("string id {} out of range", id.0)))?;
                record.strings.push(string.to_string());
            }
        }
    }
    Ok(record)
}

fn function_record<'a>(function: &'a CompiledFunction, program: &CompiledProgram) -> Result<FunctionRecord<'a>> {
    let instructions = function
        .instructions
        .iter()
        .map(|emitted| instruction_record(&emitted.instruction, emitted.debug, program))
        .collect::<Result<Vec<_>>>()?;
    let catch_tables = function
        .catch_tables
        .iter()
        .flat_map(|table| {
            table.ranges.iter().map(|(begin, end)| CatchRecord {
                try_begin: begin.name(),
                try_end: end.name(),
                catch_begin: table.handler.name(),
            })
        })
        .collect();
    Ok(FunctionRecord {
        name: &function.name,
        parameter_count: function.parameter_count,
        register_count: function.register_count,
        instructions,
        catch_tables,
        variables: &function.variables,
    })
}

/// Writes framed pieces and guarantees exactly one termination signal.
pub struct PipeWriter<W: Write> {
    out: Option<W>,
}

impl<W: Write> PipeWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out: Some(out) }
    }

    pub fn write_piece<T: Serialize>(&mut self, kind: PieceType, value: T) -> Result<()> {
        let json = serde_json::to_string(&Piece { t: kind as u8, v: value })?;
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| CompileError::internal("write to a terminated pipe"))?;
        write!(out, "${}$", escape(&json))?;
        debug!(kind = ?kind, bytes = json.len(), "wrote pipe piece");
        Ok(())
    }

    /// Send the termination signal and hand back the writer.
    pub fn finish(mut self) -> Result<W> {
        let mut out = self
            .out
            .take()
            .ok_or_else(|| CompileError::internal("pipe terminated twice"))?;
        terminate(&mut out)?;
        Ok(out)
    }
}

fn terminate<W: Write>(out: &mut W) -> Result<()> {
    out.write_all(b"*\n")?;
    out.flush()?;
    debug!("terminated pipe");
    Ok(())
}

impl<W: Write> Drop for PipeWriter<W> {
    fn drop(&mut self) {
        if let Some(mut out) = self.out.take()
            && let Err(error) = terminate(&mut out)
        {
            warn!(%error, "failed to terminate pipe");
        }
    }
}

/// Write every piece of `program`, in the order the backend expects.
pub fn write_program<W: Write>(writer: &mut PipeWriter<W>, program: &CompiledProgram, options: &CompileOptions) -> Result<()> {
    writer.write_piece(PieceType::Options, options)?;
    writer.write_piece(PieceType::RecordName, &options.record_name)?;
    writer.write_piece(PieceType::OutputFileName, &options.output_file_name)?;
    for function in &program.functions {
        writer.write_piece(PieceType::Function, function_record(function, program)?)?;
    }
    writer.write_piece(PieceType::Strings, &program.strings)?;
    for buffer in &program.literals {
        writer.write_piece(PieceType::LiteralBuffer, buffer)?;
    }
    if let Some(record) = &program.module_record {
        writer.write_piece(PieceType::ModuleRecord, record)?;
    }
    Ok(())
}

/// A running backend process fed through its standard input.
pub struct BackendProcess {
    child: Child,
    writer: Option<PipeWriter<ChildStdin>>,
}

impl BackendProcess {
    pub fn spawn(path: &Path, options: &CompileOptions) -> Result<Self> {
        let mut child = Command::new(path)
            .arg("--compile-by-pipe")
            .arg(&options.output_file_name)
            .stdin(Stdio::piped())
            .spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CompileError::internal("backend process has no stdin"))?;
        debug!(path = %path.display(), "spawned backend");
        Ok(Self {
            child,
            writer: Some(PipeWriter::new(stdin)),
        })
    }

    /// Send `program`, terminate the stream and wait for the backend.
    ///
    /// If writing fails the pipe is closed, the backend is reaped and the
    /// write error is returned.
    pub fn send(mut self, program: &CompiledProgram, options: &CompileOptions) -> Result<()> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| CompileError::internal("backend input already closed"))?;
        let written = write_program(&mut writer, program, options).and_then(|()| writer.finish().map(drop));
        if let Err(error) = written {
            let _ = self.child.wait();
            return Err(error);
        }
        let status = self.child.wait()?;
        if !status.success() {
            return Err(CompileError::Backend {
                status: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}

/// Compile-and-emit convenience: spawn the configured backend and send it
/// `program`.
pub fn emit_to_backend(program: &CompiledProgram, options: &CompileOptions) -> Result<()> {
    let path = options.ts2abc_path.as_deref().ok_or_else(|| CompileError::InvalidOptions {
        message: "no backend path configured".into(),
    })?;
    BackendProcess::spawn(path, options)?.send(program, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstBuilder, NoTypes};
    use crate::driver::compile_program;

    fn sample_program() -> CompiledProgram {
        let mut b = AstBuilder::new();
        let value = b.string("a$b*c");
        let statement = b.declare(crate::ast::DeclarationKind::Let, "x", Some(value));
        let program = b.program(vec![statement]);
        compile_program(&program, &CompileOptions::default(), &NoTypes).unwrap()
    }

    fn pieces(output: &str) -> Vec<serde_json::Value> {
        let body = output.strip_suffix("*\n").expect("missing termination");
        let mut values = Vec::new();
        let mut current = String::new();
        let mut chars = body.chars().peekable();
        let mut inside = false;
        while let Some(c) = chars.next() {
            match c {
                '#' if inside && matches!(chars.peek(), Some('$' | '*')) => current.push(chars.next().unwrap()),
                '$' if inside => {
                    values.push(serde_json::from_str(&current).unwrap());
                    current.clear();
                    inside = false;
                }
                '$' => inside = true,
                _ => current.push(c),
            }
        }
        values
    }

    #[test]
    fn escapes_framing_characters() {
        assert_eq!(escape(r#"{"a":"$*"}"#), r##"{"a":"#$#*"}"##);
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn pieces_follow_backend_order() {
        let program = sample_program();
        let mut writer = PipeWriter::new(Vec::new());
        write_program(&mut writer, &program, &CompileOptions::default()).unwrap();
        let output = String::from_utf8(writer.finish().unwrap()).unwrap();

        let tags: Vec<u64> = pieces(&output).iter().map(|piece| piece["t"].as_u64().unwrap()).collect();
        let mut expected = vec![5, 7, 8];
        expected.extend(std::iter::repeat_n(0, program.functions.len()));
        expected.push(2);
        expected.extend(std::iter::repeat_n(3, program.literals.len()));
        assert_eq!(tags, expected);

        let strings = pieces(&output)
            .into_iter()
            .find(|piece| piece["t"] == 2)
            .unwrap();
        assert!(strings["v"].as_array().unwrap().iter().any(|s| s == "a$b*c"));
    }

    #[test]
    fn dropping_an_unfinished_writer_terminates_once() {
        let mut buffer = Vec::new();
        {
            let mut writer = PipeWriter::new(&mut buffer);
            writer.write_piece(PieceType::RecordName, "r").unwrap();
        }
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.ends_with("$*\n"));
        assert_eq!(output.matches("*\n").count(), 1);
    }

    #[test]
    fn writes_through_a_file() {
        let program = sample_program();
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = PipeWriter::new(file.reopen().unwrap());
        write_program(&mut writer, &program, &CompileOptions::default()).unwrap();
        writer.finish().unwrap();

        let output = std::fs::read_to_string(file.path()).unwrap();
        let functions: Vec<serde_json::Value> = pieces(&output).into_iter().filter(|piece| piece["t"] == 0).collect();
        assert_eq!(functions.last().unwrap()["v"]["n"], "func_main_0");
    }

    #[cfg(unix)]
    #[test]
    fn failing_backend_reports_its_status() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("backend.sh");
        let received = dir.path().join("received");
        std::fs::write(&script, format!("#!/bin/sh\ncat > '{}'\nexit 3\n", received.display())).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let options = CompileOptions {
            ts2abc_path: Some(script),
            ..CompileOptions::default()
        };
        let error = emit_to_backend(&sample_program(), &options).unwrap_err();
        assert!(matches!(error, CompileError::Backend { status: 3 }));
        assert!(std::fs::read_to_string(received).unwrap().ends_with("*\n"));
    }
}
