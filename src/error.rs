/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

//! Compiler error type.
//!
//! Runtime semantic violations (TDZ reads, const assignment) are never
//! reported here; they are compiled into the instruction stream as guards.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    /// A broken invariant between the recorder, binder and generator.
    #[error("internal compiler error: {message}")]
    Internal { message: String },

    #[error("{construct} is not supported at {line}:{column}")]
    Unsupported {
        construct: &'static str,
        line: u32,
        column: u32,
    },

    #[error("invalid compile options: {message}")]
    InvalidOptions { message: String },

    #[error("backend process exited with status {status}")]
    Backend { status: i32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

impl CompileError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn unsupported(construct: &'static str, range: &crate::ast::SourceRange) -> Self {
        Self::Unsupported {
            construct,
            line: range.start.line,
            column: range.start.column,
        }
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;
