/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

//! # ts2panda
//!
//! Scope resolution and bytecode generation for an accumulator-based
//! JavaScript VM.
//!
//! ## Architecture
//!
//! ```text
//! AST (ast.rs, built by an external parser)
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────┐
//! │  Recorder (recorder.rs)                             │
//! │  Scope tree, declarations, hoisting, references     │
//! └──────────────────────┬──────────────────────────────┘
//!                        │ Recording
//!                        ▼
//! ┌─────────────────────────────────────────────────────┐
//! │  Binder (binder.rs) + Resolver (resolver.rs)        │
//! │  Variables, storage classes, lexical slot promotion │
//! └──────────────────────┬──────────────────────────────┘
//!                        │ resolved scope tree
//!                        ▼
//! ┌─────────────────────────────────────────────────────┐
//! │  Codegen (bytecode/codegen.rs)                      │
//! │  One unit per function, emitted via Generator       │
//! └──────────────────────┬──────────────────────────────┘
//!                        │ instructions, catch tables
//!                        ▼
//! ┌─────────────────────────────────────────────────────┐
//! │  Pipe (pipe.rs)                                     │
//! │  Framed JSON pieces to the native backend           │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module overview
//!
//! - `ast.rs`: AST contract and `AstBuilder`
//! - `scope.rs`: Scope and variable arenas
//! - `recorder.rs`: Declaration recorder
//! - `binder.rs`: Declarations to variables
//! - `resolver.rs`: Lookup, promotion, access levels
//! - `module_record.rs`: ECMAScript module tables
//! - `bytecode/`: Instructions, generator, code generation, debug info
//! - `driver.rs`: Whole-program pipeline
//! - `pipe.rs`: Backend hand-off
//! - `options.rs`, `error.rs`: Configuration and errors

pub mod ast;
pub mod binder;
pub mod bytecode;
pub mod driver;
pub mod error;
pub mod module_record;
pub mod options;
pub mod pipe;
pub mod recorder;
pub mod resolver;
pub mod scope;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Once;

use tracing_subscriber::EnvFilter;

pub use driver::{CompiledFunction, CompiledProgram, compile_program};
pub use error::{CompileError, Result};
pub use options::CompileOptions;

/// Convert a `usize` to `u32`, panicking if the value exceeds `u32::MAX`.
/// Prefer this over `as u32` which silently truncates on 64-bit platforms.
pub(crate) fn u32_from_usize(value: usize) -> u32 {
    u32::try_from(value).expect("value exceeds u32::MAX")
}

/// Run `f`, turning a panic inside it into `CompileError::Internal`.
///
/// Broken invariants deep in the pipeline are asserted rather than threaded
/// through every signature; either way the whole program is rejected.
pub(crate) fn catch_internal_errors<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            tracing::error!(%message, "compilation aborted");
            Err(CompileError::internal(message))
        }
    }
}

static INIT_LOGGING: Once = Once::new();

/// Install a formatting subscriber. `RUST_LOG` overrides `default_filter`.
/// Only the first call has an effect.
pub fn init_logging(default_filter: &str) {
    INIT_LOGGING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panics_become_internal_errors() {
        let result: Result<()> = catch_internal_errors(|| panic!("scope arena corrupted"));
        match result {
            Err(CompileError::Internal { message }) => assert_eq!(message, "scope arena corrupted"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn logging_can_be_initialized_twice() {
        init_logging("warn");
        init_logging("debug");
    }
}
