/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

//! Compilation options.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct CompileOptions {
    /// Wrap the program root in the CommonJS parameter layout.
    pub commonjs: bool,
    /// Compile the program root as an ECMAScript module.
    pub module: bool,
    /// Emit byte bounds, variable records and scope-info literals.
    pub debug_mode: bool,
    /// Route global accesses through the debugger bridge.
    pub watch_evaluate_expression: bool,
    /// Treat every function as strict.
    pub strict: bool,
    pub record_name: String,
    pub output_file_name: String,
    /// Backend executable that receives the serialized program.
    pub ts2abc_path: Option<PathBuf>,
}

impl CompileOptions {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json).map_err(|error| CompileError::InvalidOptions {
            message: error.to_string(),
        })?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.commonjs && self.module {
            return Err(CompileError::InvalidOptions {
                message: "commonjs and module are mutually exclusive".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_fields() {
        let options =
            CompileOptions::from_json_str(r#"{ "commonjs": true, "debugMode": true, "recordName": "a" }"#)
                .unwrap();
        assert!(options.commonjs);
        assert!(options.debug_mode);
        assert!(!options.module);
        assert_eq!(options.record_name, "a");
    }

    #[test]
    fn rejects_unknown_fields() {
        let error = CompileOptions::from_json_str(r#"{ "optLevel": 2 }"#).unwrap_err();
        assert!(matches!(error, CompileError::InvalidOptions { .. }));
    }

    #[test]
    fn rejects_commonjs_modules() {
        let error = CompileOptions::from_json_str(r#"{ "commonjs": true, "module": true }"#).unwrap_err();
        assert!(matches!(error, CompileError::InvalidOptions { .. }));
    }
}
