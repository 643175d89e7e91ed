/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

//! Binder: turns recorded declarations into variables.
//!
//! Scopes are visited in creation order. A variable scope first binds its
//! parameters (hidden ones included) and its hoist set; every scope then
//! binds its own remaining declarations. Storage classes come from
//! `ScopeTree::add`.

use tracing::debug;

use crate::ast::{ANY_TYPE, NodeId, Program, TypeTable};
use crate::error::{CompileError, Result};
use crate::options::CompileOptions;
use crate::recorder::{ParameterBinding, Recording};
use crate::scope::{
    COMMONJS_PARAMETERS, Decl, DeclKind, GLOBAL_IDENTIFIERS, InitStatus, MANDATORY_ARGUMENTS,
    MANDATORY_FUNC_OBJ, MANDATORY_NEW_TARGET, MANDATORY_THIS, ModuleVarKind, ScopeId, ScopeKind,
    Storage, VarKind, VariableId,
};

pub struct Binder<'a> {
    recording: &'a mut Recording,
    program: &'a Program,
    options: &'a CompileOptions,
    types: &'a dyn TypeTable,
}

impl<'a> Binder<'a> {
    pub fn new(
        recording: &'a mut Recording,
        program: &'a Program,
        options: &'a CompileOptions,
        types: &'a dyn TypeTable,
    ) -> Self {
        Self {
            recording,
            program,
            options,
            types,
        }
    }

    pub fn bind(mut self) -> Result<()> {
        for scope in self.recording.tree.scope_ids() {
            let mut hoisted = Vec::new();
            if self.recording.tree.scope(scope).kind.is_variable_scope() {
                self.bind_parameters(scope)?;
                hoisted = self.bind_hoisted(scope)?;
            }
            let decls = self.recording.tree.scope(scope).decls.clone();
            for decl in &decls {
                if hoisted.contains(&decl.node) {
                    continue;
                }
                self.bind_decl(scope, decl)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Parameters
    // =========================================================================

    fn bind_parameters(&mut self, scope: ScopeId) -> Result<()> {
        let tree = &mut self.recording.tree;
        let is_arrow = tree.scope(scope).is_arrow_function();
        for name in [MANDATORY_FUNC_OBJ, MANDATORY_NEW_TARGET, MANDATORY_THIS] {
            tree.add_parameter(scope, name, VarKind::Const, true, !is_arrow);
        }

        let kind = tree.scope(scope).kind;
        if kind == ScopeKind::Global && self.options.commonjs {
            for name in COMMONJS_PARAMETERS {
                tree.add_parameter(scope, name, VarKind::Let, false, true);
            }
        }

        if kind == ScopeKind::Function {
            let node = tree.scope(scope).node;
            let info = self
                .recording
                .functions
                .get(&node)
                .ok_or_else(|| CompileError::internal(format!("function scope {} has no function info", scope.0)))?;
            let parameters = info.parameters.clone();
            let tree = &mut self.recording.tree;
            for (index, parameter) in parameters.iter().enumerate() {
                match parameter {
                    ParameterBinding::Identifier(name) => {
                        tree.add_parameter(scope, name, VarKind::Var, false, true);
                    }
                    ParameterBinding::Pattern(names) => {
                        tree.add_parameter(scope, &format!("{index}pattern"), VarKind::Var, true, true);
                        for name in names {
                            tree.add(scope, name, VarKind::Var, ModuleVarKind::NotModule);
                        }
                    }
                }
            }

            let data = tree.variable_scope_data(scope);
            if data.uses_arguments || (self.options.debug_mode && !data.is_arrow) {
                let arguments = tree.add(scope, MANDATORY_ARGUMENTS, VarKind::Const, ModuleVarKind::NotModule);
                tree.variable_mut(arguments).initial_status = InitStatus::Initialized;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    /// Bind the hoist set of `scope`, returning the nodes that were bound.
    fn bind_hoisted(&mut self, scope: ScopeId) -> Result<Vec<NodeId>> {
        let hoisted: Vec<Decl> = self
            .recording
            .tree
            .variable_scope_data(scope)
            .hoisted
            .values()
            .cloned()
            .collect();
        for decl in &hoisted {
            let kind = match decl.kind {
                DeclKind::Var => VarKind::Var,
                DeclKind::Function => VarKind::Function,
                other => {
                    return Err(CompileError::internal(format!(
                        "hoisted declaration '{}' has kind {other:?}",
                        decl.name
                    )));
                }
            };
            self.add_variable(scope, decl, kind)?;
        }
        Ok(hoisted.into_iter().map(|decl| decl.node).collect())
    }

    fn bind_decl(&mut self, scope: ScopeId, decl: &Decl) -> Result<()> {
        match decl.kind {
            DeclKind::Let => self.add_variable(scope, decl, VarKind::Let).map(drop),
            DeclKind::Const => {
                let id = self.add_variable(scope, decl, VarKind::Const)?;
                if self.recording.computed_field_keys.contains_key(&decl.node) {
                    // Stored while the class is defined, before any constructor runs.
                    self.recording.tree.variable_mut(id).initial_status = InitStatus::Initialized;
                }
                Ok(())
            }
            DeclKind::CatchParameter => self.add_variable(scope, decl, VarKind::Let).map(drop),
            DeclKind::Function => self.add_variable(scope, decl, VarKind::Function).map(drop),
            DeclKind::Class => {
                let target = if decl.is_expression {
                    self.recording.scope_of(decl.node)?
                } else {
                    scope
                };
                self.add_variable(target, decl, VarKind::Class).map(drop)
            }
            DeclKind::Var if GLOBAL_IDENTIFIERS.contains(&decl.name.as_str()) => {
                self.add_variable(scope, decl, VarKind::Var).map(drop)
            }
            DeclKind::Var => Ok(()),
        }
    }

    fn add_variable(&mut self, scope: ScopeId, decl: &Decl, kind: VarKind) -> Result<VariableId> {
        let id = self.recording.tree.add(scope, &decl.name, kind, decl.module_kind);
        let type_index = self
            .types
            .type_index(self.program.original_node(decl.node))
            .unwrap_or(ANY_TYPE);

        let storage = self.recording.tree.variable(id).storage;
        let storage = match storage {
            Storage::Module { external, .. } if decl.module_kind != ModuleVarKind::NotModule => Storage::Module {
                index: self.module_index(decl)?,
                external,
            },
            other => other,
        };

        let variable = self.recording.tree.variable_mut(id);
        variable.storage = storage;
        variable.type_index = type_index;
        debug!(
            name = %decl.name,
            ?kind,
            ?storage,
            scope = variable.scope.0,
            "bound variable"
        );
        Ok(id)
    }

    fn module_index(&self, decl: &Decl) -> Result<u32> {
        let record = self
            .recording
            .module_record
            .as_ref()
            .ok_or_else(|| CompileError::internal("module variable without a module record"))?;
        let index = match decl.module_kind {
            ModuleVarKind::Exported => record.local_export_index(&decl.name),
            ModuleVarKind::Imported => record.regular_import_index(&decl.name),
            ModuleVarKind::NotModule => None,
        };
        index.ok_or_else(|| CompileError::internal(format!("no module slot for '{}'", decl.name)))
    }
}

/// Bind every declaration of `recording`.
pub fn bind(
    recording: &mut Recording,
    program: &Program,
    options: &CompileOptions,
    types: &dyn TypeTable,
) -> Result<()> {
    Binder::new(recording, program, options, types).bind()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstBuilder, DeclarationKind, ExportKind, ExpressionKind, NoTypes, StatementKind};
    use crate::recorder;

    fn bound(program: &Program, options: &CompileOptions) -> Recording {
        let mut recording = recorder::record(program, options).unwrap();
        bind(&mut recording, program, options, &NoTypes).unwrap();
        recording
    }

    fn parameter_names(recording: &Recording, scope: ScopeId) -> Vec<String> {
        recording
            .tree
            .variable_scope_data(scope)
            .parameters
            .iter()
            .map(|&id| recording.tree.variable(id).name.clone())
            .collect()
    }

    #[test]
    fn functions_get_hidden_parameters_first() {
        let mut b = AstBuilder::new();
        let function = b.function_declaration("f", &["a", "b"], vec![]);
        let program = b.program(vec![function]);
        let recording = bound(&program, &CompileOptions::default());

        let StatementKind::FunctionDeclaration { function, .. } = &program.statements[0].inner else {
            unreachable!()
        };
        let scope = recording.function(function.id).unwrap().scope;
        assert_eq!(
            parameter_names(&recording, scope),
            vec!["4funcObj", "4newTarget", "4this", "a", "b"]
        );
        let this = recording.tree.find_local(scope, MANDATORY_THIS).unwrap();
        assert_eq!(recording.tree.variable(this).kind, VarKind::Const);
    }

    #[test]
    fn commonjs_root_has_eight_parameters() {
        let mut b = AstBuilder::new();
        let program = b.program(vec![]);
        let options = CompileOptions {
            commonjs: true,
            ..CompileOptions::default()
        };
        let recording = bound(&program, &options);
        let names = parameter_names(&recording, recording.tree.root());
        assert_eq!(names.len(), 8);
        assert_eq!(names[3], "exports");
        assert_eq!(names[7], "__dirname");

        let recording = bound(&program, &CompileOptions::default());
        assert_eq!(parameter_names(&recording, recording.tree.root()).len(), 3);
    }

    #[test]
    fn arrow_hidden_parameters_are_not_visible_by_name() {
        let mut b = AstBuilder::new();
        let body = b.this();
        let arrow = b.arrow(&["x"], body);
        let statement = b.expression_statement(arrow);
        let program = b.program(vec![statement]);
        let recording = bound(&program, &CompileOptions::default());

        let StatementKind::Expression(expression) = &program.statements[0].inner else {
            unreachable!()
        };
        let ExpressionKind::Function(function) = &expression.inner else {
            unreachable!()
        };
        let scope = recording.function(function.id).unwrap().scope;
        assert_eq!(parameter_names(&recording, scope).len(), 4);
        assert!(recording.tree.find_local(scope, MANDATORY_THIS).is_none());
        assert!(recording.tree.find_local(scope, "x").is_some());
    }

    #[test]
    fn global_storage_classes() {
        let mut b = AstBuilder::new();
        let var = b.declare(DeclarationKind::Var, "a", None);
        let let_binding = b.declare(DeclarationKind::Let, "b", None);
        let function = b.function_declaration("f", &[], vec![]);
        let program = b.program(vec![var, let_binding, function]);
        let recording = bound(&program, &CompileOptions::default());
        let root = recording.tree.root();

        let storage = |name: &str| {
            let id = recording.tree.find_local(root, name).unwrap();
            recording.tree.variable(id).storage
        };
        assert_eq!(storage("a"), Storage::Global);
        assert_eq!(storage("b"), Storage::Local);
        assert_eq!(storage("f"), Storage::Global);
    }

    #[test]
    fn exported_module_bindings_take_local_export_slots() {
        let mut b = AstBuilder::new();
        let mut first = b.declare(DeclarationKind::Let, "a", None);
        let mut second = b.declare(DeclarationKind::Const, "c", None);
        for statement in [&mut first, &mut second] {
            if let StatementKind::Variable { exported, .. } = &mut statement.inner {
                *exported = true;
            }
        }
        let mut function = b.function_declaration("f", &[], vec![]);
        if let StatementKind::FunctionDeclaration { export, .. } = &mut function.inner {
            *export = ExportKind::Named;
        }
        let program = b.program(vec![first, second, function]);
        let options = CompileOptions {
            module: true,
            ..CompileOptions::default()
        };
        let recording = bound(&program, &options);
        let root = recording.tree.root();

        let storage = |name: &str| {
            let id = recording.tree.find_local(root, name).unwrap();
            recording.tree.variable(id).storage
        };
        assert_eq!(storage("a"), Storage::Module { index: 0, external: false });
        assert_eq!(storage("c"), Storage::Module { index: 1, external: false });
        assert_eq!(storage("f"), Storage::Module { index: 2, external: false });
    }

    #[test]
    fn debug_mode_binds_arguments_in_every_function() {
        let mut b = AstBuilder::new();
        let function = b.function_declaration("f", &[], vec![]);
        let program = b.program(vec![function]);
        let options = CompileOptions {
            debug_mode: true,
            ..CompileOptions::default()
        };
        let recording = bound(&program, &options);
        let StatementKind::FunctionDeclaration { function, .. } = &program.statements[0].inner else {
            unreachable!()
        };
        let scope = recording.function(function.id).unwrap().scope;
        let arguments = recording.tree.find_local(scope, MANDATORY_ARGUMENTS).unwrap();
        assert_eq!(recording.tree.variable(arguments).initial_status, InitStatus::Initialized);
    }
}
