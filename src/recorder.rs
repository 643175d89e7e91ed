/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

//! Declaration recorder.
//!
//! One top-down walk over the program that:
//!
//! - creates a scope for every scope-introducing node (functions, blocks,
//!   `if`, `switch`, labelled statements, catch clauses, loops and classes),
//! - appends a `Decl` for every declaration site to its nearest scope, and
//!   adds `var` and function declarations to the hoist set of the nearest
//!   variable scope,
//! - records per-function information (inferred name, `length`, flattened
//!   parameter names, sequence number),
//! - synthesizes a default constructor for every class without one,
//! - fills the module record for `import` and `export` declarations, and
//! - collects every identifier reference (including the hidden `this`,
//!   `new.target` and function-object uses) in the scope code generation
//!   will resolve it from, for the resolver's ordered pass.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::ast::{
    AssignmentOp, AssignmentTarget, BindingPattern, BindingTarget, Block, CatchClause, ClassData,
    ClassMemberKind, DeclarationKind, ExportDeclaration, ExportKind, Expression, ExpressionKind,
    ForInOfLhs, ForInit, FunctionBody, FunctionData, FunctionKind, Identifier, ImportDeclaration,
    NodeId, ObjectProperty, Program, PropertyKey, SourceRange, Statement, StatementKind,
    VariableDeclaration,
};
use crate::error::{CompileError, Result};
use crate::module_record::ModuleRecord;
use crate::options::CompileOptions;
use crate::resolver::Reference;
use crate::scope::{
    DEFAULT_EXPORT_NAME, Decl, DeclKind, GLOBAL_IDENTIFIERS, MANDATORY_ARGUMENTS, MANDATORY_FUNC_OBJ,
    MANDATORY_NEW_TARGET, MANDATORY_THIS, ModuleVarKind, ScopeId, ScopeKind, ScopeTree,
};

/// What the recorder learned about one function.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub scope: ScopeId,
    /// Scope of the block body; `None` for concise arrow bodies.
    pub body_scope: Option<ScopeId>,
    /// Declared or inferred name; empty when anonymous.
    pub name: String,
    /// Value of `Function.prototype.length`.
    pub parameter_length: u32,
    pub parameters: Vec<ParameterBinding>,
    /// Every name bound by a parameter, patterns flattened.
    pub parameter_names: Vec<String>,
    /// Position in discovery order, starting at 1.
    pub sequence: u32,
    pub kind: FunctionKind,
    /// Class whose constructor this is.
    pub class: Option<NodeId>,
    pub is_default_export: bool,
}

/// Names bound by one declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterBinding {
    Identifier(String),
    /// A destructuring pattern; its names flattened in source order.
    Pattern(Vec<String>),
}

impl ParameterBinding {
    fn from_target(target: &BindingTarget) -> Self {
        match target {
            BindingTarget::Identifier(ident) => ParameterBinding::Identifier(ident.name.clone()),
            BindingTarget::Pattern(_) => {
                ParameterBinding::Pattern(target.bound_names().into_iter().map(|ident| ident.name.clone()).collect())
            }
        }
    }
}

/// A constructor synthesized for a class that declares none.
#[derive(Debug, Clone)]
pub struct DefaultConstructor {
    pub function: NodeId,
    /// Node of the `...args` parameter of a derived class.
    pub rest_parameter: Option<NodeId>,
}

/// Result of the recording walk.
#[derive(Debug)]
pub struct Recording {
    pub tree: ScopeTree,
    pub module_record: Option<ModuleRecord>,
    pub functions: FxHashMap<NodeId, FunctionInfo>,
    /// Function nodes in discovery order.
    pub function_order: Vec<NodeId>,
    pub func_name_map: FxHashMap<String, u32>,
    pub default_constructors: FxHashMap<NodeId, DefaultConstructor>,
    /// Class node -> constructor function node (declared or synthesized).
    pub class_constructors: FxHashMap<NodeId, NodeId>,
    /// Class scope -> name the class body sees as an immutable binding.
    pub class_bindings: FxHashMap<ScopeId, String>,
    /// Classes with an `extends` clause.
    pub derived_classes: FxHashSet<NodeId>,
    /// Instance field member -> class scope binding holding its computed key.
    pub computed_field_keys: FxHashMap<NodeId, String>,
    /// Every identifier use, implicit ones included, in traversal order.
    pub references: Vec<Reference>,
}

impl Recording {
    pub fn function(&self, node: NodeId) -> Result<&FunctionInfo> {
        self.functions
            .get(&node)
            .ok_or_else(|| CompileError::internal(format!("no function recorded for node {}", node.0)))
    }

    pub fn scope_of(&self, node: NodeId) -> Result<ScopeId> {
        self.tree
            .scope_of_node(node)
            .ok_or_else(|| CompileError::internal(format!("no scope recorded for node {}", node.0)))
    }
}

/// Name inferred for an anonymous function or class from its context.
#[derive(Clone, Copy)]
enum NameHint<'a> {
    None,
    Name(&'a str),
    DefaultExport,
}

pub struct Recorder<'a> {
    options: &'a CompileOptions,
    tree: ScopeTree,
    module_record: Option<ModuleRecord>,
    functions: FxHashMap<NodeId, FunctionInfo>,
    function_order: Vec<NodeId>,
    func_name_map: FxHashMap<String, u32>,
    default_constructors: FxHashMap<NodeId, DefaultConstructor>,
    class_constructors: FxHashMap<NodeId, NodeId>,
    class_bindings: FxHashMap<ScopeId, String>,
    derived_classes: FxHashSet<NodeId>,
    computed_field_keys: FxHashMap<NodeId, String>,
    references: Vec<Reference>,
    /// `export {local as exported}` entries, resolved once all imports are known.
    pending_local_exports: Vec<(String, String)>,
    next_node_id: u32,
}

impl<'a> Recorder<'a> {
    pub fn new(program: &Program, options: &'a CompileOptions) -> Self {
        let root_kind = if options.module {
            ScopeKind::Module
        } else {
            ScopeKind::Global
        };
        let mut func_name_map = FxHashMap::default();
        func_name_map.insert("main".to_string(), 1);
        Self {
            options,
            tree: ScopeTree::new(root_kind, program.id),
            module_record: options.module.then(ModuleRecord::default),
            functions: FxHashMap::default(),
            function_order: Vec::new(),
            func_name_map,
            default_constructors: FxHashMap::default(),
            class_constructors: FxHashMap::default(),
            class_bindings: FxHashMap::default(),
            derived_classes: FxHashSet::default(),
            computed_field_keys: FxHashMap::default(),
            references: Vec::new(),
            pending_local_exports: Vec::new(),
            next_node_id: program.next_node_id,
        }
    }

    pub fn record(mut self, program: &Program) -> Result<Recording> {
        let root = self.tree.root();
        for statement in &program.statements {
            self.record_statement(statement, root)?;
        }
        self.finish_module_exports();
        debug!(
            scopes = self.tree.scope_count(),
            functions = self.function_order.len(),
            "recorded declarations"
        );
        Ok(Recording {
            tree: self.tree,
            module_record: self.module_record,
            functions: self.functions,
            function_order: self.function_order,
            func_name_map: self.func_name_map,
            default_constructors: self.default_constructors,
            class_constructors: self.class_constructors,
            class_bindings: self.class_bindings,
            derived_classes: self.derived_classes,
            computed_field_keys: self.computed_field_keys,
            references: self.references,
        })
    }

    fn fresh_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    fn is_module_root(&self, scope: ScopeId) -> bool {
        self.tree.is_root(scope) && self.tree.scope(scope).kind == ScopeKind::Module
    }

    fn module_record(&mut self, range: &SourceRange) -> Result<&mut ModuleRecord> {
        self.module_record
            .as_mut()
            .ok_or_else(|| CompileError::unsupported("module syntax outside of a module", range))
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn record_statements(&mut self, statements: &[Statement], scope: ScopeId) -> Result<()> {
        for statement in statements {
            self.record_statement(statement, scope)?;
        }
        Ok(())
    }

    fn record_block(&mut self, block: &Block, scope: ScopeId) -> Result<ScopeId> {
        let block_scope = self.tree.add_scope(ScopeKind::Local, block.id, Some(scope));
        self.record_statements(&block.statements, block_scope)?;
        Ok(block_scope)
    }

    fn record_statement(&mut self, statement: &Statement, scope: ScopeId) -> Result<()> {
        match &statement.inner {
            StatementKind::Empty | StatementKind::Debugger => {}
            StatementKind::Continue(_) | StatementKind::Break(_) => {}
            StatementKind::Block(block) => {
                self.record_block(block, scope)?;
            }
            StatementKind::Variable {
                declaration,
                exported,
            } => {
                if *exported {
                    if !self.is_module_root(scope) {
                        return Err(CompileError::unsupported("export outside of a module", &statement.range));
                    }
                    let names: Vec<String> = declaration
                        .declarators
                        .iter()
                        .flat_map(|declarator| declarator.target.bound_names())
                        .map(|ident| ident.name.clone())
                        .collect();
                    let record = self.module_record(&statement.range)?;
                    for name in &names {
                        record.add_local_export(name, name);
                    }
                }
                self.record_variable_declaration(declaration, scope, *exported)?;
            }
            StatementKind::Expression(expression) | StatementKind::Throw(expression) => {
                self.record_expression(expression, scope, NameHint::None)?;
            }
            StatementKind::If {
                test,
                consequent,
                alternate,
            } => {
                let if_scope = self.tree.add_scope(ScopeKind::Local, statement.id, Some(scope));
                self.record_expression(test, if_scope, NameHint::None)?;
                self.record_statement(consequent, if_scope)?;
                if let Some(alternate) = alternate {
                    self.record_statement(alternate, if_scope)?;
                }
            }
            StatementKind::While { test, body } | StatementKind::DoWhile { body, test } => {
                let loop_scope = self.tree.add_scope(ScopeKind::Loop, statement.id, Some(scope));
                self.record_expression(test, loop_scope, NameHint::None)?;
                self.record_statement(body, loop_scope)?;
            }
            StatementKind::For {
                init,
                test,
                update,
                body,
            } => {
                let loop_scope = self.tree.add_scope(ScopeKind::Loop, statement.id, Some(scope));
                match init {
                    Some(ForInit::Declaration(declaration)) => {
                        self.record_variable_declaration(declaration, loop_scope, false)?
                    }
                    Some(ForInit::Expression(expression)) => {
                        self.record_expression(expression, loop_scope, NameHint::None)?
                    }
                    None => {}
                }
                if let Some(test) = test {
                    self.record_expression(test, loop_scope, NameHint::None)?;
                }
                if let Some(update) = update {
                    self.record_expression(update, loop_scope, NameHint::None)?;
                }
                self.record_statement(body, loop_scope)?;
            }
            StatementKind::ForIn { lhs, rhs, body } | StatementKind::ForOf { lhs, rhs, body } => {
                // The iterated object is evaluated before the loop environment exists.
                self.record_expression(rhs, scope, NameHint::None)?;
                let loop_scope = self.tree.add_scope(ScopeKind::Loop, statement.id, Some(scope));
                match lhs {
                    ForInOfLhs::Declaration(declaration) => {
                        self.record_variable_declaration(declaration, loop_scope, false)?
                    }
                    ForInOfLhs::Target(target) => self.record_assignment_target(target, loop_scope)?,
                }
                self.record_statement(body, loop_scope)?;
            }
            StatementKind::Return(value) => {
                if let Some(value) = value {
                    self.record_expression(value, scope, NameHint::None)?;
                }
            }
            StatementKind::Labelled { body, .. } => {
                let label_scope = self.tree.add_scope(ScopeKind::Local, statement.id, Some(scope));
                self.record_statement(body, label_scope)?;
            }
            StatementKind::Try {
                block,
                handler,
                finalizer,
            } => {
                self.record_block(block, scope)?;
                if let Some(handler) = handler {
                    self.record_catch_clause(handler, scope)?;
                }
                if let Some(finalizer) = finalizer {
                    self.record_block(finalizer, scope)?;
                }
            }
            StatementKind::Switch {
                discriminant,
                cases,
            } => {
                self.record_expression(discriminant, scope, NameHint::None)?;
                let switch_scope = self.tree.add_scope(ScopeKind::Local, statement.id, Some(scope));
                for case in cases {
                    if let Some(test) = &case.test {
                        self.record_expression(test, switch_scope, NameHint::None)?;
                    }
                    self.record_statements(&case.body, switch_scope)?;
                }
            }
            StatementKind::FunctionDeclaration { function, export } => {
                self.record_function_declaration(function, *export, scope, &statement.range)?;
            }
            StatementKind::ClassDeclaration { class, export } => {
                let hint = if *export == ExportKind::Default {
                    NameHint::DefaultExport
                } else {
                    NameHint::None
                };
                if *export != ExportKind::None {
                    let name = class.name.as_ref().map(|ident| ident.name.clone());
                    self.record_declaration_export(name, *export, scope, &statement.range)?;
                }
                let module_kind = if *export == ExportKind::None {
                    ModuleVarKind::NotModule
                } else {
                    ModuleVarKind::Exported
                };
                self.record_class(class, scope, module_kind, hint)?;
            }
            StatementKind::Import(import) => {
                if !self.is_module_root(scope) {
                    return Err(CompileError::unsupported("import outside of a module", &statement.range));
                }
                self.record_import(import, scope, &statement.range)?;
            }
            StatementKind::Export(export) => {
                if !self.is_module_root(scope) {
                    return Err(CompileError::unsupported("export outside of a module", &statement.range));
                }
                self.record_export(export, &statement.range)?;
            }
            StatementKind::ExportDefault(expression) => {
                if !self.is_module_root(scope) {
                    return Err(CompileError::unsupported("export outside of a module", &statement.range));
                }
                self.module_record(&statement.range)?
                    .add_local_export(DEFAULT_EXPORT_NAME, "default");
                self.tree.set_decl(
                    scope,
                    Decl::new(DEFAULT_EXPORT_NAME, statement.id, DeclKind::Let)
                        .with_module_kind(ModuleVarKind::Exported),
                );
                self.record_expression(expression, scope, NameHint::DefaultExport)?;
            }
        }
        Ok(())
    }

    fn record_catch_clause(&mut self, clause: &CatchClause, scope: ScopeId) -> Result<()> {
        let catch_scope = self.tree.add_scope(ScopeKind::Local, clause.id, Some(scope));
        if let Some(param) = &clause.param {
            for ident in param.bound_names() {
                self.tree
                    .set_decl(catch_scope, Decl::new(&ident.name, ident.id, DeclKind::CatchParameter));
            }
            if let BindingTarget::Pattern(pattern) = param {
                self.record_pattern(pattern, catch_scope, false)?;
            }
        }
        self.record_block(&clause.body, catch_scope)?;
        Ok(())
    }

    fn record_variable_declaration(
        &mut self,
        declaration: &VariableDeclaration,
        scope: ScopeId,
        exported: bool,
    ) -> Result<()> {
        let module_kind = if exported {
            ModuleVarKind::Exported
        } else {
            ModuleVarKind::NotModule
        };
        let decl_kind = match declaration.kind {
            DeclarationKind::Var => DeclKind::Var,
            DeclarationKind::Let => DeclKind::Let,
            DeclarationKind::Const => DeclKind::Const,
        };
        for declarator in &declaration.declarators {
            for ident in declarator.target.bound_names() {
                let decl = Decl::new(&ident.name, ident.id, decl_kind).with_module_kind(module_kind);
                self.tree.set_decl(scope, decl.clone());
                if decl_kind == DeclKind::Var {
                    let variable_scope = self.tree.nearest_variable_scope(scope);
                    self.collect_hoist_decl(variable_scope, decl);
                }
            }
            if let BindingTarget::Pattern(pattern) = &declarator.target {
                self.record_pattern(pattern, scope, false)?;
            }
            if let Some(init) = &declarator.init {
                let hint = match &declarator.target {
                    BindingTarget::Identifier(ident) => NameHint::Name(&ident.name),
                    BindingTarget::Pattern(_) => NameHint::None,
                };
                self.record_expression(init, scope, hint)?;
            }
        }
        Ok(())
    }

    /// Add `decl` to the hoist set of `variable_scope`.
    ///
    /// Returns false when the declaration was not hoisted because it shares
    /// its name with a parameter, or names a global identifier at the root.
    fn collect_hoist_decl(&mut self, variable_scope: ScopeId, decl: Decl) -> bool {
        let variable_scope_kind = self.tree.scope(variable_scope).kind;
        if variable_scope_kind == ScopeKind::Function && decl.kind == DeclKind::Var {
            let node = self.tree.scope(variable_scope).node;
            if self
                .functions
                .get(&node)
                .is_some_and(|info| info.parameter_names.contains(&decl.name))
            {
                return false;
            }
        }
        if variable_scope_kind == ScopeKind::Global && GLOBAL_IDENTIFIERS.contains(&decl.name.as_str()) {
            return false;
        }
        self.tree.set_hoisted(variable_scope, decl);
        true
    }

    fn record_function_declaration(
        &mut self,
        function: &FunctionData,
        export: ExportKind,
        scope: ScopeId,
        range: &SourceRange,
    ) -> Result<()> {
        let name = function.name.as_ref().map(|ident| ident.name.clone());
        if export != ExportKind::None {
            self.record_declaration_export(name.clone(), export, scope, range)?;
        }
        let hint = if export == ExportKind::Default {
            NameHint::DefaultExport
        } else {
            NameHint::None
        };
        self.record_function(function, scope, hint, None)?;

        let Some(name) = name.or_else(|| (export == ExportKind::Default).then(|| DEFAULT_EXPORT_NAME.to_string()))
        else {
            return Ok(());
        };
        let module_kind = if export == ExportKind::None {
            ModuleVarKind::NotModule
        } else {
            ModuleVarKind::Exported
        };
        let decl = Decl::new(name, function.id, DeclKind::Function).with_module_kind(module_kind);

        let scope_kind = self.tree.scope(scope).kind;
        match scope_kind {
            ScopeKind::Global | ScopeKind::Module => {
                self.collect_hoist_decl(scope, decl.clone());
                self.tree.set_decl(scope, decl);
            }
            _ => {
                let parent_kind = self
                    .tree
                    .scope(scope)
                    .parent
                    .map(|parent| self.tree.scope(parent).kind);
                let is_function_body = scope_kind == ScopeKind::Local && parent_kind == Some(ScopeKind::Function);
                if is_function_body {
                    let variable_scope = self.tree.nearest_variable_scope(scope);
                    self.tree.set_hoisted(variable_scope, decl);
                } else {
                    self.tree.set_decl(scope, decl);
                }
            }
        }
        Ok(())
    }

    fn record_declaration_export(
        &mut self,
        name: Option<String>,
        export: ExportKind,
        scope: ScopeId,
        range: &SourceRange,
    ) -> Result<()> {
        if !self.is_module_root(scope) {
            return Err(CompileError::unsupported("export outside of a module", range));
        }
        let record = self.module_record(range)?;
        match (export, name) {
            (ExportKind::Default, name) => {
                let local = name.unwrap_or_else(|| DEFAULT_EXPORT_NAME.to_string());
                record.add_local_export(&local, "default");
            }
            (_, Some(name)) => record.add_local_export(&name, &name),
            (_, None) => {
                return Err(CompileError::unsupported("exported declaration without a name", range));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Modules
    // =========================================================================

    fn record_import(&mut self, import: &ImportDeclaration, scope: ScopeId, range: &SourceRange) -> Result<()> {
        let request = import.module_request.clone();
        let record = self.module_record(range)?;
        let mut decls = Vec::new();
        if let Some(default_binding) = &import.default_binding {
            record.add_regular_import(&default_binding.name, "default", &request);
            decls.push(
                Decl::new(&default_binding.name, default_binding.id, DeclKind::Const)
                    .with_module_kind(ModuleVarKind::Imported),
            );
        }
        if let Some(namespace) = &import.namespace_binding {
            record.add_namespace_import(&namespace.name, &request);
            decls.push(Decl::new(&namespace.name, namespace.id, DeclKind::Const));
        }
        match &import.named_bindings {
            Some(specifiers) if specifiers.is_empty() => {
                record.add_module_request(&request);
            }
            Some(specifiers) => {
                for specifier in specifiers {
                    record.add_regular_import(&specifier.local.name, &specifier.imported, &request);
                    decls.push(
                        Decl::new(&specifier.local.name, specifier.id, DeclKind::Const)
                            .with_module_kind(ModuleVarKind::Imported),
                    );
                }
            }
            None => {
                if import.default_binding.is_none() && import.namespace_binding.is_none() {
                    record.add_module_request(&request);
                }
            }
        }
        for decl in decls {
            self.tree.set_decl(scope, decl);
        }
        Ok(())
    }

    fn record_export(&mut self, export: &ExportDeclaration, range: &SourceRange) -> Result<()> {
        match (&export.module_request, &export.specifiers) {
            (Some(request), None) => self.module_record(range)?.add_star_export(request),
            (Some(request), Some(specifiers)) => {
                let record = self.module_record(range)?;
                if specifiers.is_empty() {
                    record.add_module_request(request);
                }
                for specifier in specifiers {
                    record.add_indirect_export(&specifier.exported, &specifier.local, request);
                }
            }
            (None, Some(specifiers)) => {
                for specifier in specifiers {
                    self.pending_local_exports
                        .push((specifier.local.clone(), specifier.exported.clone()));
                }
            }
            (None, None) => {
                return Err(CompileError::internal("export declaration without specifiers or request"));
            }
        }
        Ok(())
    }

    /// Resolve `export {x}` entries and mark exported root declarations.
    fn finish_module_exports(&mut self) {
        let Some(record) = self.module_record.as_mut() else {
            return;
        };
        for (local, exported) in std::mem::take(&mut self.pending_local_exports) {
            record.add_export_of_local_name(&local, &exported);
        }
        let root = self.tree.root();
        let exported: Vec<String> = record
            .local_exports
            .iter()
            .map(|entry| entry.local_name.clone())
            .collect();
        let scope = self.tree.scope_mut(root);
        for decl in scope.decls.iter_mut() {
            if exported.contains(&decl.name) && decl.module_kind == ModuleVarKind::NotModule {
                decl.module_kind = ModuleVarKind::Exported;
            }
        }
        if let Some(data) = scope.variable_scope.as_mut() {
            for decl in data.hoisted.values_mut() {
                if exported.contains(&decl.name) {
                    decl.module_kind = ModuleVarKind::Exported;
                }
            }
        }
    }

    // =========================================================================
    // Functions
    // =========================================================================

    fn record_function(
        &mut self,
        function: &FunctionData,
        scope: ScopeId,
        hint: NameHint<'_>,
        class: Option<(NodeId, &str)>,
    ) -> Result<ScopeId> {
        if function.kind.is_generator_or_async() {
            return Err(CompileError::unsupported("generator and async functions", &function.range));
        }
        let function_scope = self.tree.add_scope(ScopeKind::Function, function.id, Some(scope));
        self.tree.variable_scope_data_mut(function_scope).is_arrow = function.kind.is_arrow();

        let name = if function.kind == FunctionKind::Constructor {
            class.map(|(_, name)| name.to_string()).unwrap_or_default()
        } else if let Some(ident) = &function.name {
            ident.name.clone()
        } else {
            match hint {
                NameHint::Name(name) if name != "__proto__" => name.to_string(),
                _ => String::new(),
            }
        };
        self.register_function(
            function.id,
            FunctionInfo {
                scope: function_scope,
                body_scope: None,
                name,
                parameter_length: parameter_length(function),
                parameters: function
                    .parameters
                    .iter()
                    .map(|parameter| ParameterBinding::from_target(&parameter.target))
                    .collect(),
                parameter_names: function
                    .parameters
                    .iter()
                    .flat_map(|parameter| parameter.target.bound_names())
                    .map(|ident| ident.name.clone())
                    .collect(),
                sequence: 0,
                kind: function.kind,
                class: class.map(|(node, _)| node),
                is_default_export: matches!(hint, NameHint::DefaultExport),
            },
        );

        // A named function expression binds its own name in its own scope.
        if function.is_expression
            && let Some(ident) = &function.name
        {
            let mut decl = Decl::new(&ident.name, function.id, DeclKind::Function);
            decl.is_expression = true;
            self.tree.set_decl(function_scope, decl);
        }

        for parameter in &function.parameters {
            if let BindingTarget::Pattern(pattern) = &parameter.target {
                self.record_pattern(pattern, function_scope, false)?;
            }
            if let Some(default) = &parameter.default {
                self.record_expression(default, function_scope, NameHint::None)?;
            }
        }

        match &function.body {
            FunctionBody::Block(block) => {
                let body_scope = self.record_block(block, function_scope)?;
                if let Some(info) = self.functions.get_mut(&function.id) {
                    info.body_scope = Some(body_scope);
                }
            }
            FunctionBody::Expression(expression) => {
                self.record_expression(expression, function_scope, NameHint::None)?;
            }
        }
        Ok(function_scope)
    }

    fn register_function(&mut self, node: NodeId, mut info: FunctionInfo) {
        self.function_order.push(node);
        info.sequence = crate::u32_from_usize(self.function_order.len());
        if !info.name.is_empty() {
            *self.func_name_map.entry(info.name.clone()).or_insert(0) += 1;
        }
        self.functions.insert(node, info);
    }

    // =========================================================================
    // Classes
    // =========================================================================

    fn record_class(
        &mut self,
        class: &ClassData,
        scope: ScopeId,
        module_kind: ModuleVarKind,
        hint: NameHint<'_>,
    ) -> Result<ScopeId> {
        if let Some(super_class) = &class.super_class {
            self.record_expression(super_class, scope, NameHint::None)?;
            self.derived_classes.insert(class.id);
        }
        let class_scope = self.tree.add_scope(ScopeKind::Local, class.id, Some(scope));

        let binding_name = match (&class.name, hint) {
            (Some(ident), _) => Some(ident.name.clone()),
            (None, NameHint::DefaultExport) if !class.is_expression => Some(DEFAULT_EXPORT_NAME.to_string()),
            (None, _) => None,
        };
        if let Some(ident) = &class.name {
            self.class_bindings.insert(class_scope, ident.name.clone());
        }
        if let Some(name) = &binding_name {
            let mut decl = Decl::new(name, class.id, DeclKind::Class).with_module_kind(module_kind);
            decl.is_expression = class.is_expression;
            self.tree.set_decl(scope, decl);
        }
        let class_name = match (&class.name, hint) {
            (Some(ident), _) => ident.name.clone(),
            (None, NameHint::Name(name)) => name.to_string(),
            _ => String::new(),
        };

        // Constructor first so instance fields can be recorded in its scope.
        let constructor_scope = match class.constructor() {
            Some(constructor) => {
                self.class_constructors.insert(class.id, constructor.id);
                self.record_function(constructor, class_scope, NameHint::None, Some((class.id, class_name.as_str())))?
            }
            None => self.add_default_constructor(class, class_scope, &class_name),
        };

        for member in &class.members {
            if let PropertyKey::Computed(key) = &member.key {
                self.record_expression(key, class_scope, NameHint::None)?;
                if matches!(member.kind, ClassMemberKind::Field(_)) && !member.is_static {
                    self.record_computed_field_key(member.id, key, class_scope, constructor_scope);
                }
            }
            match &member.kind {
                ClassMemberKind::Method(function) if function.kind == FunctionKind::Constructor => {}
                ClassMemberKind::Method(function) => {
                    self.record_function(function, class_scope, NameHint::None, None)?;
                }
                ClassMemberKind::Field(Some(initializer)) => {
                    let field_scope = if member.is_static {
                        class_scope
                    } else {
                        constructor_scope
                    };
                    let hint = match &member.key {
                        PropertyKey::Identifier(name) | PropertyKey::String(name) => NameHint::Name(name),
                        _ => NameHint::None,
                    };
                    self.record_expression(initializer, field_scope, hint)?;
                }
                ClassMemberKind::Field(None) => {}
            }
        }
        Ok(class_scope)
    }

    /// An instance field key is evaluated once, with the class. The
    /// constructor reads the result back from a class scope binding.
    fn record_computed_field_key(
        &mut self,
        member: NodeId,
        key: &Expression,
        class_scope: ScopeId,
        constructor_scope: ScopeId,
    ) {
        if matches!(key.inner, ExpressionKind::String(_) | ExpressionKind::Number(_)) {
            return;
        }
        let name = format!("{}fieldKey", member.0);
        self.tree.set_decl(class_scope, Decl::new(&name, member, DeclKind::Const));
        self.push_reference(constructor_scope, &name, false);
        self.computed_field_keys.insert(member, name);
    }

    /// Synthesize `constructor(...args) { super(...args); }` (derived) or
    /// `constructor() {}` (base) for a class without a constructor.
    fn add_default_constructor(&mut self, class: &ClassData, class_scope: ScopeId, class_name: &str) -> ScopeId {
        let function = self.fresh_node_id();
        let function_scope = self.tree.add_scope(ScopeKind::Function, function, Some(class_scope));
        let body = self.fresh_node_id();
        let body_scope = self.tree.add_scope(ScopeKind::Local, body, Some(function_scope));

        let rest_parameter = class.super_class.is_some().then(|| self.fresh_node_id());
        self.register_function(
            function,
            FunctionInfo {
                scope: function_scope,
                body_scope: Some(body_scope),
                name: class_name.to_string(),
                parameter_length: 0,
                parameters: rest_parameter
                    .map(|_| vec![ParameterBinding::Identifier("args".to_string())])
                    .unwrap_or_default(),
                parameter_names: rest_parameter.map(|_| vec!["args".to_string()]).unwrap_or_default(),
                sequence: 0,
                kind: FunctionKind::Constructor,
                class: Some(class.id),
                is_default_export: false,
            },
        );
        self.default_constructors.insert(
            class.id,
            DefaultConstructor {
                function,
                rest_parameter,
            },
        );
        self.class_constructors.insert(class.id, function);
        function_scope
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// Record the expressions nested in a pattern. `references` is set for
    /// destructuring assignments, whose identifiers are uses, not bindings.
    fn record_pattern(&mut self, pattern: &BindingPattern, scope: ScopeId, references: bool) -> Result<()> {
        for element in &pattern.elements {
            if let Some(PropertyKey::Computed(key)) = &element.key {
                self.record_expression(key, scope, NameHint::None)?;
            }
            match &element.target {
                Some(BindingTarget::Identifier(ident)) if references => {
                    self.push_reference(scope, &ident.name, true)
                }
                Some(BindingTarget::Pattern(inner)) => self.record_pattern(inner, scope, references)?,
                _ => {}
            }
            if let Some(default) = &element.default {
                let hint = match &element.target {
                    Some(BindingTarget::Identifier(ident)) => NameHint::Name(&ident.name),
                    _ => NameHint::None,
                };
                self.record_expression(default, scope, hint)?;
            }
        }
        Ok(())
    }

    fn record_reference(&mut self, ident: &Identifier, scope: ScopeId) {
        self.push_reference(scope, &ident.name, false);
    }

    fn push_reference(&mut self, scope: ScopeId, name: &str, is_assignment: bool) {
        if name == MANDATORY_ARGUMENTS {
            let variable_scope = self.tree.nearest_non_arrow_variable_scope(scope);
            if self.tree.scope(variable_scope).kind == ScopeKind::Function {
                self.tree.variable_scope_data_mut(variable_scope).uses_arguments = true;
            }
        }
        self.references.push(Reference {
            scope,
            name: name.to_string(),
            is_assignment,
        });
    }

    /// Record a simple assignment target; a bare identifier is a write.
    fn record_assignment_target(&mut self, target: &Expression, scope: ScopeId) -> Result<()> {
        match target.as_identifier() {
            Some(ident) => {
                self.push_reference(scope, &ident.name, true);
                Ok(())
            }
            None => self.record_expression(target, scope, NameHint::None),
        }
    }

    fn record_expressions(&mut self, expressions: &[Expression], scope: ScopeId) -> Result<()> {
        for expression in expressions {
            self.record_expression(expression, scope, NameHint::None)?;
        }
        Ok(())
    }

    fn record_expression(&mut self, expression: &Expression, scope: ScopeId, hint: NameHint<'_>) -> Result<()> {
        match &expression.inner {
            ExpressionKind::Number(_)
            | ExpressionKind::BigInt(_)
            | ExpressionKind::String(_)
            | ExpressionKind::Boolean(_)
            | ExpressionKind::Null
            | ExpressionKind::RegExp { .. } => {}
            ExpressionKind::This => self.push_reference(scope, MANDATORY_THIS, false),
            ExpressionKind::NewTarget => self.push_reference(scope, MANDATORY_NEW_TARGET, false),
            ExpressionKind::Template { expressions, .. } => self.record_expressions(expressions, scope)?,
            ExpressionKind::TaggedTemplate { tag, expressions, .. } => {
                self.record_expression(tag, scope, NameHint::None)?;
                self.record_expressions(expressions, scope)?;
            }
            ExpressionKind::Identifier(ident) => self.record_reference(ident, scope),
            ExpressionKind::Array(elements) => {
                for element in elements.iter().flatten() {
                    self.record_expression(element, scope, NameHint::None)?;
                }
            }
            ExpressionKind::Object(properties) => {
                for property in properties {
                    match property {
                        ObjectProperty::KeyValue { key, value } => {
                            if let PropertyKey::Computed(key) = key {
                                self.record_expression(key, scope, NameHint::None)?;
                            }
                            let name = key.literal_name();
                            let hint = name.as_deref().map_or(NameHint::None, NameHint::Name);
                            self.record_expression(value, scope, hint)?;
                        }
                        ObjectProperty::Shorthand(ident) => self.record_reference(ident, scope),
                        ObjectProperty::Method { key, function } => {
                            if let PropertyKey::Computed(key) = key {
                                self.record_expression(key, scope, NameHint::None)?;
                            }
                            self.record_function(function, scope, NameHint::None, None)?;
                        }
                        ObjectProperty::Spread(value) => self.record_expression(value, scope, NameHint::None)?,
                    }
                }
            }
            ExpressionKind::Member { object, .. } => self.record_expression(object, scope, NameHint::None)?,
            ExpressionKind::ComputedMember { object, property } => {
                self.record_expression(object, scope, NameHint::None)?;
                self.record_expression(property, scope, NameHint::None)?;
            }
            ExpressionKind::SuperMember(_) => self.push_reference(scope, MANDATORY_THIS, false),
            ExpressionKind::SuperComputedMember(property) => {
                self.push_reference(scope, MANDATORY_THIS, false);
                self.record_expression(property, scope, NameHint::None)?
            }
            ExpressionKind::Call { callee, arguments } | ExpressionKind::New { callee, arguments } => {
                self.record_expression(callee, scope, NameHint::None)?;
                self.record_expressions(arguments, scope)?;
            }
            ExpressionKind::SuperCall(arguments) => {
                self.record_expressions(arguments, scope)?;
                self.push_reference(scope, MANDATORY_FUNC_OBJ, false);
                self.push_reference(scope, MANDATORY_THIS, true);
            }
            ExpressionKind::Spread(inner) | ExpressionKind::Unary { operand: inner, .. } => {
                self.record_expression(inner, scope, NameHint::None)?
            }
            ExpressionKind::Function(function) => {
                self.record_function(function, scope, hint, None)?;
            }
            ExpressionKind::Class(class) => {
                self.record_class(class, scope, ModuleVarKind::NotModule, hint)?;
            }
            ExpressionKind::Update { target, .. } => self.record_expression(target, scope, NameHint::None)?,
            ExpressionKind::Binary { lhs, rhs, .. } | ExpressionKind::Logical { lhs, rhs, .. } => {
                self.record_expression(lhs, scope, NameHint::None)?;
                self.record_expression(rhs, scope, NameHint::None)?;
            }
            ExpressionKind::Assignment { op, target, value } => {
                let hint = match target {
                    AssignmentTarget::Simple(target) => {
                        self.record_assignment_target(target, scope)?;
                        match (op, target.as_identifier()) {
                            (AssignmentOp::Assign, Some(ident)) => NameHint::Name(&ident.name),
                            _ => NameHint::None,
                        }
                    }
                    AssignmentTarget::Pattern(pattern) => {
                        self.record_pattern(pattern, scope, true)?;
                        NameHint::None
                    }
                };
                self.record_expression(value, scope, hint)?;
            }
            ExpressionKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.record_expression(test, scope, NameHint::None)?;
                self.record_expression(consequent, scope, NameHint::None)?;
                self.record_expression(alternate, scope, NameHint::None)?;
            }
            ExpressionKind::Sequence(expressions) => self.record_expressions(expressions, scope)?,
            ExpressionKind::Yield(_) => return Err(CompileError::unsupported("yield", &expression.range)),
            ExpressionKind::Await(_) => return Err(CompileError::unsupported("await", &expression.range)),
        }
        Ok(())
    }
}

/// Parameters before the first default or rest parameter.
pub fn parameter_length(function: &FunctionData) -> u32 {
    crate::u32_from_usize(
        function
            .parameters
            .iter()
            .take_while(|parameter| parameter.default.is_none() && !parameter.is_rest)
            .count(),
    )
}

/// Run the recorder over `program`.
pub fn record(program: &Program, options: &CompileOptions) -> Result<Recording> {
    Recorder::new(program, options).record(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstBuilder;

    fn record_script(program: &Program) -> Recording {
        record(program, &CompileOptions::default()).unwrap()
    }

    #[test]
    fn function_declarations_in_a_body_are_hoisted_not_declared() {
        let mut b = AstBuilder::new();
        let inner = b.function_declaration("g", &[], vec![]);
        let outer = b.function_declaration("f", &["a"], vec![inner]);
        let program = b.program(vec![outer]);
        let recording = record_script(&program);

        let root = recording.tree.root();
        assert!(recording.tree.variable_scope_data(root).hoisted.contains_key("f"));
        assert!(recording.tree.scope(root).get_decl("f").is_some());

        let StatementKind::FunctionDeclaration { function, .. } = &program.statements[0].inner else {
            unreachable!()
        };
        let info = recording.function(function.id).unwrap();
        assert!(recording.tree.variable_scope_data(info.scope).hoisted.contains_key("g"));
        let body = info.body_scope.unwrap();
        assert!(recording.tree.scope(body).get_decl("g").is_none());
        assert_eq!(info.parameter_length, 1);
    }

    #[test]
    fn vars_named_like_parameters_are_not_hoisted() {
        let mut b = AstBuilder::new();
        let var = b.declare(DeclarationKind::Var, "a", None);
        let other = b.declare(DeclarationKind::Var, "b", None);
        let function = b.function_declaration("f", &["a"], vec![var, other]);
        let program = b.program(vec![function]);
        let recording = record_script(&program);

        let StatementKind::FunctionDeclaration { function, .. } = &program.statements[0].inner else {
            unreachable!()
        };
        let scope = recording.function(function.id).unwrap().scope;
        let hoisted = &recording.tree.variable_scope_data(scope).hoisted;
        assert!(!hoisted.contains_key("a"));
        assert!(hoisted.contains_key("b"));
    }

    #[test]
    fn global_identifiers_are_declared_but_not_hoisted() {
        let mut b = AstBuilder::new();
        let declaration = b.declare(DeclarationKind::Var, "undefined", None);
        let program = b.program(vec![declaration]);
        let recording = record_script(&program);

        let root = recording.tree.root();
        assert!(recording.tree.variable_scope_data(root).hoisted.is_empty());
        assert!(recording.tree.scope(root).get_decl("undefined").is_some());
    }

    #[test]
    fn anonymous_functions_take_their_binding_name() {
        let mut b = AstBuilder::new();
        let function = b.function(FunctionKind::Normal, None, &[], vec![]);
        let function_id = function.id;
        let mut function_expression = b.function_expression(function);
        if let ExpressionKind::Function(function) = &mut function_expression.inner {
            function.is_expression = true;
        }
        let declaration = b.declare(DeclarationKind::Let, "handler", Some(function_expression));
        let program = b.program(vec![declaration]);
        let recording = record_script(&program);

        assert_eq!(recording.function(function_id).unwrap().name, "handler");
        assert_eq!(recording.func_name_map["handler"], 1);
        assert_eq!(recording.func_name_map["main"], 1);
    }

    #[test]
    fn arguments_in_an_arrow_marks_the_enclosing_function() {
        let mut b = AstBuilder::new();
        let arguments = b.ident("arguments");
        let arrow = b.arrow(&[], arguments);
        let statement = b.expression_statement(arrow);
        let function = b.function_declaration("f", &[], vec![statement]);
        let program = b.program(vec![function]);
        let recording = record_script(&program);

        let StatementKind::FunctionDeclaration { function, .. } = &program.statements[0].inner else {
            unreachable!()
        };
        let scope = recording.function(function.id).unwrap().scope;
        assert!(recording.tree.variable_scope_data(scope).uses_arguments);
    }

    #[test]
    fn module_syntax_requires_module_mode() {
        let mut b = AstBuilder::new();
        let expression = b.number(1.0);
        let statement = b.node(StatementKind::ExportDefault(expression));
        let program = b.program(vec![statement]);
        let error = record(&program, &CompileOptions::default()).unwrap_err();
        assert!(matches!(error, CompileError::Unsupported { .. }));
    }
}
