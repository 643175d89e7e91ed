/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

//! Scope tree shared by the recorder, binder, resolver and code generator.
//!
//! All scopes and variables of one program live in two arenas owned by
//! `ScopeTree`. Scopes refer to their parent and children by `ScopeId`,
//! variables refer to their owning scope by `ScopeId`, and name maps point
//! into the variable arena by `VariableId`.
//!
//! ## Scope kinds
//!
//! - `Global`, `Module`, `Function` are *variable scopes*: they own a hoist
//!   set and a parameter list, and link into the coarser variable-scope tree.
//! - `Local` is a block scope. It never owns an environment.
//! - `Loop` is a block scope that may own a per-iteration environment.
//!
//! Variable scopes and loop scopes are *lexical*: they carry a `LexicalEnv`
//! that counts slots handed out to captured variables.
//!
//! ## Variable life cycle
//!
//! 1. The recorder appends `Decl`s to scopes (and to hoist sets).
//! 2. The binder turns each `Decl` into a `Variable` with a storage class.
//! 3. The resolver promotes captured variables to lexical slots.
//! 4. The code generator binds registers lazily and tracks initialization.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::ast::NodeId;
use crate::u32_from_usize;

/// Name of the hidden function-object parameter.
pub const MANDATORY_FUNC_OBJ: &str = "4funcObj";
/// Name of the hidden new.target parameter.
pub const MANDATORY_NEW_TARGET: &str = "4newTarget";
/// Name of the hidden `this` parameter.
pub const MANDATORY_THIS: &str = "4this";
pub const MANDATORY_ARGUMENTS: &str = "arguments";

/// Parameter names injected at indices 1-5 of a CommonJS root.
pub const COMMONJS_PARAMETERS: [&str; 5] = ["exports", "require", "module", "__filename", "__dirname"];

/// Names that acquire a global binding without being hoisted.
pub const GLOBAL_IDENTIFIERS: [&str; 3] = ["NaN", "undefined", "Infinity"];

/// Local name of the `export default <expression>` binding.
pub const DEFAULT_EXPORT_NAME: &str = "*default*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Module,
    Function,
    Local,
    Loop,
}

impl ScopeKind {
    pub fn is_variable_scope(self) -> bool {
        matches!(self, ScopeKind::Global | ScopeKind::Module | ScopeKind::Function)
    }

    pub fn is_lexical(self) -> bool {
        self.is_variable_scope() || self == ScopeKind::Loop
    }
}

// =============================================================================
// Declarations
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
    Function,
    Class,
    CatchParameter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleVarKind {
    NotModule,
    Imported,
    Exported,
}

/// A provisional declaration recorded during the first AST walk.
#[derive(Debug, Clone)]
pub struct Decl {
    pub name: String,
    pub node: NodeId,
    pub kind: DeclKind,
    pub module_kind: ModuleVarKind,
    /// Set for function and class *expressions*, which bind in their own scope.
    pub is_expression: bool,
}

impl Decl {
    pub fn new(name: impl Into<String>, node: NodeId, kind: DeclKind) -> Self {
        Self {
            name: name.into(),
            node,
            kind,
            module_kind: ModuleVarKind::NotModule,
            is_expression: false,
        }
    }

    pub fn with_module_kind(mut self, module_kind: ModuleVarKind) -> Self {
        self.module_kind = module_kind;
        self
    }
}

// =============================================================================
// Variables
// =============================================================================

/// Declaration kind of a bound variable. `None` marks a binding created
/// without any declarator, e.g. an assignment to an undeclared name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    None,
    Var,
    Let,
    Const,
    Function,
    Class,
}

impl VarKind {
    pub fn is_let_or_const(self) -> bool {
        matches!(self, VarKind::Let | VarKind::Const)
    }

    /// Kinds whose reads and writes are guarded by a hole check.
    pub fn has_temporal_dead_zone(self) -> bool {
        matches!(self, VarKind::Let | VarKind::Const | VarKind::Class)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    Uninitialized,
    Initialized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Resolved at runtime by name.
    Global,
    /// Lives in a register, or in a lexical slot once promoted.
    Local,
    /// Fixed module slot. `external` slots belong to imported bindings.
    Module { index: u32, external: bool },
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    pub storage: Storage,
    pub scope: ScopeId,
    /// Status at binding time; the generator tracks later initialization.
    pub initial_status: InitStatus,
    /// Slot in the owning environment once captured by a closure.
    pub lex_slot: Option<u32>,
    pub type_index: u32,
    /// Hidden parameters and pattern parameter placeholders.
    pub is_implicit: bool,
    pub is_parameter: bool,
}

impl Variable {
    pub fn is_lexical(&self) -> bool {
        self.lex_slot.is_some()
    }

    pub fn is_local(&self) -> bool {
        self.storage == Storage::Local
    }

    pub fn is_module(&self) -> bool {
        matches!(self.storage, Storage::Module { .. })
    }
}

// =============================================================================
// Scopes
// =============================================================================

/// Closure bookkeeping of a lexical scope.
#[derive(Debug, Clone, Default)]
pub struct LexicalEnv {
    pub needs_env: bool,
    /// Slot index -> captured variable name. The next free slot is `len()`.
    pub slot_names: Vec<String>,
}

impl LexicalEnv {
    pub fn slot_count(&self) -> u32 {
        u32_from_usize(self.slot_names.len())
    }
}

#[derive(Debug, Clone, Default)]
pub struct VariableScopeData {
    /// Hidden parameters first, then user parameters in declaration order.
    pub parameters: Vec<VariableId>,
    /// Hoisted var and function declarations, keyed by name.
    pub hoisted: IndexMap<String, Decl>,
    pub uses_arguments: bool,
    pub is_arrow: bool,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub node: NodeId,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    pub decls: Vec<Decl>,
    pub names: IndexMap<String, VariableId>,
    pub env: Option<LexicalEnv>,
    pub variable_scope: Option<VariableScopeData>,
}

impl Scope {
    pub fn get_decl(&self, name: &str) -> Option<&Decl> {
        self.decls.iter().find(|decl| decl.name == name)
    }

    pub fn needs_env(&self) -> bool {
        self.env.as_ref().is_some_and(|env| env.needs_env)
    }

    pub fn is_arrow_function(&self) -> bool {
        self.variable_scope.as_ref().is_some_and(|data| data.is_arrow)
    }
}

// =============================================================================
// ScopeTree
// =============================================================================

#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    variables: Vec<Variable>,
    node_scopes: FxHashMap<NodeId, ScopeId>,
}

impl ScopeTree {
    pub fn new(root_kind: ScopeKind, root_node: NodeId) -> Self {
        assert!(
            matches!(root_kind, ScopeKind::Global | ScopeKind::Module),
            "root scope must be global or module"
        );
        let mut tree = Self {
            scopes: Vec::new(),
            variables: Vec::new(),
            node_scopes: FxHashMap::default(),
        };
        tree.add_scope(root_kind, root_node, None);
        tree
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    pub fn variable(&self, id: VariableId) -> &Variable {
        &self.variables[id.0 as usize]
    }

    pub fn variable_mut(&mut self, id: VariableId) -> &mut Variable {
        &mut self.variables[id.0 as usize]
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    pub fn scope_ids(&self) -> impl Iterator<Item = ScopeId> + use<> {
        (0..u32_from_usize(self.scopes.len())).map(ScopeId)
    }

    pub fn variables(&self) -> impl Iterator<Item = (VariableId, &Variable)> {
        self.variables
            .iter()
            .enumerate()
            .map(|(index, variable)| (VariableId(u32_from_usize(index)), variable))
    }

    pub fn scope_of_node(&self, node: NodeId) -> Option<ScopeId> {
        self.node_scopes.get(&node).copied()
    }

    pub fn is_root(&self, id: ScopeId) -> bool {
        id == self.root()
    }

    /// Create a scope for `node` under `parent`.
    pub fn add_scope(&mut self, kind: ScopeKind, node: NodeId, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(u32_from_usize(self.scopes.len()));
        let variable_scope = kind.is_variable_scope().then(|| VariableScopeData {
            parent: parent.map(|parent| self.nearest_variable_scope(parent)),
            ..VariableScopeData::default()
        });
        if let Some(parent_variable_scope) = variable_scope.as_ref().and_then(|data| data.parent) {
            if let Some(data) = self.scope_mut(parent_variable_scope).variable_scope.as_mut() {
                data.children.push(id);
            }
        }
        self.scopes.push(Scope {
            kind,
            node,
            parent,
            children: Vec::new(),
            decls: Vec::new(),
            names: IndexMap::new(),
            env: kind.is_lexical().then(LexicalEnv::default),
            variable_scope,
        });
        if let Some(parent) = parent {
            self.scope_mut(parent).children.push(id);
        }
        self.node_scopes.insert(node, id);
        trace!(scope = id.0, ?kind, node = node.0, "created scope");
        id
    }

    /// Walk ancestor scopes starting from `start` (inclusive).
    pub fn ancestors(&self, start: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(start), move |&id| self.scope(id).parent)
    }

    pub fn nearest_variable_scope(&self, start: ScopeId) -> ScopeId {
        self.ancestors(start)
            .find(|&id| self.scope(id).kind.is_variable_scope())
            .unwrap_or(self.root())
    }

    pub fn nearest_lexical_scope(&self, start: ScopeId) -> ScopeId {
        self.ancestors(start)
            .find(|&id| self.scope(id).kind.is_lexical())
            .unwrap_or(self.root())
    }

    /// The nearest variable scope that is not an arrow function.
    pub fn nearest_non_arrow_variable_scope(&self, start: ScopeId) -> ScopeId {
        self.ancestors(start)
            .find(|&id| {
                let scope = self.scope(id);
                scope.kind.is_variable_scope() && !scope.is_arrow_function()
            })
            .unwrap_or(self.root())
    }

    pub fn variable_scope_data(&self, id: ScopeId) -> &VariableScopeData {
        self.scope(id)
            .variable_scope
            .as_ref()
            .expect("not a variable scope")
    }

    pub fn variable_scope_data_mut(&mut self, id: ScopeId) -> &mut VariableScopeData {
        self.scope_mut(id)
            .variable_scope
            .as_mut()
            .expect("not a variable scope")
    }

    // --- Declarations ---

    pub fn set_decl(&mut self, scope: ScopeId, decl: Decl) {
        self.scope_mut(scope).decls.push(decl);
    }

    /// Nearest scope (inclusive) whose declaration list names `name`.
    pub fn find_decl_pos(&self, start: ScopeId, name: &str) -> Option<ScopeId> {
        self.ancestors(start)
            .find(|&id| self.scope(id).get_decl(name).is_some())
    }

    /// Record a hoisted declaration. A function replaces a same-named entry;
    /// a var never replaces anything.
    pub fn set_hoisted(&mut self, scope: ScopeId, decl: Decl) {
        let hoisted = &mut self.variable_scope_data_mut(scope).hoisted;
        match hoisted.get(&decl.name) {
            Some(_) if decl.kind == DeclKind::Function => {
                hoisted.insert(decl.name.clone(), decl);
            }
            Some(_) => {}
            None => {
                hoisted.insert(decl.name.clone(), decl);
            }
        }
    }

    // --- Variables ---

    pub fn find_local(&self, scope: ScopeId, name: &str) -> Option<VariableId> {
        self.scope(scope).names.get(name).copied()
    }

    /// Bind `name` in `scope`, applying the storage rules of the scope kind.
    ///
    /// Binding the same name twice in one scope returns the existing variable.
    pub fn add(
        &mut self,
        scope: ScopeId,
        name: &str,
        kind: VarKind,
        module_kind: ModuleVarKind,
    ) -> VariableId {
        let scope_kind = self.scope(scope).kind;
        let storage = match scope_kind {
            ScopeKind::Global => match kind {
                VarKind::Var | VarKind::Function | VarKind::None => Storage::Global,
                _ => Storage::Local,
            },
            ScopeKind::Module => {
                if module_kind != ModuleVarKind::NotModule {
                    Storage::Module {
                        index: 0,
                        external: module_kind == ModuleVarKind::Imported,
                    }
                } else if kind == VarKind::None {
                    Storage::Global
                } else {
                    Storage::Local
                }
            }
            ScopeKind::Function | ScopeKind::Local | ScopeKind::Loop => {
                if kind == VarKind::None {
                    let root = self.root();
                    return self.add(root, name, kind, ModuleVarKind::NotModule);
                }
                if kind == VarKind::Var && !scope_kind.is_variable_scope() {
                    let variable_scope = self.nearest_variable_scope(scope);
                    return self.add(variable_scope, name, kind, module_kind);
                }
                Storage::Local
            }
        };

        if let Some(existing) = self.find_local(scope, name) {
            return existing;
        }

        let initial_status = if kind.has_temporal_dead_zone() {
            InitStatus::Uninitialized
        } else {
            InitStatus::Initialized
        };
        self.push_variable(
            scope,
            Variable {
                name: name.to_string(),
                kind,
                storage,
                scope,
                initial_status,
                lex_slot: None,
                type_index: crate::ast::ANY_TYPE,
                is_implicit: false,
                is_parameter: false,
            },
        )
    }

    /// Append a parameter to a variable scope. Hidden parameters of arrow
    /// functions are kept in the parameter list without being visible by name.
    pub fn add_parameter(
        &mut self,
        scope: ScopeId,
        name: &str,
        kind: VarKind,
        is_implicit: bool,
        visible: bool,
    ) -> VariableId {
        let variable = Variable {
            name: name.to_string(),
            kind,
            storage: Storage::Local,
            scope,
            initial_status: InitStatus::Initialized,
            lex_slot: None,
            type_index: crate::ast::ANY_TYPE,
            is_implicit,
            is_parameter: true,
        };
        let id = if visible {
            self.push_variable(scope, variable)
        } else {
            let id = VariableId(u32_from_usize(self.variables.len()));
            self.variables.push(variable);
            id
        };
        self.variable_scope_data_mut(scope).parameters.push(id);
        id
    }

    fn push_variable(&mut self, scope: ScopeId, variable: Variable) -> VariableId {
        let id = VariableId(u32_from_usize(self.variables.len()));
        let name = variable.name.clone();
        self.variables.push(variable);
        // A later parameter with a duplicate name shadows the earlier one.
        self.scope_mut(scope).names.insert(name, id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> ScopeTree {
        ScopeTree::new(ScopeKind::Global, NodeId(0))
    }

    #[test]
    fn variable_scope_links_skip_block_scopes() {
        let mut tree = tree();
        let root = tree.root();
        let function = tree.add_scope(ScopeKind::Function, NodeId(1), Some(root));
        let block = tree.add_scope(ScopeKind::Local, NodeId(2), Some(function));
        let inner = tree.add_scope(ScopeKind::Function, NodeId(3), Some(block));

        assert_eq!(tree.variable_scope_data(inner).parent, Some(function));
        assert_eq!(tree.variable_scope_data(function).children, vec![inner]);
        assert_eq!(tree.nearest_variable_scope(block), function);
        assert_eq!(tree.scope_of_node(NodeId(2)), Some(block));
    }

    #[test]
    fn global_scope_storage_depends_on_kind() {
        let mut tree = tree();
        let root = tree.root();
        let var = tree.add(root, "a", VarKind::Var, ModuleVarKind::NotModule);
        let let_binding = tree.add(root, "b", VarKind::Let, ModuleVarKind::NotModule);

        assert_eq!(tree.variable(var).storage, Storage::Global);
        assert_eq!(tree.variable(let_binding).storage, Storage::Local);
        assert_eq!(tree.variable(let_binding).initial_status, InitStatus::Uninitialized);
    }

    #[test]
    fn block_var_delegates_to_variable_scope() {
        let mut tree = tree();
        let root = tree.root();
        let function = tree.add_scope(ScopeKind::Function, NodeId(1), Some(root));
        let block = tree.add_scope(ScopeKind::Local, NodeId(2), Some(function));

        let id = tree.add(block, "x", VarKind::Var, ModuleVarKind::NotModule);
        assert_eq!(tree.variable(id).scope, function);
        assert_eq!(tree.find_local(block, "x"), None);

        let undeclared = tree.add(block, "y", VarKind::None, ModuleVarKind::NotModule);
        assert_eq!(tree.variable(undeclared).scope, root);
        assert_eq!(tree.variable(undeclared).storage, Storage::Global);
    }

    #[test]
    fn adding_a_name_twice_returns_the_same_variable() {
        let mut tree = tree();
        let root = tree.root();
        let function = tree.add_scope(ScopeKind::Function, NodeId(1), Some(root));
        let first = tree.add(function, "x", VarKind::Function, ModuleVarKind::NotModule);
        let second = tree.add(function, "x", VarKind::Var, ModuleVarKind::NotModule);
        assert_eq!(first, second);
        assert_eq!(tree.variable(first).kind, VarKind::Function);
    }

    #[test]
    fn hoisted_functions_replace_vars() {
        let mut tree = tree();
        let root = tree.root();
        tree.set_hoisted(root, Decl::new("x", NodeId(5), DeclKind::Var));
        tree.set_hoisted(root, Decl::new("x", NodeId(6), DeclKind::Function));
        tree.set_hoisted(root, Decl::new("x", NodeId(7), DeclKind::Var));

        let hoisted = &tree.variable_scope_data(root).hoisted;
        assert_eq!(hoisted.len(), 1);
        assert_eq!(hoisted["x"].kind, DeclKind::Function);
        assert_eq!(hoisted["x"].node, NodeId(6));
    }
}
