/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

//! Lexical and closure resolution.
//!
//! Resolution runs in two steps:
//!
//! 1. `resolve_references` walks the recorder's reference list once, in
//!    traversal order. Every reference that crosses a function boundary
//!    promotes its variable to a slot in the environment of the variable's
//!    nearest lexical scope, which marks that scope as needing an
//!    environment.
//! 2. The code generator calls `resolve` for each access. It never promotes;
//!    it computes the access level from the final `needs_env` flags.
//!
//! Levels are therefore never cached from the first step. A level depends on
//! which scopes between the reference and the variable ended up creating an
//! environment, and a later promotion can change that.

use tracing::debug;

use crate::error::{CompileError, Result};
use crate::scope::{ModuleVarKind, ScopeId, ScopeKind, ScopeTree, Storage, VarKind, VariableId};

/// One identifier use, recorded in the scope it is resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub scope: ScopeId,
    pub name: String,
    pub is_assignment: bool,
}

/// How an access reaches its variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// No binding on the scope chain; accessed by name.
    Unresolved,
    /// A global binding, accessed by name.
    Global(VariableId),
    /// A top-level `let`, `const` or `class` of a script, which lives in the
    /// global lexical record and is accessed by name.
    GlobalRecord(VariableId),
    Module(VariableId),
    /// A register of the current function.
    Register(VariableId),
    /// A slot `level` environments up from the current one.
    Lexical {
        variable: VariableId,
        level: u32,
        slot: u32,
    },
}

impl Resolution {
    pub fn variable(self) -> Option<VariableId> {
        match self {
            Resolution::Unresolved => None,
            Resolution::Global(variable)
            | Resolution::GlobalRecord(variable)
            | Resolution::Module(variable)
            | Resolution::Register(variable)
            | Resolution::Lexical { variable, .. } => Some(variable),
        }
    }
}

pub struct Resolver<'a> {
    tree: &'a mut ScopeTree,
    commonjs: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(tree: &'a mut ScopeTree, commonjs: bool) -> Self {
        Self { tree, commonjs }
    }

    /// Walk `references` in order, promoting every captured variable.
    pub fn resolve_references(&mut self, references: &[Reference]) {
        for reference in references {
            match find(self.tree, reference.scope, &reference.name) {
                Some((variable, crosses_function)) => {
                    if crosses_function && is_promotable(self.tree, variable, self.commonjs) {
                        self.promote(variable);
                    }
                }
                None if reference.is_assignment => {
                    // An assignment to an undeclared name creates a global.
                    let root = self.tree.root();
                    self.tree.add(root, &reference.name, VarKind::None, ModuleVarKind::NotModule);
                }
                None => {}
            }
        }
    }

    /// Assign `variable` a slot in its nearest lexical scope. Promoting a
    /// variable twice returns the slot it already has.
    pub fn promote(&mut self, variable: VariableId) -> u32 {
        if let Some(slot) = self.tree.variable(variable).lex_slot {
            return slot;
        }
        let owner = self.tree.nearest_lexical_scope(self.tree.variable(variable).scope);
        let name = self.tree.variable(variable).name.clone();
        let env = self
            .tree
            .scope_mut(owner)
            .env
            .get_or_insert_with(Default::default);
        let slot = env.slot_count();
        env.slot_names.push(name.clone());
        env.needs_env = true;
        self.tree.variable_mut(variable).lex_slot = Some(slot);
        debug!(name = %name, slot, scope = owner.0, "promoted variable to lexical slot");
        slot
    }
}

/// Find `name` starting at `from`. The flag tells whether the walk left a
/// function scope before finding it.
pub fn find(tree: &ScopeTree, from: ScopeId, name: &str) -> Option<(VariableId, bool)> {
    let mut crosses_function = false;
    for scope in tree.ancestors(from) {
        if let Some(variable) = tree.find_local(scope, name) {
            return Some((variable, crosses_function));
        }
        if tree.scope(scope).kind == ScopeKind::Function {
            crosses_function = true;
        }
    }
    None
}

/// A script's top-level lexical declarations live in the global record.
pub fn is_global_record_binding(tree: &ScopeTree, variable: VariableId, commonjs: bool) -> bool {
    let variable = tree.variable(variable);
    tree.is_root(variable.scope)
        && tree.scope(variable.scope).kind == ScopeKind::Global
        && !commonjs
        && !variable.is_parameter
        && matches!(variable.kind, VarKind::Let | VarKind::Const | VarKind::Class)
}

fn is_promotable(tree: &ScopeTree, variable: VariableId, commonjs: bool) -> bool {
    tree.variable(variable).storage == Storage::Local && !is_global_record_binding(tree, variable, commonjs)
}

/// Number of live environments between `from` and the environment that
/// holds `variable`'s slot.
pub fn level(tree: &ScopeTree, from: ScopeId, variable: VariableId) -> u32 {
    let owner = tree.nearest_lexical_scope(tree.variable(variable).scope);
    let count = tree
        .ancestors(from)
        .take_while(|&scope| scope != owner)
        .filter(|&scope| {
            let scope = tree.scope(scope);
            scope.kind.is_lexical() && scope.needs_env()
        })
        .count();
    crate::u32_from_usize(count)
}

/// Resolve an access during code generation.
///
/// Fails if the access captures a local variable that was never promoted,
/// which means the reference list and the code generator disagree.
pub fn resolve(tree: &ScopeTree, from: ScopeId, name: &str, commonjs: bool) -> Result<Resolution> {
    let Some((variable, crosses_function)) = find(tree, from, name) else {
        return Ok(Resolution::Unresolved);
    };
    let resolution = match tree.variable(variable).storage {
        Storage::Global => Resolution::Global(variable),
        Storage::Module { .. } => Resolution::Module(variable),
        Storage::Local if is_global_record_binding(tree, variable, commonjs) => Resolution::GlobalRecord(variable),
        Storage::Local => match tree.variable(variable).lex_slot {
            Some(slot) => Resolution::Lexical {
                variable,
                level: level(tree, from, variable),
                slot,
            },
            None if crosses_function => {
                return Err(CompileError::internal(format!(
                    "'{name}' is captured from scope {} but was never promoted",
                    from.0
                )));
            }
            None => Resolution::Register(variable),
        },
    };
    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeId;

    struct Fixture {
        tree: ScopeTree,
        function: ScopeId,
        inner: ScopeId,
        x: VariableId,
    }

    /// `function f() { let x; function g() { x } }`
    fn fixture() -> Fixture {
        let mut tree = ScopeTree::new(ScopeKind::Global, NodeId(0));
        let root = tree.root();
        let function = tree.add_scope(ScopeKind::Function, NodeId(1), Some(root));
        let body = tree.add_scope(ScopeKind::Local, NodeId(2), Some(function));
        let inner = tree.add_scope(ScopeKind::Function, NodeId(3), Some(body));
        let x = tree.add(body, "x", VarKind::Let, ModuleVarKind::NotModule);
        Fixture {
            tree,
            function,
            inner,
            x,
        }
    }

    fn reference(scope: ScopeId, name: &str) -> Reference {
        Reference {
            scope,
            name: name.to_string(),
            is_assignment: false,
        }
    }

    #[test]
    fn captured_variables_are_promoted_once() {
        let mut f = fixture();
        let references = vec![reference(f.inner, "x"), reference(f.inner, "x")];
        Resolver::new(&mut f.tree, false).resolve_references(&references);

        assert_eq!(f.tree.variable(f.x).lex_slot, Some(0));
        let env = f.tree.scope(f.function).env.as_ref().unwrap();
        assert!(env.needs_env);
        assert_eq!(env.slot_names, vec!["x".to_string()]);

        let slot = Resolver::new(&mut f.tree, false).promote(f.x);
        assert_eq!(slot, 0);
        assert_eq!(f.tree.scope(f.function).env.as_ref().unwrap().slot_count(), 1);
    }

    #[test]
    fn same_function_references_use_registers() {
        let mut f = fixture();
        let body = f.tree.scope(f.function).children[0];
        Resolver::new(&mut f.tree, false).resolve_references(&[reference(body, "x")]);
        assert_eq!(f.tree.variable(f.x).lex_slot, None);
        assert_eq!(resolve(&f.tree, body, "x", false).unwrap(), Resolution::Register(f.x));
    }

    #[test]
    fn levels_skip_scopes_without_an_environment() {
        let mut f = fixture();
        Resolver::new(&mut f.tree, false).resolve_references(&[reference(f.inner, "x")]);

        // `g` has no environment of its own, so `x` lives in the current one.
        assert_eq!(
            resolve(&f.tree, f.inner, "x", false).unwrap(),
            Resolution::Lexical {
                variable: f.x,
                level: 0,
                slot: 0
            }
        );

        // Once `g` needs its own environment the same access is one level up.
        let y = f.tree.add(f.inner, "y", VarKind::Let, ModuleVarKind::NotModule);
        Resolver::new(&mut f.tree, false).promote(y);
        assert_eq!(
            resolve(&f.tree, f.inner, "x", false).unwrap(),
            Resolution::Lexical {
                variable: f.x,
                level: 1,
                slot: 0
            }
        );
    }

    #[test]
    fn top_level_script_lets_stay_in_the_global_record() {
        let mut tree = ScopeTree::new(ScopeKind::Global, NodeId(0));
        let root = tree.root();
        let function = tree.add_scope(ScopeKind::Function, NodeId(1), Some(root));
        let a = tree.add(root, "a", VarKind::Let, ModuleVarKind::NotModule);

        Resolver::new(&mut tree, false).resolve_references(&[reference(function, "a")]);
        assert_eq!(tree.variable(a).lex_slot, None);
        assert_eq!(resolve(&tree, function, "a", false).unwrap(), Resolution::GlobalRecord(a));

        Resolver::new(&mut tree, true).resolve_references(&[reference(function, "a")]);
        assert_eq!(tree.variable(a).lex_slot, Some(0));
    }

    #[test]
    fn undeclared_assignments_create_globals() {
        let mut f = fixture();
        let references = vec![
            Reference {
                scope: f.inner,
                name: "z".to_string(),
                is_assignment: true,
            },
            reference(f.inner, "w"),
        ];
        Resolver::new(&mut f.tree, false).resolve_references(&references);

        let root = f.tree.root();
        let z = f.tree.find_local(root, "z").unwrap();
        assert_eq!(f.tree.variable(z).storage, Storage::Global);
        assert!(f.tree.find_local(root, "w").is_none());
        assert_eq!(resolve(&f.tree, f.inner, "w", false).unwrap(), Resolution::Unresolved);
    }

    #[test]
    fn unpromoted_captures_are_internal_errors() {
        let f = fixture();
        let error = resolve(&f.tree, f.inner, "x", false).unwrap_err();
        assert!(matches!(error, CompileError::Internal { .. }));
    }
}
