/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

//! ECMAScript module record tables.
//!
//! Filled by the recorder while it walks import and export declarations.
//! Module variable slots are derived from these tables: an exported local
//! binding uses the index of its local name among the local exports, and an
//! imported binding uses its index among the regular imports.

use indexmap::IndexSet;
use serde::Serialize;

use crate::u32_from_usize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegularImportEntry {
    pub local_name: String,
    pub import_name: String,
    pub module_request: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceImportEntry {
    pub local_name: String,
    pub module_request: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalExportEntry {
    pub local_name: String,
    pub export_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndirectExportEntry {
    pub export_name: String,
    pub import_name: String,
    pub module_request: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRecord {
    pub module_requests: IndexSet<String>,
    pub regular_imports: Vec<RegularImportEntry>,
    pub namespace_imports: Vec<NamespaceImportEntry>,
    pub local_exports: Vec<LocalExportEntry>,
    pub indirect_exports: Vec<IndirectExportEntry>,
    pub star_exports: Vec<u32>,
}

impl ModuleRecord {
    pub fn add_module_request(&mut self, request: &str) -> u32 {
        let (index, _) = self.module_requests.insert_full(request.to_string());
        u32_from_usize(index)
    }

    pub fn add_regular_import(&mut self, local_name: &str, import_name: &str, request: &str) {
        let module_request = self.add_module_request(request);
        self.regular_imports.push(RegularImportEntry {
            local_name: local_name.to_string(),
            import_name: import_name.to_string(),
            module_request,
        });
    }

    pub fn add_namespace_import(&mut self, local_name: &str, request: &str) {
        let module_request = self.add_module_request(request);
        self.namespace_imports.push(NamespaceImportEntry {
            local_name: local_name.to_string(),
            module_request,
        });
    }

    pub fn add_local_export(&mut self, local_name: &str, export_name: &str) {
        self.local_exports.push(LocalExportEntry {
            local_name: local_name.to_string(),
            export_name: export_name.to_string(),
        });
    }

    pub fn add_indirect_export(&mut self, export_name: &str, import_name: &str, request: &str) {
        let module_request = self.add_module_request(request);
        self.indirect_exports.push(IndirectExportEntry {
            export_name: export_name.to_string(),
            import_name: import_name.to_string(),
            module_request,
        });
    }

    pub fn add_star_export(&mut self, request: &str) {
        let module_request = self.add_module_request(request);
        self.star_exports.push(module_request);
    }

    pub fn regular_import(&self, local_name: &str) -> Option<&RegularImportEntry> {
        self.regular_imports
            .iter()
            .find(|entry| entry.local_name == local_name)
    }

    pub fn is_namespace_import(&self, local_name: &str) -> bool {
        self.namespace_imports
            .iter()
            .any(|entry| entry.local_name == local_name)
    }

    /// `export {x as y}` where `x` is an imported binding re-exports the
    /// import instead of a local slot.
    pub fn add_export_of_local_name(&mut self, local_name: &str, export_name: &str) {
        if let Some(entry) = self.regular_import(local_name).cloned() {
            let request = self.module_requests[entry.module_request as usize].clone();
            self.add_indirect_export(export_name, &entry.import_name, &request);
        } else {
            self.add_local_export(local_name, export_name);
        }
    }

    /// Module slot of an exported local binding.
    pub fn local_export_index(&self, local_name: &str) -> Option<u32> {
        let mut seen = IndexSet::new();
        for entry in &self.local_exports {
            seen.insert(entry.local_name.as_str());
        }
        seen.get_index_of(local_name).map(u32_from_usize)
    }

    /// Module slot of an imported binding.
    pub fn regular_import_index(&self, local_name: &str) -> Option<u32> {
        self.regular_imports
            .iter()
            .position(|entry| entry.local_name == local_name)
            .map(u32_from_usize)
    }

    pub fn is_exported(&self, local_name: &str) -> bool {
        self.local_exports
            .iter()
            .any(|entry| entry.local_name == local_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_requests_are_deduplicated() {
        let mut record = ModuleRecord::default();
        record.add_regular_import("a", "a", "./m");
        record.add_namespace_import("ns", "./m");
        record.add_star_export("./n");
        assert_eq!(record.module_requests.len(), 2);
        assert_eq!(record.namespace_imports[0].module_request, 0);
        assert_eq!(record.star_exports, vec![1]);
    }

    #[test]
    fn local_export_slots_follow_unique_local_names() {
        let mut record = ModuleRecord::default();
        record.add_local_export("a", "a");
        record.add_local_export("a", "alias");
        record.add_local_export("b", "b");
        assert_eq!(record.local_export_index("a"), Some(0));
        assert_eq!(record.local_export_index("b"), Some(1));
        assert_eq!(record.local_export_index("c"), None);
    }

    #[test]
    fn exporting_an_import_becomes_an_indirect_export() {
        let mut record = ModuleRecord::default();
        record.add_regular_import("x", "y", "./m");
        record.add_export_of_local_name("x", "z");
        assert!(record.local_exports.is_empty());
        assert_eq!(
            record.indirect_exports,
            vec![IndirectExportEntry {
                export_name: "z".into(),
                import_name: "y".into(),
                module_request: 0,
            }]
        );
    }

    #[test]
    fn module_requests_serialize_in_insertion_order() {
        let mut record = ModuleRecord::default();
        record.add_star_export("./b");
        record.add_namespace_import("ns", "./a");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["moduleRequests"], serde_json::json!(["./b", "./a"]));
        assert_eq!(json["starExports"], serde_json::json!([0]));
    }
}
