//! Per-document import priority construction.
//!
//! The priority list is the authoritative visibility ranking used by the
//! resolver: document `D` is 0, every other document reachable through a
//! chain of *non-monikered* imports gets the next integer in depth-first,
//! declaration-order discovery order. Monikered imports contribute their
//! alias to the moniker map but are never inlined into the priority list —
//! a cyclic import graph is handled by the same "first seen wins" visited
//! check that makes the depth-first walk terminate.

use crate::documents::Import;
use crate::types::DocumentId;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ImportPriorities {
    priority_list: HashMap<DocumentId, u32>,
    moniker_map: HashMap<Arc<str>, DocumentId>,
}

impl ImportPriorities {
    pub fn priority_of(&self, document: DocumentId) -> Option<u32> {
        self.priority_list.get(&document).copied()
    }

    pub fn contains(&self, document: DocumentId) -> bool {
        self.priority_list.contains_key(&document)
    }

    pub fn moniker(&self, moniker: &str) -> Option<DocumentId> {
        self.moniker_map.get(moniker).copied()
    }

    /// The document with the smallest priority integer among `candidates`,
    /// i.e. the highest-visibility definition. Returns
    /// `None` if none of `candidates` is reachable from this document.
    pub fn best_of<'a>(&self, candidates: impl IntoIterator<Item = &'a DocumentId>) -> Option<DocumentId> {
        candidates
            .into_iter()
            .filter_map(|&doc| self.priority_of(doc).map(|p| (doc, p)))
            .min_by_key(|&(_, p)| p)
            .map(|(doc, _)| doc)
    }

    #[cfg(test)]
    pub fn priority_list_len(&self) -> usize {
        self.priority_list.len()
    }
}

/// Build the priority list and moniker map for a document whose `imports`
/// are given in declaration order. `resolve_path` maps a corpus-path string
/// (as written in an `Import`) to the `DocumentId` of the already-loaded
/// document it names. `imports_of` returns another document's own imports,
/// in declaration order, to support the transitive non-monikered expansion.
pub fn build_import_priorities(
    self_id: DocumentId,
    self_imports: &[Import],
    resolve_path: &mut dyn FnMut(&str) -> Option<DocumentId>,
    imports_of: &mut dyn FnMut(DocumentId) -> Vec<Import>,
) -> ImportPriorities {
    let mut priorities = ImportPriorities::default();
    priorities.priority_list.insert(self_id, 0);

    // Sweep 1: monikered imports contribute their alias; first writer wins.
    for import in self_imports {
        if let Some(moniker) = &import.moniker {
            if !priorities.moniker_map.contains_key(moniker.as_ref()) {
                if let Some(doc_id) = resolve_path(&import.corpus_path) {
                    priorities.moniker_map.insert(Arc::clone(moniker), doc_id);
                }
            }
        }
    }

    // Sweep 2: non-monikered imports expand depth-first in declaration order.
    let mut next = 1u32;
    for import in self_imports {
        if import.moniker.is_some() {
            continue;
        }
        if let Some(doc_id) = resolve_path(&import.corpus_path) {
            expand(doc_id, &mut next, &mut priorities.priority_list, resolve_path, imports_of);
        }
    }

    priorities
}

fn expand(
    doc_id: DocumentId,
    next: &mut u32,
    priority_list: &mut HashMap<DocumentId, u32>,
    resolve_path: &mut dyn FnMut(&str) -> Option<DocumentId>,
    imports_of: &mut dyn FnMut(DocumentId) -> Vec<Import>,
) {
    if priority_list.contains_key(&doc_id) {
        return;
    }
    priority_list.insert(doc_id, *next);
    *next += 1;

    for import in imports_of(doc_id) {
        // Monikered sub-imports are collapsed: the moniker stays local to
        // `doc_id` and the imported document is never inlined here.
        if import.moniker.is_some() {
            continue;
        }
        if let Some(sub_id) = resolve_path(&import.corpus_path) {
            expand(sub_id, next, priority_list, resolve_path, imports_of);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::Import;

    fn id(n: u32) -> DocumentId {
        DocumentId::new(n).unwrap()
    }

    #[test]
    fn self_is_zero() {
        let priorities = build_import_priorities(
            id(1),
            &[],
            &mut |_| None,
            &mut |_| Vec::new(),
        );
        assert_eq!(priorities.priority_of(id(1)), Some(0));
    }

    #[test]
    fn monikered_import_not_inlined() {
        // Doc 1 imports doc 2 under moniker "m". Doc 2 is reachable only
        // through the moniker, not through the priority list.
        let self_imports = vec![Import::new("ns:/b.cdm.json").with_moniker("m")];
        let paths: HashMap<&str, DocumentId> = HashMap::from([("ns:/b.cdm.json", id(2))]);
        let priorities = build_import_priorities(
            id(1),
            &self_imports,
            &mut |p| paths.get(p).copied(),
            &mut |_| Vec::new(),
        );
        assert_eq!(priorities.moniker("m"), Some(id(2)));
        assert!(!priorities.contains(id(2)));
        assert_eq!(priorities.priority_list_len(), 1);
    }

    #[test]
    fn non_monikered_imports_assigned_in_declaration_order() {
        // Doc 1 imports doc 2 then doc 3, neither monikered.
        let self_imports = vec![Import::new("ns:/b.cdm.json"), Import::new("ns:/c.cdm.json")];
        let paths: HashMap<&str, DocumentId> =
            HashMap::from([("ns:/b.cdm.json", id(2)), ("ns:/c.cdm.json", id(3))]);
        let priorities = build_import_priorities(
            id(1),
            &self_imports,
            &mut |p| paths.get(p).copied(),
            &mut |_| Vec::new(),
        );
        assert_eq!(priorities.priority_of(id(1)), Some(0));
        assert_eq!(priorities.priority_of(id(2)), Some(1));
        assert_eq!(priorities.priority_of(id(3)), Some(2));
    }

    #[test]
    fn monikered_sub_import_is_collapsed_and_not_inlined() {
        // Doc 1 imports doc 2 (non-monikered). Doc 2 imports doc 3 under
        // moniker "sub". Doc 3 must not appear in doc 1's priority list, and
        // "sub" must not appear in doc 1's moniker map.
        let self_imports = vec![Import::new("ns:/b.cdm.json")];
        let paths: HashMap<&str, DocumentId> =
            HashMap::from([("ns:/b.cdm.json", id(2)), ("ns:/c.cdm.json", id(3))]);
        let doc2_imports = vec![Import::new("ns:/c.cdm.json").with_moniker("sub")];
        let priorities = build_import_priorities(
            id(1),
            &self_imports,
            &mut |p| paths.get(p).copied(),
            &mut |doc| {
                if doc == id(2) {
                    doc2_imports.clone()
                } else {
                    Vec::new()
                }
            },
        );
        assert!(priorities.contains(id(2)));
        assert!(!priorities.contains(id(3)));
        assert_eq!(priorities.moniker("sub"), None);
    }

    #[test]
    fn cyclic_imports_terminate() {
        // Doc 1 imports doc 2, doc 2 imports doc 1 back.
        let self_imports = vec![Import::new("ns:/b.cdm.json")];
        let paths: HashMap<&str, DocumentId> =
            HashMap::from([("ns:/a.cdm.json", id(1)), ("ns:/b.cdm.json", id(2))]);
        let doc2_imports = vec![Import::new("ns:/a.cdm.json")];
        let priorities = build_import_priorities(
            id(1),
            &self_imports,
            &mut |p| paths.get(p).copied(),
            &mut |doc| {
                if doc == id(2) {
                    doc2_imports.clone()
                } else {
                    Vec::new()
                }
            },
        );
        assert_eq!(priorities.priority_of(id(1)), Some(0));
        assert_eq!(priorities.priority_of(id(2)), Some(1));
    }
}
