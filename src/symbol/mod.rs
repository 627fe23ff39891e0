//! The process-level symbol table: name → documents that declare it, plus
//! per-object dependency symbol sets used to shape cache keys.

use crate::types::DocumentId;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

/// `name -> [documents declaring name]`, updated during declaration and
/// pruned on document removal.
#[derive(Default)]
pub struct SymbolTable {
    entries: DashMap<Arc<str>, Vec<DocumentId>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<Arc<str>>, document: DocumentId) {
        let name = name.into();
        let mut docs = self.entries.entry(name).or_default();
        if !docs.contains(&document) {
            docs.push(document);
        }
    }

    /// Remove every registration for `document`, dropping symbols whose last
    /// declarer was `document`.
    pub fn remove_document(&self, document: DocumentId) {
        self.entries.retain(|_, docs| {
            docs.retain(|&d| d != document);
            !docs.is_empty()
        });
    }

    pub fn defining_documents(&self, name: &str) -> Vec<DocumentId> {
        self.entries
            .get(name)
            .map(|docs| docs.clone())
            .unwrap_or_default()
    }

    pub fn declares(&self, name: &str, document: DocumentId) -> bool {
        self.entries
            .get(name)
            .is_some_and(|docs| docs.contains(&document))
    }
}

/// The set of symbol names whose definition could change a given resolution
/// (one per (definition, kind-of-resolution) pair).
#[derive(Debug, Clone, Default)]
pub struct DependencySet {
    symbols: HashSet<Arc<str>>,
}

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the set with the object's own declared name: the first time an
    /// object is seen, its dependency set is seeded with its own declared
    /// name.
    pub fn seeded(own_name: impl Into<Arc<str>>) -> Self {
        let mut set = Self::new();
        set.add(own_name);
        set
    }

    pub fn add(&mut self, symbol: impl Into<Arc<str>>) {
        self.symbols.insert(symbol.into());
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.symbols.iter().map(|s| s.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentId;

    #[test]
    fn register_and_lookup() {
        let table = SymbolTable::new();
        let doc = DocumentId::new(1).unwrap();
        table.register("Foo", doc);
        assert_eq!(table.defining_documents("Foo"), vec![doc]);
        assert!(table.declares("Foo", doc));
    }

    #[test]
    fn remove_document_prunes_symbol() {
        let table = SymbolTable::new();
        let doc = DocumentId::new(1).unwrap();
        table.register("Foo", doc);
        table.remove_document(doc);
        assert!(table.defining_documents("Foo").is_empty());
    }

    #[test]
    fn dependency_set_seeds_own_name() {
        let deps = DependencySet::seeded("Foo");
        assert!(!deps.is_empty());
        assert_eq!(deps.iter().collect::<Vec<_>>(), vec!["Foo"]);
    }
}
