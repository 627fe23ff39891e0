//! The symbolic-name resolver: moniker-aware, priority-ranked, with a
//! deliberate wrt-doc moniker fallback (see the design note below).

use crate::documents::DocumentLibrary;
use crate::error::{CdmError, CdmResult};
use crate::path::split_moniker;
use crate::symbol::{DependencySet, SymbolTable};
use crate::types::{DefinitionId, DocumentId, ObjectType};

/// Per-call resolution context: which document's imports make the lookup
/// visible, and the running dependency set to record symbols consulted.
pub struct ResolutionOptions<'a> {
    pub wrt_doc: DocumentId,
    pub symbol_ref_set: &'a mut DependencySet,
}

impl<'a> ResolutionOptions<'a> {
    pub fn new(wrt_doc: DocumentId, symbol_ref_set: &'a mut DependencySet) -> Self {
        Self {
            wrt_doc,
            symbol_ref_set,
        }
    }
}

/// Anything the resolver needs to know about a resolved definition to apply
/// the type gate. The indexing pipeline hands the
/// resolver something satisfying this so the resolver stays independent of
/// `DefinitionStore`'s storage details.
pub trait DefinitionLookup {
    fn object_type_of(&self, id: DefinitionId) -> Option<ObjectType>;
}

pub struct Resolver<'a> {
    symbol_table: &'a SymbolTable,
    documents: &'a DocumentLibrary,
    definitions: &'a dyn DefinitionLookup,
}

impl<'a> Resolver<'a> {
    pub fn new(
        symbol_table: &'a SymbolTable,
        documents: &'a DocumentLibrary,
        definitions: &'a dyn DefinitionLookup,
    ) -> Self {
        Self {
            symbol_table,
            documents,
            definitions,
        }
    }

    /// Resolve `symbol` with respect to `options.wrt_doc`, optionally
    /// anchored at `from_doc`, constrained to `expected_type`. `retry`
    /// controls the "move from-doc down one level" re-entry described in
    /// the "move from-doc down one level" re-entry.
    pub fn resolve(
        &self,
        symbol: &str,
        from_doc: Option<DocumentId>,
        expected_type: ObjectType,
        retry: bool,
        options: &mut ResolutionOptions<'_>,
    ) -> CdmResult<DefinitionId> {
        self.resolve_inner(symbol, from_doc, expected_type, retry, options, 0)
    }

    fn resolve_inner(
        &self,
        symbol: &str,
        from_doc: Option<DocumentId>,
        expected_type: ObjectType,
        retry: bool,
        options: &mut ResolutionOptions<'_>,
        moniker_depth: u32,
    ) -> CdmResult<DefinitionId> {
        if let Some((prefix, rest)) = split_moniker(symbol) {
            return self.resolve_moniker(
                prefix,
                rest,
                from_doc,
                expected_type,
                retry,
                options,
                moniker_depth,
            );
        }
        self.resolve_plain(symbol, expected_type, retry, options)
    }

    /// Moniker split: `prefix/rest`, checking from-doc's moniker map first,
    /// then wrt-doc's.
    fn resolve_moniker(
        &self,
        prefix: &str,
        rest: &str,
        from_doc: Option<DocumentId>,
        expected_type: ObjectType,
        retry: bool,
        options: &mut ResolutionOptions<'_>,
        moniker_depth: u32,
    ) -> CdmResult<DefinitionId> {
        let from_priorities = from_doc.and_then(|d| self.documents.import_priorities(d));
        let wrt_priorities = self.documents.import_priorities(options.wrt_doc);

        let moniker_doc = from_priorities
            .as_ref()
            .and_then(|p| p.moniker(prefix))
            .or_else(|| wrt_priorities.as_ref().and_then(|p| p.moniker(prefix)));

        let Some(moniker_doc) = moniker_doc else {
            return Err(CdmError::MonikerNotFound {
                moniker: prefix.to_string(),
                doc: from_doc.map(|d| d.to_string()).unwrap_or_default(),
            });
        };

        // Drill through chained monikers (`a/b/c`) by recursing with the
        // moniker's document as the new from-doc.
        match self.resolve_inner(rest, Some(moniker_doc), expected_type, retry, options, moniker_depth + 1) {
            Ok(id) => Ok(id),
            Err(CdmError::UnresolvedSymbol { .. }) if from_doc.is_some() && moniker_depth == 0 => {
                // "Move wrt down one level": if the chain starting from
                // from-doc's moniker dead-ends, restart once using the
                // moniker's document as both from-doc and wrt-doc. Accepted
                // as an intentional fallback, not a bug.
                let saved_wrt = options.wrt_doc;
                options.wrt_doc = moniker_doc;
                let result = self.resolve_inner(
                    rest,
                    Some(moniker_doc),
                    expected_type,
                    retry,
                    options,
                    moniker_depth + 1,
                );
                options.wrt_doc = saved_wrt;
                result
            }
            Err(err) => Err(err),
        }
    }

    fn resolve_plain(
        &self,
        symbol: &str,
        expected_type: ObjectType,
        retry: bool,
        options: &mut ResolutionOptions<'_>,
    ) -> CdmResult<DefinitionId> {
        let candidates = self.symbol_table.defining_documents(symbol);

        let wrt_priorities = self
            .documents
            .import_priorities(options.wrt_doc)
            .ok_or_else(|| unresolved(symbol, options.wrt_doc))?;

        let best = wrt_priorities
            .best_of(candidates.iter())
            .ok_or_else(|| unresolved(symbol, options.wrt_doc))?;

        options.symbol_ref_set.add(symbol.to_string());

        if let Some(id) = self.declared_definition(best, symbol) {
            return self.type_gate(symbol, id, expected_type);
        }

        if retry {
            // The best document is visible but does not itself declare the
            // symbol; recurse once with it as from-doc/wrt-doc to catch
            // symbols visible transitively from it.
            let saved_wrt = options.wrt_doc;
            options.wrt_doc = best;
            let result = self.resolve_plain(symbol, expected_type, false, options);
            options.wrt_doc = saved_wrt;
            return result;
        }

        Err(unresolved(symbol, options.wrt_doc))
    }

    fn declared_definition(&self, doc: DocumentId, symbol: &str) -> Option<DefinitionId> {
        let document = self.documents.get(doc)?;
        let document = document.lock();
        document.internal_declarations.get(symbol).copied()
    }

    fn type_gate(
        &self,
        symbol: &str,
        id: DefinitionId,
        expected_type: ObjectType,
    ) -> CdmResult<DefinitionId> {
        if expected_type == ObjectType::Error {
            return Ok(id);
        }
        match self.definitions.object_type_of(id) {
            Some(found) if found.matches(expected_type) => Ok(id),
            Some(found) => Err(CdmError::ExpectedTypeMismatch {
                symbol: symbol.to_string(),
                found,
                expected: expected_type,
            }),
            None => Err(CdmError::DefinitionNotFound(id)),
        }
    }
}

fn unresolved(symbol: &str, wrt_doc: DocumentId) -> CdmError {
    CdmError::UnresolvedSymbol {
        symbol: symbol.to_string(),
        wrt_doc: wrt_doc.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{Document, Import};
    use crate::imports::build_import_priorities;
    use crate::types::FolderId;
    use std::sync::Arc;

    struct AllEntities;
    impl DefinitionLookup for AllEntities {
        fn object_type_of(&self, _id: DefinitionId) -> Option<ObjectType> {
            Some(ObjectType::Entity)
        }
    }

    fn setup_two_docs_with_moniker() -> (DocumentLibrary, SymbolTable, DocumentId, DocumentId) {
        let documents = DocumentLibrary::new();
        let symbols = SymbolTable::new();

        let doc_a = DocumentId::new(1).unwrap();
        let doc_b = DocumentId::new(2).unwrap();

        let mut a = Document::new(doc_a, "ns:/a.cdm.json");
        a.imports.push(Import::new("ns:/b.cdm.json").with_moniker("m"));
        documents.add("ns:/a.cdm.json".into(), FolderId::new(1).unwrap(), a);

        let mut b = Document::new(doc_b, "ns:/b.cdm.json");
        b.internal_declarations
            .insert("E".to_string(), DefinitionId::new(10).unwrap());
        documents.add("ns:/b.cdm.json".into(), FolderId::new(1).unwrap(), b);
        symbols.register("E", doc_b);

        let paths = std::collections::HashMap::from([
            ("ns:/a.cdm.json".to_string(), doc_a),
            ("ns:/b.cdm.json".to_string(), doc_b),
        ]);
        let priorities_a = build_import_priorities(
            doc_a,
            &documents.get(doc_a).unwrap().lock().imports.clone(),
            &mut |p| paths.get(p).copied(),
            &mut |_| Vec::new(),
        );
        documents.set_import_priorities(doc_a, Arc::new(priorities_a));
        let priorities_b = build_import_priorities(doc_b, &[], &mut |p| paths.get(p).copied(), &mut |_| Vec::new());
        documents.set_import_priorities(doc_b, Arc::new(priorities_b));

        (documents, symbols, doc_a, doc_b)
    }

    #[test]
    fn moniker_qualified_symbol_resolves() {
        let (documents, symbols, doc_a, _doc_b) = setup_two_docs_with_moniker();
        let lookup = AllEntities;
        let resolver = Resolver::new(&symbols, &documents, &lookup);
        let mut deps = DependencySet::new();
        let mut options = ResolutionOptions::new(doc_a, &mut deps);
        let result = resolver.resolve("m/E", None, ObjectType::Entity, true, &mut options);
        assert_eq!(result.unwrap(), DefinitionId::new(10).unwrap());
    }

    #[test]
    fn unqualified_symbol_is_unresolved_from_importer_alone() {
        let (documents, symbols, doc_a, _doc_b) = setup_two_docs_with_moniker();
        let lookup = AllEntities;
        let resolver = Resolver::new(&symbols, &documents, &lookup);
        let mut deps = DependencySet::new();
        let mut options = ResolutionOptions::new(doc_a, &mut deps);
        let result = resolver.resolve("E", None, ObjectType::Entity, true, &mut options);
        assert!(matches!(result, Err(CdmError::UnresolvedSymbol { .. })));
    }
}
