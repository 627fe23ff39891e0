//! The indexing pipeline: turns freshly loaded documents into resolved,
//! symbol-table-registered definitions.

pub mod pipeline;
pub use pipeline::Pipeline;

use crate::documents::{DefinitionStore, DocumentLibrary};
use crate::types::DocumentId;

/// Pass 8: flip the bookkeeping flags a dirty document carries once every
/// earlier pass has run over it.
pub fn finalize(documents: &DocumentLibrary, dirty: &[DocumentId]) {
    for &doc_id in dirty {
        if let Some(document) = documents.get(doc_id) {
            let mut document = document.lock();
            document.needs_indexing = false;
            document.currently_indexing = false;
            document.imports_indexed = true;
        }
        documents.mark_as_indexed(doc_id);
    }
}

/// Runs passes 1 through 6 (prepare, integrity, declare, link references,
/// parameter type-check, resolve trait arguments) over every document the
/// library reports as needing indexing. Passes 7's three stages are driven
/// separately via `Corpus::resolve_references_and_validate` since callers
/// may stop partway through them.
pub fn run_to_minimum(
    pipeline: &Pipeline<'_>,
    documents: &DocumentLibrary,
    definitions: &mut DefinitionStore,
) -> Vec<DocumentId> {
    let dirty = documents.documents_needing_indexing();
    if dirty.is_empty() {
        return dirty;
    }

    pipeline.prepare(&dirty);
    let healthy = pipeline.integrity(&dirty, definitions);
    let healthy = pipeline.declare(&healthy, definitions);
    pipeline.link_references(&healthy, definitions);
    pipeline.parameter_type_check(&healthy, definitions);
    pipeline.resolve_trait_arguments(&healthy, definitions);
    healthy
}
