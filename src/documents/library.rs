//! The canonical document registry: `by-path`, `not-loaded`, `not-indexed`
//! Reads may run concurrently with loads but never observe a
//! torn entry — membership updates go through `dashmap`'s per-shard locking.

use super::{Document, Folder};
use crate::imports::ImportPriorities;
use crate::types::{DocumentId, FolderId};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

struct Entry {
    folder_id: FolderId,
    lookup_key: String,
    document: Arc<Mutex<Document>>,
}

#[derive(Default)]
pub struct DocumentLibrary {
    by_id: DashMap<DocumentId, Entry>,
    path_to_id: DashMap<String, DocumentId>,
    folders: DashMap<FolderId, Folder>,
    import_priorities: DashMap<DocumentId, Arc<ImportPriorities>>,
    not_loaded: Mutex<HashSet<String>>,
    not_indexed: Mutex<HashSet<DocumentId>>,
    /// Paths with a load in flight; guards the "at-most-one concurrent load
    /// per path" guarantee.
    loading: Mutex<HashSet<String>>,
}

impl DocumentLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, lookup_key: String, folder_id: FolderId, document: Document) -> DocumentId {
        let id = document.id;
        self.not_indexed.lock().insert(id);
        self.path_to_id.insert(lookup_key.clone(), id);
        self.by_id.insert(
            id,
            Entry {
                folder_id,
                lookup_key,
                document: Arc::new(Mutex::new(document)),
            },
        );
        id
    }

    pub fn remove(&self, id: DocumentId) {
        if let Some((_, entry)) = self.by_id.remove(&id) {
            self.path_to_id.remove(&entry.lookup_key);
        }
        self.not_indexed.lock().remove(&id);
        self.import_priorities.remove(&id);
    }

    pub fn id_for_path(&self, lookup_key: &str) -> Option<DocumentId> {
        self.path_to_id.get(lookup_key).map(|id| *id)
    }

    pub fn get(&self, id: DocumentId) -> Option<Arc<Mutex<Document>>> {
        self.by_id.get(&id).map(|e| Arc::clone(&e.document))
    }

    pub fn folder_id_of(&self, id: DocumentId) -> Option<FolderId> {
        self.by_id.get(&id).map(|e| e.folder_id)
    }

    pub fn contains(&self, id: DocumentId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn contains_path(&self, lookup_key: &str) -> bool {
        self.path_to_id.contains_key(lookup_key)
    }

    pub fn mark_for_indexing(&self, id: DocumentId) {
        self.not_indexed.lock().insert(id);
    }

    pub fn mark_as_indexed(&self, id: DocumentId) {
        self.not_indexed.lock().remove(&id);
    }

    pub fn documents_needing_indexing(&self) -> Vec<DocumentId> {
        self.not_indexed.lock().iter().copied().collect()
    }

    pub fn need_to_load(&self, lookup_key: &str) -> bool {
        !self.path_to_id.contains_key(lookup_key)
    }

    pub fn queue_load(&self, lookup_key: &str) {
        self.not_loaded.lock().insert(lookup_key.to_string());
    }

    pub fn drain_not_loaded(&self) -> Vec<String> {
        std::mem::take(&mut *self.not_loaded.lock())
            .into_iter()
            .collect()
    }

    /// Returns true and marks the path as loading if no load was already in
    /// flight; returns false if another caller already claimed it.
    pub fn try_begin_load(&self, lookup_key: &str) -> bool {
        self.loading.lock().insert(lookup_key.to_string())
    }

    /// A load cycle for `lookup_key` has ended, successfully or not. Either
    /// way the path leaves both the "loading" and "not-loaded" sets; on
    /// failure it is not retried within the same traversal.
    pub fn mark_as_loaded_or_failed(&self, lookup_key: &str, _loaded: bool) {
        self.loading.lock().remove(lookup_key);
        self.not_loaded.lock().remove(lookup_key);
    }

    pub fn put_folder(&self, id: FolderId, folder: Folder) {
        self.folders.insert(id, folder);
    }

    pub fn with_folder<R>(&self, id: FolderId, f: impl FnOnce(&Folder) -> R) -> Option<R> {
        self.folders.get(&id).map(|folder| f(&folder))
    }

    pub fn with_folder_mut<R>(&self, id: FolderId, f: impl FnOnce(&mut Folder) -> R) -> Option<R> {
        self.folders.get_mut(&id).map(|mut folder| f(&mut folder))
    }

    pub fn import_priorities(&self, id: DocumentId) -> Option<Arc<ImportPriorities>> {
        self.import_priorities.get(&id).map(|p| Arc::clone(&p))
    }

    pub fn set_import_priorities(&self, id: DocumentId, priorities: Arc<ImportPriorities>) {
        self.import_priorities.insert(id, priorities);
    }

    pub fn invalidate_import_priorities(&self, id: DocumentId) {
        self.import_priorities.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentId;

    #[test]
    fn add_then_remove_clears_all_sets() {
        let lib = DocumentLibrary::new();
        let id = DocumentId::new(1).unwrap();
        let doc = Document::new(id, "cdm:/a.cdm.json");
        lib.add("cdm:/a.cdm.json".to_string(), FolderId::new(1).unwrap(), doc);
        assert!(lib.contains(id));
        assert_eq!(lib.documents_needing_indexing().len(), 1);

        lib.remove(id);
        assert!(!lib.contains(id));
        assert_eq!(lib.documents_needing_indexing().len(), 0);
    }

    #[test]
    fn load_gate_allows_one_claim() {
        let lib = DocumentLibrary::new();
        assert!(lib.try_begin_load("cdm:/a.cdm.json"));
        assert!(!lib.try_begin_load("cdm:/a.cdm.json"));
        lib.mark_as_loaded_or_failed("cdm:/a.cdm.json", true);
        assert!(lib.try_begin_load("cdm:/a.cdm.json"));
    }
}
