//! The async document loader.
//!
//! Loading is the one part of the engine that talks to the outside world, so
//! it is the one part that runs on `tokio`: each round fans a batch of
//! pending paths out to the configured `Adapter`s via a `JoinSet`, and the
//! documents they materialize queue their own unresolved imports for the
//! next round. The loop is a fixpoint — it stops when a round discovers no
//! new path to load.

use crate::documents::{Document, DocumentLibrary, Import};
use crate::error::CdmResult;
use crate::path::CorpusPath;
use crate::persistence::{Persistence, RawDefinition};
use crate::storage::NamespaceRegistry;
use crate::types::{DocumentId, FolderId, IdGenerator};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinSet;

pub struct Loader {
    registry: Arc<NamespaceRegistry>,
    documents: Arc<DocumentLibrary>,
    persistence: Arc<dyn Persistence>,
    ids: Arc<IdGenerator>,
    /// Definitions materialized but not yet declared into the symbol table;
    /// drained by whoever drives the indexing pipeline's declare pass.
    pending_definitions: DashMap<DocumentId, Vec<RawDefinition>>,
}

/// What a single load attempt produced, passed back from a `JoinSet` task to
/// the round loop.
struct LoadOutcome {
    lookup_key: String,
    corpus_path: CorpusPath,
    result: CdmResult<(Vec<u8>, crate::persistence::RawDocument)>,
}

impl Loader {
    pub fn new(
        registry: Arc<NamespaceRegistry>,
        documents: Arc<DocumentLibrary>,
        persistence: Arc<dyn Persistence>,
        ids: Arc<IdGenerator>,
    ) -> Self {
        Self {
            registry,
            documents,
            persistence,
            ids,
            pending_definitions: DashMap::new(),
        }
    }

    /// Take ownership of every definition list materialized since the last
    /// call, keyed by the document they belong to.
    pub fn take_pending_definitions(&self) -> std::collections::HashMap<DocumentId, Vec<RawDefinition>> {
        let taken = self
            .pending_definitions
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        self.pending_definitions.clear();
        taken
    }

    /// Load `root` and every document transitively reachable from it
    /// through imports, to fixpoint. Returns the set of document lookup
    /// keys that failed to load (and so were skipped, not retried).
    pub async fn load_transitive(&self, root: &str, default_namespace: &str) -> CdmResult<Vec<String>> {
        let root_path = CorpusPath::parse(root, default_namespace)?;
        self.documents.queue_load(&root_path.lookup_key());

        let mut failures = Vec::new();

        loop {
            let pending = self.documents.drain_not_loaded();
            if pending.is_empty() {
                break;
            }

            let mut join_set: JoinSet<LoadOutcome> = JoinSet::new();
            for lookup_key in pending {
                if self.documents.contains_path(&lookup_key) {
                    continue;
                }
                if !self.documents.try_begin_load(&lookup_key) {
                    // Another in-flight task already claimed this path this
                    // round.
                    continue;
                }

                let registry = Arc::clone(&self.registry);
                let persistence = Arc::clone(&self.persistence);
                let default_namespace = default_namespace.to_string();
                join_set.spawn(async move {
                    let outcome = Self::load_one(&registry, &persistence, &lookup_key, &default_namespace).await;
                    LoadOutcome {
                        lookup_key,
                        corpus_path: outcome.0,
                        result: outcome.1,
                    }
                });
            }

            while let Some(joined) = join_set.join_next().await {
                let outcome = match joined {
                    Ok(outcome) => outcome,
                    Err(join_error) => {
                        tracing::error!("load task panicked: {join_error}");
                        continue;
                    }
                };
                self.apply_outcome(outcome, &mut failures);
            }
        }

        Ok(failures)
    }

    async fn load_one(
        registry: &NamespaceRegistry,
        persistence: &dyn Persistence,
        lookup_key: &str,
        default_namespace: &str,
    ) -> (CorpusPath, CdmResult<(Vec<u8>, crate::persistence::RawDocument)>) {
        let path = match CorpusPath::parse(lookup_key, default_namespace) {
            Ok(path) => path,
            Err(err) => {
                return (
                    CorpusPath {
                        namespace: default_namespace.to_string(),
                        path: lookup_key.to_string(),
                    },
                    Err(err),
                )
            }
        };

        let result = async {
            let adapter = registry.adapter(&path.namespace)?;
            let bytes = adapter.read(&path.path).await?;
            let raw = persistence.materialize(&bytes)?;
            Ok((bytes, raw))
        }
        .await;

        (path, result)
    }

    fn apply_outcome(&self, outcome: LoadOutcome, failures: &mut Vec<String>) {
        let LoadOutcome {
            lookup_key,
            corpus_path,
            result,
        } = outcome;

        match result {
            Ok((_bytes, raw)) => {
                let folder_id = self.folder_id_for(&corpus_path);
                let id = self.ids.next_document_id();
                let mut document = Document::new(id, corpus_path.to_string());
                document.imports = raw
                    .imports
                    .iter()
                    .map(|i| {
                        let mut import = Import::new(i.corpus_path.clone());
                        if let Some(moniker) = &i.moniker {
                            import = import.with_moniker(moniker.clone());
                        }
                        import
                    })
                    .collect();

                for import in &document.imports {
                    let import_path = match CorpusPath::parse(&import.corpus_path, &corpus_path.namespace) {
                        Ok(path) => path,
                        Err(_) => continue,
                    };
                    let import_key = import_path.lookup_key();
                    if !self.documents.contains_path(&import_key) {
                        self.documents.queue_load(&import_key);
                    }
                }

                self.pending_definitions.insert(id, raw.definitions);
                self.documents.add(lookup_key.clone(), folder_id, document);
                self.documents.mark_as_loaded_or_failed(&lookup_key, true);
            }
            Err(err) => {
                tracing::warn!(path = %corpus_path, "load failed: {err}");
                self.documents.mark_as_loaded_or_failed(&lookup_key, false);
                failures.push(lookup_key);
            }
        }
    }

    fn folder_id_for(&self, _path: &CorpusPath) -> FolderId {
        // Folder identity is assigned lazily by whichever corpus operation
        // first navigates that folder; the loader does not create folders
        // so it reuses a generated id per document rather than threading
        // through the folder tree itself.
        self.ids.next_folder_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Adapter;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    struct StaticAdapter {
        files: std::collections::HashMap<&'static str, &'static [u8]>,
    }

    #[async_trait]
    impl Adapter for StaticAdapter {
        async fn read(&self, path: &str) -> crate::storage::StorageResult<Vec<u8>> {
            self.files
                .get(path)
                .map(|b| b.to_vec())
                .ok_or_else(|| crate::storage::StorageError::Read {
                    namespace: "test".to_string(),
                    path: path.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
                })
        }

        async fn compute_last_modified_time(&self, _path: &str) -> crate::storage::StorageResult<Option<DateTime<Utc>>> {
            Ok(None)
        }

        async fn list_children(&self, _path: &str) -> crate::storage::StorageResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn loads_a_document_with_no_imports() {
        let registry = Arc::new(NamespaceRegistry::new("test"));
        let mut files = std::collections::HashMap::new();
        files.insert("/a.cdm.json", br#"{"imports": [], "definitions": []}"#.as_slice());
        registry.mount("test", Arc::new(StaticAdapter { files }));

        let documents = Arc::new(DocumentLibrary::new());
        let persistence = Arc::new(crate::persistence::JsonPersistence::new());
        let ids = Arc::new(IdGenerator::new());
        let loader = Loader::new(registry, Arc::clone(&documents), persistence, ids);

        let failures = loader.load_transitive("test:/a.cdm.json", "test").await.unwrap();
        assert!(failures.is_empty());
        assert!(documents.contains_path("test:/a.cdm.json"));
    }

    #[tokio::test]
    async fn missing_document_is_reported_as_a_failure() {
        let registry = Arc::new(NamespaceRegistry::new("test"));
        registry.mount("test", Arc::new(StaticAdapter { files: std::collections::HashMap::new() }));

        let documents = Arc::new(DocumentLibrary::new());
        let persistence = Arc::new(crate::persistence::JsonPersistence::new());
        let ids = Arc::new(IdGenerator::new());
        let loader = Loader::new(registry, documents, persistence, ids);

        let failures = loader.load_transitive("test:/missing.cdm.json", "test").await.unwrap();
        assert_eq!(failures.len(), 1);
    }
}
