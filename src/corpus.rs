//! `Corpus`: the external interface. Owns every shared registry — ids,
//! symbols, documents, storage namespaces, definitions, relationships — and
//! is the one thing a host application constructs and drives.
//!
//! A "manifest" is modeled here as a corpus path naming a
//! document whose top-level declarations are `LocalEntityDeclaration`s and
//! `ReferencedEntityDeclaration`s — CDM's own convention for a
//! `*.manifest.cdm.json` document. A referenced declaration's target is
//! followed to its owning document, which is walked the same way; a document
//! reached that way is a "sub-manifest". This decision is recorded in
//! `DESIGN.md`.

use crate::cache::{build_cache_key, CacheKind};
use crate::definitions::{Definition, DefinitionKind};
use crate::documents::{DefinitionStore, DocumentLibrary};
use crate::error::{CdmError, CdmResult};
use crate::events::{Event, EventCallback, EventLevel, EventSink};
use crate::indexing::{self, Pipeline};
use crate::loader::Loader;
use crate::path::CorpusPath;
use crate::persistence::Persistence;
use crate::relationships::{Relationship, RelationshipGraph};
use crate::resolver::{ResolutionOptions, Resolver};
use crate::storage::NamespaceRegistry;
use crate::symbol::{DependencySet, SymbolTable};
use crate::types::{DefinitionId, DirectiveSet, DocumentId, IdGenerator, ObjectType, ValidationStage};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub struct Corpus {
    ids: Arc<IdGenerator>,
    symbols: Arc<SymbolTable>,
    documents: Arc<DocumentLibrary>,
    registry: Arc<NamespaceRegistry>,
    definitions: Mutex<DefinitionStore>,
    relationships: Mutex<RelationshipGraph>,
    events: EventSink,
    default_directives: RwLock<DirectiveSet>,
    loader: Loader,
    default_namespace: String,
    shallow_validation: bool,
    /// Documents indexed by the last `load`, awaiting their turn through
    /// `resolve_references_and_validate`'s staged passes.
    pending_validation: Mutex<(Vec<DocumentId>, ValidationStage)>,
    cache: Mutex<HashMap<String, DefinitionId>>,
}

impl Corpus {
    pub fn new(default_namespace: impl Into<String>, persistence: Arc<dyn Persistence>) -> Self {
        let default_namespace = default_namespace.into();
        let ids = Arc::new(IdGenerator::new());
        let documents = Arc::new(DocumentLibrary::new());
        let registry = Arc::new(NamespaceRegistry::new(default_namespace.clone()));
        let loader = Loader::new(
            Arc::clone(&registry),
            Arc::clone(&documents),
            persistence,
            Arc::clone(&ids),
        );

        Self {
            ids,
            symbols: Arc::new(SymbolTable::new()),
            documents,
            registry,
            definitions: Mutex::new(DefinitionStore::new()),
            relationships: Mutex::new(RelationshipGraph::new()),
            events: EventSink::new(),
            default_directives: RwLock::new(DirectiveSet::default_resolution()),
            loader,
            default_namespace,
            shallow_validation: false,
            pending_validation: Mutex::new((Vec::new(), ValidationStage::Start)),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_shallow_validation(mut self, shallow: bool) -> Self {
        self.shallow_validation = shallow;
        self
    }

    pub fn registry(&self) -> &NamespaceRegistry {
        &self.registry
    }

    pub fn documents(&self) -> &DocumentLibrary {
        &self.documents
    }

    pub fn set_event_callback(&self, callback: Option<EventCallback>) {
        self.events.set_callback(callback);
    }

    pub fn set_default_resolution_directives(&self, directives: DirectiveSet) {
        *self.default_directives.write() = directives;
    }

    /// Load `root` and everything transitively imported from it, then run
    /// the indexing pipeline's minimum passes (1-6) over whatever came back
    /// dirty. Leaves the document(s) queued for `resolve_references_and_validate`.
    pub async fn load(&self, root: &str) -> CdmResult<Vec<String>> {
        let failures = self.loader.load_transitive(root, &self.default_namespace).await?;
        self.materialize_pending();

        let dirty = {
            let pipeline = self.pipeline();
            let mut definitions = self.definitions.lock();
            indexing::run_to_minimum(&pipeline, &self.documents, &mut definitions)
        };
        *self.pending_validation.lock() = (dirty, ValidationStage::Start);
        Ok(failures)
    }

    fn pipeline(&self) -> Pipeline<'_> {
        Pipeline {
            documents: &self.documents,
            symbols: &self.symbols,
            events: &self.events,
            shallow_validation: self.shallow_validation,
        }
    }

    /// Assign real `DefinitionId`s to everything the loader staged, insert
    /// them into the shared store, and mark their owning documents dirty for
    /// indexing.
    fn materialize_pending(&self) {
        let pending = self.loader.take_pending_definitions();
        let mut definitions = self.definitions.lock();
        for (doc_id, raw_defs) in pending {
            let Some(document) = self.documents.get(doc_id) else {
                continue;
            };
            let mut document = document.lock();
            for raw in raw_defs {
                let id = self.ids.next_definition_id();
                definitions.insert(Definition::new(id, raw.name, doc_id, raw.kind));
                document.top_level_definitions.push(id);
            }
            document.mark_needs_indexing();
            drop(document);
            self.documents.mark_for_indexing(doc_id);
        }
    }

    /// Step the validation pipeline forward from wherever the last call left
    /// off, up to (and including) `stage_through`. Reaching `Finished` also
    /// runs pass 8 and returns the document set to a clean, indexed state.
    pub fn resolve_references_and_validate(&self, stage_through: ValidationStage) -> ValidationStage {
        let mut guard = self.pending_validation.lock();
        let (dirty, current) = &mut *guard;
        let pipeline = self.pipeline();
        let mut definitions = self.definitions.lock();

        while *current != stage_through && *current != ValidationStage::Finished {
            *current = current.next();
            pipeline.resolve_stage(dirty, &mut definitions, *current);
            if *current == ValidationStage::Finished {
                indexing::finalize(&self.documents, dirty);
            }
        }
        *current
    }

    /// Resolve a corpus path of the form `namespace:/folder/doc.cdm.json/Symbol`
    /// to the definition it names, applying the type-gate wildcard (any type
    /// matches). The cache is consulted by fingerprint before resolving;
    /// successful resolutions that touched at least one document are cached
    /// by their `cache::build_cache_key` fingerprint afterward.
    pub fn fetch_object(&self, path: &str, directives: Option<DirectiveSet>) -> CdmResult<DefinitionId> {
        let directives = directives.unwrap_or_else(|| self.default_directives.read().clone());
        let corpus_path = CorpusPath::parse(path, &self.default_namespace)?;
        let (doc_part, symbol) = corpus_path.path.rsplit_once('/').ok_or_else(|| CdmError::NotFound {
            path: path.to_string(),
        })?;
        let doc_path = CorpusPath {
            namespace: corpus_path.namespace.clone(),
            path: doc_part.to_string(),
        };
        let doc_id = self
            .documents
            .id_for_path(&doc_path.lookup_key())
            .ok_or_else(|| CdmError::NotFound { path: path.to_string() })?;

        let seed = DependencySet::seeded(symbol);
        if let Some(id) = self.cached_lookup(&seed, doc_id, symbol, &directives) {
            return Ok(id);
        }

        let mut deps = seed;
        let definitions = self.definitions.lock();
        let resolver = Resolver::new(&self.symbols, &self.documents, &*definitions);
        let mut options = ResolutionOptions::new(doc_id, &mut deps);
        let id = resolver.resolve(symbol, None, ObjectType::Error, true, &mut options)?;

        if let Some(kind) = definitions.get(id).and_then(|d| cache_kind_for(d.object_type)) {
            if let Some(key) = build_cache_key(&deps, &[doc_id], kind, symbol, &directives, None) {
                self.cache.lock().insert(key, id);
            }
        }
        Ok(id)
    }

    /// Try every cacheable kind's fingerprint for `symbol` (its kind isn't
    /// known until after resolution, so each candidate is checked in turn).
    /// A hit whose dependency documents have since been marked for
    /// re-indexing, or no longer exist, is dropped instead of returned —
    /// invalidation happens lazily, at lookup time, rather than by chasing
    /// every call site that can mark a document dirty.
    fn cached_lookup(&self, seed: &DependencySet, doc_id: DocumentId, symbol: &str, directives: &DirectiveSet) -> Option<DefinitionId> {
        const KINDS: [CacheKind; 6] = [
            CacheKind::Entity,
            CacheKind::Trait,
            CacheKind::DataType,
            CacheKind::Attribute,
            CacheKind::AttributeGroup,
            CacheKind::ConstantEntity,
        ];
        for kind in KINDS {
            let key = build_cache_key(seed, &[doc_id], kind, symbol, directives, None)?;
            let mut cache = self.cache.lock();
            let Some(&id) = cache.get(&key) else {
                continue;
            };
            if self.cache_key_is_stale(&key) {
                cache.remove(&key);
                continue;
            }
            return Some(id);
        }
        None
    }

    /// A cache key embeds the sorted document ids its resolution depended
    /// on as its leading comma-joined segment; a key is stale once any of
    /// those documents is queued for re-indexing or has been removed.
    fn cache_key_is_stale(&self, key: &str) -> bool {
        let Some(docs_part) = key.split('-').next() else {
            return true;
        };
        docs_part.split(',').any(|raw| {
            let Ok(value) = raw.parse::<u32>() else {
                return true;
            };
            let Some(id) = DocumentId::new(value) else {
                return true;
            };
            match self.documents.get(id) {
                Some(document) => document.lock().needs_indexing,
                None => true,
            }
        })
    }

    /// Construct a definition programmatically (`make-object`) — an
    /// embedding host populating defaults or synthesizing a definition
    /// outside of `Persistence`. Not resolved or declared; the caller is
    /// responsible for indexing the owning document afterward if needed.
    pub fn make_object(&self, owning_document: DocumentId, name: impl Into<Arc<str>>, kind: DefinitionKind) -> DefinitionId {
        let id = self.ids.next_definition_id();
        self.definitions.lock().insert(Definition::new(id, name, owning_document, kind));
        id
    }

    /// Recompute the relationship graph for every entity declared in
    /// `manifest` (and recursively in its sub-manifests, see module docs).
    /// Per-entity extraction walks a *resolved* shadow of the entity, fetched
    /// with `{normalized, referenceOnly}` directives, rather than its
    /// as-declared form.
    pub fn calculate_entity_graph(&self, manifest: &str) -> CdmResult<()> {
        let corpus_path = CorpusPath::parse(manifest, &self.default_namespace)?;
        let doc_id = self
            .documents
            .id_for_path(&corpus_path.lookup_key())
            .ok_or_else(|| CdmError::NotFound {
                path: manifest.to_string(),
            })?;

        let mut visited = HashSet::new();
        let mut entities = Vec::new();
        self.collect_manifest_entities(doc_id, &mut visited, &mut entities);

        let shadow_directives = DirectiveSet::default_resolution();
        for &entity_id in &entities {
            let Some(path) = self.entity_corpus_path(entity_id) else {
                continue;
            };
            let _ = self.fetch_object(&path, Some(shadow_directives.clone()));
        }

        let mut definitions = self.definitions.lock();
        self.relationships.lock().recompute_for_entities(&entities, &mut definitions, &self.ids);
        Ok(())
    }

    /// The full corpus path (`namespace:/folder/doc.cdm.json/Name`) of a
    /// declared entity, used to re-fetch its resolved form before extraction.
    fn entity_corpus_path(&self, entity_id: DefinitionId) -> Option<String> {
        let (owning_document, declared_name) = self
            .definitions
            .lock()
            .get(entity_id)
            .map(|d| (d.owning_document, d.declared_name.clone()))?;
        let document = self.documents.get(owning_document)?;
        let corpus_path = document.lock().corpus_path.to_string();
        Some(format!("{corpus_path}/{declared_name}"))
    }

    fn collect_manifest_entities(&self, doc_id: DocumentId, visited: &mut HashSet<DocumentId>, entities: &mut Vec<DefinitionId>) {
        if !visited.insert(doc_id) {
            return;
        }
        let Some(document) = self.documents.get(doc_id) else {
            return;
        };
        let ids = document.lock().top_level_definitions.clone();

        let mut sub_manifests = Vec::new();
        {
            let definitions = self.definitions.lock();
            for id in ids {
                let Some(def) = definitions.get(id) else { continue };
                match &def.kind {
                    DefinitionKind::LocalEntityDeclaration(local) => {
                        if let Some(target) = local.entity.resolved {
                            entities.push(target);
                        }
                    }
                    DefinitionKind::ReferencedEntityDeclaration(referenced) => {
                        let Some(target) = referenced.entity.resolved else { continue };
                        let Some(target_def) = definitions.get(target) else { continue };
                        if target_def.object_type == ObjectType::Entity {
                            entities.push(target);
                        }
                        sub_manifests.push(target_def.owning_document);
                    }
                    _ => {}
                }
            }
        }
        for sub in sub_manifests {
            self.collect_manifest_entities(sub, visited, entities);
        }
    }

    pub fn fetch_outgoing_relationships(&self, entity: &str) -> Vec<Relationship> {
        self.relationships.lock().outgoing(entity).to_vec()
    }

    pub fn fetch_incoming_relationships(&self, entity: &str) -> Vec<Relationship> {
        self.relationships.lock().incoming(entity).to_vec()
    }

    pub fn definition_count(&self) -> usize {
        self.definitions.lock().iter().count()
    }

    /// Every declared name of an `Entity`-kind definition currently in the
    /// store, for reporting and for CLI-driven relationship walks.
    pub fn entity_names(&self) -> Vec<String> {
        self.definitions
            .lock()
            .iter()
            .filter(|d| d.object_type == ObjectType::Entity)
            .map(|d| d.declared_name.to_string())
            .collect()
    }

    pub fn emit(&self, event: Event) {
        self.events.emit(event);
    }

    pub fn emit_warning(&self, path: Option<String>, message: impl Into<String>) {
        self.events.emit(Event {
            level: EventLevel::Warning,
            path,
            message: message.into(),
        });
    }
}

fn cache_kind_for(object_type: ObjectType) -> Option<CacheKind> {
    match object_type {
        ObjectType::Entity => Some(CacheKind::Entity),
        ObjectType::Trait => Some(CacheKind::Trait),
        ObjectType::DataType => Some(CacheKind::DataType),
        ObjectType::TypeAttribute => Some(CacheKind::Attribute),
        ObjectType::AttributeGroup => Some(CacheKind::AttributeGroup),
        ObjectType::ConstantEntity => Some(CacheKind::ConstantEntity),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::JsonPersistence;
    use crate::storage::{Adapter, StorageResult};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    struct StaticAdapter {
        files: HashMap<&'static str, &'static [u8]>,
    }

    #[async_trait]
    impl Adapter for StaticAdapter {
        async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
            self.files
                .get(path)
                .map(|b| b.to_vec())
                .ok_or_else(|| crate::storage::StorageError::Read {
                    namespace: "test".to_string(),
                    path: path.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
                })
        }
        async fn compute_last_modified_time(&self, _path: &str) -> StorageResult<Option<DateTime<Utc>>> {
            Ok(None)
        }
        async fn list_children(&self, _path: &str) -> StorageResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn load_then_fetch_resolves_a_declared_entity() {
        let corpus = Corpus::new("test", Arc::new(JsonPersistence::new()));
        let mut files = HashMap::new();
        files.insert(
            "/a.cdm.json",
            br#"{"imports": [], "definitions": [{"type": "entity", "name": "Customer"}]}"#.as_slice(),
        );
        corpus.registry().mount("test", Arc::new(StaticAdapter { files }));

        corpus.load("test:/a.cdm.json").await.unwrap();
        corpus.resolve_references_and_validate(ValidationStage::Finished);

        let id = corpus.fetch_object("test:/a.cdm.json/Customer", None).unwrap();
        assert!(corpus.definitions.lock().get(id).is_some());
        assert_eq!(corpus.entity_names(), vec!["Customer".to_string()]);
    }
}
