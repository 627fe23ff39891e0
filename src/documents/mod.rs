//! Folders, documents, and imports — the document graph itself.

use crate::definitions::Definition;
use crate::types::{DefinitionId, DocumentId, FolderId, ObjectType};
use std::collections::HashMap;
use std::sync::Arc;

/// A named reference from one document to another, optionally under a
/// moniker.
#[derive(Debug, Clone)]
pub struct Import {
    pub corpus_path: Arc<str>,
    pub moniker: Option<Arc<str>>,
}

impl Import {
    pub fn new(corpus_path: impl Into<Arc<str>>) -> Self {
        Self {
            corpus_path: corpus_path.into(),
            moniker: None,
        }
    }

    pub fn with_moniker(mut self, moniker: impl Into<Arc<str>>) -> Self {
        self.moniker = Some(moniker.into());
        self
    }
}

/// Node in the per-namespace folder tree; owns child folders and documents
/// by name.
#[derive(Debug, Default)]
pub struct Folder {
    pub id: Option<FolderId>,
    pub name: String,
    pub folder_path: String,
    pub child_folders: Vec<String>,
    pub documents: Vec<String>,
}

impl Folder {
    pub fn root(namespace: &str) -> Self {
        Self {
            id: None,
            name: String::new(),
            folder_path: format!("{namespace}:/"),
            child_folders: Vec::new(),
            documents: Vec::new(),
        }
    }
}

/// One schema file: an ordered list of imports, an ordered list of top-level
/// definitions, and the internal declared-path → definition map built during
/// indexing.
#[derive(Debug)]
pub struct Document {
    pub id: DocumentId,
    pub corpus_path: Arc<str>,
    pub imports: Vec<Import>,
    pub top_level_definitions: Vec<DefinitionId>,
    pub internal_declarations: HashMap<String, DefinitionId>,
    pub needs_indexing: bool,
    pub currently_indexing: bool,
    pub imports_indexed: bool,
}

impl Document {
    pub fn new(id: DocumentId, corpus_path: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            corpus_path: corpus_path.into(),
            imports: Vec::new(),
            top_level_definitions: Vec::new(),
            internal_declarations: HashMap::new(),
            needs_indexing: true,
            currently_indexing: false,
            imports_indexed: false,
        }
    }

    pub fn mark_needs_indexing(&mut self) {
        self.needs_indexing = true;
        self.imports_indexed = false;
    }
}

/// A definition store keyed by id, shared by every document in a corpus
/// (definitions live as long as their owning document).
#[derive(Debug, Default)]
pub struct DefinitionStore {
    definitions: HashMap<DefinitionId, Definition>,
}

impl DefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, definition: Definition) {
        self.definitions.insert(definition.id, definition);
    }

    pub fn get(&self, id: DefinitionId) -> Option<&Definition> {
        self.definitions.get(&id)
    }

    pub fn get_mut(&mut self, id: DefinitionId) -> Option<&mut Definition> {
        self.definitions.get_mut(&id)
    }

    pub fn remove(&mut self, id: DefinitionId) -> Option<Definition> {
        self.definitions.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Definition> {
        self.definitions.values()
    }
}

impl crate::resolver::DefinitionLookup for DefinitionStore {
    fn object_type_of(&self, id: DefinitionId) -> Option<ObjectType> {
        self.get(id).map(|d| d.object_type)
    }
}

pub mod library;
pub use library::DocumentLibrary;
