//! The eight-pass indexing pipeline.
//!
//! Every pass runs over the full set of dirty documents before the next
//! pass starts — nothing here is per-document recursive the way a
//! file-at-a-time indexer would be. The pipeline itself holds no state
//! between calls; `Corpus` drives it and owns the dirty set.

use crate::definitions::{ArgumentValue, DefinitionKind};
use crate::documents::{DefinitionStore, DocumentLibrary};
use crate::error::CdmError;
use crate::events::{Event, EventLevel, EventSink};
use crate::imports::build_import_priorities;
use crate::resolver::{ResolutionOptions, Resolver};
use crate::symbol::{DependencySet, SymbolTable};
use crate::types::{DefinitionId, DocumentId, ObjectType, ValidationStage};
use std::sync::Arc;

pub struct Pipeline<'a> {
    pub documents: &'a DocumentLibrary,
    pub symbols: &'a SymbolTable,
    pub events: &'a EventSink,
    pub shallow_validation: bool,
}

impl<'a> Pipeline<'a> {
    /// Pass 1: clear cached import priorities and recompute them so every
    /// dirty document sees a fresh view of its own transitive imports.
    pub fn prepare(&self, dirty: &[DocumentId]) {
        for &doc_id in dirty {
            self.documents.invalidate_import_priorities(doc_id);

            let Some(document) = self.documents.get(doc_id) else {
                continue;
            };
            let self_imports = document.lock().imports.clone();

            let documents = self.documents;
            let mut resolve_path = |path: &str| documents.id_for_path(&path.to_lowercase());
            let mut imports_of = |id: DocumentId| {
                documents
                    .get(id)
                    .map(|d| d.lock().imports.clone())
                    .unwrap_or_default()
            };

            let priorities = build_import_priorities(doc_id, &self_imports, &mut resolve_path, &mut imports_of);
            self.documents.set_import_priorities(doc_id, Arc::new(priorities));
        }
    }

    /// Pass 2: structural validation. A document whose own objects fail
    /// `validate()` is reported and skipped by later passes.
    pub fn integrity(&self, dirty: &[DocumentId], definitions: &DefinitionStore) -> Vec<DocumentId> {
        let mut healthy = Vec::with_capacity(dirty.len());
        for &doc_id in dirty {
            let Some(document) = self.documents.get(doc_id) else {
                continue;
            };
            let ids = document.lock().top_level_definitions.clone();
            let mut ok = true;
            for id in ids {
                if let Some(def) = definitions.get(id) {
                    if let Err(reason) = def.validate() {
                        ok = false;
                        self.events.emit(Event {
                            level: EventLevel::Error,
                            path: Some(def.declared_name.to_string()),
                            message: reason,
                        });
                    }
                }
            }
            if ok {
                healthy.push(doc_id);
            }
        }
        healthy
    }

    /// Pass 3: insert each top-level definition's name into its document's
    /// `internal_declarations` map and register it in the corpus symbol
    /// table. Duplicate declarations abort that document.
    pub fn declare(&self, dirty: &[DocumentId], definitions: &DefinitionStore) -> Vec<DocumentId> {
        let mut healthy = Vec::with_capacity(dirty.len());
        for &doc_id in dirty {
            let Some(document) = self.documents.get(doc_id) else {
                continue;
            };
            let ids = document.lock().top_level_definitions.clone();
            let mut ok = true;
            for id in ids {
                let Some(def) = definitions.get(id) else {
                    continue;
                };
                // Manifest declarations name the entity they point at, not
                // themselves; registering that name here would shadow the
                // entity's own declaration in the symbol table. They are
                // looked up structurally (by walking `top_level_definitions`),
                // never by name, so they are exempt from declaration.
                if matches!(
                    def.object_type,
                    ObjectType::LocalEntityDeclaration | ObjectType::ReferencedEntityDeclaration
                ) {
                    continue;
                }
                let name = def.declared_name.to_string();
                let mut document = document.lock();
                if let Some(&existing) = document.internal_declarations.get(&name) {
                    if existing != id {
                        ok = false;
                        self.events.emit(Event {
                            level: EventLevel::Error,
                            path: Some(document.corpus_path.to_string()),
                            message: format!("duplicate declaration '{name}'"),
                        });
                        continue;
                    }
                }
                document.internal_declarations.insert(name.clone(), id);
                drop(document);
                self.symbols.register(name, doc_id);
            }
            if ok {
                healthy.push(doc_id);
            }
        }
        healthy
    }

    /// Pass 4: resolve every reference directly held by a dirty document's
    /// definitions, `wrt_doc = doc_id`.
    pub fn link_references(&self, dirty: &[DocumentId], definitions: &mut DefinitionStore) {
        for &doc_id in dirty {
            let Some(document) = self.documents.get(doc_id) else {
                continue;
            };
            let ids = document.lock().top_level_definitions.clone();
            for id in ids {
                self.resolve_definition_references(doc_id, id, definitions);
            }
        }
    }

    fn resolve_definition_references(&self, doc_id: DocumentId, id: DefinitionId, definitions: &mut DefinitionStore) {
        let targets: Vec<(String, ObjectType)> = {
            let Some(def) = definitions.get(id) else {
                return;
            };
            def.references()
                .iter()
                .filter_map(|r| {
                    r.named_reference
                        .as_ref()
                        .map(|s| (s.to_string(), r.expected_type))
                })
                .collect()
        };

        let mut resolved = Vec::with_capacity(targets.len());
        for (symbol, expected_type) in targets {
            let mut deps = DependencySet::new();
            let resolver = Resolver::new(self.symbols, self.documents, &*definitions);
            let mut options = ResolutionOptions::new(doc_id, &mut deps);
            let outcome = resolver.resolve(&symbol, None, expected_type, true, &mut options);
            resolved.push((symbol, outcome));
        }

        if let Some(def) = definitions.get_mut(id) {
            let mut refs = def.references_mut();
            for (slot, (symbol, outcome)) in refs.iter_mut().zip(resolved) {
                if slot.named_reference.as_deref() != Some(symbol.as_str()) {
                    continue;
                }
                match outcome {
                    Ok(target) => slot.resolved = Some(target),
                    Err(err) => self.report_reference_error(&symbol, err),
                }
            }
        }
    }

    fn report_reference_error(&self, symbol: &str, err: CdmError) {
        let severity = err.severity(self.shallow_validation);
        self.events.emit(Event {
            level: EventLevel::from(severity),
            path: Some(symbol.to_string()),
            message: err.to_string(),
        });
    }

    /// Pass 5: coerce a convertible parameter's default value into a
    /// reference of its declared kind.
    pub fn parameter_type_check(&self, dirty: &[DocumentId], definitions: &mut DefinitionStore) {
        for &doc_id in dirty {
            let Some(document) = self.documents.get(doc_id) else {
                continue;
            };
            let ids = document.lock().top_level_definitions.clone();
            for id in ids {
                self.coerce_parameter_default(doc_id, id, definitions);
            }
        }
    }

    fn coerce_parameter_default(&self, doc_id: DocumentId, id: DefinitionId, definitions: &mut DefinitionStore) {
        let literal = {
            let Some(def) = definitions.get(id) else { return };
            let DefinitionKind::Parameter(p) = &def.kind else {
                return;
            };
            match &p.default_value {
                Some(ArgumentValue::Literal(text)) => Some((text.clone(), expected_type_for(p.data_type_kind))),
                _ => None,
            }
        };

        let Some((literal, Some(expected_type))) = literal else {
            return;
        };

        let mut deps = DependencySet::new();
        let resolver = Resolver::new(self.symbols, self.documents, &*definitions);
        let mut options = ResolutionOptions::new(doc_id, &mut deps);
        let outcome = resolver.resolve(&literal, None, expected_type, true, &mut options);

        if let Some(def) = definitions.get_mut(id) {
            if let DefinitionKind::Parameter(p) = &mut def.kind {
                match outcome {
                    Ok(target) => {
                        let mut reference = crate::definitions::Reference::named(literal, expected_type);
                        reference.resolved = Some(target);
                        p.default_value = Some(ArgumentValue::Reference(reference));
                    }
                    Err(err) => {
                        self.events.emit(Event {
                            level: EventLevel::from(err.severity(self.shallow_validation)),
                            path: Some(def.declared_name.to_string()),
                            message: CdmError::ParameterTypeMismatch {
                                parameter: def.declared_name.to_string(),
                            }
                            .to_string(),
                        });
                    }
                }
            }
        }
    }

    /// Pass 6: bind each trait argument to the parameter it names and latch
    /// `resolved_arguments`.
    pub fn resolve_trait_arguments(&self, dirty: &[DocumentId], definitions: &mut DefinitionStore) {
        for &doc_id in dirty {
            let Some(document) = self.documents.get(doc_id) else {
                continue;
            };
            let ids = document.lock().top_level_definitions.clone();
            for id in ids {
                self.bind_trait_arguments(id, definitions);
            }
        }
    }

    fn bind_trait_arguments(&self, id: DefinitionId, definitions: &mut DefinitionStore) {
        let trait_refs: Vec<(Option<DefinitionId>, Vec<(usize, Option<String>)>)> = {
            let Some(def) = definitions.get(id) else { return };
            def.trait_references()
                .iter()
                .map(|t| {
                    let args = t
                        .arguments
                        .iter()
                        .enumerate()
                        .map(|(i, a)| (i, a.parameter_name.as_ref().map(|n| n.to_string())))
                        .collect();
                    (t.reference.resolved, args)
                })
                .collect()
        };

        let mut bindings: Vec<Vec<(usize, Option<DefinitionId>)>> = Vec::with_capacity(trait_refs.len());
        for (trait_def_id, args) in &trait_refs {
            let parameters = trait_def_id
                .and_then(|tid| definitions.get(tid))
                .and_then(|d| match &d.kind {
                    DefinitionKind::Trait(t) => Some(t.parameters.clone()),
                    _ => None,
                })
                .unwrap_or_default();

            let mut bound = Vec::with_capacity(args.len());
            for (i, name) in args {
                let binding = name.as_ref().and_then(|name| {
                    parameters.iter().find(|&&pid| {
                        definitions
                            .get(pid)
                            .is_some_and(|p| p.declared_name.as_ref() == name)
                    })
                });
                bound.push((*i, binding.copied()));
            }
            bindings.push(bound);
        }

        if let Some(def) = definitions.get_mut(id) {
            let trait_refs_mut = def.trait_references_mut();
            for (t, bound) in trait_refs_mut.iter_mut().zip(bindings) {
                for (i, param_id) in bound {
                    if let Some(arg) = t.arguments.get_mut(i) {
                        arg.resolved_parameter = param_id;
                    }
                }
                t.resolved_arguments = true;
            }
        }
    }

    /// Steps through one validation stage (the three "resolve traits,
    /// attributes, foreign-keys" passes of step 7). Each stage only
    /// re-checks invariants that depend on the previous one having run.
    pub fn resolve_stage(&self, dirty: &[DocumentId], definitions: &mut DefinitionStore, stage: ValidationStage) {
        match stage {
            ValidationStage::TraitAppliers | ValidationStage::MinimumForResolving => {
                // Satisfied by link_references/resolve_trait_arguments; this
                // stage only checks that extends chains terminate.
                for &doc_id in dirty {
                    self.check_extends_acyclic(doc_id, definitions);
                }
            }
            ValidationStage::Traits => {
                for &doc_id in dirty {
                    self.check_required_arguments(doc_id, definitions);
                }
            }
            ValidationStage::Attributes => {
                for &doc_id in dirty {
                    self.check_identified_entities(doc_id, definitions);
                }
            }
            ValidationStage::EntityReferences => {
                // Local/referenced entity declarations were already resolved
                // by link_references; nothing further to do at this stage.
            }
            ValidationStage::Start | ValidationStage::Finished | ValidationStage::Error => {}
        }
    }

    fn check_extends_acyclic(&self, doc_id: DocumentId, definitions: &DefinitionStore) {
        let Some(document) = self.documents.get(doc_id) else {
            return;
        };
        let ids = document.lock().top_level_definitions.clone();
        for id in ids {
            let mut seen = std::collections::HashSet::new();
            let mut current = Some(id);
            while let Some(cur) = current {
                if !seen.insert(cur) {
                    self.events.emit(Event {
                        level: EventLevel::Error,
                        path: None,
                        message: "cyclic 'extends' chain".to_string(),
                    });
                    break;
                }
                current = definitions.get(cur).and_then(extends_target);
            }
        }
    }

    fn check_required_arguments(&self, doc_id: DocumentId, definitions: &DefinitionStore) {
        let Some(document) = self.documents.get(doc_id) else {
            return;
        };
        let ids = document.lock().top_level_definitions.clone();
        for id in ids {
            let Some(def) = definitions.get(id) else { continue };
            for t in def.trait_references() {
                let Some(trait_def_id) = t.reference.resolved else { continue };
                let Some(trait_def) = definitions.get(trait_def_id) else { continue };
                let trait_name = trait_def.declared_name.to_string();
                let DefinitionKind::Trait(trait_def) = &trait_def.kind else {
                    continue;
                };
                for &param_id in &trait_def.parameters {
                    let Some(param_def) = definitions.get(param_id) else { continue };
                    let DefinitionKind::Parameter(param) = &param_def.kind else {
                        continue;
                    };
                    if !param.required {
                        continue;
                    }
                    let bound = t
                        .arguments
                        .iter()
                        .any(|a| a.resolved_parameter == Some(param_id));
                    if !bound && param.default_value.is_none() {
                        self.events.emit(Event {
                            level: EventLevel::Error,
                            path: Some(param_def.declared_name.to_string()),
                            message: CdmError::MissingRequiredArgument {
                                trait_name: trait_name.clone(),
                                parameter: param_def.declared_name.to_string(),
                            }
                            .to_string(),
                        });
                    }
                }
            }
        }
    }

    /// An entity carrying `is.identifiedBy` must own at least one attribute
    /// for the relationship extractor to walk back to (the
    /// `_generatedAttributeSet`/`AddedAttributeIdentity` search assumes
    /// one exists). The attribute-context tree itself is built lazily by
    /// the relationship extractor directly off the resolved entity, not
    /// materialized as its own set of definitions here.
    fn check_identified_entities(&self, doc_id: DocumentId, definitions: &DefinitionStore) {
        let Some(document) = self.documents.get(doc_id) else {
            return;
        };
        let ids = document.lock().top_level_definitions.clone();
        for id in ids {
            let Some(def) = definitions.get(id) else { continue };
            let DefinitionKind::Entity(entity) = &def.kind else {
                continue;
            };
            let identified = entity
                .traits
                .iter()
                .any(|t| t.reference.named_reference.as_deref() == Some("is.identifiedBy"));
            if identified && entity.attributes.is_empty() {
                self.events.emit(Event {
                    level: EventLevel::Warning,
                    path: Some(def.declared_name.to_string()),
                    message: format!("entity '{}' is identified but declares no attributes", def.declared_name),
                });
            }
        }
    }
}

fn extends_target(def: &crate::definitions::Definition) -> Option<DefinitionId> {
    match &def.kind {
        DefinitionKind::Entity(e) => e.extends.as_ref().and_then(|r| r.resolved),
        DefinitionKind::Trait(t) => t.extends.as_ref().and_then(|r| r.resolved),
        DefinitionKind::Purpose(p) => p.extends.as_ref().and_then(|r| r.resolved),
        DefinitionKind::DataType(d) => d.extends.as_ref().and_then(|r| r.resolved),
        _ => None,
    }
}

fn expected_type_for(kind: crate::definitions::ParameterDataTypeKind) -> Option<ObjectType> {
    use crate::definitions::ParameterDataTypeKind::*;
    match kind {
        Simple => None,
        Entity => Some(ObjectType::Entity),
        Attribute => Some(ObjectType::TypeAttribute),
        DataType => Some(ObjectType::DataType),
        Purpose => Some(ObjectType::Purpose),
        Trait => Some(ObjectType::Trait),
        AttributeGroup => Some(ObjectType::AttributeGroup),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::{Definition, EntityDef};
    use crate::documents::Document;
    use crate::types::FolderId;

    fn doc_id(n: u32) -> DocumentId {
        DocumentId::new(n).unwrap()
    }

    #[test]
    fn declare_then_link_resolves_extends() {
        let documents = DocumentLibrary::new();
        let symbols = SymbolTable::new();
        let events = EventSink::new();

        let base_id = doc_id(1);
        let mut base_doc = Document::new(base_id, "cdm:/base.cdm.json");
        let base_entity_id = DefinitionId::new(100).unwrap();
        base_doc.top_level_definitions.push(base_entity_id);
        documents.add("cdm:/base.cdm.json".into(), FolderId::new(1).unwrap(), base_doc);

        let mut definitions = DefinitionStore::new();
        definitions.insert(Definition::new(
            base_entity_id,
            "Base",
            base_id,
            DefinitionKind::Entity(EntityDef {
                extends: None,
                attributes: Vec::new(),
                traits: Vec::new(),
            }),
        ));

        let child_id = doc_id(2);
        let mut child_doc = Document::new(child_id, "cdm:/child.cdm.json");
        child_doc.imports.push(crate::documents::Import::new("cdm:/base.cdm.json"));
        let child_entity_id = DefinitionId::new(200).unwrap();
        child_doc.top_level_definitions.push(child_entity_id);
        documents.add("cdm:/child.cdm.json".into(), FolderId::new(1).unwrap(), child_doc);
        definitions.insert(Definition::new(
            child_entity_id,
            "Child",
            child_id,
            DefinitionKind::Entity(EntityDef {
                extends: Some(crate::definitions::Reference::named("Base", ObjectType::Entity)),
                attributes: Vec::new(),
                traits: Vec::new(),
            }),
        ));

        let pipeline = Pipeline {
            documents: &documents,
            symbols: &symbols,
            events: &events,
            shallow_validation: false,
        };

        let dirty = vec![base_id, child_id];
        pipeline.prepare(&dirty);
        let healthy = pipeline.integrity(&dirty, &definitions);
        let healthy = pipeline.declare(&healthy, &definitions);
        pipeline.link_references(&healthy, &mut definitions);

        let child = definitions.get(child_entity_id).unwrap();
        let DefinitionKind::Entity(e) = &child.kind else {
            panic!("expected entity");
        };
        assert_eq!(e.extends.as_ref().unwrap().resolved, Some(base_entity_id));
    }
}
