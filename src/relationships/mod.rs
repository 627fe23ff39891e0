//! The relationship (foreign-key) extractor.
//!
//! Foreign keys are derived the way a full resolution pipeline derives them:
//! by walking a resolved entity's attribute-context tree rather than reading
//! `is.identifiedBy` off the target directly. For each entity this builds a
//! throwaway context tree — a root node, one `member` node per entity
//! attribute, an entity-reference child under it, and a sibling
//! `_generatedAttributeSet` carrying the synthesized `AddedAttributeIdentity`
//! node for the foreign key column — walks it in visit order to find every
//! entity reference, and discards the whole tree once extraction finishes.

use crate::definitions::{
    AttributeContextNode, AttributeMember, Definition, DefinitionKind, Reference, TraitReference,
};
use crate::documents::DefinitionStore;
use crate::types::{DefinitionId, DocumentId, IdGenerator, ObjectType};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Relationship {
    pub from_entity: String,
    pub from_attribute: String,
    pub to_entity: String,
    pub to_attribute: String,
}

#[derive(Default)]
pub struct RelationshipGraph {
    outgoing: HashMap<String, Vec<Relationship>>,
    incoming: HashMap<String, Vec<Relationship>>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outgoing(&self, entity: &str) -> &[Relationship] {
        self.outgoing.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn incoming(&self, entity: &str) -> &[Relationship] {
        self.incoming.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Recompute the graph for one manifest's entities from scratch,
    /// replacing whatever this entity previously contributed — running
    /// this twice on an unchanged manifest produces the same graph.
    pub fn recompute_for_entities(
        &mut self,
        entities: &[DefinitionId],
        definitions: &mut DefinitionStore,
        ids: &IdGenerator,
    ) {
        for &entity_id in entities {
            let relationships = extract_for_entity(entity_id, definitions, ids);
            let Some(def) = definitions.get(entity_id) else {
                continue;
            };
            let from_entity = def.declared_name.to_string();

            self.outgoing.insert(from_entity.clone(), Vec::new());
            for to_entity in relationships.iter().map(|r| r.to_entity.clone()).collect::<std::collections::HashSet<_>>() {
                if let Some(bucket) = self.incoming.get_mut(&to_entity) {
                    bucket.retain(|r| r.from_entity != from_entity);
                }
            }

            for relationship in relationships {
                self.incoming
                    .entry(relationship.to_entity.clone())
                    .or_default()
                    .push(relationship.clone());
                self.outgoing.entry(from_entity.clone()).or_default().push(relationship);
            }
        }
    }
}

/// Build `entity_id`'s attribute-context tree, walk it for entity-reference
/// nodes whose target carries exactly one `is.identifiedBy` trait, and
/// return one relationship per such node. The tree is removed from
/// `definitions` before returning — it exists only for the duration of this
/// call.
fn extract_for_entity(entity_id: DefinitionId, definitions: &mut DefinitionStore, ids: &IdGenerator) -> Vec<Relationship> {
    let Some(def) = definitions.get(entity_id) else {
        return Vec::new();
    };
    let DefinitionKind::Entity(entity) = &def.kind else {
        return Vec::new();
    };
    let from_entity_name = Arc::clone(&def.declared_name);
    let owning_document = def.owning_document;
    let members = entity.attributes.clone();

    let mut shadow_ids = Vec::new();
    let root_id = push_node(
        ids,
        definitions,
        owning_document,
        "",
        None,
        Some(Arc::from(format!("wrtSelf_{from_entity_name}"))),
        &mut shadow_ids,
    );

    for member in &members {
        let AttributeMember::EntityAttribute(reference) = member else {
            continue;
        };
        let Some((member_name, target_id)) = resolve_member_target(reference, definitions) else {
            continue;
        };
        let Some(target_def) = definitions.get(target_id) else {
            continue;
        };
        if !matches!(target_def.kind, DefinitionKind::Entity(_)) {
            continue;
        }
        let target_name = Arc::clone(&target_def.declared_name);

        let member_ctx_id = push_node(ids, definitions, owning_document, "", None, None, &mut shadow_ids);
        attach(definitions, root_id, member_ctx_id);

        let entity_ref_id = push_node(
            ids,
            definitions,
            owning_document,
            "",
            Some(Reference {
                named_reference: Some(Arc::clone(&target_name)),
                explicit: None,
                expected_type: ObjectType::Entity,
                resolved: Some(target_id),
            }),
            None,
            &mut shadow_ids,
        );
        attach(definitions, member_ctx_id, entity_ref_id);

        let leaf_id = push_node(
            ids,
            definitions,
            owning_document,
            member_name.as_ref(),
            Some(Reference {
                named_reference: Some(Arc::from(format!(
                    "{from_entity_name}/(resolvedAttributes)/AddedAttributeIdentity_{member_name}"
                ))),
                explicit: None,
                expected_type: ObjectType::TypeAttribute,
                resolved: None,
            }),
            None,
            &mut shadow_ids,
        );
        let added_identity_id = push_node(ids, definitions, owning_document, "AddedAttributeIdentity", None, None, &mut shadow_ids);
        attach(definitions, added_identity_id, leaf_id);

        let generated_set_id = push_node(ids, definitions, owning_document, "_generatedAttributeSet", None, None, &mut shadow_ids);
        attach(definitions, generated_set_id, added_identity_id);
        attach(definitions, member_ctx_id, generated_set_id);
    }

    let mut entity_refs = Vec::new();
    walk_entity_references(root_id, definitions, &mut entity_refs);

    let relationships = entity_refs
        .into_iter()
        .filter_map(|entity_ref_id| extract_relationship(entity_ref_id, root_id, definitions))
        .collect();

    for id in shadow_ids {
        definitions.remove(id);
    }

    relationships
}

/// An entity attribute's member name and the entity it ultimately points at.
/// A member may name an inline entity directly (no distinct member name
/// exists in that case, so the reference's own name stands in for it), or a
/// named top-level `EntityAttribute` definition — the common shape for a
/// foreign key whose column name differs from the target's identified
/// attribute — whose own declared name is the true member name.
fn resolve_member_target(reference: &Reference, definitions: &DefinitionStore) -> Option<(Arc<str>, DefinitionId)> {
    let resolved_id = reference.resolved?;
    let resolved_def = definitions.get(resolved_id)?;
    match &resolved_def.kind {
        DefinitionKind::Entity(_) => {
            let member_name = reference
                .named_reference
                .clone()
                .unwrap_or_else(|| Arc::clone(&resolved_def.declared_name));
            Some((member_name, resolved_id))
        }
        DefinitionKind::EntityAttribute(nested) => {
            let target_id = nested.entity.resolved?;
            Some((Arc::clone(&resolved_def.declared_name), target_id))
        }
        _ => None,
    }
}

fn push_node(
    ids: &IdGenerator,
    definitions: &mut DefinitionStore,
    owning_document: DocumentId,
    name: impl Into<Arc<str>>,
    definition: Option<Reference>,
    source_entity_path: Option<Arc<str>>,
    shadow_ids: &mut Vec<DefinitionId>,
) -> DefinitionId {
    let id = ids.next_definition_id();
    definitions.insert(Definition::new(
        id,
        name,
        owning_document,
        DefinitionKind::AttributeContext(AttributeContextNode {
            parent: None,
            children: Vec::new(),
            definition,
            source_entity_path,
        }),
    ));
    shadow_ids.push(id);
    id
}

/// Link `child_id` into `parent_id`'s children and set its `parent` back
/// pointer in the same step.
fn attach(definitions: &mut DefinitionStore, parent_id: DefinitionId, child_id: DefinitionId) {
    if let Some(DefinitionKind::AttributeContext(node)) = definitions.get_mut(parent_id).map(|d| &mut d.kind) {
        node.children.push(child_id);
    }
    if let Some(DefinitionKind::AttributeContext(node)) = definitions.get_mut(child_id).map(|d| &mut d.kind) {
        node.parent = Some(parent_id);
    }
}

fn attribute_context(definitions: &DefinitionStore, id: DefinitionId) -> Option<&AttributeContextNode> {
    match &definitions.get(id)?.kind {
        DefinitionKind::AttributeContext(node) => Some(node),
        _ => None,
    }
}

fn named_child(definitions: &DefinitionStore, node: &AttributeContextNode, name: &str) -> Option<DefinitionId> {
    node.children
        .iter()
        .copied()
        .find(|&id| definitions.get(id).is_some_and(|d| d.declared_name.as_ref() == name))
}

/// Depth-first visit order, collecting every node whose `definition` is an
/// entity reference.
fn walk_entity_references(node_id: DefinitionId, definitions: &DefinitionStore, out: &mut Vec<DefinitionId>) {
    let Some(node) = attribute_context(definitions, node_id) else {
        return;
    };
    if node.definition.as_ref().is_some_and(|r| r.expected_type == ObjectType::Entity && r.resolved.is_some()) {
        out.push(node_id);
    }
    for &child in &node.children {
        walk_entity_references(child, definitions, out);
    }
}

/// Recursively search `node_id`'s subtree for a node named
/// `AddedAttributeIdentity`, never descending into a nested entity
/// reference's own children (that subtree belongs to a different entity's
/// generated attribute set).
fn find_added_attribute_identity(node_id: DefinitionId, definitions: &DefinitionStore) -> Option<DefinitionId> {
    let def = definitions.get(node_id)?;
    if def.declared_name.as_ref() == "AddedAttributeIdentity" {
        return Some(node_id);
    }
    let DefinitionKind::AttributeContext(node) = &def.kind else {
        return None;
    };
    if node.definition.as_ref().is_some_and(|r| r.expected_type == ObjectType::Entity) {
        return None;
    }
    for &child in &node.children {
        if let Some(found) = find_added_attribute_identity(child, definitions) {
            return Some(found);
        }
    }
    None
}

/// Step 3 of the walk: starting at the entity-reference node's parent, scan
/// each ancestor's children (closest ancestor first) for a
/// `_generatedAttributeSet` node, find its `AddedAttributeIdentity`
/// descendant, and take that node's first child's named reference, stripping
/// the `AddedAttributeIdentity_` generated-name prefix back off.
fn derive_from_attribute(entity_ref_id: DefinitionId, definitions: &DefinitionStore) -> Option<String> {
    let mut ancestor = attribute_context(definitions, entity_ref_id)?.parent;
    while let Some(ancestor_id) = ancestor {
        let ancestor_node = attribute_context(definitions, ancestor_id)?;
        if let Some(generated_set_id) = named_child(definitions, ancestor_node, "_generatedAttributeSet") {
            let identity_id = find_added_attribute_identity(generated_set_id, definitions)?;
            let identity_node = attribute_context(definitions, identity_id)?;
            let leaf_id = *identity_node.children.first()?;
            let leaf_node = attribute_context(definitions, leaf_id)?;
            let reference = leaf_node.definition.as_ref()?;
            let full = reference.named_reference.as_deref()?;
            let last = full.rsplit('/').next().unwrap_or(full);
            return Some(last.strip_prefix("AddedAttributeIdentity_").unwrap_or(last).to_string());
        }
        ancestor = ancestor_node.parent;
    }
    None
}

fn strip_wrt_self(path: &str) -> &str {
    path.strip_prefix("wrtSelf_").unwrap_or(path)
}

fn extract_relationship(entity_ref_id: DefinitionId, root_id: DefinitionId, definitions: &DefinitionStore) -> Option<Relationship> {
    let node = attribute_context(definitions, entity_ref_id)?;
    let reference = node.definition.as_ref()?;
    let target_id = reference.resolved?;
    let target_def = definitions.get(target_id)?;
    let DefinitionKind::Entity(target_entity) = &target_def.kind else {
        return None;
    };

    let identity_traits: Vec<_> = target_entity
        .traits
        .iter()
        .filter(|t| t.reference.named_reference.as_deref() == Some("is.identifiedBy"))
        .collect();
    if identity_traits.len() != 1 {
        return None;
    }
    let to_attribute = identified_attribute_name(identity_traits[0])?;
    let from_attribute = derive_from_attribute(entity_ref_id, definitions)?;

    let root_node = attribute_context(definitions, root_id)?;
    let from_entity = strip_wrt_self(root_node.source_entity_path.as_deref()?).to_string();

    Some(Relationship {
        from_entity,
        from_attribute,
        to_entity: target_def.declared_name.to_string(),
        to_attribute,
    })
}

/// `is.identifiedBy`'s argument is a named reference (or literal path) of
/// the form `Entity/(resolvedAttributes)/attrName`; the attribute name is
/// its final path segment.
fn identified_attribute_name(identity_trait: &TraitReference) -> Option<String> {
    let argument = identity_trait.arguments.first()?;
    let path = match &argument.value {
        crate::definitions::ArgumentValue::Literal(text) => text.clone(),
        crate::definitions::ArgumentValue::Reference(r) => r.named_reference.as_ref()?.to_string(),
    };
    path.rsplit('/').next().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::{
        ArgumentAssignment, ArgumentValue, AttributeMember, Definition, EntityAttributeDef, EntityDef, Reference,
        TraitReference,
    };
    use crate::types::{DocumentId, ObjectType};

    fn id(n: u32) -> DefinitionId {
        DefinitionId::new(n).unwrap()
    }

    fn doc() -> DocumentId {
        DocumentId::new(1).unwrap()
    }

    #[test]
    fn extracts_a_foreign_key_relationship() {
        let mut definitions = DefinitionStore::new();
        let ids = IdGenerator::new();

        let customer_id = id(100);
        let mut identity = TraitReference::new("is.identifiedBy");
        identity.arguments.push(ArgumentAssignment {
            parameter_name: None,
            value: ArgumentValue::Literal("Customer/(resolvedAttributes)/customerId".to_string()),
            resolved_parameter: None,
        });
        definitions.insert(Definition::new(
            customer_id,
            "Customer",
            doc(),
            DefinitionKind::Entity(EntityDef {
                extends: None,
                attributes: Vec::new(),
                traits: vec![identity],
            }),
        ));

        let order_id = id(101);
        let mut customer_ref = Reference::named("Customer", ObjectType::Entity);
        customer_ref.resolved = Some(customer_id);
        definitions.insert(Definition::new(
            order_id,
            "Order",
            doc(),
            DefinitionKind::Entity(EntityDef {
                extends: None,
                attributes: vec![AttributeMember::EntityAttribute(customer_ref)],
                traits: Vec::new(),
            }),
        ));

        let mut graph = RelationshipGraph::new();
        graph.recompute_for_entities(&[customer_id, order_id], &mut definitions, &ids);

        let outgoing = graph.outgoing("Order");
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].to_entity, "Customer");
        assert_eq!(outgoing[0].to_attribute, "customerId");
        assert_eq!(outgoing[0].from_entity, "Order");

        let incoming = graph.incoming("Customer");
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].from_entity, "Order");
    }

    /// `Order.custId -> Customer.customerId`: the foreign key column name
    /// does not coincide with the target's identified attribute name, so a
    /// correct extractor must tell `from_attribute` and `to_attribute` apart.
    #[test]
    fn from_attribute_is_derived_from_the_source_side_member_name() {
        let mut definitions = DefinitionStore::new();
        let ids = IdGenerator::new();

        let customer_id = id(100);
        let mut identity = TraitReference::new("is.identifiedBy");
        identity.arguments.push(ArgumentAssignment {
            parameter_name: None,
            value: ArgumentValue::Literal("Customer/(resolvedAttributes)/customerId".to_string()),
            resolved_parameter: None,
        });
        definitions.insert(Definition::new(
            customer_id,
            "Customer",
            doc(),
            DefinitionKind::Entity(EntityDef {
                extends: None,
                attributes: Vec::new(),
                traits: vec![identity],
            }),
        ));

        let cust_id_attr = id(101);
        let mut customer_ref = Reference::named("Customer", ObjectType::Entity);
        customer_ref.resolved = Some(customer_id);
        definitions.insert(Definition::new(
            cust_id_attr,
            "custId",
            doc(),
            DefinitionKind::EntityAttribute(EntityAttributeDef {
                entity: customer_ref,
                traits: Vec::new(),
            }),
        ));

        let order_id = id(102);
        let mut member_ref = Reference::named("custId", ObjectType::EntityAttribute);
        member_ref.resolved = Some(cust_id_attr);
        definitions.insert(Definition::new(
            order_id,
            "Order",
            doc(),
            DefinitionKind::Entity(EntityDef {
                extends: None,
                attributes: vec![AttributeMember::EntityAttribute(member_ref)],
                traits: Vec::new(),
            }),
        ));

        let mut graph = RelationshipGraph::new();
        graph.recompute_for_entities(&[customer_id, order_id], &mut definitions, &ids);

        let outgoing = graph.outgoing("Order");
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].to_entity, "Customer");
        assert_eq!(outgoing[0].to_attribute, "customerId");
        assert_eq!(outgoing[0].from_attribute, "custId");
        assert_ne!(outgoing[0].from_attribute, outgoing[0].to_attribute);
    }

    #[test]
    fn entity_with_no_identity_trait_yields_no_relationship() {
        let mut definitions = DefinitionStore::new();
        let ids = IdGenerator::new();
        let customer_id = id(100);
        definitions.insert(Definition::new(
            customer_id,
            "Customer",
            doc(),
            DefinitionKind::Entity(EntityDef {
                extends: None,
                attributes: Vec::new(),
                traits: Vec::new(),
            }),
        ));
        let order_id = id(101);
        let mut customer_ref = Reference::named("Customer", ObjectType::Entity);
        customer_ref.resolved = Some(customer_id);
        definitions.insert(Definition::new(
            order_id,
            "Order",
            doc(),
            DefinitionKind::Entity(EntityDef {
                extends: None,
                attributes: vec![AttributeMember::EntityAttribute(customer_ref)],
                traits: Vec::new(),
            }),
        ));

        let mut graph = RelationshipGraph::new();
        graph.recompute_for_entities(&[customer_id, order_id], &mut definitions, &ids);
        assert!(graph.outgoing("Order").is_empty());
    }
}
