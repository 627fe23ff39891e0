//! Polymorphic definitions and references.
//!
//! Modeled as a tagged sum over `ObjectType` rather
//! than a deep inheritance hierarchy: one `Definition` struct carrying an
//! enum payload, with `visit`/`validate` dispatching on that payload.

use crate::types::{DefinitionId, DocumentId, ObjectType};
use std::sync::Arc;

/// A named pointer to a declaration, or an inline explicit definition,
/// constrained to resolve to `expected_type`.
#[derive(Debug, Clone)]
pub struct Reference {
    pub named_reference: Option<Arc<str>>,
    pub explicit: Option<Box<Definition>>,
    pub expected_type: ObjectType,
    /// Populated by the resolver during the "link references" pass.
    pub resolved: Option<DefinitionId>,
}

impl Reference {
    pub fn named(symbol: impl Into<Arc<str>>, expected_type: ObjectType) -> Self {
        Self {
            named_reference: Some(symbol.into()),
            explicit: None,
            expected_type,
            resolved: None,
        }
    }

    pub fn explicit(definition: Definition) -> Self {
        let expected_type = definition.object_type;
        Self {
            named_reference: None,
            explicit: Some(Box::new(definition)),
            expected_type,
            resolved: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.explicit.is_some() || self.resolved.is_some()
    }
}

/// One `parameterName: value` pair on a trait invocation.
#[derive(Debug, Clone)]
pub struct ArgumentAssignment {
    pub parameter_name: Option<Arc<str>>,
    pub value: ArgumentValue,
    pub resolved_parameter: Option<DefinitionId>,
}

#[derive(Debug, Clone)]
pub enum ArgumentValue {
    Literal(String),
    Reference(Reference),
}

/// A trait invocation on an entity, attribute, or attribute group.
#[derive(Debug, Clone)]
pub struct TraitReference {
    pub reference: Reference,
    pub arguments: Vec<ArgumentAssignment>,
    pub resolved_arguments: bool,
}

impl TraitReference {
    pub fn new(symbol: impl Into<Arc<str>>) -> Self {
        Self {
            reference: Reference::named(symbol, ObjectType::Trait),
            arguments: Vec::new(),
            resolved_arguments: false,
        }
    }

    pub fn named_reference(&self) -> Option<&str> {
        self.reference.named_reference.as_deref()
    }
}

/// One member of an entity or attribute-group's ordered attribute list.
#[derive(Debug, Clone)]
pub enum AttributeMember {
    TypeAttribute(Reference),
    EntityAttribute(Reference),
    AttributeGroupRef(Reference),
}

#[derive(Debug, Clone)]
pub struct EntityDef {
    pub extends: Option<Reference>,
    pub attributes: Vec<AttributeMember>,
    pub traits: Vec<TraitReference>,
}

#[derive(Debug, Clone)]
pub struct TraitDef {
    pub extends: Option<Reference>,
    pub parameters: Vec<DefinitionId>,
}

#[derive(Debug, Clone)]
pub struct PurposeDef {
    pub extends: Option<Reference>,
}

#[derive(Debug, Clone)]
pub struct DataTypeDef {
    pub extends: Option<Reference>,
}

/// Data types that require a value convertible to a reference, per the
/// parameter type-check pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterDataTypeKind {
    Simple,
    Entity,
    Attribute,
    DataType,
    Purpose,
    Trait,
    AttributeGroup,
}

#[derive(Debug, Clone)]
pub struct ParameterDef {
    pub data_type_kind: ParameterDataTypeKind,
    pub default_value: Option<ArgumentValue>,
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct TypeAttributeDef {
    pub data_type: Reference,
    pub traits: Vec<TraitReference>,
}

#[derive(Debug, Clone)]
pub struct EntityAttributeDef {
    pub entity: Reference,
    pub traits: Vec<TraitReference>,
}

#[derive(Debug, Clone)]
pub struct AttributeGroupDef {
    pub members: Vec<AttributeMember>,
}

#[derive(Debug, Clone)]
pub struct ConstantEntityDef {
    pub entity_shape: Reference,
    pub constant_values: Vec<Vec<String>>,
}

/// A node in a resolved entity's attribute-context tree: a by-product of
/// resolution used by the relationship extractor. Not declared
/// directly by a document author.
#[derive(Debug, Clone)]
pub struct AttributeContextNode {
    pub parent: Option<DefinitionId>,
    pub children: Vec<DefinitionId>,
    /// The entity/attribute/attribute-group this node was derived from, if
    /// any (used for the `is.identifiedBy`/`_generatedAttributeSet` walk).
    pub definition: Option<Reference>,
    /// Back-reference to the logical (unresolved) entity path this context
    /// tree was generated for, used to recover `from-entity`.
    pub source_entity_path: Option<Arc<str>>,
}

#[derive(Debug, Clone)]
pub struct LocalEntityDeclarationDef {
    pub entity: Reference,
}

#[derive(Debug, Clone)]
pub struct ReferencedEntityDeclarationDef {
    pub entity: Reference,
}

#[derive(Debug, Clone)]
pub enum DefinitionKind {
    Entity(EntityDef),
    Trait(TraitDef),
    Purpose(PurposeDef),
    DataType(DataTypeDef),
    Parameter(ParameterDef),
    TypeAttribute(TypeAttributeDef),
    EntityAttribute(EntityAttributeDef),
    AttributeGroup(AttributeGroupDef),
    ConstantEntity(ConstantEntityDef),
    AttributeContext(AttributeContextNode),
    LocalEntityDeclaration(LocalEntityDeclarationDef),
    ReferencedEntityDeclaration(ReferencedEntityDeclarationDef),
}

impl DefinitionKind {
    pub fn object_type(&self) -> ObjectType {
        match self {
            DefinitionKind::Entity(_) => ObjectType::Entity,
            DefinitionKind::Trait(_) => ObjectType::Trait,
            DefinitionKind::Purpose(_) => ObjectType::Purpose,
            DefinitionKind::DataType(_) => ObjectType::DataType,
            DefinitionKind::Parameter(_) => ObjectType::Parameter,
            DefinitionKind::TypeAttribute(_) => ObjectType::TypeAttribute,
            DefinitionKind::EntityAttribute(_) => ObjectType::EntityAttribute,
            DefinitionKind::AttributeGroup(_) => ObjectType::AttributeGroup,
            DefinitionKind::ConstantEntity(_) => ObjectType::ConstantEntity,
            DefinitionKind::AttributeContext(_) => ObjectType::AttributeContext,
            DefinitionKind::LocalEntityDeclaration(_) => ObjectType::LocalEntityDeclaration,
            DefinitionKind::ReferencedEntityDeclaration(_) => {
                ObjectType::ReferencedEntityDeclaration
            }
        }
    }
}

/// A declared (or resolution-generated) object. `id` is process-unique;
/// `declared_name` is the name the author gave it (empty for anonymous
/// attribute-context nodes, whose `kind` carries its own synthetic name).
#[derive(Debug, Clone)]
pub struct Definition {
    pub id: DefinitionId,
    pub object_type: ObjectType,
    pub declared_name: Arc<str>,
    pub owning_document: DocumentId,
    pub kind: DefinitionKind,
}

impl Definition {
    pub fn new(
        id: DefinitionId,
        declared_name: impl Into<Arc<str>>,
        owning_document: DocumentId,
        kind: DefinitionKind,
    ) -> Self {
        Self {
            id,
            object_type: kind.object_type(),
            declared_name: declared_name.into(),
            owning_document,
            kind,
        }
    }

    /// Every reference directly held by this definition, in declaration
    /// order. Used by the declare/link-references/trait-argument passes and
    /// by the generic `visit`.
    pub fn references(&self) -> Vec<&Reference> {
        let mut refs = Vec::new();
        match &self.kind {
            DefinitionKind::Entity(e) => {
                refs.extend(e.extends.iter());
                for member in &e.attributes {
                    refs.push(member_reference(member));
                }
                for t in &e.traits {
                    refs.push(&t.reference);
                }
            }
            DefinitionKind::Trait(t) => refs.extend(t.extends.iter()),
            DefinitionKind::Purpose(p) => refs.extend(p.extends.iter()),
            DefinitionKind::DataType(d) => refs.extend(d.extends.iter()),
            DefinitionKind::Parameter(p) => {
                if let Some(ArgumentValue::Reference(r)) = &p.default_value {
                    refs.push(r);
                }
            }
            DefinitionKind::TypeAttribute(t) => {
                refs.push(&t.data_type);
                for tr in &t.traits {
                    refs.push(&tr.reference);
                }
            }
            DefinitionKind::EntityAttribute(e) => {
                refs.push(&e.entity);
                for tr in &e.traits {
                    refs.push(&tr.reference);
                }
            }
            DefinitionKind::AttributeGroup(g) => {
                for member in &g.members {
                    refs.push(member_reference(member));
                }
            }
            DefinitionKind::ConstantEntity(c) => refs.push(&c.entity_shape),
            DefinitionKind::AttributeContext(c) => refs.extend(c.definition.iter()),
            DefinitionKind::LocalEntityDeclaration(l) => refs.push(&l.entity),
            DefinitionKind::ReferencedEntityDeclaration(r) => refs.push(&r.entity),
        }
        refs
    }

    /// Mutable counterpart to `references()`, used by the link-references
    /// and parameter-type-check passes to latch resolved ids in place.
    pub fn references_mut(&mut self) -> Vec<&mut Reference> {
        let mut refs = Vec::new();
        match &mut self.kind {
            DefinitionKind::Entity(e) => {
                refs.extend(e.extends.iter_mut());
                for member in &mut e.attributes {
                    refs.push(member_reference_mut(member));
                }
                for t in &mut e.traits {
                    refs.push(&mut t.reference);
                }
            }
            DefinitionKind::Trait(t) => refs.extend(t.extends.iter_mut()),
            DefinitionKind::Purpose(p) => refs.extend(p.extends.iter_mut()),
            DefinitionKind::DataType(d) => refs.extend(d.extends.iter_mut()),
            DefinitionKind::Parameter(p) => {
                if let Some(ArgumentValue::Reference(r)) = &mut p.default_value {
                    refs.push(r);
                }
            }
            DefinitionKind::TypeAttribute(t) => {
                refs.push(&mut t.data_type);
                for tr in &mut t.traits {
                    refs.push(&mut tr.reference);
                }
            }
            DefinitionKind::EntityAttribute(e) => {
                refs.push(&mut e.entity);
                for tr in &mut e.traits {
                    refs.push(&mut tr.reference);
                }
            }
            DefinitionKind::AttributeGroup(g) => {
                for member in &mut g.members {
                    refs.push(member_reference_mut(member));
                }
            }
            DefinitionKind::ConstantEntity(c) => refs.push(&mut c.entity_shape),
            DefinitionKind::AttributeContext(c) => refs.extend(c.definition.iter_mut()),
            DefinitionKind::LocalEntityDeclaration(l) => refs.push(&mut l.entity),
            DefinitionKind::ReferencedEntityDeclaration(r) => refs.push(&mut r.entity),
        }
        refs
    }

    /// Trait invocations directly on this definition (entities, type
    /// attributes, entity attributes, attribute groups may carry traits).
    pub fn trait_references(&self) -> &[TraitReference] {
        match &self.kind {
            DefinitionKind::Entity(e) => &e.traits,
            DefinitionKind::TypeAttribute(t) => &t.traits,
            DefinitionKind::EntityAttribute(e) => &e.traits,
            _ => &[],
        }
    }

    pub fn trait_references_mut(&mut self) -> &mut Vec<TraitReference> {
        match &mut self.kind {
            DefinitionKind::Entity(e) => &mut e.traits,
            DefinitionKind::TypeAttribute(t) => &mut t.traits,
            DefinitionKind::EntityAttribute(e) => &mut e.traits,
            _ => panic!("definition kind does not carry trait references"),
        }
    }

    /// Minimal structural checks run during the integrity pass. Concrete
    /// semantic validation of entity data is out of scope;
    /// this enforces only the invariants the indexer itself depends on.
    pub fn validate(&self) -> Result<(), String> {
        match &self.kind {
            DefinitionKind::Trait(t) if t.extends.is_none() && self.declared_name.is_empty() => {
                Err("trait definitions require a declared name".to_string())
            }
            DefinitionKind::Parameter(p) => {
                if p.required && p.default_value.is_some() {
                    Err("a required parameter may not carry a default value".to_string())
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }
}

fn member_reference(member: &AttributeMember) -> &Reference {
    match member {
        AttributeMember::TypeAttribute(r) => r,
        AttributeMember::EntityAttribute(r) => r,
        AttributeMember::AttributeGroupRef(r) => r,
    }
}

fn member_reference_mut(member: &mut AttributeMember) -> &mut Reference {
    match member {
        AttributeMember::TypeAttribute(r) => r,
        AttributeMember::EntityAttribute(r) => r,
        AttributeMember::AttributeGroupRef(r) => r,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_type_matches_error_sentinel() {
        assert!(ObjectType::Entity.matches(ObjectType::Error));
        assert!(ObjectType::Entity.matches(ObjectType::Entity));
        assert!(!ObjectType::Entity.matches(ObjectType::Trait));
    }

    #[test]
    fn required_parameter_with_default_fails_validation() {
        let def = Definition::new(
            DefinitionId::new(1).unwrap(),
            "p",
            DocumentId::new(1).unwrap(),
            DefinitionKind::Parameter(ParameterDef {
                data_type_kind: ParameterDataTypeKind::Simple,
                default_value: Some(ArgumentValue::Literal("x".to_string())),
                required: true,
            }),
        );
        assert!(def.validate().is_err());
    }
}
