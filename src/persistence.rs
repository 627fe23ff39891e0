//! Materializing raw bytes into the corpus's document object model.
//!
//! Concrete document-format parsing is an external collaborator — the
//! engine only needs *something* that
//! turns bytes into a `RawDocument`. `JsonPersistence` is the one concrete
//! implementation in this crate, good enough to drive the CLI and the
//! integration tests; a host embedding the engine is expected to supply its
//! own `Persistence` for its actual wire format.

use crate::definitions::{
    ArgumentAssignment, ArgumentValue, AttributeGroupDef, AttributeMember, ConstantEntityDef,
    DataTypeDef, DefinitionKind, EntityAttributeDef, EntityDef, LocalEntityDeclarationDef,
    PurposeDef, Reference, ReferencedEntityDeclarationDef, TraitDef, TraitReference,
    TypeAttributeDef,
};
use crate::error::{CdmError, CdmResult};
use crate::types::ObjectType;
use serde::Deserialize;

/// An import as written in the document, not yet resolved to a `DocumentId`.
#[derive(Debug, Clone)]
pub struct RawImport {
    pub corpus_path: String,
    pub moniker: Option<String>,
}

/// A definition as written in the document, not yet assigned a
/// `DefinitionId` or owning document.
#[derive(Debug, Clone)]
pub struct RawDefinition {
    pub name: String,
    pub kind: DefinitionKind,
}

#[derive(Debug, Clone, Default)]
pub struct RawDocument {
    pub imports: Vec<RawImport>,
    pub definitions: Vec<RawDefinition>,
}

pub trait Persistence: Send + Sync {
    fn materialize(&self, bytes: &[u8]) -> CdmResult<RawDocument>;
}

#[derive(Default)]
pub struct JsonPersistence;

impl JsonPersistence {
    pub fn new() -> Self {
        Self
    }
}

impl Persistence for JsonPersistence {
    fn materialize(&self, bytes: &[u8]) -> CdmResult<RawDocument> {
        let doc: DocumentDto = serde_json::from_slice(bytes).map_err(|source| CdmError::ParseError {
            path: "<bytes>".to_string(),
            reason: source.to_string(),
        })?;
        doc.into_raw()
    }
}

#[derive(Debug, Deserialize)]
struct DocumentDto {
    #[serde(default)]
    imports: Vec<ImportDto>,
    #[serde(default)]
    definitions: Vec<DefinitionDto>,
}

#[derive(Debug, Deserialize)]
struct ImportDto {
    #[serde(rename = "corpusPath")]
    corpus_path: String,
    moniker: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum DefinitionDto {
    Entity {
        name: String,
        extends: Option<RefDto>,
        #[serde(default)]
        attributes: Vec<AttributeMemberDto>,
        #[serde(default)]
        traits: Vec<TraitDto>,
    },
    Trait {
        name: String,
        extends: Option<RefDto>,
        #[serde(default)]
        has_parameters: Vec<String>,
    },
    Purpose {
        name: String,
        extends: Option<RefDto>,
    },
    DataType {
        name: String,
        extends: Option<RefDto>,
    },
    TypeAttribute {
        name: String,
        #[serde(rename = "dataType")]
        data_type: RefDto,
        #[serde(default)]
        traits: Vec<TraitDto>,
    },
    EntityAttribute {
        name: String,
        entity: RefDto,
        #[serde(default)]
        traits: Vec<TraitDto>,
    },
    AttributeGroup {
        name: String,
        #[serde(default)]
        members: Vec<AttributeMemberDto>,
    },
    ConstantEntity {
        name: String,
        #[serde(rename = "entityShape")]
        entity_shape: RefDto,
        #[serde(default)]
        constant_values: Vec<Vec<String>>,
    },
    LocalEntityDeclaration {
        #[serde(rename = "entityName")]
        entity_name: String,
    },
    ReferencedEntityDeclaration {
        #[serde(rename = "entityName")]
        entity_name: String,
        #[serde(rename = "entityPath")]
        entity_path: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RefDto {
    Named(String),
}

impl RefDto {
    fn into_reference(self, expected_type: ObjectType) -> Reference {
        match self {
            RefDto::Named(symbol) => Reference::named(symbol, expected_type),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum AttributeMemberDto {
    TypeAttribute { reference: String },
    EntityAttribute { reference: String },
    AttributeGroupRef { reference: String },
}

impl AttributeMemberDto {
    fn into_member(self) -> AttributeMember {
        match self {
            AttributeMemberDto::TypeAttribute { reference } => {
                AttributeMember::TypeAttribute(Reference::named(reference, ObjectType::TypeAttribute))
            }
            AttributeMemberDto::EntityAttribute { reference } => {
                AttributeMember::EntityAttribute(Reference::named(reference, ObjectType::EntityAttribute))
            }
            AttributeMemberDto::AttributeGroupRef { reference } => {
                AttributeMember::AttributeGroupRef(Reference::named(reference, ObjectType::AttributeGroup))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct TraitDto {
    reference: String,
    #[serde(default)]
    arguments: Vec<ArgumentDto>,
}

impl TraitDto {
    fn into_trait_reference(self) -> TraitReference {
        let mut trait_ref = TraitReference::new(self.reference);
        trait_ref.arguments = self
            .arguments
            .into_iter()
            .map(ArgumentDto::into_assignment)
            .collect();
        trait_ref
    }
}

#[derive(Debug, Deserialize)]
struct ArgumentDto {
    #[serde(rename = "parameterName")]
    parameter_name: Option<String>,
    value: String,
}

impl ArgumentDto {
    fn into_assignment(self) -> ArgumentAssignment {
        ArgumentAssignment {
            parameter_name: self.parameter_name.map(Into::into),
            value: ArgumentValue::Literal(self.value),
            resolved_parameter: None,
        }
    }
}

impl DocumentDto {
    fn into_raw(self) -> CdmResult<RawDocument> {
        let imports = self
            .imports
            .into_iter()
            .map(|i| RawImport {
                corpus_path: i.corpus_path,
                moniker: i.moniker,
            })
            .collect();

        let definitions = self
            .definitions
            .into_iter()
            .map(DefinitionDto::into_raw)
            .collect();

        Ok(RawDocument { imports, definitions })
    }
}

impl DefinitionDto {
    fn into_raw(self) -> RawDefinition {
        match self {
            DefinitionDto::Entity {
                name,
                extends,
                attributes,
                traits,
            } => RawDefinition {
                name,
                kind: DefinitionKind::Entity(EntityDef {
                    extends: extends.map(|r| r.into_reference(ObjectType::Entity)),
                    attributes: attributes.into_iter().map(|a| a.into_member()).collect(),
                    traits: traits.into_iter().map(|t| t.into_trait_reference()).collect(),
                }),
            },
            DefinitionDto::Trait {
                name,
                extends,
                has_parameters: _,
            } => RawDefinition {
                name,
                kind: DefinitionKind::Trait(TraitDef {
                    extends: extends.map(|r| r.into_reference(ObjectType::Trait)),
                    parameters: Vec::new(),
                }),
            },
            DefinitionDto::Purpose { name, extends } => RawDefinition {
                name,
                kind: DefinitionKind::Purpose(PurposeDef {
                    extends: extends.map(|r| r.into_reference(ObjectType::Purpose)),
                }),
            },
            DefinitionDto::DataType { name, extends } => RawDefinition {
                name,
                kind: DefinitionKind::DataType(DataTypeDef {
                    extends: extends.map(|r| r.into_reference(ObjectType::DataType)),
                }),
            },
            DefinitionDto::TypeAttribute { name, data_type, traits } => RawDefinition {
                name,
                kind: DefinitionKind::TypeAttribute(TypeAttributeDef {
                    data_type: data_type.into_reference(ObjectType::DataType),
                    traits: traits.into_iter().map(|t| t.into_trait_reference()).collect(),
                }),
            },
            DefinitionDto::EntityAttribute { name, entity, traits } => RawDefinition {
                name,
                kind: DefinitionKind::EntityAttribute(EntityAttributeDef {
                    entity: entity.into_reference(ObjectType::Entity),
                    traits: traits.into_iter().map(|t| t.into_trait_reference()).collect(),
                }),
            },
            DefinitionDto::AttributeGroup { name, members } => RawDefinition {
                name,
                kind: DefinitionKind::AttributeGroup(AttributeGroupDef {
                    members: members.into_iter().map(|m| m.into_member()).collect(),
                }),
            },
            DefinitionDto::ConstantEntity {
                name,
                entity_shape,
                constant_values,
            } => RawDefinition {
                name,
                kind: DefinitionKind::ConstantEntity(ConstantEntityDef {
                    entity_shape: entity_shape.into_reference(ObjectType::Entity),
                    constant_values,
                }),
            },
            DefinitionDto::LocalEntityDeclaration { entity_name } => RawDefinition {
                name: entity_name.clone(),
                kind: DefinitionKind::LocalEntityDeclaration(LocalEntityDeclarationDef {
                    entity: Reference::named(entity_name, ObjectType::Entity),
                }),
            },
            DefinitionDto::ReferencedEntityDeclaration { entity_name, entity_path } => RawDefinition {
                name: entity_name,
                kind: DefinitionKind::ReferencedEntityDeclaration(ReferencedEntityDeclarationDef {
                    entity: Reference::named(entity_path, ObjectType::Entity),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materializes_an_entity_with_an_identity_trait() {
        let json = br#"{
            "imports": [{"corpusPath": "cdm:/foundations.cdm.json", "moniker": "base"}],
            "definitions": [
                {
                    "type": "entity",
                    "name": "Customer",
                    "attributes": [
                        {"kind": "typeAttribute", "reference": "customerId"}
                    ],
                    "traits": [
                        {"reference": "is.identifiedBy", "arguments": [{"value": "Customer/(resolvedAttributes)/customerId"}]}
                    ]
                }
            ]
        }"#;
        let persistence = JsonPersistence::new();
        let raw = persistence.materialize(json).unwrap();
        assert_eq!(raw.imports.len(), 1);
        assert_eq!(raw.imports[0].moniker.as_deref(), Some("base"));
        assert_eq!(raw.definitions.len(), 1);
        assert_eq!(raw.definitions[0].name, "Customer");
        assert!(matches!(raw.definitions[0].kind, DefinitionKind::Entity(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        let persistence = JsonPersistence::new();
        assert!(persistence.materialize(b"{not json").is_err());
    }
}
