//! Process-unique identifiers and small value types shared across the crate.

use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(NonZeroU32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FolderId(NonZeroU32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DefinitionId(NonZeroU32);

macro_rules! impl_id {
    ($ty:ident) => {
        impl $ty {
            pub fn new(value: u32) -> Option<Self> {
                NonZeroU32::new(value).map(Self)
            }

            pub fn value(&self) -> u32 {
                self.0.get()
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0.get())
            }
        }
    };
}

impl_id!(DocumentId);
impl_id!(FolderId);
impl_id!(DefinitionId);

/// Monotonic id allocator. One instance lives on the `Corpus`, never a global,
/// so that multiple corpora can coexist in one process.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: std::sync::atomic::AtomicU32,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            next: std::sync::atomic::AtomicU32::new(1),
        }
    }

    pub fn next_document_id(&self) -> DocumentId {
        DocumentId::new(self.allocate()).expect("id counter never yields zero")
    }

    pub fn next_folder_id(&self) -> FolderId {
        FolderId::new(self.allocate()).expect("id counter never yields zero")
    }

    pub fn next_definition_id(&self) -> DefinitionId {
        DefinitionId::new(self.allocate()).expect("id counter never yields zero")
    }

    fn allocate(&self) -> u32 {
        self.next.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }
}

/// The object-type tag every definition and reference carries.
///
/// `Error` is a sentinel used by the resolver to mean "accept any type" — it
/// is never the tag of a real definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Entity,
    Trait,
    Purpose,
    DataType,
    Parameter,
    TypeAttribute,
    EntityAttribute,
    AttributeGroup,
    ConstantEntity,
    AttributeContext,
    LocalEntityDeclaration,
    ReferencedEntityDeclaration,
    Error,
}

impl ObjectType {
    pub fn matches(self, expected: ObjectType) -> bool {
        expected == ObjectType::Error || self == expected
    }
}

/// A single resolution directive flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Directive {
    Normalized,
    ReferenceOnly,
    Structured,
    Virtual,
}

impl Directive {
    fn as_str(self) -> &'static str {
        match self {
            Directive::Normalized => "normalized",
            Directive::ReferenceOnly => "referenceOnly",
            Directive::Structured => "structured",
            Directive::Virtual => "virtual",
        }
    }
}

/// An ordered, deduplicated set of directives, rendered to a deterministic
/// cache-key tag (sorted, hyphen-joined).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectiveSet(indexmap::IndexSet<Directive>);

impl DirectiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, directive: Directive) -> Self {
        self.0.insert(directive);
        self
    }

    pub fn contains(&self, directive: Directive) -> bool {
        self.0.contains(&directive)
    }

    /// The default directive set used by the corpus unless overridden:
    /// `{normalized, referenceOnly}` per spec.
    pub fn default_resolution() -> Self {
        Self::new()
            .with(Directive::Normalized)
            .with(Directive::ReferenceOnly)
    }

    /// Deterministic tag used inside cache keys: sorted, hyphen-joined.
    pub fn tag(&self) -> String {
        let mut names: Vec<&str> = self.0.iter().map(|d| d.as_str()).collect();
        names.sort_unstable();
        names.join("-")
    }
}

/// Ordered validation stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValidationStage {
    Start,
    TraitAppliers,
    MinimumForResolving,
    Traits,
    Attributes,
    EntityReferences,
    Finished,
    Error,
}

impl ValidationStage {
    /// The stage that directly follows this one, used by
    /// `resolve_references_and_validate` to step the pipeline forward.
    pub fn next(self) -> Self {
        use ValidationStage::*;
        match self {
            Start => TraitAppliers,
            TraitAppliers => MinimumForResolving,
            MinimumForResolving => Traits,
            Traits => Attributes,
            Attributes => EntityReferences,
            EntityReferences => Finished,
            Finished => Finished,
            Error => Error,
        }
    }
}
