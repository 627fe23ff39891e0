//! Cache-key construction for resolved objects.
//!
//! A cache key is a deterministic fingerprint built from the identity of the
//! object being resolved and the set of documents its resolution actually
//! depended on. An empty dependency set means the resolution touched nothing
//! cacheable (e.g. it failed before consulting a single document) and the
//! object must not be cached at all.

use crate::symbol::DependencySet;
use crate::types::{DirectiveSet, DocumentId};

/// What kind of object a cache key names; kept separate from `ObjectType` so
/// the cache key format can diverge from the resolver's type-gate tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Entity,
    Trait,
    DataType,
    Attribute,
    AttributeGroup,
    ConstantEntity,
}

impl CacheKind {
    fn as_str(self) -> &'static str {
        match self {
            CacheKind::Entity => "entity",
            CacheKind::Trait => "trait",
            CacheKind::DataType => "dataType",
            CacheKind::Attribute => "attribute",
            CacheKind::AttributeGroup => "attributeGroup",
            CacheKind::ConstantEntity => "constantEntity",
        }
    }
}

/// Builds a cache key from the documents consulted while resolving an
/// object, its kind, its id-or-name, the active directive set, and an
/// optional extra disambiguator (e.g. an argument list's own fingerprint for
/// parameterized trait references).
///
/// Format: `<sorted-doc-ids>-<kind>-<id-or-name>-(<directives-tag>)[-<extra>]`.
/// Returns `None` when `dependencies` is empty — such a resolution has
/// nothing to invalidate on and is not cacheable.
pub fn build_cache_key(
    dependencies: &DependencySet,
    dependency_documents: &[DocumentId],
    kind: CacheKind,
    id_or_name: &str,
    directives: &DirectiveSet,
    extra: Option<&str>,
) -> Option<String> {
    if dependencies.is_empty() || dependency_documents.is_empty() {
        return None;
    }

    let mut doc_ids: Vec<u32> = dependency_documents.iter().map(|d| d.value()).collect();
    doc_ids.sort_unstable();
    doc_ids.dedup();

    let docs_part = doc_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");

    let mut key = format!(
        "{docs_part}-{}-{id_or_name}-({})",
        kind.as_str(),
        directives.tag()
    );
    if let Some(extra) = extra {
        key.push('-');
        key.push_str(extra);
    }
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Directive;

    fn doc(n: u32) -> DocumentId {
        DocumentId::new(n).unwrap()
    }

    #[test]
    fn empty_dependency_set_is_not_cacheable() {
        let deps = DependencySet::new();
        let key = build_cache_key(&deps, &[doc(1)], CacheKind::Entity, "Foo", &DirectiveSet::new(), None);
        assert!(key.is_none());
    }

    #[test]
    fn empty_document_list_is_not_cacheable() {
        let deps = DependencySet::seeded("Foo");
        let key = build_cache_key(&deps, &[], CacheKind::Entity, "Foo", &DirectiveSet::new(), None);
        assert!(key.is_none());
    }

    #[test]
    fn key_sorts_and_dedups_document_ids() {
        let deps = DependencySet::seeded("Foo");
        let directives = DirectiveSet::new().with(Directive::Normalized);
        let key = build_cache_key(
            &deps,
            &[doc(3), doc(1), doc(3), doc(2)],
            CacheKind::Entity,
            "Foo",
            &directives,
            None,
        )
        .unwrap();
        assert_eq!(key, "1,2,3-entity-Foo-(normalized)");
    }

    #[test]
    fn extra_disambiguator_is_appended() {
        let deps = DependencySet::seeded("Foo");
        let key = build_cache_key(
            &deps,
            &[doc(1)],
            CacheKind::Trait,
            "means.identity",
            &DirectiveSet::new(),
            Some("arg0=Customer"),
        )
        .unwrap();
        assert_eq!(key, "1-trait-means.identity-()-arg0=Customer");
    }
}
