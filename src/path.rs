//! Corpus path parsing, rebasing and the moniker-qualified symbol split.
//!
//! A corpus path is `namespace:/folder/.../name`; a relative path is rebased
//! against an anchor's in-document folder plus namespace. Lookup comparisons
//! are case-insensitive.

use crate::error::{CdmError, CdmResult};

/// An absolute, namespace-qualified corpus path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorpusPath {
    pub namespace: String,
    pub path: String,
}

impl CorpusPath {
    /// Split `input` into `(namespace, path)`. If `input` contains `:` before
    /// any `/`, that prefix is the namespace; otherwise `default_namespace`
    /// is used.
    pub fn parse(input: &str, default_namespace: &str) -> CdmResult<Self> {
        validate_fragment(input)?;

        let first_slash = input.find('/');
        let first_colon = input.find(':');

        let (namespace, path) = match (first_colon, first_slash) {
            (Some(c), Some(s)) if c < s => (input[..c].to_string(), input[c + 1..].to_string()),
            (Some(c), None) => (input[..c].to_string(), input[c + 1..].to_string()),
            _ => (default_namespace.to_string(), input.to_string()),
        };

        Ok(CorpusPath { namespace, path })
    }

    /// Rebase a relative `path` (no namespace prefix) against an anchor
    /// folder path within `namespace`.
    pub fn rebase(anchor_folder: &str, namespace: &str, relative: &str) -> CdmResult<Self> {
        validate_fragment(relative)?;
        let mut joined = anchor_folder.trim_end_matches('/').to_string();
        if !relative.starts_with('/') {
            joined.push('/');
        }
        joined.push_str(relative);
        Ok(CorpusPath {
            namespace: namespace.to_string(),
            path: joined,
        })
    }

    /// Lowercased absolute string, used as the document-library lookup key.
    pub fn lookup_key(&self) -> String {
        format!("{}:{}", self.namespace, self.path).to_lowercase()
    }
}

impl std::fmt::Display for CorpusPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

/// Reject paths containing `./`, `../`, `/./`, `..\`, `.\`, or `\.\`
/// fragments.
fn validate_fragment(input: &str) -> CdmResult<()> {
    const REJECTED: &[&str] = &["./", "../", "/./", "..\\", ".\\", "\\.\\"];
    if input.starts_with("./") || input.starts_with(".\\") {
        return Err(CdmError::PathFormatError {
            path: input.to_string(),
            reason: "path may not start with './' or '.\\'".to_string(),
        });
    }
    for fragment in REJECTED {
        if input.contains(fragment) {
            return Err(CdmError::PathFormatError {
                path: input.to_string(),
                reason: format!("path may not contain '{fragment}'"),
            });
        }
    }
    Ok(())
}

/// Split a symbol reference of the form `moniker/rest` into its first
/// moniker segment and the remainder, supporting chained monikers
/// (`a/b/c` splits into `a` and `b/c`).
pub fn split_moniker(symbol: &str) -> Option<(&str, &str)> {
    symbol.split_once('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_namespaced_absolute_path() {
        let p = CorpusPath::parse("cdm:/foo/bar.cdm.json/Entity", "default").unwrap();
        assert_eq!(p.namespace, "cdm");
        assert_eq!(p.path, "/foo/bar.cdm.json/Entity");
    }

    #[test]
    fn defaults_namespace_when_absent() {
        let p = CorpusPath::parse("/foo/bar.cdm.json", "local").unwrap();
        assert_eq!(p.namespace, "local");
        assert_eq!(p.path, "/foo/bar.cdm.json");
    }

    #[test]
    fn rejects_dot_slash_paths() {
        assert!(CorpusPath::parse("./a.cdm.json", "local").is_err());
        assert!(CorpusPath::parse("cdm:/foo/../bar.cdm.json", "local").is_err());
        assert!(CorpusPath::parse("cdm:/foo/./bar.cdm.json", "local").is_err());
    }

    #[test]
    fn splits_chained_monikers() {
        assert_eq!(split_moniker("m/Symbol"), Some(("m", "Symbol")));
        assert_eq!(split_moniker("a/b/c"), Some(("a", "b/c")));
        assert_eq!(split_moniker("Symbol"), None);
    }

    #[test]
    fn lookup_key_is_case_insensitive() {
        let p1 = CorpusPath::parse("CDM:/Foo/Bar", "default").unwrap();
        let p2 = CorpusPath::parse("cdm:/foo/bar", "default").unwrap();
        assert_eq!(p1.lookup_key(), p2.lookup_key());
    }
}
