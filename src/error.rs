//! Error types for the corpus resolution and indexing engine.
//!
//! Structured via `thiserror`, one enum per architectural layer, matching the
//! error taxonomy by architectural layer.

use crate::types::{DefinitionId, DocumentId, ObjectType};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CdmError {
    #[error("malformed corpus path '{path}': {reason}")]
    PathFormatError { path: String, reason: String },

    #[error("unknown namespace '{namespace}' in path '{path}'")]
    UnknownNamespace { namespace: String, path: String },

    #[error("could not load '{path}'")]
    NotFound { path: String },

    #[error("failed to parse document '{path}': {reason}")]
    ParseError { path: String, reason: String },

    #[error("duplicate declaration '{declared_path}' in document '{document}'")]
    DuplicateDeclaration {
        declared_path: String,
        document: String,
    },

    #[error("unresolved symbol '{symbol}' with respect to document '{wrt_doc}'")]
    UnresolvedSymbol { symbol: String, wrt_doc: String },

    #[error("moniker '{moniker}' not found in document '{doc}'")]
    MonikerNotFound { moniker: String, doc: String },

    #[error("symbol '{symbol}' resolved to {found:?}, expected {expected:?}")]
    ExpectedTypeMismatch {
        symbol: String,
        found: ObjectType,
        expected: ObjectType,
    },

    #[error("argument for parameter '{parameter}' is not convertible to its data type")]
    ParameterTypeMismatch { parameter: String },

    #[error("trait invocation '{trait_name}' is missing required argument '{parameter}'")]
    MissingRequiredArgument {
        trait_name: String,
        parameter: String,
    },

    #[error("resolved entity '{entity}' has no 'is.identifiedBy' trait")]
    MissingPrimaryKey { entity: String },

    #[error(transparent)]
    Storage(#[from] crate::storage::error::StorageError),

    #[error("document {0} is not registered in the document library")]
    DocumentNotRegistered(DocumentId),

    #[error("definition {0:?} not found")]
    DefinitionNotFound(DefinitionId),
}

pub type CdmResult<T> = Result<T, CdmError>;

/// Severity used both by `EventCallback` delivery and by the shallow/strict
/// validation downgrade rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl CdmError {
    /// Under shallow validation, reference and type errors are downgraded to
    /// warnings rather than aborting the pass.
    pub fn severity(&self, shallow: bool) -> Severity {
        match self {
            CdmError::UnresolvedSymbol { .. }
            | CdmError::MonikerNotFound { .. }
            | CdmError::ExpectedTypeMismatch { .. }
                if shallow =>
            {
                Severity::Warning
            }
            CdmError::MissingPrimaryKey { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }
}
