//! A symbol-resolution and indexing engine for Common Data Model corpora:
//! parses nothing itself (that's `Persistence`'s job) but owns everything
//! downstream of raw bytes — document graphs, import priorities, the
//! symbolic-name resolver, the indexing pipeline, and foreign-key
//! relationship extraction.

pub mod cache;
pub mod config;
pub mod corpus;
pub mod definitions;
pub mod documents;
pub mod error;
pub mod events;
pub mod imports;
pub mod indexing;
pub mod loader;
pub mod logging;
pub mod path;
pub mod persistence;
pub mod relationships;
pub mod resolver;
pub mod storage;
pub mod symbol;
pub mod types;

pub use corpus::Corpus;
pub use error::{CdmError, CdmResult};
