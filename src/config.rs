//! Layered configuration for the corpus engine.
//!
//! Sources merge in order: built-in defaults, a TOML file, then `CDM_`
//! prefixed environment variables (`CDM_INDEXING__THREADS=8` sets
//! `indexing.threads`).

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Namespace assumed for a corpus path carrying no `namespace:` prefix.
    #[serde(default = "default_namespace")]
    pub default_namespace: String,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub resolution: ResolutionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Worker count for the async loader's fan-out.
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Validate only up to `MinimumForResolving` rather than the full
    /// pipeline (see `resolve_references_and_validate`).
    #[serde(default = "default_false")]
    pub shallow_validation: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResolutionConfig {
    /// Default directive set applied when an operation does not specify one.
    #[serde(default = "default_directives")]
    pub default_directives: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
    #[serde(default)]
    pub modules: std::collections::HashMap<String, String>,
}

fn default_namespace() -> String {
    "cdm".to_string()
}
fn default_threads() -> usize {
    num_cpus::get()
}
fn default_false() -> bool {
    false
}
fn default_directives() -> Vec<String> {
    vec!["normalized".to_string(), "referenceOnly".to_string()]
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_namespace: default_namespace(),
            indexing: IndexingConfig::default(),
            resolution: ResolutionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            shallow_validation: default_false(),
        }
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            default_directives: default_directives(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: std::collections::HashMap::new(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(PathBuf::from("cdm.toml"))
    }

    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.into()))
            .merge(Env::prefixed("CDM_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_without_a_config_file() {
        let settings = Settings::load_from(PathBuf::from("does-not-exist.toml")).unwrap();
        assert_eq!(settings.default_namespace, "cdm");
        assert!(settings.indexing.threads > 0);
    }
}
