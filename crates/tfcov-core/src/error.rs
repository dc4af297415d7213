//! Error types

use crate::model::EntityKey;
use std::sync::Arc;
use thiserror::Error;

/// A settings value that would make a build invalid or its output vacuous
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("fuzzy-match-threshold must be between 0.0 and 1.0, got {0}")]
    ThresholdOutOfRange(f64),

    #[error("fuzzy-match-threshold must be at least 0.5 when fuzzy matching is enabled, got {0}")]
    ThresholdTooLowForFuzzy(f64),

    #[error("invalid cache-ttl {value:?}: {reason}")]
    InvalidCacheTtl { value: String, reason: String },

    #[error("at least one analyzer must be enabled")]
    NoAnalyzerEnabled,

    #[error("invalid resource-naming-pattern {pattern:?}: {reason}")]
    InvalidNamingPattern { pattern: String, reason: String },

    #[error("invalid glob {pattern:?} in {setting}: {reason}")]
    InvalidGlob {
        setting: &'static str,
        pattern: String,
        reason: String,
    },

    #[error("invalid entry {entry:?} in {setting}: expected {expected}")]
    InvalidEntry {
        setting: &'static str,
        entry: String,
        expected: &'static str,
    },
}

/// Misuse of the registry write path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("test function #{0} is not registered")]
    UnknownTestFunction(usize),

    #[error("test function {name} is already linked to {existing}")]
    AlreadyLinked { name: String, existing: EntityKey },

    #[error("no entity registered under {0}")]
    UnknownEntity(EntityKey),
}

/// Why a cached build did not produce a registry.
///
/// Cloneable so that every waiter of a single-flight build receives it.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    #[error("registry build failed: {0}")]
    Failed(Arc<eyre::Report>),

    #[error("registry build panicked: {0}")]
    Panicked(String),
}

impl From<eyre::Report> for BuildError {
    fn from(report: eyre::Report) -> Self {
        BuildError::Failed(Arc::new(report))
    }
}
