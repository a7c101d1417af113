use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DodError {
    #[error("not initialized: run 'dod init'")]
    NotInitialized,

    #[error("failed to load specification {}: {reason}", path.display())]
    SpecLoad { path: PathBuf, reason: String },

    #[error("no active specification '{spec}' for project {}", project.display())]
    SpecNotActive { project: PathBuf, spec: String },

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("invalid severity: {0}")]
    InvalidSeverity(String),

    #[error("invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("duplicate rule name: {0}")]
    DuplicateRule(String),

    #[error("specification inheritance cycle: {0}")]
    ExtendsCycle(String),

    #[error("parent specification not found: {0}")]
    ParentNotFound(String),

    #[error("invalid template '{0}': expected minimal, standard or enterprise")]
    InvalidTemplate(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DodError>;
