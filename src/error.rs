//! Tagged error variants for the task-graph engine.
//!
//! Library modules (`id`, `frontmatter`, `tree`, `resolver`, `mutator`,
//! `checker`, `session`, `aggregate`) return `Result<T, BacklogError>`. The
//! binary crate wraps these in `anyhow::Result` at the command boundary,
//! the same split the teacher's `Cargo.toml` stack implies.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BacklogError {
    #[error("invalid path id: {0}")]
    InvalidId(String),

    #[error("No list nodes found for path query: {0}")]
    NoMatchScope(String),

    #[error("at least one field must be supplied")]
    RequiresField,

    #[error("invalid status transition: {0}")]
    InvalidStatus(String),

    #[error("not found: {id}{}", hint_suffix(hint))]
    NotFound { id: String, hint: Option<String> },

    #[error("container is locked: {id}{}", hint_suffix(hint))]
    LockedContainer { id: String, hint: Option<String> },

    #[error("concurrent modification detected on {0}")]
    ConcurrentModification(String),

    #[error("dependency cycle detected: {0}")]
    DependencyCycle(String),

    #[error("type mismatch for key '{key}': expected {expected}")]
    TypeMismatch { key: String, expected: String },

    #[error("malformed frontmatter in {path}: {reason}")]
    MalformedFrontmatter { path: PathBuf, reason: String },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no .tasks/ or .backlog/ directory found under {0}")]
    NotInitialised(PathBuf),
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(h) => format!("\nTip: {h}"),
        None => String::new(),
    }
}

impl BacklogError {
    pub fn not_found_task(id: impl Into<String>) -> Self {
        BacklogError::NotFound {
            id: id.into(),
            hint: Some("Use 'backlog tree <enclosing>' to verify available IDs.".to_string()),
        }
    }

    pub fn not_found_container(id: impl Into<String>) -> Self {
        BacklogError::NotFound {
            id: id.into(),
            hint: Some("Use 'backlog tree' to list available IDs.".to_string()),
        }
    }

    pub fn locked(id: impl Into<String>, container_kind: &str) -> Self {
        BacklogError::LockedContainer {
            id: id.into(),
            hint: Some(format!("agent should create a new {container_kind}")),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BacklogError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable tag for `--json` error output.
    pub fn kind(&self) -> &'static str {
        match self {
            BacklogError::InvalidId(_) => "INVALID_ID",
            BacklogError::NoMatchScope(_) => "NO_MATCH_SCOPE",
            BacklogError::RequiresField => "REQUIRES_FIELD",
            BacklogError::InvalidStatus(_) => "INVALID_STATUS",
            BacklogError::NotFound { .. } => "NOT_FOUND",
            BacklogError::LockedContainer { .. } => "LOCKED_CONTAINER",
            BacklogError::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            BacklogError::DependencyCycle(_) => "DEPENDENCY_CYCLE",
            BacklogError::TypeMismatch { .. } => "TYPE_MISMATCH",
            BacklogError::MalformedFrontmatter { .. } => "MALFORMED_FRONTMATTER",
            BacklogError::Io { .. } => "IO_ERROR",
            BacklogError::NotInitialised(_) => "NOT_INITIALISED",
        }
    }

    pub fn hint(&self) -> Option<&str> {
        match self {
            BacklogError::NotFound { hint, .. } => hint.as_deref(),
            BacklogError::LockedContainer { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BacklogError>;
