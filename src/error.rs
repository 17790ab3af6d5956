use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GrantScopeError {
    #[error("No grant source supplied: provide a file path or an uploaded file")]
    SourceNotFound,

    #[error("Cannot read grant source {}: {reason}", .path.display())]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("Malformed grant JSON: {0}")]
    Parse(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Could not find a matching column for {canonical}")]
    UnresolvedColumn {
        canonical: String,
        suggestion: Option<String>,
    },

    #[error("Query engine error: {0}")]
    Engine(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl GrantScopeError {
    /// Errors that stem from the input data or the requested view rather than
    /// from the engine or the environment.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            GrantScopeError::SourceNotFound
                | GrantScopeError::SourceUnreadable { .. }
                | GrantScopeError::Parse(_)
                | GrantScopeError::Schema(_)
                | GrantScopeError::UnresolvedColumn { .. }
        )
    }
}

impl From<polars::error::PolarsError> for GrantScopeError {
    fn from(err: polars::error::PolarsError) -> Self {
        GrantScopeError::Polars(err.to_string())
    }
}

impl From<serde_json::Error> for GrantScopeError {
    fn from(err: serde_json::Error) -> Self {
        GrantScopeError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GrantScopeError>;
