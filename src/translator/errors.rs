use thiserror::Error;

use crate::metadata::MetadataError;

/// Result type for translation
pub type TranslateResult<T> = Result<T, TranslateError>;

/// Translation failures. All of them are raised before any SQL reaches the
/// caller and none are worth retrying: the query shape has to change.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TranslateError {
    /// An expression shape with no translation rule
    #[error("Unsupported construct: {0}")]
    Unsupported(String),

    /// Operators used out of the permitted sequence
    #[error("Invalid operator sequence: {0}")]
    Syntax(String),

    /// Negative or contradictory pagination arguments
    #[error("Pagination out of bounds: {0}")]
    Bounds(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl TranslateError {
    pub fn unsupported(what: impl Into<String>) -> Self {
        TranslateError::Unsupported(what.into())
    }

    pub fn syntax(what: impl Into<String>) -> Self {
        TranslateError::Syntax(what.into())
    }

    pub fn bounds(what: impl Into<String>) -> Self {
        TranslateError::Bounds(what.into())
    }
}

/// A database error raised while executing generated SQL, carrying that SQL
/// for diagnostics.
#[derive(Debug, Error)]
#[error("{source} (while executing: {sql})")]
pub struct ExecutionError {
    pub sql: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl ExecutionError {
    pub fn new(
        sql: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            sql: sql.into(),
            source: source.into(),
        }
    }
}
