//! Error types for the custom field entity engine
//!
//! Every failure the engine can surface is a distinct variant so callers
//! (the HTTP layer in particular) can tell "not found" apart from a broken
//! schema or a bad template without string matching.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for entity and schema operations
#[derive(Error, Debug)]
pub enum EntityError {
    #[error("invalid identifier '{0}': only [A-Za-z0-9_] is allowed")]
    InvalidIdentifier(String),

    #[error("{entity_type} {id} not found")]
    NotFound { entity_type: String, id: i64 },

    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("invalid field configuration: {0}")]
    ConfigParse(String),

    #[error("schema change failed ({action}): {source}")]
    Schema {
        action: String,
        #[source]
        source: BoxError,
    },

    #[error("mapping error on '{field}': {message}")]
    Mapping { field: String, message: String },

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, EntityError>;

impl EntityError {
    /// HTTP status the transport layer should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidIdentifier(_) => 400,
            Self::NotFound { .. } => 404,
            Self::UnknownEntityType(_) => 404,
            Self::ConfigParse(_) => 400,
            Self::Schema { .. } => 500,
            Self::Mapping { .. } => 422,
            #[cfg(feature = "database")]
            Self::Database(_) => 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn mapping(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mapping {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn schema(action: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Schema {
            action: action.into(),
            source: source.into(),
        }
    }
}

impl From<serde_json::Error> for EntityError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}
