use crate::DbError;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// Maximum number of characters of failing SQL kept on an [`EngineError::Execution`].
pub const SQL_ERROR_EXCERPT: usize = 500;

/// A single field-level rule violation collected by the entity validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub property: String,
    pub message: String,
}

impl Display for ValidationFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.property, self.message)
    }
}

/// Root error of the engine. Every failure surfaced to callers is one of
/// these variants; driver-level causes are wrapped, never leaked as-is.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Model or statement misconfiguration: unknown property, missing key,
    /// unsupported dialect feature, bad relationship declaration.
    #[error("configuration error for entity `{entity}`: {message}")]
    Configuration { entity: String, message: String },

    /// One or more field-level rule violations. Carries the full list.
    #[error("validation failed for entity `{entity}` ({} violation(s))", .errors.len())]
    Validation {
        entity: String,
        errors: Vec<ValidationFailure>,
    },

    /// Write attempted against an entity mapped as read-only.
    #[error("entity `{entity}` is read-only and does not accept {operation}")]
    ReadOnly {
        entity: String,
        operation: &'static str,
    },

    /// Driver failure while executing SQL. Carries a truncated excerpt of the
    /// statement that failed.
    #[error("execution failed for `{entity}`: {source}\nwhile executing:\n{sql}")]
    Execution {
        entity: String,
        sql: String,
        #[source]
        source: DbError,
    },

    /// A keyed update or delete affected zero rows.
    #[error("{operation} on `{entity}` affected no rows, the row was changed or removed")]
    Concurrency {
        entity: String,
        operation: &'static str,
    },

    /// Row-count contract violated, or Single/First found no or too many rows.
    #[error("operation error on `{entity}`: {message}")]
    Operation { entity: String, message: String },

    /// A generated id came back but could not be coerced onto the key property.
    #[error("cannot assign generated key to `{entity}.{property}`: {message}")]
    KeyAssignment {
        entity: String,
        property: String,
        message: String,
    },

    /// Connection could not be produced or opened.
    #[error("connection failure: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<DbError>,
    },
}

impl EngineError {
    pub fn configuration(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            entity: entity.into(),
            message: message.into(),
        }
    }

    pub fn operation(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Operation {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Wrap a driver error, keeping the leading [`SQL_ERROR_EXCERPT`] chars of
    /// the statement for diagnostics.
    pub fn execution(entity: impl Into<String>, sql: &str, source: DbError) -> Self {
        Self::Execution {
            entity: entity.into(),
            sql: sql.chars().take(SQL_ERROR_EXCERPT).collect(),
            source,
        }
    }

    /// Name of the entity the failure relates to, where meaningful.
    pub fn entity(&self) -> Option<&str> {
        match self {
            Self::Configuration { entity, .. }
            | Self::Validation { entity, .. }
            | Self::ReadOnly { entity, .. }
            | Self::Execution { entity, .. }
            | Self::Concurrency { entity, .. }
            | Self::Operation { entity, .. }
            | Self::KeyAssignment { entity, .. } => Some(entity),
            Self::Connection { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
