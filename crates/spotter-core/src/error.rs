//! Error types for the spotter library.

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stamp::VersionStamp;

/// Kinds of persisted rows an error can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Plan,
    Phase,
    Session,
    PlanExercise,
    SessionLog,
    SetDetail,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Plan => "Plan",
            Entity::Phase => "Phase",
            Entity::Session => "Session",
            Entity::PlanExercise => "Plan exercise",
            Entity::SessionLog => "Workout session log",
            Entity::SetDetail => "Set",
        };
        f.write_str(name)
    }
}

/// Caller-facing classification of failures.
///
/// The UI branches on this rather than on individual variants: conflicts
/// prompt a refresh-and-reconcile flow, persistence failures are retried
/// quietly, validation failures are shown inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    Conflict,
    ValidationFailure,
    PersistenceFailure,
    QueueSubmissionFailure,
}

/// Comprehensive error type for all spotter operations.
#[derive(Error, Debug)]
pub enum SpotterError {
    /// Database connection, query or transaction errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: rusqlite::Error,
    },
    /// Target row does not exist (or vanished before the transaction)
    #[error("{entity} with ID {id} not found")]
    NotFound { entity: Entity, id: u64 },
    /// Caller's version stamp no longer matches the stored one
    #[error("Plan {plan_id} was modified concurrently (server version {server_updated_at})")]
    Conflict {
        plan_id: u64,
        server_updated_at: VersionStamp,
    },
    /// Invalid input validation errors
    #[error("Invalid input for field '{field}': {reason}")]
    InvalidInput { field: String, reason: String },
    /// Background queue rejected a message
    #[error("Failed to enqueue {message_type} message: {reason}")]
    QueueSubmission {
        message_type: String,
        reason: String,
    },
    /// File system operation errors
    #[error("File system error at path '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        source: std::io::Error,
    },
    /// XDG directory specification errors
    #[error("XDG directory error: {0}")]
    XdgDirectory(String),
    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
    /// Configuration and runtime wiring errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

/// Builder for creating database errors with optional context.
pub struct DatabaseErrorBuilder {
    message: String,
}

impl DatabaseErrorBuilder {
    /// Create a new database error builder with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build the error with the given source.
    pub fn with_source(self, source: rusqlite::Error) -> SpotterError {
        SpotterError::Database {
            message: self.message,
            source,
        }
    }
}

/// Builder for creating input validation errors.
pub struct InvalidInputBuilder {
    field: String,
}

impl InvalidInputBuilder {
    /// Create a new invalid input error builder for a field.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// Build the error with the given reason.
    pub fn with_reason(self, reason: impl Into<String>) -> SpotterError {
        SpotterError::InvalidInput {
            field: self.field,
            reason: reason.into(),
        }
    }
}

impl SpotterError {
    /// Creates a builder for database errors.
    pub fn database(message: impl Into<String>) -> DatabaseErrorBuilder {
        DatabaseErrorBuilder::new(message)
    }

    /// Creates a builder for input validation errors.
    pub fn invalid_input(field: impl Into<String>) -> InvalidInputBuilder {
        InvalidInputBuilder::new(field)
    }

    pub fn not_found(entity: Entity, id: u64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Maps this error onto the caller-facing taxonomy.
    ///
    /// Everything that is neither a missing row, a stale token, bad input nor
    /// a queue rejection is a storage-side fault and counts as a persistence
    /// failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            SpotterError::NotFound { .. } => FailureKind::NotFound,
            SpotterError::Conflict { .. } => FailureKind::Conflict,
            SpotterError::InvalidInput { .. } => FailureKind::ValidationFailure,
            SpotterError::QueueSubmission { .. } => FailureKind::QueueSubmissionFailure,
            SpotterError::Database { .. }
            | SpotterError::FileSystem { .. }
            | SpotterError::XdgDirectory(_)
            | SpotterError::Serialization { .. }
            | SpotterError::Configuration { .. } => FailureKind::PersistenceFailure,
        }
    }

    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            FailureKind::PersistenceFailure | FailureKind::QueueSubmissionFailure
        )
    }

    /// Server stamp carried by a conflict, if any.
    pub fn server_updated_at(&self) -> Option<VersionStamp> {
        match self {
            SpotterError::Conflict {
                server_updated_at, ..
            } => Some(*server_updated_at),
            _ => None,
        }
    }
}

/// Specialized extension trait for database-related Results.
pub trait DatabaseResultExt<T> {
    /// Map database errors with a message.
    fn db_context(self, message: &str) -> Result<T>;

    /// Map `QueryReturnedNoRows` to a not-found error and anything else to a
    /// database error with the message.
    fn or_not_found(self, entity: Entity, id: u64, message: &str) -> Result<T>;
}

impl<T> DatabaseResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn db_context(self, message: &str) -> Result<T> {
        self.map_err(|e| SpotterError::database(message).with_source(e))
    }

    fn or_not_found(self, entity: Entity, id: u64, message: &str) -> Result<T> {
        self.map_err(|e| {
            if matches!(e, rusqlite::Error::QueryReturnedNoRows) {
                SpotterError::not_found(entity, id)
            } else {
                SpotterError::database(message).with_source(e)
            }
        })
    }
}

/// Result type alias for spotter operations
pub type Result<T> = std::result::Result<T, SpotterError>;
