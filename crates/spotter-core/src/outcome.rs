//! Result value of structural mutations.
//!
//! Conflict-checked mutations never surface an `Err` to their caller. They
//! report success, conflict and failure through [`MutationOutcome`], which
//! serializes directly into API responses.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    db::Stamped,
    error::{FailureKind, SpotterError},
    stamp::VersionStamp,
};

/// Error part of a failed [`MutationOutcome`].
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct OutcomeError {
    pub kind: FailureKind,
    pub message: String,
}

impl OutcomeError {
    /// Whether repeating the mutation may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind == FailureKind::PersistenceFailure
    }
}

impl From<&SpotterError> for OutcomeError {
    fn from(error: &SpotterError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Outcome of a conflict-checked mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationOutcome<T> {
    pub success: bool,
    /// Owning plan, when it could be resolved
    pub plan_id: Option<u64>,
    /// Stamp written by the mutation (success only)
    pub updated_at: Option<VersionStamp>,
    /// Stamp found on the server (conflict only)
    pub server_updated_at: Option<VersionStamp>,
    pub conflict: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
}

impl<T> MutationOutcome<T> {
    pub fn succeeded(stamped: Stamped<T>) -> Self {
        Self {
            success: true,
            plan_id: Some(stamped.plan_id),
            updated_at: Some(stamped.updated_at),
            server_updated_at: None,
            conflict: false,
            error: None,
            value: Some(stamped.value),
        }
    }

    pub fn failed(error: &SpotterError) -> Self {
        let (plan_id, conflict) = match error {
            SpotterError::Conflict { plan_id, .. } => (Some(*plan_id), true),
            _ => (None, false),
        };
        Self {
            success: false,
            plan_id,
            updated_at: None,
            server_updated_at: error.server_updated_at(),
            conflict,
            error: Some(OutcomeError::from(error)),
            value: None,
        }
    }

    /// Failure classification, `None` on success.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Converts into a plain `Result` for callers that want `?`.
    pub fn into_result(self) -> Result<T, OutcomeError> {
        match (self.error, self.value) {
            (None, Some(value)) => Ok(value),
            (Some(error), _) => Err(error),
            (None, None) => Err(OutcomeError {
                kind: FailureKind::PersistenceFailure,
                message: "Mutation reported success without a value".to_string(),
            }),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> MutationOutcome<U> {
        MutationOutcome {
            success: self.success,
            plan_id: self.plan_id,
            updated_at: self.updated_at,
            server_updated_at: self.server_updated_at,
            conflict: self.conflict,
            error: self.error,
            value: self.value.map(f),
        }
    }
}

impl<T> From<crate::error::Result<Stamped<T>>> for MutationOutcome<T> {
    fn from(result: crate::error::Result<Stamped<T>>) -> Self {
        match result {
            Ok(stamped) => Self::succeeded(stamped),
            Err(error) => Self::failed(&error),
        }
    }
}
