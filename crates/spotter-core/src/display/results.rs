//! Result wrappers for mutation outcomes.

use std::fmt;

use crate::{error::FailureKind, outcome::MutationOutcome};

/// Renders a [`MutationOutcome`] with a headline and, on success, the value.
///
/// `noun` names the resource in the headline ("phase", "session", ...).
pub struct OutcomeReport<'a, T> {
    pub noun: &'a str,
    pub outcome: &'a MutationOutcome<T>,
}

impl<'a, T> OutcomeReport<'a, T> {
    pub fn new(noun: &'a str, outcome: &'a MutationOutcome<T>) -> Self {
        Self { noun, outcome }
    }
}

impl<T: fmt::Display> fmt::Display for OutcomeReport<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = self.outcome;
        if outcome.success {
            write!(f, "Saved {}", self.noun)?;
            if let (Some(plan_id), Some(stamp)) = (outcome.plan_id, outcome.updated_at) {
                write!(f, " (plan {plan_id} now at `{stamp}`)")?;
            }
            writeln!(f)?;
            if let Some(value) = &outcome.value {
                writeln!(f)?;
                write!(f, "{value}")?;
            }
            return Ok(());
        }

        if outcome.conflict {
            write!(f, "Conflict: plan")?;
            if let Some(plan_id) = outcome.plan_id {
                write!(f, " {plan_id}")?;
            }
            write!(f, " was changed by someone else")?;
            if let Some(server) = outcome.server_updated_at {
                write!(f, " (server version `{server}`)")?;
            }
            return writeln!(f, ". Reload and try again.");
        }

        match &outcome.error {
            Some(error) => {
                let label = match error.kind {
                    FailureKind::NotFound => "Not found",
                    FailureKind::ValidationFailure => "Invalid input",
                    FailureKind::PersistenceFailure => "Storage error",
                    FailureKind::QueueSubmissionFailure => "Queue error",
                    FailureKind::Conflict => "Conflict",
                };
                write!(f, "{label}: {}", error.message)?;
                if error.is_retryable() {
                    write!(f, " (retryable)")?;
                }
                writeln!(f)
            }
            None => writeln!(f, "Failed to save {}", self.noun),
        }
    }
}

/// Confirmation for a deleted resource.
pub struct DeleteResult {
    pub noun: &'static str,
    pub id: u64,
    pub name: String,
}

impl fmt::Display for DeleteResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Deleted {} {}: {}", self.noun, self.id, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::Stamped,
        error::{Entity, SpotterError},
        stamp::VersionStamp,
    };

    #[test]
    fn test_success_report_includes_value_and_stamp() {
        let stamp = VersionStamp::now();
        let outcome = MutationOutcome::succeeded(Stamped {
            plan_id: 4,
            client_id: 1,
            updated_at: stamp,
            value: "Push day".to_string(),
        });
        let output = OutcomeReport::new("session", &outcome).to_string();
        assert!(output.starts_with("Saved session (plan 4 now at"));
        assert!(output.contains("Push day"));
    }

    #[test]
    fn test_conflict_report() {
        let server = VersionStamp::now();
        let error = SpotterError::Conflict {
            plan_id: 4,
            server_updated_at: server,
        };
        let outcome = MutationOutcome::<String>::failed(&error);
        let output = OutcomeReport::new("phase", &outcome).to_string();
        assert!(output.contains("Conflict: plan 4 was changed"));
        assert!(output.contains(&server.to_string()));
    }

    #[test]
    fn test_not_found_report() {
        let error = SpotterError::not_found(Entity::Session, 12);
        let outcome = MutationOutcome::<String>::failed(&error);
        let output = OutcomeReport::new("session", &outcome).to_string();
        assert!(output.starts_with("Not found:"));
    }
}
