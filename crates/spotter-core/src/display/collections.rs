//! Collection wrappers.

use std::fmt;

use crate::{
    models::Plan,
    queue::{JobSnapshot, JobStatus},
};

/// Plans as a compact list: one heading per plan with its phase count.
pub struct PlanList<'a>(pub &'a [Plan]);

impl fmt::Display for PlanList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No plans found.");
        }
        for plan in self.0 {
            writeln!(f, "## {} (ID: {})", plan.title, plan.id)?;
            writeln!(f)?;
            writeln!(f, "- **Client**: {}", plan.client_id)?;
            writeln!(f, "- **Phases**: {}", plan.phases.len())?;
            if let Some(active) = plan.active_phase() {
                writeln!(f, "- **Active phase**: {}", active.name)?;
            }
            writeln!(f, "- **Version**: `{}`", plan.updated_at)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Waiting => "waiting",
        JobStatus::Queued => "queued",
        JobStatus::Active => "active",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
    }
}

/// Queue contents as a markdown table.
pub struct JobTable<'a>(pub &'a [JobSnapshot]);

impl fmt::Display for JobTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No jobs.");
        }
        writeln!(f, "| Job | Type | Priority | Status | Attempts | Error |")?;
        writeln!(f, "|:-|:-|-:|:-|-:|:-|")?;
        for job in self.0 {
            writeln!(
                f,
                "| {} | {} | {} | {} | {}/{} | {} |",
                job.id,
                job.message_type,
                job.priority,
                status_label(job.status),
                job.attempts_made,
                job.max_attempts,
                job.last_error.as_deref().unwrap_or("")
            )?;
        }
        Ok(())
    }
}
