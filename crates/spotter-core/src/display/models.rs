//! Display implementations for domain models.

use std::fmt;

use super::time::{Elapsed, LocalDateTime};
use crate::models::{
    Phase, Plan, PlanExercise, PrescriptionRange, Session, SetValues, WorkoutSessionDetail,
    WorkoutSessionLog,
};

impl fmt::Display for PrescriptionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}-{}", self.min, self.max)
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# {}. {}", self.id, self.title)?;
        writeln!(f)?;
        writeln!(f, "- Client: {}", self.client_id)?;
        writeln!(f, "- Created: {}", LocalDateTime(&self.created_at))?;
        writeln!(f, "- Version: {}", self.updated_at)?;

        if self.phases.is_empty() {
            writeln!(f, "\nNo phases in this plan.")?;
            return Ok(());
        }
        writeln!(f)?;
        for phase in &self.phases {
            write!(f, "{phase}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.is_active { " (active)" } else { "" };
        writeln!(f, "## {}. {}{marker}", self.id, self.name)?;
        writeln!(f)?;
        if let Some(notes) = &self.notes {
            writeln!(f, "{notes}")?;
            writeln!(f)?;
        }
        for session in &self.sessions {
            write!(f, "{session}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "### {}. {}", self.id, self.name)?;
        if let Some(minutes) = self.duration_minutes {
            write!(f, " ({minutes} min)")?;
        }
        writeln!(f)?;
        writeln!(f)?;
        if self.exercises.is_empty() {
            writeln!(f, "No exercises.")?;
            writeln!(f)?;
            return Ok(());
        }
        for exercise in &self.exercises {
            write!(f, "{exercise}")?;
        }
        writeln!(f)
    }
}

impl fmt::Display for PlanExercise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "- **{}** {} x {}, rest {}s",
            self.exercise_name, self.sets, self.reps, self.rest_seconds
        )?;
        if let Some(custom) = &self.customizations {
            write!(f, " ({custom})")?;
        }
        writeln!(f, " `#{}`", self.id)
    }
}

impl fmt::Display for SetValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reps {
            Some(reps) => write!(f, "{reps} reps")?,
            None => write!(f, "- reps")?,
        }
        if let Some(weight) = self.weight {
            write!(f, " @ {weight}")?;
        }
        if let Some(volume) = self.volume() {
            write!(f, " (volume {volume})")?;
        }
        if let Some(notes) = self.notes.as_deref().filter(|n| !n.is_empty()) {
            write!(f, " - {notes}")?;
        }
        Ok(())
    }
}

impl fmt::Display for WorkoutSessionDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "- {} #{}: {} `#{}`",
            self.exercise_name,
            self.set_number,
            self.values(),
            self.id
        )
    }
}

impl fmt::Display for WorkoutSessionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Log {}: {}", self.id, self.session_name)?;
        writeln!(f)?;
        writeln!(f, "- User: {}", self.user_id)?;
        writeln!(f, "- Started: {}", LocalDateTime(&self.start_time))?;
        match self.end_time {
            Some(end) => {
                writeln!(f, "- Ended: {}", LocalDateTime(&end))?;
                writeln!(f, "- Duration: {}", Elapsed { from: self.start_time, to: end })?;
            }
            None => writeln!(f, "- In progress")?,
        }

        if self.details.is_empty() {
            writeln!(f, "\nNo sets logged.")?;
            return Ok(());
        }
        writeln!(f, "\n## Sets")?;
        writeln!(f)?;
        for detail in &self.details {
            write!(f, "{detail}")?;
        }
        let total: f64 = self.details.iter().filter_map(|d| d.workout_volume).sum();
        writeln!(f, "\nTotal volume: {total}")
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;

    use super::*;
    use crate::stamp::VersionStamp;

    fn exercise() -> PlanExercise {
        PlanExercise {
            id: 9,
            session_id: 2,
            exercise_id: 100,
            exercise_name: "Bench Press".into(),
            order_marker: "a0".into(),
            sets: PrescriptionRange::exactly(3),
            reps: PrescriptionRange { min: 8, max: 12 },
            rest_seconds: PrescriptionRange::exactly(90),
            customizations: Some("pause at bottom".into()),
        }
    }

    #[test]
    fn test_plan_tree_display() {
        let plan = Plan {
            id: 1,
            client_id: 5,
            title: "Strength Block".into(),
            created_at: Timestamp::UNIX_EPOCH,
            updated_at: VersionStamp::now(),
            phases: vec![Phase {
                id: 3,
                plan_id: 1,
                name: "Base".into(),
                notes: None,
                position: 0,
                is_active: true,
                sessions: vec![Session {
                    id: 2,
                    phase_id: 3,
                    name: "Push".into(),
                    position: 0,
                    duration_minutes: Some(60),
                    exercises: vec![exercise()],
                }],
            }],
        };

        let output = plan.to_string();
        assert!(output.contains("# 1. Strength Block"));
        assert!(output.contains("## 3. Base (active)"));
        assert!(output.contains("### 2. Push (60 min)"));
        assert!(output.contains("**Bench Press** 3 x 8-12, rest 90s (pause at bottom)"));
    }

    #[test]
    fn test_set_values_display() {
        let values = SetValues {
            reps: Some(5),
            weight: Some(100.0),
            notes: None,
        };
        assert_eq!(values.to_string(), "5 reps @ 100 (volume 500)");
        assert_eq!(SetValues::default().to_string(), "- reps");
    }
}
