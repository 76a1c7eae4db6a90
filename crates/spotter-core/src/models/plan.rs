//! Plan structure models: plan, phase, session and plan exercise.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, SpotterError},
    stamp::VersionStamp,
};

/// A trainer-authored workout plan for one client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    /// Unique identifier for the plan
    pub id: u64,

    /// Client the plan belongs to
    pub client_id: u64,

    /// Title of the plan
    pub title: String,

    /// Timestamp when the plan was created (UTC)
    pub created_at: Timestamp,

    /// Version stamp, bumped by every structural change below the plan
    pub updated_at: VersionStamp,

    /// Phases ordered by position (eagerly loaded by `get_plan`)
    #[serde(default)]
    pub phases: Vec<Phase>,
}

impl Plan {
    /// The active phase, if any.
    pub fn active_phase(&self) -> Option<&Phase> {
        self.phases.iter().find(|phase| phase.is_active)
    }
}

/// A block of the plan (e.g. "Hypertrophy, weeks 1-4").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Phase {
    pub id: u64,
    pub plan_id: u64,
    pub name: String,
    pub notes: Option<String>,
    /// 0-indexed position within the plan
    pub position: u32,
    /// At most one phase per plan is active
    pub is_active: bool,
    #[serde(default)]
    pub sessions: Vec<Session>,
}

/// A training day inside a phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: u64,
    pub phase_id: u64,
    pub name: String,
    /// 0-indexed, contiguous within the phase
    pub position: u32,
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub exercises: Vec<PlanExercise>,
}

/// Inclusive `min..=max` prescription (sets, reps or rest seconds).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PrescriptionRange {
    pub min: u32,
    pub max: u32,
}

impl PrescriptionRange {
    /// Builds a range, rejecting `min > max`.
    pub fn new(min: u32, max: u32) -> Result<Self> {
        let range = Self { min, max };
        range.validate("range")?;
        Ok(range)
    }

    /// A single fixed value.
    pub fn exactly(value: u32) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    pub(crate) fn validate(&self, field: &str) -> Result<()> {
        if self.min > self.max {
            return Err(SpotterError::invalid_input(field).with_reason(format!(
                "Minimum {} exceeds maximum {}",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// An exercise prescribed inside a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanExercise {
    pub id: u64,
    pub session_id: u64,
    /// Reference into the exercise catalog
    pub exercise_id: u64,
    /// Catalog name at the time the exercise was prescribed
    pub exercise_name: String,
    /// Sortable marker, see [`crate::ordering`]
    pub order_marker: String,
    pub sets: PrescriptionRange,
    pub reps: PrescriptionRange,
    pub rest_seconds: PrescriptionRange,
    /// Trainer's free-text tweaks (tempo, grip, cues)
    pub customizations: Option<String>,
}
