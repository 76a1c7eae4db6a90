//! Workout logging models.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// One workout as executed by a client.
///
/// Created eagerly when the workout starts. `end_time` stays `None` while the
/// workout is in progress; there is no separate "active" flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkoutSessionLog {
    pub id: u64,
    /// Client-chosen identifier; creating twice with it yields the same row
    pub client_ref: String,
    pub user_id: u64,
    pub session_name: String,
    pub start_time: Timestamp,
    pub end_time: Option<Timestamp>,
    #[serde(default)]
    pub details: Vec<WorkoutSessionDetail>,
}

impl WorkoutSessionLog {
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    /// A log counts as empty while no set has at least one rep recorded.
    pub fn is_empty(&self) -> bool {
        self.details.iter().all(|d| d.reps.unwrap_or(0) == 0)
    }
}

/// One logged set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkoutSessionDetail {
    pub id: u64,
    pub log_id: u64,
    /// Client-chosen identifier, unique per log; makes set creation retry-safe
    pub client_ref: String,
    /// Exercise name as it was when logged. Never rewritten, so history stays
    /// readable after the catalog entry is renamed or removed.
    pub exercise_name: String,
    pub set_number: u32,
    pub reps: Option<u32>,
    pub weight: Option<f64>,
    /// `reps * weight`, recomputed on every write
    pub workout_volume: Option<f64>,
    pub coach_note: Option<String>,
    pub order_marker: String,
    pub entry_time: Timestamp,
}

impl WorkoutSessionDetail {
    /// Current editable values of this set.
    pub fn values(&self) -> SetValues {
        SetValues {
            reps: self.reps,
            weight: self.weight,
            notes: self.coach_note.clone(),
        }
    }
}

/// Editable values of a set: reps, weight and the note.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SetValues {
    pub reps: Option<u32>,
    pub weight: Option<f64>,
    pub notes: Option<String>,
}

impl SetValues {
    /// True while nothing meaningful has been entered.
    pub fn is_default(&self) -> bool {
        self.reps.unwrap_or(0) == 0
            && self.weight.is_none()
            && self.notes.as_deref().map_or(true, str::is_empty)
    }

    pub fn volume(&self) -> Option<f64> {
        workout_volume(self.reps, self.weight)
    }
}

/// `reps * weight`, or `None` when either is missing.
pub fn workout_volume(reps: Option<u32>, weight: Option<f64>) -> Option<f64> {
    match (reps, weight) {
        (Some(reps), Some(weight)) => Some(f64::from(reps) * weight),
        _ => None,
    }
}
