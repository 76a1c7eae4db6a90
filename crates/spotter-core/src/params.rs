//! Parameter structures for spotter operations.
//!
//! These are the payloads handed to [`Planner`](crate::Planner) entry points
//! by any front end (CLI, queue consumer, tests). They carry no framework
//! derives beyond serde, so queue messages can embed them verbatim.
//!
//! Every payload that reaches the database is checked with its `validate`
//! method first; a failing check surfaces as a validation failure and never
//! touches storage.

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    error::{Result, SpotterError},
    models::{Phase, PlanExercise, PrescriptionRange, Session, SetValues},
    ordering,
};

fn require_name(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SpotterError::invalid_input(field).with_reason("Must not be empty"));
    }
    Ok(())
}

/// Reads a present field, `null` included, as `Some`, so that a missing
/// field (`None`) and an explicit `null` (`Some(None)`) stay distinct.
fn present<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Parameters for creating a new plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CreatePlan {
    /// Client the plan is written for
    pub client_id: u64,
    /// Title of the plan (required)
    pub title: String,
}

impl CreatePlan {
    pub fn validate(&self) -> Result<()> {
        require_name("title", &self.title)
    }
}

/// Fields of a new phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PhaseInput {
    pub name: String,
    pub notes: Option<String>,
}

impl PhaseInput {
    pub fn validate(&self) -> Result<()> {
        require_name("name", &self.name)
    }
}

/// Partial edit of a phase; `None` keeps the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PhaseUpdate {
    pub name: Option<String>,
    /// `Some(None)` clears the notes
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub notes: Option<Option<String>>,
}

impl PhaseUpdate {
    pub fn validate(&self) -> Result<()> {
        match &self.name {
            Some(name) => require_name("name", name),
            None => Ok(()),
        }
    }
}

/// Fields of a new session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionInput {
    pub name: String,
    pub duration_minutes: Option<u32>,
}

impl SessionInput {
    pub fn validate(&self) -> Result<()> {
        require_name("name", &self.name)
    }
}

/// Partial edit of a session; `None` keeps the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionUpdate {
    pub name: Option<String>,
    /// `Some(None)` clears the duration
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<Option<u32>>,
}

impl SessionUpdate {
    pub fn validate(&self) -> Result<()> {
        match &self.name {
            Some(name) => require_name("name", name),
            None => Ok(()),
        }
    }
}

/// Where a new plan exercise goes among its siblings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ExercisePlacement {
    /// After the current last exercise of the session
    #[default]
    End,
    /// Between two existing markers; `None` is an open end
    Between {
        before: Option<String>,
        after: Option<String>,
    },
    /// Keep the stored marker (edits) or use this exact one
    Marker(String),
}

/// Create-or-edit payload for a plan exercise.
///
/// With `id = None` a new exercise is inserted into `session_id`; otherwise
/// the existing row is overwritten and `session_id` must match its session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaveExercise {
    pub id: Option<u64>,
    pub session_id: u64,
    pub exercise_id: u64,
    pub exercise_name: String,
    pub sets: PrescriptionRange,
    pub reps: PrescriptionRange,
    pub rest_seconds: PrescriptionRange,
    pub customizations: Option<String>,
    #[serde(default)]
    pub placement: ExercisePlacement,
}

impl SaveExercise {
    pub fn validate(&self) -> Result<()> {
        require_name("exercise_name", &self.exercise_name)?;
        self.sets.validate("sets")?;
        self.reps.validate("reps")?;
        self.rest_seconds.validate("rest_seconds")?;
        if let ExercisePlacement::Marker(marker) = &self.placement {
            ordering::validate_marker(marker)?;
        }
        Ok(())
    }
}

/// New order of every session in a phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReorderSessions {
    pub phase_id: u64,
    /// Session ids in their new order; position = index
    pub session_ids: Vec<u64>,
}

/// Complete nested plan content, used by full-plan rewrites and imports.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanDraft {
    pub phases: Vec<PhaseDraft>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PhaseDraft {
    pub name: String,
    pub notes: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub sessions: Vec<SessionDraft>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionDraft {
    pub name: String,
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub exercises: Vec<ExerciseDraft>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExerciseDraft {
    pub exercise_id: u64,
    pub exercise_name: String,
    pub sets: PrescriptionRange,
    pub reps: PrescriptionRange,
    pub rest_seconds: PrescriptionRange,
    pub customizations: Option<String>,
}

impl PlanDraft {
    /// Checks names, ranges and the single-active-phase rule.
    pub fn validate(&self) -> Result<()> {
        let active = self.phases.iter().filter(|p| p.is_active).count();
        if active > 1 {
            return Err(SpotterError::invalid_input("phases").with_reason(format!(
                "At most one phase may be active, draft marks {active}"
            )));
        }
        self.phases.iter().try_for_each(PhaseDraft::validate)
    }
}

impl PhaseDraft {
    /// Checks the names and ranges of the phase and everything below it.
    pub fn validate(&self) -> Result<()> {
        require_name("phase.name", &self.name)?;
        for session in &self.sessions {
            require_name("session.name", &session.name)?;
            for exercise in &session.exercises {
                require_name("exercise.exercise_name", &exercise.exercise_name)?;
                exercise.sets.validate("exercise.sets")?;
                exercise.reps.validate("exercise.reps")?;
                exercise.rest_seconds.validate("exercise.rest_seconds")?;
            }
        }
        Ok(())
    }
}

/// Snapshot of a stored phase tree, in stored order.
impl From<&Phase> for PhaseDraft {
    fn from(phase: &Phase) -> Self {
        Self {
            name: phase.name.clone(),
            notes: phase.notes.clone(),
            is_active: phase.is_active,
            sessions: phase.sessions.iter().map(SessionDraft::from).collect(),
        }
    }
}

impl From<&Session> for SessionDraft {
    fn from(session: &Session) -> Self {
        Self {
            name: session.name.clone(),
            duration_minutes: session.duration_minutes,
            exercises: session.exercises.iter().map(ExerciseDraft::from).collect(),
        }
    }
}

impl From<&PlanExercise> for ExerciseDraft {
    fn from(exercise: &PlanExercise) -> Self {
        Self {
            exercise_id: exercise.exercise_id,
            exercise_name: exercise.exercise_name.clone(),
            sets: exercise.sets,
            reps: exercise.reps,
            rest_seconds: exercise.rest_seconds,
            customizations: exercise.customizations.clone(),
        }
    }
}

/// Parameters for starting (creating) a workout session log.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StartSessionLog {
    /// Client-chosen identifier; repeating it returns the existing log
    pub client_ref: String,
    pub user_id: u64,
    pub session_name: String,
}

impl StartSessionLog {
    pub fn validate(&self) -> Result<()> {
        require_name("client_ref", &self.client_ref)?;
        require_name("session_name", &self.session_name)
    }
}

/// Parameters for logging one set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LogSet {
    pub log_id: u64,
    /// Client-chosen identifier; repeating it returns the existing set
    pub client_ref: String,
    pub exercise_name: String,
    pub set_number: u32,
    #[serde(default)]
    pub values: SetValues,
    /// Explicit marker; defaults to after the last set of the log
    pub order_marker: Option<String>,
}

impl LogSet {
    pub fn validate(&self) -> Result<()> {
        require_name("client_ref", &self.client_ref)?;
        require_name("exercise_name", &self.exercise_name)?;
        validate_set_values(&self.values)?;
        if let Some(marker) = &self.order_marker {
            ordering::validate_marker(marker)?;
        }
        Ok(())
    }
}

/// Rejects weights that cannot be stored meaningfully.
pub fn validate_set_values(values: &SetValues) -> Result<()> {
    if let Some(weight) = values.weight {
        if !weight.is_finite() || weight < 0.0 {
            return Err(SpotterError::invalid_input("weight")
                .with_reason(format!("Weight must be a non-negative number, got {weight}")));
        }
    }
    Ok(())
}
