//! Command-line argument definitions.
//!
//! Each command has a clap wrapper struct that converts into the matching
//! core parameter type, so `spotter_core::params` stays free of clap
//! attributes:
//!
//! ```text
//! User Input → CLI Args (clap) → Core Params → Planner
//! ```
//!
//! Structural commands accept `--token <stamp>`: the plan version the user
//! last saw. When it is given and the plan has moved on, the command reports
//! a conflict instead of applying the change.

use std::{path::PathBuf, str::FromStr};

use clap::{Args, Subcommand};
use spotter_core::{
    params::{
        CreatePlan, ExercisePlacement, PhaseInput, PhaseUpdate, ReorderSessions, SessionInput,
        SessionUpdate, StartSessionLog,
    },
    PrescriptionRange, SetValues, VersionStamp,
};

/// Parses `8-12` or `8` into a prescription range.
pub fn parse_range(s: &str) -> Result<PrescriptionRange, String> {
    let parse = |part: &str| {
        part.trim()
            .parse::<u32>()
            .map_err(|_| format!("'{part}' is not a whole number"))
    };
    match s.split_once('-') {
        Some((min, max)) => {
            PrescriptionRange::new(parse(min)?, parse(max)?).map_err(|e| e.to_string())
        }
        None => Ok(PrescriptionRange::exactly(parse(s)?)),
    }
}

/// Parses `REPS@WEIGHT`, `REPS` or `@WEIGHT` into set values.
pub fn parse_values(s: &str) -> Result<SetValues, String> {
    let (reps, weight) = match s.split_once('@') {
        Some((reps, weight)) => (reps.trim(), Some(weight.trim())),
        None => (s.trim(), None),
    };
    let reps = if reps.is_empty() {
        None
    } else {
        Some(
            reps.parse::<u32>()
                .map_err(|_| format!("'{reps}' is not a valid rep count"))?,
        )
    };
    let weight = match weight {
        Some(w) => Some(
            w.parse::<f64>()
                .map_err(|_| format!("'{w}' is not a valid weight"))?,
        ),
        None => None,
    };
    if reps.is_none() && weight.is_none() {
        return Err("Expected REPS, REPS@WEIGHT or @WEIGHT".to_string());
    }
    Ok(SetValues {
        reps,
        weight,
        notes: None,
    })
}

/// One performed set on the command line: `Squat:5@100`.
#[derive(Debug, Clone, PartialEq)]
pub struct SetSpec {
    pub exercise_name: String,
    pub values: SetValues,
}

impl FromStr for SetSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, values) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("'{s}' should look like EXERCISE:REPS@WEIGHT"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("'{s}' is missing the exercise name"));
        }
        Ok(Self {
            exercise_name: name.to_string(),
            values: parse_values(values)?,
        })
    }
}

/// Plan version the change is based on.
#[derive(Args, Clone, Copy)]
pub struct TokenArg {
    /// Version stamp last seen for the plan; stale stamps are rejected
    #[arg(long)]
    pub token: Option<VersionStamp>,
}

/// Identifies one row, optionally carrying the plan version.
#[derive(Args)]
pub struct TargetArgs {
    /// Unique identifier of the target
    pub id: u64,
    #[command(flatten)]
    pub token: TokenArg,
}

/// Identifies one row for read-only commands.
#[derive(Args)]
pub struct ShowArgs {
    /// Unique identifier to show
    pub id: u64,
}

// ============================================================================
// Plans
// ============================================================================

/// Create a new plan for a client
#[derive(Args)]
pub struct CreatePlanArgs {
    /// Client the plan is written for
    pub client_id: u64,
    /// Title of the plan
    pub title: String,
}

impl From<CreatePlanArgs> for CreatePlan {
    fn from(val: CreatePlanArgs) -> Self {
        CreatePlan {
            client_id: val.client_id,
            title: val.title,
        }
    }
}

/// List plans
#[derive(Args)]
pub struct ListPlansArgs {
    /// Only show plans of this client
    #[arg(short, long)]
    pub client: Option<u64>,
}

/// Replace a plan's content with a JSON plan draft
#[derive(Args)]
pub struct ImportPlanArgs {
    /// Plan to overwrite
    pub plan_id: u64,
    /// JSON file with `{"phases": [...]}`
    pub file: PathBuf,
    #[command(flatten)]
    pub token: TokenArg,
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Create a new plan
    #[command(alias = "c")]
    Create(CreatePlanArgs),
    /// List plans
    #[command(aliases = ["l", "ls"])]
    List(ListPlansArgs),
    /// Show a plan with its phases, sessions and exercises
    #[command(alias = "s")]
    Show(ShowArgs),
    /// Print the current version stamp of a plan
    Stamp(ShowArgs),
    /// Replace a plan's content from a JSON draft
    #[command(alias = "i")]
    Import(ImportPlanArgs),
}

// ============================================================================
// Phases
// ============================================================================

/// Add a phase to the end of a plan
#[derive(Args)]
pub struct AddPhaseArgs {
    /// Plan to add the phase to
    pub plan_id: u64,
    /// Name of the phase
    pub name: String,
    /// Optional notes for the phase
    #[arg(short, long)]
    pub notes: Option<String>,
    #[command(flatten)]
    pub token: TokenArg,
}

impl From<&AddPhaseArgs> for PhaseInput {
    fn from(val: &AddPhaseArgs) -> Self {
        PhaseInput {
            name: val.name.clone(),
            notes: val.notes.clone(),
        }
    }
}

/// Rename a phase or change its notes
#[derive(Args)]
pub struct UpdatePhaseArgs {
    /// Phase to update
    pub id: u64,
    /// New name
    #[arg(long)]
    pub name: Option<String>,
    /// New notes
    #[arg(short, long)]
    pub notes: Option<String>,
    /// Remove the notes
    #[arg(long, conflicts_with = "notes")]
    pub clear_notes: bool,
    #[command(flatten)]
    pub token: TokenArg,
}

impl From<&UpdatePhaseArgs> for PhaseUpdate {
    fn from(val: &UpdatePhaseArgs) -> Self {
        PhaseUpdate {
            name: val.name.clone(),
            notes: if val.clear_notes {
                Some(None)
            } else {
                val.notes.clone().map(Some)
            },
        }
    }
}

#[derive(Subcommand)]
pub enum PhaseCommands {
    /// Add a phase to a plan
    #[command(alias = "a")]
    Add(AddPhaseArgs),
    /// Show a phase
    #[command(alias = "s")]
    Show(ShowArgs),
    /// Update a phase
    #[command(alias = "u")]
    Update(UpdatePhaseArgs),
    /// Delete a phase with its sessions
    #[command(aliases = ["d", "rm"])]
    Delete(TargetArgs),
    /// Copy a phase to the end of its plan
    #[command(alias = "dup")]
    Duplicate(TargetArgs),
    /// Make a phase the active one
    Activate(TargetArgs),
    /// Clear the active flag of a phase
    Deactivate(TargetArgs),
}

// ============================================================================
// Sessions
// ============================================================================

/// Add a session to the end of a phase
#[derive(Args)]
pub struct AddSessionArgs {
    /// Phase to add the session to
    pub phase_id: u64,
    /// Name of the session
    pub name: String,
    /// Planned duration in minutes
    #[arg(short, long)]
    pub duration: Option<u32>,
    #[command(flatten)]
    pub token: TokenArg,
}

impl From<&AddSessionArgs> for SessionInput {
    fn from(val: &AddSessionArgs) -> Self {
        SessionInput {
            name: val.name.clone(),
            duration_minutes: val.duration,
        }
    }
}

/// Rename a session or change its duration
#[derive(Args)]
pub struct UpdateSessionArgs {
    /// Session to update
    pub id: u64,
    /// New name
    #[arg(long)]
    pub name: Option<String>,
    /// New duration in minutes
    #[arg(short, long)]
    pub duration: Option<u32>,
    /// Remove the planned duration
    #[arg(long, conflicts_with = "duration")]
    pub clear_duration: bool,
    #[command(flatten)]
    pub token: TokenArg,
}

impl From<&UpdateSessionArgs> for SessionUpdate {
    fn from(val: &UpdateSessionArgs) -> Self {
        SessionUpdate {
            name: val.name.clone(),
            duration_minutes: if val.clear_duration {
                Some(None)
            } else {
                val.duration.map(Some)
            },
        }
    }
}

/// Put every session of a phase in a new order
#[derive(Args)]
pub struct ReorderSessionsArgs {
    /// Phase whose sessions are reordered
    pub phase_id: u64,
    /// All session ids of the phase in their new order, comma-separated
    #[arg(value_delimiter = ',', required = true)]
    pub session_ids: Vec<u64>,
    #[command(flatten)]
    pub token: TokenArg,
}

impl From<&ReorderSessionsArgs> for ReorderSessions {
    fn from(val: &ReorderSessionsArgs) -> Self {
        ReorderSessions {
            phase_id: val.phase_id,
            session_ids: val.session_ids.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum SessionCommands {
    /// Add a session to a phase
    #[command(alias = "a")]
    Add(AddSessionArgs),
    /// Show a session with its exercises
    #[command(alias = "s")]
    Show(ShowArgs),
    /// Update a session
    #[command(alias = "u")]
    Update(UpdateSessionArgs),
    /// Delete a session with its exercises
    #[command(aliases = ["d", "rm"])]
    Delete(TargetArgs),
    /// Copy a session to the end of its phase
    #[command(alias = "dup")]
    Duplicate(TargetArgs),
    /// Reorder the sessions of a phase
    #[command(alias = "r")]
    Reorder(ReorderSessionsArgs),
}

// ============================================================================
// Plan exercises
// ============================================================================

/// Prescribe an exercise in a session
#[derive(Args)]
pub struct AddExerciseArgs {
    /// Session to add the exercise to
    pub session_id: u64,
    /// Catalog id of the exercise
    pub exercise_id: u64,
    /// Catalog name of the exercise
    pub name: String,
    /// Sets, e.g. `3` or `3-4`
    #[arg(long, value_parser = parse_range, default_value = "3")]
    pub sets: PrescriptionRange,
    /// Reps, e.g. `8` or `8-12`
    #[arg(long, value_parser = parse_range, default_value = "10")]
    pub reps: PrescriptionRange,
    /// Rest in seconds, e.g. `90` or `60-90`
    #[arg(long, value_parser = parse_range, default_value = "90")]
    pub rest: PrescriptionRange,
    /// Tempo, grip or other cues
    #[arg(long)]
    pub customizations: Option<String>,
    /// Insert after the exercise with this order marker
    #[arg(long)]
    pub after: Option<String>,
    /// Insert before the exercise with this order marker
    #[arg(long)]
    pub before: Option<String>,
    #[command(flatten)]
    pub token: TokenArg,
}

impl AddExerciseArgs {
    pub fn placement(&self) -> ExercisePlacement {
        if self.after.is_none() && self.before.is_none() {
            return ExercisePlacement::End;
        }
        ExercisePlacement::Between {
            before: self.after.clone(),
            after: self.before.clone(),
        }
    }
}

/// Change the prescription of an exercise
#[derive(Args)]
pub struct EditExerciseArgs {
    /// Plan exercise to edit
    pub id: u64,
    /// New sets
    #[arg(long, value_parser = parse_range)]
    pub sets: Option<PrescriptionRange>,
    /// New reps
    #[arg(long, value_parser = parse_range)]
    pub reps: Option<PrescriptionRange>,
    /// New rest in seconds
    #[arg(long, value_parser = parse_range)]
    pub rest: Option<PrescriptionRange>,
    /// New cues
    #[arg(long)]
    pub customizations: Option<String>,
    #[command(flatten)]
    pub token: TokenArg,
}

#[derive(Subcommand)]
pub enum ExerciseCommands {
    /// Prescribe an exercise in a session
    #[command(alias = "a")]
    Add(AddExerciseArgs),
    /// Show a plan exercise
    #[command(alias = "s")]
    Show(ShowArgs),
    /// Edit an exercise prescription
    #[command(alias = "e")]
    Edit(EditExerciseArgs),
    /// Remove an exercise from its session
    #[command(aliases = ["d", "rm"])]
    Delete(TargetArgs),
}

// ============================================================================
// Workout logs
// ============================================================================

/// Start (or resume) a workout log
#[derive(Args)]
pub struct StartLogArgs {
    /// User performing the workout
    pub user_id: u64,
    /// Name of the session being performed
    pub session_name: String,
    /// Client reference; repeating it resumes the same log
    #[arg(long = "ref")]
    pub client_ref: Option<String>,
}

impl StartLogArgs {
    pub fn into_params(self, default_ref: String) -> StartSessionLog {
        StartSessionLog {
            client_ref: self.client_ref.unwrap_or(default_ref),
            user_id: self.user_id,
            session_name: self.session_name,
        }
    }
}

/// Log a whole workout in one go through the save pipeline
#[derive(Args)]
pub struct RecordArgs {
    #[command(flatten)]
    pub start: StartLogArgs,
    /// Sets as EXERCISE:REPS@WEIGHT, e.g. `Squat:5@100`
    #[arg(required = true)]
    pub sets: Vec<SetSpec>,
}

/// Log one set into an active log
#[derive(Args)]
pub struct AddSetArgs {
    /// Log to add the set to
    pub log_id: u64,
    /// Set as EXERCISE:REPS@WEIGHT
    pub set: SetSpec,
    /// Free-text notes
    #[arg(short, long)]
    pub notes: Option<String>,
    /// Client reference; repeating it returns the stored set
    #[arg(long = "ref")]
    pub client_ref: Option<String>,
}

/// Overwrite the values of a logged set
#[derive(Args)]
pub struct UpdateSetArgs {
    /// Logged set to update
    pub detail_id: u64,
    /// New values as REPS@WEIGHT, REPS or @WEIGHT
    #[arg(value_parser = parse_values)]
    pub values: SetValues,
    /// Free-text notes
    #[arg(short, long)]
    pub notes: Option<String>,
}

impl From<&UpdateSetArgs> for SetValues {
    fn from(val: &UpdateSetArgs) -> Self {
        SetValues {
            notes: val.notes.clone(),
            ..val.values.clone()
        }
    }
}

#[derive(Subcommand)]
pub enum LogCommands {
    /// Start or resume a workout log
    Start(StartLogArgs),
    /// Record a workout: start, log every set, finish
    #[command(alias = "r")]
    Record(RecordArgs),
    /// Show a log with its sets
    #[command(alias = "s")]
    Show(ShowArgs),
    /// Log one set
    #[command(alias = "a")]
    AddSet(AddSetArgs),
    /// Update a logged set
    UpdateSet(UpdateSetArgs),
    /// Delete a logged set
    DeleteSet(ShowArgs),
    /// End an active log
    End(ShowArgs),
    /// Delete a log that has no performed reps
    #[command(aliases = ["d", "rm"])]
    Delete(ShowArgs),
    /// Discard an active log
    Abandon(ShowArgs),
}

// ============================================================================
// Background jobs
// ============================================================================

/// Queue a plan import and run it
#[derive(Args)]
pub struct QueueImportArgs {
    #[command(flatten)]
    pub import: ImportPlanArgs,
    /// Notify the client with this text once the import is applied
    #[arg(long)]
    pub notify: Option<String>,
}

/// Queue a phase duplication and run it
#[derive(Args)]
pub struct QueueDuplicateArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Notify the client with this text once the copy exists
    #[arg(long)]
    pub notify: Option<String>,
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// Submit a plan import as a background job
    Import(QueueImportArgs),
    /// Submit a phase duplication as a background job
    DuplicatePhase(QueueDuplicateArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("8-12"), Ok(PrescriptionRange { min: 8, max: 12 }));
        assert_eq!(parse_range("3"), Ok(PrescriptionRange::exactly(3)));
        assert!(parse_range("12-8").is_err());
        assert!(parse_range("many").is_err());
    }

    #[test]
    fn test_parse_values() {
        let values = parse_values("5@102.5").unwrap();
        assert_eq!(values.reps, Some(5));
        assert_eq!(values.weight, Some(102.5));

        assert_eq!(parse_values("8").unwrap().weight, None);
        assert_eq!(parse_values("@20").unwrap().reps, None);
        assert!(parse_values("").is_err());
        assert!(parse_values("five@20").is_err());
    }

    #[test]
    fn test_set_spec() {
        let spec: SetSpec = "Romanian Deadlift:8@60".parse().unwrap();
        assert_eq!(spec.exercise_name, "Romanian Deadlift");
        assert_eq!(spec.values.reps, Some(8));

        assert!("Squat".parse::<SetSpec>().is_err());
        assert!(":5@100".parse::<SetSpec>().is_err());
    }

    #[test]
    fn test_placement_between_markers() {
        let args = AddExerciseArgs {
            session_id: 1,
            exercise_id: 2,
            name: "Row".to_string(),
            sets: PrescriptionRange::exactly(3),
            reps: PrescriptionRange::exactly(10),
            rest: PrescriptionRange::exactly(90),
            customizations: None,
            after: Some("a0".to_string()),
            before: None,
            token: TokenArg { token: None },
        };
        assert_eq!(
            args.placement(),
            ExercisePlacement::Between {
                before: Some("a0".to_string()),
                after: None,
            }
        );
    }
}
