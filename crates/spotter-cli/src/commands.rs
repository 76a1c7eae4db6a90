//! Command handlers: call the planner, render the result.
//!
//! Mutations print their [`MutationOutcome`] (as markdown or JSON) and turn
//! a failed outcome into an error so the process exits non-zero.

use std::{collections::HashMap, fmt::Display, fs, path::Path, sync::Arc};

use anyhow::{bail, Context, Result};
use jiff::Timestamp;
use log::{debug, info};
use serde::Serialize;
use spotter_core::{
    display::{DeleteResult, JobTable, OutcomeReport, PlanList, StatusMessage},
    error::Entity,
    params::{LogSet, PlanDraft, SaveExercise},
    queue::{message::NotificationData, worker::drain, JobStatus, PlanJobHandler},
    InMemoryJobQueue, MutationOutcome, Planner, SetValues, SpotterError, TrackerConfig,
    WorkoutTracker,
};

use crate::{
    cli::{
        ExerciseCommands, ImportPlanArgs, LogCommands, PhaseCommands, PlanCommands,
        QueueCommands, SessionCommands, SetSpec, StartLogArgs,
    },
    renderer::TerminalRenderer,
};

pub struct Cli {
    planner: Planner,
    renderer: TerminalRenderer,
    queue: Option<Arc<InMemoryJobQueue>>,
}

fn client_ref(prefix: &str) -> String {
    format!("{prefix}-{}", Timestamp::now())
}

fn read_draft(path: &Path) -> Result<PlanDraft> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} is not a valid plan draft", path.display()))
}

impl Cli {
    pub fn new(
        planner: Planner,
        renderer: TerminalRenderer,
        queue: Option<Arc<InMemoryJobQueue>>,
    ) -> Self {
        Self {
            planner,
            renderer,
            queue,
        }
    }

    fn report<T: Serialize + Display>(
        &self,
        noun: &str,
        outcome: &MutationOutcome<T>,
    ) -> Result<()> {
        self.renderer.show(outcome, OutcomeReport::new(noun, outcome))?;
        Self::ensure_saved(noun, outcome)
    }

    fn report_delete<T: Serialize + Clone>(
        &self,
        noun: &'static str,
        outcome: &MutationOutcome<T>,
        describe: impl FnOnce(&T) -> (u64, String),
    ) -> Result<()> {
        match (&outcome.value, outcome.success) {
            (Some(value), true) => {
                let (id, name) = describe(value);
                self.renderer.show(outcome, DeleteResult { noun, id, name })?;
            }
            _ => {
                let headline = outcome.clone().map(|_| String::new());
                self.renderer
                    .show(outcome, OutcomeReport::new(noun, &headline))?;
            }
        }
        Self::ensure_saved(noun, outcome)
    }

    fn ensure_saved<T>(noun: &str, outcome: &MutationOutcome<T>) -> Result<()> {
        if outcome.success {
            return Ok(());
        }
        if outcome.conflict {
            bail!("The plan changed since your token was issued; {noun} not saved");
        }
        bail!("{noun} not saved")
    }

    // ========================================================================
    // Plans
    // ========================================================================

    pub async fn handle_plan_command(&self, command: PlanCommands) -> Result<()> {
        match command {
            PlanCommands::Create(args) => {
                let outcome = self.planner.create_plan(&args.into()).await;
                self.report("plan", &outcome)
            }
            PlanCommands::List(args) => self.list_plans(args.client).await,
            PlanCommands::Show(args) => {
                let plan = self
                    .planner
                    .get_plan(args.id)
                    .await?
                    .ok_or_else(|| SpotterError::not_found(Entity::Plan, args.id))?;
                self.renderer.show(&plan, &plan)
            }
            PlanCommands::Stamp(args) => {
                let stamp = self.planner.plan_stamp(args.id).await?;
                self.renderer.show(&stamp, format!("`{stamp}`\n"))
            }
            PlanCommands::Import(args) => self.import_plan(args).await,
        }
    }

    pub async fn list_plans(&self, client_id: Option<u64>) -> Result<()> {
        let plans = self.planner.list_plans(client_id).await?;
        self.renderer.show(&plans, PlanList(&plans))
    }

    async fn import_plan(&self, args: ImportPlanArgs) -> Result<()> {
        let draft = read_draft(&args.file)?;
        let outcome = self
            .planner
            .replace_plan(args.plan_id, &draft, args.token.token)
            .await;
        self.report("plan", &outcome)
    }

    // ========================================================================
    // Phases
    // ========================================================================

    pub async fn handle_phase_command(&self, command: PhaseCommands) -> Result<()> {
        match command {
            PhaseCommands::Add(args) => {
                let outcome = self
                    .planner
                    .create_phase(args.plan_id, &(&args).into(), args.token.token)
                    .await;
                self.report("phase", &outcome)
            }
            PhaseCommands::Show(args) => {
                let phase = self
                    .planner
                    .get_phase(args.id)
                    .await?
                    .ok_or_else(|| SpotterError::not_found(Entity::Phase, args.id))?;
                self.renderer.show(&phase, &phase)
            }
            PhaseCommands::Update(args) => {
                let outcome = self
                    .planner
                    .update_phase(args.id, &(&args).into(), args.token.token)
                    .await;
                self.report("phase", &outcome)
            }
            PhaseCommands::Delete(args) => {
                let outcome = self.planner.delete_phase(args.id, args.token.token).await;
                self.report_delete("phase", &outcome, |p| (p.id, p.name.clone()))
            }
            PhaseCommands::Duplicate(args) => {
                let outcome = self
                    .planner
                    .duplicate_phase(args.id, args.token.token)
                    .await;
                self.report("phase", &outcome)
            }
            PhaseCommands::Activate(args) => {
                let outcome = self.planner.activate_phase(args.id, args.token.token).await;
                self.report("phase", &outcome)
            }
            PhaseCommands::Deactivate(args) => {
                let outcome = self
                    .planner
                    .deactivate_phase(args.id, args.token.token)
                    .await;
                self.report("phase", &outcome)
            }
        }
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    pub async fn handle_session_command(&self, command: SessionCommands) -> Result<()> {
        match command {
            SessionCommands::Add(args) => {
                let outcome = self
                    .planner
                    .create_session(args.phase_id, &(&args).into(), args.token.token)
                    .await;
                self.report("session", &outcome)
            }
            SessionCommands::Show(args) => {
                let session = self
                    .planner
                    .get_session(args.id)
                    .await?
                    .ok_or_else(|| SpotterError::not_found(Entity::Session, args.id))?;
                self.renderer.show(&session, &session)
            }
            SessionCommands::Update(args) => {
                let outcome = self
                    .planner
                    .update_session(args.id, &(&args).into(), args.token.token)
                    .await;
                self.report("session", &outcome)
            }
            SessionCommands::Delete(args) => {
                let outcome = self
                    .planner
                    .delete_session(args.id, args.token.token)
                    .await;
                self.report_delete("session", &outcome, |s| (s.id, s.name.clone()))
            }
            SessionCommands::Duplicate(args) => {
                let outcome = self
                    .planner
                    .duplicate_session(args.id, args.token.token)
                    .await;
                self.report("session", &outcome)
            }
            SessionCommands::Reorder(args) => {
                let outcome = self
                    .planner
                    .reorder_sessions(&(&args).into(), args.token.token)
                    .await;
                let listed = outcome.clone().map(|sessions| {
                    sessions
                        .iter()
                        .map(ToString::to_string)
                        .collect::<String>()
                });
                self.renderer
                    .show(&outcome, OutcomeReport::new("session order", &listed))?;
                Self::ensure_saved("session order", &outcome)
            }
        }
    }

    // ========================================================================
    // Plan exercises
    // ========================================================================

    pub async fn handle_exercise_command(&self, command: ExerciseCommands) -> Result<()> {
        match command {
            ExerciseCommands::Add(args) => {
                let save = SaveExercise {
                    id: None,
                    session_id: args.session_id,
                    exercise_id: args.exercise_id,
                    exercise_name: args.name.clone(),
                    sets: args.sets,
                    reps: args.reps,
                    rest_seconds: args.rest,
                    customizations: args.customizations.clone(),
                    placement: args.placement(),
                };
                let outcome = self.planner.save_plan_exercise(&save, args.token.token).await;
                self.report("exercise", &outcome)
            }
            ExerciseCommands::Show(args) => {
                let exercise = self
                    .planner
                    .get_plan_exercise(args.id)
                    .await?
                    .ok_or_else(|| SpotterError::not_found(Entity::PlanExercise, args.id))?;
                self.renderer.show(&exercise, &exercise)
            }
            ExerciseCommands::Edit(args) => {
                let current = self
                    .planner
                    .get_plan_exercise(args.id)
                    .await?
                    .ok_or_else(|| SpotterError::not_found(Entity::PlanExercise, args.id))?;
                // Default placement keeps the stored marker on edits.
                let save = SaveExercise {
                    id: Some(current.id),
                    session_id: current.session_id,
                    exercise_id: current.exercise_id,
                    exercise_name: current.exercise_name,
                    sets: args.sets.unwrap_or(current.sets),
                    reps: args.reps.unwrap_or(current.reps),
                    rest_seconds: args.rest.unwrap_or(current.rest_seconds),
                    customizations: args.customizations.or(current.customizations),
                    placement: Default::default(),
                };
                let outcome = self.planner.save_plan_exercise(&save, args.token.token).await;
                self.report("exercise", &outcome)
            }
            ExerciseCommands::Delete(args) => {
                let outcome = self
                    .planner
                    .delete_plan_exercise(args.id, args.token.token)
                    .await;
                self.report_delete("exercise", &outcome, |e| (e.id, e.exercise_name.clone()))
            }
        }
    }

    // ========================================================================
    // Workout logs
    // ========================================================================

    pub async fn handle_log_command(&self, command: LogCommands) -> Result<()> {
        match command {
            LogCommands::Start(args) => {
                let log = self
                    .planner
                    .create_session_log(&args.into_params(client_ref("log")))
                    .await?;
                self.renderer.show(&log, &log)
            }
            LogCommands::Record(args) => self.record_workout(args.start, &args.sets).await,
            LogCommands::Show(args) => {
                let log = self
                    .planner
                    .get_session_log(args.id)
                    .await?
                    .ok_or_else(|| SpotterError::not_found(Entity::SessionLog, args.id))?;
                self.renderer.show(&log, &log)
            }
            LogCommands::AddSet(args) => {
                let log = self
                    .planner
                    .get_session_log(args.log_id)
                    .await?
                    .ok_or_else(|| SpotterError::not_found(Entity::SessionLog, args.log_id))?;
                let set_number = log
                    .details
                    .iter()
                    .filter(|d| d.exercise_name == args.set.exercise_name)
                    .count() as u32
                    + 1;
                let detail = self
                    .planner
                    .log_set(&LogSet {
                        log_id: log.id,
                        client_ref: args.client_ref.unwrap_or_else(|| client_ref("set")),
                        exercise_name: args.set.exercise_name,
                        set_number,
                        values: SetValues {
                            notes: args.notes,
                            ..args.set.values
                        },
                        order_marker: None,
                    })
                    .await?;
                self.renderer.show(&detail, &detail)
            }
            LogCommands::UpdateSet(args) => {
                let detail = self
                    .planner
                    .update_set(args.detail_id, &(&args).into())
                    .await?;
                self.renderer.show(&detail, &detail)
            }
            LogCommands::DeleteSet(args) => {
                let detail = self.planner.delete_set(args.id).await?;
                self.renderer.show(
                    &detail,
                    DeleteResult {
                        noun: "set",
                        id: detail.id,
                        name: detail.exercise_name.clone(),
                    },
                )
            }
            LogCommands::End(args) => {
                let log = self.planner.end_session_log(args.id).await?;
                self.renderer.show(&log, &log)
            }
            LogCommands::Delete(args) => {
                let log = self.planner.delete_empty_session_log(args.id).await?;
                self.renderer.show(
                    &log,
                    DeleteResult {
                        noun: "log",
                        id: log.id,
                        name: log.session_name.clone(),
                    },
                )
            }
            LogCommands::Abandon(args) => {
                let log = self.planner.abandon_session_log(args.id).await?;
                self.renderer.show(
                    &log,
                    StatusMessage::success(format!("Abandoned log {}", log.id)),
                )
            }
        }
    }

    /// Runs a whole workout through the tracker's save pipeline.
    async fn record_workout(&self, start: StartLogArgs, sets: &[SetSpec]) -> Result<()> {
        let params = start.into_params(client_ref("log"));
        let tracker = WorkoutTracker::start(&self.planner, &params, TrackerConfig::default())
            .await
            .context("Failed to start workout log")?;

        // A resumed log continues numbering after its stored sets.
        let mut numbers: HashMap<String, u32> = HashMap::new();
        for detail in &tracker.log().details {
            let last = numbers.entry(detail.exercise_name.clone()).or_insert(0);
            *last = (*last).max(detail.set_number);
        }

        for set in sets {
            let number = numbers.entry(set.exercise_name.clone()).or_insert(0);
            *number += 1;
            tracker
                .add_set(&set.exercise_name, *number, set.values.clone())
                .await?;
        }
        debug!("Queued {} sets for log {}", sets.len(), tracker.log_id());

        let log = tracker.finish().await?;
        if log.details.len() < sets.len() {
            self.renderer.show(&log, &log)?;
            bail!(
                "Only {} of {} sets were saved",
                log.details.len(),
                sets.len()
            );
        }
        self.renderer.show(&log, &log)
    }

    // ========================================================================
    // Background jobs
    // ========================================================================

    pub async fn handle_queue_command(&self, command: QueueCommands) -> Result<()> {
        let Some(queue) = self.queue.clone() else {
            bail!("No job queue configured");
        };
        let (job, plan_id, notify) = match command {
            QueueCommands::Import(args) => {
                let draft = read_draft(&args.import.file)?;
                let plan_id = args.import.plan_id;
                let job = self
                    .planner
                    .submit_plan_import(plan_id, &draft, args.import.token.token, None)
                    .await?;
                (job, plan_id, args.notify)
            }
            QueueCommands::DuplicatePhase(args) => {
                let phase = self
                    .planner
                    .get_phase(args.target.id)
                    .await?
                    .ok_or_else(|| SpotterError::not_found(Entity::Phase, args.target.id))?;
                let job = self
                    .planner
                    .submit_phase_duplicate(phase.id, args.target.token.token, None)
                    .await?;
                (job, phase.plan_id, args.notify)
            }
        };
        info!("Submitted job {job}");

        let mut submitted = vec![job];
        if let Some(text) = notify {
            let plan = self
                .planner
                .get_plan(plan_id)
                .await?
                .ok_or_else(|| SpotterError::not_found(Entity::Plan, plan_id))?;
            let notification = NotificationData {
                client_id: plan.client_id,
                plan_id: Some(plan_id),
                text,
            };
            if let Some(id) = self
                .planner
                .submit_notification_after(job, &notification)
                .await?
            {
                submitted.push(id);
            }
        }

        self.run_until_idle(&queue).await;

        let snapshots = queue.snapshots().await;
        self.renderer.show(&snapshots, JobTable(&snapshots))?;
        let failed = snapshots
            .iter()
            .filter(|s| submitted.contains(&s.id) && s.status == JobStatus::Failed)
            .count();
        if failed > 0 {
            bail!("{failed} job(s) failed");
        }
        Ok(())
    }

    /// Drains the queue, waiting out retry backoff until nothing is queued.
    async fn run_until_idle(&self, queue: &InMemoryJobQueue) {
        let handler = PlanJobHandler::new(self.planner.clone());
        loop {
            let attempts = drain(queue, &handler).await;
            debug!("Worker pass made {attempts} attempts");
            match queue.next_run_at().await {
                Some(at) => tokio::time::sleep_until(at).await,
                None => break,
            }
        }
    }
}
