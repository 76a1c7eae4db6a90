//! Plan and phase operations for the Planner.

use super::Planner;
use crate::{
    db::Stamped,
    error::Result,
    models::{Phase, Plan},
    outcome::MutationOutcome,
    params::{CreatePlan, PhaseDraft, PhaseInput, PhaseUpdate, PlanDraft},
    stamp::VersionStamp,
};

impl Planner {
    /// Creates a plan for a client. There is no prior state, so no token.
    pub async fn create_plan(&self, params: &CreatePlan) -> MutationOutcome<Plan> {
        let params = params.clone();
        self.mutate("plan_create", move |db| {
            let plan = db.create_plan(&params)?;
            Ok(Stamped {
                plan_id: plan.id,
                client_id: plan.client_id,
                updated_at: plan.updated_at,
                value: plan,
            })
        })
        .await
    }

    /// Retrieves a plan with its full tree.
    pub async fn get_plan(&self, plan_id: u64) -> Result<Option<Plan>> {
        self.with_db(move |db| db.get_plan(plan_id)).await
    }

    /// Lists plans without their trees, optionally for one client.
    pub async fn list_plans(&self, client_id: Option<u64>) -> Result<Vec<Plan>> {
        self.with_db(move |db| db.list_plans(client_id)).await
    }

    /// Current version stamp of a plan.
    pub async fn plan_stamp(&self, plan_id: u64) -> Result<VersionStamp> {
        self.with_db(move |db| db.plan_stamp(plan_id)).await
    }

    /// Replaces the entire content of a plan with `draft`.
    pub async fn replace_plan(
        &self,
        plan_id: u64,
        draft: &PlanDraft,
        last_known: Option<VersionStamp>,
    ) -> MutationOutcome<Plan> {
        let draft = draft.clone();
        self.mutate("plan_save", move |db| {
            db.replace_plan(plan_id, &draft, last_known.as_ref())
        })
        .await
    }

    pub async fn get_phase(&self, phase_id: u64) -> Result<Option<Phase>> {
        self.with_db(move |db| db.get_phase(phase_id)).await
    }

    pub async fn create_phase(
        &self,
        plan_id: u64,
        input: &PhaseInput,
        last_known: Option<VersionStamp>,
    ) -> MutationOutcome<Phase> {
        let input = input.clone();
        self.mutate("phase_create", move |db| {
            db.create_phase(plan_id, &input, last_known.as_ref())
        })
        .await
    }

    pub async fn update_phase(
        &self,
        phase_id: u64,
        update: &PhaseUpdate,
        last_known: Option<VersionStamp>,
    ) -> MutationOutcome<Phase> {
        let update = update.clone();
        self.mutate("phase_update", move |db| {
            db.update_phase(phase_id, &update, last_known.as_ref())
        })
        .await
    }

    /// Deletes a phase with everything below it.
    pub async fn delete_phase(
        &self,
        phase_id: u64,
        last_known: Option<VersionStamp>,
    ) -> MutationOutcome<Phase> {
        self.mutate("phase_delete", move |db| {
            db.delete_phase(phase_id, last_known.as_ref())
        })
        .await
    }

    /// Copies a phase (inactive) to the end of its plan.
    pub async fn duplicate_phase(
        &self,
        phase_id: u64,
        last_known: Option<VersionStamp>,
    ) -> MutationOutcome<Phase> {
        self.mutate("phase_duplicate", move |db| {
            db.duplicate_phase(phase_id, last_known.as_ref())
        })
        .await
    }

    /// Appends a phase snapshot (inactive) to the end of a plan.
    pub async fn append_phase(
        &self,
        plan_id: u64,
        draft: &PhaseDraft,
        last_known: Option<VersionStamp>,
    ) -> MutationOutcome<Phase> {
        let draft = draft.clone();
        self.mutate("phase_duplicate", move |db| {
            db.append_phase(plan_id, &draft, last_known.as_ref())
        })
        .await
    }

    /// Makes a phase the single active phase of its plan.
    ///
    /// Of several concurrent activations carrying the same token exactly one
    /// succeeds; the others observe the advanced stamp and report a conflict.
    pub async fn activate_phase(
        &self,
        phase_id: u64,
        last_known: Option<VersionStamp>,
    ) -> MutationOutcome<Phase> {
        self.mutate("phase_activate", move |db| {
            db.activate_phase(phase_id, last_known.as_ref())
        })
        .await
    }

    pub async fn deactivate_phase(
        &self,
        phase_id: u64,
        last_known: Option<VersionStamp>,
    ) -> MutationOutcome<Phase> {
        self.mutate("phase_deactivate", move |db| {
            db.deactivate_phase(phase_id, last_known.as_ref())
        })
        .await
    }
}
