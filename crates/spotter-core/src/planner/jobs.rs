//! Background submissions from the Planner.

use serde::Serialize;

use super::Planner;
use crate::{
    error::{Entity, Result, SpotterError},
    params::{PhaseDraft, PlanDraft},
    queue::{
        message::{NotificationData, PhaseDuplicateData, PlanSaveData, UserActionData},
        JobId, JobOptions, MessageEnvelope, MessageType,
    },
    stamp::VersionStamp,
};

impl Planner {
    /// Submits a prepared envelope with explicit options.
    ///
    /// Critical messages fail with a queue submission error when the queue
    /// refuses them or none is configured. Best-effort messages are logged
    /// and dropped instead, returning `Ok(None)`.
    pub async fn submit_with_options(
        &self,
        message: MessageEnvelope,
        options: JobOptions,
    ) -> Result<Option<JobId>> {
        let message_type = message.message_type;
        match &self.dispatcher {
            Some(dispatcher) => dispatcher.submit(message, options).await,
            None if message_type.is_best_effort() => {
                log::debug!("No job queue configured, dropping {message_type} message");
                Ok(None)
            }
            None => Err(SpotterError::QueueSubmission {
                message_type: message_type.to_string(),
                reason: "No job queue configured".to_string(),
            }),
        }
    }

    /// Submits any catalog message with its default options.
    pub async fn submit<T: Serialize + Sync>(
        &self,
        message_type: MessageType,
        data: &T,
        user_id: Option<u64>,
    ) -> Result<Option<JobId>> {
        let mut message = MessageEnvelope::new(message_type, data)?;
        message.user_id = user_id;
        self.submit_with_options(message, message_type.default_options())
            .await
    }

    async fn submit_critical<T: Serialize + Sync>(
        &self,
        message_type: MessageType,
        data: &T,
        user_id: Option<u64>,
    ) -> Result<JobId> {
        self.submit(message_type, data, user_id)
            .await?
            .ok_or_else(|| SpotterError::QueueSubmission {
                message_type: message_type.to_string(),
                reason: "Message was dropped".to_string(),
            })
    }

    /// Queues a full-plan rewrite (e.g. from an import) as one message.
    pub async fn submit_plan_import(
        &self,
        plan_id: u64,
        draft: &PlanDraft,
        last_known: Option<VersionStamp>,
        user_id: Option<u64>,
    ) -> Result<JobId> {
        draft.validate()?;
        let data = PlanSaveData {
            plan_id,
            last_known,
            draft: draft.clone(),
        };
        self.submit_critical(MessageType::PlanSave, &data, user_id)
            .await
    }

    /// Queues a phase duplication as one message carrying the phase's
    /// sessions and exercises as they are now.
    pub async fn submit_phase_duplicate(
        &self,
        phase_id: u64,
        last_known: Option<VersionStamp>,
        user_id: Option<u64>,
    ) -> Result<JobId> {
        let source = self
            .get_phase(phase_id)
            .await?
            .ok_or_else(|| SpotterError::not_found(Entity::Phase, phase_id))?;
        let mut phase = PhaseDraft::from(&source);
        phase.name = format!("{} (copy)", source.name);
        phase.is_active = false;

        let data = PhaseDuplicateData {
            plan_id: source.plan_id,
            source_phase_id: phase_id,
            last_known,
            phase,
        };
        self.submit_critical(MessageType::PhaseDuplicate, &data, user_id)
            .await
    }

    /// Queues a client notification that runs only after `after` completes.
    ///
    /// Notifications are best effort: a refused submission is logged and
    /// yields `Ok(None)`.
    pub async fn submit_notification_after(
        &self,
        after: JobId,
        notification: &NotificationData,
    ) -> Result<Option<JobId>> {
        let message = MessageEnvelope::new(MessageType::Notification, notification)?;
        let options = MessageType::Notification.default_options().after(after);
        self.submit_with_options(message, options).await
    }

    /// Records an analytics event. Never fails; without a queue it is a no-op.
    pub(crate) async fn record_action(&self, action: &str, plan_id: Option<u64>) {
        if self.dispatcher.is_none() {
            return;
        }
        let data = UserActionData {
            action: action.to_string(),
            plan_id,
            details: serde_json::Value::Null,
        };
        if let Err(e) = self.submit(MessageType::UserAction, &data, None).await {
            log::warn!("Dropping user_action '{action}': {e}");
        }
    }
}
