//! Submission policy on top of a [`JobQueue`].

use std::sync::Arc;

use serde::Serialize;

use super::{
    message::{MessageEnvelope, MessageType},
    options::JobOptions,
    JobId, JobQueue,
};
use crate::error::Result;

/// Submits messages on behalf of the planner.
///
/// The message type picks the failure policy: queue failures of critical
/// (structural) messages go back to the caller, failures of best-effort
/// messages (notifications, email, analytics) are logged and swallowed.
#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<dyn JobQueue>,
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }

    /// Enqueues with explicit options.
    ///
    /// Returns `Ok(None)` when a best-effort message was dropped.
    pub async fn submit(
        &self,
        message: MessageEnvelope,
        options: JobOptions,
    ) -> Result<Option<JobId>> {
        let message_type = message.message_type;
        match self.queue.enqueue(message, options).await {
            Ok(id) => {
                log::debug!("Submitted {message_type} message as job {id}");
                Ok(Some(id))
            }
            Err(e) if message_type.is_best_effort() => {
                log::warn!("Dropping {message_type} message: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Builds an envelope for `data` and enqueues it with the message type's
    /// default options.
    pub async fn submit_data<T: Serialize + Sync>(
        &self,
        message_type: MessageType,
        data: &T,
        user_id: Option<u64>,
    ) -> Result<Option<JobId>> {
        let mut message = MessageEnvelope::new(message_type, data)?;
        message.user_id = user_id;
        self.submit(message, message_type.default_options()).await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{error::SpotterError, queue::InMemoryJobQueue};

    struct Refusing;

    #[async_trait]
    impl JobQueue for Refusing {
        async fn enqueue(&self, message: MessageEnvelope, _options: JobOptions) -> Result<JobId> {
            Err(SpotterError::QueueSubmission {
                message_type: message.message_type.to_string(),
                reason: "broker unavailable".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_message_type_decides_failure_policy() {
        let dispatcher = Dispatcher::new(Arc::new(Refusing));

        for message_type in [
            MessageType::UserAction,
            MessageType::Notification,
            MessageType::Email,
        ] {
            let message = MessageEnvelope::new(message_type, &serde_json::json!({})).unwrap();
            assert_eq!(
                dispatcher
                    .submit(message, message_type.default_options())
                    .await
                    .unwrap(),
                None
            );
        }

        let err = dispatcher
            .submit_data(MessageType::PlanSave, &serde_json::json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SpotterError::QueueSubmission { .. }));
    }

    #[tokio::test]
    async fn test_submit_data_uses_default_options() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let dispatcher = Dispatcher::new(queue.clone());
        let id = dispatcher
            .submit_data(MessageType::PlanSave, &serde_json::json!({"plan_id": 1}), Some(4))
            .await
            .unwrap()
            .unwrap();

        let snapshot = queue.snapshot(id).await.unwrap();
        assert_eq!(snapshot.max_attempts, 5);
        assert_eq!(snapshot.message_type, MessageType::PlanSave);
    }
}
