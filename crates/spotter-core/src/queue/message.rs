//! Message catalog and envelope for background jobs.

use std::{collections::BTreeMap, fmt, str::FromStr, time::Duration};

use jiff::Timestamp;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use super::options::{Backoff, JobOptions, Priority};
use crate::{
    error::{Result, SpotterError},
    params::{
        CreatePlan, PhaseDraft, PhaseInput, PhaseUpdate, PlanDraft, SaveExercise, SessionInput,
        SessionUpdate,
    },
    stamp::VersionStamp,
};

/// Closed set of message kinds the queue carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    PlanCreate,
    PhaseCreate,
    PhaseUpdate,
    PhaseDelete,
    PhaseDuplicate,
    PhaseActivate,
    SessionCreate,
    SessionUpdate,
    SessionDelete,
    SessionDuplicate,
    ExerciseSave,
    ExerciseDelete,
    PlanSave,
    Notification,
    Email,
    UserAction,
}

impl MessageType {
    pub const ALL: [MessageType; 16] = [
        MessageType::PlanCreate,
        MessageType::PhaseCreate,
        MessageType::PhaseUpdate,
        MessageType::PhaseDelete,
        MessageType::PhaseDuplicate,
        MessageType::PhaseActivate,
        MessageType::SessionCreate,
        MessageType::SessionUpdate,
        MessageType::SessionDelete,
        MessageType::SessionDuplicate,
        MessageType::ExerciseSave,
        MessageType::ExerciseDelete,
        MessageType::PlanSave,
        MessageType::Notification,
        MessageType::Email,
        MessageType::UserAction,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::PlanCreate => "plan_create",
            MessageType::PhaseCreate => "phase_create",
            MessageType::PhaseUpdate => "phase_update",
            MessageType::PhaseDelete => "phase_delete",
            MessageType::PhaseDuplicate => "phase_duplicate",
            MessageType::PhaseActivate => "phase_activate",
            MessageType::SessionCreate => "session_create",
            MessageType::SessionUpdate => "session_update",
            MessageType::SessionDelete => "session_delete",
            MessageType::SessionDuplicate => "session_duplicate",
            MessageType::ExerciseSave => "exercise_save",
            MessageType::ExerciseDelete => "exercise_delete",
            MessageType::PlanSave => "plan_save",
            MessageType::Notification => "notification",
            MessageType::Email => "email",
            MessageType::UserAction => "user_action",
        }
    }

    /// Messages that change plan structure.
    pub fn is_structural(self) -> bool {
        !matches!(
            self,
            MessageType::Notification | MessageType::Email | MessageType::UserAction
        )
    }

    /// Messages whose loss is tolerated; submission failures are swallowed.
    pub fn is_best_effort(self) -> bool {
        !self.is_structural()
    }

    /// Delivery options used when the submitter does not pick its own.
    pub fn default_options(self) -> JobOptions {
        match self {
            MessageType::PlanSave | MessageType::PhaseDuplicate => JobOptions::default()
                .with_priority(Priority::HIGH)
                .with_attempts(5)
                .with_backoff(Backoff::Exponential {
                    delay: Duration::from_secs(2),
                }),
            t if t.is_structural() => JobOptions::default()
                .with_priority(Priority::HIGH)
                .with_attempts(3)
                .with_backoff(Backoff::Exponential {
                    delay: Duration::from_secs(1),
                }),
            MessageType::Notification => JobOptions::default()
                .with_attempts(3)
                .with_backoff(Backoff::Fixed {
                    delay: Duration::from_secs(5),
                }),
            MessageType::Email => JobOptions::default()
                .with_attempts(5)
                .with_backoff(Backoff::Exponential {
                    delay: Duration::from_secs(30),
                }),
            _ => JobOptions::default().with_priority(Priority::LOW),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = SpotterError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                SpotterError::invalid_input("message_type")
                    .with_reason(format!("Unknown message type '{s}'"))
            })
    }
}

/// Unit of work handed to a [`JobQueue`](super::JobQueue).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Identity used by consumers to drop redeliveries
    pub message_id: Uuid,
    pub message_type: MessageType,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub data: serde_json::Value,
}

impl MessageEnvelope {
    /// Wraps a payload under a fresh message id.
    pub fn new<T: Serialize>(message_type: MessageType, data: &T) -> Result<Self> {
        Ok(Self {
            message_id: Uuid::now_v7(),
            message_type,
            timestamp: Timestamp::now(),
            user_id: None,
            metadata: BTreeMap::new(),
            data: serde_json::to_value(data)?,
        })
    }

    pub fn with_user(mut self, user_id: u64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Decodes the payload.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            SpotterError::invalid_input("data")
                .with_reason(format!("Malformed {} payload: {e}", self.message_type))
        })
    }
}

/// Payload of `phase_create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseCreateData {
    pub plan_id: u64,
    pub last_known: Option<VersionStamp>,
    pub phase: PhaseInput,
}

/// Payload of `phase_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseUpdateData {
    pub phase_id: u64,
    pub last_known: Option<VersionStamp>,
    pub update: PhaseUpdate,
}

/// Payload of `phase_delete` and `phase_activate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTarget {
    pub phase_id: u64,
    pub last_known: Option<VersionStamp>,
}

/// Payload of `phase_duplicate`: the source phase tree as it was when the
/// job was submitted, appended to the plan by the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseDuplicateData {
    pub plan_id: u64,
    pub source_phase_id: u64,
    pub last_known: Option<VersionStamp>,
    pub phase: PhaseDraft,
}

/// Payload of `session_create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCreateData {
    pub phase_id: u64,
    pub last_known: Option<VersionStamp>,
    pub session: SessionInput,
}

/// Payload of `session_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdateData {
    pub session_id: u64,
    pub last_known: Option<VersionStamp>,
    pub update: SessionUpdate,
}

/// Payload of `session_delete` and `session_duplicate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTarget {
    pub session_id: u64,
    pub last_known: Option<VersionStamp>,
}

/// Payload of `exercise_save`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSaveData {
    pub last_known: Option<VersionStamp>,
    pub exercise: SaveExercise,
}

/// Payload of `exercise_delete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseTarget {
    pub exercise_id: u64,
    pub last_known: Option<VersionStamp>,
}

/// Payload of `plan_save`: the whole nested plan in one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSaveData {
    pub plan_id: u64,
    pub last_known: Option<VersionStamp>,
    pub draft: PlanDraft,
}

/// Payload of `plan_create`.
pub type PlanCreateData = CreatePlan;

/// Payload of `notification`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
    pub client_id: u64,
    pub plan_id: Option<u64>,
    pub text: String,
}

/// Payload of `email`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailData {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Payload of `user_action` (analytics and audit trail).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserActionData {
    pub action: String,
    pub plan_id: Option<u64>,
    #[serde(default)]
    pub details: serde_json::Value,
}
