//! Ordered queue of pending set saves.
//!
//! Operations for the same set run strictly in issue order: an operation is
//! only handed out once every earlier operation on that set has finished.
//! Operations on different sets are independent, and one failing never
//! holds back another set.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::LocalSetId;
use crate::{config::RetryPolicy, models::SetValues, params::LogSet};

pub type OperationId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationStatus {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationPayload {
    Create(LogSet),
    Update(SetValues),
    Delete,
}

impl OperationPayload {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationPayload::Create(_) => OperationKind::Create,
            OperationPayload::Update(_) => OperationKind::Update,
            OperationPayload::Delete => OperationKind::Delete,
        }
    }
}

/// One save request and its delivery state.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOperation {
    pub id: OperationId,
    pub local_id: LocalSetId,
    /// Known once the set's create has been confirmed
    pub server_id: Option<u64>,
    pub payload: OperationPayload,
    pub status: OperationStatus,
    /// Attempts started so far
    pub attempts: u32,
    pub next_attempt_at: Instant,
    pub last_error: Option<String>,
}

impl SaveOperation {
    pub fn kind(&self) -> OperationKind {
        self.payload.kind()
    }

    fn blocks_later_operations(&self) -> bool {
        self.status != OperationStatus::Succeeded
    }
}

/// What happened to an operation after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Scheduled again after the backoff delay
    Rescheduled { at: Instant },
    /// Attempts exhausted or not retryable
    Failed,
}

#[derive(Debug)]
pub struct RetryQueue {
    operations: VecDeque<SaveOperation>,
    next_id: OperationId,
    policy: RetryPolicy,
}

impl RetryQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            operations: VecDeque::new(),
            next_id: 1,
            policy,
        }
    }

    pub fn push(
        &mut self,
        local_id: LocalSetId,
        server_id: Option<u64>,
        payload: OperationPayload,
        now: Instant,
    ) -> OperationId {
        let id = self.next_id;
        self.next_id += 1;
        self.operations.push_back(SaveOperation {
            id,
            local_id,
            server_id,
            payload,
            status: OperationStatus::Pending,
            attempts: 0,
            next_attempt_at: now,
            last_error: None,
        });
        id
    }

    pub fn get(&self, id: OperationId) -> Option<&SaveOperation> {
        self.operations.iter().find(|op| op.id == id)
    }

    /// The not-yet-started operation of `kind` for a set, if any.
    ///
    /// Failed operations count as not started: their payload is what
    /// [`RetryQueue::retry_failed`] will send.
    pub fn unsent_mut(
        &mut self,
        local_id: LocalSetId,
        kind: OperationKind,
    ) -> Option<&mut SaveOperation> {
        self.operations.iter_mut().find(|op| {
            op.local_id == local_id
                && op.kind() == kind
                && matches!(op.status, OperationStatus::Pending | OperationStatus::Failed)
        })
    }

    /// Whether any unfinished operation of `kind` exists for a set.
    pub fn has_open(&self, local_id: LocalSetId, kind: OperationKind) -> bool {
        self.operations.iter().any(|op| {
            op.local_id == local_id && op.kind() == kind && op.status != OperationStatus::Succeeded
        })
    }

    /// Hands out the first operation that is due and not blocked by an
    /// earlier operation on the same set, marking it in flight.
    pub fn next_ready(&mut self, now: Instant) -> Option<SaveOperation> {
        let index = self.operations.iter().enumerate().position(|(i, op)| {
            op.status == OperationStatus::Pending
                && op.next_attempt_at <= now
                && !self.is_blocked(i, op)
        })?;

        let op = self.operations.get_mut(index)?;
        op.status = OperationStatus::InFlight;
        op.attempts += 1;
        Some(op.clone())
    }

    /// Removes a confirmed operation and returns it with status `succeeded`.
    pub fn succeed(&mut self, id: OperationId) -> Option<SaveOperation> {
        let index = self.operations.iter().position(|op| op.id == id)?;
        let mut op = self.operations.remove(index)?;
        op.status = OperationStatus::Succeeded;
        op.last_error = None;
        Some(op)
    }

    /// Records a failed attempt.
    pub fn fail(
        &mut self,
        id: OperationId,
        error: String,
        retryable: bool,
        now: Instant,
    ) -> Option<FailureOutcome> {
        let policy = self.policy;
        let op = self.operations.iter_mut().find(|op| op.id == id)?;
        op.last_error = Some(error);

        if retryable && policy.allows_retry(op.attempts) {
            let at = now + policy.delay_after(op.attempts);
            op.status = OperationStatus::Pending;
            op.next_attempt_at = at;
            Some(FailureOutcome::Rescheduled { at })
        } else {
            op.status = OperationStatus::Failed;
            Some(FailureOutcome::Failed)
        }
    }

    /// Re-schedules every failed operation with a fresh attempt budget.
    pub fn retry_failed(&mut self, now: Instant) -> usize {
        let mut count = 0;
        for op in self
            .operations
            .iter_mut()
            .filter(|op| op.status == OperationStatus::Failed)
        {
            op.status = OperationStatus::Pending;
            op.attempts = 0;
            op.next_attempt_at = now;
            count += 1;
        }
        count
    }

    /// Propagates a newly confirmed server id to later operations of a set.
    pub fn resolve_server_id(&mut self, local_id: LocalSetId, server_id: u64) {
        for op in self
            .operations
            .iter_mut()
            .filter(|op| op.local_id == local_id && op.server_id.is_none())
        {
            op.server_id = Some(server_id);
        }
    }

    /// Whether an unfinished operation of `kind` has been attempted at least
    /// once, so the server may already have applied it.
    pub fn has_started(&self, local_id: LocalSetId, kind: OperationKind) -> bool {
        self.operations.iter().any(|op| {
            op.local_id == local_id
                && op.kind() == kind
                && op.status != OperationStatus::Succeeded
                && op.attempts > 0
        })
    }

    /// Drops the not-yet-started operations of one kind for a set.
    pub fn discard_unsent_of(&mut self, local_id: LocalSetId, kind: OperationKind) -> usize {
        let before = self.operations.len();
        self.operations.retain(|op| {
            op.local_id != local_id
                || op.kind() != kind
                || !matches!(op.status, OperationStatus::Pending | OperationStatus::Failed)
        });
        before - self.operations.len()
    }

    /// Drops every operation of a set that has not started.
    pub fn discard_unsent(&mut self, local_id: LocalSetId) -> usize {
        let before = self.operations.len();
        self.operations.retain(|op| {
            op.local_id != local_id
                || !matches!(op.status, OperationStatus::Pending | OperationStatus::Failed)
        });
        before - self.operations.len()
    }

    /// Earliest time a pending, unblocked operation becomes due.
    pub fn next_due(&self) -> Option<Instant> {
        self.operations
            .iter()
            .enumerate()
            .filter(|(i, op)| op.status == OperationStatus::Pending && !self.is_blocked(*i, op))
            .map(|(_, op)| op.next_attempt_at)
            .min()
    }

    /// Whether an earlier operation on the same set is still unfinished.
    fn is_blocked(&self, index: usize, op: &SaveOperation) -> bool {
        self.operations
            .iter()
            .take(index)
            .any(|earlier| earlier.local_id == op.local_id && earlier.blocks_later_operations())
    }

    pub fn operations(&self) -> impl Iterator<Item = &SaveOperation> {
        self.operations.iter()
    }

    /// True when nothing is pending or in flight.
    pub fn is_settled(&self) -> bool {
        self.operations
            .iter()
            .all(|op| op.status == OperationStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn queue() -> RetryQueue {
        RetryQueue::new(RetryPolicy {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            max_attempts: 3,
        })
    }

    fn update(reps: u32) -> OperationPayload {
        OperationPayload::Update(SetValues {
            reps: Some(reps),
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_set_operations_run_in_order() {
        let mut queue = queue();
        let now = Instant::now();
        let a = LocalSetId::new();
        let b = LocalSetId::new();

        let first = queue.push(a, Some(1), update(5), now);
        let second = queue.push(a, Some(1), update(6), now);
        let other = queue.push(b, Some(2), update(7), now);

        assert_eq!(queue.next_ready(now).unwrap().id, first);
        // `second` waits for `first`; the other set is free to go.
        assert_eq!(queue.next_ready(now).unwrap().id, other);
        assert!(queue.next_ready(now).is_none());

        queue.succeed(first);
        assert_eq!(queue.next_ready(now).unwrap().id, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_backs_off_then_gives_up() {
        let mut queue = queue();
        let now = Instant::now();
        let id = queue.push(LocalSetId::new(), Some(1), update(5), now);

        queue.next_ready(now).unwrap();
        assert_eq!(
            queue.fail(id, "timeout".into(), true, now),
            Some(FailureOutcome::Rescheduled {
                at: now + Duration::from_secs(1)
            })
        );
        assert!(queue.next_ready(now).is_none());
        assert_eq!(queue.next_due(), Some(now + Duration::from_secs(1)));

        let later = now + Duration::from_secs(1);
        queue.next_ready(later).unwrap();
        queue.fail(id, "timeout".into(), true, later);
        let latest = later + Duration::from_secs(2);
        queue.next_ready(latest).unwrap();
        assert_eq!(
            queue.fail(id, "timeout".into(), true, latest),
            Some(FailureOutcome::Failed)
        );
        assert_eq!(queue.get(id).unwrap().status, OperationStatus::Failed);
        assert!(queue.is_settled());

        assert_eq!(queue.retry_failed(latest), 1);
        assert_eq!(queue.get(id).unwrap().attempts, 0);
        assert!(queue.next_ready(latest).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_failure_is_terminal() {
        let mut queue = queue();
        let now = Instant::now();
        let id = queue.push(LocalSetId::new(), Some(1), update(5), now);
        queue.next_ready(now).unwrap();
        assert_eq!(
            queue.fail(id, "invalid".into(), false, now),
            Some(FailureOutcome::Failed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_operation_blocks_its_set_only() {
        let mut queue = queue();
        let now = Instant::now();
        let a = LocalSetId::new();
        let failing = queue.push(a, None, OperationPayload::Delete, now);
        queue.push(a, None, update(1), now);
        let other = queue.push(LocalSetId::new(), Some(3), update(2), now);

        queue.next_ready(now).unwrap();
        queue.fail(failing, "gone".into(), false, now);
        assert_eq!(queue.next_ready(now).unwrap().id, other);
        assert!(queue.next_ready(now).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_id_resolution_and_discard() {
        let mut queue = queue();
        let now = Instant::now();
        let a = LocalSetId::new();
        queue.push(a, None, OperationPayload::Delete, now);
        queue.resolve_server_id(a, 42);
        assert_eq!(queue.operations().next().unwrap().server_id, Some(42));

        assert_eq!(queue.discard_unsent(a), 1);
        assert!(queue.is_settled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempted_create_counts_as_started() {
        let mut queue = queue();
        let now = Instant::now();
        let a = LocalSetId::new();
        let create = queue.push(a, None, update(1), now);
        assert!(!queue.has_started(a, OperationKind::Update));

        queue.next_ready(now).unwrap();
        queue.fail(create, "timeout".into(), true, now);
        assert!(queue.has_started(a, OperationKind::Update));
        assert_eq!(queue.discard_unsent_of(a, OperationKind::Delete), 0);
        assert_eq!(queue.discard_unsent_of(a, OperationKind::Update), 1);
    }
}
