//! Cache invalidation notices for committed plan changes.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::stamp::VersionStamp;

const CHANNEL_CAPACITY: usize = 256;

/// Published after a structural mutation commits.
///
/// Keyed by the plan owner's client id, the unit at which downstream caches
/// hold plans.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Invalidation {
    pub client_id: u64,
    pub plan_id: u64,
    pub updated_at: VersionStamp,
}

/// Fire-and-forget fan-out of [`Invalidation`] notices.
///
/// Publishing never blocks and never fails the mutation: with no subscriber
/// the notice is dropped, and lagging subscribers lose the oldest notices.
#[derive(Debug, Clone)]
pub struct InvalidationBus {
    sender: broadcast::Sender<Invalidation>,
}

impl InvalidationBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Invalidation> {
        self.sender.subscribe()
    }

    pub fn publish(&self, notice: Invalidation) {
        match self.sender.send(notice) {
            Ok(receivers) => log::debug!(
                "Invalidated plans of client {} ({} subscriber(s))",
                notice.client_id,
                receivers
            ),
            Err(_) => log::trace!(
                "No invalidation subscribers for client {}",
                notice.client_id
            ),
        }
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new()
    }
}
