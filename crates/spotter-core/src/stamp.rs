//! Per-plan version stamps.
//!
//! A [`VersionStamp`] is the plan's `updated_at` value and the only token
//! used for optimistic concurrency. Callers treat it as opaque: they receive
//! it from a read or a successful mutation and hand it back unchanged as the
//! "last known" value of the next mutation. The only operation that carries
//! meaning is equality at full nanosecond precision.

use std::{fmt, str::FromStr};

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

/// Opaque optimistic-concurrency token for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionStamp(Timestamp);

impl VersionStamp {
    /// Stamp for a freshly created plan.
    pub fn now() -> Self {
        Self(Timestamp::now())
    }

    /// Wraps a timestamp read from storage.
    pub fn from_timestamp(timestamp: Timestamp) -> Self {
        Self(timestamp)
    }

    /// Returns the stamp that replaces `self` after a structural change.
    ///
    /// The result is the current time, unless the clock has not moved past
    /// `self` (coarse clocks, back-to-back commits, clock skew), in which case
    /// it is `self` plus one nanosecond. Stamps therefore only move forward.
    pub fn advance(self) -> Self {
        let floor = self
            .0
            .checked_add(SignedDuration::from_nanos(1))
            .unwrap_or(self.0);
        Self(Timestamp::now().max(floor))
    }

    /// Returns the wrapped timestamp.
    pub fn timestamp(&self) -> Timestamp {
        self.0
    }

    /// Storage representation (RFC 3339, lossless to the nanosecond).
    pub fn to_storage(&self) -> String {
        self.0.to_string()
    }

    /// True when a caller-supplied token no longer matches this stamp.
    pub fn is_stale(&self, last_known: Option<&VersionStamp>) -> bool {
        matches!(last_known, Some(known) if known != self)
    }
}

impl fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VersionStamp {
    type Err = jiff::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Timestamp>().map(Self)
    }
}
