//! Markdown formatting for plans, workout logs and operation results.
//!
//! Domain models implement [`std::fmt::Display`] directly (see [`models`]).
//! Wrapper types cover collections and results where the same data needs a
//! different shape depending on context:
//!
//! - [`collections`]: plan lists and job tables
//! - [`results`]: mutation outcomes and deletions
//! - [`status`]: one-line success and error messages
//! - [`time`]: timestamps in the local timezone and elapsed durations
//!
//! All output is markdown; the CLI renders it with termimad.

pub mod collections;
pub mod models;
pub mod results;
pub mod status;
pub mod time;

pub use collections::{JobTable, PlanList};
pub use results::{DeleteResult, OutcomeReport};
pub use status::StatusMessage;
pub use time::{Elapsed, LocalDateTime};
