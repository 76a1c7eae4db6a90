//! Core library for the Spotter coaching application.
//!
//! Trainers author plans (phases, sessions, prescribed exercises) and clients
//! log workouts against them. This crate holds the storage, the concurrency
//! rules and the background machinery both sides rely on:
//!
//! - [`planner`]: async API over SQLite; every structural mutation is
//!   checked against the plan's [`VersionStamp`] and reported as a
//!   [`MutationOutcome`]
//! - [`queue`]: typed job messages, an in-memory priority queue with retries
//!   and dependencies, and the worker that applies plan jobs
//! - [`tracker`]: the client-side save pipeline for a workout in progress
//! - [`invalidation`]: change notifications keyed by plan owner
//! - [`display`]: markdown formatting used by the CLI
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use spotter_core::{params::{CreatePlan, StartSessionLog}, PlannerBuilder, TrackerConfig, WorkoutTracker, SetValues};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let planner = PlannerBuilder::new()
//!     .with_database_path(Some("spotter.db"))
//!     .build()
//!     .await?;
//!
//! let plan = planner
//!     .create_plan(&CreatePlan { client_id: 7, title: "Off-season".to_string() })
//!     .await
//!     .into_result()?;
//! println!("{plan}");
//!
//! let start = StartSessionLog {
//!     client_ref: "log-1".to_string(),
//!     user_id: 7,
//!     session_name: "Push".to_string(),
//! };
//! let tracker = WorkoutTracker::start(&planner, &start, TrackerConfig::default()).await?;
//! let set = tracker
//!     .add_set("Bench Press", 1, SetValues { reps: Some(5), weight: Some(80.0), notes: None })
//!     .await?;
//! tracker.edit_reps(set, Some(6)).await?;
//! let log = tracker.finish().await?;
//! println!("{log}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod display;
pub mod error;
pub mod invalidation;
pub mod models;
pub mod ordering;
pub mod outcome;
pub mod params;
pub mod planner;
pub mod queue;
pub mod stamp;
pub mod tracker;

pub use config::{RetryPolicy, TrackerConfig};
pub use db::{Database, Stamped};
pub use error::{Entity, FailureKind, Result, SpotterError};
pub use invalidation::{Invalidation, InvalidationBus};
pub use models::{
    Phase, Plan, PlanExercise, PrescriptionRange, Session, SetValues, WorkoutSessionDetail,
    WorkoutSessionLog,
};
pub use outcome::{MutationOutcome, OutcomeError};
pub use planner::{Planner, PlannerBuilder};
pub use queue::{Dispatcher, InMemoryJobQueue, JobQueue, MessageEnvelope, MessageType};
pub use stamp::VersionStamp;
pub use tracker::{LocalSetId, WorkoutStore, WorkoutTracker};
