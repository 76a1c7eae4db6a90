//! Data models for plans and workout logs.
//!
//! Plan structure ([`Plan`] → [`Phase`] → [`Session`] → [`PlanExercise`]) is
//! trainer-authored and only changes through conflict-checked mutations that
//! advance the plan's [`VersionStamp`](crate::stamp::VersionStamp).
//! Workout logs ([`WorkoutSessionLog`] → [`WorkoutSessionDetail`]) are
//! client-authored during a workout and written through the save pipeline in
//! [`crate::tracker`].
//!
//! Display implementations live in [`crate::display`].

pub mod plan;
pub mod workout;


pub use plan::{Phase, Plan, PlanExercise, PrescriptionRange, Session};
pub use workout::{workout_volume, SetValues, WorkoutSessionDetail, WorkoutSessionLog};
