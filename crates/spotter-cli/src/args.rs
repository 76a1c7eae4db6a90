use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::{
    ExerciseCommands, LogCommands, PhaseCommands, PlanCommands, QueueCommands, SessionCommands,
};

/// Training plans and workout logs from the command line
///
/// Trainers build plans out of phases, sessions and prescribed exercises;
/// clients log the sets they perform. Every plan carries a version stamp:
/// pass it back with `--token` to make sure an edit is based on the latest
/// version of the plan.
#[derive(Parser)]
#[command(version, about, name = "spotter")]
pub struct Args {
    /// Path to the SQLite database file. Defaults to
    /// $XDG_DATA_HOME/spotter/spotter.db
    #[arg(long, global = true)]
    pub database_file: Option<PathBuf>,

    /// Disable colored output and use plain text
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Print results as JSON instead of markdown
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage plans
    #[command(alias = "p")]
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Manage phases within plans
    #[command(alias = "ph")]
    Phase {
        #[command(subcommand)]
        command: PhaseCommands,
    },
    /// Manage sessions within phases
    #[command(alias = "s")]
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Manage exercises prescribed in sessions
    #[command(alias = "e")]
    Exercise {
        #[command(subcommand)]
        command: ExerciseCommands,
    },
    /// Log workouts
    #[command(alias = "w")]
    Log {
        #[command(subcommand)]
        command: LogCommands,
    },
    /// Run plan changes as background jobs
    #[command(alias = "q")]
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
}
