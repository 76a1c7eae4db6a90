//! Spotter CLI Application
//!
//! Command-line interface for authoring training plans and logging workouts.

mod args;
mod cli;
mod commands;
mod renderer;

use std::sync::Arc;

use anyhow::{Context, Result};
use args::{Args, Commands};
use clap::Parser;
use commands::Cli;
use log::info;
use renderer::TerminalRenderer;
use spotter_core::{InMemoryJobQueue, PlannerBuilder};
use Commands::*;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let Args {
        database_file,
        no_color,
        json,
        command,
    } = Args::parse();

    // Only queue commands run jobs; other commands write directly.
    let queue = matches!(command, Some(Queue { .. })).then(|| Arc::new(InMemoryJobQueue::new()));

    let mut builder = PlannerBuilder::new().with_database_path(database_file);
    if let Some(queue) = &queue {
        builder = builder.with_job_queue(queue.clone());
    }
    let planner = builder.build().await.context("Failed to initialize planner")?;

    let renderer = TerminalRenderer::new(!no_color, json);
    let cli = Cli::new(planner, renderer, queue);

    info!("Spotter started");

    match command {
        Some(Plan { command }) => cli.handle_plan_command(command).await,
        Some(Phase { command }) => cli.handle_phase_command(command).await,
        Some(Session { command }) => cli.handle_session_command(command).await,
        Some(Exercise { command }) => cli.handle_exercise_command(command).await,
        Some(Log { command }) => cli.handle_log_command(command).await,
        Some(Queue { command }) => cli.handle_queue_command(command).await,
        None => cli.list_plans(None).await,
    }
}
