//! kcdshop - A local server for interactive coding workshops.

mod cache;
mod cli;
mod compiler;
mod config;
mod logger;
mod package;
mod process;
mod serve;
mod utils;
mod watch;
mod workshop;

use anyhow::{Context, Result};
use cache::StalenessTracker;
use clap::Parser;
use cli::{Cli, Commands};
use colored::Colorize;
use compiler::MarkdownCompiler;
use config::Config;
use process::LocalProcessManager;
use serve::serve_workshop;
use std::sync::Arc;
use workshop::{App, Exercise, Workshop};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::set_verbose(cli.verbose);
    let config = Config::load(&cli)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let workshop = Workshop::new(
        &config,
        Arc::new(StalenessTracker::new()),
        Arc::new(MarkdownCompiler),
        Arc::new(LocalProcessManager::new(&config.dev)),
    );

    match &cli.command {
        Commands::Apps => {
            let apps = runtime.block_on(workshop.get_apps())?;
            print_apps(&apps);
            Ok(())
        }
        Commands::Exercises => {
            let exercises = runtime.block_on(workshop.get_exercises())?;
            print_exercises(&exercises);
            Ok(())
        }
        Commands::Playground { app, reset } => {
            let report = runtime.block_on(workshop.set_playground_by_name(app, *reset))?;
            log!(
                "playground";
                "{} copied, {} unchanged, {} removed{}",
                report.copied,
                report.skipped,
                report.removed,
                if report.restarted { ", restarted" } else { "" }
            );
            Ok(())
        }
        Commands::Serve { .. } => serve_workshop(&config, workshop, runtime.handle()),
    }
}

fn print_apps(apps: &[App]) {
    for app in apps {
        let port = app.port().map(|port| format!(":{port}")).unwrap_or_default();
        println!(
            "{} {} {}",
            format!("{:<10}", app.kind_name()).dimmed(),
            app.name.bold(),
            port.cyan()
        );
    }
}

fn print_exercises(exercises: &[Exercise]) {
    for exercise in exercises {
        println!(
            "{} {}",
            format!("{:02}.", exercise.exercise_number).dimmed(),
            exercise.title.bold()
        );
        for step in exercise.steps.iter().flatten() {
            let mark = |present: bool| if present { "✓".green() } else { "-".dimmed() };
            println!(
                "    {:02}  problem {}  solution {}",
                step.step_number,
                mark(step.problem.is_some()),
                mark(step.solution.is_some())
            );
        }
    }
}
