// ABOUTME: Entry point for the edgefn CLI application.
// ABOUTME: Parses arguments, sets up logging and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use edgefn::config::{self, CONFIG_FILENAME};
use edgefn::error::Result;
use edgefn::output::Output;
use std::env;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let output = Output::new(cli.output_mode());
    let status = Output::new(cli.output_mode());

    match run(cli, output, &cancel).await {
        Ok(()) => {}
        Err(e) if e.is_no_deploy() => status.success(&e.to_string()),
        Err(e) => {
            status.error(&e.to_string());
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli, mut output: Output, cancel: &CancellationToken) -> Result<()> {
    let cwd = env::current_dir()?.canonicalize()?;
    let verbose = cli.verbose;

    match cli.command {
        Commands::Init { project_ref, force } => {
            config::init_config(&cwd, project_ref.as_deref(), force)?;
            output.success(&format!("Created {CONFIG_FILENAME}"));
            Ok(())
        }
        Commands::Deploy(args) => {
            output.start_timer();
            commands::deploy(&cwd, args, verbose, &output, cancel).await
        }
        Commands::Bundle(args) => {
            output.start_timer();
            commands::bundle(&cwd, args, verbose, &output, cancel).await
        }
        Commands::List { project_ref } => {
            commands::list(&cwd, project_ref.as_deref(), &output, cancel).await
        }
    }
}
