//! hdlrun - compile and simulate Verilog with Icarus Verilog.
//!
//! Thin binary entry point: parses arguments, resolves configuration and
//! drives a [`RunController`] with a console host.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hdlrun_config::{ConfigSnapshot, render_config};
use hdlrun_core::{
    ChannelSink, ConsoleBackend, ControllerError, RunController, ShellTerminal, TerminalSink,
    WorkflowReport,
};

mod args;
mod host;
mod main_helpers;

use args::{Cli, Commands};
use host::CliHost;
use main_helpers::{initialize_tracing, load_config};

enum Workflow {
    Run(PathBuf),
    CompileAll(PathBuf),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    initialize_tracing().ok();

    let config = load_config(&cli)?;

    let workflow = match &cli.command {
        Commands::Config => {
            print!("{}", render_config(&config)?);
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Run { file } => Workflow::Run(file.clone()),
        Commands::CompileAll { dir } => Workflow::CompileAll(dir.clone()),
    };

    match drive(config, workflow).await? {
        Ok(report) => {
            tracing::debug!(jobs = report.jobs.len(), stopped = report.stopped, "workflow complete");
            Ok(ExitCode::SUCCESS)
        }
        // Already shown to the user by the host.
        Err(err) => {
            tracing::debug!(error = %err, "workflow rejected");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Run one workflow to completion. Ctrl-C stops the active job.
async fn drive(
    config: ConfigSnapshot,
    workflow: Workflow,
) -> Result<Result<WorkflowReport, ControllerError>> {
    let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
    let in_terminal = config.run_in_terminal;
    let shell = Arc::new(ShellTerminal::new(cwd));
    let controller = Arc::new(RunController::new(
        Arc::new(CliHost::new()),
        config,
        Arc::new(ChannelSink::new(Arc::new(ConsoleBackend))),
        Arc::new(TerminalSink::new(shell.clone())),
    ));

    let mut task = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            match workflow {
                Workflow::Run(file) => controller.run(Some(&file)).await,
                Workflow::CompileAll(dir) => controller.compile_all(Some(&dir)).await,
            }
        })
    };

    let joined = tokio::select! {
        joined = &mut task => joined,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    tracing::info!("interrupt received, stopping active job");
                    controller.stop();
                }
                Err(err) => tracing::warn!(error = %err, "failed to listen for interrupt"),
            }
            (&mut task).await
        }
    };
    let result = joined.context("workflow task failed")?;

    if in_terminal && result.is_ok() {
        tokio::select! {
            exited = shell.exit_and_wait() => {
                let code = exited?;
                tracing::debug!(?code, "terminal shell exited");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, closing terminal shell");
            }
        }
    }

    controller.dispose();
    Ok(result)
}
