use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{info, warn};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use relaunch::config::Config;
use relaunch::domain::{BuildOutcome, RunEvent};
use relaunch::runner::{ControllerConfig, RunController, RunTarget};
use relaunch::watch::CommandWatcher;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use cli::signals::wait_for_shutdown_signal;

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("relaunch")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("relaunch.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn print_event(event: &RunEvent) {
    match event {
        RunEvent::BuildCompleted { kind, outcome } => match outcome {
            BuildOutcome::Success => println!("{} {} build succeeded", "✓".green(), kind),
            BuildOutcome::Error => println!("{} {} build failed", "✗".red(), kind),
        },
        RunEvent::FullyReady => println!("{}", "Both builds ready".cyan()),
        RunEvent::RestartScheduled { due_in } => {
            println!("{}", format!("Restarting in {}ms", due_in.as_millis()).dimmed())
        }
        RunEvent::ProcessStarted { pid, args } => println!(
            "{} pid {} {}",
            "Started:".green().bold(),
            pid.map_or_else(|| "?".to_string(), |p| p.to_string()),
            args.join(" ").dimmed()
        ),
        RunEvent::ProcessStopping { pid } => {
            println!("{} pid {:?}", "Stopping:".yellow(), pid)
        }
        RunEvent::ProcessExited {
            pid,
            intentional,
            code,
        } => {
            if *intentional {
                println!("{}", format!("pid {:?} exited (code {:?})", pid, code).dimmed());
            } else {
                println!("{} pid {:?} exited on its own (code {:?})", "Crashed:".red().bold(), pid, code);
            }
        }
        RunEvent::Stopped => println!("{}", "Stopped".yellow()),
        RunEvent::Failed { reason } => println!("{} {}", "Failed:".red().bold(), reason),
    }
}

fn spawn_event_printer(mut events: broadcast::Receiver<RunEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    print_event(&event);
                    if event.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Event printer lagged, skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn supervise(controller: &RunController<CommandWatcher>, target: RunTarget, extra: Vec<String>) -> Result<()> {
    tokio::select! {
        result = controller.run(target, extra) => result.context("Run failed")?,
        signal = wait_for_shutdown_signal() => {
            signal.context("Failed to listen for shutdown signals")?;
            info!("Shutdown signal received before first builds settled");
            controller.stop();
            return controller.wait().await.context("Run failed");
        }
    }

    println!("{}", "Initial builds settled".cyan());

    tokio::select! {
        result = controller.wait() => result.context("Run failed"),
        signal = wait_for_shutdown_signal() => {
            signal.context("Failed to listen for shutdown signals")?;
            info!("Shutdown signal received");
            controller.stop();
            controller.wait().await.context("Run failed")
        }
    }
}

async fn handle_run_command(config: &Config, extra: Vec<String>) -> Result<()> {
    info!("Supervising {} for target {}", config.runtime.executable, config.target);
    println!(
        "{} {} {}",
        "Relaunch:".green().bold(),
        config.runtime.executable,
        format!("({})", config.target).dimmed()
    );

    let controller = RunController::new(Arc::new(CommandWatcher::new()), ControllerConfig::from(config));
    let printer = spawn_event_printer(controller.subscribe());

    let result = supervise(&controller, RunTarget::from(config), extra).await;

    // Closes the event channel once the run loop is gone too
    drop(controller);
    let _ = printer.await;
    result
}

fn handle_config_command(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    config.validate().context("Invalid configuration")?;
    println!("{}", "Configuration is valid".green());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    setup_logging(cli.is_verbose()).context("Failed to setup logging")?;

    // Load configuration
    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    match cli.command.clone().unwrap_or(Commands::Run {
        target: None,
        quiet_period_ms: None,
        extra: Vec::new(),
    }) {
        Commands::Config => handle_config_command(&config),
        Commands::Run {
            target,
            quiet_period_ms,
            extra,
        } => {
            if let Some(target) = target {
                config.target = target;
            }
            if let Some(ms) = quiet_period_ms {
                config.quiet_period_ms = ms;
            }
            config.validate().context("Invalid configuration")?;
            handle_run_command(&config, extra).await
        }
    }
}
