//! notebook CLI entry point.
//!
//! Opens notebooks and drives their kernels through the lifecycle
//! coordinator, logging every notification it raises.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kernel_launch::ZmqKernelLauncher;
use kernel_lifecycle::{Coordinator, LogNotificationSink, OutputHandling};
use log::info;
use notebook::settings::{load_settings, save_settings, settings_path, settings_schema};
use notebook::{HostEnvironment, Session, Settings};

#[derive(Parser, Debug)]
#[command(name = "notebook")]
#[command(about = "Open notebooks and manage their Jupyter kernels")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Override the configured host environment (desktop, server)
    #[arg(long, global = true)]
    host: Option<HostEnvironment>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Open a notebook, file, or directory
    Open {
        /// Path to open
        path: PathBuf,

        /// Restart the kernel once it is ready
        #[arg(long)]
        restart: bool,

        /// Run all cells after restarting
        #[arg(long, requires = "restart")]
        run_all: bool,

        /// Keep the kernel running until interrupted
        #[arg(long)]
        wait: bool,
    },

    /// Start a kernel for a new, unsaved notebook
    New {
        /// Kernelspec name (default: from settings)
        #[arg(long, short)]
        kernel: Option<String>,

        /// Keep the kernel running until interrupted
        #[arg(long)]
        wait: bool,
    },

    /// Show or update settings
    Settings {
        /// Print the JSON schema of the settings file
        #[arg(long)]
        schema: bool,

        /// Set the kernelspec used for new notebooks
        #[arg(long)]
        default_kernel: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let mut settings = load_settings();
    if let Some(host) = cli.host {
        settings.host = host;
    }

    match cli.command {
        Commands::Open {
            path,
            restart,
            run_all,
            wait,
        } => open(&settings, path, restart, run_all, wait).await,
        Commands::New { kernel, wait } => new(&settings, kernel, wait).await,
        Commands::Settings {
            schema,
            default_kernel,
        } => show_settings(load_settings(), schema, default_kernel),
    }
}

fn start_coordinator(settings: &Settings) -> Coordinator {
    info!(
        "Starting coordinator ({} host, restart timeout {}s)",
        settings.host, settings.restart_timeout_secs
    );
    let launcher = ZmqKernelLauncher::new(
        settings.channel_capacity,
        settings.kernel_startup_timeout(),
    );
    Coordinator::start(
        settings.coordinator_config(),
        Arc::new(launcher),
        Arc::new(LogNotificationSink),
    )
}

/// Time allowed for a kernel to launch and answer its handshake.
fn ready_timeout(settings: &Settings) -> Duration {
    settings.kernel_startup_timeout() + Duration::from_secs(settings.fetch_timeout_secs)
}

async fn open(
    settings: &Settings,
    path: PathBuf,
    restart: bool,
    run_all: bool,
    wait: bool,
) -> Result<()> {
    let coordinator = start_coordinator(settings);
    let path = path.to_string_lossy().into_owned();

    let Some(mut session) = notebook::open(&coordinator, &path, ready_timeout(settings)).await?
    else {
        println!("Opened {} (no kernel needed)", path);
        coordinator.shutdown();
        return Ok(());
    };
    report(&coordinator, session);

    if restart {
        let output_handling = if run_all {
            OutputHandling::RunAll
        } else {
            OutputHandling::None
        };
        let timeout = Duration::from_secs(settings.restart_timeout_secs);
        session = notebook::restart(&coordinator, session, output_handling, timeout).await?;
        report(&coordinator, session);
    }

    finish(&coordinator, session, settings, wait).await?;
    coordinator.shutdown();
    Ok(())
}

async fn new(settings: &Settings, kernel: Option<String>, wait: bool) -> Result<()> {
    let coordinator = start_coordinator(settings);
    let kernel = kernel.unwrap_or_else(|| settings.default_kernel.clone());

    let session = notebook::new_notebook(&coordinator, &kernel, ready_timeout(settings)).await?;
    report(&coordinator, session);

    finish(&coordinator, session, settings, wait).await?;
    coordinator.shutdown();
    Ok(())
}

fn report(coordinator: &Coordinator, session: Session) {
    if let Some(kernel) = coordinator.state().kernel(&session.kernel_ref) {
        println!("{}", notebook::describe(&kernel));
    }
}

/// Optionally wait for Ctrl-C, then shut the session's kernel down.
async fn finish(
    coordinator: &Coordinator,
    session: Session,
    settings: &Settings,
    wait: bool,
) -> Result<()> {
    if wait {
        info!("Kernel running, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
    }
    notebook::shutdown(coordinator, session, settings.kernel_startup_timeout()).await
}

fn show_settings(
    mut settings: Settings,
    schema: bool,
    default_kernel: Option<String>,
) -> Result<()> {
    if schema {
        println!("{}", serde_json::to_string_pretty(&settings_schema())?);
        return Ok(());
    }

    if let Some(kernel) = default_kernel {
        settings.default_kernel = kernel;
        save_settings(&settings)?;
        info!("Saved {:?}", settings_path());
    }

    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
