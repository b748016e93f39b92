#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # progd
//!
//! Periodic program supervisor.
//!
//! progd keeps a set of registered command lines running on a fixed interval,
//! archives the combined stdout/stderr of every run, and accepts control
//! requests over a one-request-per-connection TCP protocol on port 5555.
//!
//! ## Subcommands
//!
//! - `progd serve` (default): run the daemon
//! - `progd ctl <action>`: send one control request, or `ctl menu` for an
//!   interactive console
//!
//! ## Architecture
//!
//! ```text
//! main.rs          entry point, clap subcommands, logging, serve wiring
//! config.rs        TOML + env-var configuration
//! error.rs         control-plane error taxonomy
//! store.rs         durable state file (interval + programs)
//! archive.rs       per-program run artifacts
//! shell/
//!   mod.rs         executable resolution on PATH
//!   process.rs     exec_command(): run + capture stdout/stderr
//! supervisor/
//!   mod.rs         Supervisor (add/stop/resume/set_interval/get_output)
//!   runner.rs      per-program execution loop, RunnerHandle
//! protocol.rs      request type, request framing
//! server.rs        TCP accept loop, per-connection dispatch
//! shutdown.rs      SIGINT/SIGTERM -> cancel runners, persist state
//! client.rs        control client and menu
//! ```

use std::process::ExitCode;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use progd::config::{Config, LoggingConfig};
use progd::protocol::Request;
use progd::server::{self, Limits};
use progd::{client, shutdown, OutputArchive, StateStore, Supervisor};

/// Periodic program supervisor.
#[derive(Parser)]
#[command(name = "progd", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon (default when no subcommand given).
    Serve {
        /// Path to TOML config file.
        #[arg(long)]
        config: Option<String>,
    },
    /// Send a control request to a running daemon.
    Ctl {
        /// Path to TOML config file (for the default address).
        #[arg(long)]
        config: Option<String>,
        /// Daemon address, overrides `server.listen`.
        #[arg(long)]
        addr: Option<String>,
        #[command(subcommand)]
        action: CtlAction,
    },
}

#[derive(Subcommand)]
enum CtlAction {
    /// Register a program and start running it.
    Add { program: String },
    /// Print the accumulated output of a program.
    GetOutput { program: String },
    /// Stop running a program.
    Stop { program: String },
    /// Resume a stopped program.
    Resume { program: String },
    /// Set the global run interval in seconds.
    SetInterval { interval: String },
    /// Interactive menu.
    Menu,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Ctl {
            config,
            addr,
            action,
        }) => run_ctl(config.as_deref(), addr, action).await,
        Some(Commands::Serve { config }) => run_server(config.as_deref()).await,
        None => run_server(None).await,
    }
}

async fn run_ctl(config_path: Option<&str>, addr: Option<String>, action: CtlAction) -> ExitCode {
    let addr = match addr {
        Some(addr) => addr,
        None => match Config::load(config_path) {
            Ok(config) => config.server.listen,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        },
    };

    let request = match action {
        CtlAction::Add { program } => Request::Add { program },
        CtlAction::GetOutput { program } => Request::GetOutput { program },
        CtlAction::Stop { program } => Request::Stop { program },
        CtlAction::Resume { program } => Request::Resume { program },
        CtlAction::SetInterval { interval } => Request::SetInterval {
            interval: Some(serde_json::Value::String(interval)),
        },
        CtlAction::Menu => {
            return match client::run_menu(&addr).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("{e}");
                    ExitCode::FAILURE
                }
            };
        }
    };

    match client::send_request(&addr, &request).await {
        Ok(reply) => {
            println!("{reply}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing. `RUST_LOG` wins over the configured level; a
/// configured log file replaces stderr.
fn init_logging(logging: &LoggingConfig) {
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| logging.level.clone());

    let file = logging.file.as_ref().map(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| (path.clone(), e))
    });

    match file {
        Some(Ok(file)) => tracing_subscriber::fmt()
            .with_env_filter(log_filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init(),
        Some(Err((path, e))) => {
            tracing_subscriber::fmt().with_env_filter(log_filter).init();
            warn!("Cannot open log file {}: {e}, logging to stderr", path.display());
        }
        None => tracing_subscriber::fmt().with_env_filter(log_filter).init(),
    }
}

async fn run_server(config_path: Option<&str>) -> ExitCode {
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            init_logging(&LoggingConfig::default());
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging);

    info!("progd v{} starting", env!("CARGO_PKG_VERSION"));
    info!("State file: {}", config.storage.state_file.display());
    info!("Output dir: {}", config.storage.output_dir.display());

    if let Err(e) = tokio::fs::create_dir_all(&config.storage.output_dir).await {
        error!(
            "Cannot create output dir {}: {e}",
            config.storage.output_dir.display()
        );
        return ExitCode::FAILURE;
    }

    let supervisor = match Supervisor::open(
        StateStore::new(&config.storage.state_file),
        OutputArchive::new(&config.storage.output_dir, &config.runner.artifact_extension),
        &config.runner.shell,
        config.runner.default_interval,
    )
    .await
    {
        Ok(s) => s,
        Err(e) => {
            error!("Cannot load state: {e}");
            return ExitCode::FAILURE;
        }
    };
    supervisor.start_active().await;

    let listener = match TcpListener::bind(&config.server.listen).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {e}", config.server.listen);
            shutdown::finish(&supervisor).await;
            return ExitCode::FAILURE;
        }
    };
    info!("Listening on {}", config.server.listen);

    server::serve(
        listener,
        supervisor.clone(),
        Limits::from(&config.server),
        shutdown::signal(),
    )
    .await;

    shutdown::finish(&supervisor).await;
    info!("Goodbye");
    ExitCode::SUCCESS
}
