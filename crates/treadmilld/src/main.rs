//! treadmilld — the Treadmill cell control-plane daemon.
//!
//! # Usage
//!
//! ```text
//! treadmilld run loader  --config treadmill.toml
//! treadmilld run monitor --config treadmill.toml
//! treadmilld check       --config treadmill.toml
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use treadmilld::config::CellConfig;

#[derive(Parser)]
#[command(name = "treadmilld", about = "Treadmill cell control-plane daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one of the two leader-elected control-plane roles.
    Run {
        #[command(subcommand)]
        role: RunRole,
    },
    /// One-shot placement integrity check; exits non-zero on violation.
    Check {
        #[arg(long, default_value = "treadmill.toml")]
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum RunRole {
    /// Rebuild and maintain the cell model, driving placement.
    Loader {
        #[arg(long, default_value = "treadmill.toml")]
        config: PathBuf,
    },
    /// Run the App-Monitor Controller's reconfigure/reevaluate loop.
    Monitor {
        #[arg(long, default_value = "treadmill.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,treadmill=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { role: RunRole::Loader { config } } => {
            let config = CellConfig::from_file(&config)?;
            treadmilld::run_loader(config).await
        }
        Command::Run { role: RunRole::Monitor { config } } => {
            let config = CellConfig::from_file(&config)?;
            treadmilld::run_monitor(config).await
        }
        Command::Check { config } => {
            let config = CellConfig::from_file(&config)?;
            let ok = treadmilld::run_check(config).await?;
            if !ok {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
