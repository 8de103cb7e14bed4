//! nodeguardd — the nodeguard daemon and operator CLI.
//!
//! `run` assembles every subsystem in one process:
//! - Catalog store (redb)
//! - Event bus + alert dispatcher (chat webhook, incident API)
//! - Health state machine + per-node monitor
//! - Operator REST API
//!
//! The `lb` subcommands talk to the HAProxy stats socket directly and
//! need no running daemon.
//!
//! # Usage
//!
//! ```text
//! nodeguardd init --output nodeguard.toml
//! nodeguardd run --config nodeguard.toml
//! nodeguardd lb count ethmainnet --exclude-backup
//! nodeguardd lb disable ethmainnet eth1 --peer eth2
//! ```

mod daemon;
mod lb;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use nodeguard_core::NodeguardConfig;

#[derive(Parser)]
#[command(
    name = "nodeguardd",
    about = "nodeguard: blockchain node health monitor and alerting daemon",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the monitor, dispatcher and API until Ctrl-C.
    Run {
        /// Path to nodeguard.toml.
        #[arg(short, long, default_value = "nodeguard.toml")]
        config: PathBuf,
    },
    /// Write a starter config file.
    Init {
        #[arg(short, long, default_value = "nodeguard.toml")]
        output: PathBuf,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Inspect or change HAProxy rotation.
    Lb {
        /// Stats socket address (host:port).
        #[arg(long, default_value = "127.0.0.1:9999", global = true)]
        haproxy: String,
        #[command(subcommand)]
        action: lb::LbAction,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,nodeguardd=debug,nodeguard=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => {
            let config = NodeguardConfig::from_file(&config)
                .with_context(|| format!("failed to load {}", config.display()))?;
            daemon::run(config).await
        }
        Command::Init { output, force } => init(&output, force),
        Command::Lb { haproxy, action } => lb::run(&haproxy, action).await,
    }
}

fn init(output: &std::path::Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }
    std::fs::write(output, NodeguardConfig::scaffold().to_toml_string()?)?;
    println!("wrote {}", output.display());
    Ok(())
}
