//! Workload attestor CLI
//!
//! A command-line tool for querying the Workload API and for running the
//! attestation steps by hand when debugging a node.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{attest, fetch, resolve};
use tracing_subscriber::EnvFilter;

/// Workload attestor CLI
#[derive(Parser)]
#[command(name = "attestctl")]
#[command(author, version, about = "CLI for the workload attestor", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Overall deadline in milliseconds
    #[arg(long, env = "ATTESTOR_ATTESTATION_TIMEOUT_MS", default_value_t = 2000, global = true)]
    pub timeout_ms: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch this process's identity from the Workload API
    Fetch {
        /// Workload API socket
        #[arg(long, env = "ATTESTOR_SOCKET_PATH", default_value = config::DEFAULT_SOCKET_PATH)]
        socket_path: String,
    },

    /// Find the container whose main process is the given pid
    Resolve {
        /// Process id to look up
        #[arg(long)]
        pid: u32,

        #[command(flatten)]
        runtime: config::RuntimeArgs,
    },

    /// Run the full attestation for a pid without a server
    Attest {
        /// Process id to attest
        #[arg(long)]
        pid: u32,

        #[command(flatten)]
        runtime: config::RuntimeArgs,

        #[command(flatten)]
        directory: config::DirectoryArgs,

        /// Trust domain used to show the resulting SPIFFE ID
        #[arg(long, env = "ATTESTOR_TRUST_DOMAIN", default_value = "example.org")]
        trust_domain: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let timeout = std::time::Duration::from_millis(cli.timeout_ms);

    match cli.command {
        Commands::Fetch { socket_path } => {
            fetch::fetch_identity(&socket_path, timeout, cli.format).await?;
        }
        Commands::Resolve { pid, runtime } => {
            resolve::resolve_container(pid, &runtime, timeout, cli.format).await?;
        }
        Commands::Attest {
            pid,
            runtime,
            directory,
            trust_domain,
        } => {
            attest::attest_process(pid, &runtime, &directory, &trust_domain, timeout, cli.format)
                .await?;
        }
    }

    Ok(())
}
