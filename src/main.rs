use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod simulation;
mod utils;

/// ICN forwarder Command Line Interface
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Sets the level of verbosity
    #[clap(short, long, global = true)]
    verbose: bool,

    /// Subcommand to execute
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the balanced forwarding scenario on an in-process bus
    Simulate {
        /// Number of Interests sent under /a/b
        #[clap(short, long, default_value = "6")]
        interests: usize,

        /// How long the producers take to answer, in milliseconds
        #[clap(long, default_value = "200")]
        producer_delay_ms: u64,

        /// How long the client waits for all answers, in milliseconds
        #[clap(short, long, default_value = "5000")]
        timeout_ms: u64,
    },

    /// Inspect the forwarder configuration
    Config {
        #[clap(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as JSON
    Show {
        /// Configuration file (JSON, TOML or YAML)
        #[clap(short, long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    // Execute the specified command
    match cli.command {
        Commands::Simulate {
            interests,
            producer_delay_ms,
            timeout_ms,
        } => {
            commands::simulate::run(interests, producer_delay_ms, timeout_ms).await?;
        }
        Commands::Config { cmd } => {
            commands::config::handle_command(cmd)?;
        }
    }

    Ok(())
}
