//! # minimind CLI
//!
//! Command-line runner for a minimind world: one human at the keyboard and a
//! cast of generated actors taking turns.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "minimind")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, env = "MINIMIND_CONFIG", default_value = "minimind.yml")]
    config: PathBuf,

    /// Generation backend URL (overrides the config file)
    #[arg(long, env = "MINIMIND_BACKEND_URL")]
    backend_url: Option<String>,

    /// Model name (overrides the config file)
    #[arg(long, env = "MINIMIND_MODEL")]
    model: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play: type commands when it's your turn, agents take theirs
    Run {
        /// Stop after this many turns
        #[arg(long)]
        max_turns: Option<usize>,
    },

    /// Print what a command would cost
    Cost {
        /// Command line, e.g. `SAY hi there`
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Print the opening turn order for the configured cast
    Order {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; game output owns stdout
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let overrides = commands::Overrides {
        backend_url: cli.backend_url,
        model: cli.model,
    };

    match cli.command {
        Commands::Run { max_turns } => commands::run_world(&cli.config, &overrides, max_turns).await,
        Commands::Cost { command } => commands::print_cost(&cli.config, &command.join(" ")),
        Commands::Order { json } => commands::print_order(&cli.config, json),
    }
}
