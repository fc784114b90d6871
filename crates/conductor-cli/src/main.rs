//! # conductor-cli
//!
//! Command-line interface for Conductor.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use conductor_core::Config;

mod commands;

const SAMPLE_REQUEST: &str = "帮我规划一下今天的一日三餐吃啥，一个人吃。";

/// Conductor - route natural-language requests to MCP tool servers
#[derive(Parser)]
#[command(name = "conductor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Request to process
    #[arg(value_name = "REQUEST", default_value = SAMPLE_REQUEST)]
    request: String,

    /// Stream the final answer as it is generated
    #[arg(long)]
    stream: bool,

    /// Registry root directory
    #[arg(long, value_name = "DIR")]
    registry: Option<PathBuf>,

    /// Model to use (e.g., qwen-flash, qwen-plus)
    #[arg(short, long)]
    model: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse the tool registry
    Registry {
        #[command(subcommand)]
        action: RegistryAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum RegistryAction {
    /// List a registry directory
    Ls {
        /// Registry path
        #[arg(default_value = "/")]
        path: String,
        /// Only show entries containing this keyword
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Print a registry file
    Cat {
        /// Registry path
        path: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        Config::default()
    });
    if let Some(root) = cli.registry.clone() {
        config.registry.root = root;
    }
    if let Some(model) = cli.model.clone() {
        config.llm.model = model;
    }

    match cli.command {
        Some(Commands::Registry { action }) => {
            commands::registry::handle(action, &config).await?;
        }
        Some(Commands::Config { action }) => {
            commands::config::handle(action, &config)?;
        }
        Some(Commands::Version) => {
            println!("conductor {}", env!("CARGO_PKG_VERSION"));
        }
        None => {
            commands::run::run(&cli.request, cli.stream, config).await?;
        }
    }

    Ok(())
}
