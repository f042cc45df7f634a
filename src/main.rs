//! statecraft - command-line tooling for declarative state machines
//!
//! Lists, shows, validates and exports YAML definitions, scaffolds new ones
//! and generates Rust stubs for their guards and actions.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use statecraft_core::EngineConfig;
use statecraft_tools::ExportFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "statecraft")]
#[command(about = "Tooling for declarative YAML state machines")]
#[command(version)]
struct Cli {
    /// Directory holding definition files
    #[arg(short, long, env = "STATECRAFT_DEFINITIONS_PATH")]
    path: Option<PathBuf>,

    /// Configuration file (YAML)
    #[arg(short, long, env = "STATECRAFT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List available definitions
    List,

    /// Show a definition
    Show {
        /// Definition id (file stem)
        id: String,
    },

    /// Validate one definition, or all of them
    Validate {
        /// Definition id (file stem)
        id: Option<String>,

        /// Validate every definition in the directory
        #[arg(long, conflicts_with = "id")]
        all: bool,

        /// Known subject types; others are reported (repeatable)
        #[arg(long = "model")]
        models: Vec<String>,
    },

    /// Export a definition
    Export {
        /// Definition id (file stem)
        id: String,

        /// Output format: json, mermaid, md or dot
        format: ExportFormat,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Create a new definition file
    Make {
        /// Machine name
        name: String,

        /// Subject type (defaults to the singular PascalCase name)
        #[arg(short, long)]
        model: Option<String>,

        /// Comma-separated list of states
        #[arg(short, long, value_delimiter = ',')]
        states: Vec<String>,

        /// Initial state (defaults to the first state)
        #[arg(short, long)]
        initial: Option<String>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Generate Rust stubs for a definition's guards and actions
    Generate {
        /// Definition id (file stem)
        id: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match EngineConfig::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    };
    if let Some(path) = cli.path {
        config.definitions_path = path;
    }
    tracing::debug!(path = %config.definitions_path.display(), "using definitions directory");

    match commands::execute(&config, cli.command) {
        Ok(output) => {
            if !output.text.is_empty() {
                println!("{}", output.text);
            }
            if !output.success {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }

    Ok(())
}
