//! molopt CLI - operator interface to the molecular optimization service
//!
//! Every invocation builds the service from configuration, runs one command
//! against it and shuts it down again.

mod commands;

use clap::{Parser, Subcommand};
use molopt_core::{AppState, Backend, ServiceConfig};
use molopt_models::ModelId;
use std::path::PathBuf;

use commands::{OptimizeArgs, batch, energy, models, optimize, select, status};

/// molopt - geometry optimization backed by a bounded model cache
#[derive(Parser, Debug)]
#[command(name = "molopt", author, version, about = "molopt - molecular geometry optimization")]
struct Args {
    /// Configuration file (TOML). Environment variables prefixed MOLOPT__ override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show models, device statistics and service readiness
    Status,

    /// Show which model the selector picks for a set of elements
    Select {
        /// Comma-separated element symbols or atomic numbers (e.g. C,H,O or 6,1,8)
        elements: String,
    },

    /// Load a model into the cache
    Load {
        /// Model name (ANI1ccx, ANI2x, ANI1x)
        model: ModelId,
    },

    /// Evict a model from the cache
    Unload {
        /// Model name (ANI1ccx, ANI2x, ANI1x)
        model: ModelId,
    },

    /// Compute the energy and forces of an XYZ structure
    Energy {
        /// XYZ file
        file: PathBuf,

        /// Model to use instead of the selector's choice
        #[arg(short, long)]
        model: Option<ModelId>,
    },

    /// Relax an XYZ structure
    Optimize {
        /// XYZ file
        file: PathBuf,

        #[command(flatten)]
        options: OptimizeArgs,
    },

    /// Embed a SMILES string and relax it
    Smiles {
        /// SMILES identifier
        identifier: String,

        #[command(flatten)]
        options: OptimizeArgs,
    },

    /// Relax several SMILES strings
    Batch {
        /// SMILES identifiers
        #[arg(required = true)]
        identifiers: Vec<String>,

        /// Run through the background job queue and report progress
        #[arg(long)]
        job: bool,

        #[command(flatten)]
        options: OptimizeArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ServiceConfig::load(args.config.as_deref())?;
    let level = args.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    molopt_core::logging::init(config.log_format, &level);

    let state = AppState::init(config, Backend::reference()).await?;
    let result = run(&state, args.command, args.json).await;
    state.shutdown().await;
    result
}

async fn run(state: &AppState, command: Command, json: bool) -> anyhow::Result<()> {
    match command {
        Command::Status => status::execute(state, json).await,
        Command::Select { elements } => select::execute(state, &elements, json),
        Command::Load { model } => models::load(state, model, json).await,
        Command::Unload { model } => models::unload(state, model, json).await,
        Command::Energy { file, model } => energy::execute(state, &file, model, json).await,
        Command::Optimize { file, options } => {
            optimize::execute_file(state, &file, &options, json).await
        }
        Command::Smiles { identifier, options } => {
            optimize::execute_identifier(state, &identifier, &options, json).await
        }
        Command::Batch { identifiers, job, options } => {
            batch::execute(state, identifiers, job, &options, json).await
        }
    }
}
