//! Command implementations for the molopt CLI.

pub mod batch;
pub mod energy;
pub mod models;
pub mod optimize;
pub mod select;
pub mod status;

use clap::Args;
use colored::Colorize;
use molopt_abstraction::{OptimizationAlgorithm, OptimizationParameters, element_symbol};
use molopt_core::OptimizationReport;
use molopt_models::ModelId;
use serde::Serialize;
use std::path::PathBuf;

/// Options shared by the optimizing commands.
#[derive(Args, Debug, Clone)]
pub struct OptimizeArgs {
    /// Model to use instead of the selector's choice
    #[arg(short, long)]
    pub model: Option<ModelId>,

    /// Optimization algorithm (LBFGS, BFGS, FIRE)
    #[arg(short, long, default_value = "LBFGS")]
    pub algorithm: OptimizationAlgorithm,

    /// Maximum number of optimizer steps
    #[arg(long, default_value_t = 1000)]
    pub max_steps: u32,

    /// Force convergence threshold
    #[arg(long, default_value_t = 1e-6)]
    pub fmax: f64,

    /// Total molecular charge
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub charge: i32,

    /// Write the final structure as XYZ to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl OptimizeArgs {
    /// Optimization parameters described by the options.
    pub fn parameters(&self) -> OptimizationParameters {
        OptimizationParameters {
            algorithm: self.algorithm,
            max_steps: self.max_steps,
            fmax: self.fmax,
            charge: self.charge,
        }
    }
}

/// Prints a value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Chemical symbol, or `X<number>` for elements without one.
pub fn symbol(element: u8) -> String {
    element_symbol(element).map_or_else(|| format!("X{}", element), ToString::to_string)
}

/// Prints an optimization report for humans.
pub fn print_report(report: &OptimizationReport) {
    if let Some(identifier) = &report.identifier {
        println!("  Identifier: {}", identifier.cyan());
    }
    println!("  Model: {}", report.model_used.to_string().green());
    println!("  Algorithm: {}", report.algorithm);
    println!("  Energy: {}", format!("{:.6}", report.energy).bold());
    let converged = if report.converged { "yes".green() } else { "no".yellow() };
    println!("  Converged: {} after {} steps", converged, report.steps_taken);
    println!("  Charge: {}", report.charge);
    println!();
    print!("{}", report.xyz);
}
