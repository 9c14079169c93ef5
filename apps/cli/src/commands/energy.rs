//! Energy command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use molopt_core::{AppState, parse_xyz};
use molopt_models::ModelId;
use std::path::Path;

/// Execute the energy command on an XYZ file.
pub async fn execute(state: &AppState, file: &Path, model: Option<ModelId>, json_output: bool) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let geometry = parse_xyz(&content)?;
    let report = state.optimizer().calculate_energy(&geometry, model).await?;

    if json_output {
        return super::print_json(&report);
    }

    println!("{}", "Single-point energy".bold().cyan());
    println!("  Model: {}", report.model_used.to_string().green());
    println!("  Energy: {}", format!("{:.6}", report.energy).bold());
    println!();
    for (element, [fx, fy, fz]) in report.elements.iter().zip(&report.forces) {
        println!("  {:<2} {:12.6} {:12.6} {:12.6}", super::symbol(*element), fx, fy, fz);
    }
    Ok(())
}
