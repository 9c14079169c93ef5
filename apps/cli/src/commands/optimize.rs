//! Optimize and smiles command implementations.

use anyhow::{Context, Result};
use colored::Colorize;
use molopt_core::{AppState, OptimizationReport, parse_xyz};
use std::path::Path;

use super::OptimizeArgs;

/// Relaxes the structure in an XYZ file.
pub async fn execute_file(
    state: &AppState,
    file: &Path,
    options: &OptimizeArgs,
    json_output: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let geometry = parse_xyz(&content)?;
    let report = state
        .optimizer()
        .optimize_structure(geometry, options.model, &options.parameters())
        .await?;
    finish(&report, options, json_output)
}

/// Embeds a SMILES identifier and relaxes it.
pub async fn execute_identifier(
    state: &AppState,
    identifier: &str,
    options: &OptimizeArgs,
    json_output: bool,
) -> Result<()> {
    let report = state
        .optimizer()
        .optimize_identifier(identifier, options.model, &options.parameters())
        .await?;
    finish(&report, options, json_output)
}

fn finish(report: &OptimizationReport, options: &OptimizeArgs, json_output: bool) -> Result<()> {
    if let Some(path) = &options.output {
        std::fs::write(path, &report.xyz)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if json_output {
        return super::print_json(report);
    }

    println!("{}", "Optimization".bold().cyan());
    super::print_report(report);
    if let Some(path) = &options.output {
        println!();
        println!("  Written to {}", path.display().to_string().green());
    }
    Ok(())
}
