//! Select command implementation.

use anyhow::{Context, Result, bail};
use colored::Colorize;
use molopt_abstraction::{AtomicNumber, atomic_number};
use molopt_core::AppState;
use serde_json::json;
use std::collections::BTreeSet;

/// Parses a comma-separated list of element symbols or atomic numbers.
pub fn parse_elements(input: &str) -> Result<BTreeSet<AtomicNumber>> {
    input
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            atomic_number(token)
                .or_else(|| token.parse().ok())
                .with_context(|| format!("Unknown element '{}'", token))
        })
        .collect()
}

/// Execute the select command.
pub fn execute(state: &AppState, elements: &str, json_output: bool) -> Result<()> {
    let required = parse_elements(elements)?;
    if required.is_empty() {
        bail!("No elements given");
    }
    let selected = state.optimizer().selector().select_best_model(&required);

    if json_output {
        return super::print_json(&json!({
            "elements": required,
            "model": selected,
        }));
    }

    let symbols: Vec<String> = required.iter().map(|z| super::symbol(*z)).collect();
    match selected {
        Some(model) => {
            println!("Elements {}: {}", symbols.join(", "), model.to_string().green().bold());
        }
        None => {
            println!("Elements {}: {}", symbols.join(", "), "no supporting model".red());
        }
    }
    Ok(())
}
