//! Load and unload command implementations.

use anyhow::{Context, Result};
use colored::Colorize;
use molopt_core::AppState;
use molopt_models::ModelId;
use serde_json::json;

/// Loads `model` into the cache.
pub async fn load(state: &AppState, model: ModelId, json_output: bool) -> Result<()> {
    let lease = state
        .cache()
        .lease(model)
        .await
        .with_context(|| format!("Failed to load {}", model))?;
    let device = lease.device();
    drop(lease);

    let resident = state.cache().resident_models();
    if json_output {
        return super::print_json(&json!({
            "model": model,
            "device": device.to_string(),
            "resident": resident,
        }));
    }

    println!("{} {} on {}", "Loaded".green(), model.to_string().bold(), device);
    println!("  Resident: {}", join(&resident));
    Ok(())
}

/// Evicts `model` from the cache.
pub async fn unload(state: &AppState, model: ModelId, json_output: bool) -> Result<()> {
    let evicted = state.cache().evict(model).await;
    let resident = state.cache().resident_models();

    if json_output {
        return super::print_json(&json!({
            "model": model,
            "evicted": evicted,
            "resident": resident,
        }));
    }

    if evicted {
        println!("{} {}", "Unloaded".green(), model.to_string().bold());
    } else {
        println!("{} was not resident", model.to_string().yellow());
    }
    println!("  Resident: {}", join(&resident));
    Ok(())
}

fn join(models: &[ModelId]) -> String {
    if models.is_empty() {
        return "none".to_string();
    }
    models.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
