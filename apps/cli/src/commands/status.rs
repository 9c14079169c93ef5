//! Status command implementation.

use colored::Colorize;
use comfy_table::{Cell, Color, Table};
use molopt_core::AppState;
use molopt_core::ReadinessStatus;
use serde_json::json;

/// Execute the status command.
///
/// Shows per-model residency and freshness, device statistics and readiness.
pub async fn execute(state: &AppState, json_output: bool) -> anyhow::Result<()> {
    let snapshot = state.cache().list_status().await;
    let readiness = state.readiness().await;
    let stats = state.cache().stats();

    if json_output {
        return super::print_json(&json!({
            "service": state.config().service_name,
            "readiness": readiness,
            "models": snapshot.models,
            "device": snapshot.device,
            "cache": stats,
        }));
    }

    println!("{}", format!("{} Status", state.config().service_name).bold().cyan());
    println!();

    let readiness_label = match readiness.status {
        ReadinessStatus::Ready => "ready".green(),
        ReadinessStatus::Degraded => "degraded".yellow(),
    };
    println!("  Readiness: {}", readiness_label);
    println!(
        "  Freshness store: {}",
        if readiness.freshness_connected { "connected".green() } else { "unreachable".red() }
    );
    println!();

    println!("{}", "Device:".bold());
    let device = &snapshot.device;
    println!("  Device: {}", device.device.cyan());
    println!("  Accelerator: {}", if device.accelerator_available { "available" } else { "none" });
    println!(
        "  Memory usage: {:.1}% (threshold {:.1}%)",
        device.memory_usage * 100.0,
        device.memory_threshold * 100.0
    );
    println!("  Loaded: {}/{}", device.models_loaded, device.max_models);
    println!();

    println!("{}", "Models:".bold());
    let mut table = Table::new();
    table.set_header(vec!["Model", "Resident", "Accesses", "Last used", "Fresh (any process)"]);
    for (id, status) in &snapshot.models {
        let resident = if status.resident {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no")
        };
        let last_used = status
            .last_used_at
            .map_or_else(|| "-".to_string(), |at| at.format("%Y-%m-%d %H:%M:%S").to_string());
        let fresh = status
            .freshness
            .as_ref()
            .map_or_else(|| "-".to_string(), |record| format!("{} on {}", record.loaded_at.format("%H:%M:%S"), record.device));
        table.add_row(vec![
            Cell::new(id.to_string()),
            resident,
            Cell::new(status.access_count),
            Cell::new(last_used),
            Cell::new(fresh),
        ]);
    }
    println!("{table}");
    println!();

    println!(
        "  Hits: {}  Misses: {}  Hit rate: {:.0}%  Evictions: {}",
        stats.hits,
        stats.misses,
        stats.hit_rate() * 100.0,
        stats.total_evictions()
    );
    Ok(())
}
