//! Batch command implementation.

use anyhow::{Result, anyhow, bail};
use colored::Colorize;
use comfy_table::{Cell, Color, Table};
use molopt_core::{AppState, BatchReport, JobRequest, JobState};
use std::time::Duration;

use super::OptimizeArgs;

/// Execute the batch command.
///
/// With `job` set the batch runs through the background queue and progress is
/// reported on stderr while it runs.
pub async fn execute(
    state: &AppState,
    identifiers: Vec<String>,
    job: bool,
    options: &OptimizeArgs,
    json_output: bool,
) -> Result<()> {
    let report = if job {
        run_as_job(state, identifiers, options).await?
    } else {
        state
            .optimizer()
            .batch_optimize(&identifiers, options.model, &options.parameters())
            .await?
    };

    if json_output {
        return super::print_json(&report);
    }

    println!("{}", "Batch optimization".bold().cyan());
    let mut table = Table::new();
    table.set_header(vec!["Identifier", "Model", "Energy", "Steps", "Converged", "Error"]);
    for item in &report.results {
        match &item.report {
            Some(result) => table.add_row(vec![
                Cell::new(&item.identifier),
                Cell::new(result.model_used.to_string()),
                Cell::new(format!("{:.6}", result.energy)),
                Cell::new(result.steps_taken),
                Cell::new(if result.converged { "yes" } else { "no" }),
                Cell::new(""),
            ]),
            None => table.add_row(vec![
                Cell::new(&item.identifier),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new(item.error.as_deref().unwrap_or("unknown error")).fg(Color::Red),
            ]),
        };
    }
    println!("{table}");
    println!(
        "  {} succeeded, {} failed of {}",
        report.successful.to_string().green(),
        report.failed.to_string().red(),
        report.total
    );
    Ok(())
}

async fn run_as_job(state: &AppState, identifiers: Vec<String>, options: &OptimizeArgs) -> Result<BatchReport> {
    let id = state.jobs().submit(JobRequest::Batch {
        identifiers,
        model: options.model,
        params: options.parameters(),
    });
    eprintln!("Submitted job {}", id.to_string().cyan());

    let mut poll = tokio::time::interval(Duration::from_millis(100));
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_message = String::new();
    loop {
        poll.tick().await;
        let status = state.jobs().status(id).ok_or_else(|| anyhow!("Job {} disappeared", id))?;
        if status.message != last_message {
            eprintln!("  [{:>5.1}%] {}", status.progress, status.message);
            last_message.clone_from(&status.message);
        }

        match status.state {
            JobState::Queued | JobState::Running => {}
            JobState::Completed => {
                let result = status.result.ok_or_else(|| anyhow!("Job {} completed without a result", id))?;
                return Ok(serde_json::from_value(result)?);
            }
            JobState::Failed => {
                bail!("Job {} failed: {}", id, status.error.unwrap_or_default());
            }
            JobState::Cancelled => bail!("Job {} was cancelled", id),
        }
    }
}
