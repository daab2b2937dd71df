use colored::Colorize;
use kpb_core::engine::RunSummary;
use kpb_core::event::{EventKind, RunEvent};
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string(value)?;
    println!("{}", json);
    Ok(())
}

// ---------------------------------------------------------------------------
// Event presenter
// ---------------------------------------------------------------------------

/// Drain lifecycle events until the engine drops its sink.
pub async fn present(mut rx: mpsc::Receiver<RunEvent>, format: Format) {
    while let Some(event) = rx.recv().await {
        match format {
            Format::Text => println!("{}", describe(&event)),
            Format::Json => {
                if let Err(e) = print_json(&event) {
                    tracing::warn!("failed to print event: {e}");
                }
            }
        }
    }
}

fn describe(event: &RunEvent) -> String {
    let name = &event.component;
    match &event.kind {
        EventKind::ComponentStarted => format!("Running component '{name}'").cyan().bold().to_string(),
        EventKind::TestingApplyConditions => "Testing applyConditions".cyan().to_string(),
        EventKind::ApplyConditionsNotFulfilled => {
            "applyConditions not fulfilled, component considered applied"
                .cyan()
                .to_string()
        }
        EventKind::Applying => format!("'{name}' is to be applied").cyan().to_string(),
        EventKind::ApplyRetry { attempt, error } => {
            format!("Apply attempt {} failed, retrying: {error}", attempt + 1)
                .yellow()
                .to_string()
        }
        EventKind::TestingReadiness { attempt } => {
            format!("Testing readinessConditions ({})", attempt + 1)
                .cyan()
                .to_string()
        }
        EventKind::ComponentReady => format!("'{name}' is ready").green().to_string(),
    }
}

pub fn print_summary(summary: &RunSummary, format: Format) -> anyhow::Result<()> {
    match format {
        Format::Json => print_json(summary),
        Format::Text => {
            println!(
                "{}",
                format!(
                    "Playbook applied: {} component(s) applied, {} skipped",
                    summary.applied(),
                    summary.skipped()
                )
                .green()
                .bold()
            );
            Ok(())
        }
    }
}
