//! Resource reservation commands

use anyhow::Result;
use console_lib::reservation::{DisplaySummary, ReservationEngine, ResourceSource};
use console_lib::{Capabilities, ConsoleLogger, Scope, Severity};
use serde::Serialize;
use std::sync::Arc;

use crate::output::{print_console_error, print_json, print_summary, OutputFormat};

#[derive(Serialize)]
struct ErrorReport {
    severity: Severity,
    message: String,
}

#[derive(Serialize)]
struct ReservationReport {
    scope: Scope,
    #[serde(flatten)]
    summary: DisplaySummary,
    errors: Vec<ErrorReport>,
}

/// Show capacity, reservation and usage for a scope
pub async fn show_reservation(
    source: Arc<dyn ResourceSource>,
    capabilities: Arc<dyn Capabilities>,
    scope: Scope,
    logger: ConsoleLogger,
    format: OutputFormat,
) -> Result<()> {
    let mut engine = ReservationEngine::new(source, capabilities, scope.clone()).with_logger(logger);
    let snapshot = engine.snapshot().await;
    let summary = snapshot.summary();

    match format {
        OutputFormat::Json => {
            let report = ReservationReport {
                scope: scope.clone(),
                summary,
                errors: snapshot
                    .errors
                    .iter()
                    .map(|e| ErrorReport {
                        severity: e.severity(),
                        message: e.to_string(),
                    })
                    .collect(),
            };
            print_json(&report)?;
        }
        OutputFormat::Table => {
            let title = match &scope {
                Scope::Cluster => "Cluster resource reservation".to_string(),
                Scope::Namespace(ns) => format!("Resource reservation for namespace {}", ns),
            };
            print_summary(&title, &summary);
            // Usage failures are already shown as the summary warning
            for error in snapshot
                .errors
                .iter()
                .filter(|e| e.severity() != Severity::RecoverableDegraded)
            {
                print_console_error(error);
            }
        }
    }

    let blocking = snapshot
        .errors
        .iter()
        .filter(|e| e.severity() == Severity::RecoverableBlocking)
        .count();
    if blocking > 0 {
        anyhow::bail!("{} resource quer{} failed", blocking, if blocking == 1 { "y" } else { "ies" });
    }

    Ok(())
}
