//! Output formatting utilities

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use console_lib::ingress::ValidationErrorMap;
use console_lib::reservation::{DisplaySummary, Percentage, ResourceBar};
use console_lib::{ConsoleError, Severity};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Width of a rendered progress bar, in cells
const BAR_WIDTH: usize = 30;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled>(items: &[T]) {
    if items.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(items).with(Style::rounded()).to_string();
    println!("{}", table);
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Report an engine error according to its severity
pub fn print_console_error(error: &ConsoleError) {
    match error.severity() {
        Severity::RecoverableDegraded => print_warning(&error.to_string()),
        _ => print_error(&error.to_string()),
    }
}

/// Render one bar as `label [#####.....] annotation`
pub fn render_bar(bar: &ResourceBar) -> String {
    let filled = (bar.fraction() * BAR_WIDTH as f64).round() as usize;
    let cells = format!(
        "{}{}",
        "#".repeat(filled),
        ".".repeat(BAR_WIDTH.saturating_sub(filled))
    );
    let cells = match bar.percentage {
        Percentage::Exceeded => cells.red().to_string(),
        Percentage::Percent(p) if p >= 80 => cells.yellow().to_string(),
        _ => cells.green().to_string(),
    };
    format!("{:<20} [{}] {}", bar.label, cells, bar.annotation)
}

/// Print a reservation summary as progress bars
pub fn print_summary(title: &str, summary: &DisplaySummary) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(60));

    if summary.bars.is_empty() {
        print_info("No resource limits available");
    }
    for bar in &summary.bars {
        println!("{}", render_bar(bar));
    }
    if let Some(warning) = &summary.warning {
        println!();
        print_warning(warning);
    }
}

#[derive(Tabled)]
struct ValidationRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Error")]
    message: String,
}

/// Print validation errors as a field/message table
pub fn print_validation_errors(errors: &ValidationErrorMap) {
    let rows: Vec<ValidationRow> = errors
        .iter()
        .map(|(field, message)| ValidationRow {
            field: field.cyan().to_string(),
            message: message.to_string(),
        })
        .collect();
    print_table(&rows);
}

/// Format an RFC 3339 timestamp for tables; unparseable input is shown as-is
pub fn format_timestamp(ts: &str) -> String {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| ts.to_string())
}
