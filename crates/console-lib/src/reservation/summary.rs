//! Display summary for reservation figures

use super::engine::{ResourceFigure, UsageFigure};
use crate::units::{non_negative, round_to};
use serde::Serialize;
use std::fmt;

/// Shown when usage should be available but the metrics backend failed
pub const USAGE_WARNING: &str = "Resource usage is not currently available as Metrics Server is not responding. If you've recently upgraded, Metrics Server may take a while to restart, so please check back shortly.";

/// Share of a limit taken by a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "percent")]
pub enum Percentage {
    /// No usable limit
    Unavailable,
    /// Value above the limit
    Exceeded,
    Percent(u64),
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Percentage::Unavailable => Ok(()),
            Percentage::Exceeded => write!(f, "- Exceeded"),
            Percentage::Percent(p) => write!(f, "- {}%", p),
        }
    }
}

/// Percentage of `value` over `total`. A zero, missing or non-numeric total has no percentage.
pub fn percentage(value: f64, total: Option<f64>) -> Percentage {
    let total = match total {
        Some(t) if t.is_finite() && t != 0.0 => t,
        _ => return Percentage::Unavailable,
    };

    if value > total {
        return Percentage::Exceeded;
    }

    Percentage::Percent(non_negative((value / total * 100.0).round()) as u64)
}

/// `percentage` rendered as the bar suffix, e.g. "- 25%"
pub fn percentage_string(value: f64, total: Option<f64>) -> String {
    percentage(value, total).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BarKind {
    MemoryReservation,
    MemoryUsage,
    CpuReservation,
    CpuUsage,
}

impl BarKind {
    pub fn label(&self) -> &'static str {
        match self {
            BarKind::MemoryReservation => "Memory reservation",
            BarKind::MemoryUsage => "Memory usage",
            BarKind::CpuReservation => "CPU reservation",
            BarKind::CpuUsage => "CPU usage",
        }
    }
}

/// One progress bar: value over total, with its text annotation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceBar {
    pub kind: BarKind,
    pub label: String,
    pub value: f64,
    pub total: f64,
    pub percentage: Percentage,
    pub annotation: String,
}

impl ResourceBar {
    fn memory(kind: BarKind, value: f64, limit: f64) -> Self {
        let percentage = percentage(value, Some(limit));
        let annotation = format!("{} / {} MB {}", value, limit, percentage);
        Self::new(kind, value, limit, percentage, annotation)
    }

    fn cpu(kind: BarKind, value: f64, limit: f64) -> Self {
        let percentage = percentage(value, Some(limit));
        let annotation = format!(
            "{} / {} {}",
            round_to(value, 2),
            round_to(limit, 2),
            percentage
        );
        Self::new(kind, value, limit, percentage, annotation)
    }

    fn new(
        kind: BarKind,
        value: f64,
        total: f64,
        percentage: Percentage,
        annotation: String,
    ) -> Self {
        Self {
            kind,
            label: kind.label().to_string(),
            value,
            total,
            percentage,
            annotation: annotation.trim_end().to_string(),
        }
    }

    /// Filled share of the bar, clamped to [0, 1]
    pub fn fraction(&self) -> f64 {
        if self.total <= 0.0 {
            return 0.0;
        }
        (self.value / self.total).clamp(0.0, 1.0)
    }
}

/// Bars ready for rendering plus an optional degraded-usage warning
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DisplaySummary {
    pub bars: Vec<ResourceBar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl DisplaySummary {
    pub fn bar(&self, kind: BarKind) -> Option<&ResourceBar> {
        self.bars.iter().find(|b| b.kind == kind)
    }
}

/// Combine limits, reservation and usage into bars.
///
/// A bar exists only when its limit is positive; usage bars additionally
/// require usage to be available.
pub fn combine(
    limits: &ResourceFigure,
    reservation: &ResourceFigure,
    usage: &UsageFigure,
) -> DisplaySummary {
    let memory_limit = non_negative(limits.memory);
    let cpu_limit = non_negative(limits.cpu);
    let reservation = ResourceFigure::new(reservation.cpu, reservation.memory);
    let usage_figure = usage.figure();

    let mut bars = Vec::with_capacity(4);

    if memory_limit > 0.0 {
        bars.push(ResourceBar::memory(
            BarKind::MemoryReservation,
            reservation.memory,
            memory_limit,
        ));
        if usage.available {
            bars.push(ResourceBar::memory(
                BarKind::MemoryUsage,
                usage_figure.memory,
                memory_limit,
            ));
        }
    }

    if cpu_limit > 0.0 {
        bars.push(ResourceBar::cpu(
            BarKind::CpuReservation,
            reservation.cpu,
            cpu_limit,
        ));
        if usage.available {
            bars.push(ResourceBar::cpu(BarKind::CpuUsage, usage_figure.cpu, cpu_limit));
        }
    }

    DisplaySummary {
        bars,
        warning: (usage.available && usage.errored).then(|| USAGE_WARNING.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_string() {
        assert_eq!(percentage_string(2.0, Some(8.0)), "- 25%");
        assert_eq!(percentage_string(5.0, Some(0.0)), "");
        assert_eq!(percentage_string(5.0, None), "");
        assert_eq!(percentage_string(5.0, Some(f64::NAN)), "");
        assert_eq!(percentage_string(9.0, Some(8.0)), "- Exceeded");
        assert_eq!(percentage_string(8.0, Some(8.0)), "- 100%");
        assert_eq!(percentage_string(1.0, Some(3.0)), "- 33%");
    }

    #[test]
    fn test_bar_ordering_and_presence() {
        let limits = ResourceFigure::new(4.0, 8192.0);
        let reservation = ResourceFigure::new(1.0, 2048.0);
        let usage = UsageFigure {
            cpu: 2.0,
            memory: 4096.0,
            available: true,
            errored: false,
        };

        let summary = combine(&limits, &reservation, &usage);
        let kinds: Vec<BarKind> = summary.bars.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BarKind::MemoryReservation,
                BarKind::MemoryUsage,
                BarKind::CpuReservation,
                BarKind::CpuUsage
            ]
        );
        assert_eq!(
            summary.bar(BarKind::MemoryUsage).unwrap().annotation,
            "4096 / 8192 MB - 50%"
        );
        assert_eq!(summary.bar(BarKind::CpuUsage).unwrap().annotation, "2 / 4 - 50%");
        assert!(summary.warning.is_none());
    }

    #[test]
    fn test_zero_limits_suppress_bars() {
        let summary = combine(
            &ResourceFigure::default(),
            &ResourceFigure::new(1.0, 10.0),
            &UsageFigure::not_applicable(),
        );
        assert!(summary.bars.is_empty());
    }

    #[test]
    fn test_usage_bars_hidden_when_not_applicable() {
        let summary = combine(
            &ResourceFigure::new(2.0, 1024.0),
            &ResourceFigure::new(0.5, 512.0),
            &UsageFigure::not_applicable(),
        );
        assert_eq!(summary.bars.len(), 2);
        assert!(summary.bar(BarKind::MemoryUsage).is_none());
        assert!(summary.bar(BarKind::CpuUsage).is_none());
    }

    #[test]
    fn test_failed_usage_renders_zeroed_bars_with_warning() {
        let summary = combine(
            &ResourceFigure::new(2.0, 1024.0),
            &ResourceFigure::new(0.5, 512.0),
            &UsageFigure::failed(),
        );
        assert_eq!(summary.bars.len(), 4);
        assert_eq!(
            summary.bar(BarKind::CpuUsage).unwrap().annotation,
            "0 / 2 - 0%"
        );
        assert_eq!(summary.warning.as_deref(), Some(USAGE_WARNING));
    }

    #[test]
    fn test_exceeded_and_cpu_rounding() {
        let summary = combine(
            &ResourceFigure::new(1.333, 100.0),
            &ResourceFigure::new(1.5, 150.0),
            &UsageFigure::not_applicable(),
        );
        let memory = summary.bar(BarKind::MemoryReservation).unwrap();
        assert_eq!(memory.percentage, Percentage::Exceeded);
        assert_eq!(memory.annotation, "150 / 100 MB - Exceeded");
        assert_eq!(memory.fraction(), 1.0);

        let cpu = summary.bar(BarKind::CpuReservation).unwrap();
        assert_eq!(cpu.annotation, "1.5 / 1.33 - Exceeded");
    }
}
