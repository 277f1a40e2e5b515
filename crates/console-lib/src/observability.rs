//! Structured logging for console engine events
//!
//! Every record carries an `event` field and the environment it concerns so
//! log pipelines can filter by either.

use crate::models::Scope;
use tracing::{debug, info, warn};

/// Structured logger for reservation and ingress events
#[derive(Debug, Clone)]
pub struct ConsoleLogger {
    environment: String,
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new("local")
    }
}

impl ConsoleLogger {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Log a failed data query
    pub fn log_fetch_failure(&self, source: &str, scope: &Scope, error: &str, degraded: bool) {
        if degraded {
            warn!(
                event = "fetch_degraded",
                environment = %self.environment,
                source = %source,
                scope = %scope,
                error = %error,
                "Query failed, continuing with partial data"
            );
        } else {
            warn!(
                event = "fetch_failed",
                environment = %self.environment,
                source = %source,
                scope = %scope,
                error = %error,
                "Query failed"
            );
        }
    }

    /// Log a query skipped by its gate
    pub fn log_fetch_skipped(&self, source: &str, scope: &Scope, reason: &str) {
        debug!(
            event = "fetch_skipped",
            environment = %self.environment,
            source = %source,
            scope = %scope,
            reason = %reason,
            "Query not issued"
        );
    }

    /// Log a draft field replaced because its option disappeared
    pub fn log_auto_repair(&self, field: &str, previous: &str, replacement: &str) {
        info!(
            event = "draft_auto_repair",
            environment = %self.environment,
            field = %field,
            previous = %previous,
            replacement = %replacement,
            "Selection no longer available, replaced"
        );
    }

    /// Log a completed validation pass
    pub fn log_validation(&self, rule: &str, error_count: usize) {
        debug!(
            event = "draft_validated",
            environment = %self.environment,
            rule = %rule,
            error_count = error_count,
            "Validation pass complete"
        );
    }

    /// Log a rule submission outcome
    pub fn log_submission(&self, action: &str, namespace: &str, name: &str, success: bool) {
        if success {
            info!(
                event = "ingress_submitted",
                environment = %self.environment,
                action = %action,
                namespace = %namespace,
                name = %name,
                "Ingress submitted"
            );
        } else {
            warn!(
                event = "ingress_submit_failed",
                environment = %self.environment,
                action = %action,
                namespace = %namespace,
                name = %name,
                "Ingress submission rejected"
            );
        }
    }
}
