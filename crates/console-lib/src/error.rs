//! Error taxonomy shared by the reservation and ingress engines

use serde::Serialize;
use thiserror::Error;

/// How the caller should react to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Partial data is still usable; show a persistent warning
    RecoverableDegraded,
    /// Dependent figures are suppressed; raise a global error notification
    RecoverableBlocking,
    /// A required upstream entity is missing; leave the view
    FatalNavigation,
    /// The draft does not pass validation; submission stays disabled
    Validation,
}

/// Errors surfaced by the console engines
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("Unable to retrieve resource limit data: {0}")]
    Capacity(String),

    #[error("Unable to retrieve resource reservation data: {0}")]
    Reservation(String),

    #[error("Unable to retrieve resource usage data: {0}")]
    Usage(String),

    #[error("Unable to retrieve {kind}: {message}")]
    References { kind: &'static str, message: String },

    #[error("Not authorized to {0}")]
    Unauthorized(String),

    #[error("{kind} '{name}' not found")]
    MissingEntity { kind: &'static str, name: String },

    #[error("Draft has {0} validation error(s)")]
    Invalid(usize),

    #[error("Unable to {action} ingress: {message}")]
    Submission { action: &'static str, message: String },
}

impl ConsoleError {
    pub fn severity(&self) -> Severity {
        match self {
            ConsoleError::Usage(_) => Severity::RecoverableDegraded,
            ConsoleError::Capacity(_)
            | ConsoleError::Reservation(_)
            | ConsoleError::References { .. }
            | ConsoleError::Submission { .. } => Severity::RecoverableBlocking,
            ConsoleError::Unauthorized(_) | ConsoleError::MissingEntity { .. } => {
                Severity::FatalNavigation
            }
            ConsoleError::Invalid(_) => Severity::Validation,
        }
    }

    /// Flatten an `anyhow` error chain into a single message
    pub(crate) fn chain(err: &anyhow::Error) -> String {
        format!("{:#}", err)
    }
}
