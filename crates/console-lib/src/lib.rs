//! Console engine library for cluster resource and ingress views
//!
//! This crate provides the core functionality for:
//! - Kubernetes quantity normalization
//! - Capacity, reservation and usage aggregation
//! - Ingress rule drafting, reconciliation and validation
//! - Debounced revalidation
//! - Structured logging of engine events

pub mod capabilities;
pub mod error;
pub mod ingress;
pub mod models;
pub mod observability;
pub mod reservation;
pub mod scheduler;
pub mod units;

pub use capabilities::{permissions, Capabilities, StaticCapabilities};
pub use error::{ConsoleError, Severity};
pub use models::*;
pub use observability::ConsoleLogger;
pub use scheduler::{CoalescingScheduler, DebouncedValidator, ValidationPass};
