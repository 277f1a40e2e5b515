//! CLI command implementations

pub mod ingress;
pub mod reservation;
