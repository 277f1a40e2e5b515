//! Ingress rule form engine
//!
//! This module provides:
//! - An immutable rule draft with copy-on-write edits
//! - Option sets derived from namespaces, controllers, services and secrets
//! - Auto-repair of selections that disappear from the option set
//! - Full validation into a field-keyed error map
//! - A form session owning draft, options and errors for one create or edit

mod draft;
mod options;
mod reconcile;
mod session;
mod validate;


pub use draft::{
    Annotation, AnnotationPreset, Host, IngressDraft, Path, PathField, DEFAULT_PATH_TYPE,
    NONE_CLASS,
};
pub use options::{
    class_options, existing_class, existing_names, hosts_with_tls, namespace_options,
    service_groups, service_ports, tls_options, ClassOption, ClassStatus, OptionSet,
    ReferenceData, SelectOption, ServiceGroup, ServiceOption, NO_TLS_LABEL, SERVICE_TYPES,
};
pub use reconcile::{default_prefix, next_rule_name, reconcile, reconcile_tracked, Repair};
pub use session::FormSession;
pub use validate::{messages, validate, ValidationContext, ValidationErrorMap};

use crate::models::{IngressController, IngressRecord, NamespaceInfo, ServiceInfo, TlsSecret};
use anyhow::Result;
use serde::Serialize;
use std::fmt;

pub use async_trait::async_trait;

/// Whether a form creates a new rule or edits a persisted one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum FormMode {
    #[default]
    Create,
    Edit { namespace: String, name: String },
}

impl FormMode {
    pub fn is_edit(&self) -> bool {
        matches!(self, FormMode::Edit { .. })
    }

    /// Whether this form edits the rule `namespace/name`
    pub fn is_rule(&self, namespace: &str, name: &str) -> bool {
        match self {
            FormMode::Edit {
                namespace: ns,
                name: n,
            } => ns == namespace && n == name,
            FormMode::Create => false,
        }
    }

    /// Verb used in authorization messages
    pub fn verb(&self) -> &'static str {
        match self {
            FormMode::Create => "add",
            FormMode::Edit { .. } => "edit",
        }
    }

    pub fn action(&self) -> SubmitAction {
        match self {
            FormMode::Create => SubmitAction::Create,
            FormMode::Edit { .. } => SubmitAction::Update,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitAction {
    Create,
    Update,
}

impl SubmitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitAction::Create => "create",
            SubmitAction::Update => "update",
        }
    }

    pub fn success_message(&self) -> &'static str {
        match self {
            SubmitAction::Create => "Ingress created successfully",
            SubmitAction::Update => "Ingress updated successfully",
        }
    }
}

impl fmt::Display for SubmitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend lists the form draws its options from
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn namespaces(&self) -> Result<Vec<NamespaceInfo>>;

    /// Controllers, with availability as seen from `namespace`
    async fn ingress_controllers(&self, namespace: &str) -> Result<Vec<IngressController>>;

    async fn services(&self, namespace: &str) -> Result<Vec<ServiceInfo>>;

    /// Secrets of type `kubernetes.io/tls` in `namespace`
    async fn tls_secrets(&self, namespace: &str) -> Result<Vec<TlsSecret>>;

    /// Persisted rules across all namespaces
    async fn existing_rules(&self) -> Result<Vec<IngressRecord>>;
}

/// Persists a rule
#[async_trait]
pub trait RuleSubmitter: Send + Sync {
    async fn submit(&self, action: SubmitAction, rule: &IngressRecord) -> Result<()>;
}
