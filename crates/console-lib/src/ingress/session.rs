//! Form session
//!
//! A `FormSession` is the single owner of one form's draft, reference data,
//! option set and error map. Every change replaces the draft as a whole and is
//! followed by an option refresh and a reconcile pass.

use super::draft::{IngressDraft, PathField};
use super::options::{existing_class, existing_names, hosts_with_tls, OptionSet, ReferenceData};
use super::reconcile::{default_prefix, next_rule_name, reconcile_tracked};
use super::validate::{validate, ValidationContext, ValidationErrorMap};
use super::{FormMode, ReferenceSource, RuleSubmitter, SubmitAction};
use crate::capabilities::{permissions, Capabilities};
use crate::error::ConsoleError;
use crate::models::{
    IngressController, IngressRecord, NamespaceInfo, Scope, ServiceInfo, TlsSecret,
};
use crate::observability::ConsoleLogger;
use crate::scheduler::{DebouncedValidator, ValidationPass};
use tracing::debug;

pub struct FormSession {
    mode: FormMode,
    namespace: String,
    draft: IngressDraft,
    references: ReferenceData,
    options: OptionSet,
    errors: ValidationErrorMap,
    /// Set once an edit draft has been built from its persisted rule
    edit_class_set: bool,
    logger: ConsoleLogger,
}

impl FormSession {
    /// Open a form. Requires the ingress write permission.
    pub fn new(mode: FormMode, capabilities: &dyn Capabilities) -> Result<Self, ConsoleError> {
        if !capabilities.is_authorized(permissions::INGRESSES_WRITE) {
            return Err(ConsoleError::Unauthorized(format!("{} ingresses", mode.verb())));
        }

        let namespace = match &mode {
            FormMode::Edit { namespace, .. } => namespace.clone(),
            FormMode::Create => String::new(),
        };

        let draft = IngressDraft {
            hosts: Vec::new(),
            ..IngressDraft::new(namespace.as_str(), "")
        };

        Ok(Self {
            mode,
            namespace,
            draft,
            references: ReferenceData::default(),
            options: OptionSet::default(),
            errors: ValidationErrorMap::new(),
            edit_class_set: false,
            logger: ConsoleLogger::default(),
        })
    }

    pub fn with_logger(mut self, logger: ConsoleLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn mode(&self) -> &FormMode {
        &self.mode
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn draft(&self) -> &IngressDraft {
        &self.draft
    }

    pub fn options(&self) -> &OptionSet {
        &self.options
    }

    pub fn errors(&self) -> &ValidationErrorMap {
        &self.errors
    }

    pub fn references(&self) -> &ReferenceData {
        &self.references
    }

    /// Whether an edit form has its draft populated
    pub fn is_loaded(&self) -> bool {
        !self.mode.is_edit() || self.edit_class_set
    }

    pub fn set_namespaces(&mut self, namespaces: Vec<NamespaceInfo>) {
        self.references.namespaces = Some(namespaces);
        self.refresh();
    }

    pub fn set_controllers(&mut self, controllers: Vec<IngressController>) -> Result<(), ConsoleError> {
        self.references.controllers = Some(controllers);
        self.load_edit_draft()?;
        self.refresh();
        Ok(())
    }

    pub fn set_services(&mut self, services: Vec<ServiceInfo>) {
        self.references.services = Some(services);
        self.refresh();
    }

    pub fn set_secrets(&mut self, secrets: Vec<TlsSecret>) {
        self.references.secrets = Some(secrets);
        self.refresh();
    }

    pub fn set_rules(&mut self, rules: Vec<IngressRecord>) -> Result<(), ConsoleError> {
        self.references.rules = Some(rules);
        self.load_edit_draft()?;
        self.refresh();
        Ok(())
    }

    /// Switch the target namespace of a new rule and start an auto-named draft
    pub fn change_namespace(&mut self, namespace: &str) {
        if self.mode.is_edit() {
            debug!(namespace = %namespace, "Namespace is fixed while editing, ignoring change");
            return;
        }

        self.namespace = namespace.to_string();
        self.references.clear_namespaced();

        let rules = self.references.rules.as_deref().unwrap_or_default();
        let name = next_rule_name(rules, namespace, &default_prefix(namespace));
        self.draft = IngressDraft::new(namespace, name)
            .with_class(self.draft.class_name.as_str(), self.draft.class_type.as_str());
        self.refresh();
    }

    /// Apply a copy-on-write edit. A class change re-resolves the class type.
    pub fn edit(&mut self, f: impl FnOnce(&IngressDraft) -> IngressDraft) {
        let mut next = f(&self.draft);
        if next.class_name != self.draft.class_name {
            next.class_type = self.class_type_of(&next.class_name);
        }
        self.draft = next;
        self.refresh();
    }

    /// Rename a host, picking up the secret other rules already use for that name
    pub fn set_host(&mut self, host: usize, value: &str) {
        let bound = self
            .references
            .rules
            .as_deref()
            .map(hosts_with_tls)
            .and_then(|hosts| hosts.get(value).cloned());
        self.edit(|d| d.with_host_name(host, value, bound.as_deref()));
    }

    /// Select a service for a path, defaulting the port to the service's first port
    pub fn set_service(&mut self, host: usize, path: usize, service: &str) {
        let first_port = self
            .options
            .ports_for(service)
            .and_then(|ports| ports.first().copied());
        self.edit(|d| {
            d.with_path_field(host, path, PathField::ServiceName(service.to_string()), first_port)
        });
    }

    /// Fetch every reference list concurrently.
    ///
    /// Returns the recoverable fetch failures; a missing edit target is returned as `Err`.
    pub async fn load_references(
        &mut self,
        source: &dyn ReferenceSource,
    ) -> Result<Vec<ConsoleError>, ConsoleError> {
        let namespace = self.namespace.clone();
        let scoped = !namespace.is_empty();

        let (namespaces, rules, controllers, services, secrets) = tokio::join!(
            source.namespaces(),
            source.existing_rules(),
            async {
                if scoped {
                    Some(source.ingress_controllers(&namespace).await)
                } else {
                    None
                }
            },
            async {
                if scoped {
                    Some(source.services(&namespace).await)
                } else {
                    None
                }
            },
            async {
                if scoped {
                    Some(source.tls_secrets(&namespace).await)
                } else {
                    None
                }
            },
        );

        let mut errors = Vec::new();
        let scope = Scope::Namespace(namespace.clone());

        match namespaces {
            Ok(list) => self.set_namespaces(list),
            Err(e) => errors.push(self.reference_error("namespaces", &Scope::Cluster, &e)),
        }
        match services {
            Some(Ok(list)) => self.set_services(list),
            Some(Err(e)) => errors.push(self.reference_error("services", &scope, &e)),
            None => {}
        }
        match secrets {
            Some(Ok(list)) => self.set_secrets(list),
            Some(Err(e)) => errors.push(self.reference_error("secrets", &scope, &e)),
            None => {}
        }
        match controllers {
            Some(Ok(list)) => self.set_controllers(list)?,
            Some(Err(e)) => errors.push(self.reference_error("ingress controllers", &scope, &e)),
            None => {}
        }
        match rules {
            Ok(list) => self.set_rules(list)?,
            Err(e) => errors.push(self.reference_error("ingresses", &Scope::Cluster, &e)),
        }

        Ok(errors)
    }

    /// Snapshot of everything validation needs besides the draft
    pub fn validation_context(&self) -> ValidationContext {
        let rules = self.references.rules.as_deref().unwrap_or_default();
        let controllers = self.references.controllers.as_deref().unwrap_or_default();

        ValidationContext {
            mode: self.mode.clone(),
            existing_names: existing_names(rules, &self.namespace),
            options: self.options.clone(),
            existing_class: existing_class(controllers, &self.draft.class_name).cloned(),
            edit_class_set: self.edit_class_set,
            rules: rules.to_vec(),
        }
    }

    /// Run a validation pass over the current draft
    pub fn validate(&mut self) -> &ValidationErrorMap {
        self.errors = validate(&self.draft, &self.validation_context());
        self.logger.log_validation(&self.draft.name, self.errors.len());
        &self.errors
    }

    /// Queue a debounced pass over the current draft
    pub async fn schedule_validation(&self, validator: &DebouncedValidator) {
        validator
            .request(self.draft.clone(), self.validation_context())
            .await;
    }

    /// Accept a deferred validation result if it was computed for the current draft
    pub fn apply_validation(&mut self, pass: ValidationPass) -> bool {
        if pass.draft != self.draft {
            debug!(rule = %self.draft.name, "Discarding validation of a superseded draft");
            return false;
        }
        self.logger.log_validation(&self.draft.name, pass.errors.len());
        self.errors = pass.errors;
        true
    }

    /// Rule to submit; refused while the error map has entries
    pub fn payload(&self) -> Result<IngressRecord, ConsoleError> {
        if !self.errors.is_empty() {
            return Err(ConsoleError::Invalid(self.errors.len()));
        }

        let mut record = self.draft.to_record();
        record.namespace = self.namespace.clone();
        Ok(record)
    }

    /// Validate, then create or update the rule
    pub async fn submit(&mut self, submitter: &dyn RuleSubmitter) -> Result<SubmitAction, ConsoleError> {
        self.validate();
        let record = self.payload()?;
        let action = self.mode.action();

        match submitter.submit(action, &record).await {
            Ok(()) => {
                self.logger
                    .log_submission(action.as_str(), &record.namespace, &record.name, true);
                Ok(action)
            }
            Err(e) => {
                self.logger
                    .log_submission(action.as_str(), &record.namespace, &record.name, false);
                Err(ConsoleError::Submission {
                    action: action.as_str(),
                    message: ConsoleError::chain(&e),
                })
            }
        }
    }

    fn class_type_of(&self, class_name: &str) -> String {
        self.references
            .controllers
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|c| c.class_name == class_name)
            .map(|c| c.controller_type.clone())
            .unwrap_or_default()
    }

    /// Build the edit draft once both rules and controllers are known
    fn load_edit_draft(&mut self) -> Result<(), ConsoleError> {
        let FormMode::Edit { namespace, name } = &self.mode else {
            return Ok(());
        };
        if self.edit_class_set {
            return Ok(());
        }
        let (Some(rules), Some(controllers)) =
            (&self.references.rules, &self.references.controllers)
        else {
            return Ok(());
        };

        let rule = rules
            .iter()
            .find(|r| &r.namespace == namespace && &r.name == name)
            .ok_or_else(|| ConsoleError::MissingEntity {
                kind: "Ingress",
                name: format!("{}/{}", namespace, name),
            })?;

        let class_type = existing_class(controllers, &rule.class_name)
            .map(|c| c.controller_type.as_str());
        self.draft = IngressDraft::from_rule(rule, class_type);
        self.edit_class_set = true;
        debug!(namespace = %namespace, rule = %name, "Edit draft loaded");
        Ok(())
    }

    /// Recompute options, then repair the draft against them
    fn refresh(&mut self) {
        self.options = OptionSet::derive(&self.references, &self.draft, &self.mode);

        let (draft, repairs) = reconcile_tracked(&self.draft, &self.options);
        if repairs.is_empty() {
            return;
        }
        for repair in &repairs {
            self.logger
                .log_auto_repair(&repair.field, &repair.previous, &repair.replacement);
        }
        self.draft = draft;
        self.options = OptionSet::derive(&self.references, &self.draft, &self.mode);
    }

    fn reference_error(&self, kind: &'static str, scope: &Scope, err: &anyhow::Error) -> ConsoleError {
        let message = ConsoleError::chain(err);
        self.logger.log_fetch_failure(kind, scope, &message, false);
        ConsoleError::References { kind, message }
    }
}
