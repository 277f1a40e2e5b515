//! Draft validation
//!
//! `validate` is total: every rule runs on every pass and all violations are
//! reported together, keyed by field path.

use super::draft::IngressDraft;
use super::options::OptionSet;
use super::FormMode;
use crate::models::{IngressController, IngressRecord};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]([a-z0-9-]{0,61}[a-z0-9])?$").unwrap());

static ANNOTATION_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").unwrap());

const MAX_PREFIX_LEN: usize = 253;
const MAX_NAME_LEN: usize = 63;

pub mod messages {
    pub const NAMESPACE_REQUIRED: &str = "Namespace is required";
    pub const NAME_REQUIRED: &str = "Ingress name is required";
    pub const NAME_INVALID: &str = "This field must consist of lower case alphanumeric characters or '-', contain at most 63 characters, start with an alphabetic character, and end with an alphanumeric character (e.g. 'my-name', or 'abc-123').";
    pub const NAME_EXISTS: &str = "Ingress name already exists";
    pub const CLASS_REQUIRED: &str = "Ingress class is required";
    pub const CLASS_MUST_BE_SET: &str = "No ingress class is currently set for this ingress - use of the console requires one to be set.";
    pub const CLASS_NOT_FOUND: &str = "Currently set to an ingress class that cannot be found in the cluster - you must select a valid class.";
    pub const CLASS_NO_ACCESS: &str = "Currently set to an ingress class that you do not have access to - you must select a valid class.";
    pub const KEY_REQUIRED: &str = "Key is required.";
    pub const KEY_DUPLICATE: &str = "Key is a duplicate of an existing one.";
    pub const KEY_SEGMENTS: &str =
        "Two segments are allowed, separated by a slash (/): a prefix (optional) and a name.";
    pub const KEY_PREFIX_TOO_LONG: &str = "Prefix (before the slash) can't exceed 253 characters.";
    pub const KEY_NAME_TOO_LONG: &str = "Name (after the slash) can't exceed 63 characters.";
    pub const KEY_SINGLE_TOO_LONG: &str = "Name (the segment after a slash (/), or only segment if no slash) can't exceed 63 characters.";
    pub const KEY_CHARACTERS: &str = "Start and end with alphanumeric characters only, limiting characters in between to dashes, underscores, and alphanumerics.";
    pub const VALUE_REQUIRED: &str = "Value is required.";
    pub const HOSTS_REQUIRED: &str = "At least one host is required";
    pub const HOST_REQUIRED: &str = "Host is required";
    pub const HOST_DUPLICATE: &str = "Host cannot be duplicated";
    pub const SERVICE_REQUIRED: &str = "Service name is required";
    pub const PORT_REQUIRED: &str = "Service port is required";
    pub const PATH_EMPTY: &str = "Path cannot be empty";
    pub const PATH_DUPLICATE: &str = "Paths cannot be duplicated";
    pub const PATH_IN_USE: &str = "Path is already in use with the same host";

    pub fn service_missing(service: &str) -> String {
        format!(
            "Currently set to {}, which does not exist. You can create a service with this name for a particular deployment via Applications, and on returning here it will be picked up.",
            service
        )
    }
}

/// Field path to message, fully recomputed on each pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrorMap(BTreeMap<String, String>);

impl ValidationErrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.insert(field.into(), message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Everything besides the draft that validation depends on
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    pub mode: FormMode,
    /// Names of persisted rules in the draft's namespace
    pub existing_names: Vec<String>,
    pub options: OptionSet,
    /// Controller serving the draft's current class
    pub existing_class: Option<IngressController>,
    /// Whether an edit draft has been populated from its persisted rule
    pub edit_class_set: bool,
    /// All persisted rules, for host and path collisions
    pub rules: Vec<IngressRecord>,
}

pub fn validate(draft: &IngressDraft, ctx: &ValidationContext) -> ValidationErrorMap {
    let mut errors = ValidationErrorMap::new();

    validate_identity(draft, ctx, &mut errors);
    validate_class(draft, ctx, &mut errors);
    validate_annotations(draft, &mut errors);
    validate_hosts(draft, ctx, &mut errors);

    errors
}

fn validate_identity(draft: &IngressDraft, ctx: &ValidationContext, errors: &mut ValidationErrorMap) {
    if ctx.mode.is_edit() {
        return;
    }

    if draft.namespace.is_empty() {
        errors.insert("namespace", messages::NAMESPACE_REQUIRED);
    }

    if draft.name.is_empty() {
        errors.insert("ingressName", messages::NAME_REQUIRED);
    } else if !NAME_REGEX.is_match(&draft.name) {
        errors.insert("ingressName", messages::NAME_INVALID);
    } else if ctx.existing_names.iter().any(|n| n == &draft.name) {
        errors.insert("ingressName", messages::NAME_EXISTS);
    }
}

fn validate_class(draft: &IngressDraft, ctx: &ValidationContext, errors: &mut ValidationErrorMap) {
    if !ctx.mode.is_edit() {
        let valid = ctx
            .options
            .valid_classes()
            .any(|class| class == draft.class_name);
        if ctx.options.controllers_loaded && (draft.class_name.is_empty() || !valid) {
            errors.insert("className", messages::CLASS_REQUIRED);
        }
        return;
    }

    if draft.class_name.is_empty() {
        if ctx.edit_class_set {
            errors.insert("className", messages::CLASS_MUST_BE_SET);
        }
        return;
    }

    let usable = ctx.existing_class.as_ref().map(|c| c.available).unwrap_or(false);
    if !usable {
        let message = if draft.class_type.is_empty() {
            messages::CLASS_NOT_FOUND
        } else {
            messages::CLASS_NO_ACCESS
        };
        errors.insert("className", message);
    }
}

fn annotation_key_error(key: &str) -> Option<&'static str> {
    let segments: Vec<&str> = key.split('/').collect();
    match segments.as_slice() {
        [name] => {
            if name.len() > MAX_NAME_LEN {
                Some(messages::KEY_SINGLE_TOO_LONG)
            } else if !ANNOTATION_NAME_REGEX.is_match(name) {
                Some(messages::KEY_CHARACTERS)
            } else {
                None
            }
        }
        [prefix, name] => {
            if prefix.len() > MAX_PREFIX_LEN {
                Some(messages::KEY_PREFIX_TOO_LONG)
            } else if name.len() > MAX_NAME_LEN {
                Some(messages::KEY_NAME_TOO_LONG)
            } else if !ANNOTATION_NAME_REGEX.is_match(name) {
                Some(messages::KEY_CHARACTERS)
            } else {
                None
            }
        }
        _ => Some(messages::KEY_SEGMENTS),
    }
}

fn validate_annotations(draft: &IngressDraft, errors: &mut ValidationErrorMap) {
    let mut seen: HashSet<&str> = HashSet::new();

    for (i, annotation) in draft.annotations.iter().enumerate() {
        let key_field = format!("annotations.key[{}]", i);
        if annotation.key.is_empty() {
            errors.insert(key_field, messages::KEY_REQUIRED);
        } else if seen.contains(annotation.key.as_str()) {
            errors.insert(key_field, messages::KEY_DUPLICATE);
        } else if let Some(message) = annotation_key_error(&annotation.key) {
            errors.insert(key_field, message);
        }

        if annotation.value.is_empty() {
            errors.insert(format!("annotations.value[{}]", i), messages::VALUE_REQUIRED);
        }

        seen.insert(annotation.key.as_str());
    }
}

/// Whether a persisted rule other than the one being edited routes `route` on `host`
fn route_in_use(ctx: &ValidationContext, host: &str, route: &str) -> bool {
    ctx.rules
        .iter()
        .filter(|rule| !ctx.mode.is_rule(&rule.namespace, &rule.name))
        .any(|rule| rule.routes(host, route))
}

fn validate_hosts(draft: &IngressDraft, ctx: &ValidationContext, errors: &mut ValidationErrorMap) {
    if draft.hosts.is_empty() {
        errors.insert("hosts", messages::HOSTS_REQUIRED);
        return;
    }

    let mut seen_hosts: HashSet<&str> = HashSet::new();

    for (hi, host) in draft.hosts.iter().enumerate() {
        if !host.no_host {
            if host.host.is_empty() {
                errors.insert(format!("hosts[{}].host", hi), messages::HOST_REQUIRED);
            } else if seen_hosts.contains(host.host.as_str()) {
                errors.insert(format!("hosts[{}].host", hi), messages::HOST_DUPLICATE);
            }
            seen_hosts.insert(host.host.as_str());
        }

        for (pi, path) in host.paths.iter().enumerate() {
            let service_field = format!("hosts[{}].paths[{}].servicename", hi, pi);
            if path.service_name.is_empty() {
                errors.insert(service_field, messages::SERVICE_REQUIRED);
            } else if ctx.mode.is_edit()
                && ctx.options.services_loaded
                && !ctx.options.has_service(&path.service_name)
            {
                errors.insert(service_field, messages::service_missing(&path.service_name));
            }

            if path.service_port == 0 {
                errors.insert(
                    format!("hosts[{}].paths[{}].serviceport", hi, pi),
                    messages::PORT_REQUIRED,
                );
            }
        }

        let mut route_counts: HashMap<&str, usize> = HashMap::new();
        for path in &host.paths {
            *route_counts.entry(path.route.as_str()).or_default() += 1;
        }

        for (pi, path) in host.paths.iter().enumerate() {
            let field = format!("hosts[{}].paths[{}].path", hi, pi);
            if path.route.is_empty() {
                errors.insert(field, messages::PATH_EMPTY);
            } else if route_counts[path.route.as_str()] > 1 {
                errors.insert(field, messages::PATH_DUPLICATE);
            } else if route_in_use(ctx, &host.host, &path.route) {
                errors.insert(field, messages::PATH_IN_USE);
            }
        }
    }
}
