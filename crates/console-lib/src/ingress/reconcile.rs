//! Draft repair against the current option set
//!
//! `reconcile` is a pure reducer: it only replaces selections that no longer
//! exist, and a second pass over its output changes nothing.

use super::draft::IngressDraft;
use super::options::OptionSet;
use crate::models::IngressRecord;
use regex::Regex;
use std::sync::LazyLock;

/// Trailing integer of an auto-generated rule name
static NUMBERED_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*)-(\d+)$").unwrap());

/// One field replaced by `reconcile`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repair {
    /// Field path, in the same notation as validation errors
    pub field: String,
    pub previous: String,
    pub replacement: String,
}

/// Replace selections missing from `options`
pub fn reconcile(draft: &IngressDraft, options: &OptionSet) -> IngressDraft {
    reconcile_tracked(draft, options).0
}

/// `reconcile`, also reporting each replaced field
pub fn reconcile_tracked(draft: &IngressDraft, options: &OptionSet) -> (IngressDraft, Vec<Repair>) {
    let mut next = draft.clone();
    let mut repairs = Vec::new();

    if options.controllers_loaded
        && !next.class_name.is_empty()
        && !options.has_class(&next.class_name)
    {
        repairs.push(Repair {
            field: "className".to_string(),
            previous: std::mem::take(&mut next.class_name),
            replacement: String::new(),
        });
        next.class_type.clear();
    }

    for (hi, host) in next.hosts.iter_mut().enumerate() {
        if options.secrets_loaded && !options.has_tls(&host.secret_name) {
            let replacement = options.first_tls().to_string();
            repairs.push(Repair {
                field: format!("hosts[{}].secret", hi),
                previous: std::mem::replace(&mut host.secret_name, replacement.clone()),
                replacement,
            });
        }

        for (pi, path) in host.paths.iter_mut().enumerate() {
            let Some(ports) = options.ports_for(&path.service_name) else {
                continue;
            };
            let Some(&first) = ports.first() else {
                continue;
            };
            if !ports.contains(&path.service_port) {
                repairs.push(Repair {
                    field: format!("hosts[{}].paths[{}].serviceport", hi, pi),
                    previous: path.service_port.to_string(),
                    replacement: first.to_string(),
                });
                path.service_port = first;
            }
        }
    }

    (next, repairs)
}

/// Default name prefix for new rules in `namespace`
pub fn default_prefix(namespace: &str) -> String {
    format!("{}-ingress", namespace)
}

/// Propose `{prefix}-{n}` with `n` one above the highest numbered rule in `namespace`
pub fn next_rule_name(rules: &[IngressRecord], namespace: &str, prefix: &str) -> String {
    let max = rules
        .iter()
        .filter(|r| r.namespace == namespace)
        .filter_map(|r| NUMBERED_NAME_REGEX.captures(&r.name))
        .filter(|caps| &caps[1] == prefix)
        .filter_map(|caps| caps[2].parse::<u64>().ok())
        .max()
        .unwrap_or(0);

    format!("{}-{}", prefix, max + 1)
}
