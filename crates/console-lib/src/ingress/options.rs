//! Option sets derived from reference data
//!
//! Reference lists are held as `Option<Vec<_>>`: `None` means the list has not
//! loaded yet, which several rules treat differently from an empty list.

use super::draft::IngressDraft;
use super::FormMode;
use crate::models::{
    IngressController, IngressRecord, NamespaceInfo, ServiceInfo, TlsSecret,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const NO_TLS_LABEL: &str = "No TLS";

/// Service types offered for selection, in display order
pub const SERVICE_TYPES: [&str; 3] = ["ClusterIP", "NodePort", "LoadBalancer"];

const CUSTOM_CONTROLLER: &str = "custom";

/// Reference lists loaded from the backend
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub namespaces: Option<Vec<NamespaceInfo>>,
    pub controllers: Option<Vec<IngressController>>,
    pub services: Option<Vec<ServiceInfo>>,
    pub secrets: Option<Vec<TlsSecret>>,
    pub rules: Option<Vec<IngressRecord>>,
}

impl ReferenceData {
    /// Drop the lists scoped to the active namespace
    pub fn clear_namespaced(&mut self) {
        self.controllers = None;
        self.services = None;
        self.secrets = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassStatus {
    Allowed,
    /// The class exists but this namespace may not use it
    Disallowed,
    /// No controller serves the class
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassOption {
    pub class_name: String,
    pub status: ClassStatus,
}

impl ClassOption {
    pub fn label(&self) -> String {
        match self.status {
            ClassStatus::Allowed => self.class_name.clone(),
            ClassStatus::Disallowed => format!("{} - DISALLOWED", self.class_name),
            ClassStatus::NotFound => format!("{} - NOT FOUND", self.class_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceOption {
    pub label: String,
    /// Label shown once selected, e.g. "frontend (ClusterIP)"
    pub selected_label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceGroup {
    pub service_type: String,
    pub options: Vec<ServiceOption>,
}

/// Everything a form can offer for selection
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptionSet {
    pub namespaces: Vec<SelectOption>,
    pub classes: Vec<ClassOption>,
    pub controllers_loaded: bool,
    pub tls: Vec<SelectOption>,
    pub secrets_loaded: bool,
    pub service_groups: Vec<ServiceGroup>,
    pub service_ports: BTreeMap<String, Vec<u16>>,
    pub services_loaded: bool,
}

impl OptionSet {
    pub fn derive(refs: &ReferenceData, draft: &IngressDraft, mode: &FormMode) -> Self {
        let controllers = refs.controllers.as_deref().unwrap_or_default();
        let services = refs.services.as_deref().unwrap_or_default();

        Self {
            namespaces: namespace_options(refs.namespaces.as_deref().unwrap_or_default()),
            classes: class_options(controllers, &draft.class_name, mode),
            controllers_loaded: refs.controllers.is_some(),
            tls: tls_options(refs.secrets.as_deref().unwrap_or_default(), &draft.namespace),
            secrets_loaded: refs.secrets.is_some(),
            service_groups: service_groups(services),
            service_ports: service_ports(services),
            services_loaded: refs.services.is_some(),
        }
    }

    /// Whether `class_name` appears in the class list under any status
    pub fn has_class(&self, class_name: &str) -> bool {
        self.classes.iter().any(|c| c.class_name == class_name)
    }

    /// Classes that pass validation
    pub fn valid_classes(&self) -> impl Iterator<Item = &str> {
        self.classes
            .iter()
            .filter(|c| c.status == ClassStatus::Allowed)
            .map(|c| c.class_name.as_str())
    }

    pub fn has_tls(&self, secret: &str) -> bool {
        self.tls.iter().any(|o| o.value == secret)
    }

    /// Value of the first TLS option, "" for "No TLS"
    pub fn first_tls(&self) -> &str {
        self.tls.first().map(|o| o.value.as_str()).unwrap_or_default()
    }

    /// Ports of a loaded service
    pub fn ports_for(&self, service: &str) -> Option<&[u16]> {
        self.service_ports.get(service).map(Vec::as_slice)
    }

    pub fn has_service(&self, service: &str) -> bool {
        self.service_groups
            .iter()
            .flat_map(|g| g.options.iter())
            .any(|o| o.value == service)
    }
}

/// Non-system namespaces
pub fn namespace_options(namespaces: &[NamespaceInfo]) -> Vec<SelectOption> {
    namespaces
        .iter()
        .filter(|ns| !ns.is_system)
        .map(|ns| SelectOption {
            label: ns.name.clone(),
            value: ns.name.clone(),
        })
        .collect()
}

/// Controller serving `class_name`; an empty class matches a custom controller
pub fn existing_class<'a>(
    controllers: &'a [IngressController],
    class_name: &str,
) -> Option<&'a IngressController> {
    controllers.iter().find(|c| {
        c.class_name == class_name || (c.controller_type == CUSTOM_CONTROLLER && class_name.is_empty())
    })
}

/// Available classes, plus the current class tagged when editing a rule whose class is unusable
pub fn class_options(
    controllers: &[IngressController],
    current_class: &str,
    mode: &FormMode,
) -> Vec<ClassOption> {
    let mut options: Vec<ClassOption> = controllers
        .iter()
        .filter(|c| c.available)
        .map(|c| ClassOption {
            class_name: c.class_name.clone(),
            status: ClassStatus::Allowed,
        })
        .collect();

    if current_class.is_empty() || !mode.is_edit() {
        return options;
    }

    match existing_class(controllers, current_class) {
        Some(existing) => {
            options.extend(
                controllers
                    .iter()
                    .filter(|c| !c.available && c.class_name == existing.class_name)
                    .map(|c| ClassOption {
                        class_name: c.class_name.clone(),
                        status: ClassStatus::Disallowed,
                    }),
            );
        }
        None => options.push(ClassOption {
            class_name: current_class.to_string(),
            status: ClassStatus::NotFound,
        }),
    }

    options
}

/// "No TLS" followed by the TLS secrets of `namespace`
pub fn tls_options(secrets: &[TlsSecret], namespace: &str) -> Vec<SelectOption> {
    std::iter::once(SelectOption {
        label: NO_TLS_LABEL.to_string(),
        value: String::new(),
    })
    .chain(
        secrets
            .iter()
            .filter(|s| s.namespace == namespace)
            .map(|s| SelectOption {
                label: s.name.clone(),
                value: s.name.clone(),
            }),
    )
    .collect()
}

/// Services grouped by type; empty groups and unknown types are dropped
pub fn service_groups(services: &[ServiceInfo]) -> Vec<ServiceGroup> {
    SERVICE_TYPES
        .iter()
        .map(|service_type| ServiceGroup {
            service_type: service_type.to_string(),
            options: services
                .iter()
                .filter(|s| s.service_type == *service_type)
                .map(|s| ServiceOption {
                    label: s.name.clone(),
                    selected_label: format!("{} ({})", s.name, s.service_type),
                    value: s.name.clone(),
                })
                .collect(),
        })
        .filter(|g| !g.options.is_empty())
        .collect()
}

pub fn service_ports(services: &[ServiceInfo]) -> BTreeMap<String, Vec<u16>> {
    services
        .iter()
        .map(|s| (s.name.clone(), s.ports.iter().map(|p| p.port).collect()))
        .collect()
}

/// Secret bound to each host name by persisted rules
pub fn hosts_with_tls(rules: &[IngressRecord]) -> HashMap<String, String> {
    rules
        .iter()
        .flat_map(|r| r.tls.iter())
        .flat_map(|tls| tls.hosts.iter().map(|h| (h.clone(), tls.secret_name.clone())))
        .collect()
}

/// Names of persisted rules in `namespace`
pub fn existing_names(rules: &[IngressRecord], namespace: &str) -> Vec<String> {
    rules
        .iter()
        .filter(|r| r.namespace == namespace)
        .map(|r| r.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServicePort;

    fn controller(class_name: &str, controller_type: &str, available: bool) -> IngressController {
        IngressController {
            name: class_name.to_string(),
            class_name: class_name.to_string(),
            controller_type: controller_type.to_string(),
            available,
        }
    }

    fn service(name: &str, service_type: &str, ports: &[u16]) -> ServiceInfo {
        ServiceInfo {
            name: name.to_string(),
            namespace: "web".to_string(),
            service_type: service_type.to_string(),
            ports: ports
                .iter()
                .map(|p| ServicePort {
                    name: String::new(),
                    port: *p,
                    protocol: "TCP".to_string(),
                })
                .collect(),
        }
    }

    fn edit_mode() -> FormMode {
        FormMode::Edit {
            namespace: "web".into(),
            name: "web-ingress-1".into(),
        }
    }

    #[test]
    fn test_class_options_create_lists_available_only() {
        let controllers = vec![
            controller("nginx", "nginx", true),
            controller("traefik", "traefik", false),
        ];
        let options = class_options(&controllers, "traefik", &FormMode::Create);
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].label(), "nginx");
    }

    #[test]
    fn test_class_options_edit_tags_current_class() {
        let controllers = vec![
            controller("nginx", "nginx", true),
            controller("traefik", "traefik", false),
        ];

        let options = class_options(&controllers, "traefik", &edit_mode());
        assert_eq!(options.len(), 2);
        assert_eq!(options[1].status, ClassStatus::Disallowed);
        assert_eq!(options[1].label(), "traefik - DISALLOWED");

        let options = class_options(&controllers, "haproxy", &edit_mode());
        assert_eq!(options[1].status, ClassStatus::NotFound);
        assert_eq!(options[1].label(), "haproxy - NOT FOUND");

        let options = class_options(&controllers, "nginx", &edit_mode());
        assert_eq!(options.len(), 1);
    }

    #[test]
    fn test_existing_class_matches_custom_for_empty_name() {
        let controllers = vec![
            controller("nginx", "nginx", true),
            controller("", "custom", true),
        ];
        assert_eq!(
            existing_class(&controllers, "").map(|c| c.controller_type.as_str()),
            Some("custom")
        );
        assert!(existing_class(&controllers, "missing").is_none());
    }

    #[test]
    fn test_tls_options_start_with_no_tls() {
        let secrets = vec![
            TlsSecret {
                name: "web-tls".into(),
                namespace: "web".into(),
            },
            TlsSecret {
                name: "other-tls".into(),
                namespace: "other".into(),
            },
        ];
        let options = tls_options(&secrets, "web");
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].label, NO_TLS_LABEL);
        assert_eq!(options[0].value, "");
        assert_eq!(options[1].value, "web-tls");
    }

    #[test]
    fn test_service_groups_drop_empty_groups() {
        let services = vec![
            service("lb", "LoadBalancer", &[443]),
            service("frontend", "ClusterIP", &[80, 8080]),
            service("external", "ExternalName", &[]),
        ];
        let groups = service_groups(&services);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].service_type, "ClusterIP");
        assert_eq!(groups[0].options[0].selected_label, "frontend (ClusterIP)");
        assert_eq!(groups[1].service_type, "LoadBalancer");

        let ports = service_ports(&services);
        assert_eq!(ports["frontend"], vec![80, 8080]);
        assert!(ports["external"].is_empty());
    }

    #[test]
    fn test_namespace_options_skip_system() {
        let namespaces = vec![
            NamespaceInfo {
                name: "kube-system".into(),
                is_system: true,
            },
            NamespaceInfo {
                name: "web".into(),
                is_system: false,
            },
        ];
        let options = namespace_options(&namespaces);
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].value, "web");
    }

    #[test]
    fn test_derive_tracks_loaded_lists() {
        let draft = IngressDraft::new("web", "web-ingress-1");
        let options = OptionSet::derive(&ReferenceData::default(), &draft, &FormMode::Create);
        assert!(!options.controllers_loaded);
        assert!(!options.secrets_loaded);
        assert_eq!(options.tls.len(), 1);
        assert_eq!(options.first_tls(), "");

        let refs = ReferenceData {
            controllers: Some(vec![]),
            services: Some(vec![service("frontend", "ClusterIP", &[80])]),
            ..Default::default()
        };
        let options = OptionSet::derive(&refs, &draft, &FormMode::Create);
        assert!(options.controllers_loaded);
        assert!(options.has_service("frontend"));
        assert_eq!(options.ports_for("frontend"), Some(&[80][..]));
        assert_eq!(options.valid_classes().count(), 0);
    }
}
