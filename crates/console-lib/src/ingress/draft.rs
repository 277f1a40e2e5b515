//! Ingress rule draft
//!
//! A draft is an immutable value. Every edit takes `&self` and returns a new
//! draft, so two drafts can be compared with `==` to detect a change.

use crate::models::{IngressRecord, RulePath, RuleTls};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const DEFAULT_PATH_TYPE: &str = "Prefix";

/// Class name that is submitted as an empty class
pub const NONE_CLASS: &str = "none";

fn new_key() -> String {
    Uuid::new_v4().to_string()
}

fn default_path_type() -> String {
    DEFAULT_PATH_TYPE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Path {
    #[serde(default = "new_key")]
    pub key: String,
    #[serde(default)]
    pub service_name: String,
    /// 0 when unset
    #[serde(default)]
    pub service_port: u16,
    #[serde(default)]
    pub route: String,
    #[serde(default = "default_path_type")]
    pub path_type: String,
}

impl Path {
    pub fn new() -> Self {
        Self {
            key: new_key(),
            service_name: String::new(),
            service_port: 0,
            route: String::new(),
            path_type: default_path_type(),
        }
    }
}

impl Default for Path {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    #[serde(default = "new_key")]
    pub key: String,
    #[serde(default)]
    pub host: String,
    /// Selected TLS secret, empty for no TLS
    #[serde(default)]
    pub secret_name: String,
    /// Catch-all rule without a host name
    #[serde(default)]
    pub no_host: bool,
    #[serde(default)]
    pub paths: Vec<Path>,
}

impl Host {
    pub fn new() -> Self {
        Self {
            key: new_key(),
            host: String::new(),
            secret_name: String::new(),
            no_host: false,
            paths: Vec::new(),
        }
    }

    /// A host-less entry, created with one empty path
    pub fn without_host() -> Self {
        Self {
            no_host: true,
            paths: vec![Path::new()],
            ..Self::new()
        }
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default = "new_key")]
    pub id: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl Annotation {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: new_key(),
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Commonly used annotations offered as one-click additions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnnotationPreset {
    Rewrite,
    Regex,
    IngressClass,
}

impl AnnotationPreset {
    pub fn annotation(self) -> Annotation {
        match self {
            AnnotationPreset::Rewrite => {
                Annotation::new("nginx.ingress.kubernetes.io/rewrite-target", "/$1")
            }
            AnnotationPreset::Regex => {
                Annotation::new("nginx.ingress.kubernetes.io/use-regex", "true")
            }
            AnnotationPreset::IngressClass => Annotation::new("kubernetes.io/ingress.class", ""),
        }
    }
}

/// Which field of a path an edit targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathField {
    Route(String),
    PathType(String),
    ServiceName(String),
    ServicePort(u16),
}

/// In-memory ingress rule being created or edited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressDraft {
    #[serde(default = "new_key")]
    pub key: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub class_name: String,
    /// Controller type behind `class_name`; empty when unresolved
    #[serde(default)]
    pub class_type: String,
    #[serde(default)]
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl IngressDraft {
    /// Fresh draft with a single empty host
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: new_key(),
            namespace: namespace.into(),
            name: name.into(),
            class_name: String::new(),
            class_type: String::new(),
            hosts: vec![Host::new()],
            annotations: Vec::new(),
            labels: BTreeMap::new(),
        }
    }

    /// Build an edit draft from a persisted rule
    pub fn from_rule(rule: &IngressRecord, class_type: Option<&str>) -> Self {
        let hosts = rule
            .hosts
            .iter()
            .map(|host| Host {
                key: new_key(),
                host: host.clone(),
                secret_name: rule
                    .tls
                    .iter()
                    .find(|tls| tls.hosts.iter().any(|h| h == host))
                    .map(|tls| tls.secret_name.clone())
                    .unwrap_or_default(),
                no_host: host.is_empty(),
                paths: rule
                    .paths
                    .iter()
                    .filter(|p| &p.host == host)
                    .map(|p| Path {
                        key: new_key(),
                        service_name: p.service_name.clone(),
                        service_port: p.port,
                        route: p.path.clone(),
                        path_type: if p.path_type.is_empty() {
                            default_path_type()
                        } else {
                            p.path_type.clone()
                        },
                    })
                    .collect(),
            })
            .collect();

        let annotations = rule
            .annotations
            .iter()
            .map(|(k, v)| Annotation::new(k.as_str(), v.as_str()))
            .collect();

        Self {
            key: new_key(),
            namespace: rule.namespace.clone(),
            name: rule.name.clone(),
            class_name: rule.class_name.clone(),
            class_type: class_type.unwrap_or_default().to_string(),
            hosts,
            annotations,
            labels: rule.labels.clone(),
        }
    }

    /// Submission payload. A `none` class is sent as an empty class.
    pub fn to_record(&self) -> IngressRecord {
        let class_name = if self.class_name == NONE_CLASS {
            String::new()
        } else {
            self.class_name.clone()
        };

        let paths = self
            .hosts
            .iter()
            .flat_map(|host| {
                host.paths.iter().map(move |p| RulePath {
                    ingress_name: self.name.clone(),
                    host: host.host.clone(),
                    path: p.route.clone(),
                    service_name: p.service_name.clone(),
                    port: p.service_port,
                    path_type: p.path_type.clone(),
                })
            })
            .collect();

        let tls = self
            .hosts
            .iter()
            .filter(|h| !h.secret_name.is_empty() && !h.host.is_empty())
            .map(|h| RuleTls {
                hosts: vec![h.host.clone()],
                secret_name: h.secret_name.clone(),
            })
            .collect();

        let annotations = self
            .annotations
            .iter()
            .map(|a| (a.key.clone(), a.value.clone()))
            .collect();

        IngressRecord {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            class_name,
            hosts: self.hosts.iter().map(|h| h.host.clone()).collect(),
            paths,
            tls,
            annotations,
            labels: self.labels.clone(),
            creation_date: None,
        }
    }

    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn with_class(&self, class_name: impl Into<String>, class_type: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            class_type: class_type.into(),
            ..self.clone()
        }
    }

    pub fn with_host_added(&self, no_host: bool) -> Self {
        let mut next = self.clone();
        next.hosts.push(if no_host {
            Host::without_host()
        } else {
            Host::new()
        });
        next
    }

    pub fn with_host_removed(&self, host: usize) -> Self {
        let mut next = self.clone();
        if host < next.hosts.len() {
            next.hosts.remove(host);
        }
        next
    }

    /// Rename a host. `bound_secret` is the secret already serving that name, if any.
    pub fn with_host_name(&self, host: usize, value: &str, bound_secret: Option<&str>) -> Self {
        self.map_host(host, |h| {
            h.host = value.to_string();
            if let Some(secret) = bound_secret.filter(|s| !s.is_empty()) {
                h.secret_name = secret.to_string();
            }
        })
    }

    pub fn with_secret(&self, host: usize, secret: &str) -> Self {
        self.map_host(host, |h| h.secret_name = secret.to_string())
    }

    pub fn with_path_added(&self, host: usize) -> Self {
        self.map_host(host, |h| h.paths.push(Path::new()))
    }

    pub fn with_path_removed(&self, host: usize, path: usize) -> Self {
        self.map_host(host, |h| {
            if path < h.paths.len() {
                h.paths.remove(path);
            }
        })
    }

    /// Edit one path field. Choosing a service also selects `first_port` when given.
    pub fn with_path_field(
        &self,
        host: usize,
        path: usize,
        field: PathField,
        first_port: Option<u16>,
    ) -> Self {
        self.map_host(host, |h| {
            let Some(p) = h.paths.get_mut(path) else {
                return;
            };
            match field {
                PathField::Route(route) => p.route = route,
                PathField::PathType(path_type) => p.path_type = path_type,
                PathField::ServicePort(port) => p.service_port = port,
                PathField::ServiceName(name) => {
                    p.service_name = name;
                    if let Some(port) = first_port {
                        p.service_port = port;
                    }
                }
            }
        })
    }

    pub fn with_annotation_added(&self, preset: Option<AnnotationPreset>) -> Self {
        let mut next = self.clone();
        next.annotations.push(
            preset
                .map(AnnotationPreset::annotation)
                .unwrap_or_else(|| Annotation::new("", "")),
        );
        next
    }

    pub fn with_annotation(&self, index: usize, key: &str, value: &str) -> Self {
        let mut next = self.clone();
        if let Some(a) = next.annotations.get_mut(index) {
            a.key = key.to_string();
            a.value = value.to_string();
        }
        next
    }

    pub fn with_annotation_removed(&self, index: usize) -> Self {
        let mut next = self.clone();
        if index < next.annotations.len() {
            next.annotations.remove(index);
        }
        next
    }

    pub fn with_labels(&self, labels: BTreeMap<String, String>) -> Self {
        Self {
            labels,
            ..self.clone()
        }
    }

    fn map_host(&self, host: usize, f: impl FnOnce(&mut Host)) -> Self {
        let mut next = self.clone();
        if let Some(h) = next.hosts.get_mut(host) {
            f(h);
        }
        next
    }
}
