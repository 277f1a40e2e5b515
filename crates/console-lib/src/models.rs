//! Core data models shared with the management backend
//!
//! Backend-specific records use the backend's PascalCase field names.

use crate::units::NumberOrString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Scope of a reservation query
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "name")]
pub enum Scope {
    Cluster,
    Namespace(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Cluster => write!(f, "cluster"),
            Scope::Namespace(ns) => write!(f, "namespace/{}", ns),
        }
    }
}

/// Allocatable resources of one capacity entry (a node, or a namespace quota)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeCapacity {
    pub name: String,
    /// CPU quantity, optionally millicore or nanocore suffixed
    pub cpu: String,
    /// Memory quantity, byte-suffixed
    pub memory: String,
}

/// Aggregate resources requested by the workloads in scope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WorkloadRequests {
    /// Requested CPU in millicores
    #[serde(default)]
    pub cpu_request: f64,
    /// Requested memory, in bytes or as a quantity string
    #[serde(default)]
    pub memory_request: NumberOrString,
}

/// One live usage sample (a node, or a container)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSample {
    pub cpu: String,
    pub memory: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NamespaceInfo {
    pub name: String,
    #[serde(default)]
    pub is_system: bool,
}

/// An ingress controller as seen from one namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IngressController {
    #[serde(default)]
    pub name: String,
    pub class_name: String,
    /// Controller flavor, e.g. "nginx", "traefik", "custom"
    #[serde(rename = "Type", default)]
    pub controller_type: String,
    /// Whether the namespace may use this class
    #[serde(rename = "Availability", default)]
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServicePort {
    #[serde(default)]
    pub name: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceInfo {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(rename = "Type", default)]
    pub service_type: String,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
}

/// A secret of type `kubernetes.io/tls`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSecret {
    pub name: String,
    pub namespace: String,
}

/// One path of a persisted ingress rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RulePath {
    #[serde(default)]
    pub ingress_name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub path_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuleTls {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub secret_name: String,
}

/// Ingress rule in the backend's shape, used both for listing and submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IngressRecord {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub paths: Vec<RulePath>,
    #[serde(rename = "TLS", default)]
    pub tls: Vec<RuleTls>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
}

impl IngressRecord {
    /// Whether this rule already routes `path` on `host`
    pub fn routes(&self, host: &str, path: &str) -> bool {
        self.paths.iter().any(|p| p.host == host && p.path == path)
    }
}
