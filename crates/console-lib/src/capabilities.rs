//! Caller capabilities injected into the engines

use std::collections::HashSet;

/// Permission names understood by the management backend
pub mod permissions {
    /// Read cluster nodes, required to see live usage figures
    pub const CLUSTER_NODE_READ: &str = "K8sClusterNodeR";
    /// Create and edit ingress rules
    pub const INGRESSES_WRITE: &str = "K8sIngressesW";
}

/// Feature and authorization queries for the current caller and environment
pub trait Capabilities: Send + Sync {
    /// Whether the environment has a metrics backend configured
    fn server_metrics_enabled(&self) -> bool;

    /// Whether the caller holds `permission`
    fn is_authorized(&self, permission: &str) -> bool;
}

/// Capabilities fixed at construction time
#[derive(Debug, Clone, Default)]
pub struct StaticCapabilities {
    server_metrics: bool,
    /// `None` grants every permission
    granted: Option<HashSet<String>>,
}

impl StaticCapabilities {
    /// Caller holding every permission
    pub fn admin(server_metrics: bool) -> Self {
        Self {
            server_metrics,
            granted: None,
        }
    }

    /// Caller holding only the listed permissions
    pub fn with_permissions<I, S>(server_metrics: bool, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            server_metrics,
            granted: Some(permissions.into_iter().map(Into::into).collect()),
        }
    }
}

impl Capabilities for StaticCapabilities {
    fn server_metrics_enabled(&self) -> bool {
        self.server_metrics
    }

    fn is_authorized(&self, permission: &str) -> bool {
        match &self.granted {
            None => true,
            Some(granted) => granted.contains(permission),
        }
    }
}
