//! API client for the management backend
//!
//! Implements the console engine source traits over the backend's REST API.
//! Kubernetes objects proxied through the backend are typed with k8s-openapi;
//! backend-specific records use the shared PascalCase models.

use anyhow::{Context, Result};
use async_trait::async_trait;
use console_lib::ingress::{ReferenceSource, RuleSubmitter, SubmitAction};
use console_lib::reservation::ResourceSource;
use console_lib::{
    IngressController, IngressRecord, NamespaceInfo, NodeCapacity, Scope, ServiceInfo, TlsSecret,
    UsageSample, WorkloadRequests,
};
use k8s_openapi::api::core::v1::{Node, ResourceQuota, Secret};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Method, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

/// Secret type holding a certificate and key
const TLS_SECRET_TYPE: &str = "kubernetes.io/tls";

/// Header carrying the backend access token
const API_KEY_HEADER: &str = "X-API-Key";

/// API client scoped to one environment
pub struct ApiClient {
    client: Client,
    base_url: Url,
    environment_id: u32,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str, environment_id: u32, api_key: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let mut value = HeaderValue::from_str(key).context("Invalid API key")?;
            value.set_sensitive(true);
            headers.insert(API_KEY_HEADER, value);
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        // Relative joins replace the last segment unless the base ends with a slash
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)
        } else {
            Url::parse(&format!("{}/", base_url))
        }
        .context("Invalid API URL")?;

        Ok(Self {
            client,
            base_url,
            environment_id,
        })
    }

    pub fn environment_id(&self) -> u32 {
        self.environment_id
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_with_query(path, &[]).await
    }

    /// Make a GET request with query parameters
    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;
        debug!(url = %url, "GET");

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .context("Failed to send request")?;

        check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }

    /// Send a JSON body; the response body is not used
    pub async fn send_json<B: Serialize>(&self, method: Method, path: &str, body: &B) -> Result<()> {
        let url = self.base_url.join(path).context("Invalid path")?;
        debug!(method = %method, url = %url, "Sending");

        let response = self
            .client
            .request(method, url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        check_status(response).await?;
        Ok(())
    }

    /// Whether the environment has a metrics server configured
    pub async fn server_metrics_enabled(&self) -> Result<bool> {
        let environment: Environment = self
            .get(&format!("api/endpoints/{}", self.environment_id))
            .await
            .context("Failed to load environment")?;

        Ok(environment
            .kubernetes
            .and_then(|k| k.configuration)
            .map(|c| c.use_server_metrics)
            .unwrap_or(false))
    }

    fn kubernetes_path(&self, path: &str) -> String {
        format!("api/kubernetes/{}/{}", self.environment_id, path)
    }

    /// Path through the backend's Kubernetes API proxy
    fn proxy_path(&self, path: &str) -> String {
        format!("api/endpoints/{}/kubernetes/{}", self.environment_id, path)
    }
}

/// Turn a non-success response into an error carrying the backend's message
async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => match err.details.filter(|d| !d.is_empty() && *d != err.message) {
            Some(details) => anyhow::bail!("API error ({}): {}: {}", status, err.message, details),
            None => anyhow::bail!("API error ({}): {}", status, err.message),
        },
        Err(_) => anyhow::bail!("API error ({}): {}", status, body),
    }
}

#[async_trait]
impl ResourceSource for ApiClient {
    async fn capacity(&self, scope: &Scope) -> Result<Vec<NodeCapacity>> {
        match scope {
            Scope::Cluster => {
                let nodes: ItemList<Node> = self.get(&self.proxy_path("api/v1/nodes")).await?;
                Ok(nodes.items.iter().map(node_capacity).collect())
            }
            Scope::Namespace(ns) => {
                let path = format!("api/v1/namespaces/{}/resourcequotas", ns);
                let quotas: ItemList<ResourceQuota> = self.get(&self.proxy_path(&path)).await?;
                Ok(quotas.items.iter().filter_map(quota_capacity).collect())
            }
        }
    }

    async fn workload_requests(&self, scope: &Scope) -> Result<WorkloadRequests> {
        let path = self.kubernetes_path("metrics/applications_resources");
        match scope {
            Scope::Cluster => self.get(&path).await,
            Scope::Namespace(ns) => self.get_with_query(&path, &[("namespace", ns.as_str())]).await,
        }
    }

    async fn usage(&self, scope: &Scope) -> Result<Vec<UsageSample>> {
        match scope {
            Scope::Cluster => {
                let nodes: ItemList<NodeMetric> =
                    self.get(&self.kubernetes_path("metrics/nodes")).await?;
                Ok(nodes.items.into_iter().map(|n| n.usage).collect())
            }
            Scope::Namespace(ns) => {
                let path = format!("metrics/pods/namespace/{}", ns);
                let pods: ItemList<PodMetric> = self.get(&self.kubernetes_path(&path)).await?;
                Ok(pods
                    .items
                    .into_iter()
                    .flat_map(|p| p.containers)
                    .map(|c| c.usage)
                    .collect())
            }
        }
    }
}

#[async_trait]
impl ReferenceSource for ApiClient {
    async fn namespaces(&self) -> Result<Vec<NamespaceInfo>> {
        self.get(&self.kubernetes_path("namespaces")).await
    }

    async fn ingress_controllers(&self, namespace: &str) -> Result<Vec<IngressController>> {
        let path = format!("namespaces/{}/ingresscontrollers", namespace);
        self.get(&self.kubernetes_path(&path)).await
    }

    async fn services(&self, namespace: &str) -> Result<Vec<ServiceInfo>> {
        let path = format!("namespaces/{}/services", namespace);
        self.get(&self.kubernetes_path(&path)).await
    }

    async fn tls_secrets(&self, namespace: &str) -> Result<Vec<TlsSecret>> {
        let path = format!("api/v1/namespaces/{}/secrets", namespace);
        let secrets: ItemList<Secret> = self.get(&self.proxy_path(&path)).await?;
        Ok(secrets
            .items
            .iter()
            .filter(|s| s.type_.as_deref() == Some(TLS_SECRET_TYPE))
            .filter_map(|s| {
                Some(TlsSecret {
                    name: s.metadata.name.clone()?,
                    namespace: s
                        .metadata
                        .namespace
                        .clone()
                        .unwrap_or_else(|| namespace.to_string()),
                })
            })
            .collect())
    }

    async fn existing_rules(&self) -> Result<Vec<IngressRecord>> {
        self.get(&self.kubernetes_path("ingresses")).await
    }
}

#[async_trait]
impl RuleSubmitter for ApiClient {
    async fn submit(&self, action: SubmitAction, rule: &IngressRecord) -> Result<()> {
        let method = match action {
            SubmitAction::Create => Method::POST,
            SubmitAction::Update => Method::PUT,
        };
        let path = format!("namespaces/{}/ingresses", rule.namespace);
        self.send_json(method, &self.kubernetes_path(&path), rule).await
    }
}

fn quantity(resources: Option<&BTreeMap<String, Quantity>>, key: &str) -> Option<String> {
    resources.and_then(|r| r.get(key)).map(|q| q.0.clone())
}

fn node_capacity(node: &Node) -> NodeCapacity {
    let allocatable = node.status.as_ref().and_then(|s| s.allocatable.as_ref());
    NodeCapacity {
        name: node.metadata.name.clone().unwrap_or_default(),
        cpu: quantity(allocatable, "cpu").unwrap_or_default(),
        memory: quantity(allocatable, "memory").unwrap_or_default(),
    }
}

/// Hard limits of a quota; quotas without CPU or memory limits are skipped
fn quota_capacity(quota: &ResourceQuota) -> Option<NodeCapacity> {
    let hard = quota.spec.as_ref().and_then(|s| s.hard.as_ref());
    let cpu = quantity(hard, "limits.cpu").or_else(|| quantity(hard, "cpu"));
    let memory = quantity(hard, "limits.memory").or_else(|| quantity(hard, "memory"));
    if cpu.is_none() && memory.is_none() {
        return None;
    }

    Some(NodeCapacity {
        name: quota.metadata.name.clone().unwrap_or_default(),
        cpu: cpu.unwrap_or_default(),
        memory: memory.unwrap_or_default(),
    })
}

// API response types

/// Any `{"items": [...]}` list body
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ItemList<T> {
    #[serde(default)]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct NodeMetric {
    usage: UsageSample,
}

#[derive(Debug, Deserialize)]
struct PodMetric {
    #[serde(default)]
    containers: Vec<ContainerMetric>,
}

#[derive(Debug, Deserialize)]
struct ContainerMetric {
    usage: UsageSample,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Environment {
    kubernetes: Option<KubernetesSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KubernetesSettings {
    configuration: Option<KubernetesConfiguration>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KubernetesConfiguration {
    #[serde(default)]
    use_server_metrics: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
    #[serde(default)]
    details: Option<String>,
}
