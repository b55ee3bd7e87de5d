//! Cluster client capability and its Kubernetes REST implementation.
//!
//! The provisioning core only sees the [`ClusterClient`] trait. [`KubeClient`]
//! implements it over HTTP against a Kubernetes API server using server-side
//! apply. Resource names and scopes come from API discovery.

use async_trait::async_trait;
use reqwest::{header, Client, Method};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::config::ClusterConfig;
use crate::error::{ClusterError, KubeError, ProvisionError, RestError, Result};

/// Content type used for server-side apply patches.
const APPLY_PATCH_CONTENT_TYPE: &str = "application/apply-patch+yaml";

/// Options for a manifest application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Namespace the manifest is applied into.
    pub namespace: String,
    /// Update existing objects instead of only creating new ones.
    pub update: bool,
    /// Remove the objects instead of applying them.
    pub delete: bool,
}

/// A generic REST request against the API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute path below the server root.
    pub path: String,
    /// Request body.
    pub body: Option<Vec<u8>>,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Query parameters.
    pub params: Vec<(String, String)>,
}

/// Capability to talk to a cluster control plane.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Applies or deletes every object of a serialized manifest.
    async fn apply_manifest(
        &self,
        manifest: &[u8],
        options: &ApplyOptions,
    ) -> std::result::Result<(), ClusterError>;

    /// Issues a raw REST request and returns the response body.
    async fn request(&self, request: RestRequest) -> std::result::Result<Vec<u8>, RestError>;
}

impl RestRequest {
    /// Creates a request with the given method and absolute path.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Creates a POST request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Returns the value of a query parameter.
    #[must_use]
    pub fn param_value(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Discovery document of one group version.
#[derive(Debug, Clone, Default, Deserialize)]
struct ApiResourceList {
    #[serde(default)]
    resources: Vec<ApiResource>,
}

/// A resource served by a group version.
#[derive(Debug, Clone, Deserialize)]
struct ApiResource {
    /// Plural REST name, e.g. `ingresses`.
    name: String,
    kind: String,
    #[serde(default)]
    namespaced: bool,
}

impl ApiResource {
    /// Subresources such as `pods/status` share the kind of their parent.
    fn is_subresource(&self) -> bool {
        self.name.contains('/')
    }
}

/// Kubernetes API server client.
#[derive(Debug, Clone)]
pub struct KubeClient {
    /// HTTP client.
    client: Client,
    /// API server base URL without trailing slash.
    base_url: String,
    /// Optional bearer token.
    token: Option<String>,
    /// Field manager identity for server-side apply.
    field_manager: String,
    /// Discovered resources keyed by group version.
    discovery: Arc<RwLock<HashMap<String, Vec<ApiResource>>>>,
}

impl KubeClient {
    /// Creates a new client from cluster settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &ClusterConfig, field_manager: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ProvisionError::Kube(KubeError::transport(format!(
                    "Failed to create HTTP client: {e}"
                )))
            })?;

        Ok(Self {
            client,
            base_url: config.api_server.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            field_manager: field_manager.to_string(),
            discovery: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Sends a request once and classifies the response.
    async fn send(&self, request: RestRequest) -> std::result::Result<Vec<u8>, RestError> {
        let url = format!("{}{}", self.base_url, request.path);
        trace!("{} {url}", request.method);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .query(&request.params);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &self.token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RestError::Transport(format!("Request failed: {e}")))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| RestError::Transport(format!("Failed to read response: {e}")))?
            .to_vec();

        if status.is_success() {
            return Ok(body);
        }

        debug!("API server answered {status} for {url}");

        // A JSON object that is not a Status means the server sent something
        // other than an error report.
        match serde_json::from_slice::<Map<String, Value>>(&body) {
            Ok(object) if object.get("kind").and_then(Value::as_str) != Some("Status") => {
                let kind = object
                    .get("kind")
                    .and_then(Value::as_str)
                    .unwrap_or("<none>")
                    .to_string();
                Err(RestError::UnexpectedObject {
                    message: format!("expected Status, got kind {kind} with code {status}"),
                    body,
                })
            }
            _ => Err(RestError::Status {
                code: status.as_u16(),
                body,
            }),
        }
    }

    /// Looks up the REST resource serving `kind` in `api_version`.
    ///
    /// The discovery document of each group version is fetched once.
    async fn resolve(
        &self,
        api_version: &str,
        kind: &str,
    ) -> std::result::Result<ApiResource, ClusterError> {
        let find = |resources: &[ApiResource]| {
            resources
                .iter()
                .find(|r| r.kind == kind && !r.is_subresource())
                .cloned()
        };

        if let Some(resources) = self.discovery.read().await.get(api_version) {
            return find(resources.as_slice()).ok_or_else(|| unknown_kind(api_version, kind));
        }

        let path = format!("/{}/{api_version}", api_root(api_version));
        debug!("Discovering resources of {api_version}");
        let body = self
            .send(RestRequest::new(Method::GET, path))
            .await
            .map_err(|e| ClusterError::Transport(format!("discovery of {api_version} failed: {e}")))?;
        let list: ApiResourceList = serde_json::from_slice(&body)
            .map_err(|e| ClusterError::Transport(format!("invalid discovery document: {e}")))?;

        let resource = find(list.resources.as_slice());
        self.discovery
            .write()
            .await
            .insert(api_version.to_string(), list.resources);
        resource.ok_or_else(|| unknown_kind(api_version, kind))
    }

    /// Applies or deletes a single manifest document.
    async fn apply_object(
        &self,
        object: &Map<String, Value>,
        options: &ApplyOptions,
    ) -> std::result::Result<(), ClusterError> {
        let kind = object.get("kind").and_then(Value::as_str).unwrap_or_default();
        let api_version = object
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let metadata = object.get("metadata");
        let name = metadata
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let namespace = metadata
            .and_then(|m| m.get("namespace"))
            .and_then(Value::as_str)
            .unwrap_or(options.namespace.as_str());

        if kind.is_empty() || api_version.is_empty() || name.is_empty() {
            return Err(ClusterError::Manifest(String::from(
                "every object needs kind, apiVersion and metadata.name",
            )));
        }

        let resource = self.resolve(api_version, kind).await?;
        let root = api_root(api_version);
        let collection = if resource.namespaced {
            if namespace.is_empty() {
                return Err(ClusterError::Manifest(format!(
                    "{kind} {name} is namespaced but no namespace was given"
                )));
            }
            format!("/{root}/{api_version}/namespaces/{namespace}/{}", resource.name)
        } else {
            format!("/{root}/{api_version}/{}", resource.name)
        };
        let item = format!("{collection}/{name}");

        let request = if options.delete {
            debug!("Deleting {} {name}", kind);
            RestRequest::new(Method::DELETE, &item)
        } else if options.update {
            debug!("Applying {} {name}", kind);
            let body = serde_yaml::to_string(object)
                .map_err(|e| ClusterError::Manifest(e.to_string()))?;
            RestRequest::new(Method::PATCH, &item)
                .body(body.into_bytes())
                .header(header::CONTENT_TYPE.as_str(), APPLY_PATCH_CONTENT_TYPE)
                .param("fieldManager", &self.field_manager)
                .param("force", "true")
        } else {
            debug!("Creating {} {name}", kind);
            let body =
                serde_json::to_vec(object).map_err(|e| ClusterError::Manifest(e.to_string()))?;
            RestRequest::post(&collection)
                .body(body)
                .header(header::CONTENT_TYPE.as_str(), "application/json")
                .param("fieldManager", &self.field_manager)
        };

        match self.send(request).await {
            Ok(_) => Ok(()),
            Err(RestError::Status { code: 404, .. }) if options.delete => {
                debug!("{} {name} already absent", kind);
                Ok(())
            }
            Err(RestError::Status { body, .. }) => Err(
                match serde_json::from_slice::<Map<String, Value>>(&body) {
                    Ok(status) => ClusterError::Status(status),
                    Err(_) => ClusterError::Transport(String::from_utf8_lossy(&body).into_owned()),
                },
            ),
            Err(other) => Err(ClusterError::Transport(other.to_string())),
        }
    }
}

/// Core group versions live under `/api`, named groups under `/apis`.
fn api_root(api_version: &str) -> &'static str {
    if api_version.contains('/') { "apis" } else { "api" }
}

fn unknown_kind(api_version: &str, kind: &str) -> ClusterError {
    ClusterError::UnknownKind {
        kind: kind.to_string(),
        api_version: api_version.to_string(),
    }
}

#[async_trait]
impl ClusterClient for KubeClient {
    async fn apply_manifest(
        &self,
        manifest: &[u8],
        options: &ApplyOptions,
    ) -> std::result::Result<(), ClusterError> {
        let documents = serde_yaml::Deserializer::from_slice(manifest)
            .map(Value::deserialize)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ClusterError::Manifest(e.to_string()))?;

        for value in documents {
            match value {
                Value::Null => {}
                Value::Object(object) => self.apply_object(&object, options).await?,
                _ => {
                    return Err(ClusterError::Manifest(String::from(
                        "manifest documents must be mappings",
                    )));
                }
            }
        }
        Ok(())
    }

    async fn request(&self, request: RestRequest) -> std::result::Result<Vec<u8>, RestError> {
        self.send(request).await
    }
}
