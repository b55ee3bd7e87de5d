//! Host registry and action providers.
//!
//! The provisioning stage resolves where a component is registered through a
//! [`Registry`] and hands the actual work to an [`ActionProvider`].

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::config::{ComponentDefinition, Connection, ConnectionConfig, RegistryConfig};
use crate::error::Result;
use crate::kube::{deploy, ClusterClient};

/// Kind and name of the connection used when nothing else matches.
pub const DEFAULT_CONNECTION: &str = "kubernetes";

/// A component together with the hosts it is registered with.
#[derive(Debug, Clone)]
pub struct CompConfigPair {
    /// Component to provision, already decorated with labels and annotations.
    pub component: ComponentDefinition,
    /// Routing targets of the component.
    pub hosts: HashSet<Connection>,
}

/// Resolves the registration target of a component.
pub trait Registry: Send + Sync {
    /// Returns the connection the component is registered with.
    fn registrant(&self, component: &ComponentDefinition) -> Connection;
}

/// Provisions a single component.
#[async_trait]
pub trait ActionProvider: Send + Sync {
    /// Applies (or removes) the component and returns a short message.
    ///
    /// # Errors
    ///
    /// Returns an error if the component could not be provisioned.
    async fn provision(&self, pair: CompConfigPair) -> Result<String>;
}

/// Registry backed by the `registry` configuration section.
#[derive(Debug, Clone)]
pub struct StaticRegistry {
    default: Connection,
    models: HashMap<String, Connection>,
}

impl StaticRegistry {
    /// Creates a registry from configuration.
    #[must_use]
    pub fn new(config: &RegistryConfig) -> Self {
        let to_connection = |c: &ConnectionConfig| Connection::new(&c.kind, &c.name);

        Self {
            default: config
                .default_connection
                .as_ref()
                .map_or_else(|| Connection::new(DEFAULT_CONNECTION, DEFAULT_CONNECTION), to_connection),
            models: config
                .models
                .iter()
                .map(|(model, c)| (model.clone(), to_connection(c)))
                .collect(),
        }
    }
}

impl Default for StaticRegistry {
    fn default() -> Self {
        Self::new(&RegistryConfig::default())
    }
}

impl Registry for StaticRegistry {
    fn registrant(&self, component: &ComponentDefinition) -> Connection {
        component
            .model
            .as_deref()
            .and_then(|model| self.models.get(model))
            .or_else(|| self.models.get(&component.component.kind))
            .unwrap_or(&self.default)
            .clone()
    }
}

/// Action provider that deploys components to the cluster.
#[derive(Clone)]
pub struct ClusterActionProvider {
    client: Arc<dyn ClusterClient>,
    is_delete: bool,
}

impl ClusterActionProvider {
    /// Creates a provider applying (or deleting) through `client`.
    #[must_use]
    pub fn new(client: Arc<dyn ClusterClient>, is_delete: bool) -> Self {
        Self { client, is_delete }
    }
}

impl std::fmt::Debug for ClusterActionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterActionProvider")
            .field("is_delete", &self.is_delete)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ActionProvider for ClusterActionProvider {
    async fn provision(&self, pair: CompConfigPair) -> Result<String> {
        let component = &pair.component;
        debug!(
            "Provisioning '{}' on {} host(s)",
            component.display_name,
            pair.hosts.len()
        );

        deploy(self.client.as_ref(), component, self.is_delete).await?;

        let verb = if self.is_delete { "deleted" } else { "deployed" };
        Ok(format!(
            "{verb} {}/{}",
            component.component.kind, component.display_name
        ))
    }
}
