use std::collections::HashMap;
use std::sync::Arc;

use hsg_cloud::CloudApi;
use hsg_cloud::hetzner::HetznerCloud;
use hsg_config::{FlatConfig, PluginConfig, TargetConfig};
use serde::{Deserialize, Serialize};

use crate::cluster::ClusterScaleUtils;
use crate::inventory::Inventory;
use crate::node_identity::NodeIdentity;
use crate::orchestrator::ScaleOrchestrator;
use crate::{Error, Result};

pub const PLUGIN_NAME: &str = "hcloud-server";
pub const PLUGIN_TYPE: &str = "target";

/// Desired count the host sends for a dry run. Nothing is resolved or mutated.
pub const DRY_RUN_COUNT: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginInfo {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub plugin_type: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingAction {
    pub count: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ScalingAction {
    pub fn to(count: i64) -> Self {
        Self {
            count,
            reason: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetStatus {
    pub ready: bool,
    pub count: i64,
    pub meta: HashMap<String, String>,
}

/// Builds a provider client from the plugin config.
pub type Connector = Box<dyn Fn(&PluginConfig) -> Arc<dyn CloudApi> + Send + Sync>;

struct Configured {
    config: PluginConfig,
    cloud: Arc<dyn CloudApi>,
}

/// Target plugin scaling a labelled group of Hetzner Cloud servers.
pub struct TargetPlugin {
    cluster: Box<dyn ClusterScaleUtils>,
    connect: Connector,
    state: Option<Configured>,
}

impl TargetPlugin {
    /// Plugin backed by the Hetzner Cloud API.
    pub fn new(cluster: Box<dyn ClusterScaleUtils>) -> Self {
        Self::with_connector(
            cluster,
            Box::new(|config: &PluginConfig| {
                let cloud = HetznerCloud::new(config.token.clone());
                let cloud = match &config.endpoint {
                    Some(endpoint) => cloud.with_endpoint(endpoint.clone()),
                    None => cloud,
                };
                Arc::new(cloud) as Arc<dyn CloudApi>
            }),
        )
    }

    pub fn with_connector(cluster: Box<dyn ClusterScaleUtils>, connect: Connector) -> Self {
        Self {
            cluster,
            connect,
            state: None,
        }
    }

    pub fn plugin_info(&self) -> PluginInfo {
        PluginInfo {
            name: PLUGIN_NAME,
            plugin_type: PLUGIN_TYPE,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.state.is_some()
    }

    /// Parse the plugin config, build the provider client and register the
    /// node identity lookup with the cluster.
    pub async fn configure(&mut self, config: &FlatConfig) -> Result<()> {
        let plugin = PluginConfig::resolve(config).await?;
        let cloud = (self.connect)(&plugin);

        self.cluster
            .set_node_id_lookup(NodeIdentity::new(plugin.node_attr_id.clone()).into_lookup());

        tracing::info!(
            node_attr_id = %plugin.node_attr_id,
            group_id_label = %plugin.group_id_label,
            retry_limit = plugin.retry.limit,
            "hcloud-server target configured"
        );
        self.state = Some(Configured {
            config: plugin,
            cloud,
        });
        Ok(())
    }

    fn configured(&self) -> Result<&Configured> {
        self.state.as_ref().ok_or(Error::NotConfigured)
    }

    pub async fn scale(&self, action: ScalingAction, config: &FlatConfig) -> Result<()> {
        if action.count == DRY_RUN_COUNT {
            tracing::debug!("dry run, skipping scaling action");
            return Ok(());
        }
        let desired = u64::try_from(action.count).map_err(|_| Error::InvalidCount(action.count))?;

        let state = self.configured()?;
        let target = TargetConfig::resolve(config, state.cloud.as_ref()).await?;

        if let Some(reason) = &action.reason {
            tracing::info!(group_id = %target.group_id, desired, reason = %reason, "scaling");
        }

        ScaleOrchestrator::new(state.cloud.as_ref(), self.cluster.as_ref(), &state.config)
            .reconcile(desired, &target, config)
            .await
    }

    /// Member count of the group, or not-ready while the cluster pool settles.
    pub async fn status(&self, config: &FlatConfig) -> Result<TargetStatus> {
        let state = self.configured()?;

        let ready = self
            .cluster
            .is_pool_ready(config)
            .await
            .map_err(Error::Readiness)?;
        if !ready {
            return Ok(TargetStatus::default());
        }

        let target = TargetConfig::resolve(config, state.cloud.as_ref()).await?;
        let servers = Inventory::new(state.cloud.as_ref(), &state.config)
            .list(&target)
            .await?;

        Ok(TargetStatus {
            ready: true,
            count: servers.len() as i64,
            meta: HashMap::new(),
        })
    }
}
