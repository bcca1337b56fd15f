use hsg_cloud::CloudApi;
use hsg_cloud::types::{Server, ServerQuery, ServerStatus};
use hsg_config::{PluginConfig, TargetConfig};
use tracing::debug;

use crate::{Error, Result};

/// Lists the running members of a server group.
pub struct Inventory<'a> {
    cloud: &'a dyn CloudApi,
    plugin: &'a PluginConfig,
}

impl<'a> Inventory<'a> {
    pub fn new(cloud: &'a dyn CloudApi, plugin: &'a PluginConfig) -> Self {
        Self { cloud, plugin }
    }

    pub fn query(&self, target: &TargetConfig) -> ServerQuery {
        ServerQuery {
            label_selector: target.selector(&self.plugin.group_id_label),
            status: Some(ServerStatus::Running),
            per_page: self.plugin.items_per_page,
        }
    }

    pub async fn list(&self, target: &TargetConfig) -> Result<Vec<Server>> {
        let query = self.query(target);
        let servers = self
            .cloud
            .list_servers(&query)
            .await
            .map_err(Error::ProviderQuery)?;

        debug!(
            group_id = %target.group_id,
            selector = %query.label_selector,
            count = servers.len(),
            "listed server group"
        );
        Ok(servers)
    }
}
