use std::fmt;

use hsg_cloud::CloudApi;
use hsg_cloud::types::{Server, ServerSpec, ServerStatus};
use hsg_config::{FlatConfig, PluginConfig, TargetConfig};
use tracing::Instrument;

use crate::cluster::ClusterScaleUtils;
use crate::inventory::Inventory;
use crate::poller::ActionPoller;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Out => "scale out",
            Self::In => "scale in",
        })
    }
}

/// Difference between the desired and the observed group size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drift {
    None,
    /// Grow the group to `desired` members.
    Out { desired: u64 },
    /// Remove `remove` members.
    In { remove: u64 },
}

impl Drift {
    pub fn compute(current: u64, desired: u64) -> Self {
        if desired > current {
            Self::Out { desired }
        } else if desired < current {
            Self::In {
                remove: current - desired,
            }
        } else {
            Self::None
        }
    }
}

/// Reconciles a server group against a desired count.
pub struct ScaleOrchestrator<'a> {
    cloud: &'a dyn CloudApi,
    cluster: &'a dyn ClusterScaleUtils,
    plugin: &'a PluginConfig,
}

impl<'a> ScaleOrchestrator<'a> {
    pub fn new(
        cloud: &'a dyn CloudApi,
        cluster: &'a dyn ClusterScaleUtils,
        plugin: &'a PluginConfig,
    ) -> Self {
        Self {
            cloud,
            cluster,
            plugin,
        }
    }

    fn inventory(&self) -> Inventory<'a> {
        Inventory::new(self.cloud, self.plugin)
    }

    pub async fn reconcile(
        &self,
        desired: u64,
        target: &TargetConfig,
        raw: &FlatConfig,
    ) -> Result<()> {
        let servers = self.inventory().list(target).await?;
        let current = servers.len() as u64;

        match Drift::compute(current, desired) {
            Drift::None => {
                tracing::info!(
                    group_id = %target.group_id,
                    current_count = current,
                    strategy_count = desired,
                    "scaling not required"
                );
                Ok(())
            }
            Drift::Out { desired } => {
                let span = tracing::info_span!(
                    "scale_out",
                    group_id = %target.group_id,
                    current_count = current,
                    desired_count = desired,
                );
                self.scale_out(servers, desired, target)
                    .instrument(span)
                    .await
                    .map_err(|e| e.during(Direction::Out))
            }
            Drift::In { remove } => {
                let span = tracing::info_span!(
                    "scale_in",
                    group_id = %target.group_id,
                    current_count = current,
                    remove_count = remove,
                );
                self.scale_in(servers, remove, raw)
                    .instrument(span)
                    .await
                    .map_err(|e| e.during(Direction::In))
            }
        }
    }

    /// Create servers until the group reaches `desired`, retrying the whole
    /// round up to the configured limit.
    ///
    /// A failed inventory refresh consumes the attempt. The next round
    /// recounts the group before creating anything so servers from the
    /// previous round are not duplicated.
    async fn scale_out(
        &self,
        servers: Vec<Server>,
        desired: u64,
        target: &TargetConfig,
    ) -> Result<()> {
        tracing::info!("scaling out");

        let group_label = &self.plugin.group_id_label;
        let template = target.server_spec(String::new(), group_label)?;
        let poller = ActionPoller::new(self.cloud, self.plugin.retry);
        let limit = self.plugin.retry.limit.max(1);
        let mut missing = desired.saturating_sub(servers.len() as u64);
        let mut known = Some(servers);
        let mut last_error = None;

        for attempt in 1..=limit {
            if attempt > 1 {
                tracing::info!(attempt, missing, "waiting for servers to create");
                tokio::time::sleep(self.plugin.retry.interval).await;
            }

            let current = match known.take() {
                Some(servers) => servers,
                None => match self.inventory().list(target).await {
                    Ok(servers) => servers,
                    Err(e) => {
                        tracing::error!(attempt, error = %e, "failed to recount server group");
                        last_error = Some(e);
                        continue;
                    }
                },
            };
            if Self::reached(current.len() as u64, desired) {
                return Ok(());
            }

            let deficit = desired.saturating_sub(current.len() as u64);
            let mut pending = Vec::new();
            let mut created = 0;

            while created < deficit {
                let spec = ServerSpec {
                    name: target.random_name(self.plugin.random_suffix_len),
                    ..template.clone()
                };
                match self.cloud.create_server(&spec).await {
                    Ok(result) => {
                        created += 1;
                        tracing::info!(
                            server_id = %result.server.id,
                            name = %result.server.name,
                            "server created"
                        );
                        if !result.action.is_complete() {
                            pending.push(result.action.id);
                        }
                    }
                    Err(source) => {
                        let err = Error::ProviderMutation {
                            operation: format!("create server {}", spec.name),
                            source,
                        };
                        tracing::error!(attempt, error = %err, "failed to create a server");
                        break;
                    }
                }
            }

            match poller.await_all(&pending).await {
                Ok(outcome) if !outcome.failed.is_empty() => {
                    tracing::warn!(failed = outcome.failed.len(), "some create actions failed");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "failed to wait till all create actions are ready");
                }
            }

            match self.inventory().list(target).await {
                Ok(servers) => {
                    let count = servers.len() as u64;
                    if Self::reached(count, desired) {
                        return Ok(());
                    }
                    missing = desired - count;
                    last_error = None;
                    known = Some(servers);
                }
                Err(e) => {
                    tracing::error!(attempt, error = %e, "failed to refresh server group");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(Error::ScaleOutIncomplete { missing }))
    }

    /// Overshoot counts as done; the next reconcile scales it back in.
    fn reached(count: u64, desired: u64) -> bool {
        if count < desired {
            return false;
        }
        if count > desired {
            tracing::warn!(count, desired, "group grew past desired count");
        }
        tracing::info!(count, "scale out complete");
        true
    }

    /// Drain and delete `remove` members.
    ///
    /// Per-server deletion failures are logged and skipped. The post-scale-in
    /// hook always runs with the full list the cluster selected.
    async fn scale_in(&self, servers: Vec<Server>, remove: u64, raw: &FlatConfig) -> Result<()> {
        tracing::info!("scaling in");

        let remote_ids: Vec<String> = servers
            .iter()
            .filter(|s| s.status == ServerStatus::Running)
            .map(|s| s.name.clone())
            .collect();
        let count = usize::try_from(remove).unwrap_or(usize::MAX);

        let nodes = self
            .cluster
            .run_pre_scale_in_tasks(raw, &remote_ids, count)
            .await
            .map_err(Error::PreScaleIn)?;

        for node in &nodes {
            let Some(server) = servers.iter().find(|s| s.name == node.remote_resource_id) else {
                tracing::warn!(
                    node_id = %node.node_id,
                    server = %node.remote_resource_id,
                    "no server backs the selected node"
                );
                continue;
            };

            if let Err(source) = self.cloud.delete_server(server.id).await {
                let err = Error::ProviderMutation {
                    operation: format!("delete server {}", server.name),
                    source,
                };
                tracing::error!(node_id = %node.node_id, error = %err, "failed to delete a server");
                continue;
            }
            tracing::info!(node_id = %node.node_id, server_id = %server.id, "server deleted");
        }

        self.cluster
            .run_post_scale_in_tasks(raw, &nodes)
            .await
            .map_err(Error::PostScaleIn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift() {
        assert_eq!(Drift::compute(2, 2), Drift::None);
        assert_eq!(Drift::compute(0, 0), Drift::None);
        assert_eq!(Drift::compute(2, 4), Drift::Out { desired: 4 });
        assert_eq!(Drift::compute(5, 2), Drift::In { remove: 3 });
        assert_eq!(Drift::compute(3, 0), Drift::In { remove: 3 });
    }

    #[test]
    fn direction_labels() {
        let err = Error::ScaleOutIncomplete { missing: 2 }.during(Direction::Out);
        assert_eq!(
            err.to_string(),
            "failed to perform scaling action: scale out: waiting for 2 servers to create"
        );
        assert!(matches!(err.cause(), Error::ScaleOutIncomplete { missing: 2 }));
        assert_eq!(Direction::In.to_string(), "scale in");
    }
}
