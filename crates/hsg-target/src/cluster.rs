use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hsg_config::FlatConfig;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A node as the workload orchestrator reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterNode {
    pub id: String,
    pub attributes: HashMap<String, String>,
}

/// A node picked for removal together with the remote server backing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeResourceId {
    pub node_id: String,
    /// Server name, as produced by the node ID lookup.
    pub remote_resource_id: String,
}

/// Maps an orchestrator node to its remote server.
pub type NodeIdLookup = Arc<dyn Fn(&ClusterNode) -> crate::Result<String> + Send + Sync>;

/// Node draining and pool bookkeeping provided by the workload orchestrator.
///
/// The plugin only drives these hooks; selecting, draining and purging nodes
/// is the implementor's job.
#[async_trait]
pub trait ClusterScaleUtils: Send + Sync {
    /// Register how nodes are mapped to remote servers.
    fn set_node_id_lookup(&mut self, lookup: NodeIdLookup);

    /// Whether the node pool is stable enough to report a count.
    async fn is_pool_ready(&self, config: &FlatConfig) -> Result<bool, BoxError>;

    /// Select and drain `count` nodes out of `remote_ids`. The returned list
    /// is authoritative.
    async fn run_pre_scale_in_tasks(
        &self,
        config: &FlatConfig,
        remote_ids: &[String],
        count: usize,
    ) -> Result<Vec<NodeResourceId>, BoxError>;

    /// Finish bookkeeping for the nodes whose servers were removed.
    async fn run_post_scale_in_tasks(
        &self,
        config: &FlatConfig,
        nodes: &[NodeResourceId],
    ) -> Result<(), BoxError>;
}
