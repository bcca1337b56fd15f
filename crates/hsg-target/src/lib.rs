//! Autoscaler target that keeps a Hetzner Cloud server group at the size an
//! external strategy asks for.
//!
//! [`TargetPlugin`] is the surface the plugin host calls. Each `scale` call
//! resolves the target config, lists the group, and hands the drift to the
//! [`orchestrator::ScaleOrchestrator`].

pub mod cluster;
pub mod error;
pub mod inventory;
pub mod node_identity;
pub mod orchestrator;
pub mod plugin;
pub mod poller;

pub use cluster::{BoxError, ClusterNode, ClusterScaleUtils, NodeIdLookup, NodeResourceId};
pub use error::{Error, Result};
pub use node_identity::NodeIdentity;
pub use orchestrator::{Direction, Drift, ScaleOrchestrator};
pub use plugin::{DRY_RUN_COUNT, PluginInfo, ScalingAction, TargetPlugin, TargetStatus};
