use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Provider-side server identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerId(pub i64);

/// Provider-side action identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(pub i64);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kinds of remote resources that can be looked up by ID or name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Datacenter,
    Location,
    PlacementGroup,
    Firewall,
    Image,
    SshKey,
    ServerType,
    Network,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Datacenter => "datacenter",
            Self::Location => "location",
            Self::PlacementGroup => "placement group",
            Self::Firewall => "firewall",
            Self::Image => "image",
            Self::SshKey => "ssh key",
            Self::ServerType => "server type",
            Self::Network => "network",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote resource resolved to its canonical identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: i64,
    pub name: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: i64, name: impl Into<String>) -> Self {
        Self {
            kind,
            id,
            name: name.into(),
        }
    }

    /// The value to send where the API accepts "ID or name".
    ///
    /// Snapshots and backups have no name, so fall back to the ID.
    pub fn id_or_name(&self) -> String {
        if self.name.is_empty() {
            self.id.to_string()
        } else {
            self.name.clone()
        }
    }
}

/// Provider-reported server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Initializing,
    Starting,
    Running,
    Stopping,
    Off,
    Deleting,
    Unknown,
}

impl ServerStatus {
    /// Value the API uses in status filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Off => "off",
            Self::Deleting => "deleting",
            Self::Unknown => "unknown",
        }
    }
}

/// A server as seen by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub id: ServerId,
    pub name: String,
    pub status: ServerStatus,
    pub labels: HashMap<String, String>,
}

/// Filter for listing servers.
#[derive(Debug, Clone)]
pub struct ServerQuery {
    /// Comma-separated `key=value` equality selector.
    pub label_selector: String,
    /// Only return servers in this state, when set.
    pub status: Option<ServerStatus>,
    pub per_page: u32,
}

/// Public networking switches for a new server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicNet {
    pub enable_ipv4: bool,
    pub enable_ipv6: bool,
}

impl Default for PublicNet {
    fn default() -> Self {
        Self {
            enable_ipv4: true,
            enable_ipv6: false,
        }
    }
}

/// Fully resolved request for creating one server.
#[derive(Debug, Clone)]
pub struct ServerSpec {
    pub name: String,
    pub server_type: ResourceRef,
    pub image: ResourceRef,
    pub location: Option<ResourceRef>,
    pub datacenter: Option<ResourceRef>,
    pub placement_group: Option<ResourceRef>,
    pub user_data: String,
    pub ssh_keys: Vec<ResourceRef>,
    pub networks: Vec<ResourceRef>,
    pub firewalls: Vec<ResourceRef>,
    pub labels: BTreeMap<String, String>,
    pub public_net: PublicNet,
}

/// Terminal or in-flight state of an asynchronous provider action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Running,
    Success,
    Error,
}

/// Error details attached to a failed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionError {
    pub code: String,
    pub message: String,
}

/// Handle to an asynchronous provider operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub id: ActionId,
    /// Completion percentage, 0 to 100.
    pub progress: u8,
    pub status: ActionStatus,
    pub error: Option<ActionError>,
}

impl Action {
    pub fn is_complete(&self) -> bool {
        self.progress >= 100
    }
}

/// Result of a server creation call.
#[derive(Debug, Clone)]
pub struct CreatedServer {
    pub server: Server,
    pub action: Action,
}
