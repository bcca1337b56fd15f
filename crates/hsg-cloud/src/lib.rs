//! Provider boundary for server groups on Hetzner Cloud.
//!
//! [`CloudApi`] is the only surface the scaling engine talks to. It is
//! implemented by [`hetzner::HetznerCloud`] for the real API and by
//! [`memory::MemoryCloud`] for tests and local runs.

pub mod hetzner;
pub mod memory;
pub mod types;

use async_trait::async_trait;
use types::{Action, ActionId, CreatedServer, ResourceKind, ResourceRef, Server, ServerId, ServerQuery, ServerSpec};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("hetzner api error: {0}")]
    HetznerApi(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("server not found: {0}")]
    ServerNotFound(ServerId),

    #[error("missing env var: {0}")]
    MissingEnv(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Operations the scaling engine needs from a compute provider.
#[async_trait]
pub trait CloudApi: Send + Sync + 'static {
    /// Resolve a resource by numeric ID or by exact name.
    ///
    /// Returns `Ok(None)` when the provider has no such resource.
    async fn lookup(&self, kind: ResourceKind, id_or_name: &str) -> Result<Option<ResourceRef>>;

    /// List every server matching the query, following pagination.
    async fn list_servers(&self, query: &ServerQuery) -> Result<Vec<Server>>;

    /// Create a server. The returned action may still be in progress.
    async fn create_server(&self, spec: &ServerSpec) -> Result<CreatedServer>;

    /// Delete a server.
    async fn delete_server(&self, id: ServerId) -> Result<()>;

    /// Fetch the current state of a batch of actions.
    async fn get_actions(&self, ids: &[ActionId]) -> Result<Vec<Action>>;
}

/// Returns `true` when `labels` satisfies every `key=value` term of `selector`.
///
/// Only equality terms are understood; that is all this crate ever builds.
pub fn selector_matches(
    selector: &str,
    labels: &std::collections::HashMap<String, String>,
) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
            None => labels.contains_key(term),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn selector_requires_all_terms() {
        let l = labels(&[("group-id", "web"), ("env", "prod")]);
        assert!(selector_matches("group-id=web", &l));
        assert!(selector_matches("group-id=web,env=prod", &l));
        assert!(!selector_matches("group-id=web,env=dev", &l));
        assert!(!selector_matches("group-id=api", &l));
    }

    #[test]
    fn selector_existence_term() {
        let l = labels(&[("group-id", "web")]);
        assert!(selector_matches("group-id", &l));
        assert!(!selector_matches("team", &l));
    }

    #[test]
    fn empty_selector_matches_everything() {
        assert!(selector_matches("", &HashMap::new()));
    }
}
