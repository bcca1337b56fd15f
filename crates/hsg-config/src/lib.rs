//! Configuration resolution for Hetzner Cloud server groups.
//!
//! Operators hand over flat `key -> string` maps. A static [`schema::Schema`]
//! per config scope declares the shape, default and validation rule of every
//! key; the [`resolver::Resolver`] turns the strings into typed values and
//! looks provider resources up by ID or name along the way.

pub mod labels;
pub mod plugin;
pub mod resolver;
pub mod schema;
pub mod target;
pub mod validate;

use std::collections::HashMap;

use hsg_cloud::types::ResourceKind;

pub use labels::parse_labels;
pub use plugin::{PluginConfig, RetryPolicy};
pub use schema::Scope;
pub use target::{FirewallAttachment, TargetConfig};

/// Raw operator input, as handed over by the plugin host.
pub type FlatConfig = HashMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to parse {key} value {value:?}: {reason}")]
    ConfigParse {
        key: String,
        value: String,
        reason: String,
    },

    #[error("failed to get {kind} with id or name equal to {name}: {reason}")]
    ResourceResolution {
        kind: ResourceKind,
        name: String,
        reason: String,
    },

    #[error("failed to parse labels {0}")]
    LabelParse(String),

    #[error("{message}")]
    Validation {
        field: &'static str,
        scope: Scope,
        message: String,
    },
}

impl Error {
    pub(crate) fn parse(key: &str, value: &str, reason: impl ToString) -> Self {
        Self::ConfigParse {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
