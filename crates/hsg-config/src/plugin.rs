use std::fmt;
use std::time::Duration;

use crate::resolver::{FieldKind, Resolver, Value};
use crate::schema::{FieldSpec, Schema, Scope};
use crate::validate::{Rule, ValidationContext};
use crate::{FlatConfig, Result};

pub const KEY_TOKEN: &str = "hcloud_token";
pub const KEY_ENDPOINT: &str = "hcloud_endpoint";
pub const KEY_RANDOM_SUFFIX_LEN: &str = "hcloud_random_suffix_len";
pub const KEY_RETRY_INTERVAL: &str = "hcloud_retry_interval";
pub const KEY_RETRY_LIMIT: &str = "hcloud_retry_limit";
pub const KEY_ITEMS_PER_PAGE: &str = "hcloud_items_per_page";
pub const KEY_GROUP_ID_LABEL_SELECTOR: &str = "hcloud_group_id_label_selector";
pub const KEY_NODE_ATTR_ID: &str = "hcloud_node_attr_id";

/// The API never returns more than 50 items per page.
const MAX_ITEMS_PER_PAGE: u64 = 50;
/// A simple UUID has 32 hex digits.
const MAX_SUFFIX_LEN: u64 = 32;

pub static SCHEMA: Schema = Schema {
    scope: Scope::Plugin,
    fields: &[
        FieldSpec::new(KEY_TOKEN, FieldKind::Text).with_rule(Rule::Required),
        FieldSpec::new(KEY_ENDPOINT, FieldKind::Optional(&FieldKind::Text)),
        FieldSpec::new(KEY_RANDOM_SUFFIX_LEN, FieldKind::Count).with_default("10"),
        FieldSpec::new(KEY_RETRY_INTERVAL, FieldKind::Duration).with_default("60s"),
        FieldSpec::new(KEY_RETRY_LIMIT, FieldKind::Count).with_default("5"),
        FieldSpec::new(KEY_ITEMS_PER_PAGE, FieldKind::Count).with_default("50"),
        FieldSpec::new(KEY_GROUP_ID_LABEL_SELECTOR, FieldKind::Text).with_default("group-id"),
        FieldSpec::new(KEY_NODE_ATTR_ID, FieldKind::Text).with_default("unique.hostname"),
    ],
};

/// Fixed-interval retry budget shared by action polling and scale-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    /// Maximum number of attempts, at least one.
    pub limit: u32,
}

/// Process-wide settings, resolved once in `configure`.
#[derive(Clone, PartialEq, Eq)]
pub struct PluginConfig {
    pub token: String,
    pub endpoint: Option<String>,
    pub random_suffix_len: usize,
    pub retry: RetryPolicy,
    pub items_per_page: u32,
    /// Label key that marks group membership.
    pub group_id_label: String,
    /// Node attribute holding the server name.
    pub node_attr_id: String,
}

impl fmt::Debug for PluginConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginConfig")
            .field("token", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("random_suffix_len", &self.random_suffix_len)
            .field("retry", &self.retry)
            .field("items_per_page", &self.items_per_page)
            .field("group_id_label", &self.group_id_label)
            .field("node_attr_id", &self.node_attr_id)
            .finish()
    }
}

impl PluginConfig {
    pub async fn resolve(raw: &FlatConfig) -> Result<Self> {
        let mut fields = SCHEMA
            .resolve(raw, &Resolver::offline(), &ValidationContext::default())
            .await?;

        let token = fields.require(KEY_TOKEN, Value::into_text)?;
        let endpoint = fields.take(KEY_ENDPOINT).into_text();
        let suffix_len = fields.require(KEY_RANDOM_SUFFIX_LEN, Value::into_count)?;
        let interval = fields.require(KEY_RETRY_INTERVAL, Value::into_duration)?;
        let limit = fields.require(KEY_RETRY_LIMIT, Value::into_count)?;
        let per_page = fields.require(KEY_ITEMS_PER_PAGE, Value::into_count)?;

        Ok(Self {
            token,
            endpoint,
            random_suffix_len: suffix_len.clamp(1, MAX_SUFFIX_LEN) as usize,
            retry: RetryPolicy {
                interval,
                limit: limit.clamp(1, u64::from(u32::MAX)) as u32,
            },
            items_per_page: per_page.clamp(1, MAX_ITEMS_PER_PAGE) as u32,
            group_id_label: fields.require(KEY_GROUP_ID_LABEL_SELECTOR, Value::into_text)?,
            node_attr_id: fields.require(KEY_NODE_ATTR_ID, Value::into_text)?,
        })
    }

    /// Build the flat map from `HCLOUD_*` environment variables (loading
    /// `.env` first) and resolve it.
    pub async fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let raw: FlatConfig = SCHEMA
            .fields
            .iter()
            .filter_map(|spec| {
                std::env::var(spec.key.to_uppercase())
                    .ok()
                    .map(|value| (spec.key.to_string(), value))
            })
            .collect();

        Self::resolve(&raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn raw(pairs: &[(&str, &str)]) -> FlatConfig {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn defaults_fill_everything_but_the_token() {
        let config = PluginConfig::resolve(&raw(&[(KEY_TOKEN, "secret")]))
            .await
            .unwrap();

        assert_eq!(config.token, "secret");
        assert_eq!(config.endpoint, None);
        assert_eq!(config.random_suffix_len, 10);
        assert_eq!(config.retry.interval, Duration::from_secs(60));
        assert_eq!(config.retry.limit, 5);
        assert_eq!(config.items_per_page, 50);
        assert_eq!(config.group_id_label, "group-id");
        assert_eq!(config.node_attr_id, "unique.hostname");
    }

    #[tokio::test]
    async fn overrides_are_parsed_and_clamped() {
        let config = PluginConfig::resolve(&raw(&[
            (KEY_TOKEN, "secret"),
            (KEY_ENDPOINT, "http://localhost:4000/v1"),
            (KEY_RETRY_INTERVAL, "2s"),
            (KEY_RETRY_LIMIT, "0"),
            (KEY_ITEMS_PER_PAGE, "500"),
            (KEY_RANDOM_SUFFIX_LEN, "64"),
            (KEY_GROUP_ID_LABEL_SELECTOR, "pool"),
        ]))
        .await
        .unwrap();

        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:4000/v1"));
        assert_eq!(config.retry.interval, Duration::from_secs(2));
        assert_eq!(config.retry.limit, 1);
        assert_eq!(config.items_per_page, 50);
        assert_eq!(config.random_suffix_len, 32);
        assert_eq!(config.group_id_label, "pool");
    }

    #[tokio::test]
    async fn blank_token_is_a_plugin_validation_error() {
        for input in [raw(&[]), raw(&[(KEY_TOKEN, "   ")])] {
            match PluginConfig::resolve(&input).await {
                Err(Error::Validation { field, scope, message }) => {
                    assert_eq!(field, KEY_TOKEN);
                    assert_eq!(scope, Scope::Plugin);
                    assert_eq!(message, "hcloud_token value is not set in a plugin config");
                }
                other => panic!("expected validation error, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn bad_duration_is_a_parse_error() {
        let err = PluginConfig::resolve(&raw(&[(KEY_TOKEN, "t"), (KEY_RETRY_INTERVAL, "often")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConfigParse { key, .. } if key == KEY_RETRY_INTERVAL));
    }

    #[test]
    fn debug_hides_the_token() {
        let config = PluginConfig {
            token: "super-secret".into(),
            endpoint: None,
            random_suffix_len: 10,
            retry: RetryPolicy {
                interval: Duration::from_secs(1),
                limit: 1,
            },
            items_per_page: 50,
            group_id_label: "group-id".into(),
            node_attr_id: "unique.hostname".into(),
        };
        assert!(!format!("{config:?}").contains("super-secret"));
    }
}
