use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hsg_cloud::CloudApi;
use hsg_cloud::types::{PublicNet, ResourceKind, ResourceRef, ServerSpec};

use crate::resolver::{FieldKind, Resolver, Value};
use crate::schema::{FieldSpec, Schema, Scope};
use crate::validate::{Rule, ValidationContext};
use crate::{Error, FlatConfig, Result};

pub const KEY_DATACENTER: &str = "hcloud_datacenter";
pub const KEY_LOCATION: &str = "hcloud_location";
pub const KEY_PLACEMENT_GROUP: &str = "hcloud_placement_group";
pub const KEY_FIREWALLS: &str = "hcloud_firewalls";
pub const KEY_IMAGE: &str = "hcloud_image";
pub const KEY_USER_DATA: &str = "hcloud_user_data";
pub const KEY_SSH_KEYS: &str = "hcloud_ssh_keys";
pub const KEY_LABELS: &str = "hcloud_labels";
pub const KEY_SERVER_TYPE: &str = "hcloud_server_type";
pub const KEY_GROUP_ID: &str = "hcloud_group_id";
pub const KEY_NETWORKS: &str = "hcloud_networks";
pub const KEY_B64_USER_DATA_ENCODED: &str = "hcloud_b64_user_data_encoded";
pub const KEY_PUBLIC_NET_ENABLE_IPV4: &str = "hcloud_public_net_enable_ipv4";
pub const KEY_PUBLIC_NET_ENABLE_IPV6: &str = "hcloud_public_net_enable_ipv6";

pub static SCHEMA: Schema = Schema {
    scope: Scope::Target,
    fields: &[
        FieldSpec::new(
            KEY_DATACENTER,
            FieldKind::Optional(&FieldKind::Resource(ResourceKind::Datacenter)),
        )
        .with_rule(Rule::RequiredWithout(KEY_LOCATION)),
        FieldSpec::new(
            KEY_LOCATION,
            FieldKind::Optional(&FieldKind::Resource(ResourceKind::Location)),
        )
        .with_rule(Rule::RequiredWithout(KEY_DATACENTER)),
        FieldSpec::new(
            KEY_PLACEMENT_GROUP,
            FieldKind::Optional(&FieldKind::Resource(ResourceKind::PlacementGroup)),
        ),
        FieldSpec::new(
            KEY_FIREWALLS,
            FieldKind::Sequence(&FieldKind::Composite(&[
                FieldKind::Resource(ResourceKind::Firewall),
                FieldKind::Opaque,
            ])),
        ),
        FieldSpec::new(KEY_IMAGE, FieldKind::Resource(ResourceKind::Image))
            .with_default("ubuntu-20.04")
            .with_rule(Rule::Required),
        FieldSpec::new(KEY_USER_DATA, FieldKind::Text).with_rule(Rule::Required),
        FieldSpec::new(
            KEY_SSH_KEYS,
            FieldKind::Sequence(&FieldKind::Resource(ResourceKind::SshKey)),
        )
        .with_rule(Rule::Required),
        FieldSpec::new(KEY_LABELS, FieldKind::Mapping),
        FieldSpec::new(KEY_SERVER_TYPE, FieldKind::Resource(ResourceKind::ServerType))
            .with_default("cx11")
            .with_rule(Rule::Required),
        FieldSpec::new(KEY_GROUP_ID, FieldKind::Text).with_rule(Rule::Required),
        FieldSpec::new(
            KEY_NETWORKS,
            FieldKind::Sequence(&FieldKind::Resource(ResourceKind::Network)),
        ),
        FieldSpec::new(KEY_B64_USER_DATA_ENCODED, FieldKind::Flag).with_default("false"),
        FieldSpec::new(KEY_PUBLIC_NET_ENABLE_IPV4, FieldKind::Flag).with_default("true"),
        FieldSpec::new(KEY_PUBLIC_NET_ENABLE_IPV6, FieldKind::Flag).with_default("false"),
    ],
};

/// A firewall to attach at creation time.
///
/// The second slot of the composite shape is the attachment status the API
/// reports back; it is never read from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallAttachment {
    pub firewall: ResourceRef,
}

impl FirewallAttachment {
    fn from_value(value: Value) -> Option<Self> {
        value
            .into_composite()
            .into_iter()
            .find_map(Value::into_resource)
            .map(|firewall| Self { firewall })
    }
}

/// Per-group descriptor, resolved fresh on every scale or status call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    pub datacenter: Option<ResourceRef>,
    pub location: Option<ResourceRef>,
    pub placement_group: Option<ResourceRef>,
    pub firewalls: Vec<FirewallAttachment>,
    pub image: ResourceRef,
    pub user_data: String,
    pub ssh_keys: Vec<ResourceRef>,
    pub labels: BTreeMap<String, String>,
    pub server_type: ResourceRef,
    pub group_id: String,
    pub networks: Vec<ResourceRef>,
    pub b64_user_data_encoded: bool,
    pub public_net: PublicNet,
}

fn resources(value: Value) -> Vec<ResourceRef> {
    value
        .into_sequence()
        .into_iter()
        .filter_map(Value::into_resource)
        .collect()
}

impl TargetConfig {
    pub async fn resolve(raw: &FlatConfig, cloud: &dyn CloudApi) -> Result<Self> {
        let mut fields = SCHEMA
            .resolve(raw, &Resolver::new(cloud), &ValidationContext::default())
            .await?;

        Ok(Self {
            datacenter: fields.take(KEY_DATACENTER).into_resource(),
            location: fields.take(KEY_LOCATION).into_resource(),
            placement_group: fields.take(KEY_PLACEMENT_GROUP).into_resource(),
            firewalls: fields
                .take(KEY_FIREWALLS)
                .into_sequence()
                .into_iter()
                .filter_map(FirewallAttachment::from_value)
                .collect(),
            image: fields.require(KEY_IMAGE, Value::into_resource)?,
            user_data: fields.require(KEY_USER_DATA, Value::into_text)?,
            ssh_keys: fields.require(KEY_SSH_KEYS, |v| Some(resources(v)))?,
            labels: fields.take(KEY_LABELS).into_mapping(),
            server_type: fields.require(KEY_SERVER_TYPE, Value::into_resource)?,
            group_id: fields.require(KEY_GROUP_ID, Value::into_text)?,
            networks: resources(fields.take(KEY_NETWORKS)),
            b64_user_data_encoded: fields
                .take(KEY_B64_USER_DATA_ENCODED)
                .into_flag()
                .unwrap_or(false),
            public_net: PublicNet {
                enable_ipv4: fields
                    .take(KEY_PUBLIC_NET_ENABLE_IPV4)
                    .into_flag()
                    .unwrap_or(true),
                enable_ipv6: fields
                    .take(KEY_PUBLIC_NET_ENABLE_IPV6)
                    .into_flag()
                    .unwrap_or(false),
            },
        })
    }

    /// Label selector matching every member of the group.
    pub fn selector(&self, group_label: &str) -> String {
        std::iter::once(format!("{group_label}={}", self.group_id))
            .chain(
                self.labels
                    .iter()
                    .filter(|(key, _)| key.as_str() != group_label)
                    .map(|(key, value)| format!("{key}={value}")),
            )
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Labels stamped on new members. The group label always wins.
    pub fn member_labels(&self, group_label: &str) -> BTreeMap<String, String> {
        let mut labels = self.labels.clone();
        labels.insert(group_label.to_string(), self.group_id.clone());
        labels
    }

    /// `<group_id>-<random hex>` with a suffix of `suffix_len` characters.
    pub fn random_name(&self, suffix_len: usize) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let len = suffix_len.clamp(1, suffix.len());
        format!("{}-{}", self.group_id, &suffix[..len])
    }

    /// User data as it should be handed to the server.
    pub fn user_data(&self) -> Result<String> {
        if !self.b64_user_data_encoded {
            return Ok(self.user_data.clone());
        }
        let bytes = STANDARD
            .decode(self.user_data.trim())
            .map_err(|e| Error::parse(KEY_USER_DATA, &self.user_data, e))?;
        String::from_utf8(bytes).map_err(|e| Error::parse(KEY_USER_DATA, &self.user_data, e))
    }

    /// Creation request for one new member called `name`.
    pub fn server_spec(&self, name: String, group_label: &str) -> Result<ServerSpec> {
        Ok(ServerSpec {
            name,
            server_type: self.server_type.clone(),
            image: self.image.clone(),
            location: self.location.clone(),
            datacenter: self.datacenter.clone(),
            placement_group: self.placement_group.clone(),
            user_data: self.user_data()?,
            ssh_keys: self.ssh_keys.clone(),
            networks: self.networks.clone(),
            firewalls: self.firewalls.iter().map(|fw| fw.firewall.clone()).collect(),
            labels: self.member_labels(group_label),
            public_net: self.public_net,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsg_cloud::memory::MemoryCloud;

    fn cloud() -> MemoryCloud {
        MemoryCloud::new()
            .with_resource(ResourceKind::Location, 1, "fsn1")
            .with_resource(ResourceKind::Datacenter, 4, "fsn1-dc14")
            .with_resource(ResourceKind::Image, 67794396, "ubuntu-20.04")
            .with_resource(ResourceKind::Image, 103908070, "debian-12")
            .with_resource(ResourceKind::ServerType, 1, "cx11")
            .with_resource(ResourceKind::SshKey, 77, "key-a")
            .with_resource(ResourceKind::Network, 5, "mynet")
            .with_resource(ResourceKind::Firewall, 9, "web-fw")
            .with_resource(ResourceKind::PlacementGroup, 3, "spread")
    }

    fn raw(pairs: &[(&str, &str)]) -> FlatConfig {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn minimal() -> FlatConfig {
        raw(&[
            (KEY_GROUP_ID, "web"),
            (KEY_LOCATION, "fsn1"),
            (KEY_USER_DATA, "#!/bin/sh"),
            (KEY_SSH_KEYS, "key-a"),
            (KEY_SERVER_TYPE, "cx11"),
            (KEY_IMAGE, "ubuntu-20.04"),
        ])
    }

    fn expect_validation(result: Result<TargetConfig>, expected: &str) {
        match result {
            Err(Error::Validation { field, scope, .. }) => {
                assert_eq!(field, expected);
                assert_eq!(scope, Scope::Target);
            }
            other => panic!("expected validation error on {expected}, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn minimal_config_resolves_identities() {
        let cloud = cloud();
        let config = TargetConfig::resolve(&minimal(), &cloud).await.unwrap();

        assert_eq!(config.group_id, "web");
        assert_eq!(config.location.as_ref().unwrap().id, 1);
        assert!(config.datacenter.is_none());
        assert_eq!(config.image.id, 67794396);
        assert_ne!(config.server_type.id, 0);
        assert_eq!(config.ssh_keys.len(), 1);
        assert_eq!(config.ssh_keys[0].id, 77);
        assert!(config.networks.is_empty());
        assert!(config.firewalls.is_empty());
        assert!(config.public_net.enable_ipv4);
        assert!(!config.public_net.enable_ipv6);
        assert!(!config.b64_user_data_encoded);
    }

    #[tokio::test]
    async fn defaults_are_resolved_too() {
        let cloud = cloud();
        let mut input = minimal();
        input.remove(KEY_IMAGE);
        input.remove(KEY_SERVER_TYPE);

        let config = TargetConfig::resolve(&input, &cloud).await.unwrap();
        assert_eq!(config.image.name, "ubuntu-20.04");
        assert_eq!(config.image.id, 67794396);
        assert_eq!(config.server_type.name, "cx11");
    }

    #[tokio::test]
    async fn full_config() {
        let cloud = cloud();
        let mut input = minimal();
        input.extend(raw(&[
            (KEY_DATACENTER, "fsn1-dc14"),
            (KEY_PLACEMENT_GROUP, "spread"),
            (KEY_FIREWALLS, "web-fw"),
            (KEY_NETWORKS, "mynet"),
            (KEY_LABELS, "env=prod,team=infra"),
            (KEY_IMAGE, "103908070"),
            (KEY_PUBLIC_NET_ENABLE_IPV6, "true"),
            (KEY_PUBLIC_NET_ENABLE_IPV4, "false"),
        ]));

        let config = TargetConfig::resolve(&input, &cloud).await.unwrap();
        assert_eq!(config.datacenter.unwrap().id, 4);
        assert_eq!(config.placement_group.unwrap().name, "spread");
        assert_eq!(config.firewalls[0].firewall.id, 9);
        assert_eq!(config.networks[0].id, 5);
        assert_eq!(config.labels.len(), 2);
        assert_eq!(config.image.name, "debian-12");
        assert!(config.public_net.enable_ipv6);
        assert!(!config.public_net.enable_ipv4);
    }

    #[tokio::test]
    async fn location_or_datacenter_is_required() {
        let cloud = cloud();

        let mut neither = minimal();
        neither.remove(KEY_LOCATION);
        expect_validation(TargetConfig::resolve(&neither, &cloud).await, KEY_DATACENTER);

        let mut datacenter_only = neither.clone();
        datacenter_only.insert(KEY_DATACENTER.into(), "fsn1-dc14".into());
        let config = TargetConfig::resolve(&datacenter_only, &cloud).await.unwrap();
        assert!(config.location.is_none());
        assert_eq!(config.datacenter.unwrap().name, "fsn1-dc14");

        assert!(TargetConfig::resolve(&minimal(), &cloud).await.is_ok());
    }

    #[tokio::test]
    async fn mandatory_fields() {
        let cloud = cloud();
        for key in [KEY_USER_DATA, KEY_SSH_KEYS, KEY_GROUP_ID] {
            let mut input = minimal();
            input.remove(key);
            expect_validation(TargetConfig::resolve(&input, &cloud).await, key);
        }

        let mut only_commas = minimal();
        only_commas.insert(KEY_SSH_KEYS.into(), ",,".into());
        expect_validation(TargetConfig::resolve(&only_commas, &cloud).await, KEY_SSH_KEYS);
    }

    #[tokio::test]
    async fn unknown_resources_fail_resolution() {
        let cloud = cloud();
        let mut input = minimal();
        input.insert(KEY_NETWORKS.into(), "mynet,othernet".into());

        match TargetConfig::resolve(&input, &cloud).await {
            Err(Error::ResourceResolution { kind, name, .. }) => {
                assert_eq!(kind, ResourceKind::Network);
                assert_eq!(name, "othernet");
            }
            other => panic!("expected resolution error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_labels_fail_before_validation() {
        let cloud = cloud();
        let mut input = minimal();
        input.insert(KEY_LABELS.into(), "env".into());
        assert!(matches!(
            TargetConfig::resolve(&input, &cloud).await,
            Err(Error::LabelParse(raw)) if raw == "env"
        ));
    }

    #[tokio::test]
    async fn selector_and_member_labels() {
        let cloud = cloud();
        let mut input = minimal();
        input.insert(KEY_LABELS.into(), "team=infra,env=prod,group-id=spoofed".into());
        let config = TargetConfig::resolve(&input, &cloud).await.unwrap();

        assert_eq!(config.selector("group-id"), "group-id=web,env=prod,team=infra");

        let labels = config.member_labels("group-id");
        assert_eq!(labels["group-id"], "web");
        assert_eq!(labels["env"], "prod");
    }

    #[tokio::test]
    async fn user_data_decoding() {
        let cloud = cloud();
        let mut input = minimal();
        input.insert(KEY_USER_DATA.into(), STANDARD.encode("#cloud-config\n"));
        input.insert(KEY_B64_USER_DATA_ENCODED.into(), "true".into());
        let config = TargetConfig::resolve(&input, &cloud).await.unwrap();
        assert_eq!(config.user_data().unwrap(), "#cloud-config\n");

        input.insert(KEY_USER_DATA.into(), "not base64!".into());
        let config = TargetConfig::resolve(&input, &cloud).await.unwrap();
        assert!(matches!(
            config.user_data(),
            Err(Error::ConfigParse { key, .. }) if key == KEY_USER_DATA
        ));
    }

    #[tokio::test]
    async fn names_and_specs() {
        let cloud = cloud();
        let config = TargetConfig::resolve(&minimal(), &cloud).await.unwrap();

        let name = config.random_name(10);
        assert!(name.starts_with("web-"));
        assert_eq!(name.len(), "web-".len() + 10);
        assert_ne!(config.random_name(10), name);

        let spec = config.server_spec(name.clone(), "group-id").unwrap();
        assert_eq!(spec.name, name);
        assert_eq!(spec.image.id, 67794396);
        assert_eq!(spec.user_data, "#!/bin/sh");
        assert_eq!(spec.labels["group-id"], "web");
        assert_eq!(spec.location.unwrap().name, "fsn1");
    }
}
