use std::collections::HashMap;

use async_trait::async_trait;
use hcloud::apis::configuration::Configuration;
use hcloud::apis::{
    actions_api, datacenters_api, firewalls_api, images_api, locations_api, networks_api,
    placement_groups_api, server_types_api, servers_api, ssh_keys_api,
};
use hcloud::models;
use tracing::{debug, info, warn};

use crate::types::{
    Action, ActionError, ActionId, ActionStatus, CreatedServer, ResourceKind, ResourceRef, Server,
    ServerId, ServerQuery, ServerSpec, ServerStatus,
};
use crate::{CloudApi, Error, Result};

/// Base URL the generated `hcloud` client resolves every request against.
const API_BASE: &str = "https://api.hetzner.cloud/v1";

/// Hetzner Cloud provider using the `hcloud` crate.
pub struct HetznerCloud {
    config: Configuration,
}

impl HetznerCloud {
    pub fn new(token: impl Into<String>) -> Self {
        let mut config = Configuration::new();
        config.bearer_access_token = Some(token.into());
        Self { config }
    }

    /// Point the client at a different API base URL (mock servers, proxies).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config
            .base_path_mapping
            .insert(API_BASE.to_string(), endpoint.into());
        self
    }

    /// Create from env vars:
    ///
    /// - `HCLOUD_TOKEN` (required)
    /// - `HCLOUD_ENDPOINT` (optional API base URL override)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let token =
            std::env::var("HCLOUD_TOKEN").map_err(|_| Error::MissingEnv("HCLOUD_TOKEN".into()))?;

        let cloud = Self::new(token);
        Ok(match std::env::var("HCLOUD_ENDPOINT") {
            Ok(endpoint) if !endpoint.trim().is_empty() => cloud.with_endpoint(endpoint),
            _ => cloud,
        })
    }

    fn parse_status(status: &models::server::Status) -> ServerStatus {
        match status {
            models::server::Status::Running => ServerStatus::Running,
            models::server::Status::Initializing => ServerStatus::Initializing,
            models::server::Status::Starting => ServerStatus::Starting,
            models::server::Status::Stopping => ServerStatus::Stopping,
            models::server::Status::Off => ServerStatus::Off,
            models::server::Status::Deleting => ServerStatus::Deleting,
            _ => ServerStatus::Unknown,
        }
    }

    fn server(server: &models::Server) -> Server {
        Server {
            id: ServerId(server.id),
            name: server.name.clone(),
            status: Self::parse_status(&server.status),
            labels: server.labels.clone(),
        }
    }

    fn action(action: &models::Action) -> Action {
        let status = match action.status {
            models::action::Status::Success => ActionStatus::Success,
            models::action::Status::Error => ActionStatus::Error,
            models::action::Status::Running => ActionStatus::Running,
        };
        Action {
            id: ActionId(action.id),
            progress: action.progress.clamp(0, 100) as u8,
            status,
            error: action.error.as_ref().map(|e| ActionError {
                code: e.code.clone(),
                message: e.message.clone(),
            }),
        }
    }

    /// The API reports unknown IDs as 404; treat that as "no such resource".
    fn not_found<T>(err: impl std::fmt::Display, what: &str) -> Result<Option<T>> {
        let msg = err.to_string();
        if msg.contains("404") {
            return Ok(None);
        }
        Err(Error::HetznerApi(format!("{what}: {msg}")))
    }

    async fn get_by_id(&self, kind: ResourceKind, id: i64) -> Result<Option<ResourceRef>> {
        let found = |name: Option<String>| -> Result<Option<ResourceRef>> {
            Ok(name.map(|name| ResourceRef::new(kind, id, name)))
        };
        match kind {
            ResourceKind::Datacenter => {
                match datacenters_api::get_data_center(
                    &self.config,
                    datacenters_api::GetDataCenterParams { id },
                )
                .await
                {
                    Ok(resp) => found(Some(resp.datacenter.name.clone())),
                    Err(e) => Self::not_found(e, "get datacenter"),
                }
            }
            ResourceKind::Location => {
                match locations_api::get_location(
                    &self.config,
                    locations_api::GetLocationParams { id },
                )
                .await
                {
                    Ok(resp) => found(Some(resp.location.name.clone())),
                    Err(e) => Self::not_found(e, "get location"),
                }
            }
            ResourceKind::PlacementGroup => {
                match placement_groups_api::get_placementgroup(
                    &self.config,
                    placement_groups_api::GetPlacementgroupParams { id },
                )
                .await
                {
                    Ok(resp) => found(Some(resp.placement_group.name.clone())),
                    Err(e) => Self::not_found(e, "get placement group"),
                }
            }
            ResourceKind::Firewall => {
                match firewalls_api::get_firewall(
                    &self.config,
                    firewalls_api::GetFirewallParams { id },
                )
                .await
                {
                    Ok(resp) => found(Some(resp.firewall.name.clone())),
                    Err(e) => Self::not_found(e, "get firewall"),
                }
            }
            ResourceKind::Image => {
                match images_api::get_image(&self.config, images_api::GetImageParams { id }).await
                {
                    Ok(resp) => found(
                        resp.image
                            .as_ref()
                            .map(|image| image.name.clone().unwrap_or_default()),
                    ),
                    Err(e) => Self::not_found(e, "get image"),
                }
            }
            ResourceKind::SshKey => {
                match ssh_keys_api::get_ssh_key(&self.config, ssh_keys_api::GetSshKeyParams { id })
                    .await
                {
                    Ok(resp) => found(Some(resp.ssh_key.name.clone())),
                    Err(e) => Self::not_found(e, "get ssh key"),
                }
            }
            ResourceKind::ServerType => {
                match server_types_api::get_server_type(
                    &self.config,
                    server_types_api::GetServerTypeParams { id },
                )
                .await
                {
                    Ok(resp) => found(Some(resp.server_type.name.clone())),
                    Err(e) => Self::not_found(e, "get server type"),
                }
            }
            ResourceKind::Network => {
                match networks_api::get_network(&self.config, networks_api::GetNetworkParams { id })
                    .await
                {
                    Ok(resp) => found(resp.network.as_ref().map(|network| network.name.clone())),
                    Err(e) => Self::not_found(e, "get network"),
                }
            }
        }
    }

    async fn get_by_name(&self, kind: ResourceKind, name: &str) -> Result<Option<ResourceRef>> {
        let name_filter = Some(name.to_string());
        let api = |what: &str, e: &dyn std::fmt::Display| Error::HetznerApi(format!("{what}: {e}"));

        let found = match kind {
            ResourceKind::Datacenter => datacenters_api::list_data_centers(
                &self.config,
                datacenters_api::ListDataCentersParams {
                    name: name_filter,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| api("list datacenters", &e))?
            .datacenters
            .first()
            .map(|d| (d.id, d.name.clone())),
            ResourceKind::Location => locations_api::list_locations(
                &self.config,
                locations_api::ListLocationsParams {
                    name: name_filter,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| api("list locations", &e))?
            .locations
            .first()
            .map(|l| (l.id, l.name.clone())),
            ResourceKind::PlacementGroup => placement_groups_api::list_placement_groups(
                &self.config,
                placement_groups_api::ListPlacementGroupsParams {
                    name: name_filter,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| api("list placement groups", &e))?
            .placement_groups
            .first()
            .map(|p| (p.id, p.name.clone())),
            ResourceKind::Firewall => firewalls_api::list_firewalls(
                &self.config,
                firewalls_api::ListFirewallsParams {
                    name: name_filter,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| api("list firewalls", &e))?
            .firewalls
            .first()
            .map(|f| (f.id, f.name.clone())),
            ResourceKind::Image => images_api::list_images(
                &self.config,
                images_api::ListImagesParams {
                    name: name_filter,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| api("list images", &e))?
            .images
            .first()
            .map(|i| (i.id, i.name.clone().unwrap_or_default())),
            ResourceKind::SshKey => ssh_keys_api::list_ssh_keys(
                &self.config,
                ssh_keys_api::ListSshKeysParams {
                    name: name_filter,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| api("list ssh keys", &e))?
            .ssh_keys
            .first()
            .map(|k| (k.id, k.name.clone())),
            ResourceKind::ServerType => server_types_api::list_server_types(
                &self.config,
                server_types_api::ListServerTypesParams {
                    name: name_filter,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| api("list server types", &e))?
            .server_types
            .first()
            .map(|t| (t.id, t.name.clone())),
            ResourceKind::Network => networks_api::list_networks(
                &self.config,
                networks_api::ListNetworksParams {
                    name: name_filter,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| api("list networks", &e))?
            .networks
            .first()
            .map(|n| (n.id, n.name.clone())),
        };

        Ok(found.map(|(id, name)| ResourceRef::new(kind, id, name)))
    }
}

#[async_trait]
impl CloudApi for HetznerCloud {
    async fn lookup(&self, kind: ResourceKind, id_or_name: &str) -> Result<Option<ResourceRef>> {
        let id_or_name = id_or_name.trim();
        debug!(%kind, id_or_name, "hetzner: resolving resource");
        match id_or_name.parse::<i64>() {
            Ok(id) => self.get_by_id(kind, id).await,
            Err(_) => self.get_by_name(kind, id_or_name).await,
        }
    }

    async fn list_servers(&self, query: &ServerQuery) -> Result<Vec<Server>> {
        let per_page = i64::from(query.per_page.max(1));
        let mut page = 1;
        let mut servers = Vec::new();

        loop {
            let resp = servers_api::list_servers(
                &self.config,
                servers_api::ListServersParams {
                    label_selector: Some(query.label_selector.clone()),
                    status: query.status.map(|status| vec![status.as_str().to_string()]),
                    page: Some(page),
                    per_page: Some(per_page),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::HetznerApi(format!("list servers: {e}")))?;

            let fetched = resp.servers.len() as i64;
            servers.extend(resp.servers.iter().map(Self::server));

            if fetched < per_page {
                break;
            }
            page += 1;
        }

        Ok(servers)
    }

    async fn create_server(&self, spec: &ServerSpec) -> Result<CreatedServer> {
        let firewalls = (!spec.firewalls.is_empty()).then(|| {
            spec.firewalls
                .iter()
                .map(|fw| models::CreateServerRequestFirewalls { firewall: fw.id })
                .collect()
        });

        let ssh_keys = (!spec.ssh_keys.is_empty())
            .then(|| spec.ssh_keys.iter().map(ResourceRef::id_or_name).collect());

        let networks = (!spec.networks.is_empty())
            .then(|| spec.networks.iter().map(|n| n.id).collect());

        let labels: HashMap<String, String> = spec
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let resp = servers_api::create_server(
            &self.config,
            servers_api::CreateServerParams {
                create_server_request: models::CreateServerRequest {
                    name: spec.name.clone(),
                    server_type: spec.server_type.id_or_name(),
                    image: spec.image.id.to_string(),
                    location: spec.location.as_ref().map(|l| l.name.clone()),
                    user_data: Some(spec.user_data.clone()),
                    networks,
                    firewalls,
                    ssh_keys,
                    volumes: None,
                    start_after_create: Some(true),
                    automount: None,
                    datacenter: spec.datacenter.as_ref().map(|d| d.name.clone()),
                    labels: Some(labels),
                    placement_group: spec.placement_group.as_ref().map(|p| p.id),
                    public_net: Some(Box::new(models::CreateServerRequestPublicNet {
                        enable_ipv4: Some(spec.public_net.enable_ipv4),
                        enable_ipv6: Some(spec.public_net.enable_ipv6),
                        ..Default::default()
                    })),
                },
            },
        )
        .await
        .map_err(|e| Error::HetznerApi(format!("create server: {e}")))?;

        let server = Self::server(&resp.server);
        let action = Self::action(&resp.action);

        info!(server_id = %server.id, name = %server.name, action_id = %action.id, "hetzner: server created");

        Ok(CreatedServer { server, action })
    }

    async fn delete_server(&self, id: ServerId) -> Result<()> {
        if let Err(e) = servers_api::delete_server(
            &self.config,
            servers_api::DeleteServerParams { id: id.0 },
        )
        .await
        {
            let msg = format!("{e}");
            if msg.contains("404") {
                warn!(server_id = %id, "hetzner: server already destroyed");
                return Ok(());
            }
            return Err(Error::HetznerApi(format!("delete server: {e}")));
        }

        info!(server_id = %id, "hetzner: server deleted");
        Ok(())
    }

    async fn get_actions(&self, ids: &[ActionId]) -> Result<Vec<Action>> {
        // An empty id filter would list every action on the project.
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let resp = actions_api::get_multiple_actions(
            &self.config,
            actions_api::GetMultipleActionsParams {
                id: ids.iter().map(|id| id.0).collect(),
            },
        )
        .await
        .map_err(|e| Error::HetznerApi(format!("get actions: {e}")))?;

        Ok(resp.actions.iter().map(Self::action).collect())
    }
}
