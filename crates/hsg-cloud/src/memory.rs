use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::info;

use crate::types::{
    Action, ActionError, ActionId, ActionStatus, CreatedServer, ResourceKind, ResourceRef, Server,
    ServerId, ServerQuery, ServerSpec, ServerStatus,
};
use crate::{CloudApi, Error, Result, selector_matches};

/// Knobs controlling how [`MemoryCloud`] misbehaves.
#[derive(Debug, Clone, Default)]
pub struct Behaviour {
    /// Number of `get_actions` observations before a create action finishes.
    /// Zero means creations complete synchronously.
    pub action_polls: u32,
    /// Finished create actions end in the error state and their server is powered off.
    pub fail_actions: bool,
    /// Reject every creation after this many successful ones.
    pub fail_creates_after: Option<usize>,
    /// Reject deletion of these servers.
    pub fail_deletes: HashSet<ServerId>,
    /// Reject every read call.
    pub fail_reads: bool,
}

#[derive(Debug)]
struct TrackedAction {
    action: Action,
    server: ServerId,
    polls_left: u32,
}

#[derive(Debug, Default)]
struct State {
    resources: Vec<ResourceRef>,
    servers: BTreeMap<ServerId, Server>,
    actions: HashMap<ActionId, TrackedAction>,
    next_id: i64,
    behaviour: Behaviour,
    created: Vec<ServerSpec>,
    deleted: Vec<ServerId>,
    lookups: usize,
    action_queries: usize,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory provider with scripted action progress.
///
/// New servers stay `initializing` until their create action has been
/// observed `action_polls` times, which mimics the eventual consistency of
/// the real API.
#[derive(Debug, Clone, Default)]
pub struct MemoryCloud {
    state: Arc<Mutex<State>>,
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a resource that `lookup` can find.
    pub fn with_resource(self, kind: ResourceKind, id: i64, name: &str) -> Self {
        self.state().resources.push(ResourceRef::new(kind, id, name));
        self
    }

    pub fn with_behaviour(self, behaviour: Behaviour) -> Self {
        self.set_behaviour(behaviour);
        self
    }

    pub fn set_behaviour(&self, behaviour: Behaviour) {
        self.state().behaviour = behaviour;
    }

    /// Add an already running server.
    pub fn seed_server(&self, name: &str, labels: &[(&str, &str)]) -> ServerId {
        self.seed_server_with_status(name, labels, ServerStatus::Running)
    }

    pub fn seed_server_with_status(
        &self,
        name: &str,
        labels: &[(&str, &str)],
        status: ServerStatus,
    ) -> ServerId {
        let mut state = self.state();
        let id = ServerId(state.next_id());
        state.servers.insert(
            id,
            Server {
                id,
                name: name.to_string(),
                status,
                labels: labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        );
        id
    }

    pub fn servers(&self) -> Vec<Server> {
        self.state().servers.values().cloned().collect()
    }

    /// Every creation request accepted so far.
    pub fn created(&self) -> Vec<ServerSpec> {
        self.state().created.clone()
    }

    /// Every server deleted so far.
    pub fn deleted(&self) -> Vec<ServerId> {
        self.state().deleted.clone()
    }

    pub fn lookup_count(&self) -> usize {
        self.state().lookups
    }

    pub fn action_query_count(&self) -> usize {
        self.state().action_queries
    }
}

#[async_trait]
impl CloudApi for MemoryCloud {
    async fn lookup(&self, kind: ResourceKind, id_or_name: &str) -> Result<Option<ResourceRef>> {
        let mut state = self.state();
        state.lookups += 1;
        if state.behaviour.fail_reads {
            return Err(Error::Rejected(format!("lookup {kind} {id_or_name}")));
        }

        let id = id_or_name.parse::<i64>().ok();
        Ok(state
            .resources
            .iter()
            .find(|r| r.kind == kind && (Some(r.id) == id || r.name == id_or_name))
            .cloned())
    }

    async fn list_servers(&self, query: &ServerQuery) -> Result<Vec<Server>> {
        let state = self.state();
        if state.behaviour.fail_reads {
            return Err(Error::Rejected("list servers".into()));
        }

        Ok(state
            .servers
            .values()
            .filter(|s| selector_matches(&query.label_selector, &s.labels))
            .filter(|s| query.status.is_none_or(|status| s.status == status))
            .cloned()
            .collect())
    }

    async fn create_server(&self, spec: &ServerSpec) -> Result<CreatedServer> {
        let mut state = self.state();
        if let Some(limit) = state.behaviour.fail_creates_after
            && state.created.len() >= limit
        {
            return Err(Error::Rejected(format!("create server {}", spec.name)));
        }

        let id = ServerId(state.next_id());
        let action_id = ActionId(state.next_id());
        let polls_left = state.behaviour.action_polls;
        let done = polls_left == 0;

        let server = Server {
            id,
            name: spec.name.clone(),
            status: if done {
                ServerStatus::Running
            } else {
                ServerStatus::Initializing
            },
            labels: spec
                .labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        let action = Action {
            id: action_id,
            progress: if done { 100 } else { 0 },
            status: if done {
                ActionStatus::Success
            } else {
                ActionStatus::Running
            },
            error: None,
        };

        state.servers.insert(id, server.clone());
        state.actions.insert(
            action_id,
            TrackedAction {
                action: action.clone(),
                server: id,
                polls_left,
            },
        );
        state.created.push(spec.clone());

        info!(server_id = %id, name = %spec.name, "memory: server created");
        Ok(CreatedServer { server, action })
    }

    async fn delete_server(&self, id: ServerId) -> Result<()> {
        let mut state = self.state();
        if state.behaviour.fail_deletes.contains(&id) {
            return Err(Error::Rejected(format!("delete server {id}")));
        }
        if state.servers.remove(&id).is_none() {
            return Err(Error::ServerNotFound(id));
        }
        state.deleted.push(id);
        Ok(())
    }

    async fn get_actions(&self, ids: &[ActionId]) -> Result<Vec<Action>> {
        let mut state = self.state();
        state.action_queries += 1;
        if state.behaviour.fail_reads {
            return Err(Error::Rejected("get actions".into()));
        }

        let fail = state.behaviour.fail_actions;
        let mut out = Vec::with_capacity(ids.len());
        let mut finished = Vec::new();

        for id in ids {
            let Some(tracked) = state.actions.get_mut(id) else {
                continue;
            };
            if tracked.polls_left > 0 {
                tracked.polls_left -= 1;
                if tracked.polls_left == 0 {
                    tracked.action.progress = 100;
                    if fail {
                        tracked.action.status = ActionStatus::Error;
                        tracked.action.error = Some(ActionError {
                            code: "server_create_failed".into(),
                            message: "scripted failure".into(),
                        });
                    } else {
                        tracked.action.status = ActionStatus::Success;
                    }
                    finished.push((tracked.server, tracked.action.status));
                } else {
                    tracked.action.progress = tracked.action.progress.saturating_add(50).min(99);
                }
            }
            out.push(tracked.action.clone());
        }

        for (server_id, status) in finished {
            if let Some(server) = state.servers.get_mut(&server_id) {
                server.status = match status {
                    ActionStatus::Success => ServerStatus::Running,
                    _ => ServerStatus::Off,
                };
            }
        }

        Ok(out)
    }
}
