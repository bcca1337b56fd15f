use hsg_cloud::CloudApi;
use hsg_cloud::types::{ActionId, ActionStatus};
use hsg_config::RetryPolicy;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Final state of a batch of provider actions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub succeeded: Vec<ActionId>,
    pub failed: Vec<ActionId>,
}

/// Waits for provider actions to reach a terminal state with bounded retries.
pub struct ActionPoller<'a> {
    cloud: &'a dyn CloudApi,
    retry: RetryPolicy,
}

impl<'a> ActionPoller<'a> {
    pub fn new(cloud: &'a dyn CloudApi, retry: RetryPolicy) -> Self {
        Self { cloud, retry }
    }

    /// Poll until every action is complete or the retry limit is spent.
    ///
    /// Actions the provider leaves out of a response stay pending. A failed
    /// status query still consumes an attempt.
    pub async fn await_all(&self, ids: &[ActionId]) -> Result<PollOutcome> {
        let mut outcome = PollOutcome::default();
        let mut pending = ids.to_vec();
        let limit = self.retry.limit.max(1);

        for attempt in 1..=limit {
            if pending.is_empty() {
                break;
            }

            match self.cloud.get_actions(&pending).await {
                Ok(actions) => {
                    pending.retain(|id| {
                        let Some(action) = actions.iter().find(|a| a.id == *id) else {
                            return true;
                        };
                        if !action.is_complete() {
                            return true;
                        }
                        if action.status == ActionStatus::Error {
                            let reason = action.error.as_ref().map(|e| e.message.as_str());
                            warn!(action_id = %id, reason, "action finished with error");
                            outcome.failed.push(*id);
                        } else {
                            outcome.succeeded.push(*id);
                        }
                        false
                    });
                }
                Err(e) => warn!(attempt, error = %e, "failed to query action status"),
            }

            if pending.is_empty() {
                break;
            }

            debug!(attempt, outstanding = pending.len(), "waiting for actions to finish");
            if attempt < limit {
                tokio::time::sleep(self.retry.interval).await;
            }
        }

        if pending.is_empty() {
            Ok(outcome)
        } else {
            Err(Error::PollTimeout {
                outstanding: pending.len(),
                attempts: limit,
            })
        }
    }
}
