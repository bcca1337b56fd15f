use crate::cluster::BoxError;
use crate::orchestrator::Direction;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] hsg_config::Error),

    #[error("failed to query hetzner cloud: {0}")]
    ProviderQuery(#[source] hsg_cloud::Error),

    #[error("failed to {operation}: {source}")]
    ProviderMutation {
        operation: String,
        source: hsg_cloud::Error,
    },

    #[error("waiting for {outstanding} actions to finish after {attempts} attempts")]
    PollTimeout { outstanding: usize, attempts: u32 },

    #[error("attribute {0:?} not found")]
    AttributeMissing(String),

    #[error("waiting for {missing} servers to create")]
    ScaleOutIncomplete { missing: u64 },

    #[error("failed to perform pre-scale in tasks: {0}")]
    PreScaleIn(BoxError),

    #[error("failed to perform post-scale in tasks: {0}")]
    PostScaleIn(BoxError),

    #[error("failed to run node pool readiness check: {0}")]
    Readiness(BoxError),

    #[error("invalid desired count {0}")]
    InvalidCount(i64),

    #[error("plugin is not configured")]
    NotConfigured,

    #[error("failed to perform scaling action: {direction}: {source}")]
    Scale {
        direction: Direction,
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap with the scaling direction for operator-facing output.
    pub fn during(self, direction: Direction) -> Self {
        Self::Scale {
            direction,
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping the scaling wrapper.
    pub fn cause(&self) -> &Error {
        match self {
            Self::Scale { source, .. } => source.cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
