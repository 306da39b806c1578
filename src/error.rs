use thiserror::Error;

/// Problems with parameters, tables or scenarios. Always detected before the
/// first step runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("parameter `{name}` is invalid: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("unknown land constraint mode `{0}` (expected unlimited, step or asymptote)")]
    UnknownLandConstraintMode(String),

    #[error("vital rate table is invalid: {0}")]
    InvalidVitalRates(String),

    #[error("scenario is invalid: {0}")]
    InvalidScenario(String),
}

impl ConfigError {
    pub(crate) fn parameter(name: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Fatal conditions raised by a system while advancing the world.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("step {step} failed in system `{system}`: {source}")]
    Step {
        step: u64,
        system: String,
        #[source]
        source: SimulationError,
    },

    #[error("simulation already completed at step {0}")]
    AlreadyCompleted(u64),

    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl EngineError {
    /// Step index attached to the failure, when it happened inside a step.
    pub fn step(&self) -> Option<u64> {
        match self {
            EngineError::Step { step, .. } => Some(*step),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplicateError {
    #[error("replicate {replicate} failed: {message}")]
    Failed { replicate: u32, message: String },

    #[error("replicate {replicate} panicked: {message}")]
    Panicked { replicate: u32, message: String },
}

impl ReplicateError {
    pub fn replicate(&self) -> u32 {
        match self {
            ReplicateError::Failed { replicate, .. } | ReplicateError::Panicked { replicate, .. } => {
                *replicate
            }
        }
    }
}
