use crate::request::Tier;

/// Failure of a single backend invocation.
///
/// Every variant is tier-local: the orchestrator logs it and moves on to the
/// next tier. Only [`SynthesisError`] leaves the orchestrator.
#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("no remote endpoint reachable")]
    ConnectivityUnavailable,
    #[error("{backend} failed: {message}")]
    Transient { backend: String, message: String },
    #[error("{backend} timed out after {millis}ms")]
    Timeout { backend: String, millis: u64 },
    #[error("could not construct {family} backend: {message}")]
    Construction { family: String, message: String },
    #[error("backend produced no audio at {}", path.display())]
    EmptyOutput { path: std::path::PathBuf },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn transient(backend: impl Into<String>, message: impl ToString) -> Self {
        Self::Transient {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    pub fn construction(family: impl Into<String>, message: impl ToString) -> Self {
        Self::Construction {
            family: family.into(),
            message: message.to_string(),
        }
    }
}

/// Terminal outcome of [`crate::SpeechOrchestrator::synthesize`].
#[derive(thiserror::Error, Debug)]
pub enum SynthesisError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("all tiers exhausted; last tier {tier} failed: {source}")]
    AllTiersExhausted {
        tier: Tier,
        #[source]
        source: BackendError,
    },
    #[error("request deadline of {millis}ms exceeded during {tier} tier")]
    DeadlineExceeded { tier: Tier, millis: u64 },
    #[error("output directory unusable: {0}")]
    Io(#[from] std::io::Error),
}

impl SynthesisError {
    /// Tier that was running when the request failed, if any ran.
    pub fn tier(&self) -> Option<Tier> {
        match self {
            Self::AllTiersExhausted { tier, .. } | Self::DeadlineExceeded { tier, .. } => {
                Some(*tier)
            }
            Self::InvalidRequest(_) | Self::Io(_) => None,
        }
    }
}
