use thiserror::Error;

/// Failures surfaced by the projection engine and the parameter search.
///
/// Every computation is deterministic, so none of these are worth retrying.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(
        "search did not converge after {iterations} iterations (bracket {low:.6}..{high:.6})"
    )]
    NonConvergence { iterations: u32, low: f64, high: f64 },

    #[error("domain error: {0}")]
    Domain(String),

    #[error("objective decreased from {previous:.6} to {current:.6} at candidate {candidate:.6}")]
    NonMonotonic {
        candidate: f64,
        previous: f64,
        current: f64,
    },
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidConfiguration(msg.into())
    }

    pub fn domain(msg: impl Into<String>) -> Self {
        EngineError::Domain(msg.into())
    }

    /// Configuration and domain problems are the caller's fault; the rest
    /// mean the search could not produce an answer for otherwise valid input.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidConfiguration(_) | EngineError::Domain(_)
        )
    }
}
