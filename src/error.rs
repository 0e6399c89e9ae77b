//! Error types for the scroller crate

use thiserror::Error;

use crate::game::GameState;

/// Faults raised while turning raw simulation output into an [`Observation`].
///
/// These never escape [`EpisodeController::step`]; the controller converts them
/// into a forced termination with the standard death penalty.
///
/// [`Observation`]: crate::game::Observation
/// [`EpisodeController::step`]: crate::controller::EpisodeController::step
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SimulationFault {
    #[error("observation is missing required field '{field}' in state {state}")]
    MissingField { field: &'static str, state: GameState },

    #[error("field '{field}' holds non-finite value {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("simulation adapter failed: {message}")]
    Adapter { message: String },

    #[error("simulation has been closed")]
    Closed,
}

/// Main error type for the scroller crate
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Simulation(#[from] SimulationFault),

    #[error("episode has not started; call reset() before stepping")]
    NotStarted,

    #[error("episode is in state {state}; call reset() before stepping")]
    ResetRequired { state: GameState },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("action '{action}' is not a gameplay action")]
    NotGameplayAction { action: String },

    #[error("unsupported saved agent version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("saved state belongs to agent '{found}', expected '{expected}'")]
    AgentKindMismatch { found: String, expected: String },

    #[error("failed to {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to {operation}: {message}")]
    SerializationContext { operation: String, message: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("progress bar template error: {message}")]
    ProgressBarTemplate { message: String },
}

impl Error {
    /// Shorthand for a [`Error::InvalidConfiguration`].
    pub fn config(message: impl Into<String>) -> Self {
        Error::InvalidConfiguration {
            message: message.into(),
        }
    }
}

/// Convenience type alias for Results using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Io {
            operation: "IO operation".to_string(),
            source,
        }
    }
}
