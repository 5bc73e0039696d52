use spider_sim::SimulationError;
use thiserror::Error;

/// Errors surfaced by the experiment controller.
#[derive(Debug, Error)]
pub enum ExperimentError {
    /// Rejected at arm time, before anything is scheduled.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// A run-time invariant broke; this points at a scheduling-order bug.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    /// [`crate::Experiment::run`] was called on an experiment that already ran.
    #[error("Experiment already ran")]
    AlreadyRan,
    /// Error reported by the simulation substrate.
    #[error("Simulation error: {0}")]
    Simulation(SimulationError),
    /// Output stream or configuration file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration file is not valid TOML for [`crate::ExperimentConfig`].
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
    /// The report could not be serialized.
    #[error("Failed to serialize report: {0}")]
    Report(#[from] serde_json::Error),
}

impl From<SimulationError> for ExperimentError {
    fn from(err: SimulationError) -> Self {
        match err {
            SimulationError::InvariantViolation(reason) => {
                ExperimentError::InvariantViolation(reason)
            }
            other => ExperimentError::Simulation(other),
        }
    }
}

/// A type alias for `Result<T, ExperimentError>`.
pub type ExperimentResult<T> = Result<T, ExperimentError>;

/// Shorthand for building an [`ExperimentError::InvalidConfig`].
pub(crate) fn invalid(reason: impl Into<String>) -> ExperimentError {
    ExperimentError::InvalidConfig(reason.into())
}
