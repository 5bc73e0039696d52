use thiserror::Error;

use crate::mobility::NodeId;

/// Errors that can occur during simulation operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    /// The simulation is in an invalid state.
    #[error("Invalid simulation state: {0}")]
    InvalidState(String),
    /// A node id that was never added to the world.
    #[error("Unknown node {0}")]
    UnknownNode(NodeId),
    /// No multi-hop path exists between the two nodes at the current time.
    #[error("Node {to} is unreachable from node {from}")]
    Unreachable {
        /// Sending node.
        from: NodeId,
        /// Destination node.
        to: NodeId,
    },
    /// The session was closed or never opened.
    #[error("Session {0} is closed")]
    SessionClosed(u64),
    /// A process detected a broken run-time invariant; the run must stop.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    /// An I/O error occurred during simulation.
    #[error("I/O error: {0}")]
    IoError(String),
}

/// A type alias for `Result<T, SimulationError>`.
pub type SimulationResult<T> = Result<T, SimulationError>;

impl From<std::io::Error> for SimulationError {
    fn from(err: std::io::Error) -> Self {
        SimulationError::IoError(err.to_string())
    }
}
