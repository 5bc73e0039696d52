//! # Spider simulation substrate
//!
//! A deterministic, single-threaded discrete-event world for ad-hoc network
//! experiments. It provides exactly what a failure-and-measurement controller
//! needs from its environment:
//!
//! - a logical clock and an event queue with FIFO tie-breaking and
//!   cancellation ([`SimWorld`], [`EventQueue`]);
//! - stateful [`Process`]es woken through one uniform callback;
//! - node positions with constant and waypoint mobility plus position
//!   observers ([`mobility`]);
//! - per-node batteries drained by a simple radio energy model ([`energy`]);
//! - unit-disk multi-hop sessions and per-node received-byte counters
//!   ([`network`]);
//! - a seeded thread-local RNG ([`rng`]).
//!
//! ## Example
//!
//! ```rust
//! use spider_sim::{MobilityModel, SimWorld, Vector3};
//! use std::time::Duration;
//!
//! let mut sim = SimWorld::new_with_seed(42);
//! let a = sim.add_node(MobilityModel::ConstantPosition(Vector3::new(0.0, 0.0, 0.0)));
//! let b = sim.add_node(MobilityModel::ConstantPosition(Vector3::new(100.0, 0.0, 0.0)));
//!
//! let session = sim.open_session(a, b).unwrap();
//! sim.send(session, 1448).unwrap();
//! sim.run_until(Duration::from_secs(1)).unwrap();
//!
//! assert_eq!(sim.received_bytes(b), 1448);
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

/// Per-node batteries and radio energy model.
pub mod energy;
/// Error types and utilities for simulation operations.
pub mod error;
/// Event scheduling primitives.
pub mod events;
/// Node identity, positions and mobility models.
pub mod mobility;
/// Radio connectivity, sessions and sinks.
pub mod network;
/// Thread-local random number generation for simulation.
pub mod rng;
/// Core simulation world and coordination logic.
pub mod sim;

pub use energy::{BasicEnergySource, EnergyConfiguration};
pub use error::{SimulationError, SimulationResult};
pub use events::{Event, EventId, EventQueue, ProcessId, ScheduledEvent};
pub use mobility::{MobilityModel, NodeId, Vector3, Waypoint};
pub use network::{RadioConfiguration, SessionId, SessionState, Transmission};
pub use rng::{get_current_sim_seed, reset_sim_rng, set_sim_seed, sim_random, sim_random_range};
pub use sim::{Process, SimConfiguration, SimWorld};
