//! # SPIDER transient-failure experiments
//!
//! Controller for measuring how a multi-hop ad-hoc network behaves while its
//! relays fail and come back at random. It runs on the deterministic
//! [`spider_sim`] world and provides:
//!
//! - a constant-bit-rate [`TrafficGenerator`] between a mobile source and a
//!   static sink;
//! - a periodic [`FailureInjector`] that parks relays out of range for a
//!   bounded outage;
//! - a [`ThroughputSampler`] and a one-shot [`EnergySampler`] writing plain
//!   numeric record streams;
//! - the reference SPIDER topology and an [`Experiment`] harness tying it all
//!   together, with batch runs over several seeds.
//!
//! ## Example
//!
//! ```rust
//! use spider_failure::{Experiment, ExperimentConfig};
//! use std::time::Duration;
//!
//! let config = ExperimentConfig {
//!     seed: 7,
//!     stop_time: Duration::from_secs(60),
//!     ..ExperimentConfig::default()
//! };
//! let mut experiment = Experiment::new(config).unwrap();
//! let report = experiment.run().unwrap();
//!
//! assert_eq!(report.failure_cycles, 2);
//! assert_eq!(report.throughput.len(), 12);
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

/// Experiment configuration and defaults.
pub mod config;
/// Source course-change logging.
pub mod course;
/// End-of-run residual energy sampling.
pub mod energy;
/// Error types for the experiment controller.
pub mod error;
/// Experiment harness and batch runner.
pub mod experiment;
/// Periodic failure injection.
pub mod failure;
/// Append-only record streams.
pub mod output;
/// Run reports.
pub mod report;
/// Sink throughput sampling.
pub mod throughput;
/// Reference deployment.
pub mod topology;
/// Constant-bit-rate traffic.
pub mod traffic;

pub use config::{
    ExperimentConfig, FailureConfig, GridGroup, OutputConfig, SamplingConfig, TopologyConfig,
    TrafficConfig,
};
pub use course::CourseLog;
pub use energy::{EnergySampler, arm_energy_sampler};
pub use error::{ExperimentError, ExperimentResult};
pub use experiment::{Experiment, Streams, run_batch, run_experiment};
pub use failure::{FailureInjector, FailureRecord, NodeHealth, arm_failure_injector};
pub use output::OutputStream;
pub use report::{BatchReport, ExperimentReport};
pub use throughput::{ThroughputSample, ThroughputSampler, arm_throughput_sampler};
pub use topology::{Topology, build_topology};
pub use traffic::{TrafficGenerator, arm_traffic_generator, payload_interval};
