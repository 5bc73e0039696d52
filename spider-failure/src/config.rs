//! Experiment configuration.
//!
//! Every section has defaults matching the reference SPIDER failure
//! experiment, so an empty TOML file is a valid configuration. Durations are
//! human-readable strings (`period = "30s"`, `margin = "100ms"`).

use std::{path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use spider_sim::{SimConfiguration, Vector3};
use tracing::warn;

use crate::error::{ExperimentResult, invalid};

/// Constant-bit-rate traffic between the source and the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    /// Payload size (bytes)
    pub payload_size: u32,
    /// Target bit rate (bits per second)
    pub rate_bps: u64,
    /// When the generator starts
    #[serde(with = "humantime_serde")]
    pub start_time: Duration,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            payload_size: 1448,
            rate_bps: 5_000_000,
            start_time: Duration::from_secs(1),
        }
    }
}

impl TrafficConfig {
    /// Rejects a zero payload or a zero rate.
    pub fn validate(&self) -> ExperimentResult<()> {
        if self.payload_size == 0 {
            return Err(invalid("traffic payload size must be positive"));
        }
        if self.rate_bps == 0 {
            return Err(invalid("traffic rate must be positive"));
        }
        Ok(())
    }
}

/// Periodic probabilistic failure injection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureConfig {
    /// Time between two failure-decision cycles
    #[serde(with = "humantime_serde")]
    pub period: Duration,
    /// Per-node, per-cycle failure probability
    pub probability: f64,
    /// Nominal outage length
    #[serde(with = "humantime_serde")]
    pub outage: Duration,
    /// Restoration happens `outage - margin` after the failure, so that it
    /// lands before the next cycle when `outage == period`
    #[serde(with = "humantime_serde")]
    pub margin: Duration,
    /// Time of the first decision cycle
    #[serde(with = "humantime_serde")]
    pub first_decision: Duration,
    /// Where failed nodes are parked, far outside radio range
    pub sentinel: Vector3,
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(30),
            probability: 0.05,
            outage: Duration::from_secs(30),
            margin: Duration::from_millis(100),
            first_decision: Duration::ZERO,
            sentinel: Vector3::new(10_000.0, 0.0, 0.0),
        }
    }
}

impl FailureConfig {
    /// Time a failed node spends at the sentinel position.
    pub fn effective_outage(&self) -> Duration {
        self.outage.saturating_sub(self.margin)
    }

    /// Checks probability range, positive period and an outage longer than
    /// the margin.
    ///
    /// An outage that still reaches the next cycle is allowed but logged: a
    /// node selected again while down is reported as an invariant violation
    /// during the run.
    pub fn validate(&self) -> ExperimentResult<()> {
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(invalid(format!(
                "failure probability {} is outside [0, 1]",
                self.probability
            )));
        }
        if self.period.is_zero() {
            return Err(invalid("failure period must be positive"));
        }
        if self.outage <= self.margin {
            return Err(invalid(format!(
                "outage {:?} must be longer than the restoration margin {:?}",
                self.outage, self.margin
            )));
        }
        let sentinel = self.sentinel;
        if !(sentinel.x.is_finite() && sentinel.y.is_finite() && sentinel.z.is_finite()) {
            return Err(invalid("sentinel position must be finite"));
        }
        if self.effective_outage() >= self.period {
            warn!(
                period_s = self.period.as_secs_f64(),
                outage_s = self.effective_outage().as_secs_f64(),
                "outages reach into the next decision cycle"
            );
        }
        Ok(())
    }
}

/// Throughput sampling cadence. The first sample is taken at time zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Time between two throughput samples
    #[serde(with = "humantime_serde")]
    pub throughput_interval: Duration,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            throughput_interval: Duration::from_secs(5),
        }
    }
}

impl SamplingConfig {
    /// Rejects a zero sampling interval.
    pub fn validate(&self) -> ExperimentResult<()> {
        if self.throughput_interval.is_zero() {
            return Err(invalid("throughput interval must be positive"));
        }
        Ok(())
    }
}

/// A block of nodes laid out row-first on a grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridGroup {
    /// Number of nodes in the block
    pub count: u32,
    /// X of the first node
    pub min_x: f64,
    /// Y of the first node
    pub min_y: f64,
    /// Spacing along X
    pub delta_x: f64,
    /// Spacing along Y
    pub delta_y: f64,
    /// Nodes per row
    pub grid_width: u32,
}

impl GridGroup {
    /// Position of the `index`-th node of the block.
    pub fn position(&self, index: u32) -> Vector3 {
        let width = self.grid_width.max(1);
        Vector3::new(
            self.min_x + f64::from(index % width) * self.delta_x,
            self.min_y + f64::from(index / width) * self.delta_y,
            0.0,
        )
    }
}

/// Node placement: relay grid, static sink and a mobile source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Transmission-plane relay blocks; these are the nodes that may fail
    pub groups: Vec<GridGroup>,
    /// Position of the static sink (network edge gateway)
    pub sink_position: Vector3,
    /// Locations the source visits in order
    pub source_locations: Vec<Vector3>,
    /// Time the source dwells at each location
    #[serde(with = "humantime_serde")]
    pub location_time: Duration,
    /// Source speed between locations (m/s)
    pub src_speed: f64,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        let column = |min_x: f64| GridGroup {
            count: 14,
            min_x,
            min_y: 0.0,
            delta_x: 50.0,
            delta_y: 50.0,
            grid_width: 1,
        };
        let row = |min_y: f64| GridGroup {
            count: 5,
            min_x: 100.0,
            min_y,
            delta_x: 50.0,
            delta_y: 50.0,
            grid_width: 5,
        };
        Self {
            groups: vec![column(50.0), column(350.0), row(0.0), row(650.0)],
            sink_position: Vector3::new(400.0, 325.0, 0.0),
            source_locations: vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(0.0, 325.0, 0.0),
                Vector3::new(0.0, 650.0, 0.0),
            ],
            location_time: Duration::from_secs(180),
            src_speed: 2.8,
        }
    }
}

impl TopologyConfig {
    /// Total number of relay nodes.
    pub fn relay_count(&self) -> u32 {
        self.groups.iter().map(|g| g.count).sum()
    }

    /// Requires at least one relay, one source location and a positive speed.
    pub fn validate(&self) -> ExperimentResult<()> {
        if self.relay_count() == 0 {
            return Err(invalid("topology has no transmission-plane nodes"));
        }
        if self.source_locations.is_empty() {
            return Err(invalid("source needs at least one location"));
        }
        if !(self.src_speed.is_finite() && self.src_speed > 0.0) {
            return Err(invalid(format!(
                "source speed {} must be positive",
                self.src_speed
            )));
        }
        Ok(())
    }
}

/// Where the three output streams go. `None` keeps a stream in memory only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Throughput samples, one `time\tmbps` line per sample
    pub throughput: Option<PathBuf>,
    /// Residual energy per node followed by the total
    pub energy: Option<PathBuf>,
    /// Failure log, one `time\tnode` line per failure
    pub failure_log: Option<PathBuf>,
}

/// Complete description of one experiment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Seed of the run-wide random stream
    pub seed: u64,
    /// Simulation end; the energy sample is taken at this time
    #[serde(with = "humantime_serde")]
    pub stop_time: Duration,
    /// Traffic source parameters
    pub traffic: TrafficConfig,
    /// Failure injection parameters
    pub failure: FailureConfig,
    /// Metric sampling parameters
    pub sampling: SamplingConfig,
    /// Node placement
    pub topology: TopologyConfig,
    /// Radio and battery model
    pub sim: SimConfiguration,
    /// Output destinations
    pub outputs: OutputConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            stop_time: Duration::from_secs(720),
            traffic: TrafficConfig::default(),
            failure: FailureConfig::default(),
            sampling: SamplingConfig::default(),
            topology: TopologyConfig::default(),
            sim: SimConfiguration::default(),
            outputs: OutputConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Parses a TOML document; missing fields take their defaults.
    pub fn from_toml_str(text: &str) -> ExperimentResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> ExperimentResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Validates every section.
    pub fn validate(&self) -> ExperimentResult<()> {
        if self.stop_time.is_zero() {
            return Err(invalid("stop time must be positive"));
        }
        if self.traffic.start_time >= self.stop_time {
            return Err(invalid(format!(
                "traffic start {:?} is not before stop time {:?}",
                self.traffic.start_time, self.stop_time
            )));
        }
        self.traffic.validate()?;
        self.failure.validate()?;
        self.sampling.validate()?;
        self.topology.validate()?;
        Ok(())
    }
}
