//! Periodic sink throughput sampling.

use std::{cell::RefCell, rc::Rc, time::Duration};

use serde::Serialize;
use spider_sim::{NodeId, Process, ProcessId, SimWorld, SimulationError, SimulationResult};
use tracing::info;

use crate::{
    error::{ExperimentResult, invalid},
    output::OutputStream,
};

/// One throughput measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThroughputSample {
    /// Sample time
    #[serde(with = "humantime_serde")]
    pub time: Duration,
    /// Bytes received since the previous sample
    pub delta_bytes: u64,
    /// Average rate over the last interval (Mbit/s)
    pub mbps: f64,
}

/// Converts a byte delta over `interval` into Mbit/s.
pub fn mbps(delta_bytes: u64, interval: Duration) -> f64 {
    delta_bytes as f64 * 8.0 / 1e6 / interval.as_secs_f64()
}

/// Samples a sink's cumulative byte counter every `interval`.
#[derive(Debug)]
pub struct ThroughputSampler {
    id: ProcessId,
    sink: NodeId,
    interval: Duration,
    stop_time: Duration,
    initial_bytes: u64,
    baseline: u64,
    samples: Vec<ThroughputSample>,
    stream: OutputStream,
}

impl ThroughputSampler {
    fn sample(&mut self, sim: &SimWorld) -> SimulationResult<()> {
        let now = sim.current_time();
        let current = sim.received_bytes(self.sink);
        let delta = current.checked_sub(self.baseline).ok_or_else(|| {
            SimulationError::InvariantViolation(format!(
                "received bytes of {} went from {} down to {current}",
                self.sink, self.baseline
            ))
        })?;
        let rate = mbps(delta, self.interval);

        self.stream.append(&[now.as_secs_f64(), rate])?;
        info!(time_s = now.as_secs_f64(), mbps = rate, "throughput");
        self.samples.push(ThroughputSample {
            time: now,
            delta_bytes: delta,
            mbps: rate,
        });
        self.baseline = current;

        let next = now + self.interval;
        if next < self.stop_time {
            sim.wake_at(self.id, next, 0);
        }
        Ok(())
    }

    /// Samples taken so far.
    pub fn samples(&self) -> &[ThroughputSample] {
        &self.samples
    }

    /// Counter value read when the sampler was armed.
    pub fn initial_bytes(&self) -> u64 {
        self.initial_bytes
    }

    /// Counter value read at the latest sample.
    pub fn last_bytes(&self) -> u64 {
        self.baseline
    }

    /// Mean of all samples, zero before the first one.
    pub fn mean_mbps(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|s| s.mbps).sum::<f64>() / self.samples.len() as f64
    }
}

impl Process for ThroughputSampler {
    fn name(&self) -> &str {
        "throughput-sampler"
    }

    fn on_wake(&mut self, sim: &SimWorld, _tag: u64) -> SimulationResult<()> {
        self.sample(sim)
    }
}

/// Spawns a sampler for `sink`. The first sample is taken immediately, the
/// following ones every `interval` while they fall before `stop`.
pub fn arm_throughput_sampler(
    world: &SimWorld,
    sink: NodeId,
    interval: Duration,
    stream: OutputStream,
    stop: Duration,
) -> ExperimentResult<Rc<RefCell<ThroughputSampler>>> {
    if interval.is_zero() {
        return Err(invalid("throughput interval must be positive"));
    }
    world.position(sink)?;

    let initial_bytes = world.received_bytes(sink);
    let handle = world.spawn(|id| ThroughputSampler {
        id,
        sink,
        interval,
        stop_time: stop,
        initial_bytes,
        baseline: initial_bytes,
        samples: Vec::new(),
        stream,
    });
    let now = world.current_time();
    if now < stop {
        world.wake_at(handle.borrow().id, now, 0);
    }
    Ok(handle)
}
