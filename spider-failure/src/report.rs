//! Experiment results and their textual summary.

use std::{fmt, time::Duration};

use serde::Serialize;

use crate::{failure::FailureRecord, throughput::ThroughputSample};

/// Outcome of one experiment run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentReport {
    /// Seed of the run
    pub seed: u64,
    /// Simulated time at the end of the run
    #[serde(with = "humantime_serde")]
    pub simulated_time: Duration,
    /// Wall-clock time taken by the run
    #[serde(with = "humantime_serde")]
    pub wall_time: Duration,
    /// Number of events processed
    pub events_processed: u64,
    /// Values drawn from the run-wide random stream
    pub random_draws: u64,
    /// Failure decision cycles evaluated
    pub failure_cycles: u64,
    /// Failures injected, in order
    pub failures: Vec<FailureRecord>,
    /// Payload emissions attempted by the source
    pub payloads_emitted: u64,
    /// Emissions dropped because the sink was unreachable
    pub payloads_dropped: u64,
    /// Bytes the sink received during the run
    pub bytes_received: u64,
    /// Throughput samples, in order
    pub throughput: Vec<ThroughputSample>,
    /// Residual energy per node (J), in node order
    pub residual_energy_j: Vec<f64>,
    /// Sum of the residual energies (J)
    pub total_residual_energy_j: f64,
    /// Position changes of the mobile source
    pub course_changes: usize,
}

impl ExperimentReport {
    /// Mean of the throughput samples (Mbit/s).
    pub fn mean_throughput_mbps(&self) -> f64 {
        if self.throughput.is_empty() {
            0.0
        } else {
            self.throughput.iter().map(|s| s.mbps).sum::<f64>() / self.throughput.len() as f64
        }
    }

    /// Share of emissions that reached the transport, in percent.
    pub fn delivery_rate(&self) -> f64 {
        if self.payloads_emitted == 0 {
            0.0
        } else {
            let delivered = self.payloads_emitted - self.payloads_dropped;
            delivered as f64 / self.payloads_emitted as f64 * 100.0
        }
    }
}

impl fmt::Display for ExperimentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Experiment Report (seed {}) ===", self.seed)?;
        writeln!(f, "Simulated Time: {:?}", self.simulated_time)?;
        writeln!(f, "Wall Time: {:?}", self.wall_time)?;
        writeln!(f, "Events Processed: {}", self.events_processed)?;
        writeln!(f)?;
        writeln!(f, "Failure Cycles: {}", self.failure_cycles)?;
        writeln!(f, "Failures: {}", self.failures.len())?;
        for record in &self.failures {
            writeln!(
                f,
                "  - node {} down {:.1}s..{:.1}s",
                record.node,
                record.failed_at.as_secs_f64(),
                record.restore_at.as_secs_f64()
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "Payloads: {} emitted, {} dropped ({:.2}% routed)",
            self.payloads_emitted,
            self.payloads_dropped,
            self.delivery_rate()
        )?;
        writeln!(f, "Bytes Received: {}", self.bytes_received)?;
        writeln!(f, "Mean Throughput: {:.4} Mbps", self.mean_throughput_mbps())?;
        writeln!(f, "Residual Energy: {:.3} J", self.total_residual_energy_j)?;
        Ok(())
    }
}

/// Aggregate over several seeds.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Successful runs, in seed order
    pub runs: Vec<ExperimentReport>,
    /// Seeds whose run ended with an error, with the error message
    pub seeds_failing: Vec<(u64, String)>,
}

impl BatchReport {
    /// Number of runs attempted.
    pub fn iterations(&self) -> usize {
        self.runs.len() + self.seeds_failing.len()
    }

    fn mean(&self, value: impl Fn(&ExperimentReport) -> f64) -> f64 {
        if self.runs.is_empty() {
            0.0
        } else {
            self.runs.iter().map(value).sum::<f64>() / self.runs.len() as f64
        }
    }

    /// Mean number of failures per successful run.
    pub fn mean_failures(&self) -> f64 {
        self.mean(|r| r.failures.len() as f64)
    }

    /// Mean of the per-run mean throughput (Mbit/s).
    pub fn mean_throughput_mbps(&self) -> f64 {
        self.mean(ExperimentReport::mean_throughput_mbps)
    }

    /// Mean total residual energy (J).
    pub fn mean_residual_energy_j(&self) -> f64 {
        self.mean(|r| r.total_residual_energy_j)
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Batch Report ===")?;
        writeln!(f, "Iterations: {}", self.iterations())?;
        writeln!(f, "Successful: {}", self.runs.len())?;
        writeln!(f, "Failed: {}", self.seeds_failing.len())?;
        writeln!(f)?;
        writeln!(f, "Mean Failures: {:.2}", self.mean_failures())?;
        writeln!(f, "Mean Throughput: {:.4} Mbps", self.mean_throughput_mbps())?;
        writeln!(f, "Mean Residual Energy: {:.3} J", self.mean_residual_energy_j())?;

        if !self.seeds_failing.is_empty() {
            writeln!(f)?;
            writeln!(f, "Faulty seeds:")?;
            for (seed, reason) in &self.seeds_failing {
                writeln!(f, "  - {seed}: {reason}")?;
            }
        }
        Ok(())
    }
}
