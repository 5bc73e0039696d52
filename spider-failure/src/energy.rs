//! One-shot residual energy report.

use std::{cell::RefCell, rc::Rc, time::Duration};

use spider_sim::{NodeId, Process, ProcessId, SimWorld, SimulationResult};
use tracing::{debug, info};

use crate::{error::ExperimentResult, output::OutputStream};

/// Writes every node's residual energy, then their sum, exactly once.
#[derive(Debug)]
pub struct EnergySampler {
    id: ProcessId,
    nodes: Vec<NodeId>,
    stream: OutputStream,
    readings: Vec<(NodeId, f64)>,
    total_j: Option<f64>,
}

impl EnergySampler {
    fn sample_once(&mut self, sim: &SimWorld) -> SimulationResult<()> {
        if self.total_j.is_some() {
            debug!("energy already sampled");
            return Ok(());
        }
        let mut total = 0.0;
        for &node in &self.nodes {
            let remaining = sim.remaining_energy(node)?;
            self.stream.append(&[remaining])?;
            self.readings.push((node, remaining));
            total += remaining;
        }
        self.stream.append(&[total])?;
        self.stream.flush()?;
        self.total_j = Some(total);
        info!(
            time_s = sim.current_time().as_secs_f64(),
            total_j = total,
            "overall residual energy"
        );
        Ok(())
    }

    /// Per-node readings, empty before the sample fires.
    pub fn readings(&self) -> &[(NodeId, f64)] {
        &self.readings
    }

    /// Sum of the readings, `None` before the sample fires.
    pub fn total_j(&self) -> Option<f64> {
        self.total_j
    }
}

impl Process for EnergySampler {
    fn name(&self) -> &str {
        "energy-sampler"
    }

    fn on_wake(&mut self, sim: &SimWorld, _tag: u64) -> SimulationResult<()> {
        self.sample_once(sim)
    }
}

/// Spawns a sampler reading `nodes` at `fire_time`.
pub fn arm_energy_sampler(
    world: &SimWorld,
    nodes: &[NodeId],
    fire_time: Duration,
    stream: OutputStream,
) -> ExperimentResult<Rc<RefCell<EnergySampler>>> {
    for &node in nodes {
        world.position(node)?;
    }
    let handle = world.spawn(|id| EnergySampler {
        id,
        nodes: nodes.to_vec(),
        stream,
        readings: Vec::new(),
        total_j: None,
    });
    world.wake_at(handle.borrow().id, fire_time, 0);
    Ok(handle)
}
