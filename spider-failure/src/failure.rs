//! Periodic probabilistic node failures.
//!
//! Every `period` the injector draws one uniform value per monitored node
//! from the run-wide random stream. A draw below the failure probability
//! parks the node at the sentinel position, far out of radio range, and
//! schedules its return `outage - margin` later. Failures are expected
//! perturbations: they are logged, never errors.

use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
    time::Duration,
};

use serde::Serialize;
use spider_sim::{
    EventId, NodeId, Process, ProcessId, SimWorld, SimulationError, SimulationResult, Vector3,
    sim_random,
};
use tracing::{debug, info, instrument};

use crate::{
    config::FailureConfig,
    error::{ExperimentResult, invalid},
    output::OutputStream,
};

/// Health of a monitored node, as tracked by the injector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeHealth {
    /// In place and reachable (subject to radio range).
    Alive,
    /// Parked at the sentinel position.
    Failed {
        /// When the node was displaced.
        since: Duration,
        /// When the node is put back.
        until: Duration,
    },
}

/// One injected failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    /// Decision cycle, counted from 0
    pub cycle: u64,
    /// Failed node
    pub node: NodeId,
    /// Displacement time
    #[serde(with = "humantime_serde")]
    pub failed_at: Duration,
    /// Scheduled restoration time
    #[serde(with = "humantime_serde")]
    pub restore_at: Duration,
}

/// Wake-up kinds, packed into the scheduler tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Decide,
    Restore(NodeId),
}

impl Wake {
    fn tag(self) -> u64 {
        match self {
            Wake::Decide => 0,
            Wake::Restore(node) => u64::from(node.0) + 1,
        }
    }

    fn from_tag(tag: u64) -> SimulationResult<Self> {
        if tag == 0 {
            return Ok(Wake::Decide);
        }
        u32::try_from(tag - 1)
            .map(|node| Wake::Restore(NodeId(node)))
            .map_err(|_| SimulationError::InvalidState(format!("bad failure injector tag {tag}")))
    }
}

/// Periodic Bernoulli failure injector.
#[derive(Debug)]
pub struct FailureInjector {
    id: ProcessId,
    nodes: Vec<NodeId>,
    config: FailureConfig,
    stop_time: Duration,
    health: BTreeMap<NodeId, NodeHealth>,
    saved_positions: BTreeMap<NodeId, Vector3>,
    next_cycle: Option<EventId>,
    armed: bool,
    cycles: u64,
    restorations: u64,
    records: Vec<FailureRecord>,
    log: OutputStream,
}

impl FailureInjector {
    fn new(
        id: ProcessId,
        nodes: Vec<NodeId>,
        config: FailureConfig,
        stop_time: Duration,
        log: OutputStream,
    ) -> Self {
        let health = nodes.iter().map(|&n| (n, NodeHealth::Alive)).collect();
        Self {
            id,
            nodes,
            config,
            stop_time,
            health,
            saved_positions: BTreeMap::new(),
            next_cycle: None,
            armed: false,
            cycles: 0,
            restorations: 0,
            records: Vec::new(),
            log,
        }
    }

    #[instrument(skip_all, fields(cycle = self.cycles))]
    fn decide(&mut self, sim: &SimWorld) -> SimulationResult<()> {
        self.next_cycle = None;
        if !self.armed {
            return Ok(());
        }
        let now = sim.current_time();
        let cycle = self.cycles;
        self.cycles += 1;

        // One draw per node, every cycle, so the stream position never
        // depends on earlier outcomes
        for node in self.nodes.clone() {
            let draw: f64 = sim_random();
            if draw >= self.config.probability {
                continue;
            }
            if let Some(NodeHealth::Failed { since, until }) = self.health.get(&node).copied() {
                return Err(SimulationError::InvariantViolation(format!(
                    "{node} selected to fail at {now:?} while still down ({since:?}..{until:?})"
                )));
            }
            self.fail(sim, cycle, node)?;
        }

        let next = now + self.config.period;
        if next < self.stop_time {
            self.next_cycle = Some(sim.wake_at(self.id, next, Wake::Decide.tag()));
        } else {
            debug!(cycles = self.cycles, "last failure cycle before stop");
        }
        Ok(())
    }

    fn fail(&mut self, sim: &SimWorld, cycle: u64, node: NodeId) -> SimulationResult<()> {
        let now = sim.current_time();
        let until = now + self.config.effective_outage();

        let original = sim.position(node)?;
        self.saved_positions.insert(node, original);
        sim.set_position(node, self.config.sentinel)?;
        self.health.insert(node, NodeHealth::Failed { since: now, until });
        sim.wake_at(self.id, until, Wake::Restore(node).tag());

        self.records.push(FailureRecord {
            cycle,
            node,
            failed_at: now,
            restore_at: until,
        });
        info!(
            %node,
            time_s = now.as_secs_f64(),
            restore_s = until.as_secs_f64(),
            "node failed"
        );
        self.log.append(&[now.as_secs_f64(), f64::from(node.0)])?;
        Ok(())
    }

    fn restore(&mut self, sim: &SimWorld, node: NodeId) -> SimulationResult<()> {
        if !matches!(self.health.get(&node), Some(NodeHealth::Failed { .. })) {
            return Ok(());
        }
        let position = self.saved_positions.remove(&node).ok_or_else(|| {
            SimulationError::InvalidState(format!("{node} failed without a saved position"))
        })?;
        sim.set_position(node, position)?;
        self.health.insert(node, NodeHealth::Alive);
        self.restorations += 1;
        debug!(%node, time_s = sim.current_time().as_secs_f64(), "node restored");
        Ok(())
    }

    /// Stops future decision cycles. Nodes already down still come back at
    /// their scheduled time.
    pub fn disarm(&mut self, sim: &SimWorld) {
        self.armed = false;
        if let Some(next) = self.next_cycle.take() {
            sim.cancel(next);
        }
    }

    /// Whether decision cycles are still being scheduled.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Current health of `node`, `None` if it is not monitored.
    pub fn health(&self, node: NodeId) -> Option<NodeHealth> {
        self.health.get(&node).copied()
    }

    /// Monitored nodes, in draw order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Every failure injected so far, in order.
    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    /// Number of failures injected so far.
    pub fn failure_count(&self) -> usize {
        self.records.len()
    }

    /// Number of restorations performed so far.
    pub fn restorations(&self) -> u64 {
        self.restorations
    }

    /// Number of decision cycles evaluated so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Nodes currently down.
    pub fn failed_nodes(&self) -> Vec<NodeId> {
        self.health
            .iter()
            .filter(|(_, h)| matches!(h, NodeHealth::Failed { .. }))
            .map(|(n, _)| *n)
            .collect()
    }

    /// Process id used for this injector's wake-ups.
    pub fn id(&self) -> ProcessId {
        self.id
    }
}

impl Process for FailureInjector {
    fn name(&self) -> &str {
        "failure-injector"
    }

    fn on_wake(&mut self, sim: &SimWorld, tag: u64) -> SimulationResult<()> {
        match Wake::from_tag(tag)? {
            Wake::Decide => self.decide(sim),
            Wake::Restore(node) => self.restore(sim, node),
        }
    }
}

/// Spawns a failure injector over `nodes`.
///
/// The first cycle runs at `config.first_decision`; cycles re-arm every
/// `config.period` while the next one falls before `stop`. Each failure is
/// appended to `log` as `(time_s, node_id)`.
///
/// The sentinel must be out of radio range of every node's position at arm
/// time, otherwise a parked node could keep forwarding.
pub fn arm_failure_injector(
    world: &SimWorld,
    nodes: &[NodeId],
    config: &FailureConfig,
    stop: Duration,
    log: OutputStream,
) -> ExperimentResult<Rc<RefCell<FailureInjector>>> {
    if nodes.is_empty() {
        return Err(invalid("failure injector needs at least one node"));
    }
    let unique: BTreeSet<NodeId> = nodes.iter().copied().collect();
    if unique.len() != nodes.len() {
        return Err(invalid("failure injector node set contains duplicates"));
    }
    config.validate()?;
    for &node in nodes {
        world.position(node)?;
    }
    // A parked node must not be able to reach anything still deployed
    let range = world.radio_range();
    for node in world.node_ids() {
        let position = world.position(node)?;
        if position.distance(&config.sentinel) <= range {
            return Err(invalid(format!(
                "sentinel {} is within radio range of {node} at {position}",
                config.sentinel
            )));
        }
    }

    let handle = world.spawn(|id| {
        FailureInjector::new(id, nodes.to_vec(), config.clone(), stop, log)
    });
    {
        let mut injector = handle.borrow_mut();
        injector.armed = true;
        if config.first_decision < stop {
            let first = world.wake_at(injector.id, config.first_decision, Wake::Decide.tag());
            injector.next_cycle = Some(first);
        }
    }
    info!(
        nodes = nodes.len(),
        period_s = config.period.as_secs_f64(),
        probability = config.probability,
        "failure injector armed"
    );
    Ok(handle)
}
