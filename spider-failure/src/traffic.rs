//! Constant-bit-rate traffic generator.
//!
//! The generator hands one payload to the transport, then asks to be woken
//! one payload-interval later. Start and stop are wake-ups too, so a harness
//! can schedule the whole lifetime up front.

use std::{cell::RefCell, rc::Rc, time::Duration};

use spider_sim::{
    EventId, NodeId, Process, ProcessId, SessionId, SimWorld, SimulationError, SimulationResult,
};
use tracing::{debug, info};

use crate::{
    config::TrafficConfig,
    error::{ExperimentResult, invalid},
};

const START: u64 = 0;
const SEND: u64 = 1;
const STOP: u64 = 2;

/// Time needed to push `payload_size` bytes at `rate_bps`, rounded to the
/// nearest nanosecond.
pub fn payload_interval(payload_size: u32, rate_bps: u64) -> Duration {
    if rate_bps == 0 {
        return Duration::ZERO;
    }
    let bits = u128::from(payload_size) * 8;
    let rate = u128::from(rate_bps);
    let nanos = (bits * 1_000_000_000 + rate / 2) / rate;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Self re-arming emitter of fixed-size payloads.
#[derive(Debug)]
pub struct TrafficGenerator {
    id: ProcessId,
    source: NodeId,
    destination: NodeId,
    payload_size: u32,
    rate_bps: u64,
    interval: Duration,
    session: Option<SessionId>,
    pending: Option<EventId>,
    scheduled_start: Option<EventId>,
    running: bool,
    stopped: bool,
    emitted: u64,
    dropped: u64,
    first_emission: Option<Duration>,
    last_emission: Option<Duration>,
    history: Option<Vec<Duration>>,
}

impl TrafficGenerator {
    /// Creates a stopped, unconfigured generator sending from `source`.
    pub fn new(id: ProcessId, source: NodeId, destination: NodeId) -> Self {
        Self {
            id,
            source,
            destination,
            payload_size: 0,
            rate_bps: 0,
            interval: Duration::ZERO,
            session: None,
            pending: None,
            scheduled_start: None,
            running: false,
            stopped: false,
            emitted: 0,
            dropped: 0,
            first_emission: None,
            last_emission: None,
            history: None,
        }
    }

    /// Sets destination, payload size and rate. Takes effect from the next
    /// emission; the destination from the next start.
    pub fn configure(
        &mut self,
        destination: NodeId,
        payload_size: u32,
        rate_bps: u64,
    ) -> ExperimentResult<()> {
        if payload_size == 0 {
            return Err(invalid("traffic payload size must be positive"));
        }
        if rate_bps == 0 {
            return Err(invalid("traffic rate must be positive"));
        }
        self.destination = destination;
        self.payload_size = payload_size;
        self.rate_bps = rate_bps;
        self.interval = payload_interval(payload_size, rate_bps);
        Ok(())
    }

    /// Schedules [`TrafficGenerator::start`] at `time`. A later
    /// [`TrafficGenerator::stop`] cancels it.
    pub fn start_at(&mut self, sim: &SimWorld, time: Duration) {
        if let Some(previous) = self.scheduled_start.take() {
            sim.cancel(previous);
        }
        self.stopped = false;
        self.scheduled_start = Some(sim.wake_at(self.id, time, START));
    }

    /// Opens the session and emits the first payload right away.
    ///
    /// Starting a running generator does nothing.
    pub fn start(&mut self, sim: &SimWorld) -> SimulationResult<()> {
        self.scheduled_start = None;
        if self.running {
            return Ok(());
        }
        if self.interval.is_zero() {
            return Err(SimulationError::InvalidState(
                "traffic generator started before being configured".into(),
            ));
        }
        let session = sim.open_session(self.source, self.destination)?;
        self.session = Some(session);
        self.running = true;
        info!(
            %session,
            source = %self.source,
            destination = %self.destination,
            interval_ns = self.interval.as_nanos() as u64,
            "traffic started"
        );
        self.emit(sim)
    }

    /// Cancels the pending emission and any scheduled start, then closes
    /// the session.
    ///
    /// Safe to call any number of times, running or not.
    pub fn stop(&mut self, sim: &SimWorld) -> SimulationResult<()> {
        self.stopped = true;
        for event in [self.pending.take(), self.scheduled_start.take()]
            .into_iter()
            .flatten()
        {
            sim.cancel(event);
        }
        if !self.running {
            return Ok(());
        }
        self.running = false;
        if let Some(session) = self.session {
            sim.close_session(session)?;
        }
        info!(
            emitted = self.emitted,
            dropped = self.dropped,
            "traffic stopped"
        );
        Ok(())
    }

    fn emit(&mut self, sim: &SimWorld) -> SimulationResult<()> {
        self.pending = None;
        let Some(session) = self.session else {
            return Ok(());
        };
        if !self.running {
            return Ok(());
        }

        let now = sim.current_time();
        match sim.send(session, u64::from(self.payload_size)) {
            Ok(transmission) => {
                debug!(hops = transmission.hops(), "payload sent");
            }
            Err(SimulationError::Unreachable { from, to }) => {
                self.dropped += 1;
                debug!(%from, %to, "destination unreachable, payload dropped");
            }
            Err(err) => return Err(err),
        }
        self.emitted += 1;
        self.first_emission.get_or_insert(now);
        self.last_emission = Some(now);
        if let Some(history) = self.history.as_mut() {
            history.push(now);
        }

        self.pending = Some(sim.wake_after(self.id, self.interval, SEND));
        Ok(())
    }

    /// Keeps the time of every later emission, see
    /// [`TrafficGenerator::emission_times`].
    pub fn record_emission_times(&mut self) {
        self.history.get_or_insert_with(Vec::new);
    }

    /// Emission times recorded since [`TrafficGenerator::record_emission_times`].
    pub fn emission_times(&self) -> &[Duration] {
        self.history.as_deref().unwrap_or(&[])
    }

    /// Process id used for this generator's wake-ups.
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Whether the generator is between start and stop.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Configured bit rate.
    pub fn rate_bps(&self) -> u64 {
        self.rate_bps
    }

    /// Delay between two emissions.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Emission attempts, dropped ones included.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Emissions the transport refused because the destination was
    /// unreachable.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Bytes handed to the transport successfully.
    pub fn bytes_sent(&self) -> u64 {
        (self.emitted - self.dropped) * u64::from(self.payload_size)
    }

    /// Time of the first emission.
    pub fn first_emission(&self) -> Option<Duration> {
        self.first_emission
    }

    /// Time of the latest emission.
    pub fn last_emission(&self) -> Option<Duration> {
        self.last_emission
    }

    /// Session used by the current or latest run.
    pub fn session(&self) -> Option<SessionId> {
        self.session
    }
}

impl Process for TrafficGenerator {
    fn name(&self) -> &str {
        "traffic-generator"
    }

    fn on_wake(&mut self, sim: &SimWorld, tag: u64) -> SimulationResult<()> {
        match tag {
            // A start queued before stop() must not revive the generator
            START if self.stopped => Ok(()),
            START => self.start(sim),
            SEND => self.emit(sim),
            STOP => self.stop(sim),
            other => Err(SimulationError::InvalidState(format!(
                "traffic generator woken with unknown tag {other}"
            ))),
        }
    }
}

/// Spawns a generator from `source` to `destination`, starting at
/// `config.start_time` and stopping at `stop`.
pub fn arm_traffic_generator(
    world: &SimWorld,
    source: NodeId,
    destination: NodeId,
    config: &TrafficConfig,
    stop: Duration,
) -> ExperimentResult<Rc<RefCell<TrafficGenerator>>> {
    config.validate()?;
    if config.start_time >= stop {
        return Err(invalid(format!(
            "traffic start {:?} is not before its stop {:?}",
            config.start_time, stop
        )));
    }
    // Both endpoints must exist before anything is scheduled
    world.position(source)?;
    world.position(destination)?;

    let handle = world.spawn(|id| TrafficGenerator::new(id, source, destination));
    handle
        .borrow_mut()
        .configure(destination, config.payload_size, config.rate_bps)?;

    let id = handle.borrow().id();
    handle.borrow_mut().start_at(world, config.start_time);
    world.wake_at(id, stop, STOP);
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_matches_payload_over_rate() {
        assert_eq!(payload_interval(1448, 5_000_000), Duration::from_nanos(2_316_800));
        assert_eq!(payload_interval(1, 3), Duration::from_nanos(2_666_666_667));
    }

    #[test]
    fn zero_rate_is_rejected() {
        let mut generator = TrafficGenerator::new(ProcessId(0), NodeId(0), NodeId(1));
        let err = generator.configure(NodeId(1), 1448, 0).unwrap_err();
        assert!(matches!(err, crate::ExperimentError::InvalidConfig(_)));
    }

    #[test]
    fn unconfigured_generator_refuses_to_start() {
        let sim = SimWorld::new();
        let mut generator = TrafficGenerator::new(ProcessId(0), NodeId(0), NodeId(1));
        assert!(matches!(
            generator.start(&sim),
            Err(SimulationError::InvalidState(_))
        ));
    }

    #[test]
    fn stop_without_start_is_a_no_op() {
        let sim = SimWorld::new();
        let mut generator = TrafficGenerator::new(ProcessId(0), NodeId(0), NodeId(1));
        generator.configure(NodeId(1), 1448, 5_000_000).unwrap();
        generator.stop(&sim).unwrap();
        generator.stop(&sim).unwrap();
        assert!(!generator.is_running());
        assert_eq!(generator.emitted(), 0);
    }

    #[test]
    fn start_wake_after_stop_is_ignored() {
        let sim = SimWorld::new();
        let mut generator = TrafficGenerator::new(ProcessId(0), NodeId(0), NodeId(1));
        generator.configure(NodeId(1), 1448, 5_000_000).unwrap();
        generator.stop(&sim).unwrap();

        generator.on_wake(&sim, START).unwrap();
        assert!(!generator.is_running());
        assert_eq!(generator.session(), None);
    }
}
