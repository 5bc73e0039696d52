use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    rc::Rc,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use crate::{
    energy::{BasicEnergySource, EnergyConfiguration, airtime_energy},
    error::{SimulationError, SimulationResult},
    events::{Event, EventId, EventQueue, ProcessId, ScheduledEvent},
    mobility::{MobilityModel, NodeId, Vector3},
    network::{NetworkState, RadioConfiguration, SessionId, SessionState, Transmission},
    rng::{reset_sim_rng, set_sim_seed},
};

/// A stateful component driven by the scheduler.
///
/// The world calls [`Process::on_wake`] whenever an [`Event::Wake`] addressed
/// to the process fires. `tag` is whatever the process passed when it asked to
/// be woken, so one process can multiplex several kinds of timers.
pub trait Process {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> &str;

    /// Handle a wake-up at the current simulation time.
    ///
    /// Returning an error halts the run.
    fn on_wake(&mut self, sim: &SimWorld, tag: u64) -> SimulationResult<()>;
}

type PositionObserver = Rc<dyn Fn(NodeId, Vector3, Duration)>;

/// Substrate parameters: radio model and batteries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfiguration {
    /// Radio connectivity parameters
    pub radio: RadioConfiguration,
    /// Battery and radio current parameters
    pub energy: EnergyConfiguration,
}

struct NodeState {
    mobility: MobilityModel,
    battery: BasicEnergySource,
}

struct SimInner {
    current_time: Duration,
    event_queue: EventQueue,
    next_sequence: u64,
    // Ids of events that are scheduled and not cancelled
    live_events: HashSet<u64>,

    processes: HashMap<ProcessId, Rc<RefCell<dyn Process>>>,
    next_process_id: u64,

    nodes: BTreeMap<NodeId, NodeState>,
    next_node_id: u32,
    observers: HashMap<NodeId, Vec<PositionObserver>>,

    network: NetworkState,
    energy_config: EnergyConfiguration,

    events_processed: u64,
    halted: bool,
}

impl SimInner {
    fn new(config: SimConfiguration) -> Self {
        Self {
            current_time: Duration::ZERO,
            event_queue: EventQueue::new(),
            next_sequence: 0,
            live_events: HashSet::new(),
            processes: HashMap::new(),
            next_process_id: 0,
            nodes: BTreeMap::new(),
            next_node_id: 0,
            observers: HashMap::new(),
            network: NetworkState::new(config.radio),
            energy_config: config.energy,
            events_processed: 0,
            halted: false,
        }
    }

    fn schedule_at(&mut self, event: Event, time: Duration) -> EventId {
        // The clock never runs backwards
        let time = time.max(self.current_time);
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.live_events.insert(sequence);
        self.event_queue
            .schedule(ScheduledEvent::new(time, event, sequence));
        EventId(sequence)
    }

    fn node_mut(&mut self, node: NodeId) -> SimulationResult<&mut NodeState> {
        self.nodes
            .get_mut(&node)
            .ok_or(SimulationError::UnknownNode(node))
    }

    /// Drops cancelled events from the head of the queue and returns the time
    /// of the next live one.
    fn next_live_time(&mut self) -> Option<Duration> {
        loop {
            let (id, time) = {
                let head = self.event_queue.peek_earliest()?;
                (head.id().0, head.time())
            };
            if self.live_events.contains(&id) {
                return Some(time);
            }
            self.event_queue.pop_earliest();
        }
    }
}

/// The central simulation coordinator that manages time and event processing.
///
/// `SimWorld` owns the clock, the event queue, every node's position and
/// battery, and the transport sessions. Components never reach for globals:
/// they get a `&SimWorld` on every wake-up and schedule their next step
/// through it.
pub struct SimWorld {
    inner: Rc<RefCell<SimInner>>,
}

impl fmt::Debug for SimWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("SimWorld")
            .field("current_time", &inner.current_time)
            .field("pending_events", &inner.live_events.len())
            .field("nodes", &inner.nodes.len())
            .field("processes", &inner.processes.len())
            .finish()
    }
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWorld {
    /// Creates a world with default configuration and seed 0.
    pub fn new() -> Self {
        Self::new_with_config_and_seed(SimConfiguration::default(), 0)
    }

    /// Creates a world with default configuration and the given seed.
    ///
    /// The thread-local RNG is reset before seeding, so consecutive worlds on
    /// one thread do not leak random state into each other.
    pub fn new_with_seed(seed: u64) -> Self {
        Self::new_with_config_and_seed(SimConfiguration::default(), seed)
    }

    /// Creates a world with custom configuration and seed 0.
    pub fn new_with_config(config: SimConfiguration) -> Self {
        Self::new_with_config_and_seed(config, 0)
    }

    /// Creates a world with both custom configuration and seed.
    pub fn new_with_config_and_seed(config: SimConfiguration, seed: u64) -> Self {
        reset_sim_rng();
        set_sim_seed(seed);

        Self {
            inner: Rc::new(RefCell::new(SimInner::new(config))),
        }
    }

    // ------------------------------------------------------------------
    // Clock and event processing
    // ------------------------------------------------------------------

    /// Returns the current simulation time.
    pub fn current_time(&self) -> Duration {
        self.inner.borrow().current_time
    }

    /// Processes the next live event and advances time.
    ///
    /// Returns `Ok(true)` while more events remain, `Ok(false)` once the queue
    /// is drained or the world has been halted.
    #[instrument(skip(self), level = "trace")]
    pub fn step(&mut self) -> SimulationResult<bool> {
        let scheduled = {
            let mut inner = self.inner.borrow_mut();
            if inner.halted || inner.next_live_time().is_none() {
                return Ok(false);
            }
            let Some(scheduled) = inner.event_queue.pop_earliest() else {
                return Ok(false);
            };
            inner.live_events.remove(&scheduled.id().0);
            inner.current_time = scheduled.time();
            inner.events_processed += 1;
            scheduled
        };

        if let Err(err) = self.process_event(scheduled.into_event()) {
            self.inner.borrow_mut().halted = true;
            return Err(err);
        }

        Ok(self.has_pending_events())
    }

    /// Processes every event up to and including `stop`, then sets the clock
    /// to `stop`.
    ///
    /// Periodic processes keep the queue non-empty forever, so this is the
    /// normal way to run an experiment.
    #[instrument(skip(self))]
    pub fn run_until(&mut self, stop: Duration) -> SimulationResult<()> {
        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                if inner.halted {
                    return Ok(());
                }
                inner.next_live_time()
            };
            match next {
                Some(time) if time <= stop => {
                    self.step()?;
                }
                _ => break,
            }
        }

        let mut inner = self.inner.borrow_mut();
        if inner.current_time < stop {
            inner.current_time = stop;
        }
        debug!(
            stop_s = stop.as_secs_f64(),
            events = inner.events_processed,
            "simulation reached stop time"
        );
        Ok(())
    }

    /// Processes all scheduled events until the queue is empty.
    pub fn run_until_empty(&mut self) -> SimulationResult<()> {
        while self.step()? {}
        Ok(())
    }

    /// Halts the world: no further event is processed.
    pub fn stop(&self) {
        self.inner.borrow_mut().halted = true;
    }

    /// Whether [`SimWorld::stop`] was called or a process failed.
    pub fn is_stopped(&self) -> bool {
        self.inner.borrow().halted
    }

    /// Schedules an event to execute after `delay` from the current time.
    pub fn schedule_event(&self, event: Event, delay: Duration) -> EventId {
        let mut inner = self.inner.borrow_mut();
        let time = inner.current_time + delay;
        inner.schedule_at(event, time)
    }

    /// Schedules an event at an absolute time. Times in the past are clamped
    /// to the current time.
    pub fn schedule_event_at(&self, event: Event, time: Duration) -> EventId {
        self.inner.borrow_mut().schedule_at(event, time)
    }

    /// Wakes `process` with `tag` after `delay`.
    pub fn wake_after(&self, process: ProcessId, delay: Duration, tag: u64) -> EventId {
        self.schedule_event(Event::Wake { process, tag }, delay)
    }

    /// Wakes `process` with `tag` at absolute time `time`.
    pub fn wake_at(&self, process: ProcessId, time: Duration, tag: u64) -> EventId {
        self.schedule_event_at(Event::Wake { process, tag }, time)
    }

    /// Cancels a scheduled event.
    ///
    /// Returns `true` if the event was still pending. Cancelling an event that
    /// already fired or was already cancelled is a no-op.
    pub fn cancel(&self, event: EventId) -> bool {
        self.inner.borrow_mut().live_events.remove(&event.0)
    }

    /// Whether `event` is scheduled and not yet fired or cancelled.
    pub fn is_pending(&self, event: EventId) -> bool {
        self.inner.borrow().live_events.contains(&event.0)
    }

    /// Returns `true` if there are live events waiting to be processed.
    pub fn has_pending_events(&self) -> bool {
        !self.inner.borrow().live_events.is_empty()
    }

    /// Returns the number of live events waiting to be processed.
    pub fn pending_event_count(&self) -> usize {
        self.inner.borrow().live_events.len()
    }

    /// Number of events processed so far.
    pub fn events_processed(&self) -> u64 {
        self.inner.borrow().events_processed
    }

    fn process_event(&self, event: Event) -> SimulationResult<()> {
        match event {
            Event::Wake { process, tag } => {
                let handle = self
                    .inner
                    .borrow()
                    .processes
                    .get(&process)
                    .cloned()
                    .ok_or_else(|| {
                        SimulationError::InvalidState(format!("{process} is not registered"))
                    })?;
                let mut process_ref = handle.try_borrow_mut().map_err(|_| {
                    SimulationError::InvalidState(format!("{process} woken re-entrantly"))
                })?;
                trace!(process = process_ref.name(), tag, "wake");
                process_ref.on_wake(self, tag)
            }
            Event::CourseChange { node } => {
                let position = {
                    let mut inner = self.inner.borrow_mut();
                    let now = inner.current_time;
                    let state = inner.node_mut(node)?;
                    // An explicit set_position replaced the itinerary
                    if !state.mobility.is_moving() {
                        return Ok(());
                    }
                    state.mobility.position_at(now)
                };
                self.notify_position_changed(node, position);
                Ok(())
            }
            Event::Delivery {
                session,
                destination,
                bytes,
            } => {
                self.inner
                    .borrow_mut()
                    .network
                    .record_delivery(destination, bytes);
                trace!(%session, %destination, bytes, "payload delivered");
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Processes
    // ------------------------------------------------------------------

    /// Registers a process built by `build`, which receives the id the
    /// process must use when scheduling its own wake-ups.
    ///
    /// The caller keeps the returned handle to inspect the process after the
    /// run.
    pub fn spawn<P, F>(&self, build: F) -> Rc<RefCell<P>>
    where
        P: Process + 'static,
        F: FnOnce(ProcessId) -> P,
    {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = ProcessId(inner.next_process_id);
            inner.next_process_id += 1;
            id
        };
        let process = Rc::new(RefCell::new(build(id)));
        let erased: Rc<RefCell<dyn Process>> = process.clone();
        self.inner.borrow_mut().processes.insert(id, erased);
        process
    }

    // ------------------------------------------------------------------
    // Nodes and mobility
    // ------------------------------------------------------------------

    /// Adds a node with a full battery and returns its id.
    ///
    /// Ids are handed out sequentially from 0. Waypoint nodes get a
    /// course-change event at every waypoint not in the past.
    pub fn add_node(&self, mobility: MobilityModel) -> NodeId {
        let mut inner = self.inner.borrow_mut();
        let id = NodeId(inner.next_node_id);
        inner.next_node_id += 1;

        let now = inner.current_time;
        for time in mobility.course_change_times() {
            if time >= now {
                inner.schedule_at(Event::CourseChange { node: id }, time);
            }
        }
        let battery = BasicEnergySource::new(&inner.energy_config);
        inner.nodes.insert(id, NodeState { mobility, battery });
        id
    }

    /// Distance (meters) within which two nodes can talk directly.
    pub fn radio_range(&self) -> f64 {
        self.inner.borrow().network.config.range_m
    }

    /// All node ids in ascending order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.inner.borrow().nodes.keys().copied().collect()
    }

    /// Position of `node` at the current time.
    pub fn position(&self, node: NodeId) -> SimulationResult<Vector3> {
        let mut inner = self.inner.borrow_mut();
        let now = inner.current_time;
        Ok(inner.node_mut(node)?.mobility.position_at(now))
    }

    /// Moves `node` to `position` and keeps it there.
    ///
    /// Any waypoint itinerary is dropped. Position observers are notified.
    pub fn set_position(&self, node: NodeId, position: Vector3) -> SimulationResult<()> {
        {
            let mut inner = self.inner.borrow_mut();
            inner.node_mut(node)?.mobility = MobilityModel::ConstantPosition(position);
        }
        self.notify_position_changed(node, position);
        Ok(())
    }

    /// Registers `observer`, called with `(node, new_position, time)` after
    /// every position change of `node`.
    pub fn on_position_changed<F>(&self, node: NodeId, observer: F) -> SimulationResult<()>
    where
        F: Fn(NodeId, Vector3, Duration) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        inner.node_mut(node)?;
        inner
            .observers
            .entry(node)
            .or_default()
            .push(Rc::new(observer));
        Ok(())
    }

    fn notify_position_changed(&self, node: NodeId, position: Vector3) {
        // Observers run without the world borrowed
        let (observers, now) = {
            let inner = self.inner.borrow();
            (
                inner.observers.get(&node).cloned().unwrap_or_default(),
                inner.current_time,
            )
        };
        for observer in observers {
            observer(node, position, now);
        }
    }

    // ------------------------------------------------------------------
    // Energy
    // ------------------------------------------------------------------

    /// Residual battery energy of `node` in joules.
    pub fn remaining_energy(&self, node: NodeId) -> SimulationResult<f64> {
        let mut inner = self.inner.borrow_mut();
        let now = inner.current_time;
        Ok(inner.node_mut(node)?.battery.remaining(now))
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Opens a session from `source` to `destination`.
    pub fn open_session(&self, source: NodeId, destination: NodeId) -> SimulationResult<SessionId> {
        let mut inner = self.inner.borrow_mut();
        inner.node_mut(source)?;
        inner.node_mut(destination)?;
        let id = inner.network.open_session(source, destination);
        debug!(%id, %source, %destination, "session opened");
        Ok(id)
    }

    /// Sends a payload of `bytes` on `session`.
    ///
    /// The payload follows the current shortest hop path over nodes with a
    /// non-empty battery; every hop charges the sender's and receiver's
    /// batteries. Fails with [`SimulationError::Unreachable`] when no path
    /// exists right now.
    pub fn send(&self, session: SessionId, bytes: u64) -> SimulationResult<Transmission> {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let now = inner.current_time;

        let (source, destination) = match inner.network.sessions.get(&session) {
            Some(state) if state.open => (state.source, state.destination),
            _ => return Err(SimulationError::SessionClosed(session.0)),
        };

        let snapshot: Vec<(NodeId, Vector3)> = inner
            .nodes
            .iter_mut()
            .filter_map(|(id, state)| {
                if state.battery.is_depleted(now) {
                    None
                } else {
                    Some((*id, state.mobility.position_at(now)))
                }
            })
            .collect();

        let Some(path) = inner.network.route(snapshot, source, destination) else {
            if let Some(state) = inner.network.sessions.get_mut(&session) {
                state.payloads_unroutable += 1;
            }
            return Err(SimulationError::Unreachable {
                from: source,
                to: destination,
            });
        };

        let phy_rate = inner.network.config.phy_rate_bps;
        let tx_j = airtime_energy(
            &inner.energy_config,
            inner.energy_config.tx_current_a,
            bytes,
            phy_rate,
        );
        let rx_j = airtime_energy(
            &inner.energy_config,
            inner.energy_config.rx_current_a,
            bytes,
            phy_rate,
        );
        for hop in path.windows(2) {
            inner.node_mut(hop[0])?.battery.consume(now, tx_j);
            inner.node_mut(hop[1])?.battery.consume(now, rx_j);
        }

        let hops = path.len().saturating_sub(1) as u32;
        let arrival = now + inner.network.config.per_hop_latency * hops;
        inner.schedule_at(
            Event::Delivery {
                session,
                destination,
                bytes,
            },
            arrival,
        );
        if let Some(state) = inner.network.sessions.get_mut(&session) {
            state.payloads_sent += 1;
        }

        Ok(Transmission { path, arrival })
    }

    /// Closes `session`. Closing an already closed session is a no-op.
    pub fn close_session(&self, session: SessionId) -> SimulationResult<()> {
        let mut inner = self.inner.borrow_mut();
        match inner.network.sessions.get_mut(&session) {
            Some(state) => {
                if state.open {
                    state.open = false;
                    debug!(%session, "session closed");
                }
                Ok(())
            }
            None => Err(SimulationError::SessionClosed(session.0)),
        }
    }

    /// Snapshot of a session's bookkeeping.
    pub fn session(&self, session: SessionId) -> Option<SessionState> {
        self.inner.borrow().network.sessions.get(&session).cloned()
    }

    /// Cumulative bytes delivered to `node` since the start of the run.
    pub fn received_bytes(&self, node: NodeId) -> u64 {
        self.inner.borrow().network.received_bytes(node)
    }
}
