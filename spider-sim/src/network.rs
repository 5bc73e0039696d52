//! Unit-disk radio connectivity, sessions and packet sinks.
//!
//! Two nodes can talk directly when they are within `range_m` of each other.
//! A payload is forwarded along the shortest hop path at send time; if no
//! path exists the send fails with [`SimulationError::Unreachable`]. The
//! destination's cumulative received-bytes counter grows when the delivery
//! event fires, one per-hop latency per hop later.
//!
//! [`SimulationError::Unreachable`]: crate::SimulationError::Unreachable

use std::{
    collections::{HashMap, VecDeque},
    fmt,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::mobility::{NodeId, Vector3};

/// Radio parameters of the unit-disk model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfiguration {
    /// Communication range (meters)
    pub range_m: f64,
    /// PHY bit rate used to compute airtime (bits per second)
    pub phy_rate_bps: f64,
    /// Forwarding delay added per hop
    #[serde(with = "humantime_serde")]
    pub per_hop_latency: Duration,
}

impl Default for RadioConfiguration {
    fn default() -> Self {
        Self {
            range_m: 250.0,
            phy_rate_bps: 54_000_000.0,
            per_hop_latency: Duration::from_micros(500),
        }
    }
}

/// Identifier of a transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Bookkeeping for one source → destination session.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Sending node
    pub source: NodeId,
    /// Receiving node
    pub destination: NodeId,
    /// Whether the session still accepts sends
    pub open: bool,
    /// Payloads handed to the network
    pub payloads_sent: u64,
    /// Payloads rejected because the destination was unreachable
    pub payloads_unroutable: u64,
}

/// Outcome of a successful send.
#[derive(Debug, Clone, PartialEq)]
pub struct Transmission {
    /// Nodes traversed, source and destination included
    pub path: Vec<NodeId>,
    /// Simulation time at which the payload reaches the destination
    pub arrival: Duration,
}

impl Transmission {
    /// Number of radio hops.
    pub fn hops(&self) -> usize {
        self.path.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone)]
struct RouteCache {
    snapshot: Vec<(NodeId, Vector3)>,
    from: NodeId,
    to: NodeId,
    path: Option<Vec<NodeId>>,
}

/// Network state owned by the simulation world.
#[derive(Debug)]
pub(crate) struct NetworkState {
    pub(crate) config: RadioConfiguration,
    pub(crate) sessions: HashMap<SessionId, SessionState>,
    next_session_id: u64,
    received_bytes: HashMap<NodeId, u64>,
    route_cache: Option<RouteCache>,
}

impl NetworkState {
    pub(crate) fn new(config: RadioConfiguration) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
            next_session_id: 0,
            received_bytes: HashMap::new(),
            route_cache: None,
        }
    }

    pub(crate) fn open_session(&mut self, source: NodeId, destination: NodeId) -> SessionId {
        let id = SessionId(self.next_session_id);
        self.next_session_id += 1;
        self.sessions.insert(
            id,
            SessionState {
                source,
                destination,
                open: true,
                payloads_sent: 0,
                payloads_unroutable: 0,
            },
        );
        id
    }

    pub(crate) fn received_bytes(&self, node: NodeId) -> u64 {
        self.received_bytes.get(&node).copied().unwrap_or(0)
    }

    pub(crate) fn record_delivery(&mut self, node: NodeId, bytes: u64) {
        *self.received_bytes.entry(node).or_insert(0) += bytes;
    }

    /// Shortest hop path over `snapshot`, reusing the previous answer when
    /// nothing moved since.
    pub(crate) fn route(
        &mut self,
        snapshot: Vec<(NodeId, Vector3)>,
        from: NodeId,
        to: NodeId,
    ) -> Option<Vec<NodeId>> {
        if let Some(cache) = &self.route_cache {
            if cache.from == from && cache.to == to && cache.snapshot == snapshot {
                return cache.path.clone();
            }
        }
        let path = shortest_path(&snapshot, self.config.range_m, from, to);
        self.route_cache = Some(RouteCache {
            snapshot,
            from,
            to,
            path: path.clone(),
        });
        path
    }
}

/// Breadth-first shortest hop path between `from` and `to` over the unit-disk
/// graph of `nodes`. Nodes missing from `nodes` cannot take part.
pub fn shortest_path(
    nodes: &[(NodeId, Vector3)],
    range_m: f64,
    from: NodeId,
    to: NodeId,
) -> Option<Vec<NodeId>> {
    let index_of = |id: NodeId| nodes.iter().position(|(n, _)| *n == id);
    let start = index_of(from)?;
    let goal = index_of(to)?;
    if start == goal {
        return Some(vec![from]);
    }

    let mut parent: Vec<Option<usize>> = vec![None; nodes.len()];
    let mut visited = vec![false; nodes.len()];
    let mut queue = VecDeque::new();
    visited[start] = true;
    queue.push_back(start);

    while let Some(current) = queue.pop_front() {
        let here = nodes[current].1;
        for (next, (_, there)) in nodes.iter().enumerate() {
            if visited[next] || here.distance(there) > range_m {
                continue;
            }
            visited[next] = true;
            parent[next] = Some(current);
            if next == goal {
                let mut path = vec![nodes[goal].0];
                let mut cursor = goal;
                while let Some(p) = parent[cursor] {
                    path.push(nodes[p].0);
                    cursor = p;
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back(next);
        }
    }
    None
}
