//! SPIDER deployment: relay grid, static sink and a mobile source.

use std::time::Duration;

use spider_sim::{MobilityModel, NodeId, SimWorld, Vector3, Waypoint};
use tracing::debug;

use crate::{
    config::TopologyConfig,
    error::{ExperimentResult, invalid},
};

/// Node ids of a built deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    /// Relays that carry traffic and may fail, in creation order
    pub transmission_nodes: Vec<NodeId>,
    /// Mobile traffic source
    pub source: NodeId,
    /// Static traffic sink
    pub sink: NodeId,
}

impl Topology {
    /// Every node, relays first.
    pub fn all_nodes(&self) -> Vec<NodeId> {
        let mut nodes = self.transmission_nodes.clone();
        nodes.push(self.source);
        nodes.push(self.sink);
        nodes
    }
}

/// Itinerary of the source: dwell `location_time` at every location and
/// travel between consecutive ones at `src_speed`. The source stays at the
/// last location once it gets there.
pub fn source_itinerary(config: &TopologyConfig) -> Vec<Waypoint> {
    let mut waypoints = Vec::new();
    let mut time = Duration::ZERO;
    let mut previous: Option<Vector3> = None;
    let last = config.source_locations.len().saturating_sub(1);

    for (i, &location) in config.source_locations.iter().enumerate() {
        if let Some(from) = previous {
            time += Duration::from_secs_f64(from.distance(&location) / config.src_speed);
            waypoints.push(Waypoint::new(time, location));
        }
        if i < last {
            time += config.location_time;
            waypoints.push(Waypoint::new(time, location));
        }
        previous = Some(location);
    }
    if waypoints.is_empty() {
        if let Some(&only) = config.source_locations.first() {
            waypoints.push(Waypoint::new(Duration::ZERO, only));
        }
    }
    waypoints
}

/// Adds the relays, then the source, then the sink to `world`.
pub fn build_topology(world: &SimWorld, config: &TopologyConfig) -> ExperimentResult<Topology> {
    config.validate()?;

    let mut transmission_nodes = Vec::with_capacity(config.relay_count() as usize);
    for group in &config.groups {
        for index in 0..group.count {
            let position = group.position(index);
            transmission_nodes.push(world.add_node(MobilityModel::ConstantPosition(position)));
        }
    }

    let mobility = MobilityModel::waypoints(source_itinerary(config))
        .ok_or_else(|| invalid("source needs at least one location"))?;
    let source = world.add_node(mobility);
    let sink = world.add_node(MobilityModel::ConstantPosition(config.sink_position));

    debug!(
        relays = transmission_nodes.len(),
        %source,
        %sink,
        "topology built"
    );
    Ok(Topology {
        transmission_nodes,
        source,
        sink,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_itinerary() {
        let waypoints = source_itinerary(&TopologyConfig::default());
        let travel = Duration::from_secs_f64(325.0 / 2.8);
        let times: Vec<Duration> = waypoints.iter().map(|w| w.time).collect();
        assert_eq!(
            times,
            vec![
                Duration::from_secs(180),
                Duration::from_secs(180) + travel,
                Duration::from_secs(360) + travel,
                Duration::from_secs(360) + travel + travel,
            ]
        );
        assert_eq!(waypoints[3].position, Vector3::new(0.0, 650.0, 0.0));
    }

    #[test]
    fn single_location_source_stays_put() {
        let config = TopologyConfig {
            source_locations: vec![Vector3::new(5.0, 5.0, 0.0)],
            ..TopologyConfig::default()
        };
        let waypoints = source_itinerary(&config);
        assert_eq!(waypoints, vec![Waypoint::new(Duration::ZERO, Vector3::new(5.0, 5.0, 0.0))]);
    }

    #[test]
    fn ids_follow_creation_order() {
        let world = SimWorld::new();
        let topology = build_topology(&world, &TopologyConfig::default()).unwrap();
        assert_eq!(topology.transmission_nodes.len(), 38);
        assert_eq!(topology.transmission_nodes[0], NodeId(0));
        assert_eq!(topology.source, NodeId(38));
        assert_eq!(topology.sink, NodeId(39));
        assert_eq!(world.position(NodeId(13)).unwrap(), Vector3::new(50.0, 650.0, 0.0));
        assert_eq!(world.position(NodeId(28)).unwrap(), Vector3::new(100.0, 0.0, 0.0));
        assert_eq!(world.position(topology.sink).unwrap(), Vector3::new(400.0, 325.0, 0.0));
        assert_eq!(topology.all_nodes().len(), 40);
    }
}
