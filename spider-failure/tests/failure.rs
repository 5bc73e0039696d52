use std::time::Duration;

use spider_failure::{
    ExperimentError, FailureConfig, FailureRecord, NodeHealth, OutputStream, arm_failure_injector,
};
use spider_sim::{MobilityModel, NodeId, SimWorld, SimulationError, Vector3};

const SENTINEL: Vector3 = Vector3::new(10_000.0, 0.0, 0.0);

fn world_with_nodes(seed: u64, count: u32) -> (SimWorld, Vec<NodeId>) {
    let sim = SimWorld::new_with_seed(seed);
    let nodes = (0..count)
        .map(|i| {
            let position = Vector3::new(f64::from(i) * 50.0, 0.0, 0.0);
            sim.add_node(MobilityModel::ConstantPosition(position))
        })
        .collect();
    (sim, nodes)
}

fn config(probability: f64) -> FailureConfig {
    FailureConfig {
        probability,
        ..FailureConfig::default()
    }
}

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

fn run_failures(
    seed: u64,
    nodes: u32,
    failure: &FailureConfig,
    stop: Duration,
) -> Vec<FailureRecord> {
    let (mut sim, nodes) = world_with_nodes(seed, nodes);
    let injector = arm_failure_injector(
        &sim,
        &nodes,
        failure,
        stop,
        OutputStream::in_memory(),
    )
    .unwrap();
    sim.run_until(stop).unwrap();
    let records = injector.borrow().records().to_vec();
    records
}

#[test]
fn failed_node_sits_at_sentinel_until_restored() {
    let (mut sim, nodes) = world_with_nodes(5, 3);
    let original = sim.position(nodes[1]).unwrap();
    let injector = arm_failure_injector(
        &sim,
        &nodes,
        &config(1.0),
        Duration::from_secs(60),
        OutputStream::in_memory(),
    )
    .unwrap();

    sim.run_until(secs(0.001)).unwrap();
    assert_eq!(sim.position(nodes[1]).unwrap(), SENTINEL);
    assert_eq!(
        injector.borrow().health(nodes[1]),
        Some(NodeHealth::Failed {
            since: Duration::ZERO,
            until: Duration::from_millis(29_900),
        })
    );

    sim.run_until(secs(29.899)).unwrap();
    assert_eq!(sim.position(nodes[1]).unwrap(), SENTINEL);

    sim.run_until(secs(29.901)).unwrap();
    assert_eq!(sim.position(nodes[1]).unwrap(), original);
    assert_eq!(injector.borrow().health(nodes[1]), Some(NodeHealth::Alive));
    assert!(injector.borrow().failed_nodes().is_empty());

    // Probability one fails everything again on the next cycle
    sim.run_until(secs(30.001)).unwrap();
    assert_eq!(injector.borrow().failed_nodes(), nodes);
}

#[test]
fn same_seed_same_failures() {
    let failure = config(0.3);
    let stop = Duration::from_secs(300);
    let first = run_failures(11, 10, &failure, stop);
    let second = run_failures(11, 10, &failure, stop);
    let other = run_failures(12, 10, &failure, stop);

    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert_ne!(first, other);
}

#[test]
fn outages_never_overlap_when_shorter_than_period() {
    let failure = config(0.5);
    let records = run_failures(3, 10, &failure, Duration::from_secs(600));
    assert!(records.len() > 20);

    for node in 0..10 {
        let mut previous_restore = None;
        for record in records.iter().filter(|r| r.node == NodeId(node)) {
            assert_eq!(record.restore_at - record.failed_at, Duration::from_millis(29_900));
            if let Some(restore) = previous_restore {
                assert!(record.failed_at >= restore);
            }
            previous_restore = Some(record.restore_at);
        }
    }
}

#[test]
fn failure_count_follows_binomial_mean() {
    let failure = config(0.05);
    let stop = Duration::from_secs(300);
    let runs = 1000;
    let total: usize = (0..runs)
        .map(|seed| run_failures(seed, 10, &failure, stop).len())
        .sum();

    // 10 cycles x 10 nodes x 0.05
    let mean = total as f64 / runs as f64;
    assert!((mean - 5.0).abs() <= 1.0, "mean failures {mean}");
}

#[test]
fn cycles_stop_before_stop_time() {
    let (mut sim, nodes) = world_with_nodes(1, 2);
    let injector = arm_failure_injector(
        &sim,
        &nodes,
        &config(0.0),
        Duration::from_secs(300),
        OutputStream::in_memory(),
    )
    .unwrap();

    sim.run_until(Duration::from_secs(1000)).unwrap();

    assert_eq!(injector.borrow().cycles(), 10);
    assert_eq!(injector.borrow().failure_count(), 0);
}

#[test]
fn first_decision_can_be_offset() {
    let (mut sim, nodes) = world_with_nodes(1, 1);
    let failure = FailureConfig {
        first_decision: Duration::from_secs(5),
        ..config(1.0)
    };
    let injector = arm_failure_injector(
        &sim,
        &nodes,
        &failure,
        Duration::from_secs(60),
        OutputStream::in_memory(),
    )
    .unwrap();

    sim.run_until(Duration::from_secs(60)).unwrap();

    let times: Vec<Duration> = injector.borrow().records().iter().map(|r| r.failed_at).collect();
    assert_eq!(times, vec![Duration::from_secs(5), Duration::from_secs(35)]);
}

#[test]
fn overlapping_outage_is_an_invariant_violation() {
    let (mut sim, nodes) = world_with_nodes(1, 2);
    let failure = FailureConfig {
        period: Duration::from_secs(10),
        outage: Duration::from_secs(30),
        ..config(1.0)
    };
    arm_failure_injector(
        &sim,
        &nodes,
        &failure,
        Duration::from_secs(60),
        OutputStream::in_memory(),
    )
    .unwrap();

    let err = sim.run_until(Duration::from_secs(60)).unwrap_err();
    assert!(matches!(err, SimulationError::InvariantViolation(_)));
    assert!(sim.is_stopped());
    assert_eq!(sim.current_time(), Duration::from_secs(10));
}

#[test]
fn restoration_at_cycle_boundary_is_not_an_overlap() {
    let (mut sim, nodes) = world_with_nodes(1, 1);
    let failure = FailureConfig {
        period: Duration::from_secs(10),
        outage: Duration::from_millis(10_100),
        ..config(1.0)
    };
    let injector = arm_failure_injector(
        &sim,
        &nodes,
        &failure,
        Duration::from_secs(40),
        OutputStream::in_memory(),
    )
    .unwrap();

    sim.run_until(Duration::from_secs(40)).unwrap();
    assert_eq!(injector.borrow().failure_count(), 4);
}

#[test]
fn disarm_stops_cycles_but_restores_pending_nodes() {
    let (mut sim, nodes) = world_with_nodes(1, 2);
    let original = sim.position(nodes[0]).unwrap();
    let injector = arm_failure_injector(
        &sim,
        &nodes,
        &config(1.0),
        Duration::from_secs(300),
        OutputStream::in_memory(),
    )
    .unwrap();

    sim.run_until(Duration::from_secs(1)).unwrap();
    injector.borrow_mut().disarm(&sim);
    assert!(!injector.borrow().is_armed());

    sim.run_until(Duration::from_secs(300)).unwrap();

    let injector = injector.borrow();
    assert_eq!(injector.cycles(), 1);
    assert_eq!(injector.restorations(), 2);
    assert_eq!(sim.position(nodes[0]).unwrap(), original);
}

#[test]
fn every_failure_lands_in_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("failures.txt");
    let log = OutputStream::create(&path).unwrap();

    let (mut sim, nodes) = world_with_nodes(9, 4);
    let injector = arm_failure_injector(
        &sim,
        &nodes,
        &config(0.4),
        Duration::from_secs(300),
        log.clone(),
    )
    .unwrap();
    sim.run_until(Duration::from_secs(300)).unwrap();
    log.flush().unwrap();

    let records = injector.borrow().records().to_vec();
    let lines: Vec<String> = std::fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(str::to_owned)
        .collect();
    assert_eq!(lines.len(), records.len());
    for (line, record) in lines.iter().zip(&records) {
        assert_eq!(
            *line,
            format!("{}\t{}", record.failed_at.as_secs_f64(), record.node.0)
        );
    }
}

#[test]
fn bad_configuration_schedules_nothing() {
    let (sim, nodes) = world_with_nodes(1, 3);
    let stop = Duration::from_secs(100);
    let log = OutputStream::in_memory();

    let cases = [
        config(-0.5),
        config(1.5),
        FailureConfig {
            period: Duration::ZERO,
            ..config(0.1)
        },
        FailureConfig {
            outage: Duration::from_millis(100),
            ..config(0.1)
        },
    ];
    for failure in &cases {
        let err = arm_failure_injector(&sim, &nodes, failure, stop, log.clone()).unwrap_err();
        assert!(matches!(err, ExperimentError::InvalidConfig(_)), "{failure:?}");
    }

    let err = arm_failure_injector(&sim, &[], &config(0.1), stop, log.clone()).unwrap_err();
    assert!(matches!(err, ExperimentError::InvalidConfig(_)));
    let err = arm_failure_injector(
        &sim,
        &[nodes[0], nodes[0]],
        &config(0.1),
        stop,
        log.clone(),
    )
    .unwrap_err();
    assert!(matches!(err, ExperimentError::InvalidConfig(_)));
    let err = arm_failure_injector(&sim, &[NodeId(42)], &config(0.1), stop, log).unwrap_err();
    assert!(matches!(err, ExperimentError::Simulation(SimulationError::UnknownNode(NodeId(42)))));

    assert_eq!(sim.pending_event_count(), 0);
}

#[test]
fn sentinel_inside_the_deployment_is_rejected() {
    let (sim, nodes) = world_with_nodes(1, 3);
    let stop = Duration::from_secs(100);

    let near = FailureConfig {
        sentinel: Vector3::new(200.0, 10.0, 0.0),
        ..config(1.0)
    };
    let err = arm_failure_injector(&sim, &nodes[1..2], &near, stop, OutputStream::in_memory())
        .unwrap_err();
    assert!(matches!(err, ExperimentError::InvalidConfig(_)));

    // Exactly at range still links
    let edge = FailureConfig {
        sentinel: Vector3::new(100.0 + 250.0, 0.0, 0.0),
        ..config(1.0)
    };
    assert!(arm_failure_injector(&sim, &nodes, &edge, stop, OutputStream::in_memory()).is_err());
    assert_eq!(sim.pending_event_count(), 0);

    let far = FailureConfig {
        sentinel: Vector3::new(100.0 + 250.5, 0.0, 0.0),
        ..config(1.0)
    };
    arm_failure_injector(&sim, &nodes, &far, stop, OutputStream::in_memory()).unwrap();
}
