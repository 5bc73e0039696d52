use std::time::Duration;

use spider_failure::{
    FailureConfig, OutputStream, TrafficConfig, arm_energy_sampler, arm_failure_injector,
    arm_throughput_sampler, arm_traffic_generator,
};
use spider_sim::{MobilityModel, NodeId, SimWorld, Vector3};

/// Source, one relay and a sink on a line, 200 m apart: the relay is the
/// only path.
fn chain() -> (SimWorld, NodeId, NodeId, NodeId) {
    let sim = SimWorld::new_with_seed(4);
    let source = sim.add_node(MobilityModel::ConstantPosition(Vector3::new(0.0, 0.0, 0.0)));
    let relay = sim.add_node(MobilityModel::ConstantPosition(Vector3::new(200.0, 0.0, 0.0)));
    let sink = sim.add_node(MobilityModel::ConstantPosition(Vector3::new(400.0, 0.0, 0.0)));
    (sim, source, relay, sink)
}

#[test]
fn throughput_deltas_telescope() {
    let (mut sim, source, _relay, sink) = chain();
    let stop = Duration::from_secs(30);
    arm_traffic_generator(&sim, source, sink, &TrafficConfig::default(), stop).unwrap();
    let stream = OutputStream::in_memory();
    let sampler = arm_throughput_sampler(
        &sim,
        sink,
        Duration::from_secs(5),
        stream.clone(),
        stop,
    )
    .unwrap();

    sim.run_until(stop).unwrap();

    let sampler = sampler.borrow();
    let samples = sampler.samples();
    assert_eq!(samples.len(), 6);
    assert_eq!(stream.len(), 6);
    assert!(samples.iter().all(|s| s.mbps >= 0.0));

    let total: u64 = samples.iter().map(|s| s.delta_bytes).sum();
    assert_eq!(total, sampler.last_bytes() - sampler.initial_bytes());

    assert_eq!(samples[0].mbps, 0.0);
    for sample in &samples[2..] {
        assert!((sample.mbps - 5.0).abs() < 0.01, "{sample:?}");
    }
    for (record, sample) in stream.records().iter().zip(samples) {
        assert_eq!(*record, vec![sample.time.as_secs_f64(), sample.mbps]);
    }
}

#[test]
fn relay_failure_empties_the_sink() {
    let (mut sim, source, relay, sink) = chain();
    let stop = Duration::from_secs(20);
    let traffic = TrafficConfig {
        start_time: Duration::from_secs(1),
        ..TrafficConfig::default()
    };
    let generator = arm_traffic_generator(&sim, source, sink, &traffic, stop).unwrap();
    let failure = FailureConfig {
        probability: 1.0,
        first_decision: Duration::from_secs(5),
        ..FailureConfig::default()
    };
    arm_failure_injector(&sim, &[relay], &failure, stop, OutputStream::in_memory()).unwrap();
    let sampler = arm_throughput_sampler(
        &sim,
        sink,
        Duration::from_secs(5),
        OutputStream::in_memory(),
        stop,
    )
    .unwrap();

    sim.run_until(Duration::from_secs(21)).unwrap();

    let generator = generator.borrow();
    assert!(generator.dropped() > 0);
    assert_eq!(sim.received_bytes(sink), (generator.emitted() - generator.dropped()) * 1448);

    let samples = sampler.borrow().samples().to_vec();
    assert!(samples[1].mbps > 0.0);
    assert_eq!(samples[3].time, Duration::from_secs(15));
    assert_eq!(samples[3].delta_bytes, 0);
}

#[test]
fn energy_sampler_writes_each_node_then_the_total() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("energy.txt");
    let stream = OutputStream::create(&path).unwrap();

    let (mut sim, source, relay, sink) = chain();
    let stop = Duration::from_secs(10);
    arm_traffic_generator(&sim, source, sink, &TrafficConfig::default(), stop).unwrap();
    let nodes = [source, relay, sink];
    let sampler = arm_energy_sampler(&sim, &nodes, stop, stream.clone()).unwrap();

    sim.run_until(stop).unwrap();

    let values: Vec<f64> = std::fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(|line| line.parse().unwrap())
        .collect();
    assert_eq!(values.len(), nodes.len() + 1);
    let sum: f64 = values[..nodes.len()].iter().sum();
    assert!((values[nodes.len()] - sum).abs() < 1e-9);

    // Forwarding costs the relay more than the idle-only drain
    let idle_only = 1000.0 - 0.273 * 3.0 * 10.0;
    assert!(values[1] < values[0]);
    assert!(values[0] < idle_only);
    assert!(values.iter().all(|v| *v >= 0.0));

    let sampler = sampler.borrow();
    assert_eq!(sampler.readings().len(), 3);
    assert_eq!(sampler.total_j(), Some(values[3]));
    assert_eq!(stream.len(), 4);
}

#[test]
fn energy_never_increases_between_samples() {
    let (mut sim, source, relay, sink) = chain();
    arm_traffic_generator(
        &sim,
        source,
        sink,
        &TrafficConfig::default(),
        Duration::from_secs(20),
    )
    .unwrap();

    let mut previous = sim.remaining_energy(relay).unwrap();
    for second in 1..=20 {
        sim.run_until(Duration::from_secs(second)).unwrap();
        let now = sim.remaining_energy(relay).unwrap();
        assert!(now < previous);
        previous = now;
    }
}
