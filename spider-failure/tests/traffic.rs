use std::time::Duration;

use spider_failure::{TrafficConfig, arm_traffic_generator, payload_interval};
use spider_sim::{MobilityModel, NodeId, SimWorld, Vector3};

fn pair(distance: f64) -> (SimWorld, NodeId, NodeId) {
    let sim = SimWorld::new_with_seed(1);
    let source = sim.add_node(MobilityModel::ConstantPosition(Vector3::new(0.0, 0.0, 0.0)));
    let sink = sim.add_node(MobilityModel::ConstantPosition(Vector3::new(distance, 0.0, 0.0)));
    (sim, source, sink)
}

fn traffic(start: Duration) -> TrafficConfig {
    TrafficConfig {
        start_time: start,
        ..TrafficConfig::default()
    }
}

#[test]
fn emissions_are_spaced_by_payload_over_rate() {
    let (mut sim, source, sink) = pair(100.0);
    let generator = arm_traffic_generator(
        &sim,
        source,
        sink,
        &traffic(Duration::ZERO),
        Duration::from_secs(1),
    )
    .unwrap();
    generator.borrow_mut().record_emission_times();

    sim.run_until(Duration::from_millis(300)).unwrap();

    let generator = generator.borrow();
    let times = generator.emission_times();
    assert!(times.len() >= 100, "only {} emissions", times.len());
    assert_eq!(times[0], Duration::ZERO);

    let expected = 1448.0 * 8.0 / 5_000_000.0;
    for pair in times.windows(2) {
        let gap = (pair[1] - pair[0]).as_secs_f64();
        assert!((gap - expected).abs() < 1e-9, "gap {gap} != {expected}");
    }
}

#[test]
fn reference_rate_emits_about_4317_payloads_in_ten_seconds() {
    let (mut sim, source, sink) = pair(100.0);
    let generator = arm_traffic_generator(
        &sim,
        source,
        sink,
        &traffic(Duration::from_secs(1)),
        Duration::from_secs(11),
    )
    .unwrap();

    sim.run_until(Duration::from_secs(11)).unwrap();

    let generator = generator.borrow();
    assert_eq!(generator.interval(), Duration::from_nanos(2_316_800));
    assert_eq!(payload_interval(1448, 5_000_000), generator.interval());
    let emitted = generator.emitted() as i64;
    assert!((emitted - 4317).abs() <= 1, "emitted {emitted}");
    assert_eq!(generator.first_emission(), Some(Duration::from_secs(1)));
    assert!(!generator.is_running());
}

#[test]
fn every_routed_payload_reaches_the_sink() {
    let (mut sim, source, sink) = pair(100.0);
    let generator = arm_traffic_generator(
        &sim,
        source,
        sink,
        &traffic(Duration::from_secs(1)),
        Duration::from_secs(3),
    )
    .unwrap();

    // Leave time for the last payload in flight
    sim.run_until(Duration::from_secs(4)).unwrap();

    let generator = generator.borrow();
    assert_eq!(generator.dropped(), 0);
    assert_eq!(sim.received_bytes(sink), generator.emitted() * 1448);
    assert_eq!(generator.bytes_sent(), sim.received_bytes(sink));
}

#[test]
fn stop_is_idempotent_and_final() {
    let (mut sim, source, sink) = pair(100.0);
    let generator = arm_traffic_generator(
        &sim,
        source,
        sink,
        &traffic(Duration::ZERO),
        Duration::from_secs(10),
    )
    .unwrap();

    sim.run_until(Duration::from_millis(500)).unwrap();
    generator.borrow_mut().stop(&sim).unwrap();
    generator.borrow_mut().stop(&sim).unwrap();
    let emitted = generator.borrow().emitted();
    assert!(emitted > 0);

    sim.run_until(Duration::from_secs(12)).unwrap();

    let generator = generator.borrow();
    assert_eq!(generator.emitted(), emitted);
    assert!(!generator.is_running());
    let session = generator.session().unwrap();
    assert!(!sim.session(session).unwrap().open);
}

#[test]
fn stop_before_start_time_prevents_any_emission() {
    let (mut sim, source, sink) = pair(100.0);
    let generator = arm_traffic_generator(
        &sim,
        source,
        sink,
        &traffic(Duration::from_secs(1)),
        Duration::from_secs(10),
    )
    .unwrap();

    sim.run_until(Duration::from_millis(500)).unwrap();
    generator.borrow_mut().stop(&sim).unwrap();
    // Only the stop wake at 10 s is left
    assert_eq!(sim.pending_event_count(), 1);

    sim.run_until(Duration::from_secs(2)).unwrap();

    let generator = generator.borrow();
    assert_eq!(generator.emitted(), 0);
    assert!(!generator.is_running());
    assert_eq!(generator.session(), None);
    assert_eq!(sim.received_bytes(sink), 0);
}

#[test]
fn unreachable_sink_drops_but_keeps_emitting() {
    let (mut sim, source, sink) = pair(10_000.0);
    let generator = arm_traffic_generator(
        &sim,
        source,
        sink,
        &traffic(Duration::ZERO),
        Duration::from_millis(100),
    )
    .unwrap();

    sim.run_until(Duration::from_millis(100)).unwrap();

    let generator = generator.borrow();
    assert!(generator.emitted() > 40);
    assert_eq!(generator.dropped(), generator.emitted());
    assert_eq!(sim.received_bytes(sink), 0);
    let session = sim.session(generator.session().unwrap()).unwrap();
    assert_eq!(session.payloads_unroutable, generator.emitted());
}

#[test]
fn invalid_traffic_is_rejected_before_scheduling() {
    let (sim, source, sink) = pair(100.0);
    let config = TrafficConfig {
        payload_size: 0,
        ..TrafficConfig::default()
    };
    assert!(arm_traffic_generator(&sim, source, sink, &config, Duration::from_secs(5)).is_err());

    let late = traffic(Duration::from_secs(5));
    assert!(arm_traffic_generator(&sim, source, sink, &late, Duration::from_secs(5)).is_err());

    let early = traffic(Duration::ZERO);
    let stop = Duration::from_secs(5);
    assert!(arm_traffic_generator(&sim, source, NodeId(9), &early, stop).is_err());
    assert_eq!(sim.pending_event_count(), 0);
}
