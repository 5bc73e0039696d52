//! Harness wiring one complete failure experiment.
//!
//! Building an [`Experiment`] creates the world, the SPIDER topology and the
//! output streams, then arms every component against the stop time. Nothing
//! runs until [`Experiment::run`].

use std::{cell::RefCell, rc::Rc, time::Instant};

use spider_sim::{SimWorld, rng::get_rng_call_count};
use tracing::{info, instrument, warn};

use crate::{
    config::ExperimentConfig,
    course::CourseLog,
    energy::{EnergySampler, arm_energy_sampler},
    error::{ExperimentError, ExperimentResult},
    failure::{FailureInjector, arm_failure_injector},
    output::OutputStream,
    report::{BatchReport, ExperimentReport},
    throughput::{ThroughputSampler, arm_throughput_sampler},
    topology::{Topology, build_topology},
    traffic::{TrafficGenerator, arm_traffic_generator},
};

/// The three record streams of a run.
#[derive(Debug, Clone)]
pub struct Streams {
    /// `time_s, mbps` per throughput sample
    pub throughput: OutputStream,
    /// Residual energy per node, then the total
    pub energy: OutputStream,
    /// `time_s, node_id` per failure
    pub failure_log: OutputStream,
}

/// A fully armed experiment.
#[derive(Debug)]
pub struct Experiment {
    config: ExperimentConfig,
    world: SimWorld,
    topology: Topology,
    streams: Streams,
    traffic: Rc<RefCell<TrafficGenerator>>,
    failures: Rc<RefCell<FailureInjector>>,
    throughput: Rc<RefCell<ThroughputSampler>>,
    energy: Rc<RefCell<EnergySampler>>,
    course: CourseLog,
    finished: bool,
}

impl Experiment {
    /// Validates `config` and arms every component.
    pub fn new(config: ExperimentConfig) -> ExperimentResult<Self> {
        config.validate()?;
        let stop = config.stop_time;

        let world = SimWorld::new_with_config_and_seed(config.sim.clone(), config.seed);
        let topology = build_topology(&world, &config.topology)?;
        let course = CourseLog::attach(&world, topology.source)?;

        let streams = Streams {
            throughput: OutputStream::open(config.outputs.throughput.as_deref())?,
            energy: OutputStream::open(config.outputs.energy.as_deref())?,
            failure_log: OutputStream::open(config.outputs.failure_log.as_deref())?,
        };

        let traffic = arm_traffic_generator(
            &world,
            topology.source,
            topology.sink,
            &config.traffic,
            stop,
        )?;
        // Source and sink are never failed
        let failures = arm_failure_injector(
            &world,
            &topology.transmission_nodes,
            &config.failure,
            stop,
            streams.failure_log.clone(),
        )?;
        let throughput = arm_throughput_sampler(
            &world,
            topology.sink,
            config.sampling.throughput_interval,
            streams.throughput.clone(),
            stop,
        )?;
        let mut energy_nodes = vec![topology.source, topology.sink];
        energy_nodes.extend(&topology.transmission_nodes);
        let energy = arm_energy_sampler(&world, &energy_nodes, stop, streams.energy.clone())?;

        Ok(Self {
            config,
            world,
            topology,
            streams,
            traffic,
            failures,
            throughput,
            energy,
            course,
            finished: false,
        })
    }

    /// Runs the world to the stop time and collects the report.
    ///
    /// Streams are flushed even when the run ends with an error.
    #[instrument(skip(self), fields(seed = self.config.seed))]
    pub fn run(&mut self) -> ExperimentResult<ExperimentReport> {
        if self.finished {
            return Err(ExperimentError::AlreadyRan);
        }
        self.finished = true;

        let started = Instant::now();
        info!(
            stop_s = self.config.stop_time.as_secs_f64(),
            relays = self.topology.transmission_nodes.len(),
            "experiment starting"
        );
        let outcome = self.world.run_until(self.config.stop_time);
        let flushed = self.flush();
        if let Err(err) = outcome {
            warn!(error = %err, "experiment aborted");
            return Err(err.into());
        }
        flushed?;

        let report = self.report(started.elapsed());
        info!(
            failures = report.failures.len(),
            mean_mbps = report.mean_throughput_mbps(),
            "experiment finished"
        );
        Ok(report)
    }

    fn flush(&self) -> ExperimentResult<()> {
        self.streams.throughput.flush()?;
        self.streams.energy.flush()?;
        self.streams.failure_log.flush()?;
        Ok(())
    }

    fn report(&self, wall_time: std::time::Duration) -> ExperimentReport {
        let traffic = self.traffic.borrow();
        let failures = self.failures.borrow();
        let throughput = self.throughput.borrow();
        let energy = self.energy.borrow();
        ExperimentReport {
            seed: self.config.seed,
            simulated_time: self.world.current_time(),
            wall_time,
            events_processed: self.world.events_processed(),
            random_draws: get_rng_call_count(),
            failure_cycles: failures.cycles(),
            failures: failures.records().to_vec(),
            payloads_emitted: traffic.emitted(),
            payloads_dropped: traffic.dropped(),
            bytes_received: self.world.received_bytes(self.topology.sink),
            throughput: throughput.samples().to_vec(),
            residual_energy_j: energy.readings().iter().map(|(_, j)| *j).collect(),
            total_residual_energy_j: energy.total_j().unwrap_or(0.0),
            course_changes: self.course.entries().len(),
        }
    }

    /// The simulation world.
    pub fn world(&self) -> &SimWorld {
        &self.world
    }

    /// Node ids of the deployment.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Output streams of the run.
    pub fn streams(&self) -> &Streams {
        &self.streams
    }

    /// The source's traffic generator.
    pub fn traffic(&self) -> Rc<RefCell<TrafficGenerator>> {
        self.traffic.clone()
    }

    /// The failure injector.
    pub fn failure_injector(&self) -> Rc<RefCell<FailureInjector>> {
        self.failures.clone()
    }

    /// The sink's throughput sampler.
    pub fn throughput_sampler(&self) -> Rc<RefCell<ThroughputSampler>> {
        self.throughput.clone()
    }

    /// The end-of-run energy sampler.
    pub fn energy_sampler(&self) -> Rc<RefCell<EnergySampler>> {
        self.energy.clone()
    }

    /// Position changes of the source.
    pub fn course_log(&self) -> &CourseLog {
        &self.course
    }

    /// Configuration the experiment was built from.
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }
}

/// Builds and runs one experiment.
pub fn run_experiment(config: ExperimentConfig) -> ExperimentResult<ExperimentReport> {
    Experiment::new(config)?.run()
}

/// Runs `config` once per seed, in order.
///
/// Configuration errors abort the batch; a run that fails on its own is
/// recorded with its seed and the batch moves on. File outputs are only
/// written for a single-seed batch, so runs do not overwrite each other.
pub fn run_batch(
    config: &ExperimentConfig,
    seeds: impl IntoIterator<Item = u64>,
) -> ExperimentResult<BatchReport> {
    config.validate()?;
    let seeds: Vec<u64> = seeds.into_iter().collect();
    let keep_outputs = seeds.len() == 1;

    let mut batch = BatchReport {
        runs: Vec::with_capacity(seeds.len()),
        seeds_failing: Vec::new(),
    };
    for seed in seeds {
        let mut run_config = config.clone();
        run_config.seed = seed;
        if !keep_outputs {
            run_config.outputs = Default::default();
        }
        match run_experiment(run_config) {
            Ok(report) => batch.runs.push(report),
            Err(err @ ExperimentError::InvalidConfig(_)) => return Err(err),
            Err(err) => {
                warn!(seed, error = %err, "run failed");
                batch.seeds_failing.push((seed, err.to_string()));
            }
        }
    }
    Ok(batch)
}
