//! Outer restart loop: run a generation, back off, start a fresh one

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{error, info, warn};

use crate::capture::{SourceProvider, StopReason};
use crate::pipeline::buffer::BufferStats;
use crate::pipeline::generation::{Generation, GenerationEnd, GenerationReport};
use crate::pipeline::pool::PoolReport;
use crate::pipeline::signal::Shutdown;
use crate::transport::Connector;
use crate::Config;

/// Single owner of the restart policy.
///
/// Workers and the capture loop never retry; every failure ends the
/// generation and the supervisor starts over after a fixed backoff.
pub struct Supervisor<P> {
    config: Arc<ArcSwap<Config>>,
    provider: P,
    connector: Arc<dyn Connector>,
    shutdown: Shutdown,
}

impl<P: SourceProvider> Supervisor<P> {
    pub fn new(
        config: Arc<ArcSwap<Config>>,
        provider: P,
        connector: Arc<dyn Connector>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            config,
            provider,
            connector,
            shutdown,
        }
    }

    /// Run generations until shutdown. Returns how many were run.
    pub fn run(&self) -> u64 {
        let mut generation = 0u64;

        while !self.shutdown.is_triggered() {
            generation += 1;
            let report = self.run_generation(generation);
            if report.is_shutdown() {
                break;
            }

            let backoff = self.config.load().pipeline.restart_backoff();
            info!(generation, "Restarting pipeline in {:?}", backoff);
            if self.shutdown.sleep(backoff) {
                break;
            }
        }

        info!(generations = generation, "Supervisor stopped");
        generation
    }

    /// Build and run one generation from the current config snapshot
    pub fn run_generation(&self, id: u64) -> GenerationReport {
        let config = self.config.load_full();
        metrics::counter!("framecast_generations_total").increment(1);
        info!(
            generation = id,
            "Connecting to {} on port {}", config.endpoint.host, config.endpoint.port
        );

        let report = match Generation::start(id, config, Arc::clone(&self.connector)) {
            Ok(generation) => generation.run(&self.provider, &self.shutdown),
            Err(e) => {
                error!(generation = id, "Failed to start generation: {}", e);
                GenerationReport {
                    id,
                    reason: GenerationEnd::Setup(e),
                    captured: 0,
                    buffer: BufferStats::default(),
                    pool: PoolReport::default(),
                }
            }
        };

        match &report.reason {
            GenerationEnd::Stopped(StopReason::Shutdown) => {
                info!(generation = id, "Generation stopped for shutdown")
            }
            GenerationEnd::Stopped(StopReason::TransportFailed) => {
                warn!(generation = id, "Generation ended: sender failure")
            }
            GenerationEnd::Stopped(StopReason::SourceFailed(e)) => {
                warn!(generation = id, "Generation ended: capture source failure: {}", e)
            }
            GenerationEnd::Setup(_) => {}
        }
        report
    }
}
