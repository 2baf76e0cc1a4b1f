//! One complete run of the pipeline

use std::sync::Arc;

use tracing::{info, info_span, warn};

use crate::capture::{CaptureLoop, SourceProvider, StopReason};
use crate::pipeline::buffer::{BufferStats, FrameBuffer};
use crate::pipeline::pool::{PoolReport, WorkerPool};
use crate::pipeline::signal::{FailureSignal, Shutdown};
use crate::transport::Connector;
use crate::{Config, PipelineError};

/// Summary of a finished generation
#[derive(Debug)]
pub struct GenerationReport {
    pub id: u64,
    pub reason: GenerationEnd,
    pub captured: u64,
    /// Counters of this generation's own buffer
    pub buffer: BufferStats,
    pub pool: PoolReport,
}

#[derive(Debug)]
pub enum GenerationEnd {
    Stopped(StopReason),
    /// Workers could not be started
    Setup(PipelineError),
}

impl GenerationReport {
    pub fn is_shutdown(&self) -> bool {
        matches!(self.reason, GenerationEnd::Stopped(StopReason::Shutdown))
    }
}

/// Fresh buffer, failure signal and worker pool, built from one config
/// snapshot. Nothing here outlives [`Generation::run`].
pub struct Generation {
    id: u64,
    config: Arc<Config>,
    buffer: FrameBuffer,
    failure: FailureSignal,
    pool: WorkerPool,
}

impl Generation {
    /// Build the buffer and start the workers; capture has not begun yet.
    ///
    /// On failure the buffer is closed so any workers already running exit.
    pub fn start(
        id: u64,
        config: Arc<Config>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, PipelineError> {
        let buffer = FrameBuffer::new(config.pipeline.buffer_capacity);
        let failure = FailureSignal::new();

        let pool = match WorkerPool::spawn(
            id,
            config.pipeline.workers,
            &buffer.consumer(),
            &failure,
            connector,
            &config.endpoint,
        ) {
            Ok(pool) => pool,
            Err(e) => {
                buffer.close();
                return Err(e);
            }
        };

        Ok(Self {
            id,
            config,
            buffer,
            failure,
            pool,
        })
    }

    /// Run the capture loop to completion, then wind the workers down.
    pub fn run(self, provider: &dyn SourceProvider, shutdown: &Shutdown) -> GenerationReport {
        let span = info_span!("generation", id = self.id);
        let _guard = span.enter();

        info!(
            "Streaming to {} ({} workers, buffer {})",
            self.config.endpoint.url(),
            self.pool.len(),
            self.buffer.capacity()
        );

        let capture = CaptureLoop::new(self.buffer, self.failure, shutdown.clone());
        let capture = capture.run(provider, &self.config.capture);

        let pool = self.pool.shutdown(self.config.pipeline.worker_join_grace());
        if pool.orphaned > 0 {
            warn!(orphaned = pool.orphaned, "Generation ended with orphaned workers");
        }

        GenerationReport {
            id: self.id,
            reason: GenerationEnd::Stopped(capture.reason),
            captured: capture.captured,
            buffer: capture.buffer,
            pool,
        }
    }
}
