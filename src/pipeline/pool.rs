//! Fixed set of sender worker threads for one generation

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::pipeline::buffer::FrameConsumer;
use crate::pipeline::signal::FailureSignal;
use crate::pipeline::worker::{SenderWorker, WorkerExit};
use crate::transport::Connector;
use crate::{EndpointConfig, PipelineError};

const JOIN_POLL: Duration = Duration::from_millis(10);

/// What happened to the workers when the pool was shut down
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub exits: Vec<WorkerExit>,
    /// Workers still blocked (typically inside `send`) after the grace period
    pub orphaned: usize,
}

pub struct WorkerPool {
    generation: u64,
    handles: Vec<JoinHandle<WorkerExit>>,
}

impl WorkerPool {
    /// Start `size` workers sharing one consumer and one failure signal.
    ///
    /// If a thread fails to spawn the signal is raised and the workers
    /// already started are left to be cancelled with the buffer.
    pub fn spawn(
        generation: u64,
        size: usize,
        consumer: &FrameConsumer,
        failure: &FailureSignal,
        connector: Arc<dyn Connector>,
        endpoint: &EndpointConfig,
    ) -> Result<Self, PipelineError> {
        let mut handles = Vec::with_capacity(size);

        for index in 0..size {
            let worker = SenderWorker::new(
                format!("sender-{}-{}", generation, index),
                consumer.clone(),
                failure.clone(),
                Arc::clone(&connector),
                endpoint.clone(),
            );
            let handle = thread::Builder::new()
                .name(worker.name().to_owned())
                .spawn(move || worker.run())
                .map_err(|e| {
                    failure.raise();
                    PipelineError::Spawn(e)
                })?;
            handles.push(handle);
        }

        info!(generation, workers = size, "Sender workers started");
        Ok(Self {
            generation,
            handles,
        })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Join workers that finish within `grace`; detach the rest.
    ///
    /// Call after the frame buffer is closed so idle workers can exit.
    pub fn shutdown(self, grace: Duration) -> PoolReport {
        let deadline = Instant::now() + grace;
        let mut pending = self.handles;
        let mut report = PoolReport::default();

        loop {
            let (finished, running): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|h| h.is_finished());
            for handle in finished {
                match handle.join() {
                    Ok(exit) => report.exits.push(exit),
                    Err(_) => warn!(generation = self.generation, "Sender worker panicked"),
                }
            }
            pending = running;

            if pending.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(JOIN_POLL);
        }

        report.orphaned = pending.len();
        if report.orphaned > 0 {
            warn!(
                generation = self.generation,
                orphaned = report.orphaned,
                "Sender workers still blocked after {:?}, detaching",
                grace
            );
            metrics::counter!("framecast_orphaned_workers_total")
                .increment(report.orphaned as u64);
        } else {
            debug!(generation = self.generation, "All sender workers joined");
        }
        report
    }
}
