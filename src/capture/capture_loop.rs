//! Producer side of a generation

use tracing::{debug, info, warn};

use crate::capture::source::SourceProvider;
use crate::pipeline::buffer::{BufferStats, FrameBuffer, PushOutcome};
use crate::pipeline::signal::{FailureSignal, Shutdown};
use crate::{CaptureConfig, SourceError};

/// Why the capture loop reached STOPPED
#[derive(Debug)]
pub enum StopReason {
    /// A sender worker raised the failure signal
    TransportFailed,
    SourceFailed(SourceError),
    Shutdown,
}

/// Outcome of one capture loop run
#[derive(Debug)]
pub struct CaptureReport {
    pub reason: StopReason,
    pub captured: u64,
    /// Counters of this generation's buffer, taken when it was closed
    pub buffer: BufferStats,
    pub discarded: usize,
}

pub struct CaptureLoop {
    buffer: FrameBuffer,
    failure: FailureSignal,
    shutdown: Shutdown,
    captured: u64,
}

impl CaptureLoop {
    pub fn new(buffer: FrameBuffer, failure: FailureSignal, shutdown: Shutdown) -> Self {
        Self {
            buffer,
            failure,
            shutdown,
            captured: 0,
        }
    }

    /// Open the source and push frames until told to stop.
    ///
    /// The source is released and the buffer closed on every exit path, so
    /// idle workers of this generation wake up and exit.
    pub fn run(mut self, provider: &dyn SourceProvider, config: &CaptureConfig) -> CaptureReport {
        let reason = self.drive(provider, config);
        let buffer = self.buffer.stats();
        let discarded = self.buffer.close();
        info!(
            captured = self.captured,
            discarded,
            "Capture stopped: {:?}",
            reason
        );
        CaptureReport {
            reason,
            captured: self.captured,
            buffer,
            discarded,
        }
    }

    fn drive(&mut self, provider: &dyn SourceProvider, config: &CaptureConfig) -> StopReason {
        let mut source = match provider.open(config) {
            Ok(source) => source,
            Err(e) => {
                warn!("Unable to open capture source: {}", e);
                return StopReason::SourceFailed(e);
            }
        };

        loop {
            if self.shutdown.is_triggered() {
                return StopReason::Shutdown;
            }
            if self.failure.is_raised() {
                return StopReason::TransportFailed;
            }

            let frame = match source.next_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Capture failed: {}", e);
                    return StopReason::SourceFailed(e);
                }
            };
            self.captured += 1;
            metrics::counter!("framecast_frames_captured_total").increment(1);
            debug!(bytes = frame.len(), "Capture");

            if self.buffer.push(frame) == PushOutcome::Dropped {
                debug!("Frame buffer full, frame dropped");
            }
        }
    }
}
