//! Bounded, lossy frame queue shared by the producer and the sender workers
//!
//! Overflow policy is drop-newest: once `capacity` frames are pending, new
//! frames are discarded and the queued ones are kept for delivery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;
use flume::{Receiver, Sender, TrySendError};
use tracing::debug;

use crate::capture::Frame;

/// Result of [`FrameBuffer::push`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Buffer was full; the frame was discarded
    Dropped,
}

/// Snapshot of buffer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub pushed: u64,
    pub dropped: u64,
    pub popped: u64,
}

#[derive(Default)]
struct Stats {
    pushed: AtomicU64,
    dropped: AtomicU64,
    popped: AtomicU64,
}

/// Producer half. Owned by the capture loop for one generation.
pub struct FrameBuffer {
    tx: Sender<Frame>,
    // Kept so `close` can discard whatever the workers never claimed.
    rx: Receiver<Frame>,
    capacity: usize,
    stats: Arc<CachePadded<Stats>>,
}

/// Consumer half. Cloned into every sender worker.
#[derive(Clone)]
pub struct FrameConsumer {
    rx: Receiver<Frame>,
    stats: Arc<CachePadded<Stats>>,
}

impl FrameBuffer {
    /// `capacity` must be non-zero; a zero-capacity flume channel is a
    /// rendezvous and would drop every frame.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = flume::bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            stats: Arc::new(CachePadded::new(Stats::default())),
        }
    }

    /// Append `frame` unless the buffer is full. Never blocks.
    pub fn push(&self, frame: Frame) -> PushOutcome {
        match self.tx.try_send(frame) {
            Ok(()) => {
                self.stats.pushed.fetch_add(1, Ordering::Relaxed);
                PushOutcome::Queued
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("framecast_frames_dropped_total").increment(1);
                PushOutcome::Dropped
            }
        }
    }

    pub fn consumer(&self) -> FrameConsumer {
        FrameConsumer {
            rx: self.rx.clone(),
            stats: Arc::clone(&self.stats),
        }
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> BufferStats {
        load_stats(&self.stats)
    }

    /// End of generation: discard pending frames and disconnect consumers.
    ///
    /// Every worker blocked in [`FrameConsumer::pop`] wakes with `None`.
    /// Returns the number of frames discarded.
    pub fn close(self) -> usize {
        let discarded = self.rx.drain().count();
        debug!(discarded, "Frame buffer closed");
        // Dropping the only sender disconnects the channel.
        drop(self.tx);
        discarded
    }
}

impl FrameConsumer {
    /// Block until a frame is available and take the oldest one.
    ///
    /// Returns `None` once the producer side has been closed or dropped.
    pub fn pop(&self) -> Option<Frame> {
        let frame = self.rx.recv().ok()?;
        self.stats.popped.fetch_add(1, Ordering::Relaxed);
        Some(frame)
    }

    /// Non-blocking [`pop`](Self::pop)
    pub fn try_pop(&self) -> Option<Frame> {
        let frame = self.rx.try_recv().ok()?;
        self.stats.popped.fetch_add(1, Ordering::Relaxed);
        Some(frame)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// True once the producer half is gone
    pub fn is_closed(&self) -> bool {
        self.rx.is_disconnected()
    }

    pub fn stats(&self) -> BufferStats {
        load_stats(&self.stats)
    }
}

fn load_stats(stats: &Stats) -> BufferStats {
    BufferStats {
        pushed: stats.pushed.load(Ordering::Relaxed),
        dropped: stats.dropped.load(Ordering::Relaxed),
        popped: stats.popped.load(Ordering::Relaxed),
    }
}
