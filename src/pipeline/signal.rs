use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Raised by any sender worker whose connection fails; read by the capture
/// loop. Never reset: each generation gets a fresh signal.
#[derive(Debug, Clone, Default)]
pub struct FailureSignal(Arc<AtomicBool>);

impl FailureSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for the caller that raised it first
    pub fn raise(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Process-wide stop request, set from the signal handler
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Sleep for `duration`, returning early (with `true`) on shutdown
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_triggered() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(SHUTDOWN_POLL.min(deadline - now));
        }
    }
}
