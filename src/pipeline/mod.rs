//! Frame buffer, sender workers and the generation/supervisor control loop

pub mod buffer;
pub mod generation;
pub mod pool;
pub mod signal;
pub mod supervisor;
pub mod worker;

pub use buffer::{BufferStats, FrameBuffer, FrameConsumer, PushOutcome};
pub use generation::{Generation, GenerationEnd, GenerationReport};
pub use pool::{PoolReport, WorkerPool};
pub use signal::{FailureSignal, Shutdown};
pub use supervisor::Supervisor;
pub use worker::{SenderWorker, WorkerExit};
