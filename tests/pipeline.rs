//! End-to-end pipeline tests
//!
//! Drive generations through the public API with scripted sources and
//! connectors; no camera or network is touched.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use framecast::capture::{Frame, FrameSource, SourceProvider, StopReason};
use framecast::pipeline::{
    FailureSignal, FrameBuffer, GenerationEnd, PushOutcome, SenderWorker, Shutdown, Supervisor,
    WorkerExit, WorkerPool,
};
use framecast::transport::{Connection, Connector, Payload};
use framecast::{CaptureConfig, Config, EndpointConfig, SourceError, TransportError};

/// Source that numbers its frames and paces them slightly
struct Numbered {
    next: u32,
}

impl FrameSource for Numbered {
    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        thread::sleep(Duration::from_millis(1));
        self.next += 1;
        Ok(Frame::new(self.next.to_be_bytes().to_vec()))
    }
}

#[derive(Default)]
struct NumberedProvider {
    opens: Mutex<Vec<Instant>>,
    stop_after: Option<(usize, Shutdown)>,
}

impl SourceProvider for NumberedProvider {
    fn open(&self, _: &CaptureConfig) -> Result<Box<dyn FrameSource>, SourceError> {
        let mut opens = self.opens.lock().unwrap();
        opens.push(Instant::now());
        if let Some((limit, shutdown)) = &self.stop_after {
            if opens.len() >= *limit {
                shutdown.trigger();
            }
        }
        Ok(Box::new(Numbered { next: 0 }))
    }
}

/// Each connection fails on its `fail_at`-th send (1-based), if set.
/// Successful payloads are collected across all connections.
struct Endpoint {
    fail_at: Option<usize>,
    connects: AtomicUsize,
    delivered: Arc<Mutex<Vec<Payload>>>,
}

impl Endpoint {
    fn new(fail_at: Option<usize>) -> Self {
        Self {
            fail_at,
            connects: AtomicUsize::new(0),
            delivered: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

struct EndpointConnection {
    fail_at: Option<usize>,
    calls: usize,
    delivered: Arc<Mutex<Vec<Payload>>>,
}

impl Connector for Endpoint {
    fn connect(&self, _: &EndpointConfig) -> Result<Box<dyn Connection>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(EndpointConnection {
            fail_at: self.fail_at,
            calls: 0,
            delivered: Arc::clone(&self.delivered),
        }))
    }
}

impl Connection for EndpointConnection {
    fn send(&mut self, payload: &Payload) -> Result<(), TransportError> {
        self.calls += 1;
        if Some(self.calls) == self.fail_at {
            return Err(TransportError::ConnectionReset);
        }
        self.delivered.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

fn shared_config(workers: usize, backoff_ms: u64) -> Arc<ArcSwap<Config>> {
    let mut config = Config::default();
    config.pipeline.workers = workers;
    config.pipeline.buffer_capacity = 3;
    config.pipeline.restart_backoff_ms = backoff_ms;
    config.pipeline.worker_join_grace_ms = 2000;
    Arc::new(ArcSwap::from_pointee(config))
}

#[test]
fn burst_without_consumers_keeps_first_three() {
    let buffer = FrameBuffer::new(3);
    let consumer = buffer.consumer();

    let dropped = (1..=5u8)
        .map(|n| buffer.push(Frame::new(vec![n])))
        .filter(|o| *o == PushOutcome::Dropped)
        .count();

    assert_eq!(dropped, 2);
    let kept: Vec<u8> = std::iter::from_fn(|| consumer.try_pop())
        .map(|f| f.data[0])
        .collect();
    assert_eq!(kept, vec![1, 2, 3]);
}

#[test]
fn every_frame_is_delivered_once_without_overflow() {
    let endpoint = Arc::new(Endpoint::new(None));
    let buffer = FrameBuffer::new(3);
    let failure = FailureSignal::new();
    let pool = WorkerPool::spawn(
        1,
        3,
        &buffer.consumer(),
        &failure,
        endpoint.clone(),
        &EndpointConfig::default(),
    )
    .unwrap();

    let mut pushed = 0u32;
    while pushed < 300 {
        if buffer.len() < buffer.capacity() {
            assert_eq!(
                buffer.push(Frame::new(pushed.to_be_bytes().to_vec())),
                PushOutcome::Queued
            );
            pushed += 1;
        } else {
            thread::yield_now();
        }
    }
    while !buffer.is_empty() {
        thread::yield_now();
    }
    let deadline = Instant::now() + Duration::from_secs(5);
    while endpoint.delivered.lock().unwrap().len() < 300 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    buffer.close();
    let report = pool.shutdown(Duration::from_secs(2));

    assert_eq!(report.exits, vec![WorkerExit::Cancelled; 3]);
    let delivered = endpoint.delivered.lock().unwrap();
    let mut images: Vec<_> = delivered.iter().map(|p| p.image.clone()).collect();
    images.sort();
    images.dedup();
    assert_eq!(images.len(), 300);
    assert!(delivered.iter().all(|p| p.key == "SECRET"));
}

#[test]
fn single_worker_delivers_in_capture_order() {
    let endpoint = Arc::new(Endpoint::new(None));
    let buffer = FrameBuffer::new(3);
    let worker = SenderWorker::new(
        "sender-order".into(),
        buffer.consumer(),
        FailureSignal::new(),
        endpoint.clone(),
        EndpointConfig::default(),
    );
    let handle = thread::spawn(move || worker.run());

    let mut pushed = 0u32;
    while pushed < 50 {
        if buffer.push(Frame::new(pushed.to_be_bytes().to_vec())) == PushOutcome::Queued {
            pushed += 1;
        } else {
            thread::yield_now();
        }
    }
    while !buffer.is_empty() || endpoint.delivered.lock().unwrap().len() < 50 {
        thread::yield_now();
    }
    buffer.close();
    assert_eq!(handle.join().unwrap(), WorkerExit::Cancelled);

    let expected: Vec<_> = (0..50u32)
        .map(|n| Payload::encode(&Frame::new(n.to_be_bytes().to_vec()), "SECRET"))
        .collect();
    assert_eq!(*endpoint.delivered.lock().unwrap(), expected);
}

#[test]
fn send_failure_cascades_to_restart_with_fresh_generation() {
    let shutdown = Shutdown::new();
    let provider = NumberedProvider {
        opens: Mutex::new(Vec::new()),
        stop_after: Some((2, shutdown.clone())),
    };
    let endpoint = Arc::new(Endpoint::new(Some(2)));
    let supervisor = Supervisor::new(shared_config(1, 60), provider, endpoint.clone(), shutdown);

    let first = supervisor.run_generation(1);
    assert!(matches!(
        first.reason,
        GenerationEnd::Stopped(StopReason::TransportFailed)
    ));
    assert_eq!(first.pool.exits, vec![WorkerExit::SendFailed]);
    assert_eq!(endpoint.delivered.lock().unwrap().len(), 1);

    // The next generation starts from nothing and connects again.
    let second = supervisor.run_generation(2);
    assert!(second.is_shutdown());
    assert_eq!(endpoint.connects.load(Ordering::SeqCst), 2);
}

#[test]
fn supervisor_waits_backoff_between_generations() {
    let shutdown = Shutdown::new();
    let provider = Arc::new(NumberedProvider {
        opens: Mutex::new(Vec::new()),
        stop_after: Some((3, shutdown.clone())),
    });

    struct Shared(Arc<NumberedProvider>);
    impl SourceProvider for Shared {
        fn open(&self, config: &CaptureConfig) -> Result<Box<dyn FrameSource>, SourceError> {
            self.0.open(config)
        }
    }

    let supervisor = Supervisor::new(
        shared_config(2, 80),
        Shared(Arc::clone(&provider)),
        Arc::new(Endpoint::new(Some(1))),
        shutdown,
    );
    assert_eq!(supervisor.run(), 3);

    let opens = provider.opens.lock().unwrap();
    assert_eq!(opens.len(), 3);
    for pair in opens.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(80));
    }
}

#[test]
fn connect_failures_restart_without_capturing_forever() {
    struct Refusing;
    impl Connector for Refusing {
        fn connect(&self, _: &EndpointConfig) -> Result<Box<dyn Connection>, TransportError> {
            Err(TransportError::BadStatus(401))
        }
    }

    let shutdown = Shutdown::new();
    let provider = NumberedProvider {
        opens: Mutex::new(Vec::new()),
        stop_after: None,
    };
    let supervisor = Supervisor::new(shared_config(4, 0), provider, Arc::new(Refusing), shutdown);

    let report = supervisor.run_generation(1);
    assert!(matches!(
        report.reason,
        GenerationEnd::Stopped(StopReason::TransportFailed)
    ));
    assert_eq!(report.pool.exits, vec![WorkerExit::ConnectFailed; 4]);
}

/// First connection ever made fails on its second send; every later
/// connection is healthy and counts its deliveries.
struct RecoversAfterFirst {
    connects: AtomicUsize,
    delivered: Arc<Mutex<Vec<Payload>>>,
    healthy_sends: Arc<AtomicUsize>,
}

struct RecoveringConnection {
    fail_at: Option<usize>,
    calls: usize,
    delivered: Arc<Mutex<Vec<Payload>>>,
    healthy_sends: Option<Arc<AtomicUsize>>,
}

impl Connector for RecoversAfterFirst {
    fn connect(&self, _: &EndpointConfig) -> Result<Box<dyn Connection>, TransportError> {
        let first = self.connects.fetch_add(1, Ordering::SeqCst) == 0;
        Ok(Box::new(RecoveringConnection {
            fail_at: first.then_some(2),
            calls: 0,
            delivered: Arc::clone(&self.delivered),
            healthy_sends: (!first).then(|| Arc::clone(&self.healthy_sends)),
        }))
    }
}

impl Connection for RecoveringConnection {
    fn send(&mut self, payload: &Payload) -> Result<(), TransportError> {
        self.calls += 1;
        if Some(self.calls) == self.fail_at {
            return Err(TransportError::BrokenPipe);
        }
        self.delivered.lock().unwrap().push(payload.clone());
        if let Some(count) = &self.healthy_sends {
            count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Frames are `[generation, seq_hi, seq_lo]`. From the second generation
/// on, shutdown is requested once enough healthy sends went through.
struct Tagged {
    generation: u8,
    seq: u16,
    produced: Arc<AtomicUsize>,
    healthy_sends: Arc<AtomicUsize>,
    shutdown: Shutdown,
}

impl FrameSource for Tagged {
    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        thread::sleep(Duration::from_millis(1));
        if self.generation >= 2
            && (self.healthy_sends.load(Ordering::SeqCst) >= 5 || self.seq >= 2000)
        {
            self.shutdown.trigger();
        }
        self.seq += 1;
        self.produced.fetch_add(1, Ordering::SeqCst);
        let [hi, lo] = self.seq.to_be_bytes();
        Ok(Frame::new(vec![self.generation, hi, lo]))
    }
}

struct TaggedProvider {
    opens: AtomicUsize,
    /// Frame count of each generation's source, in open order
    produced: Arc<Mutex<Vec<Arc<AtomicUsize>>>>,
    healthy_sends: Arc<AtomicUsize>,
    shutdown: Shutdown,
}

impl SourceProvider for TaggedProvider {
    fn open(&self, _: &CaptureConfig) -> Result<Box<dyn FrameSource>, SourceError> {
        let generation = self.opens.fetch_add(1, Ordering::SeqCst) as u8 + 1;
        let produced = Arc::new(AtomicUsize::new(0));
        self.produced.lock().unwrap().push(Arc::clone(&produced));
        Ok(Box::new(Tagged {
            generation,
            seq: 0,
            produced,
            healthy_sends: Arc::clone(&self.healthy_sends),
            shutdown: self.shutdown.clone(),
        }))
    }
}

#[test]
fn generation_after_failure_streams_with_reset_signal_and_empty_buffer() {
    let shutdown = Shutdown::new();
    let healthy_sends = Arc::new(AtomicUsize::new(0));
    let connector = Arc::new(RecoversAfterFirst {
        connects: AtomicUsize::new(0),
        delivered: Arc::new(Mutex::new(Vec::new())),
        healthy_sends: Arc::clone(&healthy_sends),
    });
    let produced = Arc::new(Mutex::new(Vec::new()));
    let provider = TaggedProvider {
        opens: AtomicUsize::new(0),
        produced: Arc::clone(&produced),
        healthy_sends,
        shutdown: shutdown.clone(),
    };
    let delivered = Arc::clone(&connector.delivered);
    let supervisor = Supervisor::new(shared_config(1, 0), provider, connector, shutdown);

    let first = supervisor.run_generation(1);
    assert!(matches!(
        first.reason,
        GenerationEnd::Stopped(StopReason::TransportFailed)
    ));
    assert_eq!(first.pool.exits, vec![WorkerExit::SendFailed]);
    let after_failure = delivered.lock().unwrap().len();
    assert_eq!(after_failure, 1);

    // A carried-over failure signal would end this generation as
    // TransportFailed before any healthy send.
    let second = supervisor.run_generation(2);
    assert!(second.is_shutdown());
    assert_eq!(second.pool.exits, vec![WorkerExit::Cancelled]);

    let delivered = delivered.lock().unwrap();
    let fresh: Vec<_> = delivered[after_failure..].to_vec();
    assert!(fresh.len() >= 5);
    let second_gen_frames: Vec<_> = (1..=2001u16)
        .map(|seq| {
            let [hi, lo] = seq.to_be_bytes();
            Payload::encode(&Frame::new(vec![2, hi, lo]), "SECRET")
        })
        .collect();
    assert!(fresh.iter().all(|p| second_gen_frames.contains(p)));

    // Each buffer only ever saw its own generation's frames, so it
    // started out empty.
    for report in [&first, &second] {
        assert_eq!(report.buffer.pushed + report.buffer.dropped, report.captured);
    }
    let produced: Vec<u64> = produced
        .lock()
        .unwrap()
        .iter()
        .map(|count| count.load(Ordering::SeqCst) as u64)
        .collect();
    assert_eq!(produced, vec![first.captured, second.captured]);
}
