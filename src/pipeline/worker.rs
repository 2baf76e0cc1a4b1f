//! Sender worker: one connection, draining the shared frame buffer

use std::sync::Arc;

use tracing::{debug, warn};

use crate::pipeline::buffer::FrameConsumer;
use crate::pipeline::signal::FailureSignal;
use crate::transport::{Connector, Payload};
use crate::EndpointConfig;

/// Why a worker stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    ConnectFailed,
    SendFailed,
    /// The buffer was closed at generation end
    Cancelled,
}

pub struct SenderWorker {
    name: String,
    consumer: FrameConsumer,
    failure: FailureSignal,
    connector: Arc<dyn Connector>,
    endpoint: EndpointConfig,
}

impl SenderWorker {
    pub fn new(
        name: String,
        consumer: FrameConsumer,
        failure: FailureSignal,
        connector: Arc<dyn Connector>,
        endpoint: EndpointConfig,
    ) -> Self {
        Self {
            name,
            consumer,
            failure,
            connector,
            endpoint,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connect once, then pop, encode and send until the connection fails or
    /// the buffer is closed. Failures are never retried here.
    pub fn run(self) -> WorkerExit {
        let mut connection = match self.connector.connect(&self.endpoint) {
            Ok(connection) => connection,
            Err(e) => {
                warn!(worker = %self.name, "Unable to connect: {}", e);
                self.failure.raise();
                return WorkerExit::ConnectFailed;
            }
        };
        debug!(worker = %self.name, "Connected to {}", self.endpoint.url());

        while let Some(frame) = self.consumer.pop() {
            let payload = Payload::encode(&frame, &self.endpoint.key);
            if let Err(e) = connection.send(&payload) {
                warn!(worker = %self.name, "Send failed: {}", e);
                metrics::counter!("framecast_send_failures_total").increment(1);
                self.failure.raise();
                return WorkerExit::SendFailed;
            }
            metrics::counter!("framecast_frames_sent_total").increment(1);
            debug!(worker = %self.name, bytes = frame.len(), "Send");
        }

        debug!(worker = %self.name, "Frame buffer closed, stopping");
        WorkerExit::Cancelled
    }
}
