//! Delivery of encoded frames to the stream endpoint

pub mod payload;
pub mod websocket;

pub use payload::Payload;
pub use websocket::WebSocketConnector;

use crate::{EndpointConfig, TransportError};

/// One established connection, owned by a single sender worker
pub trait Connection: Send {
    fn send(&mut self, payload: &Payload) -> Result<(), TransportError>;
}

/// Establishes connections; shared by every worker of a generation
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, endpoint: &EndpointConfig) -> Result<Box<dyn Connection>, TransportError>;
}
