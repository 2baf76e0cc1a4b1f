//! WebSocket transport over tungstenite (blocking, rustls for `wss`)

use std::io;
use std::net::TcpStream;

use tracing::{debug, info};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::transport::{Connection, Connector, Payload};
use crate::{EndpointConfig, TransportError};

#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(&self, endpoint: &EndpointConfig) -> Result<Box<dyn Connection>, TransportError> {
        let url = endpoint.url();
        debug!("Connecting to {}", url);

        let (socket, response) = tungstenite::connect(url.as_str()).map_err(classify)?;
        info!("Connected to {} (status {})", url, response.status());

        Ok(Box::new(WebSocketConnection { socket }))
    }
}

pub struct WebSocketConnection {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
}

impl Connection for WebSocketConnection {
    fn send(&mut self, payload: &Payload) -> Result<(), TransportError> {
        let body = payload.to_json()?;
        self.socket.send(Message::text(body)).map_err(classify)
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        // Best effort; the peer may already be gone.
        let _ = self.socket.close(None);
        let _ = self.socket.flush();
    }
}

/// Map tungstenite errors onto the transport taxonomy
fn classify(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Http(response) => TransportError::BadStatus(response.status().as_u16()),
        tungstenite::Error::Io(e) => match e.kind() {
            io::ErrorKind::BrokenPipe => TransportError::BrokenPipe,
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                TransportError::ConnectionReset
            }
            _ => TransportError::Connect(e.to_string()),
        },
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::ConnectionReset
        }
        tungstenite::Error::Url(e) => TransportError::Connect(e.to_string()),
        tungstenite::Error::Tls(e) => TransportError::Connect(e.to_string()),
        other => TransportError::Protocol(other.to_string()),
    }
}
