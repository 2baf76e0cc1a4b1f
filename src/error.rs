use thiserror::Error;

/// Failures talking to the stream endpoint
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("handshake rejected with HTTP status {0}")]
    BadStatus(u16),
    #[error("broken pipe")]
    BrokenPipe,
    #[error("connection reset by peer")]
    ConnectionReset,
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Failures acquiring frames from the capture source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no suitable capture device found")]
    NoDevice,
    #[error("unsupported capture setting: {0}")]
    Unsupported(String),
    #[error("capture I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}
