pub mod capture;
pub mod error;
pub mod pipeline;
pub mod transport;
pub mod utils;

use std::path::Path;
use std::time::Duration;

use capture::frame::PixelFormat;
use serde::{Deserialize, Serialize};

pub use error::{ConfigError, PipelineError, SourceError, TransportError};

/// System configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub endpoint: EndpointConfig,
    pub pipeline: PipelineConfig,
    /// Log every capture and send
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// V4L2 camera device
    V4l2,
    /// Synthetic moving gradient, no hardware needed
    Pattern,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub source: SourceKind,
    /// Empty path means auto-detect
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
    pub vflip: bool,
    pub hflip: bool,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
    /// Put the port into the stream URL; otherwise it is informational only
    pub include_port: bool,
    /// `wss` when true, `ws` otherwise
    pub secure: bool,
    pub stream_name: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub workers: usize,
    pub buffer_capacity: usize,
    pub restart_backoff_ms: u64,
    /// How long a finished generation waits for its workers to exit
    pub worker_join_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            endpoint: EndpointConfig::default(),
            pipeline: PipelineConfig::default(),
            debug: true,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::V4l2,
            device: String::new(),
            width: 640,
            height: 480,
            fps: 30,
            format: PixelFormat::Mjpeg,
            buffer_count: 4,
            vflip: false,
            hflip: false,
            jpeg_quality: 85,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 80,
            include_port: false,
            secure: true,
            stream_name: "STREAM".into(),
            key: "SECRET".into(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            buffer_capacity: 3,
            restart_backoff_ms: 3000,
            worker_join_grace_ms: 500,
        }
    }
}

impl EndpointConfig {
    /// WebSocket URL of the stream endpoint
    pub fn url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        if self.include_port {
            format!(
                "{}://{}:{}/ws/stream/{}/",
                scheme, self.host, self.port, self.stream_name
            )
        } else {
            format!("{}://{}/ws/stream/{}/", scheme, self.host, self.stream_name)
        }
    }
}

impl PipelineConfig {
    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }

    pub fn worker_join_grace(&self) -> Duration {
        Duration::from_millis(self.worker_join_grace_ms)
    }
}

impl Config {
    /// Log filter used when `RUST_LOG` is unset
    pub fn log_directive(&self) -> &'static str {
        if self.debug {
            "framecast=debug"
        } else {
            "framecast=info"
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.workers == 0 {
            return Err(ConfigError::Invalid("pipeline.workers must be at least 1".into()));
        }
        if self.pipeline.buffer_capacity == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.buffer_capacity must be at least 1".into(),
            ));
        }
        if self.endpoint.host.is_empty() {
            return Err(ConfigError::Invalid("endpoint.host must not be empty".into()));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(ConfigError::Invalid("capture resolution must be non-zero".into()));
        }
        if self.capture.fps == 0 {
            return Err(ConfigError::Invalid("capture.fps must be at least 1".into()));
        }
        Ok(())
    }
}

/// Load configuration: defaults, then the optional file at `path`, then
/// `FRAMECAST_*` environment variables (`__` separates nested keys).
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(config::File::from(path.as_ref()).required(false))
        .add_source(
            config::Environment::with_prefix("FRAMECAST")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: Config = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}
