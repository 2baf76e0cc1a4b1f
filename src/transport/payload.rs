use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

use crate::capture::Frame;
use crate::TransportError;

/// Wire message: `{"image": <base64 JPEG>, "key": <shared secret>}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payload {
    pub image: String,
    pub key: String,
}

impl Payload {
    pub fn encode(frame: &Frame, key: &str) -> Self {
        Self {
            image: STANDARD.encode(&frame.data),
            key: key.to_owned(),
        }
    }

    pub fn to_json(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::Protocol(e.to_string()))
    }
}
