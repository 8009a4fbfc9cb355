use serde::{de::DeserializeOwned, Serialize};

/// Errors produced while turning wire messages into bytes and back.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode wire message: {0}")]
    Encode(serde_json::Error),
    #[error("failed to decode wire message: {0}")]
    Decode(serde_json::Error),
    #[error("wire message is empty")]
    Empty,
}

/// JSON codec used for request and response bodies.
///
/// Bodies are plain UTF-8 JSON documents; no framing is added because the
/// transport (HTTP) already delimits messages.
pub struct WireJsonCodec;

impl WireJsonCodec {
    pub fn encode<T: Serialize>(val: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(val).map_err(CodecError::Encode)
    }

    pub fn decode<T: DeserializeOwned>(val: &[u8]) -> Result<T, CodecError> {
        // Whitespace-only bodies are what a dropped connection usually leaves behind.
        if val.iter().all(u8::is_ascii_whitespace) {
            return Err(CodecError::Empty);
        }

        serde_json::from_slice(val).map_err(CodecError::Decode)
    }
}
