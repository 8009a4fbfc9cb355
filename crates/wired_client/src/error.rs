use std::collections::BTreeMap;

use thiserror::Error;
use wired_common::ExceptionReport;

/// Errors surfaced by component proxies.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    /// The request never produced a decodable response.
    #[error("Transport failed: {0}")]
    Transport(String),

    /// The response body was not a valid component response.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The server reported exceptions for this request.
    #[error("Server reported {} exception(s)", .0.len())]
    Exceptions(BTreeMap<String, ExceptionReport>),

    /// The called method raised an exception.
    #[error("{0}")]
    Exception(ExceptionReport),

    /// Readonly properties can only be changed by the server.
    #[error("Property {0} is readonly")]
    Readonly(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}
