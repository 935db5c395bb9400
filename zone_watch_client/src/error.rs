//! Error types for the Zone Watch client

use thiserror::Error;
use zone_watch::ZoneError;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The remote service could not be reached, or the connection broke.
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with something other than 200.
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Zone(#[from] ZoneError),
}

impl From<url::ParseError> for ClientError {
    fn from(e: url::ParseError) -> Self {
        ClientError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
