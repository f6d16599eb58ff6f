//! Keyboard interface error types

use cherry_transport::{ProtocolError, TransportError};
use thiserror::Error;

/// Errors from keyboard operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyboardError {
    /// Framing, transaction or transport failure
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Invalid parameter value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No catalogue or definition for the requested device
    #[error("Not found: {0}")]
    NotFound(String),

    /// Device returned unexpected response
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<TransportError> for KeyboardError {
    fn from(e: TransportError) -> Self {
        KeyboardError::Protocol(ProtocolError::Transport(e))
    }
}
