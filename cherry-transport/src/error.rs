//! Transport and protocol error types

use thiserror::Error;

/// Errors raised by a raw report transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Communication timeout")]
    Timeout,

    #[error("Short transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer { expected: usize, actual: usize },

    #[error("HID permission denied: {0}")]
    PermissionDenied(String),

    #[error("HID error: {0}")]
    Hid(String),
}

impl TransportError {
    /// Whether a transaction may recover from this error by trying again
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            TransportError::Disconnected
                | TransportError::PermissionDenied(_)
                | TransportError::DeviceNotFound(_)
        )
    }
}

impl From<hidapi::HidError> for TransportError {
    fn from(e: hidapi::HidError) -> Self {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("EPERM") || msg.contains("EACCES") {
            TransportError::PermissionDenied(msg)
        } else if msg.contains("No such device") || msg.contains("ENODEV") {
            TransportError::Disconnected
        } else {
            TransportError::Hid(msg)
        }
    }
}

/// Why a frame failed to decode
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFault {
    #[error("frame is {actual} bytes, expected {expected}")]
    Size { expected: usize, actual: usize },

    #[error("header marker mismatch")]
    Marker,

    #[error("declared length {declared} exceeds {max}")]
    Length { declared: usize, max: usize },

    #[error("checksum mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    Checksum { expected: u16, actual: u16 },
}

/// The failure that consumed a retry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    #[error("timeout")]
    Timeout,

    #[error("invalid frame: {0}")]
    InvalidFrame(FrameFault),

    #[error("unexpected opcode: expected 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedOpcode { expected: u8, actual: u8 },

    /// Reply for a different part than the one just sent, e.g. a stale ack
    #[error("unexpected part: expected 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedPart { expected: u8, actual: u8 },

    #[error("device busy (status 0x{code:02X})")]
    DeviceBusy { code: u8 },

    #[error("response ended after {received} parts without a terminal part")]
    IncompleteSequence { received: usize },

    #[error("transport: {0}")]
    Transport(TransportError),
}

/// Errors surfaced by the codec, segmenter and transaction engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Payload of {len} bytes exceeds limit of {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Invalid frame: {0}")]
    InvalidFrame(FrameFault),

    #[error("Out of order part: expected {expected}, got {got}")]
    OutOfOrderPart { expected: u8, got: u8 },

    #[error("Incomplete sequence: {received} parts without terminal part")]
    IncompleteSequence { received: usize },

    #[error("Length mismatch: declared {declared}, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Device reported error 0x{code:02X}")]
    DeviceReportedError { code: u8 },

    #[error("Retry budget exhausted, last failure: {last_cause}")]
    RetryBudgetExhausted { last_cause: FailureCause },

    #[error("Invalid capability: {0}")]
    InvalidCapability(String),
}

impl From<FrameFault> for ProtocolError {
    fn from(fault: FrameFault) -> Self {
        ProtocolError::InvalidFrame(fault)
    }
}
