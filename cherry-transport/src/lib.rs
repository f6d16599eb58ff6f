//! Transport and protocol layer for Cherry RGB keyboard communication
//!
//! This crate turns logical commands into framed, checksummed HID reports
//! and drives the request/response exchange with the keyboard:
//!
//! ```text
//! [Command Catalogue]          ← opcode + payload + response shape
//!          |
//! [TransactionEngine]          ← retries, timeouts, ack/response matching
//!          |
//! [segment / frame codec]      ← pure encode/decode, no I/O
//!          |
//! [HidWiredTransport / Mock]   ← implements Transport (raw report I/O)
//! ```

pub mod device_registry;
pub mod error;
pub mod frame;
pub mod mock;
pub mod protocol;
pub mod segment;
pub mod transaction;
pub mod types;

mod discovery;
mod hid_wired;

pub use device_registry::{find_known_device, is_known_device, KnownDevice, KNOWN_DEVICES};
pub use error::{FailureCause, FrameFault, ProtocolError, TransportError};
pub use frame::{decode_frame, encode_frame, Frame};
pub use segment::{reassemble, segment, LengthDeclaration};
pub use transaction::{
    AcceptAll, DeviceStatus, Request, Response, ResponseShape, StatusPolicy, TransactionEngine,
};
pub use types::{
    AckPolicy, Capability, ChecksumType, DiscoveredDevice, FrameLayout, TransportDeviceInfo,
};

pub use discovery::HidDiscovery;
pub use hid_wired::{HidWiredTransport, ReportMode};

use std::time::Duration;

/// The raw report transport - all backends implement this
///
/// A transport only moves whole reports; framing, checksums and retries
/// live in [`TransactionEngine`]. Calls block the caller's thread, reads
/// for at most `timeout`.
pub trait Transport: Send {
    /// Write one report
    fn write_report(&mut self, report: &[u8]) -> Result<(), TransportError>;

    /// Read one report, waiting up to `timeout`
    ///
    /// Returns [`TransportError::Timeout`] when nothing arrives in time.
    fn read_report(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Get device information
    fn device_info(&self) -> &TransportDeviceInfo;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_report(&mut self, report: &[u8]) -> Result<(), TransportError> {
        (**self).write_report(report)
    }

    fn read_report(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        (**self).read_report(timeout)
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        (**self).device_info()
    }
}
