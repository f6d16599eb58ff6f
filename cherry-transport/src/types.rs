//! Shared types for the transport layer

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::protocol::timing;

/// Device information, available from any open transport
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportDeviceInfo {
    /// USB Vendor ID
    pub vid: u16,
    /// USB Product ID
    pub pid: u16,
    /// USB interface number the vendor protocol runs on
    pub interface: i32,
    /// Device path or identifier (transport-specific)
    pub device_path: String,
    /// Serial number if available
    pub serial: Option<String>,
    /// Product name if available
    pub product_name: Option<String>,
}

/// A device found during discovery, not yet opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Device information
    pub info: TransportDeviceInfo,
}

/// Checksum algorithm used by a device family
///
/// All variants operate on the byte range chosen by the [`FrameLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChecksumType {
    /// `(seed + sum(bytes)) mod 256`
    Sum8 { seed: u8 },
    /// `seed ^ b0 ^ b1 ^ ...`
    Xor8 { seed: u8 },
    /// `255 - (sum(bytes) mod 256)`
    Complement8,
    /// `(seed + sum(bytes)) mod 65536`, stored little endian
    Sum16Le { seed: u16 },
}

impl ChecksumType {
    /// Number of bytes the checksum occupies in a frame
    pub const fn width(self) -> usize {
        match self {
            ChecksumType::Sum16Le { .. } => 2,
            _ => 1,
        }
    }
}

/// Byte layout of one report frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameLayout {
    /// `[header][opcode][part][len][payload..pad][checksum]`
    ///
    /// The checksum trails the frame and covers every byte before it.
    Sequenced,
    /// `[header][checksum][opcode][payload..pad]`
    ///
    /// The checksum follows the header and covers every byte after it.
    /// There is no part index or length on the wire.
    ChecksumLeading,
}

/// How the device acknowledges a written frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    /// Responses are frames: decoded, opcode-matched and status-checked
    Framed,
    /// Any report read back counts as the acknowledgement; its raw bytes
    /// are handed to the caller untouched
    Unchecked,
}

/// Static protocol parameters for one device family
///
/// Built once per device session and shared read-only (usually behind an
/// `Arc`) by the codec, segmenter and transaction engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// Family name, used for logging and device database lookups
    pub family: String,
    /// Fixed size of every report written to and read from the device
    pub report_size: usize,
    /// Largest payload carried by a single frame
    pub max_payload_per_frame: usize,
    /// Constant marker bytes at the start of every frame
    pub header: Vec<u8>,
    pub layout: FrameLayout,
    pub checksum: ChecksumType,
    /// Part index of the first frame of a segmented command (0 or 1)
    pub part_index_start: u8,
    /// Part index carried by the final frame ("no more parts")
    pub last_part_marker: u8,
    pub ack: AckPolicy,
    /// Resend the whole frame sequence on retry instead of the last unacked frame
    pub restart_sequence_on_retry: bool,
    /// Failed attempts tolerated by one transaction
    pub retry_budget: u32,
    /// Per-read timeout in milliseconds
    pub timeout_ms: u64,
}

impl Capability {
    /// Bytes of every frame not available to the payload
    pub fn overhead(&self) -> usize {
        let fixed = match self.layout {
            // opcode + part + len
            FrameLayout::Sequenced => 3,
            // opcode
            FrameLayout::ChecksumLeading => 1,
        };
        self.header.len() + fixed + self.checksum.width()
    }

    /// Default per-read timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Number of frames a single command may be split into
    pub fn max_parts(&self) -> usize {
        // start..marker are data parts, the marker itself closes the sequence
        self.last_part_marker.saturating_sub(self.part_index_start) as usize + 1
    }

    /// Check the whole descriptor: frame geometry, part numbering and retry budget
    pub fn validate(&self) -> Result<(), ProtocolError> {
        self.validate_layout()?;
        let invalid = |msg: String| Err(ProtocolError::InvalidCapability(msg));

        if self.part_index_start >= self.last_part_marker {
            return invalid(format!(
                "{}: part start {} is not below last-part marker {}",
                self.family, self.part_index_start, self.last_part_marker
            ));
        }
        if self.retry_budget == 0 {
            return invalid(format!("{}: retry budget is zero", self.family));
        }
        Ok(())
    }

    /// Check that the descriptor describes a frame the codec can build
    pub fn validate_layout(&self) -> Result<(), ProtocolError> {
        let invalid = |msg: String| Err(ProtocolError::InvalidCapability(msg));

        if self.header.is_empty() {
            return invalid(format!("{}: header marker is empty", self.family));
        }
        if self.max_payload_per_frame == 0 {
            return invalid(format!("{}: max_payload_per_frame is zero", self.family));
        }
        if self.overhead() + self.max_payload_per_frame > self.report_size {
            return invalid(format!(
                "{}: {} payload bytes + {} overhead exceed report size {}",
                self.family,
                self.max_payload_per_frame,
                self.overhead(),
                self.report_size
            ));
        }
        if self.layout == FrameLayout::Sequenced && self.max_payload_per_frame > u8::MAX as usize {
            return invalid(format!(
                "{}: length field cannot describe {} bytes",
                self.family, self.max_payload_per_frame
            ));
        }
        Ok(())
    }
}

impl Default for Capability {
    fn default() -> Self {
        Self {
            family: "generic".to_string(),
            report_size: 64,
            max_payload_per_frame: 58,
            header: vec![0x04],
            layout: FrameLayout::Sequenced,
            checksum: ChecksumType::Sum8 { seed: 0 },
            part_index_start: 0,
            last_part_marker: 0xFF,
            ack: AckPolicy::Framed,
            restart_sequence_on_retry: false,
            retry_budget: timing::DEFAULT_RETRY_BUDGET,
            timeout_ms: timing::DEFAULT_TIMEOUT_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capability_is_valid() {
        let cap = Capability::default();
        assert!(cap.validate().is_ok());
        assert_eq!(cap.overhead(), 5);
        assert_eq!(cap.timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn test_checksum_leading_overhead() {
        let cap = Capability {
            layout: FrameLayout::ChecksumLeading,
            checksum: ChecksumType::Sum16Le { seed: 0 },
            max_payload_per_frame: 60,
            ..Default::default()
        };
        assert_eq!(cap.overhead(), 4);
        assert!(cap.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_oversized_payload() {
        let cap = Capability {
            max_payload_per_frame: 60,
            ..Default::default()
        };
        assert!(matches!(
            cap.validate(),
            Err(ProtocolError::InvalidCapability(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_part_range() {
        let cap = Capability {
            part_index_start: 1,
            last_part_marker: 1,
            ..Default::default()
        };
        assert!(cap.validate().is_err());
        // part numbering does not affect the frame geometry
        assert!(cap.validate_layout().is_ok());

        let cap = Capability {
            header: Vec::new(),
            ..Default::default()
        };
        assert!(cap.validate().is_err());
    }

    #[test]
    fn test_max_parts() {
        let cap = Capability {
            part_index_start: 1,
            last_part_marker: 4,
            ..Default::default()
        };
        assert_eq!(cap.max_parts(), 4);
    }

    #[test]
    fn test_capability_serde() {
        let json = r#"{
            "family": "test",
            "report_size": 64,
            "max_payload_per_frame": 60,
            "header": [4],
            "layout": "checksum_leading",
            "checksum": { "kind": "sum16_le", "seed": 0 },
            "part_index_start": 0,
            "last_part_marker": 255,
            "ack": "unchecked",
            "restart_sequence_on_retry": false,
            "retry_budget": 3,
            "timeout_ms": 1000
        }"#;
        let cap: Capability = serde_json::from_str(json).unwrap();
        assert_eq!(cap.checksum, ChecksumType::Sum16Le { seed: 0 });
        assert_eq!(cap.layout, FrameLayout::ChecksumLeading);
        assert_eq!(cap.ack, AckPolicy::Unchecked);
        assert!(cap.validate().is_ok());
    }
}
