//! Command catalogue for the Cherry G80 RGB family
//!
//! Every report is `[0x04][checksum lo][checksum hi][opcode][payload..]`,
//! 64 bytes long. The checksum is the 16-bit sum of the opcode and the 60
//! payload bytes. Table writes and reads address a byte area through a
//! small header:
//!
//! ```text
//! [len][offset lo][offset hi][tag][data..len]
//! ```
//!
//! The keyboard answers every report on its interrupt endpoint, but the
//! answer's format is not known, so replies are accepted as-is.

use std::sync::Arc;

use cherry_transport::protocol::timing;
use cherry_transport::{
    AckPolicy, Capability, ChecksumType, DeviceStatus, Frame, FrameLayout, Response,
    StatusPolicy,
};
use tracing::debug;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::catalogue::{Command, CommandCatalogue};
use crate::error::KeyboardError;

/// Opcodes understood by the keyboard
pub mod cmd {
    pub const TRANSACTION_START: u8 = 0x01;
    pub const TRANSACTION_END: u8 = 0x02;
    /// Sent with `[0x22]` before the state reads; purpose unknown
    pub const UNKNOWN_03: u8 = 0x03;
    /// Sent with `[0x01]` then `[0x19]` after clearing the custom table
    pub const UNKNOWN_05: u8 = 0x05;
    pub const SET_ANIMATION: u8 = 0x06;
    /// Paged read of the custom color table
    pub const READ_CUSTOM_LED: u8 = 0x07;
    pub const SET_CUSTOM_LED: u8 = 0x0B;
    /// Paged read of a one-byte-per-key table
    pub const READ_KEY_TABLE: u8 = 0x1B;
}

/// Device family name
pub const FAMILY: &str = "cherry-g80";

/// Report size, including the report ID
pub const REPORT_SIZE: usize = 64;

/// Payload bytes after the opcode
pub const PAYLOAD_SIZE: usize = 60;

/// Tag byte of writes to the animation area
pub const ANIMATION_TAG: u8 = 0x55;

/// Tag byte of writes to the custom color table
pub const CUSTOM_LED_TAG: u8 = 0x00;

/// Offset of the "animation active" flag in the animation area
pub const ANIMATION_COMMIT_OFFSET: u16 = 0x18;

/// Largest data block after a table header
pub const MAX_TABLE_DATA: usize = PAYLOAD_SIZE - std::mem::size_of::<TableHeader>();

/// Capability descriptor of the G80 family
pub fn capability() -> Capability {
    Capability {
        family: FAMILY.to_string(),
        report_size: REPORT_SIZE,
        max_payload_per_frame: PAYLOAD_SIZE,
        header: vec![0x04],
        layout: FrameLayout::ChecksumLeading,
        checksum: ChecksumType::Sum16Le { seed: 0 },
        part_index_start: 0,
        last_part_marker: 0xFF,
        ack: AckPolicy::Unchecked,
        restart_sequence_on_retry: false,
        retry_budget: timing::DEFAULT_RETRY_BUDGET,
        timeout_ms: timing::DEFAULT_TIMEOUT_MS,
    }
}

/// Header of a table write
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct TableHeader {
    len: u8,
    offset_lo: u8,
    offset_hi: u8,
    tag: u8,
}

impl TableHeader {
    pub fn new(len: usize, offset: u16, tag: u8) -> Result<Self, KeyboardError> {
        if len > MAX_TABLE_DATA {
            return Err(KeyboardError::InvalidParameter(format!(
                "table write of {len} bytes exceeds {MAX_TABLE_DATA}"
            )));
        }
        let [offset_lo, offset_hi] = offset.to_le_bytes();
        Ok(Self {
            len: len as u8,
            offset_lo,
            offset_hi,
            tag,
        })
    }

    pub fn offset(&self) -> u16 {
        u16::from_le_bytes([self.offset_lo, self.offset_hi])
    }
}

/// Request of a paged table read
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct PageRequest {
    len: u8,
    offset_lo: u8,
    offset_hi: u8,
}

impl PageRequest {
    pub fn new(len: u8, offset: u16) -> Self {
        let [offset_lo, offset_hi] = offset.to_le_bytes();
        Self {
            len,
            offset_lo,
            offset_hi,
        }
    }
}

/// Logical operations of the G80 family
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CherryOperation {
    BeginTransaction,
    EndTransaction,
    /// Write `data` into the animation area at `offset`
    WriteAnimation { offset: u16, data: Vec<u8> },
    /// Write `data` into the custom color table at `offset`
    WriteCustomLeds { offset: u16, data: Vec<u8> },
    /// Read `len` bytes at `offset` with a paged read opcode
    ReadPaged { opcode: u8, offset: u16, len: u8 },
    /// Any other opcode, payload passed through
    Raw { opcode: u8, payload: Vec<u8> },
}

/// Result of a G80 operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalResponse {
    /// Acknowledged
    Done,
    /// Raw reply report
    Data(Vec<u8>),
}

impl LogicalResponse {
    pub fn into_data(self) -> Option<Vec<u8>> {
        match self {
            LogicalResponse::Data(data) => Some(data),
            LogicalResponse::Done => None,
        }
    }
}

/// Catalogue for G80-3000N RGB and compatible boards
#[derive(Debug, Clone)]
pub struct CherryCatalogue {
    capability: Arc<Capability>,
}

impl Default for CherryCatalogue {
    fn default() -> Self {
        Self::new()
    }
}

impl CherryCatalogue {
    pub fn new() -> Self {
        Self {
            capability: Arc::new(capability()),
        }
    }

    /// Use a tuned descriptor, e.g. with a device-specific timeout
    pub fn with_capability(capability: Capability) -> Result<Self, KeyboardError> {
        capability.validate()?;
        if capability.family != FAMILY {
            return Err(KeyboardError::InvalidParameter(format!(
                "capability family {:?} is not {FAMILY}",
                capability.family
            )));
        }
        Ok(Self {
            capability: Arc::new(capability),
        })
    }

    fn table_write(offset: u16, tag: u8, data: &[u8]) -> Result<Vec<u8>, KeyboardError> {
        let header = TableHeader::new(data.len(), offset, tag)?;
        let mut payload = Vec::with_capacity(std::mem::size_of::<TableHeader>() + data.len());
        payload.extend_from_slice(header.as_bytes());
        payload.extend_from_slice(data);
        Ok(payload)
    }
}

impl StatusPolicy for CherryCatalogue {
    fn inspect<'a>(&self, frame: &'a Frame) -> (DeviceStatus, &'a [u8]) {
        // no status byte is known for this family
        (DeviceStatus::Ok, &frame.payload)
    }
}

impl CommandCatalogue for CherryCatalogue {
    type Operation = CherryOperation;
    type Output = LogicalResponse;

    fn capability(&self) -> Arc<Capability> {
        Arc::clone(&self.capability)
    }

    fn encode(&self, op: &CherryOperation) -> Result<Command, KeyboardError> {
        let command = match op {
            CherryOperation::BeginTransaction => Command::ack(cmd::TRANSACTION_START, Vec::new()),
            CherryOperation::EndTransaction => Command::ack(cmd::TRANSACTION_END, Vec::new()),
            CherryOperation::WriteAnimation { offset, data } => Command::ack(
                cmd::SET_ANIMATION,
                Self::table_write(*offset, ANIMATION_TAG, data)?,
            ),
            CherryOperation::WriteCustomLeds { offset, data } => Command::ack(
                cmd::SET_CUSTOM_LED,
                Self::table_write(*offset, CUSTOM_LED_TAG, data)?,
            ),
            CherryOperation::ReadPaged {
                opcode,
                offset,
                len,
            } => Command::data(*opcode, PageRequest::new(*len, *offset).as_bytes()),
            CherryOperation::Raw { opcode, payload } => {
                if payload.len() > PAYLOAD_SIZE {
                    return Err(KeyboardError::InvalidParameter(format!(
                        "raw payload of {} bytes exceeds {PAYLOAD_SIZE}",
                        payload.len()
                    )));
                }
                Command::data(*opcode, payload.clone())
            }
        };
        debug!("Encoded {:?} as opcode 0x{:02X}", op, command.opcode);
        Ok(command)
    }

    fn interpret(
        &self,
        op: &CherryOperation,
        response: Response,
    ) -> Result<LogicalResponse, KeyboardError> {
        match op {
            CherryOperation::ReadPaged { .. } | CherryOperation::Raw { .. } => {
                if response.payload.is_empty() {
                    return Err(KeyboardError::UnexpectedResponse(format!(
                        "empty reply to opcode 0x{:02X}",
                        response.opcode
                    )));
                }
                Ok(LogicalResponse::Data(response.payload))
            }
            _ => Ok(LogicalResponse::Done),
        }
    }
}
