//! Frame codec
//!
//! Pure conversion between a [`Frame`] and the fixed-size report bytes
//! written to the device. Decoding is all-or-nothing: a report that fails
//! any check produces [`ProtocolError::InvalidFrame`] and none of its
//! content is returned.

use crate::error::{FrameFault, ProtocolError};
use crate::protocol::{calculate_checksum, read_checksum, write_checksum};
use crate::types::{Capability, FrameLayout};

/// One report's worth of protocol content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    /// Position within a segmented command, or the last-part marker
    pub part: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(opcode: u8, part: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode,
            part,
            payload: payload.into(),
        }
    }
}

/// Byte offsets of the fields inside one report
struct Offsets {
    checksum: usize,
    opcode: usize,
    part: usize,
    len: usize,
    payload: usize,
}

impl Offsets {
    fn of(cap: &Capability) -> Self {
        let h = cap.header.len();
        let width = cap.checksum.width();
        match cap.layout {
            FrameLayout::Sequenced => Self {
                checksum: cap.report_size - width,
                opcode: h,
                part: h + 1,
                len: h + 2,
                payload: h + 3,
            },
            FrameLayout::ChecksumLeading => Self {
                checksum: h,
                opcode: h + width,
                // no part or length bytes on the wire
                part: usize::MAX,
                len: usize::MAX,
                payload: h + width + 1,
            },
        }
    }

    /// Range of bytes covered by the checksum
    fn covered(&self, cap: &Capability) -> std::ops::Range<usize> {
        match cap.layout {
            FrameLayout::Sequenced => 0..self.checksum,
            FrameLayout::ChecksumLeading => self.opcode..cap.report_size,
        }
    }
}

/// Encode a frame into a zero-padded report of `cap.report_size` bytes
pub fn encode_frame(frame: &Frame, cap: &Capability) -> Result<Vec<u8>, ProtocolError> {
    cap.validate_layout()?;
    if frame.payload.len() > cap.max_payload_per_frame {
        return Err(ProtocolError::PayloadTooLarge {
            len: frame.payload.len(),
            max: cap.max_payload_per_frame,
        });
    }

    let at = Offsets::of(cap);
    let mut buf = vec![0u8; cap.report_size];
    buf[..cap.header.len()].copy_from_slice(&cap.header);
    buf[at.opcode] = frame.opcode;
    if cap.layout == FrameLayout::Sequenced {
        buf[at.part] = frame.part;
        buf[at.len] = frame.payload.len() as u8;
    }
    buf[at.payload..at.payload + frame.payload.len()].copy_from_slice(&frame.payload);

    let sum = calculate_checksum(&buf[at.covered(cap)], cap.checksum);
    let width = cap.checksum.width();
    write_checksum(&mut buf[at.checksum..at.checksum + width], sum, cap.checksum);
    Ok(buf)
}

/// Decode and validate a raw report
///
/// Checks run in order: descriptor layout, size, header marker, checksum,
/// declared length.
pub fn decode_frame(raw: &[u8], cap: &Capability) -> Result<Frame, ProtocolError> {
    cap.validate_layout()?;
    if raw.len() != cap.report_size {
        return Err(FrameFault::Size {
            expected: cap.report_size,
            actual: raw.len(),
        }
        .into());
    }
    if !raw.starts_with(&cap.header) {
        return Err(FrameFault::Marker.into());
    }

    let at = Offsets::of(cap);
    let width = cap.checksum.width();
    let expected = calculate_checksum(&raw[at.covered(cap)], cap.checksum);
    let actual = read_checksum(&raw[at.checksum..at.checksum + width], cap.checksum);
    if expected != actual {
        return Err(FrameFault::Checksum { expected, actual }.into());
    }

    match cap.layout {
        FrameLayout::Sequenced => {
            let declared = raw[at.len] as usize;
            if declared > cap.max_payload_per_frame {
                return Err(FrameFault::Length {
                    declared,
                    max: cap.max_payload_per_frame,
                }
                .into());
            }
            Ok(Frame::new(
                raw[at.opcode],
                raw[at.part],
                &raw[at.payload..at.payload + declared],
            ))
        }
        FrameLayout::ChecksumLeading => Ok(Frame::new(
            raw[at.opcode],
            cap.last_part_marker,
            &raw[at.payload..at.payload + cap.max_payload_per_frame],
        )),
    }
}
