//! Segmentation of oversized payloads and reassembly of multi-part responses

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::types::Capability;

/// How a reassembled body declares its own length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LengthDeclaration {
    /// No declaration; the concatenated parts are the body
    #[default]
    None,
    /// The body starts with a little-endian u16 giving the length of the rest
    U16LePrefix,
}

/// Split `payload` into frames of at most `cap.max_payload_per_frame` bytes
///
/// A payload that fits one frame (including the empty payload) yields a
/// single frame carrying the last-part marker. Longer payloads are numbered
/// from `cap.part_index_start` upwards and the final frame carries the
/// marker.
pub fn segment(opcode: u8, payload: &[u8], cap: &Capability) -> Result<Vec<Frame>, ProtocolError> {
    let max = cap.max_payload_per_frame;
    if payload.len() <= max {
        return Ok(vec![Frame::new(opcode, cap.last_part_marker, payload)]);
    }

    let count = payload.len().div_ceil(max);
    if count > cap.max_parts() {
        return Err(ProtocolError::PayloadTooLarge {
            len: payload.len(),
            max: max * cap.max_parts(),
        });
    }

    Ok(payload
        .chunks(max)
        .enumerate()
        .map(|(i, chunk)| {
            let part = if i + 1 == count {
                cap.last_part_marker
            } else {
                cap.part_index_start + i as u8
            };
            Frame::new(opcode, part, chunk)
        })
        .collect())
}

/// Concatenate the payloads of an ordered frame sequence
///
/// The sequence must be `start, start+1, ..` followed by exactly one frame
/// carrying the last-part marker, or that marker frame alone.
pub fn reassemble(
    frames: &[Frame],
    cap: &Capability,
    declaration: LengthDeclaration,
) -> Result<Vec<u8>, ProtocolError> {
    let mut body = Vec::with_capacity(frames.len() * cap.max_payload_per_frame);
    let mut expected = cap.part_index_start;
    let mut terminated = false;

    for frame in frames {
        if terminated {
            // nothing may follow the terminal part
            return Err(ProtocolError::OutOfOrderPart {
                expected: cap.last_part_marker,
                got: frame.part,
            });
        }
        if frame.part == cap.last_part_marker {
            terminated = true;
        } else if frame.part == expected {
            expected = expected.wrapping_add(1);
        } else {
            return Err(ProtocolError::OutOfOrderPart {
                expected,
                got: frame.part,
            });
        }
        body.extend_from_slice(&frame.payload);
    }

    if !terminated {
        return Err(ProtocolError::IncompleteSequence {
            received: frames.len(),
        });
    }

    match declaration {
        LengthDeclaration::None => Ok(body),
        LengthDeclaration::U16LePrefix => {
            if body.len() < 2 {
                return Err(ProtocolError::LengthMismatch {
                    declared: 2,
                    actual: body.len(),
                });
            }
            let declared = u16::from_le_bytes([body[0], body[1]]) as usize;
            let actual = body.len() - 2;
            if declared != actual {
                return Err(ProtocolError::LengthMismatch { declared, actual });
            }
            Ok(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap(max: usize, start: u8) -> Capability {
        Capability {
            max_payload_per_frame: max,
            part_index_start: start,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_payload_is_single_marker_frame() {
        let frames = segment(0x10, &[], &cap(58, 0)).unwrap();
        assert_eq!(frames, vec![Frame::new(0x10, 0xFF, Vec::new())]);
    }

    #[test]
    fn test_exact_fit_is_single_frame() {
        let frames = segment(0x10, &[7; 58], &cap(58, 0)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].part, 0xFF);
    }

    #[test]
    fn test_segment_numbers_parts_from_start() {
        let payload: Vec<u8> = (0..200).map(|i| i as u8).collect();
        let frames = segment(0x20, &payload, &cap(50, 1)).unwrap();
        let parts: Vec<u8> = frames.iter().map(|f| f.part).collect();
        assert_eq!(parts, vec![1, 2, 3, 0xFF]);
        assert!(frames.iter().all(|f| f.opcode == 0x20 && f.payload.len() == 50));
    }

    #[test]
    fn test_segment_rejects_too_many_parts() {
        let small = Capability {
            max_payload_per_frame: 4,
            last_part_marker: 3,
            ..Default::default()
        };
        // parts 0, 1, 2 and the marker: at most 16 bytes
        assert_eq!(segment(0x01, &[0; 16], &small).unwrap().len(), 4);
        assert_eq!(
            segment(0x01, &[0; 17], &small),
            Err(ProtocolError::PayloadTooLarge { len: 17, max: 16 })
        );
    }

    #[test]
    fn test_reassemble_roundtrip() {
        let c = cap(58, 0);
        let payload: Vec<u8> = (0..150).map(|i| (i * 3) as u8).collect();
        let frames = segment(0x30, &payload, &c).unwrap();
        assert_eq!(reassemble(&frames, &c, LengthDeclaration::None).unwrap(), payload);
    }

    #[test]
    fn test_reassemble_rejects_missing_part() {
        let c = cap(58, 0);
        let frames = vec![
            Frame::new(0x30, 0, vec![1]),
            Frame::new(0x30, 2, vec![2]),
            Frame::new(0x30, 0xFF, vec![3]),
        ];
        assert_eq!(
            reassemble(&frames, &c, LengthDeclaration::None),
            Err(ProtocolError::OutOfOrderPart {
                expected: 1,
                got: 2
            })
        );
    }

    #[test]
    fn test_reassemble_rejects_repeated_part() {
        let c = cap(58, 1);
        let frames = vec![
            Frame::new(0x30, 1, vec![1]),
            Frame::new(0x30, 1, vec![1]),
            Frame::new(0x30, 0xFF, vec![3]),
        ];
        assert_eq!(
            reassemble(&frames, &c, LengthDeclaration::None),
            Err(ProtocolError::OutOfOrderPart {
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn test_reassemble_rejects_frames_after_terminal() {
        let c = cap(58, 0);
        let frames = vec![Frame::new(0x30, 0xFF, vec![1]), Frame::new(0x30, 0, vec![2])];
        assert!(matches!(
            reassemble(&frames, &c, LengthDeclaration::None),
            Err(ProtocolError::OutOfOrderPart { .. })
        ));
    }

    #[test]
    fn test_reassemble_without_terminal_is_incomplete() {
        let c = cap(58, 0);
        let frames = vec![Frame::new(0x30, 0, vec![1]), Frame::new(0x30, 1, vec![2])];
        assert_eq!(
            reassemble(&frames, &c, LengthDeclaration::None),
            Err(ProtocolError::IncompleteSequence { received: 2 })
        );
    }

    #[test]
    fn test_reassemble_checks_declared_length() {
        let c = cap(58, 0);
        let good = vec![
            Frame::new(0x30, 0, vec![0x04, 0x00, 0xA1]),
            Frame::new(0x30, 0xFF, vec![0xA2, 0xA3, 0xA4]),
        ];
        assert_eq!(
            reassemble(&good, &c, LengthDeclaration::U16LePrefix).unwrap(),
            vec![0x04, 0x00, 0xA1, 0xA2, 0xA3, 0xA4]
        );

        let short = vec![
            Frame::new(0x30, 0, vec![0x05, 0x00, 0xA1]),
            Frame::new(0x30, 0xFF, vec![0xA2]),
        ];
        assert_eq!(
            reassemble(&short, &c, LengthDeclaration::U16LePrefix),
            Err(ProtocolError::LengthMismatch {
                declared: 5,
                actual: 2
            })
        );
    }
}
