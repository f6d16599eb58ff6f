//! Property-based tests for the frame codec, segmenter and retry discipline.

use std::sync::Arc;

use cherry_transport::mock::MockTransport;
use cherry_transport::{
    decode_frame, encode_frame, reassemble, segment, AcceptAll, AckPolicy, Capability,
    ChecksumType, FailureCause, Frame, FrameLayout, LengthDeclaration, ProtocolError, Request,
    TransactionEngine,
};
use proptest::prelude::*;

fn checksum_strategy() -> impl Strategy<Value = ChecksumType> {
    prop_oneof![
        any::<u8>().prop_map(|seed| ChecksumType::Sum8 { seed }),
        any::<u8>().prop_map(|seed| ChecksumType::Xor8 { seed }),
        Just(ChecksumType::Complement8),
        any::<u16>().prop_map(|seed| ChecksumType::Sum16Le { seed }),
    ]
}

/// Valid capabilities with a randomised header, checksum, layout and payload limit
fn capability_strategy() -> impl Strategy<Value = Capability> {
    (
        prop::collection::vec(1u8..=255, 1..=3),
        checksum_strategy(),
        prop_oneof![Just(FrameLayout::Sequenced), Just(FrameLayout::ChecksumLeading)],
        0u8..=1,
    )
        .prop_flat_map(|(header, checksum, layout, start)| {
            let base = Capability {
                header,
                checksum,
                layout,
                part_index_start: start,
                ..Default::default()
            };
            let room = base.report_size - base.overhead();
            (Just(base), 1..=room)
        })
        .prop_map(|(base, max)| Capability {
            max_payload_per_frame: max,
            ..base
        })
}

fn sequenced_capability_strategy() -> impl Strategy<Value = Capability> {
    capability_strategy().prop_map(|cap| {
        let max = cap.max_payload_per_frame.min(cap.report_size - 5 - cap.header.len());
        Capability {
            layout: FrameLayout::Sequenced,
            max_payload_per_frame: max.max(1),
            ..cap
        }
    })
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(300))]

    // -- Frame codec ----------------------------------------------------------

    /// decode(encode(frame)) must give back the frame for sequenced layouts.
    #[test]
    fn prop_sequenced_roundtrip(
        (cap, payload) in sequenced_capability_strategy().prop_flat_map(|cap| {
            let max = cap.max_payload_per_frame;
            (Just(cap), prop::collection::vec(any::<u8>(), 0..=max))
        }),
        opcode in any::<u8>(),
        part in any::<u8>(),
    ) {
        prop_assert!(cap.validate().is_ok());
        let frame = Frame::new(opcode, part, payload);
        let raw = encode_frame(&frame, &cap)?;
        prop_assert_eq!(raw.len(), cap.report_size);
        prop_assert_eq!(decode_frame(&raw, &cap)?, frame);
    }

    /// Checksum-leading frames carry no length, so the payload comes back zero padded.
    #[test]
    fn prop_checksum_leading_roundtrip(
        (cap, payload) in capability_strategy().prop_flat_map(|cap| {
            let max = cap.max_payload_per_frame;
            (Just(cap), prop::collection::vec(any::<u8>(), 0..=max))
        }),
        opcode in any::<u8>(),
    ) {
        let cap = Capability { layout: FrameLayout::ChecksumLeading, ..cap };
        let raw = encode_frame(&Frame::new(opcode, 0, payload.clone()), &cap)?;
        let decoded = decode_frame(&raw, &cap)?;
        prop_assert_eq!(decoded.opcode, opcode);
        prop_assert_eq!(decoded.part, cap.last_part_marker);
        prop_assert_eq!(decoded.payload.len(), cap.max_payload_per_frame);
        prop_assert_eq!(&decoded.payload[..payload.len()], &payload[..]);
        prop_assert!(decoded.payload[payload.len()..].iter().all(|&b| b == 0));
    }

    /// Flipping any single byte of an encoded frame must make decode fail.
    #[test]
    fn prop_single_byte_flip_is_rejected(
        (cap, payload) in capability_strategy().prop_flat_map(|cap| {
            let max = cap.max_payload_per_frame;
            (Just(cap), prop::collection::vec(any::<u8>(), 0..=max))
        }),
        opcode in any::<u8>(),
        index in 0usize..64,
        mask in 1u8..=255,
    ) {
        let mut raw = encode_frame(&Frame::new(opcode, cap.last_part_marker, payload), &cap)?;
        raw[index] ^= mask;
        let result = decode_frame(&raw, &cap);
        prop_assert!(
            matches!(result, Err(ProtocolError::InvalidFrame(_))),
            "flip at {} with mask {:#04x} was accepted: {:?}",
            index,
            mask,
            result
        );
    }

    /// Payloads over the per-frame limit are refused by the codec.
    #[test]
    fn prop_encode_rejects_oversized(cap in capability_strategy(), extra in 1usize..16) {
        let len = cap.max_payload_per_frame + extra;
        let result = encode_frame(&Frame::new(0x01, 0, vec![0; len]), &cap);
        prop_assert_eq!(
            result,
            Err(ProtocolError::PayloadTooLarge { len, max: cap.max_payload_per_frame })
        );
    }

    // -- Segmentation ---------------------------------------------------------

    /// segment yields ceil(L/M) frames (1 for L=0), each within M, numbered
    /// upwards from the start index, and reassembles to the original.
    #[test]
    fn prop_segment_counts_and_reassembles(
        (cap, payload) in capability_strategy().prop_flat_map(|cap| {
            let limit = cap.max_payload_per_frame * 100;
            (Just(cap), prop::collection::vec(any::<u8>(), 0..=limit))
        }),
        opcode in any::<u8>(),
    ) {
        let m = cap.max_payload_per_frame;
        let frames = segment(opcode, &payload, &cap)?;

        let expected = if payload.is_empty() { 1 } else { payload.len().div_ceil(m) };
        prop_assert_eq!(frames.len(), expected);
        prop_assert!(frames.iter().all(|f| f.payload.len() <= m && f.opcode == opcode));
        prop_assert_eq!(frames.last().map(|f| f.part), Some(cap.last_part_marker));
        for (i, frame) in frames.iter().enumerate().take(frames.len() - 1) {
            prop_assert_eq!(frame.part, cap.part_index_start + i as u8);
        }
        prop_assert!(frames.windows(2).all(|w| w[0].part < w[1].part));

        prop_assert_eq!(reassemble(&frames, &cap, LengthDeclaration::None)?, payload);
    }

    /// A repeated part anywhere in the sequence is rejected.
    #[test]
    fn prop_repeated_part_rejected(
        (cap, payload) in capability_strategy().prop_flat_map(|cap| {
            let m = cap.max_payload_per_frame;
            (Just(cap), prop::collection::vec(any::<u8>(), (m + 1)..=(m * 6)))
        }),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut frames = segment(0x42, &payload, &cap)?;
        let i = pick.index(frames.len());
        let dup = frames[i].clone();
        frames.insert(i + 1, dup);

        let result = reassemble(&frames, &cap, LengthDeclaration::None);
        prop_assert!(matches!(result, Err(ProtocolError::OutOfOrderPart { .. })), "{:?}", result);
    }

    /// A missing numbered part followed by another numbered part is rejected.
    #[test]
    fn prop_missing_part_rejected(
        (cap, payload) in capability_strategy().prop_flat_map(|cap| {
            let m = cap.max_payload_per_frame;
            (Just(cap), prop::collection::vec(any::<u8>(), (m * 2 + 1)..=(m * 6)))
        }),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut frames = segment(0x42, &payload, &cap)?;
        prop_assume!(frames.len() >= 3);
        // keep at least one numbered part after the removed one
        let i = pick.index(frames.len() - 2);
        frames.remove(i);

        let result = reassemble(&frames, &cap, LengthDeclaration::None);
        prop_assert!(matches!(result, Err(ProtocolError::OutOfOrderPart { .. })), "{:?}", result);
    }

    // -- Retry discipline -----------------------------------------------------

    /// A transport that never answers sees exactly `retry_budget` writes.
    #[test]
    fn prop_retry_terminates_after_budget(budget in 1u32..12, payload_len in 0usize..58) {
        let mock = MockTransport::new();
        let cap = Arc::new(Capability { ack: AckPolicy::Framed, ..Default::default() });
        let mut engine = TransactionEngine::new(Box::new(mock.clone()), cap)?
            .with_retry_budget(budget);

        let payload = vec![0x5A; payload_len];
        let result = engine.transact(&Request::ack(0x10, &payload), &AcceptAll);
        prop_assert_eq!(
            result,
            Err(ProtocolError::RetryBudgetExhausted { last_cause: FailureCause::Timeout })
        );
        prop_assert_eq!(mock.write_count(), budget as usize);
    }
}
