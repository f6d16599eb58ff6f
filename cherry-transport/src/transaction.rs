//! Transaction engine
//!
//! `TransactionEngine` owns a raw [`Transport`] and runs one request/response
//! exchange at a time on the caller's thread: segment and encode the
//! command, write each frame in part order, wait for its acknowledgement,
//! and collect the response.
//!
//! ```text
//! Idle -> Sending -> AwaitingResponse -> Complete
//!            ^              |
//!            +-- Retrying <-+-> Failed
//! ```
//!
//! On sequenced layouts every reply must carry the part index of the frame
//! it answers, and data responses must arrive as `start, start+1, .., marker`.
//!
//! Every failed attempt (timeout, short transfer, bad frame, wrong opcode or
//! part, busy device) consumes one unit of the retry budget; the attempt that
//! uses up the budget is the last one written. A retry resends the last
//! unacknowledged frame, or the whole sequence when the capability asks
//! for it. Device rejections and lost devices fail immediately.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::error::{FailureCause, ProtocolError, TransportError};
use crate::frame::{decode_frame, encode_frame, Frame};
use crate::segment::{reassemble, segment, LengthDeclaration};
use crate::types::{AckPolicy, Capability, FrameLayout, TransportDeviceInfo};
use crate::Transport;

/// What the device sends back for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// One acknowledgement per written frame; the final ack's body is the response
    Ack,
    /// Non-final frames are acked, the final frame is answered by a
    /// (possibly multi-part) data response
    Data(LengthDeclaration),
}

/// One command to run through the engine
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub opcode: u8,
    pub payload: &'a [u8],
    pub shape: ResponseShape,
}

impl<'a> Request<'a> {
    pub fn ack(opcode: u8, payload: &'a [u8]) -> Self {
        Self {
            opcode,
            payload,
            shape: ResponseShape::Ack,
        }
    }

    pub fn data(opcode: u8, payload: &'a [u8], declaration: LengthDeclaration) -> Self {
        Self {
            opcode,
            payload,
            shape: ResponseShape::Data(declaration),
        }
    }
}

/// A completed exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub opcode: u8,
    /// Response body with any status bytes removed
    pub payload: Vec<u8>,
    /// Failed attempts before success
    pub retries: u32,
}

/// Device status carried by a response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Ok,
    /// Transient; the frame is sent again
    Busy(u8),
    /// Terminal; retrying cannot change the outcome
    Rejected(u8),
}

/// Classifies device status codes for one device family
pub trait StatusPolicy {
    /// Split a decoded response frame into its status and body
    fn inspect<'a>(&self, frame: &'a Frame) -> (DeviceStatus, &'a [u8]);
}

/// Policy for devices without status codes: every decoded frame is a success
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl StatusPolicy for AcceptAll {
    fn inspect<'a>(&self, frame: &'a Frame) -> (DeviceStatus, &'a [u8]) {
        (DeviceStatus::Ok, &frame.payload)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionState {
    Idle,
    Sending,
    AwaitingResponse,
    Retrying,
    Complete,
    Failed,
}

fn enter(state: &mut TransactionState, next: TransactionState) {
    trace!("Transaction state {:?} -> {:?}", state, next);
    *state = next;
}

/// Part index a reply must carry to belong to the current exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExpectedPart {
    /// Ack for the frame just written
    Exactly(u8),
    /// Next frame of a data response: the next numbered part or the marker
    NextOf { part: u8, marker: u8 },
}

impl ExpectedPart {
    fn accepts(self, part: u8) -> bool {
        match self {
            ExpectedPart::Exactly(p) => part == p,
            ExpectedPart::NextOf { part: p, marker } => part == p || part == marker,
        }
    }

    fn part(self) -> u8 {
        match self {
            ExpectedPart::Exactly(p) | ExpectedPart::NextOf { part: p, .. } => p,
        }
    }
}

/// Outcome of one failed attempt
enum Attempt {
    Retry(FailureCause),
    Fatal(ProtocolError),
}

impl From<TransportError> for Attempt {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout => Attempt::Retry(FailureCause::Timeout),
            e if e.is_retriable() => Attempt::Retry(FailureCause::Transport(e)),
            e => Attempt::Fatal(ProtocolError::Transport(e)),
        }
    }
}

/// Drives request/response exchanges over one exclusively owned transport
///
/// Only the transport, the descriptor and the retry/timeout settings live
/// on the engine; every transaction's progress is local to `transact`.
pub struct TransactionEngine {
    transport: Box<dyn Transport>,
    capability: Arc<Capability>,
    retry_budget: u32,
    timeout: Duration,
}

impl TransactionEngine {
    /// Create an engine, using the capability's retry budget and timeout
    pub fn new(
        transport: Box<dyn Transport>,
        capability: Arc<Capability>,
    ) -> Result<Self, ProtocolError> {
        capability.validate()?;
        Ok(Self {
            transport,
            retry_budget: capability.retry_budget,
            timeout: capability.timeout(),
            capability,
        })
    }

    /// Override the retry budget (at least one attempt is always made)
    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.set_retry_budget(budget);
        self
    }

    /// Override the per-read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn set_retry_budget(&mut self, budget: u32) {
        self.retry_budget = budget.max(1);
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn capability(&self) -> &Arc<Capability> {
        &self.capability
    }

    pub fn device_info(&self) -> &TransportDeviceInfo {
        self.transport.device_info()
    }

    /// Run one exchange to completion
    ///
    /// Returns only a fully received response or an error; nothing runs
    /// in the background once this returns.
    pub fn transact(
        &mut self,
        request: &Request<'_>,
        policy: &dyn StatusPolicy,
    ) -> Result<Response, ProtocolError> {
        let mut state = TransactionState::Idle;

        let frames = segment(request.opcode, request.payload, &self.capability)?;
        let reports = frames
            .iter()
            .map(|frame| encode_frame(frame, &self.capability))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            "Transaction 0x{:02X}: {} bytes in {} frame(s)",
            request.opcode,
            request.payload.len(),
            reports.len()
        );

        let mut next = 0;
        let mut failures = 0u32;
        loop {
            match self.attempt(request, policy, &frames, &reports, &mut next, &mut state) {
                Ok(payload) => {
                    enter(&mut state, TransactionState::Complete);
                    return Ok(Response {
                        opcode: request.opcode,
                        payload,
                        retries: failures,
                    });
                }
                Err(Attempt::Fatal(e)) => {
                    enter(&mut state, TransactionState::Failed);
                    debug!("Transaction 0x{:02X} failed: {}", request.opcode, e);
                    return Err(e);
                }
                Err(Attempt::Retry(cause)) => {
                    failures += 1;
                    if failures >= self.retry_budget {
                        enter(&mut state, TransactionState::Failed);
                        warn!(
                            "Transaction 0x{:02X} gave up after {} attempts: {}",
                            request.opcode, failures, cause
                        );
                        return Err(ProtocolError::RetryBudgetExhausted { last_cause: cause });
                    }
                    enter(&mut state, TransactionState::Retrying);
                    if self.capability.restart_sequence_on_retry {
                        next = 0;
                    }
                    debug!(
                        "Attempt {} for 0x{:02X} failed ({}), resending frame {}",
                        failures, request.opcode, cause, next
                    );
                }
            }
        }
    }

    /// Send frames from `next` onwards; `next` tracks the first unacked frame
    fn attempt(
        &mut self,
        request: &Request<'_>,
        policy: &dyn StatusPolicy,
        frames: &[Frame],
        reports: &[Vec<u8>],
        next: &mut usize,
        state: &mut TransactionState,
    ) -> Result<Vec<u8>, Attempt> {
        loop {
            let report = &reports[*next];
            enter(state, TransactionState::Sending);
            trace!("Write frame {}: {:02X?}", *next, report);
            self.transport.write_report(report)?;

            enter(state, TransactionState::AwaitingResponse);
            let ack = ExpectedPart::Exactly(frames[*next].part);
            if *next + 1 < reports.len() {
                self.read_reply(request.opcode, ack, policy)?;
                *next += 1;
                continue;
            }

            return match request.shape {
                ResponseShape::Ack => Ok(self.read_reply(request.opcode, ack, policy)?.payload),
                ResponseShape::Data(declaration) => {
                    self.collect_data(request.opcode, policy, declaration)
                }
            };
        }
    }

    /// Read one reply and classify it
    ///
    /// On sequenced layouts a reply carrying any part other than `expected`
    /// is discarded and the attempt fails, so a late or duplicated ack never
    /// stands in for the ack of another frame.
    fn read_reply(
        &mut self,
        opcode: u8,
        expected: ExpectedPart,
        policy: &dyn StatusPolicy,
    ) -> Result<Frame, Attempt> {
        let raw = self.transport.read_report(self.timeout)?;
        trace!("Read: {:02X?}", raw);

        match self.capability.ack {
            AckPolicy::Unchecked => Ok(Frame::new(opcode, self.capability.last_part_marker, raw)),
            AckPolicy::Framed => {
                let frame = decode_frame(&raw, &self.capability).map_err(|e| match e {
                    ProtocolError::InvalidFrame(fault) => {
                        Attempt::Retry(FailureCause::InvalidFrame(fault))
                    }
                    other => Attempt::Fatal(other),
                })?;
                if frame.opcode != opcode {
                    return Err(Attempt::Retry(FailureCause::UnexpectedOpcode {
                        expected: opcode,
                        actual: frame.opcode,
                    }));
                }
                if self.capability.layout == FrameLayout::Sequenced
                    && !expected.accepts(frame.part)
                {
                    debug!(
                        "Discarding reply for part 0x{:02X}, waiting for 0x{:02X}",
                        frame.part,
                        expected.part()
                    );
                    return Err(Attempt::Retry(FailureCause::UnexpectedPart {
                        expected: expected.part(),
                        actual: frame.part,
                    }));
                }
                match policy.inspect(&frame) {
                    (DeviceStatus::Ok, body) => Ok(Frame::new(frame.opcode, frame.part, body)),
                    (DeviceStatus::Busy(code), _) => {
                        Err(Attempt::Retry(FailureCause::DeviceBusy { code }))
                    }
                    (DeviceStatus::Rejected(code), _) => {
                        Err(Attempt::Fatal(ProtocolError::DeviceReportedError { code }))
                    }
                }
            }
        }
    }

    /// Read every part of a data response and reassemble them
    ///
    /// Parts must arrive as `start, start+1, ..` and end with the marker.
    fn collect_data(
        &mut self,
        opcode: u8,
        policy: &dyn StatusPolicy,
        declaration: LengthDeclaration,
    ) -> Result<Vec<u8>, Attempt> {
        let marker = self.capability.last_part_marker;
        let start = self.capability.part_index_start;

        let expected = ExpectedPart::NextOf {
            part: start,
            marker,
        };
        let first = self.read_reply(opcode, expected, policy)?;
        if self.capability.ack == AckPolicy::Unchecked {
            return Ok(first.payload);
        }

        let max_parts = self.capability.max_parts();
        let mut parts = vec![first];
        while parts.last().map(|f| f.part) != Some(marker) && parts.len() < max_parts {
            let expected = ExpectedPart::NextOf {
                part: start.wrapping_add(parts.len() as u8),
                marker,
            };
            match self.read_reply(opcode, expected, policy) {
                Ok(frame) => parts.push(frame),
                Err(Attempt::Retry(FailureCause::Timeout)) => {
                    return Err(Attempt::Retry(FailureCause::IncompleteSequence {
                        received: parts.len(),
                    }));
                }
                Err(other) => return Err(other),
            }
        }
        trace!("Reassembling {} part(s) for 0x{:02X}", parts.len(), opcode);
        reassemble(&parts, &self.capability, declaration).map_err(Attempt::Fatal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::types::ChecksumType;

    fn capability() -> Arc<Capability> {
        Arc::new(Capability::default())
    }

    fn engine(mock: &MockTransport, cap: Arc<Capability>) -> TransactionEngine {
        TransactionEngine::new(Box::new(mock.clone()), cap).unwrap()
    }

    fn ack(cap: &Capability, opcode: u8, part: u8, payload: &[u8]) -> Vec<u8> {
        encode_frame(&Frame::new(opcode, part, payload), cap).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_capability() {
        let cap = Capability {
            header: Vec::new(),
            ..Default::default()
        };
        let result = TransactionEngine::new(Box::new(MockTransport::new()), Arc::new(cap));
        assert!(matches!(result, Err(ProtocolError::InvalidCapability(_))));
    }

    #[test]
    fn test_ack_returns_body() {
        let cap = capability();
        let mock = MockTransport::new();
        mock.queue_read(ack(&cap, 0x10, 0xFF, &[0xAB]));

        let mut engine = engine(&mock, cap);
        let response = engine
            .transact(&Request::ack(0x10, &[1, 2, 3]), &AcceptAll)
            .unwrap();
        assert_eq!(response.payload, vec![0xAB]);
        assert_eq!(response.retries, 0);
        assert_eq!(mock.write_count(), 1);
    }

    #[test]
    fn test_wrong_opcode_is_retried() {
        let cap = capability();
        let mock = MockTransport::new();
        mock.queue_read(ack(&cap, 0x11, 0xFF, &[]));
        mock.queue_read(ack(&cap, 0x10, 0xFF, &[]));

        let mut engine = engine(&mock, cap);
        let response = engine.transact(&Request::ack(0x10, &[]), &AcceptAll).unwrap();
        assert_eq!(response.retries, 1);
        assert_eq!(mock.write_count(), 2);
    }

    #[test]
    fn test_corrupt_reply_exhausts_budget() {
        let cap = capability();
        let mock = MockTransport::new();
        for _ in 0..2 {
            let mut bad = ack(&cap, 0x10, 0xFF, &[]);
            bad[10] ^= 0x01;
            mock.queue_read(bad);
        }

        let mut engine = engine(&mock, cap).with_retry_budget(2);
        let err = engine.transact(&Request::ack(0x10, &[]), &AcceptAll).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::RetryBudgetExhausted {
                last_cause: FailureCause::InvalidFrame(_)
            }
        ));
        assert_eq!(mock.write_count(), 2);
    }

    #[test]
    fn test_disconnect_is_not_retried() {
        let mock = MockTransport::new();
        mock.fail_next_write(TransportError::Disconnected);

        let mut engine = engine(&mock, capability());
        let err = engine.transact(&Request::ack(0x10, &[]), &AcceptAll).unwrap_err();
        assert_eq!(err, ProtocolError::Transport(TransportError::Disconnected));
        assert_eq!(mock.write_count(), 1);
    }

    #[test]
    fn test_short_write_is_retried() {
        let cap = capability();
        let mock = MockTransport::new();
        mock.fail_next_write(TransportError::ShortTransfer {
            expected: 64,
            actual: 8,
        });
        mock.queue_read(ack(&cap, 0x10, 0xFF, &[]));

        let mut engine = engine(&mock, cap);
        let response = engine.transact(&Request::ack(0x10, &[]), &AcceptAll).unwrap();
        assert_eq!(response.retries, 1);
    }

    #[test]
    fn test_restart_sequence_on_retry() {
        let cap = Arc::new(Capability {
            max_payload_per_frame: 10,
            restart_sequence_on_retry: true,
            ..Default::default()
        });
        let mock = MockTransport::new();
        let reply = cap.clone();
        let mut writes = 0;
        mock.set_responder(move |report| {
            writes += 1;
            // drop the ack for the second write only
            if writes == 2 {
                Vec::new()
            } else {
                vec![ack(&reply, 0x20, report[2], &[])]
            }
        });

        let mut engine = engine(&mock, cap);
        let response = engine
            .transact(&Request::ack(0x20, &[0x55; 25]), &AcceptAll)
            .unwrap();
        assert_eq!(response.retries, 1);

        // frames 0, 1 (lost ack), then 0, 1, 2 again
        let writes = mock.writes();
        assert_eq!(writes.len(), 5);
        assert_eq!(writes[0], writes[2]);
        assert_eq!(writes[1], writes[3]);
    }

    #[test]
    fn test_data_response_is_reassembled() {
        let cap = capability();
        let mock = MockTransport::new();
        mock.queue_read(ack(&cap, 0x30, 0, &[0x03, 0x00, 0xA1]));
        mock.queue_read(ack(&cap, 0x30, 0xFF, &[0xA2, 0xA3]));

        let mut engine = engine(&mock, cap);
        let response = engine
            .transact(
                &Request::data(0x30, &[], LengthDeclaration::U16LePrefix),
                &AcceptAll,
            )
            .unwrap();
        assert_eq!(response.payload, vec![0x03, 0x00, 0xA1, 0xA2, 0xA3]);
    }

    #[test]
    fn test_data_response_skipping_a_part_is_retried() {
        let cap = capability();
        let mock = MockTransport::new();
        mock.queue_read(ack(&cap, 0x30, 0, &[1]));
        mock.queue_read(ack(&cap, 0x30, 2, &[3]));

        let mut engine = engine(&mock, cap).with_retry_budget(1);
        let err = engine
            .transact(&Request::data(0x30, &[], LengthDeclaration::None), &AcceptAll)
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::RetryBudgetExhausted {
                last_cause: FailureCause::UnexpectedPart {
                    expected: 1,
                    actual: 2
                }
            }
        );
    }

    #[test]
    fn test_final_ack_must_carry_marker() {
        let cap = capability();
        let mock = MockTransport::new();
        mock.queue_read(ack(&cap, 0x10, 0x00, &[]));
        mock.queue_read(ack(&cap, 0x10, 0xFF, &[]));

        let mut engine = engine(&mock, cap);
        let response = engine.transact(&Request::ack(0x10, &[]), &AcceptAll).unwrap();
        assert_eq!(response.retries, 1);
        assert_eq!(mock.write_count(), 2);
    }

    #[test]
    fn test_data_response_without_terminal_part() {
        let cap = capability();
        let mock = MockTransport::new();
        mock.queue_read(ack(&cap, 0x30, 0, &[1]));

        let mut engine = engine(&mock, cap).with_retry_budget(1);
        let err = engine
            .transact(&Request::data(0x30, &[], LengthDeclaration::None), &AcceptAll)
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::RetryBudgetExhausted {
                last_cause: FailureCause::IncompleteSequence { received: 1 }
            }
        );
    }

    #[test]
    fn test_unchecked_ack_returns_raw_report() {
        let cap = Arc::new(Capability {
            max_payload_per_frame: 60,
            layout: FrameLayout::ChecksumLeading,
            checksum: ChecksumType::Sum16Le { seed: 0 },
            ack: AckPolicy::Unchecked,
            ..Default::default()
        });
        let mock = MockTransport::new();
        mock.queue_read(vec![0x04, 0x99, 0x00, 0x42]);

        let mut engine = engine(&mock, cap);
        let response = engine
            .transact(
                &Request::data(0x07, &[0x38, 0x00, 0x00], LengthDeclaration::None),
                &AcceptAll,
            )
            .unwrap();
        assert_eq!(response.payload, vec![0x04, 0x99, 0x00, 0x42]);
    }

    #[test]
    fn test_payload_too_large_is_not_sent() {
        let cap = Arc::new(Capability {
            max_payload_per_frame: 4,
            last_part_marker: 1,
            ..Default::default()
        });
        let mock = MockTransport::new();

        let mut engine = engine(&mock, cap);
        let err = engine.transact(&Request::ack(0x01, &[0; 9]), &AcceptAll).unwrap_err();
        assert_eq!(err, ProtocolError::PayloadTooLarge { len: 9, max: 8 });
        assert_eq!(mock.write_count(), 0);
    }
}
