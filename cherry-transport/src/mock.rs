//! Scriptable in-memory transport for tests
//!
//! `MockTransport` is cheap to clone; clones share state so a test can keep
//! a handle for inspection after moving the transport into an engine.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::TransportError;
use crate::types::TransportDeviceInfo;
use crate::Transport;

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

struct MockState {
    writes: Vec<Vec<u8>>,
    reads: VecDeque<Result<Vec<u8>, TransportError>>,
    write_failures: VecDeque<TransportError>,
    responder: Option<Responder>,
    connected: bool,
    read_attempts: usize,
}

/// In-memory [`Transport`] with scripted responses
#[derive(Clone)]
pub struct MockTransport {
    info: TransportDeviceInfo,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_info(TransportDeviceInfo {
            device_path: "mock".to_string(),
            ..Default::default()
        })
    }

    pub fn with_info(info: TransportDeviceInfo) -> Self {
        Self {
            info,
            state: Arc::new(Mutex::new(MockState {
                writes: Vec::new(),
                reads: VecDeque::new(),
                write_failures: VecDeque::new(),
                responder: None,
                connected: true,
                read_attempts: 0,
            })),
        }
    }

    /// Queue a report for a later read
    pub fn queue_read(&self, report: impl Into<Vec<u8>>) {
        self.state.lock().reads.push_back(Ok(report.into()));
    }

    /// Queue an error for a later read
    pub fn queue_read_error(&self, error: TransportError) {
        self.state.lock().reads.push_back(Err(error));
    }

    /// Make the next write fail with `error`
    pub fn fail_next_write(&self, error: TransportError) {
        self.state.lock().write_failures.push_back(error);
    }

    /// Install a closure called for every successful write
    ///
    /// The reports it returns are queued for reading. Returning nothing
    /// makes the next read time out, which simulates a dropped ack.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        self.state.lock().responder = Some(Box::new(responder));
    }

    pub fn disconnect(&self) {
        self.state.lock().connected = false;
    }

    /// Every report written so far, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().writes.len()
    }

    pub fn read_attempts(&self) -> usize {
        self.state.lock().read_attempts
    }
}

impl Transport for MockTransport {
    fn write_report(&mut self, report: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        // failed writes are still recorded as attempts
        state.writes.push(report.to_vec());
        if let Some(error) = state.write_failures.pop_front() {
            return Err(error);
        }

        let replies = match state.responder.as_mut() {
            Some(responder) => responder(report),
            None => Vec::new(),
        };
        state.reads.extend(replies.into_iter().map(Ok));
        Ok(())
    }

    fn read_report(&mut self, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        state.read_attempts += 1;
        state.reads.pop_front().unwrap_or(Err(TransportError::Timeout))
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }
}
