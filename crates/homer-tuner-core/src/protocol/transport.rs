//! Byte transport abstraction
//!
//! The protocol engine only needs to write whole buffers and read single
//! bytes against a deadline. [`Transport`] captures exactly that, so the
//! state machine runs unchanged over a real serial port or over the in-memory
//! [`MockTransport`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::TunerError;

/// Exclusive, blocking byte link to the instrument.
///
/// Reads are timeout-bounded and never return partial data: a short read
/// fails with [`TunerError::Timeout`]. There is no retry at this layer.
pub trait Transport: Send {
    /// Write every byte of `bytes` or fail.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TunerError>;

    /// Read one byte, waiting at most `timeout`.
    fn read_byte(&mut self, timeout: Duration) -> Result<u8, TunerError>;

    /// Read exactly `n` bytes within `timeout` overall.
    fn read_exact(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>, TunerError> {
        let deadline = Instant::now() + timeout;
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TunerError::Timeout);
            }
            out.push(self.read_byte(remaining)?);
        }
        Ok(out)
    }
}

#[derive(Debug, Default)]
struct MockState {
    rx: VecDeque<u8>,
    sent: Vec<Vec<u8>>,
    fail_writes: bool,
}

/// Scripted in-memory transport.
///
/// Clones share the same state, so a test can hand one clone to a
/// [`Tuner`](crate::Tuner) and keep another to queue instrument replies and
/// inspect what was written. An empty receive queue behaves like a silent
/// instrument: reads fail with [`TunerError::Timeout`] immediately.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a silent transport with nothing queued
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport with bytes already waiting to be read
    pub fn with_response(bytes: &[u8]) -> Self {
        let mock = Self::new();
        mock.push_response(bytes);
        mock
    }

    /// Queue bytes the "instrument" will send
    pub fn push_response(&self, bytes: &[u8]) {
        self.lock().rx.extend(bytes.iter().copied());
    }

    /// Every buffer passed to `write_all`, in order
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    /// Number of `write_all` calls so far
    pub fn write_count(&self) -> usize {
        self.lock().sent.len()
    }

    /// Bytes still waiting to be read
    pub fn pending(&self) -> usize {
        self.lock().rx.len()
    }

    /// Make subsequent writes fail with a transport error
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A poisoned lock only means another test thread panicked mid-call;
        // the queued bytes are still meaningful.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Transport for MockTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TunerError> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(TunerError::Transport("mock write failure".to_string()));
        }
        state.sent.push(bytes.to_vec());
        Ok(())
    }

    fn read_byte(&mut self, _timeout: Duration) -> Result<u8, TunerError> {
        self.lock().rx.pop_front().ok_or(TunerError::Timeout)
    }
}
