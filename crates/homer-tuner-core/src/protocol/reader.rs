//! Response state machine
//!
//! The instrument streams bytes with no length prefix, and may push periodic
//! MDOs between our requests. [`ResponseReader`] resynchronizes on that
//! stream and pulls out one message per request:
//!
//! 1. **Sync**: discard bytes until a `MARKER`.
//! 2. **Classify**: the next byte is either another `MARKER` (an escaped
//!    literal 128 from a payload we joined mid-way, so resync), the goal
//!    terminator (a bare message), `DATA_BEGIN`, or some other message's end
//!    code (skipped).
//! 3. **Accumulate**: collect payload bytes, collapsing `MARKER, MARKER`
//!    pairs, until `MARKER, <terminator>`.
//!
//! Only a `MARKER, code` pair can end a message. A payload byte that happens
//! to equal `MDO_END` or `CONFIRM` is plain data.
//!
//! Every read is bounded: too much noise, too many foreign messages or an
//! oversized payload fail with [`TunerError::ProtocolDesync`] instead of
//! looping forever.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

use super::mdo::{decode_motor_positions, HostStatus};
use super::{MotorPositions, Opcode, Transport, TunerError, CONFIRM, DATA_BEGIN, MARKER, MDO_END};

/// Length of a bare position block, which carries no status byte
const BARE_POSITIONS_LEN: usize = 6;

/// Bounds on how long a single read may hunt for its message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResyncLimits {
    /// Bytes that may be discarded while looking for a marker
    pub max_skipped_bytes: usize,
    /// Messages of the wrong kind that may be skipped
    pub max_foreign_messages: usize,
    /// Largest payload accepted inside one data object
    pub max_payload_len: usize,
}

impl Default for ResyncLimits {
    fn default() -> Self {
        Self {
            max_skipped_bytes: 512,
            max_foreign_messages: 8,
            max_payload_len: 256,
        }
    }
}

/// One message pulled off the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Terminator code that closed the message
    pub end_code: u8,
    /// False for a bare `MARKER, code` message with no `DATA_BEGIN`
    pub has_data: bool,
    /// Unstuffed payload bytes
    pub payload: Vec<u8>,
}

/// Reads framed responses from a [`Transport`]
pub struct ResponseReader<'a> {
    transport: &'a mut dyn Transport,
    timeout: Duration,
    limits: ResyncLimits,
    skipped: usize,
    foreign: usize,
}

impl<'a> ResponseReader<'a> {
    /// Wrap `transport`; `timeout` applies to every byte read
    pub fn new(transport: &'a mut dyn Transport, timeout: Duration, limits: ResyncLimits) -> Self {
        Self {
            transport,
            timeout,
            limits,
            skipped: 0,
            foreign: 0,
        }
    }

    fn next_byte(&mut self) -> Result<u8, TunerError> {
        self.transport.read_byte(self.timeout)
    }

    fn skip_bytes(&mut self, n: usize) -> Result<(), TunerError> {
        self.skipped += n;
        if self.skipped > self.limits.max_skipped_bytes {
            return Err(TunerError::ProtocolDesync(format!(
                "no message start within {} bytes",
                self.limits.max_skipped_bytes
            )));
        }
        Ok(())
    }

    fn skip_message(&mut self, code: u8) -> Result<(), TunerError> {
        self.foreign += 1;
        trace!(
            "skipping foreign control transition {} ({:?})",
            code,
            Opcode::from_byte(code)
        );
        if self.foreign > self.limits.max_foreign_messages {
            return Err(TunerError::ProtocolDesync(format!(
                "gave up after {} unexpected messages (last code {})",
                self.limits.max_foreign_messages, code
            )));
        }
        Ok(())
    }

    fn push_payload(
        &self,
        payload: &mut Vec<u8>,
        b: u8,
        terminator: u8,
    ) -> Result<(), TunerError> {
        if payload.len() >= self.limits.max_payload_len {
            return Err(TunerError::ProtocolDesync(format!(
                "data object exceeds {} bytes without terminator {}",
                self.limits.max_payload_len, terminator
            )));
        }
        payload.push(b);
        Ok(())
    }

    /// Read until a message closed by `MARKER, terminator`
    pub fn read_frame(&mut self, terminator: u8) -> Result<Frame, TunerError> {
        'sync: loop {
            // Sync
            loop {
                let b = self.next_byte()?;
                if b == MARKER {
                    break;
                }
                trace!("discarding byte {}", b);
                self.skip_bytes(1)?;
            }

            // Classify
            let code = self.next_byte()?;
            if code == MARKER {
                self.skip_bytes(2)?;
                continue 'sync;
            }
            if code == terminator {
                return Ok(Frame {
                    end_code: code,
                    has_data: false,
                    payload: Vec::new(),
                });
            }
            if code != DATA_BEGIN {
                self.skip_message(code)?;
                continue 'sync;
            }

            // Accumulate
            let mut payload = Vec::new();
            loop {
                let b = self.next_byte()?;
                if b != MARKER {
                    self.push_payload(&mut payload, b, terminator)?;
                    continue;
                }
                match self.next_byte()? {
                    MARKER => self.push_payload(&mut payload, MARKER, terminator)?,
                    c if c == terminator => {
                        return Ok(Frame {
                            end_code: c,
                            has_data: true,
                            payload,
                        })
                    }
                    DATA_BEGIN => {
                        // previous object was cut off; start over on this one
                        self.skip_message(DATA_BEGIN)?;
                        payload.clear();
                    }
                    c => {
                        self.skip_message(c)?;
                        continue 'sync;
                    }
                }
            }
        }
    }

    /// Block until the instrument confirms command completion
    pub fn read_confirmation(&mut self) -> Result<(), TunerError> {
        let frame = self.read_frame(CONFIRM)?;
        debug!("confirmation received ({} payload bytes)", frame.payload.len());
        Ok(())
    }

    /// Read one data object closed by `MDO_END` and return its payload
    pub fn read_data_object(&mut self) -> Result<Vec<u8>, TunerError> {
        let frame = self.read_frame(MDO_END)?;
        debug!("data object received: {:?}", frame.payload);
        Ok(frame.payload)
    }

    /// Read the MDO answering a query or single-shot command.
    ///
    /// Periodic MDO pushes (status bit5 clear) that arrive first are skipped
    /// and count as foreign messages.
    pub fn read_query_response(&mut self) -> Result<Vec<u8>, TunerError> {
        loop {
            let payload = self.read_data_object()?;
            match payload.first() {
                Some(&hst)
                    if payload.len() != BARE_POSITIONS_LEN
                        && !HostStatus(hst).is_query_response() =>
                {
                    debug!("skipping periodic MDO with status {:#04x}", hst);
                    self.skip_message(MDO_END)?;
                }
                _ => return Ok(payload),
            }
        }
    }

    /// Read the motor-position answer to a motor-read query
    pub fn read_motor_positions(&mut self) -> Result<MotorPositions, TunerError> {
        let payload = self.read_query_response()?;
        let positions = decode_motor_positions(&payload)?;
        debug!("motor positions: {}", positions);
        Ok(positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MockTransport;
    use pretty_assertions::assert_eq;

    const OBSERVED: [u8; 14] = [128, 28, 48, 0, 0, 1, 2, 160, 15, 119, 0, 89, 128, 16];

    fn reader(mock: &mut MockTransport) -> ResponseReader<'_> {
        ResponseReader::new(mock, Duration::from_millis(10), ResyncLimits::default())
    }

    #[test]
    fn test_bare_confirmation() {
        let mut mock = MockTransport::with_response(&[128, 4]);
        reader(&mut mock).read_confirmation().unwrap();
        assert_eq!(mock.pending(), 0);
    }

    #[test]
    fn test_confirmation_after_noise() {
        let mut mock = MockTransport::with_response(&[1, 2, 3, 128, 4, 0xEE]);
        reader(&mut mock).read_confirmation().unwrap();
        assert_eq!(mock.pending(), 1);
    }

    #[test]
    fn test_confirmation_data_byte_four_is_not_terminator() {
        let mut mock = MockTransport::with_response(&[128, 28, 4, 4, 128, 4]);
        let frame = reader(&mut mock).read_frame(CONFIRM).unwrap();
        assert_eq!(frame.payload, vec![4, 4]);
        assert!(frame.has_data);
    }

    #[test]
    fn test_observed_object() {
        let mut mock = MockTransport::with_response(&OBSERVED);
        let payload = reader(&mut mock).read_data_object().unwrap();
        assert_eq!(payload, vec![48, 0, 0, 1, 2, 160, 15, 119, 0, 89]);
    }

    #[test]
    fn test_payload_sixteen_is_data() {
        let mut mock = MockTransport::with_response(&[128, 28, 16, 16, 128, 128, 7, 128, 16]);
        let payload = reader(&mut mock).read_data_object().unwrap();
        assert_eq!(payload, vec![16, 16, 128, 7]);
    }

    #[test]
    fn test_escaped_marker_while_syncing_is_skipped() {
        // joined mid-payload: 128,128 is a literal, not a message start
        let mut mock = MockTransport::with_response(&[5, 128, 128, 6, 128, 4]);
        reader(&mut mock).read_confirmation().unwrap();
        assert_eq!(mock.pending(), 0);
    }

    #[test]
    fn test_foreign_message_skipped() {
        let mut bytes = vec![128, 28, 1, 2, 128, 99];
        bytes.extend_from_slice(&OBSERVED);
        let mut mock = MockTransport::with_response(&bytes);
        let payload = reader(&mut mock).read_data_object().unwrap();
        assert_eq!(payload[0], 48);
    }

    #[test]
    fn test_restarted_object() {
        let mut mock = MockTransport::with_response(&[128, 28, 9, 9, 128, 28, 1, 128, 16]);
        let payload = reader(&mut mock).read_data_object().unwrap();
        assert_eq!(payload, vec![1]);
    }

    #[test]
    fn test_motor_positions() {
        let mut mock = MockTransport::with_response(&OBSERVED);
        let positions = reader(&mut mock).read_motor_positions().unwrap();
        assert_eq!(positions, MotorPositions::new(0, 513, 4000));
    }

    #[test]
    fn test_periodic_push_skipped_before_query_answer() {
        // periodic MDO: status 0x10, motors only, no trailer
        let mut bytes = vec![128, 28, 0x10, 1, 0, 1, 0, 1, 0, 128, 16];
        bytes.extend_from_slice(&OBSERVED);
        let mut mock = MockTransport::with_response(&bytes);
        let positions = reader(&mut mock).read_motor_positions().unwrap();
        assert_eq!(positions, MotorPositions::new(0, 513, 4000));
    }

    #[test]
    fn test_silence_is_timeout() {
        let mut mock = MockTransport::new();
        assert!(matches!(
            reader(&mut mock).read_confirmation(),
            Err(TunerError::Timeout)
        ));
        let mut mock = MockTransport::with_response(&[128, 28, 1, 2, 3]);
        assert!(matches!(
            reader(&mut mock).read_data_object(),
            Err(TunerError::Timeout)
        ));
    }

    #[test]
    fn test_noise_bound() {
        let mut mock = MockTransport::with_response(&[0u8; 600]);
        assert!(matches!(
            reader(&mut mock).read_confirmation(),
            Err(TunerError::ProtocolDesync(_))
        ));
    }

    #[test]
    fn test_foreign_message_bound() {
        let mut bytes = Vec::new();
        for _ in 0..10 {
            bytes.extend_from_slice(&[128, 99]);
        }
        bytes.extend_from_slice(&[128, 4]);
        let mut mock = MockTransport::with_response(&bytes);
        assert!(matches!(
            reader(&mut mock).read_confirmation(),
            Err(TunerError::ProtocolDesync(_))
        ));
    }

    #[test]
    fn test_payload_bound() {
        let limits = ResyncLimits {
            max_payload_len: 4,
            ..ResyncLimits::default()
        };
        let mut mock = MockTransport::with_response(&[128, 28, 1, 2, 3, 4, 5, 128, 16]);
        let mut reader = ResponseReader::new(&mut mock, Duration::from_millis(10), limits);
        assert!(matches!(
            reader.read_data_object(),
            Err(TunerError::ProtocolDesync(_))
        ));
    }

    #[test]
    fn test_payload_bound_counts_escaped_markers() {
        let mut bytes = vec![128, 28];
        for _ in 0..300 {
            bytes.extend_from_slice(&[128, 128]);
        }
        bytes.extend_from_slice(&[128, 16]);
        let mut mock = MockTransport::with_response(&bytes);
        assert!(matches!(
            reader(&mut mock).read_data_object(),
            Err(TunerError::ProtocolDesync(_))
        ));
    }

    #[test]
    fn test_escaped_markers_within_bound() {
        let limits = ResyncLimits {
            max_payload_len: 4,
            ..ResyncLimits::default()
        };
        let mut mock = MockTransport::with_response(&[128, 28, 1, 128, 128, 128, 128, 2, 128, 16]);
        let mut reader = ResponseReader::new(&mut mock, Duration::from_millis(10), limits);
        assert_eq!(reader.read_data_object().unwrap(), vec![1, 128, 128, 2]);
    }

    #[test]
    fn test_query_response_skips_periodic_push() {
        let mut bytes = vec![128, 28, 0x10, 1, 0, 1, 0, 1, 0, 128, 16];
        bytes.extend_from_slice(&OBSERVED);
        let mut mock = MockTransport::with_response(&bytes);
        let payload = reader(&mut mock).read_query_response().unwrap();
        assert_eq!(payload[0], 48);
        assert_eq!(mock.pending(), 0);
    }

    #[test]
    fn test_periodic_pushes_are_bounded() {
        let mut bytes = Vec::new();
        for _ in 0..10 {
            bytes.extend_from_slice(&[128, 28, 0x10, 1, 0, 1, 0, 1, 0, 128, 16]);
        }
        bytes.extend_from_slice(&OBSERVED);
        let mut mock = MockTransport::with_response(&bytes);
        assert!(matches!(
            reader(&mut mock).read_query_response(),
            Err(TunerError::ProtocolDesync(_))
        ));
    }
}
