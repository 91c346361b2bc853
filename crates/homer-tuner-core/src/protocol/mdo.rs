//! Measurement Data Objects
//!
//! The instrument reports status, measurement results and motor data in MDOs:
//! data objects closed by `MARKER, MDO_END`. The status byte `HST` is always
//! first and its flags say which sections follow:
//!
//! ```text
//! HST [measurement block: 21 bytes] [M1L M1H M2L M2H M3L M3H [MS1 MS2 CS]]
//! ```
//!
//! `CS` is the 8-bit wrapping sum of every byte before it. Only the motor
//! section has been checked against a live instrument; the measurement block
//! is carried as opaque bytes.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::TunerError;

/// Length of the measurement results block (HER through SRH)
pub const MEASUREMENT_LEN: usize = 21;

/// Three little-endian 16-bit stub positions
const POSITIONS_LEN: usize = 6;

/// MS1, MS2, CS
const MOTOR_TRAILER_LEN: usize = 3;

/// Homer status byte (`HST`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStatus(pub u8);

impl HostStatus {
    /// Bit 2: measurement results block present
    pub const MEASUREMENT_INCLUDED: u8 = 0x04;
    /// Bit 4: motor section present
    pub const MOTORS_INCLUDED: u8 = 0x10;
    /// Bit 5: answers a query; clear on periodic pushes
    pub const QUERY_RESPONSE: u8 = 0x20;

    /// Motor data follows the status byte
    pub fn motors_included(self) -> bool {
        self.0 & Self::MOTORS_INCLUDED != 0
    }

    /// The MDO answers a query or single-shot command rather than being a
    /// periodic push
    pub fn is_query_response(self) -> bool {
        self.0 & Self::QUERY_RESPONSE != 0
    }

    /// Homer measurement results follow the status byte
    pub fn measurement_included(self) -> bool {
        self.0 & Self::MEASUREMENT_INCLUDED != 0
    }
}

/// Stub positions in motor steps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MotorPositions {
    /// Stub 1
    pub stub1: u16,
    /// Stub 2
    pub stub2: u16,
    /// Stub 3
    pub stub3: u16,
}

impl MotorPositions {
    /// Positions for stubs 1, 2 and 3
    pub fn new(stub1: u16, stub2: u16, stub3: u16) -> Self {
        Self {
            stub1,
            stub2,
            stub3,
        }
    }

    /// Decode `stub1_lo, stub1_hi, stub2_lo, stub2_hi, stub3_lo, stub3_hi`
    pub fn from_le_bytes(bytes: &[u8; POSITIONS_LEN]) -> Self {
        Self {
            stub1: LittleEndian::read_u16(&bytes[0..2]),
            stub2: LittleEndian::read_u16(&bytes[2..4]),
            stub3: LittleEndian::read_u16(&bytes[4..6]),
        }
    }
}

impl fmt::Display for MotorPositions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.stub1, self.stub2, self.stub3)
    }
}

/// Motor section of an MDO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorData {
    /// Current stub positions
    pub positions: MotorPositions,
    /// `MS1, MS2`: moving / in position / error flags, when sent
    pub status: Option<[u8; 2]>,
}

/// A decoded Measurement Data Object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mdo {
    /// Leading `HST` byte
    pub status: HostStatus,
    /// Raw measurement results block, when included
    pub measurement: Option<Vec<u8>>,
    /// Motor section, when included
    pub motors: Option<MotorData>,
}

/// 8-bit wrapping sum used as the MDO checksum
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

fn take<'a>(rest: &mut &'a [u8], n: usize, what: &str) -> Result<&'a [u8], TunerError> {
    if rest.len() < n {
        return Err(TunerError::ProtocolDesync(format!(
            "MDO too short for {}: need {} bytes, have {}",
            what,
            n,
            rest.len()
        )));
    }
    let (head, tail) = rest.split_at(n);
    *rest = tail;
    Ok(head)
}

impl Mdo {
    /// Parse an unstuffed MDO payload
    pub fn parse(payload: &[u8]) -> Result<Self, TunerError> {
        let (&hst, mut rest) = payload
            .split_first()
            .ok_or_else(|| TunerError::ProtocolDesync("empty MDO".to_string()))?;
        let status = HostStatus(hst);

        let measurement = if status.measurement_included() {
            Some(take(&mut rest, MEASUREMENT_LEN, "measurement results")?.to_vec())
        } else {
            None
        };

        let motors = if status.motors_included() {
            let raw = take(&mut rest, POSITIONS_LEN, "motor positions")?;
            let mut pos = [0u8; POSITIONS_LEN];
            pos.copy_from_slice(raw);
            let positions = MotorPositions::from_le_bytes(&pos);

            let motor_status = match rest.len() {
                0 => None,
                MOTOR_TRAILER_LEN => {
                    let expected = checksum(&payload[..payload.len() - 1]);
                    let actual = rest[2];
                    if expected != actual {
                        return Err(TunerError::ChecksumMismatch { expected, actual });
                    }
                    let ms = [rest[0], rest[1]];
                    rest = &[];
                    Some(ms)
                }
                n => {
                    return Err(TunerError::ProtocolDesync(format!(
                        "unexpected {} trailing bytes after motor positions",
                        n
                    )))
                }
            };
            Some(MotorData {
                positions,
                status: motor_status,
            })
        } else {
            None
        };

        if !rest.is_empty() {
            return Err(TunerError::ProtocolDesync(format!(
                "{} unparsed bytes in MDO with status {:#04x}",
                rest.len(),
                hst
            )));
        }

        Ok(Self {
            status,
            measurement,
            motors,
        })
    }
}

/// Extract motor positions from a motor-read response payload.
///
/// Accepts either a full MDO (status byte first) or a bare six-byte position
/// block.
pub fn decode_motor_positions(payload: &[u8]) -> Result<MotorPositions, TunerError> {
    if payload.len() == POSITIONS_LEN {
        let mut pos = [0u8; POSITIONS_LEN];
        pos.copy_from_slice(payload);
        return Ok(MotorPositions::from_le_bytes(&pos));
    }
    let mdo = Mdo::parse(payload)?;
    mdo.motors.map(|m| m.positions).ok_or_else(|| {
        TunerError::ProtocolDesync(format!(
            "MDO status {:#04x} carries no motor data",
            mdo.status.0
        ))
    })
}
