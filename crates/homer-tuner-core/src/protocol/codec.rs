//! Frame codec
//!
//! Every message on the wire is built from two-byte control transitions
//! `MARKER, code`. Payload bytes equal to `MARKER` are doubled so they can't
//! be mistaken for a transition:
//!
//! ```text
//! simple command : 128, <opcode>
//! data object    : 128, 28, <stuffed payload>, 128, <end code>
//! ```
//!
//! Sending the payload `30, 128, 40` with end code 99 therefore produces
//! `128, 28, 30, 128, 128, 40, 128, 99`.

use super::{TunerError, DATA_BEGIN, MARKER};

/// A decoded data object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataObject {
    /// Code from the closing `MARKER, code` transition
    pub end_code: u8,
    /// Payload with doubled markers collapsed
    pub payload: Vec<u8>,
}

/// Encode a payload-less command: `[MARKER, opcode]`
pub fn stuff_command(opcode: u8) -> Vec<u8> {
    vec![MARKER, opcode]
}

/// Append `payload` to `out`, doubling every byte equal to `MARKER`
pub fn escape_payload(out: &mut Vec<u8>, payload: &[u8]) {
    for &b in payload {
        out.push(b);
        if b == MARKER {
            out.push(MARKER);
        }
    }
}

/// Encode a data object with the given end code
pub fn stuff_data_object(payload: &[u8], end_code: u8) -> Vec<u8> {
    let markers = payload.iter().filter(|&&b| b == MARKER).count();
    let mut out = Vec::with_capacity(payload.len() + markers + 4);
    out.push(MARKER);
    out.push(DATA_BEGIN);
    escape_payload(&mut out, payload);
    out.push(MARKER);
    out.push(end_code);
    out
}

/// Collapse doubled markers in a stuffed payload body.
///
/// A lone `MARKER` is a control transition and has no place inside a body,
/// so it is reported as a desync.
pub fn unstuff(stuffed: &[u8]) -> Result<Vec<u8>, TunerError> {
    let mut out = Vec::with_capacity(stuffed.len());
    let mut iter = stuffed.iter().copied().enumerate();
    while let Some((i, b)) = iter.next() {
        if b != MARKER {
            out.push(b);
            continue;
        }
        match iter.next() {
            Some((_, MARKER)) => out.push(MARKER),
            Some((_, code)) => {
                return Err(TunerError::ProtocolDesync(format!(
                    "control transition {} at offset {} inside payload",
                    code, i
                )))
            }
            None => {
                return Err(TunerError::ProtocolDesync(
                    "payload ends with an unpaired marker".to_string(),
                ))
            }
        }
    }
    Ok(out)
}

/// Decode one complete data object from a buffer holding exactly that object
pub fn decode_data_object(wire: &[u8]) -> Result<DataObject, TunerError> {
    if wire.len() < 4 || wire[0] != MARKER || wire[1] != DATA_BEGIN {
        return Err(TunerError::ProtocolDesync(
            "data object must start with MARKER, DATA_BEGIN".to_string(),
        ));
    }
    let (body, tail) = wire[2..].split_at(wire.len() - 4);
    if tail[0] != MARKER || tail[1] == MARKER {
        return Err(TunerError::ProtocolDesync(
            "data object must end with MARKER, <end code>".to_string(),
        ));
    }
    // `body, 128` could be the first half of an escaped pair eating the real
    // end marker; an odd run of trailing markers means the frame is cut short.
    let trailing = body.iter().rev().take_while(|&&b| b == MARKER).count();
    if trailing % 2 == 1 {
        return Err(TunerError::ProtocolDesync(
            "data object truncated inside an escaped marker".to_string(),
        ));
    }
    Ok(DataObject {
        end_code: tail[1],
        payload: unstuff(body)?,
    })
}
