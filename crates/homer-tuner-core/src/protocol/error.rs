//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to the tuner
#[derive(Error, Debug)]
pub enum TunerError {
    /// Operation attempted without an open connection
    #[error("Not connected to tuner")]
    NotConnected,

    /// Port could not be opened, written or read
    #[error("Serial transport error: {0}")]
    Transport(String),

    /// No complete response within the read timeout
    #[error("Timed out waiting for tuner response")]
    Timeout,

    /// Rejected before anything was written
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Response stream could not be framed or decoded
    #[error("Protocol desync: {0}")]
    ProtocolDesync(String),

    /// MDO checksum byte disagrees with its contents
    #[error("MDO checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch {
        /// Sum computed over the received bytes
        expected: u8,
        /// `CS` byte sent by the instrument
        actual: u8,
    },

    /// Settings file could not be parsed or written
    #[error("Settings error: {0}")]
    Settings(String),

    /// Local file access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
