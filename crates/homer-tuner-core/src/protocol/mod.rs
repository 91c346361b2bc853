//! Serial Protocol Communication
//!
//! Implements the Homer byte-stuffed command/response protocol: framing,
//! command encoding and the response state machine.

pub mod codec;
pub mod commands;
mod error;
pub mod mdo;
pub mod reader;
pub mod serial;
mod transport;

pub use codec::{decode_data_object, stuff_command, stuff_data_object, unstuff, DataObject};
pub use commands::{Command, Opcode, ResponseKind, StubId};
pub use error::TunerError;
pub use mdo::{HostStatus, Mdo, MotorData, MotorPositions};
pub use reader::{Frame, ResponseReader, ResyncLimits};
pub use serial::{list_ports, PortInfo, SerialTransport};
pub use transport::{MockTransport, Transport};

/// Escape/control marker; as data it is always sent doubled
pub const MARKER: u8 = 128;

/// Follows `MARKER` to announce a data object
pub const DATA_BEGIN: u8 = 28;

/// End code of Measurement Data Objects and the motor-read response
pub const MDO_END: u8 = 16;

/// End code of command execution confirmations
pub const CONFIRM: u8 = 4;

/// End code of generic ASCII data-object commands (`ATC ...`, `M1H n`)
pub const DATA_OBJECT_END: u8 = 99;

/// Default baud rate of the instrument's serial interface
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Per-read timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;
