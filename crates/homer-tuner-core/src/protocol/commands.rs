//! Protocol commands
//!
//! Defines the instrument opcodes and the logical commands the driver sends,
//! each mapped to its exact wire bytes.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::codec::{stuff_command, stuff_data_object};
use super::{MotorPositions, TunerError, DATA_OBJECT_END};

/// One-byte instrument codes, as listed in the instrument's communication
/// protocol. Most are only reachable through the ASCII command set and are
/// kept so that traffic dumps can be labelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    /// Continuous autotuning off
    AutotuneOff = 0,
    /// Continuous autotuning on
    AutotuneOn = 1,
    /// One autotuning step
    AutotuneSingle = 2,
    /// Query whether autotune parameters may be changed
    CanSetAutotuneParams = 3,
    /// End message of a command execution confirmation
    Confirm = 4,
    /// Read autotune parameters
    GetAutotune = 5,
    /// Set the autotune frequency delta
    SetFrequencyDelta = 6,
    /// Set the substitute frequency
    SetFrequencySubstitute = 7,
    /// Restart the instrument
    Reset = 8,
    /// End message of a Measurement Data Object
    MeasObject = 16,
    /// Start a frequency sweep
    SweepStart = 17,
    /// Stop a frequency sweep
    SweepStop = 18,
    /// Hard stop of all motors
    MotorStop = 19,
    /// Announces that data bytes follow
    DataBegin = 28,
    /// Halt the measurement server
    ServerHalt = 34,
    /// Fetch the last measurement
    FetchLast = 39,
    /// Waveform data
    Waveform = 53,
    /// Counter value
    Counter = 56,
    /// Set measurement averaging
    Averaging = 57,
    /// Read instrument timeouts
    GetTimeouts = 61,
    /// Initialize (home) all motors
    MotorInit = 69,
    /// Home one motor
    OneHome = 70,
    /// Set motor positions; also the end code of the `MPO` data object
    MotorSet = 71,
    /// ASCII autotune command
    AutotuneCommand = 72,
    /// Set autotune parameters
    AutotuneParams = 73,
    /// Read motor positions
    MotorRead = 74,
    /// Set the sample frequency
    SampleFrequency = 75,
    /// Refresh motor state
    MotorRefresh = 76,
    /// Restart the measurement server
    ServerRestart = 80,
    /// Clear the measurement FIFO
    ClearFifo = 84,
    /// Single measurement
    Measure = 85,
    /// Compute stub positions
    ComputeStubs = 86,
    /// Measure, then compute stub positions
    MeasureCompute = 87,
    /// Measure, then tune
    MeasureTune = 88,
    /// Measure, tune, then measure again
    MeasureTuneMeasure = 89,
    /// Include tune positions in measurement data
    SendTuneOn = 90,
    /// Omit tune positions from measurement data
    SendTuneOff = 91,
    /// Swap stub order
    SetStubSwap = 92,
    /// Miscellaneous settings
    SetOther = 94,
    /// The control marker itself
    CommandLabel = 128,
}

impl Opcode {
    const ALL: [Opcode; 40] = [
        Opcode::AutotuneOff,
        Opcode::AutotuneOn,
        Opcode::AutotuneSingle,
        Opcode::CanSetAutotuneParams,
        Opcode::Confirm,
        Opcode::GetAutotune,
        Opcode::SetFrequencyDelta,
        Opcode::SetFrequencySubstitute,
        Opcode::Reset,
        Opcode::MeasObject,
        Opcode::SweepStart,
        Opcode::SweepStop,
        Opcode::MotorStop,
        Opcode::DataBegin,
        Opcode::ServerHalt,
        Opcode::FetchLast,
        Opcode::Waveform,
        Opcode::Counter,
        Opcode::Averaging,
        Opcode::GetTimeouts,
        Opcode::MotorInit,
        Opcode::OneHome,
        Opcode::MotorSet,
        Opcode::AutotuneCommand,
        Opcode::AutotuneParams,
        Opcode::MotorRead,
        Opcode::SampleFrequency,
        Opcode::MotorRefresh,
        Opcode::ServerRestart,
        Opcode::ClearFifo,
        Opcode::Measure,
        Opcode::ComputeStubs,
        Opcode::MeasureCompute,
        Opcode::MeasureTune,
        Opcode::MeasureTuneMeasure,
        Opcode::SendTuneOn,
        Opcode::SendTuneOff,
        Opcode::SetStubSwap,
        Opcode::SetOther,
        Opcode::CommandLabel,
    ];

    /// Wire value of this opcode
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Look up the opcode for a wire value
    pub fn from_byte(b: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.byte() == b)
    }
}

/// One of the three motorized stubs, numbered 1..=3
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubId(u8);

impl StubId {
    /// Stub number, 1..=3
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for StubId {
    type Error = TunerError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        if (1..=3).contains(&n) {
            Ok(Self(n))
        } else {
            Err(TunerError::InvalidArgument(format!(
                "invalid stub number {}, only 1, 2 and 3 are allowed",
                n
            )))
        }
    }
}

impl fmt::Display for StubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the instrument sends back for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Nothing; the command is fire-and-forget
    None,
    /// A message ending in `MARKER, CONFIRM`
    Confirmation,
    /// The MDO answering this command, payload not needed
    DataObject,
    /// A data object ending in `MARKER, MDO_END` carrying motor positions
    MotorPositions,
}

/// Logical commands understood by the tuner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Hard stop of all motors
    HardStop,
    /// Initialize all motors (drive every stub home)
    HomeAll,
    /// Query the current motor positions
    ReadMotors,
    /// Restart the instrument
    Reset,
    /// Switch continuous autotuning on or off (`ATC 1` / `ATC 0`)
    Autotune(bool),
    /// One autotuning step with the latest measured data (`ATC S`)
    AutotuneStep,
    /// Home a single stub (`M1H <n>`)
    HomeStub(StubId),
    /// Send tune positions during continuous measurement (`ATC T` / `ATC F`)
    TunePositions(bool),
    /// Move the stubs (`MPO <p1> <p2> <p3>`)
    SetMotors(MotorPositions),
}

impl Command {
    /// ASCII text carried by data-object commands
    pub fn ascii(&self) -> Option<String> {
        match self {
            Command::Autotune(true) => Some("ATC 1".to_string()),
            Command::Autotune(false) => Some("ATC 0".to_string()),
            Command::AutotuneStep => Some("ATC S".to_string()),
            Command::HomeStub(stub) => Some(format!("M1H {}", stub)),
            Command::TunePositions(true) => Some("ATC T".to_string()),
            Command::TunePositions(false) => Some("ATC F".to_string()),
            Command::SetMotors(p) => Some(format!("MPO {} {} {}", p.stub1, p.stub2, p.stub3)),
            Command::HardStop | Command::HomeAll | Command::ReadMotors | Command::Reset => None,
        }
    }

    /// Build the exact bytes to put on the wire
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::HardStop => stuff_command(Opcode::MotorStop.byte()),
            Command::HomeAll => stuff_command(Opcode::MotorInit.byte()),
            Command::ReadMotors => stuff_command(Opcode::MotorRead.byte()),
            Command::Reset => stuff_command(Opcode::Reset.byte()),
            Command::SetMotors(_) => {
                // MPO is line-terminated and closed with the motor-set code
                // instead of the generic data object end.
                let mut payload = self.ascii().unwrap_or_default().into_bytes();
                payload.extend_from_slice(b"\r\n");
                stuff_data_object(&payload, Opcode::MotorSet.byte())
            }
            _ => {
                let text = self.ascii().unwrap_or_default();
                stuff_data_object(text.as_bytes(), DATA_OBJECT_END)
            }
        }
    }

    /// Response shape the instrument answers this command with
    pub fn response(&self) -> ResponseKind {
        match self {
            Command::HardStop | Command::Reset => ResponseKind::None,
            Command::ReadMotors => ResponseKind::MotorPositions,
            Command::SetMotors(_) => ResponseKind::DataObject,
            Command::HomeAll
            | Command::Autotune(_)
            | Command::AutotuneStep
            | Command::HomeStub(_)
            | Command::TunePositions(_) => ResponseKind::Confirmation,
        }
    }
}
