//! Tuner facade
//!
//! Owns the connection and exposes the instrument's operations. Every
//! operation is one write followed by at most one read; nothing is pipelined
//! and nothing is retried.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::TunerConfig;
use crate::protocol::{
    Command, MotorPositions, ResponseKind, ResponseReader, SerialTransport, StubId, Transport,
    TunerError,
};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No transport held
    Disconnected,
    /// Transport open and ready
    Connected,
}

/// What a command exchange produced
#[derive(Debug, Clone, PartialEq, Eq)]
enum Reply {
    Nothing,
    Acknowledged,
    Payload(Vec<u8>),
    Positions(MotorPositions),
}

/// Driver for one Homer automatic tuner
pub struct Tuner {
    /// Exclusively owned link to the instrument
    transport: Option<Box<dyn Transport>>,
    state: ConnectionState,
    config: TunerConfig,
    /// Instrument mode; it powers up with continuous autotuning on
    continuous_autotune: bool,
    /// Bytes / commands written since creation
    tx_bytes: u64,
    tx_commands: u64,
}

impl Tuner {
    /// Create a tuner driver (not yet connected)
    pub fn new(config: TunerConfig) -> Self {
        Self {
            transport: None,
            state: ConnectionState::Disconnected,
            config,
            continuous_autotune: true,
            tx_bytes: 0,
            tx_commands: 0,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True while a transport is held
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Whether the instrument is believed to be in continuous autotuning mode
    pub fn continuous_autotune(&self) -> bool {
        self.continuous_autotune
    }

    /// Settings this driver was created with, updated by `connect`
    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    /// Bytes and commands written so far
    pub fn counters(&self) -> (u64, u64) {
        (self.tx_bytes, self.tx_commands)
    }

    /// Open the serial port at `address` and `baud_rate`.
    ///
    /// Any previously held connection is closed first.
    pub fn connect(&mut self, address: &str, baud_rate: u32) -> Result<(), TunerError> {
        self.close();
        let transport = SerialTransport::open(address, baud_rate)?;
        self.config.port_name = address.to_string();
        self.config.baud_rate = baud_rate;
        info!("connected to tuner on {} at {} baud", address, baud_rate);
        self.attach(Box::new(transport));
        Ok(())
    }

    /// Connect using the port and baud rate from the configuration
    pub fn connect_configured(&mut self) -> Result<(), TunerError> {
        let address = self.config.port_name.clone();
        let baud_rate = self.config.baud_rate;
        self.connect(&address, baud_rate)
    }

    /// Take ownership of an already-open transport and become connected
    pub fn attach(&mut self, transport: Box<dyn Transport>) {
        self.close();
        self.transport = Some(transport);
        self.state = ConnectionState::Connected;
        self.continuous_autotune = true;
    }

    /// Release the connection; no-op when already disconnected
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            info!("tuner connection closed");
        }
        self.state = ConnectionState::Disconnected;
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    /// Write one command and read its matching response
    fn exchange(&mut self, command: &Command) -> Result<Reply, TunerError> {
        let timeout = self.timeout();
        let limits = self.config.resync;
        let transport = self.transport.as_mut().ok_or(TunerError::NotConnected)?;

        let bytes = command.encode();
        debug!("sending {:?}: {:?}", command, bytes);
        transport.write_all(&bytes)?;
        self.tx_bytes = self.tx_bytes.saturating_add(bytes.len() as u64);
        self.tx_commands = self.tx_commands.saturating_add(1);

        let mut reader = ResponseReader::new(transport.as_mut(), timeout, limits);
        match command.response() {
            ResponseKind::None => Ok(Reply::Nothing),
            ResponseKind::Confirmation => reader.read_confirmation().map(|_| Reply::Acknowledged),
            ResponseKind::DataObject => reader.read_query_response().map(Reply::Payload),
            ResponseKind::MotorPositions => reader.read_motor_positions().map(Reply::Positions),
        }
    }

    fn require_connected(&self) -> Result<(), TunerError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TunerError::NotConnected)
        }
    }

    /// Move the three stubs to the given step positions
    pub fn set_motor_positions(
        &mut self,
        stub1: u16,
        stub2: u16,
        stub3: u16,
    ) -> Result<(), TunerError> {
        let positions = MotorPositions::new(stub1, stub2, stub3);
        if let Reply::Payload(payload) = self.exchange(&Command::SetMotors(positions))? {
            debug!("motor set acknowledged with {} payload bytes", payload.len());
        }
        Ok(())
    }

    /// Query the current stub positions
    pub fn read_motor_positions(&mut self) -> Result<MotorPositions, TunerError> {
        match self.exchange(&Command::ReadMotors)? {
            Reply::Positions(p) => Ok(p),
            other => Err(TunerError::ProtocolDesync(format!(
                "motor read produced {:?}",
                other
            ))),
        }
    }

    /// Drive all stubs to their home position and wait for confirmation
    pub fn all_stubs_home(&mut self) -> Result<(), TunerError> {
        self.exchange(&Command::HomeAll).map(|_| ())
    }

    /// Stop all motors immediately; no response is read
    pub fn hard_stop_motors(&mut self) -> Result<(), TunerError> {
        self.exchange(&Command::HardStop).map(|_| ())
    }

    /// Switch continuous autotuning on or off
    pub fn autotuning(&mut self, on: bool) -> Result<(), TunerError> {
        self.exchange(&Command::Autotune(on))?;
        self.continuous_autotune = on;
        Ok(())
    }

    /// Perform one autotuning step; continuous autotuning must be off
    pub fn single_autotuning_step(&mut self) -> Result<(), TunerError> {
        self.require_connected()?;
        if self.continuous_autotune {
            return Err(TunerError::InvalidArgument(
                "continuous autotuning is enabled, turn it off first".to_string(),
            ));
        }
        self.exchange(&Command::AutotuneStep).map(|_| ())
    }

    /// Home one stub (1..=3)
    pub fn selected_stub_home(&mut self, stub: u8) -> Result<(), TunerError> {
        self.require_connected()?;
        let stub = StubId::try_from(stub)?;
        self.exchange(&Command::HomeStub(stub)).map(|_| ())
    }

    /// Enable or disable tune positions in continuous measurement data
    pub fn send_tune_positions(&mut self, on: bool) -> Result<(), TunerError> {
        self.exchange(&Command::TunePositions(on)).map(|_| ())
    }

    /// Restart the instrument; it sends no confirmation
    pub fn reset(&mut self) -> Result<(), TunerError> {
        self.exchange(&Command::Reset)?;
        self.continuous_autotune = true;
        Ok(())
    }

    /// Shutdown sequence: home all stubs, read back positions, then close.
    ///
    /// Failures while homing or reading are logged and don't prevent the
    /// close. Returns the positions if the read succeeded.
    pub fn park_and_close(&mut self) -> Option<MotorPositions> {
        if !self.is_connected() {
            return None;
        }
        if let Err(e) = self.all_stubs_home() {
            warn!("homing before close failed: {}", e);
        }
        let positions = match self.read_motor_positions() {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("reading positions before close failed: {}", e);
                None
            }
        };
        self.close();
        positions
    }
}

impl Drop for Tuner {
    fn drop(&mut self) {
        self.close();
    }
}
