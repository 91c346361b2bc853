//! Serial port handling
//!
//! Provides the [`SerialTransport`] used for real instruments, plus port
//! enumeration for operator tooling.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::io::{Read, Write};
use std::time::Duration;

use super::{Transport, TunerError, DEFAULT_TIMEOUT_MS};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM4")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb_info) => Self {
                name: info.port_name,
                vid: Some(usb_info.vid),
                pid: Some(usb_info.pid),
                manufacturer: usb_info.manufacturer,
                product: usb_info.product,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

/// Sort key so USB adapters come first (ttyUSB*, then ttyACM*, numerically),
/// then COM ports by number, then everything else by name.
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    let numbered = |rest: &str| rest.parse::<usize>().unwrap_or(usize::MAX);
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        return (0, numbered(rest), basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        return (1, numbered(rest), basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("COM") {
        return (2, numbered(rest), basename.to_string());
    }
    (3, 0, basename.to_string())
}

/// List available serial ports with deterministic ordering
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        let p = PortInfo::from(info);
        map.entry(p.name.clone()).or_insert(p);
    }

    // udev may not have tagged freshly plugged adapters yet
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyUSB") || fname.starts_with("ttyACM") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone())
                        .or_insert_with(|| PortInfo::bare(full));
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    v
}

/// Open a serial port at `baud_rate` with the given read/write timeout
pub fn open_port(
    name: &str,
    baud_rate: u32,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>, TunerError> {
    serialport::new(name, baud_rate)
        .timeout(timeout)
        .open()
        .map_err(|e| TunerError::Transport(format!("{}: {}", name, e)))
}

/// Configure a serial port for the tuner: 8 data bits, no parity, 1 stop bit
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), TunerError> {
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| TunerError::Transport(e.to_string()))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| TunerError::Transport(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| TunerError::Transport(e.to_string()))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| TunerError::Transport(e.to_string()))?;
    Ok(())
}

/// [`Transport`] over an exclusively owned serial port
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    /// Timeout currently programmed into the port, to avoid an ioctl per byte
    current_timeout: Duration,
}

impl SerialTransport {
    /// Open and configure `address` at `baud_rate`
    pub fn open(address: &str, baud_rate: u32) -> Result<Self, TunerError> {
        let timeout = Duration::from_millis(DEFAULT_TIMEOUT_MS);
        let mut port = open_port(address, baud_rate, timeout)?;
        configure_port(port.as_mut())?;
        port.clear(serialport::ClearBuffer::All)
            .map_err(|e| TunerError::Transport(e.to_string()))?;
        Ok(Self {
            port,
            current_timeout: timeout,
        })
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TunerError> {
        self.port
            .write_all(bytes)
            .and_then(|_| self.port.flush())
            .map_err(|e| TunerError::Transport(e.to_string()))
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<u8, TunerError> {
        if timeout != self.current_timeout {
            self.port
                .set_timeout(timeout)
                .map_err(|e| TunerError::Transport(e.to_string()))?;
            self.current_timeout = timeout;
        }

        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(1) => Ok(buf[0]),
            Ok(_) => Err(TunerError::Timeout),
            Err(ref e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Err(TunerError::Timeout)
            }
            Err(e) => Err(TunerError::Transport(e.to_string())),
        }
    }
}
