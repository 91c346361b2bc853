//! Tuner settings
//!
//! Persisted operator settings (serial address, baud rate, step resolution)
//! and the dial-to-steps conversion the operator front ends share.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::protocol::{ResyncLimits, TunerError, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS};

/// Full stub travel in the finest step resolution
pub const MAX_STUB_STEPS: u16 = 227;

/// How operator dial values map onto motor steps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepResolution {
    /// One dial unit is ten motor steps (dial 0..=22.7)
    #[default]
    Coarse,
    /// One dial unit is one motor step (dial 0..=227)
    Fine,
}

impl StepResolution {
    /// Motor steps per dial unit
    pub fn scale(self) -> u16 {
        match self {
            StepResolution::Coarse => 10,
            StepResolution::Fine => 1,
        }
    }

    /// Largest dial value that stays within stub travel
    pub fn max_dial(self) -> f64 {
        f64::from(MAX_STUB_STEPS) / f64::from(self.scale())
    }

    /// Convert a dial value to motor steps, clamped to stub travel
    pub fn to_steps(self, dial: f64) -> u16 {
        if !dial.is_finite() || dial <= 0.0 {
            return 0;
        }
        let steps = (dial * f64::from(self.scale())).round();
        steps.min(f64::from(MAX_STUB_STEPS)) as u16
    }
}

/// Connection and operator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Serial port name (e.g. "COM4" or "/dev/ttyUSB0")
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Per-read timeout in milliseconds
    pub timeout_ms: u64,
    /// Dial resolution used by operator front ends
    pub resolution: StepResolution,
    /// Resync bounds for the response reader
    pub resync: ResyncLimits,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            resolution: StepResolution::default(),
            resync: ResyncLimits::default(),
        }
    }
}

impl TunerConfig {
    /// Settings for a given port at the default baud rate
    pub fn for_port(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }

    /// Per-user settings location, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("homer-tuner").join("settings.json"))
    }

    /// Load settings from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TunerError> {
        let content = fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&content).map_err(|e| {
            TunerError::Settings(format!("{}: {}", path.as_ref().display(), e))
        })
    }

    /// Load settings, falling back to defaults when the file doesn't exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, TunerError> {
        match Self::load(path) {
            Err(TunerError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Save settings as pretty-printed JSON, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TunerError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| TunerError::Settings(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }
}
