//! # Homer Tuner Core Library
//!
//! Driver for the Homer automatic impedance tuner over its serial link.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Byte-stuffed framing of commands and data objects
//! - A resynchronizing response reader for confirmations and MDOs
//! - A blocking facade for stub motion, homing and autotuning
//! - Persisted connection settings
//!
//! ## Example
//!
//! ```rust,no_run
//! use homer_tuner_core::{Tuner, TunerConfig};
//!
//! # fn main() -> Result<(), homer_tuner_core::protocol::TunerError> {
//! let mut tuner = Tuner::new(TunerConfig::default());
//! tuner.connect("/dev/ttyUSB0", 115200)?;
//!
//! tuner.all_stubs_home()?;
//! tuner.set_motor_positions(0, 120, 227)?;
//! let positions = tuner.read_motor_positions()?;
//! println!("stubs at {}", positions);
//!
//! tuner.park_and_close();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod protocol;
pub mod tuner;

pub use config::{StepResolution, TunerConfig};
pub use tuner::{ConnectionState, Tuner};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{StepResolution, TunerConfig};
    pub use crate::protocol::{MotorPositions, TunerError};
    pub use crate::tuner::{ConnectionState, Tuner};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
