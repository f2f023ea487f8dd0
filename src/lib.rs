//! # Equinox - Seasonal battery storage control for SolarEdge inverters
//!
//! Equinox keeps a SolarEdge home battery inside a seasonal state-of-energy
//! window by driving the inverter's storage control registers over Modbus
//! TCP. Each iteration reads a device snapshot, resolves the control
//! parameters for today from a schedule file, decides which registers need
//! to change, and writes them with read-back verification.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `registers`: Control register map and mode enumerations
//! - `channel`: Register transport abstraction and fault classification
//! - `modbus`: Modbus TCP channel and register codecs
//! - `schedule`: Seasonal schedule parsing and resolution
//! - `snapshot`: Device state snapshot and info report
//! - `controls`: Charge window policy
//! - `writer`: Verified writes with bounded retries
//! - `driver`: Control loop orchestration

pub mod channel;
pub mod config;
pub mod controls;
pub mod driver;
pub mod error;
pub mod logging;
pub mod modbus;
pub mod registers;
pub mod schedule;
pub mod snapshot;
pub mod writer;


// Re-export commonly used types
pub use channel::{Fault, RegisterChannel, WriteAck};
pub use config::Config;
pub use driver::{BatteryController, CycleReport};
pub use error::{EquinoxError, Result};
pub use modbus::ModbusChannel;
pub use registers::{ChargeDischargeMode, RegisterName};
pub use schedule::{ControlParameters, FileScheduleProvider, Schedule};
pub use writer::{RetryingWriter, WriteOutcome, WriteStatus};
