//! SolarEdge storage control register map
//!
//! Named control registers with their holding-register address and wire
//! encoding, the mode enumerations that go into them, and the fixed address
//! blocks read for device snapshots.

use crate::error::{EquinoxError, Result};
use serde::Serialize;
use std::fmt;

/// A register value. Mode codes, seconds, percentages and watts are all
/// carried as `f64` and normalised to the wire type with
/// [`RegisterName::normalize`] before comparison.
pub type RegisterValue = f64;

/// Wire encoding of a control register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterKind {
    /// Single 16-bit word
    U16,
    /// Two words, low word first
    U32,
    /// IEEE-754 single, low word first
    F32,
}

impl RegisterKind {
    /// Number of 16-bit words occupied on the wire
    pub fn word_count(self) -> u16 {
        match self {
            RegisterKind::U16 => 1,
            RegisterKind::U32 | RegisterKind::F32 => 2,
        }
    }
}

/// Writable storage control registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterName {
    StorageControlMode,
    StorageBackupReservedSetting,
    StorageDefaultMode,
    RcCmdTimeout,
    RcCmdMode,
    RcChargeLimit,
    RcDischargeLimit,
}

impl RegisterName {
    /// Every control register, in address order
    pub const ALL: [RegisterName; 7] = [
        RegisterName::StorageControlMode,
        RegisterName::StorageBackupReservedSetting,
        RegisterName::StorageDefaultMode,
        RegisterName::RcCmdTimeout,
        RegisterName::RcCmdMode,
        RegisterName::RcChargeLimit,
        RegisterName::RcDischargeLimit,
    ];

    /// Holding register address
    pub fn address(self) -> u16 {
        match self {
            RegisterName::StorageControlMode => 0xE004,
            RegisterName::StorageBackupReservedSetting => 0xE008,
            RegisterName::StorageDefaultMode => 0xE00A,
            RegisterName::RcCmdTimeout => 0xE00B,
            RegisterName::RcCmdMode => 0xE00D,
            RegisterName::RcChargeLimit => 0xE00E,
            RegisterName::RcDischargeLimit => 0xE010,
        }
    }

    pub fn kind(self) -> RegisterKind {
        match self {
            RegisterName::StorageControlMode
            | RegisterName::StorageDefaultMode
            | RegisterName::RcCmdMode => RegisterKind::U16,
            RegisterName::RcCmdTimeout => RegisterKind::U32,
            RegisterName::StorageBackupReservedSetting
            | RegisterName::RcChargeLimit
            | RegisterName::RcDischargeLimit => RegisterKind::F32,
        }
    }

    /// Device documentation name
    pub fn as_str(self) -> &'static str {
        match self {
            RegisterName::StorageControlMode => "storage_control_mode",
            RegisterName::StorageBackupReservedSetting => "storage_backup_reserved_setting",
            RegisterName::StorageDefaultMode => "storage_default_mode",
            RegisterName::RcCmdTimeout => "rc_cmd_timeout",
            RegisterName::RcCmdMode => "rc_cmd_mode",
            RegisterName::RcChargeLimit => "rc_charge_limit",
            RegisterName::RcDischargeLimit => "rc_discharge_limit",
        }
    }

    /// Round a value to what the register can actually hold, so a
    /// read-back can be compared with the intended value exactly.
    pub fn normalize(self, value: RegisterValue) -> RegisterValue {
        match self.kind() {
            RegisterKind::U16 => value.round().clamp(0.0, f64::from(u16::MAX)),
            RegisterKind::U32 => value.round().clamp(0.0, f64::from(u32::MAX)),
            RegisterKind::F32 => f64::from(value as f32),
        }
    }

    /// Encode a value into holding register words
    pub fn encode(self, value: RegisterValue) -> Vec<u16> {
        let value = self.normalize(value);
        match self.kind() {
            RegisterKind::U16 => vec![value as u16],
            RegisterKind::U32 => crate::modbus::encode_u32_le_words(value as u32).to_vec(),
            RegisterKind::F32 => crate::modbus::encode_f32_le_words(value as f32).to_vec(),
        }
    }

    /// Decode holding register words into a value
    pub fn decode(self, words: &[u16]) -> Result<RegisterValue> {
        match self.kind() {
            RegisterKind::U16 => words
                .first()
                .map(|w| f64::from(*w))
                .ok_or_else(|| EquinoxError::modbus(format!("No data for {}", self))),
            RegisterKind::U32 => crate::modbus::decode_u32_le_words(words).map(f64::from),
            RegisterKind::F32 => crate::modbus::decode_f32_le_words(words).map(f64::from),
        }
    }
}

impl fmt::Display for RegisterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:04X})", self.as_str(), self.address())
    }
}

/// `storage_control_mode` values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum StorageControlMode {
    Disabled = 0,
    MaximizeSelfConsumption = 1,
    TimeOfUse = 2,
    BackupOnly = 3,
    RemoteControl = 4,
}

impl StorageControlMode {
    pub fn value(self) -> RegisterValue {
        f64::from(self as u16)
    }
}

/// Charge/discharge modes used by `storage_default_mode` and `rc_cmd_mode`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ChargeDischargeMode {
    Off = 0,
    ChargeExcessPvOnly = 1,
    ChargePvFirst = 2,
    ChargePvAndAc = 3,
    MaximizeExport = 4,
    DischargeToMatchLoad = 5,
    MaximizeSelfConsumption = 7,
}

impl ChargeDischargeMode {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn value(self) -> RegisterValue {
        f64::from(self.code())
    }

    pub fn description(self) -> &'static str {
        match self {
            ChargeDischargeMode::Off => "Off",
            ChargeDischargeMode::ChargeExcessPvOnly => "Charge from excess PV power only",
            ChargeDischargeMode::ChargePvFirst => "Charge from PV first",
            ChargeDischargeMode::ChargePvAndAc => "Charge from PV and AC",
            ChargeDischargeMode::MaximizeExport => "Maximize export",
            ChargeDischargeMode::DischargeToMatchLoad => "Discharge to match load",
            ChargeDischargeMode::MaximizeSelfConsumption => "Maximize self consumption",
        }
    }
}

impl TryFrom<u16> for ChargeDischargeMode {
    type Error = EquinoxError;

    fn try_from(code: u16) -> Result<Self> {
        match code {
            0 => Ok(ChargeDischargeMode::Off),
            1 => Ok(ChargeDischargeMode::ChargeExcessPvOnly),
            2 => Ok(ChargeDischargeMode::ChargePvFirst),
            3 => Ok(ChargeDischargeMode::ChargePvAndAc),
            4 => Ok(ChargeDischargeMode::MaximizeExport),
            5 => Ok(ChargeDischargeMode::DischargeToMatchLoad),
            7 => Ok(ChargeDischargeMode::MaximizeSelfConsumption),
            other => Err(EquinoxError::validation(
                "mode",
                format!("{} is not a charge/discharge mode (0-5, 7)", other),
            )),
        }
    }
}

impl fmt::Display for ChargeDischargeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}

/// SunSpec common block identity strings
pub mod common {
    pub const MANUFACTURER: u16 = 40004;
    pub const MODEL: u16 = 40020;
    pub const VERSION: u16 = 40044;
    pub const SERIAL: u16 = 40052;
    /// From MANUFACTURER up to (excluding) the device address register
    pub const BLOCK_START: u16 = MANUFACTURER;
    pub const BLOCK_LEN: u16 = 64;
}

/// Storage control block (0xE004..0xE012)
pub mod storage {
    pub const BLOCK_START: u16 = 0xE004;
    pub const BLOCK_LEN: u16 = 14;
    pub const AC_CHARGE_POLICY: u16 = 0xE005;
    pub const AC_CHARGE_LIMIT: u16 = 0xE006;
}

/// Per-battery block offsets, relative to the battery base address
pub mod battery {
    /// Base addresses of Battery1 and Battery2, in enumeration order
    pub const BASES: [u16; 2] = [0xE100, 0xE200];

    pub const MANUFACTURER: u16 = 0x00;
    pub const MODEL: u16 = 0x10;
    pub const VERSION: u16 = 0x20;
    pub const SERIAL: u16 = 0x30;
    pub const IDENTITY_LEN: u16 = 0x40;

    pub const RATED_ENERGY: u16 = 0x42;
    pub const MAX_CHARGE_CONTINUOUS_POWER: u16 = 0x44;
    pub const MAX_DISCHARGE_CONTINUOUS_POWER: u16 = 0x46;
    pub const AVERAGE_TEMPERATURE: u16 = 0x6C;
    pub const MAX_TEMPERATURE: u16 = 0x6E;
    pub const INSTANTANEOUS_VOLTAGE: u16 = 0x70;
    pub const INSTANTANEOUS_CURRENT: u16 = 0x72;
    pub const INSTANTANEOUS_POWER: u16 = 0x74;
    pub const SOH: u16 = 0x82;
    pub const SOE: u16 = 0x84;
    pub const STATUS: u16 = 0x86;

    /// Telemetry block from RATED_ENERGY through STATUS
    pub const TELEMETRY_START: u16 = RATED_ENERGY;
    pub const TELEMETRY_LEN: u16 = STATUS + 2 - RATED_ENERGY;
}
