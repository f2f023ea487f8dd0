//! Storage control policy for Equinox
//!
//! [`decide`] maps one device snapshot and the active control parameters to
//! an ordered list of register changes. It is a pure function: every rule is
//! evaluated against the same snapshot and nothing is read back in between.

use crate::registers::{ChargeDischargeMode, RegisterName, RegisterValue};
use crate::schedule::ControlParameters;
use crate::snapshot::DeviceSnapshot;

/// Remote command timeout while holding at the upper limit (8 h)
pub const HOLD_TIMEOUT_SECS: u32 = 28_800;

/// Remote command timeout while charging normally (1 h)
pub const DEFAULT_TIMEOUT_SECS: u32 = 3_600;

/// Taper starts this many percent below the upper limit
pub const TAPER_BAND_PCT: f64 = 3.0;

/// Full charge power is restored this many percent below the upper limit
pub const RESTORE_BAND_PCT: f64 = 5.0;

/// A register change requested by the policy
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeIntent {
    pub register: RegisterName,
    pub target: RegisterValue,
    /// Whether transient write faults may be retried
    pub retryable: bool,
    /// Human readable reason, logged when the intent is applied
    pub reason: String,
}

impl ChangeIntent {
    fn new(register: RegisterName, target: RegisterValue, reason: String) -> Self {
        Self {
            register,
            target,
            retryable: false,
            reason,
        }
    }

    fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

/// Compute the register changes for one iteration. Intents must be applied
/// in the returned order: each command timeout precedes its command mode.
pub fn decide(snapshot: &DeviceSnapshot, params: &ControlParameters) -> Vec<ChangeIntent> {
    let mut intents = Vec::new();
    let soe = snapshot.soe;
    let upper = params.upper_charging_limit;
    let hold = ChargeDischargeMode::DischargeToMatchLoad;
    let charge = ChargeDischargeMode::MaximizeSelfConsumption;

    if soe >= upper && snapshot.rc_cmd_mode != hold.code() {
        let reason = format!("SoE {:.2}% reached upper limit of {}%", soe, upper);
        intents.push(ChangeIntent::new(
            RegisterName::RcCmdTimeout,
            f64::from(HOLD_TIMEOUT_SECS),
            reason.clone(),
        ));
        intents.push(ChangeIntent::new(RegisterName::RcCmdMode, hold.value(), reason));
    }

    if soe < upper - params.soe_delta_charge && snapshot.rc_cmd_mode != charge.code() {
        let reason = format!(
            "SoE {:.2}% dropped by delta of {}%",
            soe, params.soe_delta_charge
        );
        intents.push(ChangeIntent::new(
            RegisterName::RcCmdTimeout,
            f64::from(DEFAULT_TIMEOUT_SECS),
            reason.clone(),
        ));
        intents.push(ChangeIntent::new(RegisterName::RcCmdMode, charge.value(), reason));
    }

    let taper = snapshot.taper_charge_limit();
    if snapshot.rc_charge_limit > taper && soe >= upper - TAPER_BAND_PCT {
        intents.push(ChangeIntent::new(
            RegisterName::RcChargeLimit,
            taper,
            format!(
                "SoE {:.2}%: lowering charge power from {} W to {} W (0.15C) to stop accurately",
                soe, snapshot.rc_charge_limit, taper
            ),
        ));
    }

    // Compare as the device stores the value so a verified write settles
    let charge_limit = RegisterName::RcChargeLimit.normalize(params.charge_limit);
    if snapshot.rc_charge_limit != charge_limit && soe <= upper - RESTORE_BAND_PCT {
        intents.push(ChangeIntent::new(
            RegisterName::RcChargeLimit,
            params.charge_limit,
            format!(
                "Charge limit {} W differs from configured {} W",
                snapshot.rc_charge_limit, params.charge_limit
            ),
        ));
    }

    let backup_reserve = RegisterName::StorageBackupReservedSetting.normalize(params.backup_reserve);
    if snapshot.backup_reserve != backup_reserve {
        intents.push(
            ChangeIntent::new(
                RegisterName::StorageBackupReservedSetting,
                params.backup_reserve,
                format!(
                    "Backup reserve {}% differs from configured {}%",
                    snapshot.backup_reserve, params.backup_reserve
                ),
            )
            .retryable(),
        );
    }

    intents
}
