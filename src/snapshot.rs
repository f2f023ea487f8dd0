//! Device state snapshots
//!
//! Reads the minimal storage and battery state needed for a control decision,
//! and the broader read-only report printed by `--info`.

use crate::channel::{Fault, RegisterChannel};
use crate::error::{EquinoxError, Result};
use crate::modbus::{decode_f32_le_words, decode_string, decode_u32_le_words};
use crate::registers::{RegisterName, RegisterValue, battery, common, storage};
use serde::Serialize;

/// Manufacturer whose batteries report nameplate capacity net of a 10%
/// reserve that is still usable by the storage controller.
pub const VENDOR_BRAND: &str = "SolarEdge";

/// Point-in-time device state used by one control decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    /// State of energy in percent
    pub soe: f64,
    /// Rated energy as reported by the battery (Wh)
    pub rated_energy_wh: f64,
    /// Rated energy after the vendor capacity correction (Wh)
    pub capacity_wh: f64,
    /// Battery manufacturer
    pub manufacturer: String,
    /// Current `rc_cmd_mode` code
    pub rc_cmd_mode: u16,
    /// Current `rc_charge_limit` (W)
    pub rc_charge_limit: f64,
    /// Current `storage_backup_reserved_setting` (%)
    pub backup_reserve: f64,
}

impl DeviceSnapshot {
    /// 0.15C charge power rounded to the nearest 100 W
    pub fn taper_charge_limit(&self) -> f64 {
        round_to_hundreds(self.capacity_wh * 0.15)
    }
}

/// Usable capacity for a battery. Vendor batteries are divided by 0.9 and
/// rounded to whole watt-hours; others are used as reported.
pub fn corrected_capacity(rated_energy_wh: f64, manufacturer: &str) -> f64 {
    if manufacturer == VENDOR_BRAND {
        (rated_energy_wh / 0.9).round_ties_even()
    } else {
        rated_energy_wh
    }
}

fn round_to_hundreds(value: f64) -> f64 {
    (value / 100.0).round_ties_even() * 100.0
}

/// Inverter identity from the SunSpec common block
#[derive(Debug, Clone, Default, Serialize)]
pub struct InverterIdentity {
    pub manufacturer: String,
    pub model: String,
    pub version: String,
    pub serial: String,
}

/// Storage control block values
#[derive(Debug, Clone, Default, Serialize)]
pub struct StorageRegisters {
    pub storage_control_mode: u16,
    pub storage_ac_charge_policy: u16,
    pub storage_ac_charge_limit: f64,
    pub storage_backup_reserved_setting: f64,
    pub storage_default_mode: u16,
    pub rc_cmd_timeout: u32,
    pub rc_cmd_mode: u16,
    pub rc_charge_limit: f64,
    pub rc_discharge_limit: f64,
}

/// One battery's identity and telemetry
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatteryInfo {
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub version: String,
    pub serial: String,
    pub rated_energy_wh: f64,
    pub max_charge_continuous_power_w: f64,
    pub max_discharge_continuous_power_w: f64,
    pub average_temperature_c: f64,
    pub max_temperature_c: f64,
    pub voltage_v: f64,
    pub current_a: f64,
    pub power_w: f64,
    pub soh: f64,
    pub soe: f64,
    pub status: u32,
}

/// Everything `--info` prints
#[derive(Debug, Clone, Serialize)]
pub struct InfoReport {
    pub inverter: InverterIdentity,
    pub storage: StorageRegisters,
    pub batteries: Vec<BatteryInfo>,
}

fn read_fault(what: &str, fault: Fault) -> EquinoxError {
    EquinoxError::read(format!("{}: {}", what, fault))
}

async fn read_block<C: RegisterChannel + ?Sized>(
    channel: &mut C,
    what: &str,
    address: u16,
    count: u16,
) -> Result<Vec<u16>> {
    channel
        .read_holding_registers(address, count)
        .await
        .map_err(|f| read_fault(what, f))
}

/// Slice `len` words at absolute `address` out of a block read at `start`
fn words_at(block: &[u16], start: u16, address: u16, len: u16) -> Result<&[u16]> {
    let offset = usize::from(address.wrapping_sub(start));
    block
        .get(offset..offset + usize::from(len))
        .ok_or_else(|| EquinoxError::read(format!("Block too short for 0x{:04X}", address)))
}

fn f32_at(block: &[u16], start: u16, address: u16) -> Result<f64> {
    Ok(f64::from(decode_f32_le_words(words_at(block, start, address, 2)?)?))
}

fn string_at(block: &[u16], start: u16, address: u16) -> Result<String> {
    decode_string(words_at(block, start, address, 16)?, None)
}

async fn read_inverter_identity<C: RegisterChannel + ?Sized>(
    channel: &mut C,
) -> Result<InverterIdentity> {
    let start = common::BLOCK_START;
    let block = read_block(channel, "inverter common block", start, common::BLOCK_LEN).await?;
    Ok(InverterIdentity {
        manufacturer: string_at(&block, start, common::MANUFACTURER)?,
        model: string_at(&block, start, common::MODEL)?,
        version: decode_string(words_at(&block, start, common::VERSION, 8)?, None)?,
        serial: string_at(&block, start, common::SERIAL)?,
    })
}

async fn read_storage<C: RegisterChannel + ?Sized>(channel: &mut C) -> Result<StorageRegisters> {
    let start = storage::BLOCK_START;
    let block = read_block(channel, "storage control block", start, storage::BLOCK_LEN).await?;
    let named = |reg: RegisterName| -> Result<RegisterValue> {
        reg.decode(words_at(&block, start, reg.address(), reg.kind().word_count())?)
    };
    Ok(StorageRegisters {
        storage_control_mode: named(RegisterName::StorageControlMode)? as u16,
        storage_ac_charge_policy: words_at(&block, start, storage::AC_CHARGE_POLICY, 1)?[0],
        storage_ac_charge_limit: f32_at(&block, start, storage::AC_CHARGE_LIMIT)?,
        storage_backup_reserved_setting: named(RegisterName::StorageBackupReservedSetting)?,
        storage_default_mode: named(RegisterName::StorageDefaultMode)? as u16,
        rc_cmd_timeout: named(RegisterName::RcCmdTimeout)? as u32,
        rc_cmd_mode: named(RegisterName::RcCmdMode)? as u16,
        rc_charge_limit: named(RegisterName::RcChargeLimit)?,
        rc_discharge_limit: named(RegisterName::RcDischargeLimit)?,
    })
}

/// Read one battery; `None` when no battery is fitted at this slot
async fn read_battery<C: RegisterChannel + ?Sized>(
    channel: &mut C,
    index: usize,
    base: u16,
) -> Result<Option<BatteryInfo>> {
    let name = format!("Battery{}", index + 1);
    let identity = read_block(
        channel,
        &format!("{} identity block", name),
        base,
        battery::IDENTITY_LEN,
    )
    .await?;

    let manufacturer = string_at(&identity, base, base + battery::MANUFACTURER)?;
    if manufacturer.is_empty() {
        return Ok(None);
    }

    let start = base + battery::TELEMETRY_START;
    let telemetry = read_block(
        channel,
        &format!("{} telemetry block", name),
        start,
        battery::TELEMETRY_LEN,
    )
    .await?;
    let at = |offset: u16| f32_at(&telemetry, start, base + offset);

    Ok(Some(BatteryInfo {
        manufacturer,
        model: string_at(&identity, base, base + battery::MODEL)?,
        version: string_at(&identity, base, base + battery::VERSION)?,
        serial: string_at(&identity, base, base + battery::SERIAL)?,
        rated_energy_wh: at(battery::RATED_ENERGY)?,
        max_charge_continuous_power_w: at(battery::MAX_CHARGE_CONTINUOUS_POWER)?,
        max_discharge_continuous_power_w: at(battery::MAX_DISCHARGE_CONTINUOUS_POWER)?,
        average_temperature_c: at(battery::AVERAGE_TEMPERATURE)?,
        max_temperature_c: at(battery::MAX_TEMPERATURE)?,
        voltage_v: at(battery::INSTANTANEOUS_VOLTAGE)?,
        current_a: at(battery::INSTANTANEOUS_CURRENT)?,
        power_w: at(battery::INSTANTANEOUS_POWER)?,
        soh: at(battery::SOH)?,
        soe: at(battery::SOE)?,
        status: decode_u32_le_words(words_at(
            &telemetry,
            start,
            base + battery::STATUS,
            2,
        )?)?,
        name,
    }))
}

/// First fitted battery; later slots are not read
async fn read_primary_battery<C: RegisterChannel + ?Sized>(channel: &mut C) -> Result<BatteryInfo> {
    for (index, base) in battery::BASES.iter().enumerate() {
        if let Some(info) = read_battery(channel, index, *base).await? {
            return Ok(info);
        }
    }
    Err(EquinoxError::read("No battery found"))
}

async fn read_batteries<C: RegisterChannel + ?Sized>(channel: &mut C) -> Result<Vec<BatteryInfo>> {
    let mut batteries = Vec::new();
    for (index, base) in battery::BASES.iter().enumerate() {
        if let Some(info) = read_battery(channel, index, *base).await? {
            batteries.push(info);
        }
    }
    Ok(batteries)
}

/// Read the state needed for one control decision. The channel must already
/// be connected. Any unreadable block up to the primary battery fails the
/// whole snapshot.
pub async fn read_snapshot<C: RegisterChannel + ?Sized>(channel: &mut C) -> Result<DeviceSnapshot> {
    // Whole-device identity is read so an inverter that is not answering
    // SunSpec requests fails here rather than on the storage block
    read_inverter_identity(channel).await?;
    let storage = read_storage(channel).await?;
    let primary = read_primary_battery(channel).await?;

    Ok(DeviceSnapshot {
        soe: primary.soe,
        rated_energy_wh: primary.rated_energy_wh,
        capacity_wh: corrected_capacity(primary.rated_energy_wh, &primary.manufacturer),
        manufacturer: primary.manufacturer,
        rc_cmd_mode: storage.rc_cmd_mode,
        rc_charge_limit: storage.rc_charge_limit,
        backup_reserve: storage.storage_backup_reserved_setting,
    })
}

/// Read the full report printed by `--info`
pub async fn read_info<C: RegisterChannel + ?Sized>(channel: &mut C) -> Result<InfoReport> {
    Ok(InfoReport {
        inverter: read_inverter_identity(channel).await?,
        storage: read_storage(channel).await?,
        batteries: read_batteries(channel).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with_capacity(capacity_wh: f64) -> DeviceSnapshot {
        DeviceSnapshot {
            soe: 50.0,
            rated_energy_wh: capacity_wh,
            capacity_wh,
            manufacturer: "LG".to_string(),
            rc_cmd_mode: 7,
            rc_charge_limit: 5000.0,
            backup_reserve: 10.0,
        }
    }

    #[test]
    fn test_vendor_capacity_correction() {
        assert_eq!(corrected_capacity(9000.0, VENDOR_BRAND), 10000.0);
        assert_eq!(corrected_capacity(9700.0, VENDOR_BRAND), 10778.0);
        assert_eq!(corrected_capacity(9000.0, "LG"), 9000.0);
    }

    #[test]
    fn test_taper_charge_limit() {
        assert_eq!(snapshot_with_capacity(10000.0).taper_charge_limit(), 1500.0);
        // 10778 * 0.15 = 1616.7
        assert_eq!(snapshot_with_capacity(10778.0).taper_charge_limit(), 1600.0);
        // 6500 * 0.15 = 975
        assert_eq!(snapshot_with_capacity(6500.0).taper_charge_limit(), 1000.0);
    }

    #[test]
    fn test_words_at_bounds() {
        let block = [1u16, 2, 3, 4];
        assert_eq!(words_at(&block, 0xE100, 0xE102, 2).unwrap(), &[3, 4]);
        assert!(words_at(&block, 0xE100, 0xE103, 2).is_err());
    }
}
