use anyhow::{Context, Result};
use clap::Parser;
use equinox::config::Config;
use equinox::driver::BatteryController;
use equinox::error::EquinoxError;
use equinox::logging::{get_logger, init_logging};
use equinox::modbus::ModbusChannel;
use equinox::registers::ChargeDischargeMode;
use equinox::schedule::{FileScheduleProvider, Schedule, ScheduleProvider};
use std::path::PathBuf;
use std::time::Duration;
use tokio::{signal, sync::watch};

#[derive(Parser, Debug)]
#[command(
    name = "equinox",
    version = env!("APP_VERSION"),
    about = "Seasonal battery storage control for SolarEdge inverters over Modbus TCP"
)]
struct Cli {
    /// Modbus TCP address of the inverter; required unless the config file
    /// sets modbus.host
    host: Option<String>,

    /// Modbus TCP port [default: 1502]
    #[arg(long)]
    port: Option<u16>,

    /// Connection timeout in seconds [default: 1]
    #[arg(long)]
    timeout: Option<u64>,

    /// Modbus device address [default: 1]
    #[arg(long)]
    unit: Option<u8>,

    /// Print all inverter, storage and battery values as JSON and exit
    #[arg(long)]
    info: bool,

    /// Enable remote control of the storage controller
    /// ("storage_control_mode" = 4) and set "storage_default_mode" to
    /// "7. Maximize self consumption", then exit
    #[arg(long = "enable_storage_remote_control_mode")]
    enable_remote_control: bool,

    /// Set "storage_default_mode" and exit. 0. Off; 1. Charge from excess PV
    /// power only; 2. Charge from PV first; 3. Charge from PV and AC;
    /// 4. Maximize export; 5. Discharge to match load; 7. Maximize self
    /// consumption
    #[arg(long = "set_storage_default_mode", value_parser = parse_mode)]
    default_mode: Option<ChargeDischargeMode>,

    /// Application configuration file
    #[arg(long, env = "EQUINOX_CONFIG")]
    config: Option<PathBuf>,

    /// Seasonal schedule file, re-read on every iteration
    #[arg(long, env = "EQUINOX_SCHEDULE")]
    schedule: Option<PathBuf>,

    /// Keep running and repeat the control iteration every interval
    #[arg(long)]
    service: bool,

    /// Seconds between iterations in service mode (overrides the schedule's
    /// update_interval)
    #[arg(long, requires = "service")]
    interval: Option<u64>,
}

fn parse_mode(value: &str) -> std::result::Result<ChargeDischargeMode, String> {
    let code: u16 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    ChargeDischargeMode::try_from(code).map_err(|_| "choose from 0, 1, 2, 3, 4, 5, 7".to_string())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::load().context("Failed to load configuration")?,
    };

    if let Some(host) = &cli.host {
        config.modbus.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.modbus.port = port;
    }
    if let Some(timeout) = cli.timeout {
        config.modbus.timeout_secs = timeout;
    }
    if let Some(unit) = cli.unit {
        config.modbus.unit = unit;
    }
    if let Some(schedule) = &cli.schedule {
        config.schedule_file = schedule.display().to_string();
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.logging)?;

    let logger = get_logger("main");
    logger.debug(&format!("Equinox {} starting", env!("APP_VERSION")));

    let schedule = FileScheduleProvider::new(&config.schedule_file);
    let interval = match schedule.load() {
        Ok(loaded) => {
            let params = loaded.default_config.params;
            logger.debug(&format!(
                "Default parameters: upper_charging_limit={}%, soe_delta_charge={}%, backup_reserve={}%, charge_limit={} W",
                params.upper_charging_limit,
                params.soe_delta_charge,
                params.backup_reserve,
                params.charge_limit
            ));
            service_interval(&cli, &config, Some(&loaded))
        }
        // Only fatal when a control iteration needs it
        Err(e) => {
            logger.debug(&format!("Schedule not loaded: {}", e));
            service_interval(&cli, &config, None)
        }
    };

    let channel = ModbusChannel::new(&config.modbus);
    let mut controller = BatteryController::new(channel, Box::new(schedule), &config.writer);

    if cli.info {
        let report = controller.info().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if cli.enable_remote_control {
        controller.enable_remote_control().await?;
        return Ok(());
    }

    if let Some(mode) = cli.default_mode {
        controller.set_default_mode(mode).await?;
        return Ok(());
    }

    if cli.service {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown_logger = logger.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                shutdown_logger.info("Shutdown signal received");
            }
            let _ = shutdown_tx.send(true);
        });
        controller.run_forever(interval, shutdown_rx).await?;
        return Ok(());
    }

    match controller.run_cycle().await {
        Ok(_) => Ok(()),
        // A malformed schedule is an operator error; anything else only
        // skips this iteration and the next scheduled run tries again
        Err(e @ EquinoxError::Config { .. }) => Err(e.into()),
        Err(_) => Ok(()),
    }
}

fn service_interval(cli: &Cli, config: &Config, schedule: Option<&Schedule>) -> Duration {
    let secs = cli
        .interval
        .or_else(|| schedule.and_then(|s| s.default_config.update_interval))
        .unwrap_or(config.update_interval_secs);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_file(yaml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_host_is_rejected() {
        let file = config_file("writer:\n  max_attempts: 2\n");
        let path = file.path().to_string_lossy().to_string();
        let cli = Cli::try_parse_from(["equinox", "--config", path.as_str()]).unwrap();

        let err = load_config(&cli).unwrap_err();
        assert!(err.to_string().contains("modbus.host"));
    }

    #[test]
    fn positional_host_overrides_file() {
        let file = config_file("modbus:\n  host: 10.0.0.7\n  port: 502\n");
        let path = file.path().to_string_lossy().to_string();
        let cli = Cli::try_parse_from(["equinox", "10.0.0.9", "--config", path.as_str(), "--unit", "2"])
            .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(config.modbus.host, "10.0.0.9");
        assert_eq!(config.modbus.port, 502);
        assert_eq!(config.modbus.unit, 2);
    }
}
