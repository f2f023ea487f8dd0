//! Control loop orchestration for Equinox
//!
//! [`BatteryController`] owns the register channel and runs the operator
//! entry points: one control iteration, the one-shot remote control setup,
//! the default mode write and the read-only info dump. Each entry point
//! acquires the channel at the start and releases it before returning,
//! whatever the outcome.

mod types;

pub use types::CycleReport;

use crate::channel::RegisterChannel;
use crate::config::WriterConfig;
use crate::controls::decide;
use crate::error::{EquinoxError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::registers::{ChargeDischargeMode, RegisterName, RegisterValue, StorageControlMode};
use crate::schedule::{ControlParameters, ScheduleProvider};
use crate::snapshot::{InfoReport, read_info, read_snapshot};
use crate::writer::{RetryingWriter, WriteOutcome};
use chrono::NaiveDateTime;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

/// Drives one inverter's storage controller from a seasonal schedule
pub struct BatteryController<C: RegisterChannel> {
    /// Register channel, connected only for the duration of an entry point
    channel: C,

    /// Schedule source, consulted once per iteration
    schedule: Box<dyn ScheduleProvider>,

    writer: RetryingWriter,

    /// Attempts for retryable writes
    max_attempts: u32,

    /// Ignore periods and always use the default parameters
    use_default: bool,

    /// Set to `true` to stop between intents and between iterations
    shutdown: Option<watch::Receiver<bool>>,

    logger: StructuredLogger,
}

impl<C: RegisterChannel> BatteryController<C> {
    pub fn new(channel: C, schedule: Box<dyn ScheduleProvider>, writer: &WriterConfig) -> Self {
        Self {
            channel,
            schedule,
            writer: RetryingWriter::from_config(writer),
            max_attempts: writer.max_attempts,
            use_default: false,
            shutdown: None,
            logger: get_logger("controller"),
        }
    }

    /// Always resolve to the schedule's default parameters
    pub fn with_default_params(mut self, use_default: bool) -> Self {
        self.use_default = use_default;
        self
    }

    /// Observe a shutdown flag between intents
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    async fn acquire(&mut self) -> Result<()> {
        if self.channel.is_connected() {
            return Ok(());
        }
        self.channel
            .connect()
            .await
            .map_err(|f| EquinoxError::modbus(format!("Cannot connect: {}", f)))
    }

    async fn release(&mut self) {
        self.channel.disconnect().await;
    }

    /// Run one control iteration against the current local time
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.run_cycle_at(chrono::Local::now().naive_local()).await
    }

    /// Run one control iteration with the schedule resolved at `now`.
    ///
    /// Fails before any write when the schedule cannot be loaded or the
    /// snapshot cannot be read. Write failures are reported per intent in
    /// the returned [`CycleReport`] and never stop later intents.
    pub async fn run_cycle_at(&mut self, now: NaiveDateTime) -> Result<CycleReport> {
        let schedule = self.schedule.load().inspect_err(|e| {
            self.logger.error(&format!("Failed to load schedule: {}", e));
        })?;
        for warning in schedule.warnings() {
            self.logger.warn(&warning);
        }
        let params = schedule.resolve(now, self.use_default);
        self.logger.debug(&format!(
            "Active parameters at {}: upper_charging_limit={}%, soe_delta_charge={}%, backup_reserve={}%, charge_limit={} W",
            now,
            params.upper_charging_limit,
            params.soe_delta_charge,
            params.backup_reserve,
            params.charge_limit
        ));

        let result = match self.acquire().await {
            Ok(()) => self.apply_cycle(now, params).await,
            Err(e) => Err(e),
        };
        self.release().await;

        if let Err(e) = &result {
            self.logger
                .error(&format!("Control iteration skipped: {}", e));
        }
        result
    }

    async fn apply_cycle(
        &mut self,
        now: NaiveDateTime,
        params: ControlParameters,
    ) -> Result<CycleReport> {
        let snapshot = read_snapshot(&mut self.channel).await?;
        self.logger.info(&format!(
            "Battery {} at {:.2}% SoE, capacity {} Wh (rated {} Wh), rc_cmd_mode={}, rc_charge_limit={} W, backup reserve={}%",
            snapshot.manufacturer,
            snapshot.soe,
            snapshot.capacity_wh,
            snapshot.rated_energy_wh,
            snapshot.rc_cmd_mode,
            snapshot.rc_charge_limit,
            snapshot.backup_reserve
        ));

        let intents = decide(&snapshot, &params);
        if intents.is_empty() {
            self.logger.info("No register changes needed");
        }

        let mut outcomes = Vec::with_capacity(intents.len());
        let mut cancelled = false;
        for intent in &intents {
            if self.shutdown_requested() {
                self.logger.warn(&format!(
                    "Shutdown requested; {} change(s) not applied",
                    intents.len() - outcomes.len()
                ));
                cancelled = true;
                break;
            }

            self.logger.info(&format!(
                "{}: setting {} to {}",
                intent.reason, intent.register, intent.target
            ));
            let attempts = if intent.retryable { self.max_attempts } else { 1 };
            let outcome = self
                .writer
                .apply(&mut self.channel, intent.register, intent.target, attempts)
                .await;
            if outcome.accepted() {
                self.logger.info(&format!("Set {}", outcome));
            } else {
                self.logger.error(&format!("Could not set {}", outcome));
            }
            outcomes.push(outcome);
        }

        Ok(CycleReport {
            resolved_at: now,
            params,
            snapshot,
            intents,
            outcomes,
            cancelled,
        })
    }

    /// Apply writes in order with retries, stopping at the first failure
    async fn one_shot(&mut self, writes: &[(RegisterName, RegisterValue)]) -> Result<Vec<WriteOutcome>> {
        let mut outcomes = Vec::with_capacity(writes.len());
        for &(register, value) in writes {
            self.logger
                .info(&format!("Setting {} to {}", register, value));
            let outcome = self
                .writer
                .apply(&mut self.channel, register, value, self.max_attempts)
                .await;
            if !outcome.accepted() {
                self.logger.error(&format!("Could not set {}", outcome));
                self.release().await;
                return Err(EquinoxError::write(register.to_string(), outcome.to_string()));
            }
            outcomes.push(outcome);
        }
        self.release().await;
        Ok(outcomes)
    }

    /// Put the storage controller under remote control with
    /// "maximize self consumption" as the fallback mode
    pub async fn enable_remote_control(&mut self) -> Result<Vec<WriteOutcome>> {
        self.logger.info("Enabling storage remote control mode");
        self.one_shot(&[
            (
                RegisterName::StorageControlMode,
                StorageControlMode::RemoteControl.value(),
            ),
            (
                RegisterName::StorageDefaultMode,
                ChargeDischargeMode::MaximizeSelfConsumption.value(),
            ),
        ])
        .await
    }

    /// Set the mode used when no remote command is active
    pub async fn set_default_mode(&mut self, mode: ChargeDischargeMode) -> Result<WriteOutcome> {
        self.logger
            .info(&format!("Setting storage default mode to {}", mode));
        let mut outcomes = self
            .one_shot(&[(RegisterName::StorageDefaultMode, mode.value())])
            .await?;
        outcomes
            .pop()
            .ok_or_else(|| EquinoxError::generic("No write performed"))
    }

    /// Read the inverter, storage and battery registers without writing
    pub async fn info(&mut self) -> Result<InfoReport> {
        let result = match self.acquire().await {
            Ok(()) => read_info(&mut self.channel).await,
            Err(e) => Err(e),
        };
        self.release().await;
        result
    }

    /// Run iterations every `period` until `shutdown` becomes `true` or
    /// its sender is dropped. Iteration errors are logged and the loop
    /// carries on.
    pub async fn run_forever(
        &mut self,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        if period.is_zero() {
            return Err(EquinoxError::config("Update interval must be greater than 0"));
        }
        self.shutdown = Some(shutdown.clone());
        self.logger.info(&format!(
            "Starting control loop, one iteration every {:?}",
            period
        ));

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    if let Ok(report) = self.run_cycle().await {
                        self.logger.info(&format!(
                            "Iteration done: {} change(s), {} failed",
                            report.outcomes.len(),
                            report.failures().count()
                        ));
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.logger.info("Control loop stopped");
        Ok(())
    }
}
