//! Verified register writes with bounded retries
//!
//! [`write_and_verify`] performs one write followed by a read-back of the
//! same register. [`RetryingWriter`] wraps it in a small state machine that
//! reconnects lazily and retries transient faults only; a device exception
//! or a read-back mismatch ends the write immediately.

use crate::channel::{Fault, RegisterChannel};
use crate::config::WriterConfig;
use crate::logging::{StructuredLogger, get_logger};
use crate::registers::{RegisterName, RegisterValue};
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;

/// Terminal result of a register write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// Written and read back with the intended value
    Verified,
    /// The device answered with an exception function code
    Rejected,
    /// The write was acknowledged but the read-back differs
    Mismatch,
    /// Transient faults on every allowed attempt
    Failed,
}

/// States of [`RetryingWriter::apply`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Disconnected,
    Connecting,
    Writing,
    RetryWait,
    Done(WriteStatus),
}

/// Result of a single write attempt or of a whole retried write
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    pub register: RegisterName,
    pub target: RegisterValue,
    /// `None` while the attempt hit a transient fault
    pub status: Option<WriteStatus>,
    /// Value read back after the write, when the read succeeded
    pub final_value: Option<RegisterValue>,
    pub attempts: u32,
    pub last_fault: Option<Fault>,
}

impl WriteOutcome {
    fn new(register: RegisterName, target: RegisterValue) -> Self {
        Self {
            register,
            target,
            status: None,
            final_value: None,
            attempts: 1,
            last_fault: None,
        }
    }

    fn transient(mut self, fault: Fault) -> Self {
        self.last_fault = Some(fault);
        self
    }

    /// Whether the device holds the intended value
    pub fn accepted(&self) -> bool {
        self.status == Some(WriteStatus::Verified)
    }

    /// Whether this attempt ended on a fault that may clear on retry
    pub fn is_transient(&self) -> bool {
        self.status.is_none()
    }
}

impl fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {}: ", self.register, self.target)?;
        match self.status {
            Some(WriteStatus::Verified) => write!(f, "verified")?,
            Some(WriteStatus::Rejected) => write!(f, "rejected by device")?,
            Some(WriteStatus::Mismatch) => match self.final_value {
                Some(v) => write!(f, "read back {}", v)?,
                None => write!(f, "read back mismatch")?,
            },
            Some(WriteStatus::Failed) | None => write!(f, "failed")?,
        }
        write!(f, " after {} attempt(s)", self.attempts)?;
        if let Some(fault) = &self.last_fault {
            write!(f, " ({})", fault)?;
        }
        Ok(())
    }
}

/// Write `value` to `register` once and read it back.
///
/// Transport faults on either request leave `status` unset so the caller may
/// retry. An exception reply to the write is `Rejected`; a read-back that
/// differs from the (wire-normalised) value is `Mismatch`.
pub async fn write_and_verify<C: RegisterChannel + ?Sized>(
    channel: &mut C,
    register: RegisterName,
    value: RegisterValue,
) -> WriteOutcome {
    let logger = get_logger("writer");
    let outcome = WriteOutcome::new(register, value);

    let ack = match channel.write(register, value).await {
        Ok(ack) => ack,
        Err(fault) if fault.is_transient() => return outcome.transient(fault),
        Err(fault) => {
            return WriteOutcome {
                status: Some(WriteStatus::Rejected),
                last_fault: Some(fault),
                ..outcome
            };
        }
    };

    // Read back regardless of the ack so the device state is known
    let read_back = channel.read(register).await;

    if ack.is_exception() {
        let reason = ack.exception.clone().unwrap_or_default();
        logger.error(&format!(
            "Error writing to register {}. Returned function code is 0x{:02X}, should be below 0x80. {}",
            register, ack.function_code, reason
        ));
        return WriteOutcome {
            status: Some(WriteStatus::Rejected),
            final_value: read_back.ok(),
            last_fault: Some(Fault::Exception(reason)),
            ..outcome
        };
    }

    let read_value = match read_back {
        Ok(v) => v,
        Err(fault) if fault.is_transient() => return outcome.transient(fault),
        Err(fault) => {
            return WriteOutcome {
                status: Some(WriteStatus::Failed),
                last_fault: Some(fault),
                ..outcome
            };
        }
    };

    if read_value != register.normalize(value) {
        logger.critical(&format!(
            "Written register value for {} is {} and should have been {}",
            register, read_value, value
        ));
        return WriteOutcome {
            status: Some(WriteStatus::Mismatch),
            final_value: Some(read_value),
            ..outcome
        };
    }

    WriteOutcome {
        status: Some(WriteStatus::Verified),
        final_value: Some(read_value),
        ..outcome
    }
}

/// Applies one logical register write with bounded retries
#[derive(Debug, Clone)]
pub struct RetryingWriter {
    retry_delay: Duration,
    logger: StructuredLogger,
}

impl RetryingWriter {
    pub fn new(retry_delay: Duration) -> Self {
        Self {
            retry_delay,
            logger: get_logger("writer"),
        }
    }

    pub fn from_config(config: &WriterConfig) -> Self {
        Self::new(config.retry_delay())
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Write and verify `value`, retrying transient faults up to
    /// `max_attempts` attempts in total (at least one is always made).
    pub async fn apply<C: RegisterChannel + ?Sized>(
        &self,
        channel: &mut C,
        register: RegisterName,
        value: RegisterValue,
        max_attempts: u32,
    ) -> WriteOutcome {
        let max_attempts = max_attempts.max(1);
        let mut attempts = 0;
        let mut last_fault: Option<Fault> = None;
        let mut last_outcome: Option<WriteOutcome> = None;
        let mut state = if channel.is_connected() {
            WriterState::Writing
        } else {
            WriterState::Disconnected
        };

        loop {
            state = match state {
                WriterState::Disconnected => WriterState::Connecting,
                WriterState::Connecting => {
                    match channel.connect().await {
                        Ok(()) => WriterState::Writing,
                        // A failed connect consumes the attempt it was made for
                        Err(fault) => {
                            attempts += 1;
                            self.logger.error(&format!(
                                "Connecting for {} failed: {}",
                                register, fault
                            ));
                            last_fault = Some(fault);
                            self.after_transient(attempts, max_attempts)
                        }
                    }
                }
                WriterState::Writing => {
                    attempts += 1;
                    let outcome = write_and_verify(channel, register, value).await;
                    let next = match outcome.status {
                        Some(status) => WriterState::Done(status),
                        None => {
                            let fault = outcome.last_fault.clone();
                            self.logger.error(&format!(
                                "Setting {} to {}. Error: {}",
                                register,
                                value,
                                fault.as_ref().map(|f| f.to_string()).unwrap_or_default()
                            ));
                            last_fault = fault;
                            self.after_transient(attempts, max_attempts)
                        }
                    };
                    last_outcome = Some(outcome);
                    next
                }
                WriterState::RetryWait => {
                    self.logger.info(&format!(
                        "Retrying write to register {}...{} of {}",
                        register,
                        attempts + 1,
                        max_attempts
                    ));
                    if !self.retry_delay.is_zero() {
                        self.logger.info(&format!(
                            "Waiting for {:?} before the next retry...",
                            self.retry_delay
                        ));
                        sleep(self.retry_delay).await;
                    }
                    if channel.is_connected() {
                        WriterState::Writing
                    } else {
                        WriterState::Disconnected
                    }
                }
                WriterState::Done(status) => {
                    let base = last_outcome
                        .unwrap_or_else(|| WriteOutcome::new(register, value));
                    return WriteOutcome {
                        status: Some(status),
                        attempts,
                        last_fault: last_fault.or(base.last_fault.clone()),
                        ..base
                    };
                }
            };
        }
    }

    fn after_transient(&self, attempts: u32, max_attempts: u32) -> WriterState {
        if attempts < max_attempts {
            WriterState::RetryWait
        } else {
            WriterState::Done(WriteStatus::Failed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_display() {
        let outcome = WriteOutcome {
            status: Some(WriteStatus::Failed),
            attempts: 3,
            last_fault: Some(Fault::Timeout),
            ..WriteOutcome::new(RegisterName::RcCmdMode, 5.0)
        };
        assert_eq!(
            outcome.to_string(),
            "rc_cmd_mode (0xE00D) <- 5: failed after 3 attempt(s) (request timed out)"
        );
        assert!(!outcome.accepted());
    }

    #[test]
    fn test_after_transient_exhaustion() {
        let writer = RetryingWriter::new(Duration::ZERO);
        assert_eq!(writer.after_transient(1, 3), WriterState::RetryWait);
        assert_eq!(
            writer.after_transient(3, 3),
            WriterState::Done(WriteStatus::Failed)
        );
    }
}
