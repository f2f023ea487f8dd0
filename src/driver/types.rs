use crate::controls::ChangeIntent;
use crate::schedule::ControlParameters;
use crate::snapshot::DeviceSnapshot;
use crate::writer::{WriteOutcome, WriteStatus};
use chrono::NaiveDateTime;

/// Result of one control-loop iteration
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Local time the schedule was resolved for
    pub resolved_at: NaiveDateTime,
    pub params: ControlParameters,
    pub snapshot: DeviceSnapshot,
    /// Everything the policy asked for, in application order
    pub intents: Vec<ChangeIntent>,
    /// One outcome per applied intent; shorter than `intents` when cancelled
    pub outcomes: Vec<WriteOutcome>,
    /// Shutdown was requested before every intent was applied
    pub cancelled: bool,
}

impl CycleReport {
    /// True when every applied write was verified
    pub fn all_accepted(&self) -> bool {
        self.outcomes.iter().all(WriteOutcome::accepted)
    }

    /// Outcomes that did not leave the intended value on the device
    pub fn failures(&self) -> impl Iterator<Item = &WriteOutcome> {
        self.outcomes.iter().filter(|o| !o.accepted())
    }

    /// Number of outcomes with the given terminal status
    pub fn count(&self, status: WriteStatus) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == Some(status))
            .count()
    }
}
