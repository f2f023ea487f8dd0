//! Seasonal schedule of control parameters
//!
//! A schedule is a default parameter set plus an ordered list of periods
//! given as `DD-Mon` month/day pairs. Periods carry no year; they are
//! anchored to the current year each time they are resolved. When several
//! periods contain "now" the last one in the list wins.

use crate::error::{EquinoxError, Result};
use chrono::{Datelike, Month, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Control parameters in effect for one iteration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlParameters {
    /// Stop charging at this state of energy (%)
    pub upper_charging_limit: f64,
    /// Resume charging once SoE has dropped this far below the upper limit (%)
    pub soe_delta_charge: f64,
    /// Capacity reserved for backup (%)
    pub backup_reserve: f64,
    /// Battery charge power limit (W)
    pub charge_limit: f64,
}

impl Default for ControlParameters {
    fn default() -> Self {
        Self {
            upper_charging_limit: 80.0,
            soe_delta_charge: 5.0,
            backup_reserve: 10.0,
            charge_limit: 5000.0,
        }
    }
}

impl ControlParameters {
    pub fn validate(&self, section: &str) -> Result<()> {
        let pct = |name: &str, v: f64| -> Result<()> {
            if !(0.0..=100.0).contains(&v) {
                return Err(EquinoxError::config(format!(
                    "{}.{} must be between 0 and 100, got {}",
                    section, name, v
                )));
            }
            Ok(())
        };
        pct("upper_charging_limit", self.upper_charging_limit)?;
        pct("soe_delta_charge", self.soe_delta_charge)?;
        pct("backup_reserve", self.backup_reserve)?;
        if !self.charge_limit.is_finite() || self.charge_limit < 0.0 {
            return Err(EquinoxError::config(format!(
                "{}.charge_limit must be a non-negative number, got {}",
                section, self.charge_limit
            )));
        }
        Ok(())
    }
}

/// A year-agnostic calendar day written as `DD-Mon`, e.g. `01-Nov`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthDay {
    month: u32,
    day: u32,
}

impl MonthDay {
    pub fn new(month: u32, day: u32) -> Result<Self> {
        // Validate against a leap year so 29-Feb is accepted
        if NaiveDate::from_ymd_opt(2000, month, day).is_none() {
            return Err(EquinoxError::config(format!(
                "Invalid day {} for month {}",
                day, month
            )));
        }
        Ok(Self { month, day })
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    /// This day in `year`. 29-Feb falls back to 28-Feb in common years.
    pub fn in_year(&self, year: i32) -> NaiveDate {
        let mut day = self.day;
        loop {
            if let Some(date) = NaiveDate::from_ymd_opt(year, self.month, day) {
                return date;
            }
            day -= 1;
        }
    }
}

impl std::str::FromStr for MonthDay {
    type Err = EquinoxError;

    fn from_str(s: &str) -> Result<Self> {
        let (day, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| EquinoxError::config(format!("Expected DD-Mon, got '{}'", s)))?;
        let day: u32 = day
            .parse()
            .map_err(|_| EquinoxError::config(format!("Invalid day in '{}'", s)))?;
        let month: Month = month
            .parse()
            .map_err(|_| EquinoxError::config(format!("Invalid month in '{}'", s)))?;
        Self::new(month.number_from_month(), day)
    }
}

impl TryFrom<String> for MonthDay {
    type Error = EquinoxError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<MonthDay> for String {
    fn from(value: MonthDay) -> Self {
        value.to_string()
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = Month::try_from(self.month as u8)
            .map(|m| m.name())
            .unwrap_or("???");
        write!(f, "{:02}-{}", self.day, &name[..3])
    }
}

/// One seasonal period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub period_start: MonthDay,
    pub period_end: MonthDay,
    pub config: ControlParameters,
}

impl Period {
    /// Inclusive window of this period anchored to `year`: from the start of
    /// the first day to 23:59:59 on the last day
    pub fn window(&self, year: i32) -> (NaiveDateTime, NaiveDateTime) {
        let start = self.period_start.in_year(year).and_time(NaiveTime::MIN);
        let end = self
            .period_end
            .in_year(year)
            .and_hms_opt(23, 59, 59)
            .unwrap_or(NaiveDateTime::MAX);
        (start, end)
    }

    pub fn contains(&self, now: NaiveDateTime) -> bool {
        let (start, end) = self.window(now.year());
        start <= now && now <= end
    }
}

/// Default section of the schedule file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultSection {
    /// Service-mode interval between iterations, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_interval: Option<u64>,

    #[serde(flatten)]
    pub params: ControlParameters,
}

/// Seasonal schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(alias = "defaul_config")]
    pub default_config: DefaultSection,

    #[serde(default)]
    pub periods: Vec<Period>,
}

impl Schedule {
    /// Schedule with only default parameters
    pub fn with_defaults(params: ControlParameters) -> Self {
        Self {
            default_config: DefaultSection {
                update_interval: None,
                params,
            },
            periods: Vec::new(),
        }
    }

    /// Parse a schedule from YAML
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let schedule: Schedule = serde_yaml::from_str(contents)
            .map_err(|e| EquinoxError::config(format!("Invalid schedule: {}", e)))?;
        schedule.validate()?;
        Ok(schedule)
    }

    /// Load a schedule file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            EquinoxError::config(format!("Cannot read schedule {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        self.default_config.params.validate("default_config")?;
        for (i, period) in self.periods.iter().enumerate() {
            period.config.validate(&format!("periods[{}].config", i))?;
        }
        if self.default_config.update_interval == Some(0) {
            return Err(EquinoxError::config(
                "default_config.update_interval must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Non-fatal problems: periods that can never match and periods that
    /// overlap (where the later one silently wins).
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for (i, period) in self.periods.iter().enumerate() {
            if period.period_start > period.period_end {
                warnings.push(format!(
                    "Period {} ({} to {}) crosses the year end and never matches; split it at 31-Dec",
                    i, period.period_start, period.period_end
                ));
            }
        }
        for (i, a) in self.periods.iter().enumerate() {
            for (j, b) in self.periods.iter().enumerate().skip(i + 1) {
                if a.period_start <= b.period_end && b.period_start <= a.period_end {
                    warnings.push(format!(
                        "Periods {} and {} overlap; period {} takes precedence",
                        i, j, j
                    ));
                }
            }
        }
        warnings
    }

    /// The last period that contains `now`
    pub fn active_period(&self, now: NaiveDateTime) -> Option<&Period> {
        self.periods.iter().rev().find(|p| p.contains(now))
    }

    /// Parameters in effect at `now`. With `use_default`, or when no period
    /// matches, the default parameters are returned.
    pub fn resolve(&self, now: NaiveDateTime, use_default: bool) -> ControlParameters {
        if use_default {
            return self.default_config.params;
        }
        self.active_period(now)
            .map(|p| p.config)
            .unwrap_or(self.default_config.params)
    }
}

/// Source of the schedule for each iteration
pub trait ScheduleProvider: Send + Sync {
    fn load(&self) -> Result<Schedule>;
}

/// Reads the schedule file on every call so edits apply without a restart
#[derive(Debug, Clone)]
pub struct FileScheduleProvider {
    path: PathBuf,
}

impl FileScheduleProvider {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScheduleProvider for FileScheduleProvider {
    fn load(&self) -> Result<Schedule> {
        Schedule::from_file(&self.path)
    }
}

impl ScheduleProvider for Schedule {
    fn load(&self) -> Result<Schedule> {
        Ok(self.clone())
    }
}
