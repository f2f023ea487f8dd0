use chrono::{NaiveDate, NaiveDateTime};
use equinox::error::EquinoxError;
use equinox::schedule::{ControlParameters, FileScheduleProvider, Schedule, ScheduleProvider};
use std::fs;

const SCHEDULE: &str = r#"
default_config:
  update_interval: 300
  upper_charging_limit: 80
  soe_delta_charge: 5
  backup_reserve: 10
  charge_limit: 5000
periods:
  - period_start: 01-Apr
    period_end: 30-Sep
    config:
      upper_charging_limit: 70
      soe_delta_charge: 10
      backup_reserve: 5
      charge_limit: 3000
  - period_start: 01-Jun
    period_end: 31-Jul
    config:
      upper_charging_limit: 60
      soe_delta_charge: 10
      backup_reserve: 5
      charge_limit: 2500
"#;

fn noon(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

#[test]
fn overlapping_periods_resolve_to_the_later_one() {
    let schedule = Schedule::from_yaml(SCHEDULE).unwrap();
    let params = schedule.resolve(noon(2026, 7, 1), false);
    assert_eq!(params.upper_charging_limit, 60.0);
    assert_eq!(params.charge_limit, 2500.0);

    let params = schedule.resolve(noon(2026, 5, 1), false);
    assert_eq!(params.upper_charging_limit, 70.0);

    let warnings = schedule.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("overlap"));
}

#[test]
fn unmatched_dates_and_default_flag_use_default_config() {
    let schedule = Schedule::from_yaml(SCHEDULE).unwrap();
    let defaults = ControlParameters::default();
    assert_eq!(schedule.resolve(noon(2026, 12, 24), false), defaults);
    assert_eq!(schedule.resolve(noon(2026, 7, 1), true), defaults);
    assert_eq!(schedule.default_config.update_interval, Some(300));
}

#[test]
fn legacy_default_key_is_accepted() {
    let yaml = SCHEDULE.replace("default_config:", "defaul_config:");
    let schedule = Schedule::from_yaml(&yaml).unwrap();
    assert_eq!(schedule.default_config.params, ControlParameters::default());
}

#[test]
fn missing_parameter_is_a_config_error() {
    let yaml = r#"
default_config:
  upper_charging_limit: 80
  soe_delta_charge: 5
  backup_reserve: 10
"#;
    let err = Schedule::from_yaml(yaml).unwrap_err();
    assert!(matches!(err, EquinoxError::Config { .. }));
    assert!(err.to_string().contains("charge_limit"));
}

#[test]
fn out_of_range_values_are_rejected() {
    let yaml = SCHEDULE.replace("upper_charging_limit: 70", "upper_charging_limit: 170");
    let err = Schedule::from_yaml(&yaml).unwrap_err();
    assert!(err.to_string().contains("periods[0].config.upper_charging_limit"));

    let yaml = SCHEDULE.replace("period_end: 30-Sep", "period_end: 31-Sep");
    assert!(Schedule::from_yaml(&yaml).is_err());
}

#[test]
fn file_provider_rereads_on_every_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, SCHEDULE).unwrap();

    let provider = FileScheduleProvider::new(&path);
    assert_eq!(provider.path(), path.as_path());
    let first = provider.load().unwrap();
    assert_eq!(first.periods.len(), 2);

    fs::write(&path, SCHEDULE.replace("charge_limit: 5000", "charge_limit: 4000")).unwrap();
    let second = provider.load().unwrap();
    assert_eq!(second.default_config.params.charge_limit, 4000.0);
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FileScheduleProvider::new(dir.path().join("absent.yaml"));
    let err = provider.load().unwrap_err();
    assert!(matches!(err, EquinoxError::Config { .. }));
}
