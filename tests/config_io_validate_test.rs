use equinox::config::Config;
use std::fs;

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("equinox_config.yaml");

    let mut cfg = Config::default();
    cfg.modbus.host = "10.0.0.5".to_string();
    cfg.writer.retry_delay_secs = 2.5;
    cfg.logging.file = path.with_extension("log").to_string_lossy().to_string();

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.modbus.host, "10.0.0.5");
    assert_eq!(loaded.writer.retry_delay_secs, 2.5);
    assert_eq!(loaded.logging.file, cfg.logging.file);
}

#[test]
fn partial_yaml_keeps_defaults() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), "modbus:\n  host: inverter.local\nwriter:\n  max_attempts: 5\n").unwrap();
    let cfg = Config::from_file(tmp.path()).unwrap();

    assert_eq!(cfg.modbus.host, "inverter.local");
    assert_eq!(cfg.modbus.port, 1502);
    assert_eq!(cfg.writer.max_attempts, 5);
    assert_eq!(cfg.writer.retry_delay_secs, 10.0);
    assert_eq!(cfg.schedule_file, "config.yaml");
}

#[test]
fn config_validation_errors() {
    let mut cfg = Config::default();

    // No host configured
    assert!(cfg.validate().is_err());

    // Invalid port
    cfg = Config::default();
    cfg.modbus.host = "10.0.0.5".to_string();
    cfg.modbus.port = 0;
    assert!(cfg.validate().is_err());

    // Negative retry delay
    cfg = Config::default();
    cfg.modbus.host = "10.0.0.5".to_string();
    cfg.writer.retry_delay_secs = -1.0;
    assert!(cfg.validate().is_err());

    // Update interval zero
    cfg = Config::default();
    cfg.modbus.host = "10.0.0.5".to_string();
    cfg.update_interval_secs = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"bad: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}
