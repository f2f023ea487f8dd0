use super::*;

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            // No sensible default; must come from the command line or file
            host: String::new(),
            port: 1502,
            unit: 1,
            timeout_secs: 1,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/equinox.log".to_string(),
            backup_count: 20,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_secs: 10.0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            modbus: ModbusConfig::default(),
            logging: LoggingConfig::default(),
            writer: WriterConfig::default(),
            schedule_file: "config.yaml".to_string(),
            update_interval_secs: 120,
        }
    }
}
