use crate::error::{EquinoxError, Result};
use tracing::Level;

/// Parse a log level name. Python-style names (WARNING, CRITICAL) are
/// accepted so existing service configs keep working.
pub fn parse_log_level(level_str: &str) -> Result<Level> {
    match level_str.to_uppercase().as_str() {
        "TRACE" => Ok(Level::TRACE),
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        "WARN" | "WARNING" => Ok(Level::WARN),
        "ERROR" | "CRITICAL" => Ok(Level::ERROR),
        _ => Err(EquinoxError::config(format!(
            "Invalid log level: {}",
            level_str
        ))),
    }
}
