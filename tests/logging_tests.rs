use equinox::logging::{LogContext, get_logger_with_context, parse_log_level};
use tracing::Level;

#[test]
fn python_style_level_names_are_accepted() {
    assert_eq!(parse_log_level("warning").unwrap(), Level::WARN);
    assert_eq!(parse_log_level("CRITICAL").unwrap(), Level::ERROR);
    assert_eq!(parse_log_level("Trace").unwrap(), Level::TRACE);
}

#[test]
fn unknown_level_is_a_config_error() {
    let err = parse_log_level("verbose").unwrap_err();
    assert!(err.to_string().contains("Invalid log level: verbose"));
}

#[test]
fn logging_without_subscriber_does_not_panic() {
    let logger = get_logger_with_context(
        LogContext::new("writer").with_device("192.168.1.100:1502".to_string()),
    );
    logger.critical("Written register value differs");
    logger.trace("Reading 2 registers");
}
