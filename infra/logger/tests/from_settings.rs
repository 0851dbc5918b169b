use ebus_logger::{LogSettings, Logger, LoggerError};

#[test]
fn from_settings_rejects_unknown_level() {
    let settings = LogSettings { level: "chatty".to_owned(), ..LogSettings::default() };

    let err = Logger::from_settings("integration-from-settings", &settings)
        .expect_err("unknown level should be rejected before touching the global subscriber");

    assert!(matches!(err, LoggerError::InvalidConfiguration { .. }));
}

#[test]
fn from_settings_without_outputs_is_rejected() {
    let settings = LogSettings { console: false, path: None, ..LogSettings::default() };

    let err = Logger::from_settings("integration-no-outputs", &settings)
        .expect_err("a logger with no layers should be rejected");

    assert!(matches!(err, LoggerError::InvalidConfiguration { .. }));
}
