//! Structured audit logging for API operations.
//!
//! [`AuditLog`] is a cheap handle passed to handlers through the application
//! state. Events are rendered as JSON objects and emitted through the `log`
//! facade under the `residents_api::audit` target, so they can be routed or
//! filtered with `RUST_LOG=residents_api::audit=info`.

use crate::config::Settings;
use serde_json::{json, Value};
use std::fs::OpenOptions;
use std::io;
use std::time::Duration;

const TARGET: &str = "residents_api::audit";

/// Initialize the global logger from settings.
///
/// `RUST_LOG` still overrides the configured level. When `log_file` is set,
/// output is appended to that file instead of stderr.
///
/// # Errors
///
/// Returns `Err` if the log file cannot be opened.
pub fn init_logging(settings: &Settings) -> io::Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(settings.log_level);
    builder.parse_default_env();

    if let Some(path) = &settings.log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    // A logger may already be installed (tests, embedding).
    let _ = builder.try_init();
    Ok(())
}

/// Audit, error, security and performance event emitter.
#[derive(Clone, Debug, Default)]
pub struct AuditLog;

impl AuditLog {
    pub fn new() -> Self {
        AuditLog
    }

    /// Log an API operation with user context.
    pub fn log_operation(&self, operation: &str, entity_type: &str, user: &str, data: Option<Value>) {
        let event = json!({
            "operation": operation,
            "entity_type": entity_type,
            "user": user,
            "data": data,
        });
        info!(target: TARGET, "API Operation: {}", event);
    }

    /// Log an error event.
    pub fn log_error(&self, error_type: &str, details: &str, user: Option<&str>) {
        let event = json!({
            "error_type": error_type,
            "details": details,
            "user": user,
        });
        error!(target: TARGET, "API Error: {}", event);
    }

    /// Log a security-related event (failed authentication, denied access,
    /// throttling).
    pub fn log_security(&self, event_type: &str, user: &str, details: &str) {
        let event = json!({
            "event_type": event_type,
            "user": user,
            "details": details,
        });
        warn!(target: TARGET, "Security Event: {}", event);
    }

    /// Log how long an operation took.
    pub fn log_performance(&self, operation: &str, duration: Duration) {
        info!(
            target: TARGET,
            "Performance: {} took {:.2} seconds",
            operation,
            duration.as_secs_f64()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        let settings = Settings::default();
        init_logging(&settings).unwrap();
        init_logging(&settings).unwrap();
    }
}
