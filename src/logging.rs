//! Structured Logging for the custodia core
//!
//! Provides production-ready structured logging with:
//! - JSON output for log aggregation services (ELK, Datadog, etc.)
//! - Correlation IDs for request tracing
//! - Lifecycle event logging for ledger, deposit, sweep and withdrawal flows
//!
//! # Usage
//!
//! ```rust,ignore
//! use custodia::logging::{init_logging, LogLevel};
//!
//! // Initialize at startup
//! init_logging(LogLevel::Info, true)?; // JSON mode for production
//!
//! // Log events
//! info!(target: "custodia::ledger", entry_id = %id, "Posting deposit credit");
//! ```

use serde::Serialize;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

// ============================================================================
// Log Levels
// ============================================================================

/// Application log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

// ============================================================================
// Structured Event Types
// ============================================================================

/// Event categories for structured logging
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Balance mutations and ledger postings
    Ledger,
    /// Deposit intake and confirmation events
    Deposit,
    /// Custody sweep events
    Sweep,
    /// Withdrawal lifecycle events
    Withdrawal,
    /// Security events (identity gates, validation failures)
    Security,
    /// System events (startup, shutdown)
    System,
    /// Error events
    Error,
}

/// Structured log event
#[derive(Debug, Serialize)]
pub struct LogEvent {
    /// Event timestamp (ISO 8601)
    pub timestamp: String,
    /// Log level
    pub level: String,
    /// Event category
    pub category: EventCategory,
    /// Human-readable message
    pub message: String,
    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Additional structured data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Duration in milliseconds (for performance events)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

/// Error details for error events
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl LogEvent {
    /// Create a new log event
    pub fn new(level: LogLevel, category: EventCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: format!("{:?}", level).to_uppercase(),
            category,
            message: message.into(),
            correlation_id: None,
            data: None,
            duration_ms: None,
            error: None,
        }
    }

    /// Add correlation ID
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Add structured data
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Add duration
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Add error details
    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(ErrorDetails {
            code: code.into(),
            message: message.into(),
            stack: None,
        });
        self
    }

    /// Log this event to JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"error\": \"failed to serialize log\", \"message\": \"{}\"}}",
                self.message
            )
        })
    }
}

// ============================================================================
// Lifecycle Event Logging
// ============================================================================

/// Log a ledger posting event
pub fn log_ledger_event(
    event_type: &str,
    entry_id: &str,
    user_id: &str,
    currency: &str,
    amount: &str,
    success: bool,
    error: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Ledger, event_type)
        .with_correlation_id(entry_id)
        .with_data(serde_json::json!({
            "entry_id": entry_id,
            "user_id": user_id,
            "currency": currency,
            "amount": amount,
            "success": success
        }));

    if let Some(err) = error {
        event = event.with_error("LEDGER_ERROR", err);
    }

    if success {
        tracing::info!(target: "custodia::ledger", "{}", event.to_json());
    } else {
        tracing::error!(target: "custodia::ledger", "{}", event.to_json());
    }
}

/// Log a deposit event (fiat claim or chain deposit)
pub fn log_deposit_event(
    event_type: &str,
    deposit_id: &str,
    amount: &str,
    success: bool,
    error: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Deposit, event_type)
        .with_correlation_id(deposit_id)
        .with_data(serde_json::json!({
            "deposit_id": deposit_id,
            "amount": amount,
            "success": success
        }));

    if let Some(err) = error {
        event = event.with_error("DEPOSIT_ERROR", err);
    }

    if success {
        tracing::info!(target: "custodia::deposit", "{}", event.to_json());
    } else {
        tracing::error!(target: "custodia::deposit", "{}", event.to_json());
    }
}

/// Log a custody sweep event
pub fn log_sweep_event(
    event_type: &str,
    sweep_id: &str,
    deposit_id: &str,
    amount: &str,
    success: bool,
    error: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Sweep, event_type)
        .with_correlation_id(sweep_id)
        .with_data(serde_json::json!({
            "sweep_id": sweep_id,
            "deposit_id": deposit_id,
            "amount": amount,
            "success": success
        }));

    if let Some(err) = error {
        event = event.with_error("SWEEP_ERROR", err);
    }

    if success {
        tracing::info!(target: "custodia::sweep", "{}", event.to_json());
    } else {
        tracing::error!(target: "custodia::sweep", "{}", event.to_json());
    }
}

/// Log a withdrawal lifecycle event
pub fn log_withdrawal_event(
    event_type: &str,
    request_id: &str,
    amount: &str,
    currency: &str,
    success: bool,
    tx_hash: Option<&str>,
    error: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Withdrawal, event_type)
        .with_correlation_id(request_id)
        .with_data(serde_json::json!({
            "request_id": request_id,
            "amount": amount,
            "currency": currency,
            "tx_hash": tx_hash,
            "success": success
        }));

    if let Some(err) = error {
        event = event.with_error("WITHDRAWAL_ERROR", err);
    }

    if success {
        tracing::info!(target: "custodia::withdrawal", "{}", event.to_json());
    } else {
        tracing::error!(target: "custodia::withdrawal", "{}", event.to_json());
    }
}

/// Log a security-related event
pub fn log_security_event(
    event_type: &str,
    success: bool,
    details: serde_json::Value,
    correlation_id: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Warn };
    let event = LogEvent::new(level, EventCategory::Security, event_type).with_data(
        serde_json::json!({
            "success": success,
            "details": details
        }),
    );

    let event = if let Some(id) = correlation_id {
        event.with_correlation_id(id)
    } else {
        event
    };

    if success {
        tracing::info!(target: "custodia::security", "{}", event.to_json());
    } else {
        tracing::warn!(target: "custodia::security", "{}", event.to_json());
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize the logging system
///
/// # Arguments
/// * `level` - Minimum log level to output
/// * `json_format` - Use JSON format (recommended for production)
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("custodia={}", format!("{:?}", level).to_lowercase()))
    });

    if json_format {
        // JSON format for production
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        );

        subscriber
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        // Pretty format for development
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        );

        subscriber
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}

/// Initialize logging from CustodiaConfig
pub fn init_from_config(config: &crate::config::CustodiaConfig) -> Result<(), LoggingError> {
    let level = LogLevel::from(config.log_level.as_str());
    init_logging(level, config.log_json)
}

/// Logging errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

// ============================================================================
// Request ID Generation
// ============================================================================

/// Generate a unique correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_serialization() {
        let event = LogEvent::new(LogLevel::Info, EventCategory::Ledger, "Test event")
            .with_correlation_id("test-123")
            .with_data(serde_json::json!({"key": "value"}))
            .with_duration(42);

        let json = event.to_json();
        assert!(json.contains("Test event"));
        assert!(json.contains("test-123"));
        assert!(json.contains("42"));
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::from("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::from("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_correlation_id_generation() {
        let id1 = generate_correlation_id();
        let id2 = generate_correlation_id();

        assert!(!id1.is_empty());
        assert_ne!(id1, id2);
    }
}
