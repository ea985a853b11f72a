use chrono::{DateTime, FixedOffset};
use serde::{Serialize, Serializer};

/// Severity of a log event, using the host framework's native level names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => Severity::Error,
            tracing::Level::WARN => Severity::Warn,
            tracing::Level::INFO => Severity::Info,
            tracing::Level::DEBUG => Severity::Debug,
            tracing::Level::TRACE => Severity::Trace,
        }
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Error attached to an event: type name plus optional message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Throwable {
    pub class_name: String,
    pub message: Option<String>,
}

/// One call-site frame. `file` and `line` are `None` when unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerFrame {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub class_name: String,
    pub method_name: String,
}

impl CallerFrame {
    pub fn new(
        file: Option<impl Into<String>>,
        line: Option<u32>,
        class_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Self {
        CallerFrame {
            file: file.map(Into::into),
            line,
            class_name: class_name.into(),
            method_name: method_name.into(),
        }
    }
}

/// Framework-neutral view of a single log event.
///
/// [`crate::layer::EcsLogLayer`] builds these from `tracing` events; tests
/// and other adapters can construct them directly.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    /// Fully formatted message.
    pub message: String,
    /// Name of the emitting logger (the `tracing` target).
    pub logger_name: String,
    pub level: Severity,
    pub throwable: Option<Throwable>,
    /// Call-site frames, innermost first.
    pub caller_frames: Vec<CallerFrame>,
    /// Extra arguments. Only the first one is ever consulted.
    pub arguments: Vec<serde_json::Value>,
    /// Emission time, when the adapter knows it. Records fall back to the
    /// build time otherwise.
    pub timestamp: Option<DateTime<FixedOffset>>,
}

impl LogEvent {
    pub fn new(level: Severity, logger_name: impl Into<String>, message: impl Into<String>) -> Self {
        LogEvent {
            message: message.into(),
            logger_name: logger_name.into(),
            level,
            throwable: None,
            caller_frames: Vec::new(),
            arguments: Vec::new(),
            timestamp: None,
        }
    }

    pub fn with_throwable(mut self, class_name: impl Into<String>, message: Option<String>) -> Self {
        self.throwable = Some(Throwable {
            class_name: class_name.into(),
            message,
        });
        self
    }

    pub fn with_frames(mut self, frames: Vec<CallerFrame>) -> Self {
        self.caller_frames = frames;
        self
    }

    pub fn with_argument(mut self, argument: serde_json::Value) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}
