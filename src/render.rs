use crate::env::{env_or, JSON_LOGGING_ENV};
use crate::event::{LogEvent, Severity};
use crate::record::RecordBuilder;
use crate::registry::MetadataRegistry;
use colored::Color;

/// Output strategy, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Renderer {
    /// `<logger> <colored level> <message>`, no metadata.
    #[default]
    Plain,
    /// Single-line JSON [`crate::record::LogRecord`] enriched with metadata.
    Json,
}

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl Renderer {
    /// Only the exact string `"true"` selects JSON output.
    pub fn from_flag(value: &str) -> Self {
        if value == "true" {
            Renderer::Json
        } else {
            Renderer::Plain
        }
    }

    /// Resolve the strategy from `JSON_LOGGING`.
    pub fn from_env() -> Self {
        Self::from_flag(&env_or(JSON_LOGGING_ENV, "false"))
    }

    /// Render `event` to one line without a trailing newline.
    ///
    /// Plain mode never touches `registry`, so it never triggers the
    /// metadata bootstrap.
    pub fn render(&self, event: &LogEvent, registry: &MetadataRegistry) -> Result<String, RenderError> {
        match self {
            Renderer::Plain => Ok(render_plain(event)),
            Renderer::Json => {
                let record = RecordBuilder::new(registry.identity()).build(event);
                Ok(serde_json::to_string(&record)?)
            }
        }
    }
}

pub fn render_plain(event: &LogEvent) -> String {
    format!(
        "{} {} {}",
        event.logger_name,
        colorize(event.level),
        event.message
    )
}

/// Color name used for a level in plain output.
pub fn color_name(level: Severity) -> &'static str {
    match level {
        Severity::Info => "green",
        Severity::Debug => "blue",
        Severity::Warn => "orange",
        Severity::Error => "red",
        Severity::Trace => "white",
    }
}

fn color(level: Severity) -> Color {
    match color_name(level) {
        "green" => Color::Green,
        "blue" => Color::Blue,
        "orange" => Color::TrueColor { r: 255, g: 165, b: 0 },
        "red" => Color::Red,
        _ => Color::White,
    }
}

/// Wrap the level name in SGR codes. Container stdout is never a
/// terminal, so this bypasses `colored`'s tty and `NO_COLOR` detection.
fn colorize(level: Severity) -> String {
    format!("\x1b[{}m{}\x1b[0m", color(level).to_fg_str(), level.as_str())
}
