use crate::appender::Appender;
use crate::event::{CallerFrame, LogEvent, Severity, Throwable};
use crate::registry::on_bootstrap_thread;
use std::sync::Arc;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that turns every event into exactly one
/// stdout line through an [`Appender`].
///
/// Rendering happens synchronously on the emitting thread. The first
/// event in JSON mode blocks until the infrastructure metadata has been
/// resolved.
pub struct EcsLogLayer {
    appender: Arc<Appender>,
}

impl EcsLogLayer {
    pub fn new(appender: Arc<Appender>) -> Self {
        Self { appender }
    }

    pub fn appender(&self) -> &Arc<Appender> {
        &self.appender
    }
}

impl<S> Layer<S> for EcsLogLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        // Events raised while resolving metadata would wait on themselves.
        if on_bootstrap_thread() {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let meta = event.metadata();
        let caller_frames = if visitor.throwable.is_some() {
            caller_frames(event, &ctx)
        } else {
            Vec::new()
        };

        let arguments = if visitor.fields.is_empty() {
            Vec::new()
        } else {
            vec![serde_json::Value::Object(visitor.fields)]
        };

        let log_event = LogEvent {
            message: visitor.message.unwrap_or_default(),
            logger_name: meta.target().to_string(),
            level: Severity::from(*meta.level()),
            throwable: visitor.throwable,
            caller_frames,
            arguments,
            timestamp: None,
        };

        self.appender.append(&log_event);
    }
}

/// The event call site followed by its enclosing spans, innermost first.
fn caller_frames<S>(event: &Event<'_>, ctx: &Context<'_, S>) -> Vec<CallerFrame>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let spans: Vec<&'static tracing::Metadata<'static>> = ctx
        .event_scope(event)
        .map(|scope| scope.map(|span| span.metadata()).collect())
        .unwrap_or_default();

    let meta = event.metadata();
    let mut frames = Vec::with_capacity(spans.len() + 1);
    frames.push(CallerFrame::new(
        meta.file(),
        meta.line(),
        meta.module_path().unwrap_or_else(|| meta.target()),
        spans.first().map_or("event", |span| span.name()),
    ));
    frames.extend(spans.iter().map(|span| {
        CallerFrame::new(
            span.file(),
            span.line(),
            span.module_path().unwrap_or_else(|| span.target()),
            span.name(),
        )
    }));
    frames
}

/// Best-effort type name of an error.
///
/// `dyn Error` does not expose its concrete type, so well-known error
/// types are matched by downcast first. Otherwise the leading identifier
/// of the `Debug` output is used, e.g. `ParseIntError` for
/// `ParseIntError { kind: .. }`; for enum errors this names the variant,
/// not the type.
pub fn error_type_name(err: &(dyn std::error::Error + 'static)) -> String {
    if err.is::<std::io::Error>() {
        return "std::io::Error".to_string();
    }
    if err.is::<std::fmt::Error>() {
        return "std::fmt::Error".to_string();
    }
    if err.is::<serde_json::Error>() {
        return "serde_json::Error".to_string();
    }

    let debug = format!("{:?}", err);
    let head = debug
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == ':'))
        .next()
        .unwrap_or_default();
    if head.is_empty() {
        "Error".to_string()
    } else {
        head.to_string()
    }
}

use tracing::field::{Field, Visit};

#[derive(Default)]
pub struct FieldVisitor {
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub message: Option<String>,
    pub throwable: Option<Throwable>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        // First error wins; later ones are kept as plain fields.
        if self.throwable.is_none() {
            self.throwable = Some(Throwable {
                class_name: error_type_name(value),
                message: Some(value.to_string()),
            });
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(format!("{:?}", value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_name_from_debug() {
        let err = "x".parse::<u32>().unwrap_err();
        assert_eq!(error_type_name(&err), "ParseIntError");

        let custom = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(error_type_name(&custom), "std::io::Error");

        let os = std::io::Error::from_raw_os_error(2);
        assert_eq!(error_type_name(&os), "std::io::Error");

        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(error_type_name(&json), "serde_json::Error");
    }
}
