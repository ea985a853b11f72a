use crate::event::{LogEvent, Severity};
use crate::exception;
use crate::metadata::InfrastructureIdentity;
use chrono::{DateTime, FixedOffset, Local, SecondsFormat};
use serde::{Serialize, Serializer};

/// One JSON log line, as written in JSON mode.
///
/// Identity fields are flattened in first; absent optionals are omitted,
/// while `data` and `tags` are always present (possibly empty).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    #[serde(flatten)]
    pub identity: InfrastructureIdentity,

    pub message: String,
    #[serde(rename = "log.name")]
    pub logger_name: String,
    #[serde(rename = "log.level")]
    pub level: Severity,
    #[serde(rename = "@timestamp", serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<FixedOffset>,

    #[serde(rename = "exception.name", skip_serializing_if = "Option::is_none")]
    pub exception_name: Option<String>,
    #[serde(rename = "exception.message", skip_serializing_if = "Option::is_none")]
    pub exception_message: Option<String>,
    #[serde(rename = "exception.traceback", skip_serializing_if = "Option::is_none")]
    pub exception_traceback: Option<Vec<String>>,

    pub data: serde_json::Map<String, serde_json::Value>,
    pub tags: Vec<String>,
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<FixedOffset>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, false))
}

/// Builds [`LogRecord`]s against a shared identity snapshot.
#[derive(Debug, Clone, Copy)]
pub struct RecordBuilder<'a> {
    identity: &'a InfrastructureIdentity,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(identity: &'a InfrastructureIdentity) -> Self {
        RecordBuilder { identity }
    }

    pub fn build(&self, event: &LogEvent) -> LogRecord {
        let identity = self.identity.clone();

        let tags = [&identity.cloud_cluster, &identity.service_name]
            .into_iter()
            .flatten()
            .cloned()
            .collect();

        let mut record = LogRecord {
            identity,
            message: event.message.clone(),
            logger_name: event.logger_name.clone(),
            level: event.level,
            timestamp: event.timestamp.unwrap_or_else(|| Local::now().fixed_offset()),
            exception_name: None,
            exception_message: None,
            exception_traceback: None,
            data: serde_json::Map::new(),
            tags,
        };

        if let Some(summary) = exception::summarize(event) {
            record.exception_name = Some(summary.name);
            record.exception_message = summary.message;
            record.exception_traceback = Some(summary.traceback);
        } else if let Some(serde_json::Value::Object(payload)) = event.arguments.first() {
            record.data = payload.clone();
        }

        record
    }
}
