// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of tracing-loki-push.
//
// tracing-loki-push is free software: you can redistribute it and/or modify it under the terms of
// the GNU General Public License as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// tracing-loki-push is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See
// the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// tracing-loki-push.  If not, see <http://www.gnu.org/licenses/>.

//! Log entries: the unit handed-off from producers to the background task.
//!
//! A [`LogEntry`] carries the handful of fields the pipeline cares about (severity, timestamp,
//! message & call-site) along with the *serialized* form of the record. It's the latter that
//! winds-up in Loki; the structured fields are there for the benefit of intake.
//!
//! Entries are made in one of three ways:
//!
//! 1. from a [`Record`], in which case the serialized form is reconstructed as a small JSON
//!    object ([`LogEntry::from_record`])
//! 2. from a [`Record`] and text the caller has already serialized ([`LogEntry::new`])
//! 3. by parsing a serialized JSON record, which is then retained verbatim
//!    ([`LogEntry::from_json`])

use crate::error::{Error, Result};

use backtrace::Backtrace;
use chrono::prelude::*;
use serde::Deserialize;
use serde_json::{Map, Value};

/// The value-object view of a host-logger record
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub severity: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// Where the record originated (e.g. `src/main.rs:12`)
    pub call_site: String,
}

/// One log line on its way to Loki. Immutable once constructed.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    severity: String,
    timestamp: DateTime<Utc>,
    message: String,
    call_site: String,
    raw: String,
}

impl LogEntry {
    /// Build an entry from `record` & the caller's own serialization thereof
    pub fn new(record: Record, raw: String) -> LogEntry {
        LogEntry {
            severity: record.severity,
            timestamp: record.timestamp,
            message: record.message,
            call_site: record.call_site,
            raw,
        }
    }
    /// Build an entry from `record`, serializing it as a JSON object with keys `level`, `ts`,
    /// `msg` & `caller`
    pub fn from_record(record: Record) -> LogEntry {
        LogEntry::from_record_with_fields(record, Map::new())
    }
    /// As [`LogEntry::from_record`], but include `fields` in the serialized form, too. Should any
    /// of them collide with the four keys named above, the record wins.
    pub fn from_record_with_fields(record: Record, mut fields: Map<String, Value>) -> LogEntry {
        fields.insert("level".to_owned(), Value::from(record.severity.as_str()));
        fields.insert(
            "ts".to_owned(),
            Value::from(
                record
                    .timestamp
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ),
        );
        fields.insert("msg".to_owned(), Value::from(record.message.as_str()));
        fields.insert("caller".to_owned(), Value::from(record.call_site.as_str()));
        let raw = Value::Object(fields).to_string();
        LogEntry::new(record, raw)
    }
    /// Parse one serialized record, retaining `bytes` verbatim as the entry's serialized form.
    ///
    /// `bytes` must be UTF-8 encoded JSON whose top level is an object. The fields are picked-out
    /// of either zap-style (`level`, `ts`, `msg`, `caller`) or [`tracing-subscriber`]-style
    /// (`level`, `timestamp`, `fields.message`, `filename`/`line_number`, `target`) records; all
    /// are optional. A missing timestamp is taken to be "now".
    ///
    /// [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/fmt/format/struct.Json.html
    pub fn from_json(bytes: &[u8]) -> Result<LogEntry> {
        let text = std::str::from_utf8(bytes).map_err(parse_error)?;
        let value: Value = serde_json::from_str(text).map_err(parse_error)?;
        if !value.is_object() {
            return Err(parse_error(format!(
                "expected a JSON object, got '{}'",
                json_type_name(&value)
            )));
        }
        let rec: SerializedRecord = serde_json::from_value(value).map_err(parse_error)?;

        let timestamp = match rec.ts {
            Some(ts) => ts.to_datetime()?,
            None => Utc::now(),
        };
        let message = rec
            .msg
            .or_else(|| {
                rec.fields
                    .as_ref()
                    .and_then(|fields| fields.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            })
            .unwrap_or_default();
        let call_site = match (rec.caller, rec.filename, rec.line_number, rec.target) {
            (Some(caller), _, _, _) => caller,
            (None, Some(file), Some(line), _) => format!("{}:{}", file, line),
            (None, Some(file), None, _) => file,
            (None, None, _, Some(target)) => target,
            _ => String::new(),
        };

        Ok(LogEntry {
            severity: rec.level.unwrap_or_default(),
            timestamp,
            message,
            call_site,
            raw: text.to_owned(),
        })
    }
    pub fn severity(&self) -> &str {
        &self.severity
    }
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
    /// Nanoseconds since the Unix epoch, saturating at the bounds of `i64` (roughly the years 1677
    /// & 2262)
    pub fn timestamp_nanos(&self) -> i64 {
        self.timestamp.timestamp_nanos_opt().unwrap_or_else(|| {
            if self.timestamp.timestamp() < 0 {
                i64::MIN
            } else {
                i64::MAX
            }
        })
    }
    pub fn message(&self) -> &str {
        &self.message
    }
    pub fn call_site(&self) -> &str {
        &self.call_site
    }
    /// The serialized form of this entry; this is what gets pushed
    pub fn raw(&self) -> &str {
        &self.raw
    }
    pub fn into_raw(self) -> String {
        self.raw
    }
}

fn parse_error<E>(err: E) -> Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
{
    Error::Parse {
        source: err.into(),
        back: Backtrace::new(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Deserialize)]
struct SerializedRecord {
    #[serde(default)]
    level: Option<String>,
    #[serde(default, alias = "timestamp")]
    ts: Option<SerializedTimestamp>,
    #[serde(default, alias = "message")]
    msg: Option<String>,
    #[serde(default)]
    caller: Option<String>,
    #[serde(default)]
    fields: Option<Map<String, Value>>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    line_number: Option<u32>,
}

/// zap writes fractional seconds since the epoch; tracing-subscriber writes RFC 3339
#[derive(Deserialize)]
#[serde(untagged)]
enum SerializedTimestamp {
    Seconds(f64),
    Rfc3339(String),
}

impl SerializedTimestamp {
    /// Refuses anything that can't be carried as `i64` nanoseconds since the epoch (roughly the
    /// years 1677 through 2262); milliseconds written where seconds are expected end up here.
    fn to_datetime(&self) -> Result<DateTime<Utc>> {
        let ts = match self {
            SerializedTimestamp::Seconds(secs) => {
                let whole = secs.floor();
                let mut nanos = ((secs - whole) * 1e9).round() as u32;
                let mut whole = whole as i64;
                if nanos >= 1_000_000_000 {
                    whole += 1;
                    nanos = 0;
                }
                DateTime::from_timestamp(whole, nanos)
            }
            SerializedTimestamp::Rfc3339(text) => Some(
                DateTime::parse_from_rfc3339(text)
                    .map_err(parse_error)?
                    .with_timezone(&Utc),
            ),
        };
        ts.filter(|ts| ts.timestamp_nanos_opt().is_some())
            .ok_or_else(|| parse_error(format!("timestamp {} is out of range", self)))
    }
}

impl std::fmt::Display for SerializedTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SerializedTimestamp::Seconds(secs) => write!(f, "{}", secs),
            SerializedTimestamp::Rfc3339(text) => write!(f, "'{}'", text),
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn zap_style_record() {
        let line = "{\"level\":\"info\",\"ts\":1700000000.123456,\"caller\":\"app/main.go:42\",\"msg\":\"test message\",\"key\":\"value\"}\n";
        let entry = LogEntry::from_json(line.as_bytes()).unwrap();
        assert_eq!(entry.severity(), "info");
        assert_eq!(entry.message(), "test message");
        assert_eq!(entry.call_site(), "app/main.go:42");
        assert_eq!(entry.timestamp_millis(), 1_700_000_000_123);
        // Sub-millisecond precision survives (to within what an f64 can carry)
        let micros = entry.timestamp_nanos() / 1_000;
        assert!((micros - 1_700_000_000_123_456).abs() <= 1);
        // The serialized form is retained byte-for-byte, newline & all
        assert_eq!(entry.raw(), line);
    }

    #[test]
    fn tracing_subscriber_style_record() {
        let line = r#"{"timestamp":"2024-05-01T12:34:56.789012345Z","level":"WARN","fields":{"message":"disk nearly full","pct":93},"target":"agent::disk","filename":"src/disk.rs","line_number":17}"#;
        let entry = LogEntry::from_json(line.as_bytes()).unwrap();
        assert_eq!(entry.severity(), "WARN");
        assert_eq!(entry.message(), "disk nearly full");
        assert_eq!(entry.call_site(), "src/disk.rs:17");
        assert_eq!(
            entry.timestamp(),
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 34, 56).unwrap()
                + chrono::Duration::nanoseconds(789_012_345)
        );
        assert_eq!(entry.timestamp_nanos() % 1_000_000_000, 789_012_345);

        let entry = LogEntry::from_json(br#"{"level":"INFO","fields":{"message":"hi"},"target":"agent"}"#).unwrap();
        assert_eq!(entry.call_site(), "agent");
    }

    #[test]
    fn sparse_record() {
        let before = Utc::now();
        let entry = LogEntry::from_json(b"{}").unwrap();
        assert_eq!(entry.severity(), "");
        assert_eq!(entry.message(), "");
        assert_eq!(entry.call_site(), "");
        assert!(entry.timestamp() >= before);
        assert_eq!(entry.raw(), "{}");
    }

    #[test]
    fn malformed_records() {
        let cases: &[&[u8]] = &[
            b"",
            b"not json",
            b"{\"level\":\"info\"",
            b"[\"info\", 1700000000, \"msg\"]",
            b"42",
            b"\"a string\"",
            b"null",
            b"{\"level\":5}",
            b"{\"msg\":{\"nested\":true}}",
            b"{\"ts\":\"yesterday\"}",
            b"{\"ts\":1e300}",
            // Milliseconds mistaken for seconds: the year 55,000 or so
            b"{\"ts\":1700000000123.0}",
            b"{\"timestamp\":\"2300-01-01T00:00:00Z\"}",
            b"{\"timestamp\":\"1600-01-01T00:00:00Z\"}",
            b"{\"fields\":[]}",
            b"{\"msg\":\"\xff\xfe\"}",
        ];
        for bad in cases {
            let res = LogEntry::from_json(bad);
            assert!(
                matches!(res, Err(Error::Parse { .. })),
                "expected a parse error for {:?}",
                String::from_utf8_lossy(bad)
            );
        }
    }

    #[test]
    fn reconstructed_serialization() {
        let record = Record {
            severity: "error".to_owned(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
                + chrono::Duration::microseconds(6),
            message: "it \"broke\"".to_owned(),
            call_site: "src/lib.rs:7".to_owned(),
        };
        let mut fields = Map::new();
        fields.insert("attempt".to_owned(), Value::from(3));
        fields.insert("msg".to_owned(), Value::from("shadowed"));
        let entry = LogEntry::from_record_with_fields(record.clone(), fields);

        assert_eq!(entry.message(), "it \"broke\"");
        let value: Value = serde_json::from_str(entry.raw()).unwrap();
        assert_eq!(value["level"], "error");
        assert_eq!(value["ts"], "2024-01-02T03:04:05.000006Z");
        assert_eq!(value["msg"], "it \"broke\"");
        assert_eq!(value["caller"], "src/lib.rs:7");
        assert_eq!(value["attempt"], 3);

        // What we write, we can read back
        let parsed = LogEntry::from_json(entry.raw().as_bytes()).unwrap();
        assert_eq!(parsed.severity(), record.severity);
        assert_eq!(parsed.timestamp(), record.timestamp);
        assert_eq!(parsed.message(), record.message);
        assert_eq!(parsed.call_site(), record.call_site);
    }

    #[test]
    fn nanos_saturate() {
        let entry = LogEntry::from_record(Record {
            severity: "info".to_owned(),
            timestamp: Utc.with_ymd_and_hms(2500, 1, 1, 0, 0, 0).unwrap(),
            message: String::new(),
            call_site: String::new(),
        });
        assert_eq!(entry.timestamp_nanos(), i64::MAX);
    }
}
