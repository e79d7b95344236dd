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

//! [tracing-loki-push](crate)'s [`Layer`] implementation.
//!
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//!
//! [`Layer`] is the "direct hook" by which [`tracing`] [`Event`]s enter the pipeline: for each
//! event, it builds a [`Record`] (severity, timestamp, message & call-site), serializes that
//! together with the event's other fields as a JSON object, and hands the result off to the
//! background task.
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html

use crate::{
    entry::{LogEntry, Record},
    intake::Intake,
};

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::Event;
use tracing_subscriber::layer::Context;

// When the tracing-log feature is enabled, use NormalizeEvent to extract file/line metadata
// from events that originated from the `log` crate. This follows the same pattern used by
// tracing-subscriber's fmt layer.
// See: https://github.com/tokio-rs/tracing/blob/master/tracing-subscriber/src/fmt/fmt_layer.rs
#[cfg(feature = "tracing-log")]
use tracing_log::NormalizeEvent;

/// Map a [`tracing`] level to the severity string we report.
///
/// [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
pub fn severity(level: &tracing::Level) -> &'static str {
    match *level {
        tracing::Level::TRACE => "trace",
        tracing::Level::DEBUG => "debug",
        tracing::Level::INFO => "info",
        tracing::Level::WARN => "warn",
        tracing::Level::ERROR => "error",
    }
}

/// `file:line` if we have both, else the module path, else the target
fn call_site(meta: &tracing::Metadata<'_>) -> String {
    match (meta.file(), meta.line(), meta.module_path()) {
        (Some(file), Some(line), _) => format!("{}:{}", file, line),
        (Some(file), None, _) => file.to_owned(),
        (None, _, Some(module)) => module.to_owned(),
        (None, _, None) => meta.target().to_owned(),
    }
}

/// Collects the "message" field separately & everything else into a JSON map
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_owned());
        } else {
            self.fields.insert(field.name().to_owned(), Value::from(value));
        }
    }
    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields.insert(field.name().to_owned(), Value::from(value));
    }
    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(field.name().to_owned(), Value::from(value));
    }
    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(field.name().to_owned(), Value::from(value));
    }
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.fields.insert(field.name().to_owned(), Value::from(value));
    }
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        // The tracing macros `info!()`, `event!()` & the like all take care to "pre-format" the
        // `message` field so that `value` actually refers to a `std::fmt::Arguments` instance,
        // which will print to a debug format without enclosing double-quotes.
        let text = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(text);
        } else {
            self.fields.insert(field.name().to_owned(), Value::from(text));
        }
    }
}

/// A [`tracing-subscriber`]-compliant [`Layer`] implementation that hands [`Event`]s off to a
/// [`Pusher`](crate::pusher::Pusher).
///
/// Obtain one through [`Pusher::layer`](crate::pusher::Pusher::layer).
///
/// [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
/// [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
/// [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
#[derive(Clone, Debug)]
pub struct Layer {
    intake: Intake,
}

impl Layer {
    pub fn new(intake: Intake) -> Layer {
        Layer { intake }
    }
    /// Turn `event` into a [`LogEntry`]
    pub fn entry_for(&self, event: &Event<'_>) -> LogEntry {
        #[cfg(feature = "tracing-log")]
        let normalized_meta = event.normalized_metadata();
        #[cfg(feature = "tracing-log")]
        let meta = normalized_meta.as_ref().unwrap_or_else(|| event.metadata());
        #[cfg(not(feature = "tracing-log"))]
        let meta = event.metadata();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        visitor
            .fields
            .insert("target".to_owned(), Value::from(meta.target()));

        LogEntry::from_record_with_fields(
            Record {
                severity: severity(meta.level()).to_owned(),
                timestamp: Utc::now(),
                message: visitor.message.unwrap_or_default(),
                call_site: call_site(meta),
            },
            visitor.fields,
        )
    }
}

impl<S> tracing_subscriber::layer::Layer<S> for Layer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        // There's no one to whom we could report a failure here (logging it would just bring us
        // back here); the only possible failure is that the pusher has been stopped, so drop it.
        let _ = self.intake.push(self.entry_for(event));
    }
}
