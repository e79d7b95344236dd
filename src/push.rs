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

//! The Loki push-request envelope.
//!
//! Loki's [push API] takes a JSON document of the form:
//!
//! ```text
//! {"streams": [{"stream": {"app": "test"}, "values": [["1700000000123456789", "log line"], ...]}]}
//! ```
//!
//! We always send exactly one stream per request, labelled with the fixed label set from our
//! [`Config`](crate::config::Config). The document is gzip-compressed before it goes on the wire.
//!
//! [push API]: https://grafana.com/docs/loki/latest/reference/loki-http-api/#ingest-logs

use crate::{
    entry::LogEntry,
    error::{Error, Result},
};

use backtrace::Backtrace;
use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use serde::Serialize;

use std::collections::BTreeMap;

/// One `[timestamp, line]` pair in a stream; the timestamp is nanoseconds since the Unix epoch,
/// rendered as a decimal string
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StreamValue(String, String);

impl StreamValue {
    pub fn timestamp(&self) -> &str {
        &self.0
    }
    pub fn line(&self) -> &str {
        &self.1
    }
}

impl From<LogEntry> for StreamValue {
    fn from(entry: LogEntry) -> Self {
        StreamValue(entry.timestamp_nanos().to_string(), entry.into_raw())
    }
}

#[derive(Serialize)]
struct PushRequest<'a> {
    streams: [Stream<'a>; 1],
}

#[derive(Serialize)]
struct Stream<'a> {
    stream: &'a BTreeMap<String, String>,
    values: &'a [StreamValue],
}

/// Serialize `values` as a single stream labelled with `labels`, then gzip the lot.
pub fn encode(labels: &BTreeMap<String, String>, values: &[StreamValue]) -> Result<Bytes> {
    let req = PushRequest {
        streams: [Stream {
            stream: labels,
            values,
        }],
    };
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    serde_json::to_writer(&mut gz, &req).map_err(|err| Error::Encode {
        source: Box::new(err),
        back: Backtrace::new(),
    })?;
    gz.finish().map(Bytes::from).map_err(|err| Error::Encode {
        source: Box::new(err),
        back: Backtrace::new(),
    })
}
