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

//! Test pushing to a Loki instance on port 3100 of the local host via the byte-stream intake,
//! with the records formatted by tracing-subscriber's JSON formatter.
//!
//! Pass a different base URL as the first argument to push elsewhere. If the environment
//! variables `LOKI_USERNAME` and `LOKI_PASSWORD` are both set, they'll be used for basic auth.

use tracing::{debug, error, info, trace, warn};
use tracing_loki_push::{config::Config, pusher::Pusher};
use tracing_subscriber::{
    layer::SubscriberExt, // Needed to get `with()`
    registry::Registry,
};

use std::io::Write;

pub fn main() {
    let base = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:3100".to_owned());
    let mut builder = Config::builder(base)
        .label("app", "loki-push-test")
        .label("test", "writer");
    if let (Ok(username), Ok(password)) = (
        std::env::var("LOKI_USERNAME"),
        std::env::var("LOKI_PASSWORD"),
    ) {
        builder = builder.basic_auth(username, password);
    }
    let pusher = Pusher::new(builder.build().unwrap()).unwrap();

    let subscriber = Registry::default().with(pusher.fmt_layer());
    let _guard = tracing::subscriber::set_default(subscriber);

    trace!("Hello, 世界!");
    debug!("Hello, 世界!");
    info!("Hello, 世界!");
    warn!("Hello, 世界!");
    error!("Hello, 世界!");

    // Records may also be written directly, as any JSON-logging library would
    let mut writer = pusher.writer();
    writer
        .write_all(br#"{"level":"info","caller":"writer-test.rs:1","msg":"Hello from zap"}"#)
        .unwrap();
    // ...but malformed ones are refused.
    assert!(writer.write(b"Hello, 世界!").is_err());

    pusher.stop();
}
