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

//! A [`tracing-subscriber`] [`Layer`] implementation (and [`std::io::Write`] adapter) that batches
//! [`tracing`] [`Event`]s and pushes them to [Grafana Loki]
//!
//! [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//! [`tracing`]: https://docs.rs/tracing/0.1.35/tracing/index.html
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
//! [Grafana Loki]: https://grafana.com/oss/loki/
//!
//! # Introduction
//!
//! Loki ingests log lines through an HTTP [push API]: each request carries one or more *streams*,
//! each of which is a fixed set of labels together with an ordered list of (timestamp, line)
//! pairs. Sending one request per log line would be wasteful, so this crate accumulates lines
//! into batches & sends a batch whenever it fills up, or whenever it's been waiting long enough,
//! whichever comes first.
//!
//! [push API]: https://grafana.com/docs/loki/latest/reference/loki-http-api/#ingest-logs
//!
//! The work is split between producers (any thread that logs) and a single background task
//! that owns the pending batch. Producers hand entries off over a bounded channel and return;
//! the background task alone decides when to flush. Flushes are made one at a time, so if Loki
//! is slow to respond the channel fills up & producers block until it drains. A batch that can't
//! be delivered is logged & discarded; failures are never reported back to producers.
//!
//! # Usage
//!
//! Build a [`Config`](config::Config), start a [`Pusher`](pusher::Pusher), and hand its
//! [`Layer`](layer::Layer) to your subscriber:
//!
//! ```no_run
//! use tracing::info;
//! use tracing_loki_push::{config::Config, pusher::Pusher};
//! use tracing_subscriber::registry::Registry;
//! use tracing_subscriber::layer::SubscriberExt; // Needed to get `with()`
//!
//! let config = Config::builder("http://localhost:3100")
//!     .label("app", "my-app")
//!     .label("env", "dev")
//!     .build()
//!     .unwrap();
//! let pusher = Pusher::new(config).unwrap();
//! let subscriber = Registry::default().with(pusher.layer());
//! tracing::subscriber::set_global_default(subscriber).unwrap();
//!
//! info!(user = "jdoe", "Hello, world!");
//!
//! // On the way out: flush anything pending & wait for the background task to finish
//! pusher.stop();
//! ```
//!
//! Will produce a Loki line on the stream `{app="my-app", env="dev"}` that looks something like
//! this:
//!
//! ```text
//! {"caller":"src/main.rs:15","level":"info","msg":"Hello, world!","target":"my_app","ts":"2025-06-23T16:10:55.123456Z","user":"jdoe"}
//! ```
//!
//! Alternatively, if you'd prefer the lines be formatted by [`tracing-subscriber`]'s own JSON
//! formatter (or any other logger that writes JSON records to an [`std::io::Write`]), use
//! [`Pusher::fmt_layer`](pusher::Pusher::fmt_layer), or [`Pusher::writer`](pusher::Pusher::writer)
//! as the formatter's writer; in that case each record is shipped verbatim.
//!
//! The batching policy, credentials, request timeout & so forth are all configurable; see
//! [`config`]. To stop the pusher abruptly (without a final flush) when some broader scope ends,
//! hand it a [`CancellationToken`](tokio_util::sync::CancellationToken) through
//! [`ConfigBuilder::cancel_on`](config::ConfigBuilder::cancel_on).
//!
//! The pusher reports on its own doings (successful flushes at debug level, failed ones at error)
//! through [`tracing`], too; see [`ConfigBuilder::diagnostics`](config::ConfigBuilder::diagnostics)
//! to send those reports somewhere in particular. Whatever it logs is never fed back into Loki.

mod accumulator;
pub mod config;
pub mod entry;
pub mod error;
pub mod intake;
pub mod layer;
pub mod push;
pub mod pusher;
pub mod transport;
pub mod writer;
