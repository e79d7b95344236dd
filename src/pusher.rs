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

//! The [`Pusher`]: a running batching accumulator & the handle through which it's fed & stopped.
//!
//! Constructing a [`Pusher`] starts its background task on a dedicated thread; from then on,
//! entries may be handed-off through [`Pusher::push`], [`Pusher::hook`] & [`Pusher::write`], or
//! through any of the host-logger adapters it vends ([`Pusher::layer`], [`Pusher::writer`] &
//! [`Pusher::fmt_layer`]). Those adapters hold their own handle on the hand-off channel and may
//! outlive the [`Pusher`]; once it's been stopped, they simply fail (or, in the case of the
//! [`Layer`], quietly drop what they're given).
//!
//! # Examples
//!
//! ```no_run
//! use tracing_loki_push::{config::Config, pusher::Pusher};
//! use tracing::info;
//! use tracing_subscriber::{layer::SubscriberExt, registry::Registry};
//!
//! let config = Config::builder("http://localhost:3100")
//!     .label("app", "example")
//!     .build()
//!     .unwrap();
//! let pusher = Pusher::new(config).unwrap();
//! let subscriber = Registry::default().with(pusher.layer());
//! tracing::subscriber::with_default(subscriber, || {
//!     info!("Hello, Loki!");
//! });
//! // Flush whatever's pending & wait for the background task to exit
//! pusher.stop();
//! ```

use crate::{
    accumulator::Accumulator,
    config::Config,
    entry::{LogEntry, Record},
    error::{Error, Result},
    intake::{Intake, WORKER_THREAD_NAME},
    layer::Layer,
    transport::{HttpTransport, Transport},
    writer::LokiWriter,
};

use backtrace::Backtrace;
use tokio::sync::{mpsc, oneshot};
use tracing::error;
use tracing_subscriber::{
    fmt::format::{Format, Json, JsonFields},
    registry::LookupSpan,
};

use std::{
    sync::{Mutex, PoisonError},
    thread::{self, JoinHandle},
};

/// What's needed to bring the background task to a graceful stop
struct Shutdown {
    stop: oneshot::Sender<()>,
    worker: JoinHandle<()>,
}

/// A running batching accumulator.
///
/// Dropping a [`Pusher`] stops it, as per [`Pusher::stop`].
pub struct Pusher {
    intake: Intake,
    shutdown: Mutex<Option<Shutdown>>,
}

impl std::fmt::Debug for Pusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pusher")
            .field("intake", &self.intake)
            .finish_non_exhaustive()
    }
}

impl Pusher {
    /// Start pushing to the Loki instance named in `config` over HTTP
    pub fn new(config: Config) -> Result<Pusher> {
        let transport = HttpTransport::new(&config)?;
        Pusher::with_transport(config, transport)
    }
    /// Start a background task that will deliver its batches through `transport`
    pub fn with_transport<T: Transport + 'static>(config: Config, transport: T) -> Result<Pusher> {
        let (entries, rx) = mpsc::channel(config.channel_capacity());
        let (stop, stop_rx) = oneshot::channel();
        let diagnostics = config.diagnostics().cloned();
        let accumulator = Accumulator::new(&config, transport, rx, stop_rx);

        // Name the blocking pool's threads, too: the HTTP client may log from there
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .thread_name(WORKER_THREAD_NAME)
            .build()
            .map_err(|err| Error::Spawn {
                source: Box::new(err),
                back: Backtrace::new(),
            })?;

        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_owned())
            .spawn(move || {
                let run = || {
                    runtime.block_on(accumulator.run());
                };
                match diagnostics {
                    Some(dispatch) => tracing::dispatcher::with_default(&dispatch, run),
                    None => run(),
                }
            })
            .map_err(|err| Error::Spawn {
                source: Box::new(err),
                back: Backtrace::new(),
            })?;

        Ok(Pusher {
            intake: Intake::new(entries),
            shutdown: Mutex::new(Some(Shutdown { stop, worker })),
        })
    }
    /// A handle on the hand-off channel, for callers who'd like to build their own adapter
    pub fn intake(&self) -> Intake {
        self.intake.clone()
    }
    /// Hand off `entry`; see [`Intake::push`]
    pub fn push(&self, entry: LogEntry) -> Result<()> {
        self.intake.push(entry)
    }
    /// Hand off `record`; see [`Intake::hook`]
    pub fn hook(&self, record: Record) -> Result<()> {
        self.intake.hook(record)
    }
    /// Parse & hand off one serialized record; see [`Intake::write`]
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.intake.write(buf)
    }
    /// A [`tracing_subscriber::Layer`] feeding this pusher
    pub fn layer(&self) -> Layer {
        Layer::new(self.intake())
    }
    /// An [`std::io::Write`] (& [`MakeWriter`](tracing_subscriber::fmt::MakeWriter)) feeding this
    /// pusher
    pub fn writer(&self) -> LokiWriter {
        LokiWriter::new(self.intake())
    }
    /// A JSON-formatting `fmt` layer (with file & line numbers) whose output goes to this pusher
    pub fn fmt_layer<S>(&self) -> tracing_subscriber::fmt::Layer<S, JsonFields, Format<Json>, LokiWriter>
    where
        S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    {
        tracing_subscriber::fmt::layer()
            .json()
            .with_file(true)
            .with_line_number(true)
            .with_writer(self.writer())
    }
    /// Stop the background task, flushing anything pending, and wait for it to exit.
    ///
    /// Entries handed-off before this call are all flushed. Only the first call does anything;
    /// don't call this from within the pusher's own transport.
    pub fn stop(&self) {
        let shutdown = self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Shutdown { stop, worker }) = shutdown {
            // An error here just means the task is already on its way out (cancelled)
            let _ = stop.send(());
            if worker.join().is_err() {
                error!("The Loki pusher's worker thread panicked");
            }
        }
    }
}

impl Drop for Pusher {
    fn drop(&mut self) {
        self.stop();
    }
}
