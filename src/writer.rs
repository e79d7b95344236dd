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

//! The byte-stream intake.
//!
//! [`LokiWriter`] lets a pusher serve as the output target of any logger that can write
//! serialized JSON records to a [`std::io::Write`] implementation; in particular, it implements
//! [`MakeWriter`], so it can be plugged straight into a [`tracing-subscriber`] `fmt` layer that's
//! been configured to emit JSON:
//!
//! ```no_run
//! use tracing_loki_push::{config::Config, pusher::Pusher};
//! use tracing_subscriber::{layer::SubscriberExt, registry::Registry};
//!
//! let pusher = Pusher::new(Config::builder("http://localhost:3100").build().unwrap()).unwrap();
//! let subscriber = Registry::default().with(
//!     tracing_subscriber::fmt::layer()
//!         .json()
//!         .with_writer(pusher.writer()),
//! );
//! ```
//!
//! Each `write()` is expected to carry exactly one record (which is what the `fmt` layer does).
//!
//! [`MakeWriter`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/fmt/trait.MakeWriter.html
//! [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html

use crate::{error::Error, intake::Intake};

use tracing_subscriber::fmt::MakeWriter;

use std::io;

/// A [`std::io::Write`] implementation that parses each write as one serialized log record & hands
/// it off to a [`Pusher`](crate::pusher::Pusher)
#[derive(Clone, Debug)]
pub struct LokiWriter {
    intake: Intake,
}

impl LokiWriter {
    pub fn new(intake: Intake) -> LokiWriter {
        LokiWriter { intake }
    }
}

impl io::Write for LokiWriter {
    /// Fails with [`io::ErrorKind::InvalidData`] if `buf` isn't a serialized record (in which case
    /// nothing is handed-off), and with [`io::ErrorKind::BrokenPipe`] once the pusher has stopped.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.intake.write(buf).map_err(|err| match err {
            Error::Parse { .. } => io::Error::new(io::ErrorKind::InvalidData, err),
            Error::Closed { .. } => io::Error::new(io::ErrorKind::BrokenPipe, err),
            err => io::Error::new(io::ErrorKind::Other, err),
        })
    }
    /// Entries are flushed by the background task on its own schedule; nothing to do here.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LokiWriter {
    type Writer = LokiWriter;
    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
