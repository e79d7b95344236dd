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

//! The producer side of the hand-off.
//!
//! An [`Intake`] is a cheap, cloneable handle on the channel feeding a
//! [`Pusher`](crate::pusher::Pusher)'s background task. Every way of getting entries into the
//! pipeline ([`Layer`](crate::layer::Layer), [`LokiWriter`](crate::writer::LokiWriter), or calling
//! [`Intake::push`] directly) ends up here.
//!
//! All three operations are synchronous & may be called from any thread, whether or not it's
//! running an async runtime. If the background task has fallen behind (typically because a flush
//! is in progress against a slow endpoint) and the channel is full, they block the calling thread
//! until there's room. That's deliberate: back-pressure is passed on to producers rather than
//! hidden in an ever-growing queue.

use crate::{
    entry::{LogEntry, Record},
    error::{Error, Result},
};

use tokio::sync::mpsc::{self, error::TrySendError};

/// Name given to the background task's thread (and its runtime's blocking pool)
pub(crate) const WORKER_THREAD_NAME: &str = "loki-pusher";

/// Are we running on a pusher's own worker thread?
///
/// Anything logged there (the pusher's diagnostics, or its HTTP client's) must not be fed back
/// into the pipeline: the task would be waiting on a channel only it can drain.
pub(crate) fn on_worker_thread() -> bool {
    std::thread::current().name() == Some(WORKER_THREAD_NAME)
}

/// Handle by which producers hand [`LogEntry`]s off to the background task
#[derive(Clone, Debug)]
pub struct Intake {
    entries: mpsc::Sender<LogEntry>,
}

impl Intake {
    pub(crate) fn new(entries: mpsc::Sender<LogEntry>) -> Intake {
        Intake { entries }
    }
    /// Hand `entry` off, blocking while the channel is full.
    ///
    /// Fails only if the background task has stopped (or been cancelled). Entries pushed from the
    /// worker thread itself are silently discarded.
    pub fn push(&self, entry: LogEntry) -> Result<()> {
        if on_worker_thread() {
            return Ok(());
        }
        match self.entries.try_send(entry) {
            Ok(()) => Ok(()),
            // `Sender::blocking_send()` panics if called from within an async execution context,
            // and we have no way of knowing whether our caller is in one, so park the thread on
            // the send future ourselves.
            Err(TrySendError::Full(entry)) => {
                futures::executor::block_on(self.entries.send(entry)).map_err(|_| Error::closed())
            }
            Err(TrySendError::Closed(_)) => Err(Error::closed()),
        }
    }
    /// Hand off a [`Record`], serializing it as per [`LogEntry::from_record`]
    pub fn hook(&self, record: Record) -> Result<()> {
        self.push(LogEntry::from_record(record))
    }
    /// Parse `buf` as one serialized record & hand it off, retaining `buf` verbatim.
    ///
    /// On a parse error, nothing is handed-off. Returns the number of bytes consumed (always all
    /// of them) on success.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let entry = LogEntry::from_json(buf)?;
        self.push(entry)?;
        Ok(buf.len())
    }
    /// True if the background task is no longer accepting entries
    pub fn is_closed(&self) -> bool {
        self.entries.is_closed()
    }
}
