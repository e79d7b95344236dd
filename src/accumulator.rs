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

//! The batching accumulator.
//!
//! [`Accumulator`] is the background task at the heart of a [`Pusher`](crate::pusher::Pusher). It
//! owns the pending batch outright (no other task ever sees it) and reacts to four kinds of event:
//!
//! | event                   | reaction                                                         |
//! |-------------------------|------------------------------------------------------------------|
//! | entry arrives           | append; if the batch is now full, flush & restart the timer      |
//! | timer fires             | flush if the batch is non-empty; the timer re-arms regardless    |
//! | stop requested          | drain what producers have already handed-off, final flush, exit  |
//! | cancellation            | exit immediately, even mid-flush; whatever is pending is lost    |
//!
//! Flushes happen inline, so while one is in progress no entries are taken off the channel; once
//! the channel fills, producers block.
//!
//! Any failure to deliver a batch is logged & the batch discarded. There are no retries.

use crate::{
    config::Config,
    entry::LogEntry,
    error::Result,
    push::{self, StreamValue},
    transport::Transport,
};

use tokio::{
    sync::{mpsc, oneshot},
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use std::{collections::BTreeMap, time::Duration};

/// Why the accumulator's event loop exited
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Exit {
    /// Graceful stop (requested, or every producer went away): pending entries were flushed
    Stopped,
    /// The external cancellation scope ended: pending entries were dropped
    Cancelled,
}

pub(crate) struct Accumulator<T: Transport> {
    labels: BTreeMap<String, String>,
    max_batch_size: usize,
    max_batch_wait: Duration,
    batch: Vec<StreamValue>,
    transport: T,
    entries: mpsc::Receiver<LogEntry>,
    stop: oneshot::Receiver<()>,
    cancel: CancellationToken,
}

impl<T: Transport> Accumulator<T> {
    pub(crate) fn new(
        config: &Config,
        transport: T,
        entries: mpsc::Receiver<LogEntry>,
        stop: oneshot::Receiver<()>,
    ) -> Accumulator<T> {
        Accumulator {
            labels: config.labels().clone(),
            max_batch_size: config.max_batch_size(),
            max_batch_wait: config.max_batch_wait(),
            batch: Vec::with_capacity(config.max_batch_size()),
            transport,
            entries,
            stop,
            // A token no one else holds will simply never fire
            cancel: config.cancellation().cloned().unwrap_or_default(),
        }
    }

    /// The event loop; runs until stopped or cancelled.
    pub(crate) async fn run(mut self) -> Exit {
        let mut timer = time::interval_at(Instant::now() + self.max_batch_wait, self.max_batch_wait);
        // A slow flush shouldn't be followed by a burst of catch-up ticks
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(
            max_batch_size = self.max_batch_size,
            max_batch_wait = ?self.max_batch_wait,
            "Loki pusher started"
        );

        let exit = loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    break Exit::Cancelled;
                }
                // The sender side going away without a word is as good as a stop request
                _ = &mut self.stop => {
                    break self.drain().await;
                }
                entry = self.entries.recv() => match entry {
                    Some(entry) => {
                        if self.receive(entry) {
                            if !self.flush().await {
                                break Exit::Cancelled;
                            }
                            timer.reset();
                        }
                    }
                    None => {
                        break self.drain().await;
                    }
                },
                _ = timer.tick() => {
                    if !self.batch.is_empty() && !self.flush().await {
                        break Exit::Cancelled;
                    }
                }
            }
        };

        match exit {
            Exit::Stopped => debug!("Loki pusher stopped"),
            Exit::Cancelled => debug!(
                dropped = self.batch.len(),
                "Loki pusher cancelled; pending entries dropped"
            ),
        }
        exit
    }

    /// Append `entry` to the batch; returns true if the batch is now full.
    fn receive(&mut self, entry: LogEntry) -> bool {
        self.batch.push(StreamValue::from(entry));
        self.batch.len() >= self.max_batch_size
    }

    /// Take everything producers managed to hand-off before the stop, flushing as the batch fills,
    /// then flush whatever's left over. Cancellation still cuts this short.
    async fn drain(&mut self) -> Exit {
        self.entries.close();
        loop {
            let entry = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Exit::Cancelled,
                entry = self.entries.recv() => entry,
            };
            match entry {
                Some(entry) => {
                    if self.receive(entry) && !self.flush().await {
                        return Exit::Cancelled;
                    }
                }
                None => break,
            }
        }
        if !self.batch.is_empty() && !self.flush().await {
            return Exit::Cancelled;
        }
        Exit::Stopped
    }

    /// Ship the current batch, then clear it, whatever the outcome.
    ///
    /// Returns false if cancellation arrived mid-flight; the request is abandoned & the batch left
    /// as-is.
    async fn flush(&mut self) -> bool {
        let count = self.batch.len();
        let res = tokio::select! {
            () = self.cancel.cancelled() => return false,
            res = self.ship() => res,
        };
        match res {
            Ok(()) => debug!(count, "Pushed batch to Loki"),
            Err(err) => error!(count, error = %err, "Failed to push batch to Loki; discarding it"),
        }
        self.batch.clear();
        true
    }

    async fn ship(&self) -> Result<()> {
        let body = push::encode(&self.labels, &self.batch)?;
        self.transport.send(body).await
    }
}
