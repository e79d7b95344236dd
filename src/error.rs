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

//! [tracing-loki-push](crate) errors

use backtrace::Backtrace;

/// [tracing-loki-push](crate) error type
///
/// Like its sibling crates, [tracing-loki-push](crate) eschews [thiserror], [anyhow] & [Snafu] in
/// favor of a straightforward enumeration with a few match arms chosen on the basis of what the
/// caller will need to respond.
///
/// Note that only [`Error::Parse`] and [`Error::Closed`] can ever reach a *producer* of log
/// entries; everything that goes wrong downstream of the hand-off to the background task is
/// reported through that task's diagnostics and never propagated.
///
/// [thiserror]: https://docs.rs/thiserror
/// [anyhow]: https://docs.rs/anyhow
/// [Snafu]: https://docs.rs/snafu/latest/snafu
#[non_exhaustive]
pub enum Error {
    /// The [`Config`](crate::config::Config) under construction would never flush, or names an
    /// endpoint we can't use
    BadConfig { reason: String, back: Backtrace },
    /// A serialized log record could not be understood
    Parse {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// The background task has stopped (or was cancelled) & no longer accepts entries
    Closed { back: Backtrace },
    /// Failed to serialize or compress a batch
    Encode {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// General transport layer error (connection refused, timeout & so forth)
    Transport {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// Loki answered with something other than 204 No Content
    UnexpectedStatus {
        status: u16,
        body: String,
        back: Backtrace,
    },
    /// Failed to launch the background task
    Spawn {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
}

impl Error {
    pub(crate) fn bad_config<S: Into<String>>(reason: S) -> Error {
        Error::BadConfig {
            reason: reason.into(),
            back: Backtrace::new(),
        }
    }
    pub(crate) fn closed() -> Error {
        Error::Closed {
            back: Backtrace::new(),
        }
    }
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadConfig { reason, .. } => write!(f, "Bad configuration: {}", reason),
            Error::Parse { source, .. } => {
                write!(f, "While parsing a serialized log record, got {}", source)
            }
            Error::Closed { .. } => write!(
                f,
                "The Loki pusher has stopped and is no longer accepting log entries"
            ),
            Error::Encode { source, .. } => {
                write!(f, "While encoding a push request, got {}", source)
            }
            Error::Transport { source, .. } => write!(f, "Transport error: {}", source),
            Error::UnexpectedStatus { status, body, .. } => write!(
                f,
                "Received unexpected response code {} from Loki: {}",
                status, body
            ),
            Error::Spawn { source, .. } => {
                write!(f, "Failed to start the Loki pusher: {}", source)
            }
            _ => write!(f, "Other tracing-loki-push error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadConfig { back, .. }
            | Error::Parse { back, .. }
            | Error::Closed { back }
            | Error::Encode { back, .. }
            | Error::Transport { back, .. }
            | Error::UnexpectedStatus { back, .. }
            | Error::Spawn { back, .. } => write!(f, "{}\n{:#?}", self, back),
            err => write!(f, "tracing-loki-push error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
