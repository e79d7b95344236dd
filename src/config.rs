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

//! Pusher configuration.
//!
//! A [`Config`] is assembled through [`Config::builder`]:
//!
//! ```rust
//! use std::time::Duration;
//! use tracing_loki_push::config::Config;
//!
//! let config = Config::builder("http://localhost:3100/")
//!     .max_batch_size(100)
//!     .max_batch_wait(Duration::from_secs(10))
//!     .label("app", "test")
//!     .label("env", "dev")
//!     .build()
//!     .unwrap();
//! assert_eq!(config.push_url().as_str(), "http://localhost:3100/loki/api/v1/push");
//! ```
//!
//! [`ConfigBuilder::build`] refuses settings under which the background task could never flush:
//!
//! ```rust
//! use tracing_loki_push::config::Config;
//! assert!(Config::builder("http://localhost:3100").max_batch_size(0).build().is_err());
//! ```

use crate::error::{Error, Result};

use reqwest::Url;
use tokio_util::sync::CancellationToken;

use std::{collections::BTreeMap, time::Duration};

/// Path, relative to the base URL, of Loki's push API
pub const PUSH_PATH: &str = "/loki/api/v1/push";

/// Default maximum number of entries per push request
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;
/// Default maximum time a partially-full batch may wait before it's sent
pub const DEFAULT_MAX_BATCH_WAIT: Duration = Duration::from_secs(5);
/// Default capacity of the hand-off channel between producers & the background task
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
/// Default per-request HTTP timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the background task needs to know. Immutable once built.
#[derive(Clone)]
pub struct Config {
    push_url: Url,
    max_batch_size: usize,
    max_batch_wait: Duration,
    labels: BTreeMap<String, String>,
    username: Option<String>,
    password: Option<String>,
    channel_capacity: usize,
    request_timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
    diagnostics: Option<tracing::Dispatch>,
}

impl Config {
    /// Start building a [`Config`] that will push to the Loki instance at `base_url` (e.g.
    /// `http://localhost:3100`)
    pub fn builder<S: Into<String>>(base_url: S) -> ConfigBuilder {
        ConfigBuilder {
            base_url: base_url.into(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_batch_wait: DEFAULT_MAX_BATCH_WAIT,
            labels: BTreeMap::new(),
            username: None,
            password: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            cancel: None,
            diagnostics: None,
        }
    }
    /// The fully-qualified push endpoint
    pub fn push_url(&self) -> &Url {
        &self.push_url
    }
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
    pub fn max_batch_wait(&self) -> Duration {
        self.max_batch_wait
    }
    /// The fixed label set applied to every stream we push
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }
    /// Basic-auth credentials; `Some` only if both the username & the password are non-empty
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }
    /// The external cancellation scope, if any
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }
    /// The dispatcher to which the background task reports, if one was given explicitly
    pub fn diagnostics(&self) -> Option<&tracing::Dispatch> {
        self.diagnostics.as_ref()
    }
}

/// Join `base_url` & [`PUSH_PATH`], tolerating any number of trailing slashes on the former.
fn push_url_for(base_url: &str) -> Result<Url> {
    let joined = format!("{}{}", base_url.trim_end_matches('/'), PUSH_PATH);
    let url = Url::parse(&joined)
        .map_err(|err| Error::bad_config(format!("'{}' is not a valid URL: {}", base_url, err)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(Error::bad_config(format!(
            "'{}' has scheme '{}'; expected http or https",
            base_url, scheme
        ))),
    }
}

pub struct ConfigBuilder {
    base_url: String,
    max_batch_size: usize,
    max_batch_wait: Duration,
    labels: BTreeMap<String, String>,
    username: Option<String>,
    password: Option<String>,
    channel_capacity: usize,
    request_timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
    diagnostics: Option<tracing::Dispatch>,
}

impl ConfigBuilder {
    /// Flush as soon as this many entries have accumulated. Must be greater than zero.
    pub fn max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }
    /// Flush a partially-full batch after this long. Must be greater than zero.
    pub fn max_batch_wait(mut self, max_batch_wait: Duration) -> Self {
        self.max_batch_wait = max_batch_wait;
        self
    }
    pub fn label<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
    pub fn labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self
            .labels
            .extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
    /// Authenticate with HTTP basic auth. Ignored unless both are non-empty.
    pub fn basic_auth<U: Into<String>, P: Into<String>>(mut self, username: U, password: P) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
    /// Number of entries that may sit in the hand-off channel before producers block
    pub fn channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity;
        self
    }
    /// Per-request timeout; `None` waits for as long as the endpoint takes
    pub fn request_timeout(mut self, request_timeout: Option<Duration>) -> Self {
        self.request_timeout = request_timeout;
        self
    }
    /// Terminate the background task, *without* a final flush, when `token` is cancelled
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
    /// Report the background task's own diagnostics to `dispatch`
    pub fn diagnostics(mut self, dispatch: tracing::Dispatch) -> Self {
        self.diagnostics = Some(dispatch);
        self
    }
    pub fn build(self) -> Result<Config> {
        if self.max_batch_size == 0 {
            return Err(Error::bad_config("max_batch_size must be greater than zero"));
        }
        if self.max_batch_wait.is_zero() {
            return Err(Error::bad_config("max_batch_wait must be greater than zero"));
        }
        if self.channel_capacity == 0 {
            return Err(Error::bad_config("channel_capacity must be greater than zero"));
        }
        Ok(Config {
            push_url: push_url_for(&self.base_url)?,
            max_batch_size: self.max_batch_size,
            max_batch_wait: self.max_batch_wait,
            labels: self.labels,
            username: self.username,
            password: self.password,
            channel_capacity: self.channel_capacity,
            request_timeout: self.request_timeout,
            cancel: self.cancel,
            diagnostics: self.diagnostics,
        })
    }
}
