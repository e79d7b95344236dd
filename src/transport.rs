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

//! The transport layer.
//!
//! This module defines the [`Transport`] trait that all implementations must support, as well as
//! [`HttpTransport`], which POSTs to Loki's push API via [`reqwest`]. The background task owns its
//! transport, and so the underlying connection pool is reused across every flush.
//!
//! # Examples
//!
//! ```rust
//! use tracing_loki_push::{config::Config, transport::HttpTransport};
//! let config = Config::builder("http://localhost:3100")
//!     .basic_auth("tenant", "secret")
//!     .build()
//!     .unwrap();
//! let transpo = HttpTransport::new(&config).unwrap();
//! ```
//!
//! [`reqwest`]: https://docs.rs/reqwest

use crate::{
    config::Config,
    error::{Error, Result},
};

use async_trait::async_trait;
use backtrace::Backtrace;
use bytes::Bytes;
use reqwest::{
    header::{CONTENT_ENCODING, CONTENT_TYPE},
    Client, Response, StatusCode, Url,
};

/// Most of an error response's body we'll keep for [`Error::UnexpectedStatus`]
pub const MAX_ERROR_BODY: usize = 4096;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      transport mechanisms                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Operations all transport layers must support.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one encoded push request (see [`push::encode`](crate::push::encode)).
    ///
    /// This is a single attempt: implementations shall not retry, and shall report anything short
    /// of unambiguous success as an error.
    async fn send(&self, body: Bytes) -> Result<()>;
}

/// Pushing to Loki over HTTP(S).
pub struct HttpTransport {
    client: Client,
    url: Url,
    credentials: Option<(String, String)>,
}

impl HttpTransport {
    /// Construct a [`Transport`] implementation that will POST to `config`'s push URL.
    pub fn new(config: &Config) -> Result<HttpTransport> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|err| Error::Transport {
            source: Box::new(err),
            back: Backtrace::new(),
        })?;
        Ok(HttpTransport {
            client,
            url: config.push_url().clone(),
            credentials: config
                .credentials()
                .map(|(user, pass)| (user.to_owned(), pass.to_owned())),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, body: Bytes) -> Result<()> {
        let mut request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip");
        if let Some((user, pass)) = &self.credentials {
            request = request.basic_auth(user, Some(pass));
        }

        let rsp = request
            .body(body)
            .send()
            .await
            .map_err(|err| Error::Transport {
                source: Box::new(err),
                back: Backtrace::new(),
            })?;

        match rsp.status() {
            StatusCode::NO_CONTENT => Ok(()),
            status => Err(Error::UnexpectedStatus {
                status: status.as_u16(),
                body: error_body(rsp).await,
                back: Backtrace::new(),
            }),
        }
    }
}

/// Read no more than [`MAX_ERROR_BODY`] bytes of `rsp`'s body.
async fn error_body(mut rsp: Response) -> String {
    let mut body = Vec::new();
    while body.len() < MAX_ERROR_BODY {
        match rsp.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(MAX_ERROR_BODY - body.len());
                body.extend_from_slice(&chunk[..take]);
            }
            // Keep whatever arrived before the error
            _ => break,
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}
