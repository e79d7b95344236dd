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

//! Test pushing to a Loki instance on port 3100 of the local host via the direct hook.
//!
//! Pass a different base URL as the first argument to push elsewhere.

use tracing::{debug, error, info, trace, warn};
use tracing_loki_push::{config::Config, pusher::Pusher};
use tracing_subscriber::{
    layer::SubscriberExt, // Needed to get `with()`
    registry::Registry,
};

use std::time::Duration;

pub fn main() {
    let base = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:3100".to_owned());
    let pusher = Pusher::new(
        Config::builder(base)
            .label("app", "loki-push-test")
            .label("test", "layer")
            .max_batch_size(3)
            .max_batch_wait(Duration::from_secs(1))
            .build()
            .unwrap(),
    )
    .unwrap();

    // Setup the real subsriber...
    let subscriber = Registry::default().with(pusher.layer());
    // and install it.
    let _guard = tracing::subscriber::set_default(subscriber);

    trace!("Hello, 世界!");
    debug!("Hello, 世界!");
    info!(count = 3, "Hello, 世界!");
    // That should have filled the first batch; let the timer pick up the rest
    warn!("Hello, 世界!");
    std::thread::sleep(Duration::from_secs(2));
    error!(reason = "none at all", "Hello, 世界!");

    pusher.stop();
}
