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

//! End-to-end tests: push over real HTTP to a capturing Loki stand-in

use axum::{
    body::Bytes,
    http::{HeaderMap, Method, StatusCode, Uri},
    Router,
};
use flate2::read::GzDecoder;
use mockito::Server;
use serde_json::{json, Value};
use tracing_loki_push::{
    config::Config,
    entry::Record,
    error::Error,
    pusher::Pusher,
    transport::{HttpTransport, Transport, MAX_ERROR_BODY},
};

use std::{
    collections::HashMap,
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

/// One request as seen by the capture server
#[derive(Clone, Debug)]
struct Captured {
    method: Method,
    path: String,
    headers: HashMap<String, String>,
    body: Value,
}

type Requests = Arc<Mutex<Vec<Captured>>>;

/// Start a server that records (& gunzips) every request it receives, answering 204. Returns its
/// base URL.
async fn capture_server(requests: Requests) -> String {
    let app = Router::new().fallback(
        move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| {
            let requests = Arc::clone(&requests);
            async move {
                let headers = headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                    .collect();
                let body = serde_json::from_reader(GzDecoder::new(&body[..]))
                    .unwrap_or(Value::Null);
                requests.lock().unwrap().push(Captured {
                    method,
                    path: uri.path().to_owned(),
                    headers,
                    body,
                });
                StatusCode::NO_CONTENT
            }
        },
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind capture server");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("Capture server failed");
    });
    format!("http://{}", addr)
}

/// `Pusher::stop()` blocks until the background task has exited; keep that off the runtime
async fn stop(pusher: Pusher) {
    tokio::task::spawn_blocking(move || pusher.stop())
        .await
        .unwrap();
}

fn record(message: &str) -> Record {
    Record {
        severity: "info".to_owned(),
        timestamp: chrono::Utc::now(),
        message: message.to_owned(),
        call_site: "push_integration.rs:1".to_owned(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_entry_single_push() {
    let requests = Requests::default();
    let base = capture_server(requests.clone()).await;

    let pusher = Pusher::new(
        Config::builder(base)
            .max_batch_size(100)
            .max_batch_wait(Duration::from_secs(10))
            .label("app", "test")
            .label("env", "dev")
            .build()
            .unwrap(),
    )
    .unwrap();

    let raw = r#"{"level":"info","msg":"test message"}"#;
    assert_eq!(pusher.write(raw.as_bytes()).unwrap(), raw.len());
    stop(pusher).await;

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.method, Method::POST);
    assert_eq!(req.path, "/loki/api/v1/push");
    assert_eq!(req.headers["content-type"], "application/json");
    assert_eq!(req.headers["content-encoding"], "gzip");
    assert!(!req.headers.contains_key("authorization"));

    let streams = req.body["streams"].as_array().unwrap();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0]["stream"], json!({"app": "test", "env": "dev"}));
    let values = streams[0]["values"].as_array().unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0][1], raw);
    // Nanoseconds, as a decimal string
    let nanos: i64 = values[0][0].as_str().unwrap().parse().unwrap();
    assert!(nanos > 1_600_000_000_000_000_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timer_driven_push() {
    let requests = Requests::default();
    let base = capture_server(requests.clone()).await;

    let pusher = Pusher::new(
        Config::builder(format!("{}///", base))
            .max_batch_size(100)
            .max_batch_wait(Duration::from_millis(200))
            .build()
            .unwrap(),
    )
    .unwrap();
    pusher.hook(record("tick")).unwrap();

    let mut waited = Duration::ZERO;
    while requests.lock().unwrap().is_empty() {
        assert!(waited < Duration::from_secs(10), "timer never fired");
        tokio::time::sleep(Duration::from_millis(50)).await;
        waited += Duration::from_millis(50);
    }
    stop(pusher).await;

    let requests = requests.lock().unwrap();
    // Trailing slashes on the base URL are dropped
    assert_eq!(requests[0].path, "/loki/api/v1/push");
    assert_eq!(requests.len(), 1);
    let line = requests[0].body["streams"][0]["values"][0][1].as_str().unwrap();
    let line: Value = serde_json::from_str(line).unwrap();
    assert_eq!(line["msg"], "tick");
    assert_eq!(line["caller"], "push_integration.rs:1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn basic_auth() {
    let requests = Requests::default();
    let base = capture_server(requests.clone()).await;

    let pusher = Pusher::new(
        Config::builder(base.clone())
            .basic_auth("tenant", "secret")
            .build()
            .unwrap(),
    )
    .unwrap();
    pusher.hook(record("with credentials")).unwrap();
    stop(pusher).await;

    // Half a set of credentials is no credentials at all
    let pusher = Pusher::new(
        Config::builder(base)
            .basic_auth("tenant", "")
            .build()
            .unwrap(),
    )
    .unwrap();
    pusher.hook(record("without")).unwrap();
    stop(pusher).await;

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[0].headers["authorization"],
        "Basic dGVuYW50OnNlY3JldA=="
    );
    assert!(!requests[1].headers.contains_key("authorization"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_errors_are_not_the_callers_problem() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/loki/api/v1/push")
        .match_header("content-encoding", "gzip")
        .with_status(500)
        .with_body("Internal Server Error")
        .expect(1)
        .create_async()
        .await;

    let pusher = Pusher::new(Config::builder(server.url()).build().unwrap()).unwrap();
    pusher.hook(record("into the void")).unwrap();
    pusher.hook(record("likewise")).unwrap();
    stop(pusher).await;

    // One attempt for the one batch; no retries
    mock.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_writes_never_reach_loki() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/loki/api/v1/push")
        .expect(0)
        .create_async()
        .await;

    let pusher = Pusher::new(Config::builder(server.url()).build().unwrap()).unwrap();
    assert!(pusher.write(b"not json").is_err());
    assert!(pusher.write(br#"["an", "array"]"#).is_err());
    stop(pusher).await;

    mock.assert_async().await;
}

#[tokio::test]
async fn only_204_is_success() {
    let mut server = Server::new_async().await;
    let config = Config::builder(server.url()).build().unwrap();
    let transport = HttpTransport::new(&config).unwrap();

    let ok = server
        .mock("POST", "/loki/api/v1/push")
        .with_status(204)
        .create_async()
        .await;
    transport.send(Bytes::from_static(b"{}")).await.unwrap();
    ok.assert_async().await;
    ok.remove_async().await;

    // A 200 is still not what Loki says when it's accepted a push
    let _m = server
        .mock("POST", "/loki/api/v1/push")
        .with_status(200)
        .with_body("ok?")
        .create_async()
        .await;
    match transport.send(Bytes::from_static(b"{}")).await {
        Err(Error::UnexpectedStatus { status, body, .. }) => {
            assert_eq!(status, 200);
            assert_eq!(body, "ok?");
        }
        other => panic!("expected an unexpected-status error, got {:?}", other),
    }
}

#[tokio::test]
async fn error_bodies_are_truncated() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("POST", "/loki/api/v1/push")
        .with_status(500)
        .with_body("x".repeat(10 * MAX_ERROR_BODY))
        .create_async()
        .await;
    let transport = HttpTransport::new(&Config::builder(server.url()).build().unwrap()).unwrap();
    match transport.send(Bytes::from_static(b"{}")).await {
        Err(Error::UnexpectedStatus { status, body, .. }) => {
            assert_eq!(status, 500);
            assert_eq!(body.len(), MAX_ERROR_BODY);
        }
        other => panic!("expected an unexpected-status error, got {:?}", other),
    }
}

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn a_200_is_logged_as_a_failed_push() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/loki/api/v1/push")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let capture = Capture::default();
    let sink = capture.clone();
    let diagnostics = tracing::Dispatch::new(
        tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .finish(),
    );
    let pusher = Pusher::new(
        Config::builder(server.url())
            .diagnostics(diagnostics)
            .build()
            .unwrap(),
    )
    .unwrap();
    pusher.hook(record("accepted?")).unwrap();
    stop(pusher).await;

    mock.assert_async().await;
    let text = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
    assert!(text.contains("Failed to push batch to Loki"), "{}", text);
    assert!(text.contains("200"), "{}", text);
}
