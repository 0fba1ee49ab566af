#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{stream, StreamExt};
use reqwest::Client;
use tget::prelude::*;

#[derive(Clone)]
pub struct AppState {
    pub content: Arc<Vec<u8>>,
    pub hits: Arc<AtomicUsize>,
    pub seen: Arc<Mutex<Vec<HeaderMap>>>,
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    /// `Range` headers of every request received so far.
    pub fn ranges(&self) -> Vec<Option<String>> {
        self.state
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|h| {
                h.get(header::RANGE)
                    .map(|v| v.to_str().unwrap().to_string())
            })
            .collect()
    }

    pub fn last_headers(&self) -> HeaderMap {
        self.state.seen.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

fn record(state: &AppState, headers: &HeaderMap) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state.seen.lock().unwrap().push(headers.clone());
}

/// Parses `bytes=a-b` / `bytes=a-` against a resource of `total` bytes.
/// `Err(())` means unsatisfiable.
fn parse_range(value: &str, total: usize) -> Option<Result<(usize, usize), ()>> {
    let value = value.strip_prefix("bytes=")?;
    let (start, end) = value.split_once('-')?;
    let start: usize = start.parse().ok()?;
    let end: usize = if end.is_empty() {
        total.saturating_sub(1)
    } else {
        end.parse::<usize>().ok()?.min(total.saturating_sub(1))
    };
    if start >= total || start > end {
        return Some(Err(()));
    }
    Some(Ok((start, end)))
}

async fn ranged(State(state): State<AppState>, headers: HeaderMap) -> Response {
    record(&state, &headers);
    let total = state.content.len();
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_range(v, total));

    match range {
        Some(Ok((start, end))) => (
            StatusCode::PARTIAL_CONTENT,
            [(header::CONTENT_RANGE, format!("bytes {}-{}/{}", start, end, total))],
            Bytes::copy_from_slice(&state.content[start..=end]),
        )
            .into_response(),
        Some(Err(())) => (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{}", total))],
        )
            .into_response(),
        None => (StatusCode::OK, Bytes::copy_from_slice(&state.content)).into_response(),
    }
}

async fn no_range(State(state): State<AppState>, headers: HeaderMap) -> Response {
    record(&state, &headers);
    (StatusCode::OK, Bytes::copy_from_slice(&state.content)).into_response()
}

/// Answers a range request with `delta` bytes more (or fewer) than asked.
async fn skewed(state: AppState, headers: HeaderMap, delta: isize) -> Response {
    record(&state, &headers);
    let total = state.content.len();
    match headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_range(v, total))
    {
        Some(Ok((start, end))) => {
            let end = ((end as isize) + delta).clamp(start as isize - 1, total as isize - 1);
            let body = Bytes::copy_from_slice(&state.content[start..(end + 1) as usize]);
            (StatusCode::PARTIAL_CONTENT, body).into_response()
        }
        _ => (StatusCode::OK, Bytes::copy_from_slice(&state.content)).into_response(),
    }
}

async fn short(State(state): State<AppState>, headers: HeaderMap) -> Response {
    skewed(state, headers, -1).await
}

async fn long(State(state): State<AppState>, headers: HeaderMap) -> Response {
    skewed(state, headers, 1).await
}

async fn overshoot(State(state): State<AppState>, headers: HeaderMap) -> Response {
    skewed(state, headers, 5).await
}

async fn no_length(State(state): State<AppState>, headers: HeaderMap) -> Response {
    record(&state, &headers);
    let content = state.content.clone();
    let parts: Vec<Result<Bytes, std::io::Error>> = content
        .chunks(100)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Response::new(Body::from_stream(stream::iter(parts)))
}

/// Sends the first 1000 bytes, then fails the body.
async fn broken(State(state): State<AppState>, headers: HeaderMap) -> Response {
    record(&state, &headers);
    let head = Bytes::copy_from_slice(&state.content[..1000.min(state.content.len())]);
    let body = stream::once(async move { Ok::<_, std::io::Error>(head) }).chain(stream::once(async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Err(std::io::Error::new(std::io::ErrorKind::Other, "connection dropped"))
    }));
    Response::new(Body::from_stream(body))
}

/// Sends the first 1000 bytes, then never finishes.
async fn stall(State(state): State<AppState>, headers: HeaderMap) -> Response {
    record(&state, &headers);
    let head = Bytes::copy_from_slice(&state.content[..1000.min(state.content.len())]);
    let body = stream::once(async move { Ok::<_, std::io::Error>(head) }).chain(stream::pending());
    Response::new(Body::from_stream(body))
}

async fn redirect(State(state): State<AppState>, headers: HeaderMap) -> Response {
    record(&state, &headers);
    (StatusCode::FOUND, [(header::LOCATION, "/file")]).into_response()
}

async fn redirect_loop(State(state): State<AppState>, headers: HeaderMap) -> Response {
    record(&state, &headers);
    (StatusCode::FOUND, [(header::LOCATION, "/loop")]).into_response()
}

async fn redirect_without_location(State(state): State<AppState>, headers: HeaderMap) -> Response {
    record(&state, &headers);
    StatusCode::MOVED_PERMANENTLY.into_response()
}

async fn missing(State(state): State<AppState>, headers: HeaderMap) -> Response {
    record(&state, &headers);
    (StatusCode::NOT_FOUND, "not here").into_response()
}

pub async fn spawn_server(content: Vec<u8>) -> TestServer {
    let state = AppState {
        content: Arc::new(content),
        hits: Arc::new(AtomicUsize::new(0)),
        seen: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/file", get(ranged).post(ranged))
        .route("/norange", get(no_range))
        .route("/short", get(short))
        .route("/long", get(long))
        .route("/overshoot", get(overshoot))
        .route("/nolength", get(no_length))
        .route("/broken", get(broken))
        .route("/stall", get(stall))
        .route("/redirect", get(redirect))
        .route("/loop", get(redirect_loop))
        .route("/nolocation", get(redirect_without_location))
        .route("/missing", get(missing))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test server");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer { addr, state }
}

/// Deterministic test payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// A direct client with the same settings the manager uses.
pub fn client() -> Client {
    build_clients(&ClientConfig::default()).unwrap().remove(0)
}

pub fn clients(n: usize) -> Vec<Client> {
    (0..n).map(|_| client()).collect()
}
