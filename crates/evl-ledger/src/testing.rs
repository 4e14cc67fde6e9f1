//! A fake ledger document service for test suites.
//!
//! Serves `PUT` on [`DOCUMENT_PATH`] from an ephemeral local port. Accepted
//! documents are upserted by their `id` field, matching the real ledger's
//! idempotent write semantics.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::put;
use axum::{Json, Router};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const DOCUMENT_PATH: &str = "/ics/api/v1/ledger/default/collection/default/document";

#[derive(Default)]
struct Inner {
    records: HashMap<String, Value>,
    puts: usize,
    peers: HashSet<SocketAddr>,
    api_keys: Vec<String>,
    content_types: Vec<String>,
    reply: Option<(u16, String)>,
    delay: Option<Duration>,
}

#[derive(Clone, Default)]
struct Shared(Arc<Mutex<Inner>>);

impl Shared {
    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut inner)
    }
}

/// Local HTTP server imitating the ledger's document collection endpoint.
pub struct FakeLedgerServer {
    addr: SocketAddr,
    shared: Shared,
    handle: JoinHandle<()>,
}

impl FakeLedgerServer {
    /// Bind an ephemeral port and start serving. Answers 200 by default.
    pub async fn start() -> std::io::Result<Self> {
        let shared = Shared::default();
        let app = Router::new()
            .route(DOCUMENT_PATH, put(put_document))
            .with_state(shared.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await;
        });
        Ok(Self { addr, shared, handle })
    }

    /// Full document endpoint URL for this server.
    pub fn endpoint(&self) -> String {
        format!("http://{}{}", self.addr, DOCUMENT_PATH)
    }

    /// Answer every following PUT with `status` and `body`.
    pub fn respond_with(&self, status: u16, body: impl Into<String>) {
        let body = body.into();
        self.shared.with(|inner| inner.reply = Some((status, body)));
    }

    /// Hold every following response for `delay`.
    pub fn delay_responses(&self, delay: Duration) {
        self.shared.with(|inner| inner.delay = Some(delay));
    }

    /// Number of PUT requests received, accepted or not.
    pub fn put_count(&self) -> usize {
        self.shared.with(|inner| inner.puts)
    }

    /// Number of distinct client connections that sent a PUT.
    pub fn connection_count(&self) -> usize {
        self.shared.with(|inner| inner.peers.len())
    }

    /// Number of distinct stored records.
    pub fn record_count(&self) -> usize {
        self.shared.with(|inner| inner.records.len())
    }

    pub fn record(&self, id: &str) -> Option<Value> {
        self.shared.with(|inner| inner.records.get(id).cloned())
    }

    /// `X-API-Key` values seen, in arrival order.
    pub fn api_keys(&self) -> Vec<String> {
        self.shared.with(|inner| inner.api_keys.clone())
    }

    /// `Content-Type` values seen, in arrival order.
    pub fn content_types(&self) -> Vec<String> {
        self.shared.with(|inner| inner.content_types.clone())
    }
}

impl Drop for FakeLedgerServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn put_document(
    State(shared): State<Shared>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(document): Json<Value>,
) -> (StatusCode, String) {
    let delay = shared.with(|inner| {
        inner.puts += 1;
        inner.peers.insert(peer);
        if let Some(key) = header(&headers, "x-api-key") {
            inner.api_keys.push(key);
        }
        if let Some(ct) = header(&headers, "content-type") {
            inner.content_types.push(ct);
        }
        inner.delay
    });
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    if header(&headers, "x-api-key").is_none() {
        return (StatusCode::UNAUTHORIZED, "missing api key".into());
    }

    shared.with(|inner| {
        let mut stored_body = "{}".to_string();
        if let Some((status, body)) = inner.reply.clone() {
            if status != 200 {
                let status =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                return (status, body);
            }
            stored_body = body;
        }
        match document.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => {
                inner.records.insert(id.to_string(), document.clone());
                (StatusCode::OK, stored_body)
            }
            _ => (StatusCode::BAD_REQUEST, "document id is required".into()),
        }
    })
}
