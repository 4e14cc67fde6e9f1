use std::error::Error as StdError;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use evl_types::LedgerDocument;
use http::header::CONTENT_TYPE;
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::Response;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::traits::{LedgerPublisher, PublishOutcome};

const API_KEY_HEADER: &str = "X-API-Key";
const JSON: &str = "application/json";

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Publishes documents to the ledger with a single idempotent PUT.
///
/// One client (and its connection pool) is shared by all callers. The
/// configuration is read-only after construction.
pub struct HttpLedgerPublisher {
    config: Arc<LedgerConfig>,
    client: HttpsClient,
}

impl HttpLedgerPublisher {
    pub fn new(config: LedgerConfig) -> Self {
        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(https);
        Self {
            config: Arc::new(config),
            client,
        }
    }

    fn build_request(&self, payload: Vec<u8>) -> Result<Request<Full<Bytes>>, LedgerError> {
        Request::builder()
            .method(Method::PUT)
            .uri(self.config.endpoint.clone())
            .header(API_KEY_HEADER, self.config.api_key.header_value()?)
            .header(CONTENT_TYPE, JSON)
            .body(Full::new(Bytes::from(payload)))
            .map_err(|e| LedgerError::Request(e.to_string()))
    }

    async fn exchange(&self, request: Request<Full<Bytes>>) -> PublishOutcome {
        let response: Response<Incoming> = match self.client.request(request).await {
            Ok(response) => response,
            Err(e) => return PublishOutcome::TransportFailure(error_chain(&e)),
        };

        // The body is read in full even on success so the connection goes
        // back to the pool.
        let status = response.status();
        match response.into_body().collect().await {
            Ok(_) if status == StatusCode::OK => PublishOutcome::Accepted,
            Ok(collected) => PublishOutcome::Rejected {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&collected.to_bytes()).into_owned(),
            },
            Err(e) => PublishOutcome::TransportFailure(format!(
                "status {status} with unreadable body: {}",
                error_chain(&e)
            )),
        }
    }
}

#[async_trait]
impl LedgerPublisher for HttpLedgerPublisher {
    async fn submit(&self, document: &LedgerDocument) -> Result<PublishOutcome, LedgerError> {
        let payload = document.to_canonical_json()?;
        let request = self.build_request(payload)?;

        debug!(id = %document.id, endpoint = %self.config.endpoint, "submitting ledger document");

        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, self.exchange(request)).await {
            Ok(outcome) => Ok(outcome),
            Err(_) => Ok(PublishOutcome::TransportFailure(format!(
                "request timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }
}

/// Render an error together with its sources, outermost first.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
