use std::fmt;
use std::time::Duration;

use http::{HeaderValue, Uri};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Environment variable holding the ledger API credential.
pub const API_KEY_ENV: &str = "IMMUDB_API_KEY";
/// Optional environment override for the ledger document endpoint.
pub const ENDPOINT_ENV: &str = "IMMUDB_LEDGER_URL";
/// Optional environment override for the per-request timeout, in seconds.
pub const TIMEOUT_ENV: &str = "IMMUDB_REQUEST_TIMEOUT_SECS";

/// Default document collection endpoint of the hosted ledger vault.
pub const DEFAULT_ENDPOINT: &str =
    "https://vault.immudb.io/ics/api/v1/ledger/default/collection/default/document";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// The ledger API credential.
///
/// Never empty and always a valid header value. Debug output is redacted.
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Result<Self, LedgerError> {
        let key = key.into();
        if key.is_empty() {
            return Err(LedgerError::MissingCredential(API_KEY_ENV));
        }
        HeaderValue::from_str(&key).map_err(|_| LedgerError::InvalidCredential)?;
        Ok(Self(SecretString::from(key)))
    }

    /// Header value for the `X-API-Key` header, marked sensitive.
    pub fn header_value(&self) -> Result<HeaderValue, LedgerError> {
        let mut value = HeaderValue::from_str(self.0.expose_secret())
            .map_err(|_| LedgerError::InvalidCredential)?;
        value.set_sensitive(true);
        Ok(value)
    }

    /// Display form that reveals only the key length.
    pub fn redacted(&self) -> String {
        format!("****({} chars)", self.0.expose_secret().len())
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// File-provided ledger settings. Never carries the credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Document endpoint; [`DEFAULT_ENDPOINT`] when unset.
    pub endpoint: Option<String>,
    /// Upper bound for one PUT, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Startup configuration for a ledger publisher.
///
/// Built once and shared read-only by every reconciliation. Construction
/// fails when no credential is available, so an unauthenticated publisher
/// can never exist.
#[derive(Debug)]
pub struct LedgerConfig {
    pub endpoint: Uri,
    pub api_key: ApiKey,
    pub request_timeout: Duration,
}

impl LedgerConfig {
    pub fn new(endpoint: &str, api_key: ApiKey) -> Result<Self, LedgerError> {
        Ok(Self {
            endpoint: parse_endpoint(endpoint)?,
            api_key,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Build from the process environment layered over `settings`.
    pub fn from_env(settings: &LedgerSettings) -> Result<Self, LedgerError> {
        Self::from_lookup(settings, |key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup layered over `settings`.
    ///
    /// [`API_KEY_ENV`] is required. [`ENDPOINT_ENV`] and [`TIMEOUT_ENV`]
    /// override the corresponding settings when present.
    pub fn from_lookup<F>(settings: &LedgerSettings, lookup: F) -> Result<Self, LedgerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = lookup(API_KEY_ENV)
            .filter(|k| !k.is_empty())
            .ok_or(LedgerError::MissingCredential(API_KEY_ENV))?;
        let api_key = ApiKey::new(key)?;

        let endpoint = lookup(ENDPOINT_ENV)
            .filter(|e| !e.is_empty())
            .or_else(|| settings.endpoint.clone())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let timeout_secs = match lookup(TIMEOUT_ENV).filter(|t| !t.is_empty()) {
            Some(raw) => raw.parse::<u64>().map_err(|e| LedgerError::InvalidSetting {
                key: TIMEOUT_ENV.into(),
                reason: e.to_string(),
            })?,
            None => settings.request_timeout_secs,
        };
        if timeout_secs == 0 {
            return Err(LedgerError::InvalidSetting {
                key: "request_timeout_secs".into(),
                reason: "must be greater than zero".into(),
            });
        }

        Ok(Self::new(&endpoint, api_key)?.with_request_timeout(Duration::from_secs(timeout_secs)))
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Uri, LedgerError> {
    let invalid = |reason: &str| LedgerError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };
    let uri: Uri = endpoint.parse().map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        _ => return Err(invalid("scheme must be http or https")),
    }
    if uri.authority().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(uri)
}
