//! Ledger publishing for the event ledger forwarder (EVL).
//!
//! This crate owns the boundary to the remote immutable ledger:
//! - `LedgerPublisher` trait and the `PublishOutcome` classification
//! - `HttpLedgerPublisher`, a single-attempt idempotent PUT client
//! - `InMemoryLedger`, an upsert-by-id fake for tests and dry runs
//! - `LedgerConfig`, the startup configuration carrying the API credential

pub mod client;
pub mod config;
pub mod error;
pub mod memory;
pub mod traits;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use client::HttpLedgerPublisher;
pub use config::{
    ApiKey, LedgerConfig, LedgerSettings, API_KEY_ENV, DEFAULT_ENDPOINT, ENDPOINT_ENV,
    TIMEOUT_ENV,
};
pub use error::LedgerError;
pub use memory::InMemoryLedger;
pub use traits::{LedgerPublisher, PublishOutcome};
