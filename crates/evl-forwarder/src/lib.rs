//! Reconciliation pipeline for the event ledger forwarder (EVL).
//!
//! For every notified event handle the forwarder fetches the current
//! snapshot, derives its ledger document, and publishes it. The result tells
//! the driver whether to redeliver.
//!
//! - `EventSource` — read-by-name boundary into the orchestrator's store
//! - `Reconciler` / `ReconcileOutcome` — the driver contract
//! - `EventForwarder` — the reconciler that feeds the ledger
//! - `Dispatcher` — batch replay driver with bounded concurrency and backoff

pub mod dispatch;
pub mod error;
pub mod forwarder;
pub mod reconcile;
pub mod source;
pub mod stats;

pub use dispatch::{DispatchConfig, DispatchReport, Dispatcher};
pub use error::{FetchError, ForwardError};
pub use forwarder::EventForwarder;
pub use reconcile::{ReconcileOutcome, Reconciler, SkipReason};
pub use source::{EventSource, InMemoryEventSource};
pub use stats::{ForwarderStats, StatsSnapshot};
