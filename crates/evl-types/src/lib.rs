//! Foundation types for the event ledger forwarder (EVL).
//!
//! This crate provides the data model shared by every other EVL crate.
//!
//! # Key Types
//!
//! - [`ClusterEvent`] — Snapshot of an orchestrator lifecycle event (core/v1 Event shape)
//! - [`NamespacedName`] — `namespace/name` handle used to fetch an event
//! - [`LedgerDocument`] — The `{id, event}` record written to the ledger, keyed by event uid

pub mod document;
pub mod error;
pub mod event;
pub mod name;

pub use document::LedgerDocument;
pub use error::TypeError;
pub use event::{ClusterEvent, ObjectMeta, ObjectReference, Reporter};
pub use name::NamespacedName;
