use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use evl_types::LedgerDocument;

use crate::error::LedgerError;
use crate::traits::{LedgerPublisher, PublishOutcome};

/// In-memory ledger for tests, dry runs, and embedding.
///
/// Documents are upserted by `id`, so repeated submissions of one event
/// converge to a single record. Scripted failures let callers exercise
/// rejection and transport paths without a network.
#[derive(Default)]
pub struct InMemoryLedger {
    records: RwLock<HashMap<String, LedgerDocument>>,
    failure: RwLock<Option<PublishOutcome>>,
    submissions: AtomicUsize,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every following submission with `status` and `body`.
    pub fn reject_with(&self, status: u16, body: impl Into<String>) {
        self.set_failure(Some(PublishOutcome::Rejected {
            status,
            body: body.into(),
        }));
    }

    /// Fail every following submission at the transport level.
    pub fn fail_transport(&self, reason: impl Into<String>) {
        self.set_failure(Some(PublishOutcome::TransportFailure(reason.into())));
    }

    /// Go back to accepting submissions.
    pub fn recover(&self) {
        self.set_failure(None);
    }

    /// Total submit calls, including failed ones.
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.read_records(|records| records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<LedgerDocument> {
        self.read_records(|records| records.get(id).cloned())
    }

    /// Stored ids in ascending order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids = self.read_records(|records| records.keys().cloned().collect::<Vec<_>>());
        ids.sort();
        ids
    }

    fn set_failure(&self, failure: Option<PublishOutcome>) {
        *self.failure.write().unwrap_or_else(PoisonError::into_inner) = failure;
    }

    fn read_records<R>(&self, f: impl FnOnce(&HashMap<String, LedgerDocument>) -> R) -> R {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        f(&records)
    }
}

#[async_trait]
impl LedgerPublisher for InMemoryLedger {
    async fn submit(&self, document: &LedgerDocument) -> Result<PublishOutcome, LedgerError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        // Encode exactly as the wire publisher would so encoding errors surface here too.
        document.to_canonical_json()?;

        let failure = self
            .failure
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(outcome) = failure {
            return Ok(outcome);
        }

        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(document.id.clone(), document.clone());
        Ok(PublishOutcome::Accepted)
    }
}
