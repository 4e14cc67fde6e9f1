use std::fmt;

use async_trait::async_trait;
use evl_types::LedgerDocument;

use crate::error::LedgerError;

/// Classification of one submission attempt against the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The ledger answered 200.
    Accepted,
    /// The ledger answered with any other status. `body` is verbatim.
    Rejected { status: u16, body: String },
    /// The request never produced a response (refused, DNS, timeout).
    TransportFailure(String),
}

impl PublishOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl fmt::Display for PublishOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected { status, .. } => write!(f, "rejected with status {status}"),
            Self::TransportFailure(reason) => write!(f, "transport failure: {reason}"),
        }
    }
}

/// Write boundary to the immutable ledger.
///
/// Implementations perform exactly one attempt per call. Retries belong to
/// the caller. `Err` is reserved for failures that happen before anything
/// reaches the wire, such as a document that cannot be encoded.
#[async_trait]
pub trait LedgerPublisher: Send + Sync {
    async fn submit(&self, document: &LedgerDocument) -> Result<PublishOutcome, LedgerError>;
}
