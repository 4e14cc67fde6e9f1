use std::fmt;

use async_trait::async_trait;
use evl_types::NamespacedName;

use crate::error::ForwardError;

/// Why a reconciliation ended without anything to retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The event was deleted before it could be read.
    NotFound,
    /// The event carries no uid, so it has no stable ledger identity.
    MissingUid,
    /// The document could not be encoded. Retrying cannot fix this.
    Unencodable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::MissingUid => write!(f, "missing uid"),
            Self::Unencodable(reason) => write!(f, "unencodable: {reason}"),
        }
    }
}

/// What a single reconciliation attempt tells its driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Done; no redelivery.
    Success,
    /// Transient failure; the driver should redeliver with backoff.
    RetryableError(ForwardError),
    /// Nothing to do, now or later.
    TerminalSkip(SkipReason),
}

impl ReconcileOutcome {
    /// Whether the driver should redeliver this notification.
    pub fn requeue(&self) -> bool {
        matches!(self, Self::RetryableError(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// The driver-facing contract: one notification in, one outcome out.
#[async_trait]
pub trait Reconciler: Send + Sync {
    async fn reconcile(&self, name: &NamespacedName) -> ReconcileOutcome;
}
