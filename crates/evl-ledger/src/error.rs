/// Errors produced while configuring or driving a ledger publisher.
///
/// Remote outcomes (non-200 responses, unreachable hosts) are not errors;
/// they are reported as a [`crate::PublishOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("{0} is not set")]
    MissingCredential(&'static str),

    #[error("credential is not a valid header value")]
    InvalidCredential,

    #[error("invalid ledger endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("request construction failed: {0}")]
    Request(String),
}

impl From<evl_types::TypeError> for LedgerError {
    fn from(e: evl_types::TypeError) -> Self {
        Self::Serialization(e.to_string())
    }
}
