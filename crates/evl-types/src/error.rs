use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("event {name} has no uid")]
    MissingUid { name: String },

    #[error("invalid namespaced name: {0}")]
    InvalidName(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
