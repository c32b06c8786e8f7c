use crate::{client::TransportError, commit::SequenceError};

/// Outcome classes of every storage call.
///
/// Adapters translate raw transport and status outcomes into exactly one of
/// these kinds. `NotFound` is usually absorbed into an empty result before it
/// reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("document `{0}` not found")]
    NotFound(String),

    #[error("document conflict while writing `{0}`")]
    DocumentConflict(String),

    #[error("storage error for `{identifier}`: {reason}")]
    Storage {
        identifier: String,
        reason: StorageReason,
    },
}

impl Error {
    pub fn storage(identifier: impl Into<String>, reason: impl Into<StorageReason>) -> Self {
        Self::Storage {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::DocumentConflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn reason(&self) -> Option<&StorageReason> {
        match self {
            Self::Storage { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageReason {
    #[error("`{0}` is not implemented")]
    NotImplemented(&'static str),

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("write was not acknowledged")]
    Unacknowledged,

    #[error("revision conflict")]
    Conflict,

    #[error("document body must be a json object")]
    InvalidBody,

    #[error("transport `{0}`")]
    Transport(#[from] TransportError),

    #[error("serde_json `{0}`")]
    SerdeJson(#[from] serde_json::Error),

    #[error("invalid commit sequence: {0}")]
    InvalidSequence(#[from] SequenceError),
}

pub type Result<T> = std::result::Result<T, Error>;
