// Chatlog Core — embedded chat history persistence
//
// One versioned local database, one message collection, two secondary
// indexes. Everything above this crate (rendering, configuration) is a
// collaborator that calls the four public store operations.

pub mod store;

use sled::transaction::TransactionError;
use thiserror::Error;

pub use store::{MessageRecord, MessageStore, NewMessage, Role, SessionSummary};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying engine failed to open, commit, or read.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// A record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The on-disk schema is newer than this build understands.
    /// Downgrade is unsupported.
    #[error("database schema version {found} is newer than supported version {supported}")]
    SchemaVersion { found: u32, supported: u32 },

    /// The schema metadata record is malformed.
    #[error("corrupt schema metadata: {0}")]
    CorruptMeta(String),

    /// Session ids participate in index key encoding and must be
    /// non-empty with no NUL bytes.
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),
}

impl From<TransactionError<StoreError>> for StoreError {
    fn from(err: TransactionError<StoreError>) -> Self {
        match err {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(inner) => StoreError::Storage(inner),
        }
    }
}
