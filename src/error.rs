use thiserror::Error;

use crate::collaborator::CollaboratorError;

/// Crate-wide error taxonomy.
///
/// Only `Config` and an unreadable checkpoint on explicit resume abort a
/// run. Proposal failures are downgraded to failure attempts after bounded
/// retry, sandbox outcomes are always data, and store write failures are
/// logged and skipped.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("proposal failed: {0}")]
    Proposal(String),

    #[error("collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("knowledge store error: {0}")]
    Store(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
