//! Error taxonomy for the co-signature workflow
//!
//! Every variant carries a distinct, stable message so callers can tell
//! "not your turn" apart from "already decided" apart from "upload failed".

use crate::envelope::EnvelopeStatus;

pub type Result<T> = std::result::Result<T, WorkflowError>;

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("invalid envelope definition: {0}")]
    InvalidDefinition(String),

    #[error("no slot is waiting for a signature")]
    NoWaitingSlot,

    #[error("not this signer's turn. expected: {expected}, got: {got}")]
    WrongSigner { expected: String, got: String },

    #[error("envelope is already {0}")]
    AlreadyFinal(EnvelopeStatus),

    #[error("a signed artifact is required")]
    MissingArtifact,

    #[error("a rejection reason is required")]
    EmptyReason,

    #[error("artifact store failure: {0}")]
    ArtifactStore(String),

    #[error("envelope was modified concurrently, retry the operation")]
    ConcurrentModification,

    #[error("acting user is not the claimed signer")]
    Forbidden,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Codec(String),
}

impl From<sled::Error> for WorkflowError {
    fn from(e: sled::Error) -> Self {
        WorkflowError::Storage(e.to_string())
    }
}

impl From<minicbor::decode::Error> for WorkflowError {
    fn from(e: minicbor::decode::Error) -> Self {
        WorkflowError::Codec(e.to_string())
    }
}

impl From<minicbor::encode::Error<std::convert::Infallible>> for WorkflowError {
    fn from(e: minicbor::encode::Error<std::convert::Infallible>) -> Self {
        WorkflowError::Codec(e.to_string())
    }
}
