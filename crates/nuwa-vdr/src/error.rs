//! Typed VDR errors with wire codes.

use nuwa_crypto::multibase::MultibaseError;
use nuwa_types::chain::ChainError;
use nuwa_types::did::DocumentError;
use nuwa_types::error::ErrorCode;
use nuwa_types::resolver::ResolverError;
use nuwa_types::signer::SignerError;

/// Errors surfaced by VDR operations.
#[derive(Debug, thiserror::Error)]
pub enum VdrError {
    /// No driver is registered for the DID method.
    #[error("no driver registered for DID method '{0}'")]
    MethodUnsupported(String),

    /// A write operation requires a signer and none was supplied.
    #[error("no signer available for {0}")]
    NoSigner(&'static str),

    /// Client-side pre-check: the signer does not control the required
    /// relationship. No transaction was sent.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The DID exists but the requested entity (method, service) does not.
    #[error("{0} not found")]
    NotFound(String),

    /// The DID itself is unknown to the driver.
    #[error("DID {0} is not registered")]
    UnknownDid(String),

    /// A service definition failed catalog validation.
    #[error("invalid service definition: {0}")]
    InvalidService(String),

    /// A malformed or conflicting creation/mutation request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Multibase(#[from] MultibaseError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Signer(#[from] SignerError),
}

impl VdrError {
    /// The wire-level code carried to callers.
    pub fn code(&self) -> ErrorCode {
        match self {
            VdrError::MethodUnsupported(_) => ErrorCode::MethodUnsupported,
            VdrError::NoSigner(_) => ErrorCode::NoSigner,
            VdrError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            // Mutations on unknown targets are refused by the pre-check,
            // like any other unauthorized write.
            VdrError::NotFound(_) | VdrError::UnknownDid(_) => ErrorCode::PermissionDenied,
            VdrError::InvalidService(_) | VdrError::InvalidRequest(_) => ErrorCode::PermissionDenied,
            VdrError::Chain(e) => e.code(),
            VdrError::Multibase(e) => e.code(),
            VdrError::Document(_) => ErrorCode::EventUnparseable,
            VdrError::Signer(_) => ErrorCode::NoSigner,
        }
    }
}

impl From<VdrError> for ResolverError {
    fn from(error: VdrError) -> Self {
        ResolverError::new(error.code(), error.to_string())
    }
}
