//! The DID-resolver port.
//!
//! Implemented by the VDR registry and by individual method drivers; consumed
//! by the payment processor to obtain payer documents for signature checks.

use async_trait::async_trait;
use std::fmt::{self, Display};

use crate::did::{Did, DidDocument};
use crate::error::ErrorCode;

/// A resolution failure with its wire-level code.
#[derive(Debug, thiserror::Error)]
pub struct ResolverError {
    pub code: ErrorCode,
    pub message: String,
}

impl ResolverError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ResolverError {
            code,
            message: message.into(),
        }
    }
}

impl Display for ResolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Resolves DIDs to documents.
///
/// `resolve` returns `Ok(None)` for a DID that is well-formed but unknown,
/// and an error only for transport or method failures.
#[async_trait]
pub trait DidResolver: Send + Sync {
    async fn resolve(&self, did: &Did) -> Result<Option<DidDocument>, ResolverError>;

    async fn exists(&self, did: &Did) -> Result<bool, ResolverError> {
        Ok(self.resolve(did).await?.is_some())
    }
}

#[async_trait]
impl<T: DidResolver + ?Sized> DidResolver for std::sync::Arc<T> {
    async fn resolve(&self, did: &Did) -> Result<Option<DidDocument>, ResolverError> {
        self.as_ref().resolve(did).await
    }

    async fn exists(&self, did: &Did) -> Result<bool, ResolverError> {
        self.as_ref().exists(did).await
    }
}
