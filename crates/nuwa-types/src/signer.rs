//! The signing capability used for transactions and SubRAVs.
//!
//! Permission pre-checks never inspect private material; they only see the
//! signer's address and the key ids it claims to control.

use async_trait::async_trait;

use crate::did::Did;

/// Errors surfaced by [`Signer`] implementations.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// The signer holds no key matching the requested key id.
    #[error("unknown key id {0}")]
    UnknownKey(String),
    /// The underlying signing primitive failed.
    #[error("signing failed: {0}")]
    Signing(String),
}

/// A capability that signs byte payloads with a named key.
///
/// Implementations may hold keys locally or delegate to remote key
/// management; callers never see private material.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Signs `payload` with the key identified by `key_id`
    /// (a `<did>#<fragment>` verification method id).
    async fn sign(&self, payload: &[u8], key_id: &str) -> Result<Vec<u8>, SignerError>;

    /// The chain address this signer controls.
    fn address(&self) -> String;

    /// The DID this signer acts as, when known.
    fn did(&self) -> Option<Did> {
        None
    }
}

#[async_trait]
impl<T: Signer + ?Sized> Signer for std::sync::Arc<T> {
    async fn sign(&self, payload: &[u8], key_id: &str) -> Result<Vec<u8>, SignerError> {
        self.as_ref().sign(payload, key_id).await
    }

    fn address(&self) -> String {
        self.as_ref().address()
    }

    fn did(&self) -> Option<Did> {
        self.as_ref().did()
    }
}
