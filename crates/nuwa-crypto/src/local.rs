//! An in-process signer holding raw keypairs.
//!
//! Used by tests, custodian wiring, and anywhere keys are held locally.
//! Remote key management plugs in behind the same
//! [`Signer`](nuwa_types::signer::Signer) capability.

use async_trait::async_trait;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use nuwa_types::did::{Did, KeyType};
use nuwa_types::signer::{Signer, SignerError};

use crate::keys;
use crate::multibase;

#[derive(Clone)]
struct HeldKey {
    key_type: KeyType,
    private_key: Vec<u8>,
}

/// A [`Signer`] backed by an in-memory key map.
///
/// Keys are addressed by their verification method id; `sign` with an
/// unknown id fails rather than falling back to another key.
#[derive(Clone)]
pub struct LocalSigner {
    did: Option<Did>,
    address: String,
    keys: Arc<RwLock<HashMap<String, HeldKey>>>,
}

impl LocalSigner {
    pub fn new(address: impl Into<String>) -> Self {
        LocalSigner {
            did: None,
            address: address.into(),
            keys: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_did(mut self, did: Did) -> Self {
        self.did = Some(did);
        self
    }

    /// Adds a key under `key_id`. Ed25519 keys are 32-byte seeds,
    /// secp256k1 keys 32-byte scalars.
    pub fn with_key(self, key_id: impl Into<String>, key_type: KeyType, private_key: Vec<u8>) -> Self {
        self.keys
            .write()
            .expect("signer key map poisoned")
            .insert(key_id.into(), HeldKey { key_type, private_key });
        self
    }

    /// Generates a fresh key under `key_id` and returns its multibase
    /// public form.
    pub fn generate_key(&self, key_id: impl Into<String>, key_type: KeyType) -> String {
        let private_key = generate_private_key(key_type);
        let public = keys::public_key(&private_key, key_type).expect("fresh key is valid");
        self.keys
            .write()
            .expect("signer key map poisoned")
            .insert(key_id.into(), HeldKey { key_type, private_key });
        multibase::encode_public_key(key_type, &public)
    }

    /// The multibase public key held under `key_id`, if any.
    pub fn public_key_multibase(&self, key_id: &str) -> Option<String> {
        let keys = self.keys.read().expect("signer key map poisoned");
        let held = keys.get(key_id)?;
        let public = keys::public_key(&held.private_key, held.key_type).ok()?;
        Some(multibase::encode_public_key(held.key_type, &public))
    }
}

#[async_trait]
impl Signer for LocalSigner {
    async fn sign(&self, payload: &[u8], key_id: &str) -> Result<Vec<u8>, SignerError> {
        let held = {
            let keys = self.keys.read().expect("signer key map poisoned");
            keys.get(key_id)
                .cloned()
                .ok_or_else(|| SignerError::UnknownKey(key_id.into()))?
        };
        keys::sign(payload, &held.private_key, held.key_type)
            .map_err(|e| SignerError::Signing(e.to_string()))
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    fn did(&self) -> Option<Did> {
        self.did.clone()
    }
}

fn generate_private_key(key_type: KeyType) -> Vec<u8> {
    let mut rng = rand::rng();
    loop {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        // A random scalar can fall outside the secp256k1 field; retry.
        if keys::public_key(&bytes, key_type).is_ok() {
            return bytes.to_vec();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_with_generated_key() {
        let signer = LocalSigner::new("0x42").with_did(Did::rooch("0x42"));
        let public_multibase = signer.generate_key("did:rooch:0x42#account-key", KeyType::Ed25519);
        let (key_type, public) = multibase::decode_public_key(&public_multibase).unwrap();
        assert_eq!(key_type, KeyType::Ed25519);

        let payload = b"payload";
        let signature = signer.sign(payload, "did:rooch:0x42#account-key").await.unwrap();
        assert!(keys::verify(payload, &signature, &public, KeyType::Ed25519));
    }

    #[tokio::test]
    async fn test_sign_unknown_key_fails() {
        let signer = LocalSigner::new("0x42");
        let result = signer.sign(b"payload", "did:rooch:0x42#ghost").await;
        assert!(matches!(result, Err(SignerError::UnknownKey(_))));
    }

    #[tokio::test]
    async fn test_secp256k1_key_generation() {
        let signer = LocalSigner::new("0x43");
        let public_multibase = signer.generate_key("k", KeyType::Secp256k1);
        assert!(public_multibase.starts_with("zQ3s"));
        let signature = signer.sign(b"data", "k").await.unwrap();
        let (_, public) = multibase::decode_public_key(&public_multibase).unwrap();
        assert!(keys::verify(b"data", &signature, &public, KeyType::Secp256k1));
    }
}
