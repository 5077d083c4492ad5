//! Raw signature operations per key type.
//!
//! `verify` is total: any malformed key, signature, or unsupported
//! combination verifies to `false`. `sign` is fallible and surfaces why the
//! private material was unusable.

use ed25519_dalek::{Signer as _, Verifier as _};
use k256::ecdsa::signature::{Signer as _, Verifier as _};
use k256::elliptic_curve::sec1::ToEncodedPoint as _;

use nuwa_types::did::KeyType;

/// Errors producing a signature.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid {0} private key")]
    InvalidPrivateKey(KeyType),
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Verifies `signature` over `payload` with `public_key` of `key_type`.
///
/// Signatures are never valid by accident: malformed inputs return `false`.
pub fn verify(payload: &[u8], signature: &[u8], public_key: &[u8], key_type: KeyType) -> bool {
    match key_type {
        KeyType::Ed25519 => verify_ed25519(payload, signature, public_key),
        KeyType::Secp256k1 => verify_secp256k1(payload, signature, public_key),
    }
}

fn verify_ed25519(payload: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    let Ok(key_bytes) = <&[u8; 32]>::try_from(public_key) else {
        return false;
    };
    let Ok(verifying_key) = ed25519_dalek::VerifyingKey::from_bytes(key_bytes) else {
        return false;
    };
    let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
        return false;
    };
    verifying_key.verify(payload, &signature).is_ok()
}

fn verify_secp256k1(payload: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    let Ok(verifying_key) = k256::ecdsa::VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(signature) = k256::ecdsa::Signature::from_slice(signature) else {
        return false;
    };
    verifying_key.verify(payload, &signature).is_ok()
}

/// Signs `payload` with `private_key` of `key_type`.
///
/// Ed25519 keys are 32-byte seeds; secp256k1 keys are 32-byte scalars.
/// Signatures are 64 bytes for both types (secp256k1 in normalized
/// fixed form, no recovery byte).
pub fn sign(payload: &[u8], private_key: &[u8], key_type: KeyType) -> Result<Vec<u8>, CryptoError> {
    match key_type {
        KeyType::Ed25519 => {
            let key_bytes = <&[u8; 32]>::try_from(private_key)
                .map_err(|_| CryptoError::InvalidPrivateKey(key_type))?;
            let signing_key = ed25519_dalek::SigningKey::from_bytes(key_bytes);
            Ok(signing_key.sign(payload).to_vec())
        }
        KeyType::Secp256k1 => {
            let signing_key = k256::ecdsa::SigningKey::from_slice(private_key)
                .map_err(|_| CryptoError::InvalidPrivateKey(key_type))?;
            let signature: k256::ecdsa::Signature = signing_key.sign(payload);
            Ok(signature.to_vec())
        }
    }
}

/// The raw public key matching `private_key`.
pub fn public_key(private_key: &[u8], key_type: KeyType) -> Result<Vec<u8>, CryptoError> {
    match key_type {
        KeyType::Ed25519 => {
            let key_bytes = <&[u8; 32]>::try_from(private_key)
                .map_err(|_| CryptoError::InvalidPrivateKey(key_type))?;
            let signing_key = ed25519_dalek::SigningKey::from_bytes(key_bytes);
            Ok(signing_key.verifying_key().to_bytes().to_vec())
        }
        KeyType::Secp256k1 => {
            let signing_key = k256::ecdsa::SigningKey::from_slice(private_key)
                .map_err(|_| CryptoError::InvalidPrivateKey(key_type))?;
            Ok(signing_key
                .verifying_key()
                .to_encoded_point(true)
                .as_bytes()
                .to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ed25519_sign_verify_roundtrip() {
        let private = [42u8; 32];
        let public = public_key(&private, KeyType::Ed25519).unwrap();
        let payload = b"nuwa payload";
        let signature = sign(payload, &private, KeyType::Ed25519).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify(payload, &signature, &public, KeyType::Ed25519));
        assert!(!verify(b"other payload", &signature, &public, KeyType::Ed25519));
    }

    #[test]
    fn test_secp256k1_sign_verify_roundtrip() {
        let private = [7u8; 32];
        let public = public_key(&private, KeyType::Secp256k1).unwrap();
        assert_eq!(public.len(), 33);
        let payload = b"nuwa payload";
        let signature = sign(payload, &private, KeyType::Secp256k1).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify(payload, &signature, &public, KeyType::Secp256k1));
        assert!(!verify(b"other payload", &signature, &public, KeyType::Secp256k1));
    }

    #[test]
    fn test_verify_tolerates_garbage() {
        assert!(!verify(b"p", &[0u8; 64], &[0u8; 32], KeyType::Ed25519));
        assert!(!verify(b"p", &[], &[], KeyType::Secp256k1));
        assert!(!verify(b"p", &[1, 2, 3], &[4, 5, 6], KeyType::Ed25519));
    }

    #[test]
    fn test_cross_type_verification_fails() {
        let private = [42u8; 32];
        let payload = b"payload";
        let signature = sign(payload, &private, KeyType::Ed25519).unwrap();
        let public = public_key(&private, KeyType::Ed25519).unwrap();
        assert!(!verify(payload, &signature, &public, KeyType::Secp256k1));
    }

    #[test]
    fn test_sign_rejects_bad_private_key() {
        assert!(matches!(
            sign(b"p", &[1u8; 16], KeyType::Ed25519),
            Err(CryptoError::InvalidPrivateKey(KeyType::Ed25519))
        ));
        assert!(matches!(
            sign(b"p", &[0u8; 32], KeyType::Secp256k1),
            Err(CryptoError::InvalidPrivateKey(KeyType::Secp256k1))
        ));
    }
}
