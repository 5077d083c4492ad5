//! base58btc multibase codec with multicodec key prefixes.
//!
//! DID documents carry public keys as multibase strings: a `z` prefix
//! followed by the base58btc encoding of a two-byte multicodec tag and the
//! raw key bytes. Decoding never silently truncates; every malformed input
//! is a [`MultibaseError`].

use nuwa_types::did::KeyType;
use nuwa_types::error::ErrorCode;

/// Multicodec tag for Ed25519 public keys.
const ED25519_PREFIX: [u8; 2] = [0xed, 0x01];
/// Multicodec tag for compressed secp256k1 public keys.
const SECP256K1_PREFIX: [u8; 2] = [0xe7, 0x01];

const ED25519_KEY_LEN: usize = 32;
const SECP256K1_KEY_LEN: usize = 33;

/// Malformed multibase input. All map to the wire code `MULTIBASE_INVALID`.
#[derive(Debug, thiserror::Error)]
pub enum MultibaseError {
    #[error("missing multibase prefix 'z'")]
    MissingPrefix,
    #[error("invalid base58btc payload")]
    Base58(#[from] bs58::decode::Error),
    #[error("unknown multicodec prefix {0:#04x}{1:02x}")]
    UnknownCodec(u8, u8),
    #[error("truncated multicodec payload")]
    Truncated,
    #[error("{key_type} key must be {expected} bytes, got {actual}")]
    WrongKeyLength {
        key_type: KeyType,
        expected: usize,
        actual: usize,
    },
}

impl MultibaseError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::MultibaseInvalid
    }
}

/// Decodes a `z…` multibase string to raw bytes (multicodec tag included).
pub fn decode(s: &str) -> Result<Vec<u8>, MultibaseError> {
    let payload = s.strip_prefix('z').ok_or(MultibaseError::MissingPrefix)?;
    Ok(bs58::decode(payload).into_vec()?)
}

/// Encodes raw bytes (multicodec tag included) as a `z…` multibase string.
pub fn encode(bytes: &[u8]) -> String {
    format!("z{}", bs58::encode(bytes).into_string())
}

/// Decodes a multibase public key into its key type and raw key bytes.
pub fn decode_public_key(s: &str) -> Result<(KeyType, Vec<u8>), MultibaseError> {
    let bytes = decode(s)?;
    if bytes.len() < 2 {
        return Err(MultibaseError::Truncated);
    }
    let (prefix, key) = bytes.split_at(2);
    let (key_type, expected) = match [prefix[0], prefix[1]] {
        ED25519_PREFIX => (KeyType::Ed25519, ED25519_KEY_LEN),
        SECP256K1_PREFIX => (KeyType::Secp256k1, SECP256K1_KEY_LEN),
        [a, b] => return Err(MultibaseError::UnknownCodec(a, b)),
    };
    if key.len() != expected {
        return Err(MultibaseError::WrongKeyLength {
            key_type,
            expected,
            actual: key.len(),
        });
    }
    Ok((key_type, key.to_vec()))
}

/// Encodes a raw public key as a multibase string with its multicodec tag.
pub fn encode_public_key(key_type: KeyType, raw: &[u8]) -> String {
    let prefix = match key_type {
        KeyType::Ed25519 => ED25519_PREFIX,
        KeyType::Secp256k1 => SECP256K1_PREFIX,
    };
    let mut bytes = Vec::with_capacity(2 + raw.len());
    bytes.extend_from_slice(&prefix);
    bytes.extend_from_slice(raw);
    encode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_roundtrip_ed25519() {
        let raw = [7u8; 32];
        let encoded = encode_public_key(KeyType::Ed25519, &raw);
        assert!(encoded.starts_with("z6Mk"));
        let (key_type, decoded) = decode_public_key(&encoded).unwrap();
        assert_eq!(key_type, KeyType::Ed25519);
        assert_eq!(decoded, raw);
    }

    #[test]
    fn test_public_key_roundtrip_secp256k1() {
        let raw = [2u8; 33];
        let encoded = encode_public_key(KeyType::Secp256k1, &raw);
        assert!(encoded.starts_with("zQ3s"));
        let (key_type, decoded) = decode_public_key(&encoded).unwrap();
        assert_eq!(key_type, KeyType::Secp256k1);
        assert_eq!(decoded, raw);
    }

    #[test]
    fn test_decode_requires_z_prefix() {
        assert!(matches!(decode("6MkhaXg"), Err(MultibaseError::MissingPrefix)));
    }

    #[test]
    fn test_decode_rejects_bad_base58() {
        // '0' and 'l' are not in the base58btc alphabet.
        assert!(matches!(decode("z0l"), Err(MultibaseError::Base58(_))));
    }

    #[test]
    fn test_decode_public_key_rejects_unknown_codec() {
        let encoded = encode(&[0x12, 0x00, 1, 2, 3]);
        assert!(matches!(
            decode_public_key(&encoded),
            Err(MultibaseError::UnknownCodec(0x12, 0x00))
        ));
    }

    #[test]
    fn test_decode_public_key_rejects_wrong_length() {
        let mut bytes = vec![0xed, 0x01];
        bytes.extend_from_slice(&[9u8; 31]);
        let encoded = encode(&bytes);
        assert!(matches!(
            decode_public_key(&encoded),
            Err(MultibaseError::WrongKeyLength { .. })
        ));
    }

    #[test]
    fn test_error_code() {
        assert_eq!(MultibaseError::MissingPrefix.code(), ErrorCode::MultibaseInvalid);
    }
}
