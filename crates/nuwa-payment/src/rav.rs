//! SubRAV signing, verification, and succession laws.
//!
//! Signatures cover the canonical encoding from [`nuwa_types::codec`]. A
//! verifier key is supplied either directly or through the payer's DID
//! document, in which case the verification method is looked up by the
//! SubRAV's `vm_id_fragment`. Unknown or malformed key material verifies to
//! `false`; signatures are never valid by accident.

use nuwa_crypto::{keys, multibase};
use nuwa_types::codec;
use nuwa_types::did::{DidDocument, KeyType};
use nuwa_types::signer::{Signer, SignerError};
use nuwa_types::subrav::{SignedSubRav, SubRav};

/// Key material for signature verification.
pub enum VerifyingKey<'a> {
    /// A raw public key of the given type.
    Raw {
        public_key: &'a [u8],
        key_type: KeyType,
    },
    /// The payer's DID document; the key is the verification method whose
    /// fragment equals the SubRAV's `vm_id_fragment`.
    Document(&'a DidDocument),
}

/// Signs a SubRAV over its canonical encoding.
pub async fn sign(
    sub_rav: SubRav,
    signer: &dyn Signer,
    key_id: &str,
) -> Result<SignedSubRav, SignerError> {
    let payload = codec::encode(&sub_rav);
    let signature = signer.sign(&payload, key_id).await?;
    Ok(SignedSubRav { sub_rav, signature })
}

/// Verifies a signed SubRAV against the given key material.
pub fn verify(signed: &SignedSubRav, key: VerifyingKey<'_>) -> bool {
    let payload = codec::encode(&signed.sub_rav);
    match key {
        VerifyingKey::Raw { public_key, key_type } => {
            keys::verify(&payload, &signed.signature, public_key, key_type)
        }
        VerifyingKey::Document(document) => {
            let key_id = document.id.with_fragment(&signed.sub_rav.vm_id_fragment);
            let Some(method) = document.verification_method(&key_id) else {
                return false;
            };
            let Ok((key_type, public_key)) = multibase::decode_public_key(&method.public_key_multibase)
            else {
                return false;
            };
            if key_type != method.key_type {
                return false;
            }
            keys::verify(&payload, &signed.signature, &public_key, key_type)
        }
    }
}

/// Violations of the succession laws between consecutive SubRAVs.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SuccessionError {
    #[error("nonce must advance by exactly one (prev {prev}, next {next})")]
    NonceGap { prev: u64, next: u64 },
    #[error("accumulated amount regressed")]
    AmountRegressed,
    #[error("accumulated amount must strictly increase when cost is charged")]
    AmountStalled,
    #[error("successor belongs to a different sub-channel or epoch")]
    WrongSubChannel,
}

/// Checks the monotonic succession laws for `next` following `prev`.
///
/// `charged` states whether any cost was applied between the two records;
/// when it is true the accumulated amount must strictly increase.
pub fn check_succession(
    prev: &SubRav,
    next: &SubRav,
    charged: bool,
) -> Result<(), SuccessionError> {
    if next.channel_id != prev.channel_id
        || next.vm_id_fragment != prev.vm_id_fragment
        || next.channel_epoch != prev.channel_epoch
    {
        return Err(SuccessionError::WrongSubChannel);
    }
    if next.nonce != prev.nonce + 1 {
        return Err(SuccessionError::NonceGap {
            prev: prev.nonce,
            next: next.nonce,
        });
    }
    if next.accumulated_amount < prev.accumulated_amount {
        return Err(SuccessionError::AmountRegressed);
    }
    if charged && next.accumulated_amount == prev.accumulated_amount {
        return Err(SuccessionError::AmountStalled);
    }
    Ok(())
}
