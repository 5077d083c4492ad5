//! SubRAV records: the unit of off-chain payment accounting.
//!
//! A SubRAV (Sub-channel Receipt And Voucher) carries the cumulative amount
//! owed on one sub-channel of a payment channel, together with a strictly
//! increasing nonce. The server proposes unsigned SubRAVs; the client signs
//! them over the canonical encoding from [`crate::codec`] and returns them
//! with the next request.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use crate::amount::Amount;

/// The SubRAV schema version this implementation produces and accepts.
pub const SUBRAV_VERSION: u8 = 1;

/// An unsigned Sub-channel Receipt And Voucher.
///
/// Within a sub-channel `(channel_id, vm_id_fragment)`, nonces increase by
/// exactly one per accepted record and `accumulated_amount` never decreases.
/// The pair `(nonce = 0, accumulated_amount = 0)` is the handshake that opens
/// a sub-channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubRav {
    pub version: u8,
    pub chain_id: u64,
    pub channel_id: B256,
    pub channel_epoch: u64,
    pub vm_id_fragment: String,
    pub accumulated_amount: Amount,
    pub nonce: u64,
}

impl SubRav {
    /// Builds a SubRAV stamped with the current [`SUBRAV_VERSION`].
    pub fn new(
        chain_id: u64,
        channel_id: B256,
        channel_epoch: u64,
        vm_id_fragment: impl Into<String>,
        accumulated_amount: Amount,
        nonce: u64,
    ) -> Self {
        SubRav {
            version: SUBRAV_VERSION,
            chain_id,
            channel_id,
            channel_epoch,
            vm_id_fragment: vm_id_fragment.into(),
            accumulated_amount,
            nonce,
        }
    }

    /// The distinguished record that opens a sub-channel.
    pub fn handshake(
        chain_id: u64,
        channel_id: B256,
        channel_epoch: u64,
        vm_id_fragment: impl Into<String>,
    ) -> Self {
        Self::new(chain_id, channel_id, channel_epoch, vm_id_fragment, Amount::ZERO, 0)
    }

    pub fn is_handshake(&self) -> bool {
        self.nonce == 0 && self.accumulated_amount.is_zero()
    }

    /// The successor record charging `cost` on top of this one.
    pub fn successor(&self, cost: Amount) -> SubRav {
        SubRav {
            version: SUBRAV_VERSION,
            chain_id: self.chain_id,
            channel_id: self.channel_id,
            channel_epoch: self.channel_epoch,
            vm_id_fragment: self.vm_id_fragment.clone(),
            accumulated_amount: self.accumulated_amount.saturating_add(cost),
            nonce: self.nonce + 1,
        }
    }
}

/// A SubRAV together with the client's signature over its canonical encoding.
///
/// The signature is produced by the private key matching the verification
/// method whose fragment equals `sub_rav.vm_id_fragment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedSubRav {
    pub sub_rav: SubRav,
    #[serde(with = "hex_signature")]
    pub signature: Vec<u8>,
}

mod hex_signature {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let stripped = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(stripped).map_err(serde::de::Error::custom)
    }
}
