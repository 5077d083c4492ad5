//! Canonical binary encoding of SubRAV records.
//!
//! The layout is bit-exact and shared with the on-chain contract. Fields are
//! written in fixed order: `version:u8`, `chainId:u64`, `channelId:32 bytes`,
//! `channelEpoch:u64`, `vmIdFragment` (u32 length prefix + UTF-8 bytes),
//! `accumulatedAmount:u256`, `nonce:u64`. All integers are big-endian.
//!
//! `encode` is total; `decode` rejects anything that is not an exact
//! encoding of a well-formed record.

use alloy_primitives::{B256, U256};

use crate::error::ErrorCode;
use crate::subrav::SubRav;

/// Decoding failures. All map to the wire code `CODEC_MALFORMED`.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unexpected end of input while reading {0}")]
    UnexpectedEnd(&'static str),
    #[error("string length {0} exceeds remaining input")]
    LengthOverflow(u32),
    #[error("vmIdFragment is not valid UTF-8")]
    InvalidUtf8,
    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

impl CodecError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::CodecMalformed
    }
}

/// Encodes a SubRAV to its canonical byte form.
pub fn encode(rav: &SubRav) -> Vec<u8> {
    let fragment = rav.vm_id_fragment.as_bytes();
    let mut out = Vec::with_capacity(1 + 8 + 32 + 8 + 4 + fragment.len() + 32 + 8);
    out.push(rav.version);
    out.extend_from_slice(&rav.chain_id.to_be_bytes());
    out.extend_from_slice(rav.channel_id.as_slice());
    out.extend_from_slice(&rav.channel_epoch.to_be_bytes());
    out.extend_from_slice(&(fragment.len() as u32).to_be_bytes());
    out.extend_from_slice(fragment);
    out.extend_from_slice(&rav.accumulated_amount.0.to_be_bytes::<32>());
    out.extend_from_slice(&rav.nonce.to_be_bytes());
    out
}

/// Decodes a canonical byte form back into a SubRAV.
///
/// # Errors
///
/// Returns [`CodecError`] on truncated input, an oversized length prefix,
/// invalid UTF-8 in the fragment, or trailing bytes.
pub fn decode(bytes: &[u8]) -> Result<SubRav, CodecError> {
    let mut reader = Reader(bytes);
    let version = reader.u8("version")?;
    let chain_id = reader.u64("chainId")?;
    let channel_id = B256::from_slice(reader.take(32, "channelId")?);
    let channel_epoch = reader.u64("channelEpoch")?;
    let fragment_len = reader.u32("vmIdFragment length")?;
    if fragment_len as usize > reader.0.len() {
        return Err(CodecError::LengthOverflow(fragment_len));
    }
    let fragment_bytes = reader.take(fragment_len as usize, "vmIdFragment")?;
    let vm_id_fragment =
        String::from_utf8(fragment_bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)?;
    let accumulated_amount = U256::from_be_slice(reader.take(32, "accumulatedAmount")?);
    let nonce = reader.u64("nonce")?;
    if !reader.0.is_empty() {
        return Err(CodecError::TrailingBytes(reader.0.len()));
    }
    Ok(SubRav {
        version,
        chain_id,
        channel_id,
        channel_epoch,
        vm_id_fragment,
        accumulated_amount: accumulated_amount.into(),
        nonce,
    })
}

/// Encodes a SubRAV as a 0x-prefixed hex string, for debugging and event
/// payload comparison.
pub fn to_hex(rav: &SubRav) -> String {
    format!("0x{}", hex::encode(encode(rav)))
}

/// Decodes a SubRAV from a hex string, with or without the 0x prefix.
pub fn from_hex(s: &str) -> Result<SubRav, CodecError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped)?;
    decode(&bytes)
}

struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], CodecError> {
        if self.0.len() < n {
            return Err(CodecError::UnexpectedEnd(field));
        }
        let (head, tail) = self.0.split_at(n);
        self.0 = tail;
        Ok(head)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, CodecError> {
        Ok(self.take(1, field)?[0])
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, CodecError> {
        let bytes = self.take(4, field)?;
        Ok(u32::from_be_bytes(bytes.try_into().expect("4 bytes")))
    }

    fn u64(&mut self, field: &'static str) -> Result<u64, CodecError> {
        let bytes = self.take(8, field)?;
        Ok(u64::from_be_bytes(bytes.try_into().expect("8 bytes")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;

    fn sample() -> SubRav {
        SubRav::new(
            4,
            B256::repeat_byte(0xab),
            0,
            "account-key",
            Amount(U256::from(100u64)),
            1,
        )
    }

    #[test]
    fn test_encode_known_vector() {
        let encoded = hex::encode(encode(&sample()));
        let expected = [
            "01",                                                    // version
            "0000000000000004",                                      // chainId
            &"ab".repeat(32),                                        // channelId
            "0000000000000000",                                      // channelEpoch
            "0000000b",                                              // fragment length
            "6163636f756e742d6b6579",                                // "account-key"
            &format!("{:0>64}", "64"),                               // accumulatedAmount = 100
            "0000000000000001",                                      // nonce
        ]
        .concat();
        assert_eq!(encoded, expected);
    }

    #[test]
    fn test_roundtrip() {
        let rav = sample();
        assert_eq!(decode(&encode(&rav)).unwrap(), rav);
    }

    #[test]
    fn test_roundtrip_empty_fragment_and_max_amount() {
        let rav = SubRav::new(u64::MAX, B256::ZERO, u64::MAX, "", Amount(U256::MAX), u64::MAX);
        assert_eq!(decode(&encode(&rav)).unwrap(), rav);
    }

    #[test]
    fn test_hex_roundtrip() {
        let rav = sample();
        assert_eq!(from_hex(&to_hex(&rav)).unwrap(), rav);
    }

    #[test]
    fn test_decode_truncated() {
        let mut bytes = encode(&sample());
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(decode(&bytes), Err(CodecError::UnexpectedEnd(_))));
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut bytes = encode(&sample());
        bytes.push(0);
        assert!(matches!(decode(&bytes), Err(CodecError::TrailingBytes(1))));
    }

    #[test]
    fn test_decode_oversized_length_prefix() {
        let rav = sample();
        let mut bytes = encode(&rav);
        // Corrupt the fragment length prefix (offset 1 + 8 + 32 + 8).
        bytes[49] = 0xff;
        bytes[50] = 0xff;
        assert!(matches!(decode(&bytes), Err(CodecError::LengthOverflow(_))));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let rav = SubRav::new(1, B256::ZERO, 0, "ab", Amount::ZERO, 0);
        let mut bytes = encode(&rav);
        // Fragment bytes start after the length prefix at offset 53.
        bytes[53] = 0xff;
        bytes[54] = 0xfe;
        assert!(matches!(decode(&bytes), Err(CodecError::InvalidUtf8)));
    }

    #[test]
    fn test_error_code_is_codec_malformed() {
        let err = decode(&[0x01]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CodecMalformed);
    }
}
