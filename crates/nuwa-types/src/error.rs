//! Wire-level error codes shared across subsystems.
//!
//! Every error surfaced to a caller carries one of these codes; transports
//! embed them in payment envelopes and JSON error bodies. The codes are
//! stable identifiers, the accompanying messages are not.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Machine-readable error codes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ============================================
    // Identity / VDR
    // ============================================
    /// No driver is registered for the DID method.
    MethodUnsupported,

    /// A write operation was attempted without a signer.
    NoSigner,

    /// The signer does not control the relationship required for the mutation.
    PermissionDenied,

    /// The chain rejected the transaction; the execution status is embedded in the message.
    TxRejected,

    /// The chain endpoint could not be reached.
    ChainUnreachable,

    /// An on-chain event could not be parsed, even by the string fallback.
    EventUnparseable,

    /// A multibase-encoded key could not be decoded.
    MultibaseInvalid,

    // ============================================
    // Payment
    // ============================================
    /// A canonical SubRAV encoding could not be decoded.
    CodecMalformed,

    /// A signature over a SubRAV did not verify.
    InvalidSignature,

    /// A pending proposal exists and the operation is paid; the client must sign it.
    PaymentRequired,

    /// The received signed SubRAV conflicts with the pending proposal or history.
    RavConflict,

    /// The referenced payment channel is unknown to this service.
    ChannelNotFound,

    /// The request carried no client transaction reference.
    ClientTxRefMissing,

    /// The computed cost exceeds the configured ceiling.
    MaxAmountExceeded,

    /// No asset/USD rate is available for the requested asset.
    RateNotAvailable,

    /// A free route produced a nonzero cost, or a rule is otherwise misconfigured.
    BillingConfigError,

    /// The request was cancelled before the pending proposal was persisted.
    Cancelled,
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Leverage serde_json to get the SCREAMING_SNAKE_CASE variant name
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        write!(f, "{}", json.trim_matches('"'))
    }
}
