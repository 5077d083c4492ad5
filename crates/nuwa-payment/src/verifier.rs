//! The per-request RAV decision algorithm.
//!
//! Given everything the server knows about a sub-channel (metadata, the
//! latest pending proposal, the latest signed RAV) and whatever the client
//! sent, the verifier decides whether the request may proceed, must be
//! answered with a 402, or conflicts with recorded state. The verifier is
//! pure apart from signature checks; all storage I/O happens in the
//! processor before it runs.

use nuwa_types::did::DidDocument;
use nuwa_types::error::ErrorCode;
use nuwa_types::subrav::{SignedSubRav, SubRav};

use crate::rav::{self, VerifyingKey};
use crate::store::{ChannelInfo, SubChannelState};

/// The verifier's decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed.
    Allow,
    /// A pending proposal exists, the rule is paid, and no signature was
    /// sent: the client must re-submit with a signature over the proposal.
    RequireSignature402,
    /// The received RAV contradicts the pending proposal or history.
    Conflict,
    /// The referenced channel is unknown.
    ChannelNotFound,
}

/// The verifier's full outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub decision: Decision,
    /// Whether a supplied signed RAV carried a valid signature.
    pub signed_verified: bool,
    /// Whether the signed RAV matched the pending proposal exactly.
    pub pending_matched: bool,
    pub error: Option<(ErrorCode, String)>,
}

impl VerificationOutcome {
    fn allow(signed_verified: bool, pending_matched: bool) -> Self {
        VerificationOutcome {
            decision: Decision::Allow,
            signed_verified,
            pending_matched,
            error: None,
        }
    }

    fn conflict(signed_verified: bool, code: ErrorCode, message: impl Into<String>) -> Self {
        VerificationOutcome {
            decision: Decision::Conflict,
            signed_verified,
            pending_matched: false,
            error: Some((code, message.into())),
        }
    }
}

/// Everything the verifier looks at for one request.
pub struct VerifyInput<'a> {
    /// Channel metadata; `None` means the channel is unknown.
    pub channel: Option<&'a ChannelInfo>,
    /// Sub-channel accounting state, if the sub-channel was opened before.
    pub sub_channel: Option<&'a SubChannelState>,
    /// Whether the matched billing rule requires payment.
    pub rule_paid: bool,
    /// The payer's resolved DID document.
    pub payer_document: Option<&'a DidDocument>,
    /// The signed RAV supplied with the request, if any.
    pub signed: Option<&'a SignedSubRav>,
    /// The latest pending proposal for this sub-channel, if any.
    pub pending: Option<&'a SubRav>,
    /// The latest previously-signed RAV on record, if any.
    pub latest_signed: Option<&'a SignedSubRav>,
}

/// Runs the decision algorithm.
///
/// The `nonce == prev + 1 && amount >= prev` acceptance clause (when no
/// pending proposal is on record) absorbs a race where a proposal was sent
/// in-band before being persisted. The processor persists proposals before
/// responding, so the clause is compensatory only.
pub fn evaluate(input: VerifyInput<'_>) -> VerificationOutcome {
    let Some(channel) = input.channel else {
        return VerificationOutcome {
            decision: Decision::ChannelNotFound,
            signed_verified: false,
            pending_matched: false,
            error: Some((ErrorCode::ChannelNotFound, "unknown payment channel".into())),
        };
    };

    // Step 1: a supplied signature must verify against the payer document
    // before anything else is considered.
    let mut signed_verified = false;
    if let Some(signed) = input.signed {
        let valid = input
            .payer_document
            .is_some_and(|document| rav::verify(signed, VerifyingKey::Document(document)));
        if !valid {
            return VerificationOutcome::conflict(
                false,
                ErrorCode::InvalidSignature,
                "signature does not verify against the payer document",
            );
        }
        if signed.sub_rav.channel_id != channel.channel_id {
            return VerificationOutcome::conflict(
                true,
                ErrorCode::RavConflict,
                "signed RAV references a different channel",
            );
        }
        if signed.sub_rav.channel_epoch != channel.epoch {
            return VerificationOutcome::conflict(
                true,
                ErrorCode::RavConflict,
                "signed RAV references a stale channel epoch",
            );
        }
        signed_verified = true;
    }

    // Step 2: an outstanding proposal takes priority.
    if let Some(pending) = input.pending {
        return match input.signed {
            None if input.rule_paid => VerificationOutcome {
                decision: Decision::RequireSignature402,
                signed_verified: false,
                pending_matched: false,
                error: Some((
                    ErrorCode::PaymentRequired,
                    format!(
                        "sign the pending proposal (channel {}, nonce {})",
                        pending.channel_id, pending.nonce
                    ),
                )),
            },
            // Free route: the proposal stands, nothing to collect yet.
            None => VerificationOutcome::allow(false, false),
            Some(signed) => {
                let matches = signed.sub_rav.channel_id == pending.channel_id
                    && signed.sub_rav.vm_id_fragment == pending.vm_id_fragment
                    && signed.sub_rav.nonce == pending.nonce
                    && signed.sub_rav.accumulated_amount == pending.accumulated_amount;
                if matches {
                    VerificationOutcome::allow(true, true)
                } else {
                    VerificationOutcome::conflict(
                        true,
                        ErrorCode::RavConflict,
                        "signed RAV does not match the pending proposal",
                    )
                }
            }
        };
    }

    // Step 3: no proposal on record; judge a supplied RAV against history.
    if let Some(signed) = input.signed {
        if let Some(previous) = input.latest_signed {
            let prev = &previous.sub_rav;
            let next = &signed.sub_rav;
            let strictly_advances =
                next.nonce > prev.nonce && next.accumulated_amount > prev.accumulated_amount;
            // Compensatory clause, see above.
            let immediate_successor =
                next.nonce == prev.nonce + 1 && next.accumulated_amount >= prev.accumulated_amount;
            if strictly_advances || immediate_successor {
                return VerificationOutcome::allow(true, false);
            }
            return VerificationOutcome::conflict(
                true,
                ErrorCode::RavConflict,
                "signed RAV does not advance the recorded history",
            );
        }
        // No signed history. A handshake opens the sub-channel; anything
        // else must beat the chain-confirmed floor.
        if signed.sub_rav.is_handshake() {
            return VerificationOutcome::allow(true, false);
        }
        if let Some(sub) = input.sub_channel {
            if signed.sub_rav.nonce > sub.last_confirmed_nonce
                && signed.sub_rav.accumulated_amount >= sub.last_claimed_amount
            {
                return VerificationOutcome::allow(true, false);
            }
        }
        return VerificationOutcome::conflict(
            true,
            ErrorCode::RavConflict,
            "signed RAV is behind the confirmed sub-channel state",
        );
    }

    // Step 4: nothing outstanding, nothing supplied.
    VerificationOutcome::allow(signed_verified, false)
}
