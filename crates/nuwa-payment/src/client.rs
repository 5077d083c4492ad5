//! Client-side payment channel state.
//!
//! The mirror image of the processor: tracks the latest proposal received
//! in a payment envelope, validates that the server's accounting advances
//! lawfully, and produces the signed SubRAV to attach to the next request.
//! One instance per sub-channel; instances are cheap and hold no I/O.

use alloy_primitives::B256;
use std::sync::{Arc, Mutex};

use nuwa_types::amount::Amount;
use nuwa_types::envelope::PaymentEnvelope;
use nuwa_types::error::ErrorCode;
use nuwa_types::signer::{Signer, SignerError};
use nuwa_types::subrav::{SignedSubRav, SubRav};

use crate::rav::{self, SuccessionError};

/// Client-side failures.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server proposed a record that does not lawfully follow what the
    /// client last signed.
    #[error(transparent)]
    Succession(#[from] SuccessionError),

    /// The proposal's amount delta does not match the envelope's cost.
    #[error("proposal charges {charged} but the envelope declares {declared}")]
    CostMismatch { charged: Amount, declared: Amount },

    /// The server answered with an error envelope.
    #[error("server rejected the request: {code} {message}")]
    Rejected { code: ErrorCode, message: String },

    #[error(transparent)]
    Signer(#[from] SignerError),
}

#[derive(Default)]
struct ClientState {
    /// The server's latest unsigned proposal, not yet countersigned.
    latest_proposal: Option<SubRav>,
    /// The last record this client signed.
    last_signed: Option<SubRav>,
}

/// Tracks one sub-channel from the payer's side.
pub struct PaymentChannelClient {
    signer: Arc<dyn Signer>,
    /// Verification method id used for signing, `<did>#<fragment>`.
    key_id: String,
    chain_id: u64,
    channel_id: B256,
    channel_epoch: u64,
    vm_id_fragment: String,
    state: Mutex<ClientState>,
}

impl PaymentChannelClient {
    pub fn new(
        signer: Arc<dyn Signer>,
        key_id: impl Into<String>,
        chain_id: u64,
        channel_id: B256,
        channel_epoch: u64,
        vm_id_fragment: impl Into<String>,
    ) -> Self {
        PaymentChannelClient {
            signer,
            key_id: key_id.into(),
            chain_id,
            channel_id,
            channel_epoch,
            vm_id_fragment: vm_id_fragment.into(),
            state: Mutex::new(ClientState::default()),
        }
    }

    pub fn channel_id(&self) -> B256 {
        self.channel_id
    }

    /// The signed SubRAV to attach to the next request: the handshake on a
    /// fresh sub-channel, the countersigned proposal when one is
    /// outstanding, and nothing when the client is fully settled.
    pub async fn next_signed(&self) -> Result<Option<SignedSubRav>, ClientError> {
        let to_sign = {
            let state = self.state.lock().expect("client state poisoned");
            match (&state.latest_proposal, &state.last_signed) {
                (Some(proposal), _) => Some(proposal.clone()),
                (None, None) => Some(SubRav::handshake(
                    self.chain_id,
                    self.channel_id,
                    self.channel_epoch,
                    self.vm_id_fragment.clone(),
                )),
                (None, Some(_)) => None,
            }
        };
        let Some(record) = to_sign else {
            return Ok(None);
        };
        let signed = rav::sign(record.clone(), self.signer.as_ref(), &self.key_id).await?;
        let mut state = self.state.lock().expect("client state poisoned");
        state.last_signed = Some(record);
        state.latest_proposal = None;
        Ok(Some(signed))
    }

    /// Ingests a response envelope: validates the new proposal against what
    /// was last signed and stores it for the next request.
    pub fn observe_envelope(&self, envelope: &PaymentEnvelope) -> Result<(), ClientError> {
        if let Some(error) = &envelope.error {
            return Err(ClientError::Rejected {
                code: error.code,
                message: error.message.clone(),
            });
        }
        let Some(proposal) = &envelope.sub_rav else {
            // Free route: nothing to countersign.
            return Ok(());
        };

        let state = self.state.lock().expect("client state poisoned");
        if let Some(last_signed) = &state.last_signed {
            let declared = envelope.cost.unwrap_or(Amount::ZERO);
            rav::check_succession(last_signed, proposal, !declared.is_zero())?;
            let charged = Amount(
                proposal
                    .accumulated_amount
                    .0
                    .saturating_sub(last_signed.accumulated_amount.0),
            );
            if charged != declared {
                return Err(ClientError::CostMismatch { charged, declared });
            }
        }
        drop(state);
        self.adopt_proposal(proposal.clone());
        Ok(())
    }

    /// Adopts a proposal recovered out-of-band (the `nuwa.recovery`
    /// operation) without cost validation.
    pub fn adopt_proposal(&self, proposal: SubRav) {
        let mut state = self.state.lock().expect("client state poisoned");
        state.latest_proposal = Some(proposal);
    }

    /// Drops all local state, as after a process restart. The next request
    /// starts from the handshake unless a proposal is recovered first.
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("client state poisoned");
        *state = ClientState::default();
    }
}
