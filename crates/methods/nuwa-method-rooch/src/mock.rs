//! An in-memory chain double for driver and integration tests.
//!
//! Replays the observable behavior of the `0x3::did` module: address
//! allocation, document state transitions, and `DIDCreatedEvent` emission.
//! Event payloads can be switched to drifted or garbage encodings to
//! exercise the driver's fallback paths.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use nuwa_crypto::multibase;
use nuwa_types::chain::{
    CallArg, ChainClient, ChainError, ChainEvent, ExecutionStatus, TxPayload, TxResult, ViewResult,
};
use nuwa_types::did::{
    Did, DidDocument, KeyType, ServiceEndpoint, VerificationMethod, VerificationRelationship,
};
use nuwa_types::signer::Signer;

use crate::entry;
use crate::event::{DidCreatedEvent, encode_did_created_event};

/// How the mock encodes `DIDCreatedEvent` payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventMode {
    /// Canonical schema; the structured parser succeeds.
    #[default]
    Canonical,
    /// Unknown framing around a recognizable `did:rooch:` string; only the
    /// string fallback succeeds.
    Drifted,
    /// No recoverable DID at all; the driver returns a placeholder.
    Garbage,
}

#[derive(Default)]
struct MockState {
    documents: HashMap<String, DidDocument>,
    next_address: u64,
    event_mode: EventMode,
    fail_next_tx: Option<String>,
}

/// An in-memory [`ChainClient`] with `0x3::did` semantics.
#[derive(Clone, Default)]
pub struct MockChainClient {
    state: Arc<RwLock<MockState>>,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches how creation events are encoded from now on.
    pub fn set_event_mode(&self, mode: EventMode) {
        self.state.write().expect("mock state poisoned").event_mode = mode;
    }

    /// Makes the next transaction abort with the given execution status.
    pub fn fail_next_tx(&self, status: impl Into<String>) {
        self.state.write().expect("mock state poisoned").fail_next_tx = Some(status.into());
    }

    /// Direct state access for test assertions.
    pub fn document(&self, address: &str) -> Option<DidDocument> {
        self.state
            .read()
            .expect("mock state poisoned")
            .documents
            .get(address)
            .cloned()
    }

    /// Seeds a document directly, bypassing the creation flow.
    pub fn insert_document(&self, document: DidDocument) {
        let address = document.id.identifier().to_string();
        self.state
            .write()
            .expect("mock state poisoned")
            .documents
            .insert(address, document);
    }

    fn created_event(state: &MockState, event: &DidCreatedEvent) -> ChainEvent {
        let data = match state.event_mode {
            EventMode::Canonical => encode_did_created_event(event),
            EventMode::Drifted => {
                let mut data = vec![0x00, 0x01, 0x02, 0x03];
                data.extend_from_slice(format!("created {} ok", event.did).as_bytes());
                data
            }
            EventMode::Garbage => vec![0xde, 0xad, 0xbe, 0xef],
        };
        ChainEvent {
            event_type: entry::DID_CREATED_EVENT.into(),
            data,
        }
    }

    fn new_document(did: &Did, controller: Did, key_type: KeyType, public_key_multibase: &str) -> DidDocument {
        let vm_id = did.with_fragment("account-key");
        let mut document = DidDocument::new(did.clone());
        document.controller = vec![controller];
        document.verification_method.push(VerificationMethod {
            id: vm_id.clone(),
            key_type,
            controller: did.clone(),
            public_key_multibase: public_key_multibase.into(),
        });
        for relationship in VerificationRelationship::ALL {
            document.relationship_mut(relationship).push(vm_id.clone());
        }
        document
    }

    /// The document the sender's address controls, mirroring entry functions
    /// operating on the transaction sender.
    fn sender_document<'a>(
        state: &'a mut MockState,
        sender: &str,
    ) -> Result<&'a mut DidDocument, ChainError> {
        let address = state
            .documents
            .iter()
            .find(|(address, document)| {
                address.as_str() == sender
                    || document
                        .controller
                        .iter()
                        .any(|c| c.identifier() == sender)
            })
            .map(|(address, _)| address.clone())
            .ok_or_else(|| ChainError::TxRejected {
                status: format!("Aborted: no DID object for sender {sender}"),
            })?;
        Ok(state.documents.get_mut(&address).expect("address just found"))
    }

    fn arg_str(args: &[CallArg], index: usize) -> Result<String, ChainError> {
        match args.get(index) {
            Some(CallArg::Str(s)) => Ok(s.clone()),
            other => Err(ChainError::TxRejected {
                status: format!("Aborted: argument {index} mismatch, got {other:?}"),
            }),
        }
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn call_view(&self, target: &str, args: Vec<CallArg>) -> Result<ViewResult, ChainError> {
        let state = self.state.read().expect("mock state poisoned");
        let address = match args.first() {
            Some(CallArg::Address(address)) => address.clone(),
            _ => {
                return Err(ChainError::Unreachable("view requires an address argument".into()));
            }
        };
        match target {
            entry::EXISTS_DID_FOR_ADDRESS => Ok(ViewResult {
                status: ExecutionStatus::Executed,
                return_values: vec![vec![state.documents.contains_key(&address) as u8]],
            }),
            entry::GET_DID_DOCUMENT => match state.documents.get(&address) {
                Some(document) => Ok(ViewResult {
                    status: ExecutionStatus::Executed,
                    return_values: vec![
                        serde_json::to_vec(document)
                            .map_err(|e| ChainError::Unreachable(e.to_string()))?,
                    ],
                }),
                None => Ok(ViewResult {
                    status: ExecutionStatus::Failed,
                    return_values: Vec::new(),
                }),
            },
            other => Err(ChainError::Unreachable(format!("unknown view {other}"))),
        }
    }

    async fn send_tx(&self, tx: TxPayload, signer: &dyn Signer) -> Result<TxResult, ChainError> {
        let mut state = self.state.write().expect("mock state poisoned");
        if let Some(status) = state.fail_next_tx.take() {
            return Err(ChainError::TxRejected { status });
        }
        let sender = signer.address();
        match tx.target.as_str() {
            entry::CREATE_DID_FOR_SELF => {
                let public_key_multibase = Self::arg_str(&tx.args, 0)?;
                let (key_type, _) =
                    multibase::decode_public_key(&public_key_multibase).map_err(|e| {
                        ChainError::TxRejected {
                            status: format!("Aborted: {e}"),
                        }
                    })?;
                state.next_address += 1;
                let address = format!("rooch1q{:07x}", state.next_address);
                let did = Did::rooch(&address);
                let document = Self::new_document(
                    &did,
                    Did::rooch(&sender),
                    key_type,
                    &public_key_multibase,
                );
                state.documents.insert(address.clone(), document);
                let event = DidCreatedEvent {
                    did,
                    object_id: format!("0xobj{}", state.next_address),
                    controllers: vec![Did::rooch(&sender)],
                    creator_address: sender,
                    creation_method: "self".into(),
                };
                let chain_event = Self::created_event(&state, &event);
                Ok(TxResult {
                    status: ExecutionStatus::Executed,
                    events: vec![chain_event],
                })
            }
            entry::CREATE_DID_VIA_CADOP => {
                let user_did_key: Did = Self::arg_str(&tx.args, 0)?
                    .parse()
                    .map_err(|_| ChainError::TxRejected {
                        status: "Aborted: malformed user DID".into(),
                    })?;
                let (key_type, _) = multibase::decode_public_key(user_did_key.identifier())
                    .map_err(|e| ChainError::TxRejected {
                        status: format!("Aborted: {e}"),
                    })?;
                state.next_address += 1;
                let address = format!("rooch1q{:07x}", state.next_address);
                let did = Did::rooch(&address);
                let document = Self::new_document(
                    &did,
                    user_did_key.clone(),
                    key_type,
                    user_did_key.identifier(),
                );
                state.documents.insert(address.clone(), document);
                let event = DidCreatedEvent {
                    did,
                    object_id: format!("0xobj{}", state.next_address),
                    controllers: vec![user_did_key],
                    creator_address: sender,
                    creation_method: "cadop".into(),
                };
                let chain_event = Self::created_event(&state, &event);
                Ok(TxResult {
                    status: ExecutionStatus::Executed,
                    events: vec![chain_event],
                })
            }
            entry::ADD_VERIFICATION_METHOD => {
                let fragment = Self::arg_str(&tx.args, 0)?;
                let key_type: KeyType = Self::arg_str(&tx.args, 1)?
                    .parse()
                    .map_err(|_| ChainError::TxRejected {
                        status: "Aborted: unknown key type".into(),
                    })?;
                let public_key_multibase = Self::arg_str(&tx.args, 2)?;
                let tags = match tx.args.get(3) {
                    Some(CallArg::U8Vec(tags)) => tags.clone(),
                    _ => {
                        return Err(ChainError::TxRejected {
                            status: "Aborted: relationships argument mismatch".into(),
                        });
                    }
                };
                let document = Self::sender_document(&mut state, &sender)?;
                let vm_id = document.id.with_fragment(&fragment);
                document.verification_method.push(VerificationMethod {
                    id: vm_id.clone(),
                    key_type,
                    controller: document.id.clone(),
                    public_key_multibase,
                });
                for tag in tags {
                    let relationship =
                        VerificationRelationship::try_from(tag).map_err(|e| {
                            ChainError::TxRejected {
                                status: format!("Aborted: {e}"),
                            }
                        })?;
                    document.relationship_mut(relationship).push(vm_id.clone());
                }
                Ok(TxResult {
                    status: ExecutionStatus::Executed,
                    events: Vec::new(),
                })
            }
            entry::REMOVE_VERIFICATION_METHOD => {
                let fragment = Self::arg_str(&tx.args, 0)?;
                let document = Self::sender_document(&mut state, &sender)?;
                let vm_id = document.id.with_fragment(&fragment);
                document.verification_method.retain(|vm| vm.id != vm_id);
                for relationship in VerificationRelationship::ALL {
                    document
                        .relationship_mut(relationship)
                        .retain(|entry| entry != &vm_id);
                }
                Ok(TxResult {
                    status: ExecutionStatus::Executed,
                    events: Vec::new(),
                })
            }
            entry::ADD_SERVICE | entry::ADD_SERVICE_WITH_PROPERTIES => {
                let fragment = Self::arg_str(&tx.args, 0)?;
                let service_type = Self::arg_str(&tx.args, 1)?;
                let endpoint = Self::arg_str(&tx.args, 2)?;
                let properties = match (tx.args.get(3), tx.args.get(4)) {
                    (Some(CallArg::StrVec(keys)), Some(CallArg::StrVec(values))) => keys
                        .iter()
                        .cloned()
                        .zip(values.iter().cloned())
                        .collect(),
                    _ => Default::default(),
                };
                let document = Self::sender_document(&mut state, &sender)?;
                document.service.push(ServiceEndpoint {
                    id: document.id.with_fragment(&fragment),
                    service_type,
                    service_endpoint: endpoint,
                    properties,
                });
                Ok(TxResult {
                    status: ExecutionStatus::Executed,
                    events: Vec::new(),
                })
            }
            entry::REMOVE_SERVICE => {
                let fragment = Self::arg_str(&tx.args, 0)?;
                let document = Self::sender_document(&mut state, &sender)?;
                document.service.retain(|s| s.fragment() != fragment);
                Ok(TxResult {
                    status: ExecutionStatus::Executed,
                    events: Vec::new(),
                })
            }
            entry::ADD_TO_RELATIONSHIP | entry::REMOVE_FROM_RELATIONSHIP => {
                let fragment = Self::arg_str(&tx.args, 0)?;
                let tag = match tx.args.get(1) {
                    Some(CallArg::U8(tag)) => *tag,
                    _ => {
                        return Err(ChainError::TxRejected {
                            status: "Aborted: relationship tag mismatch".into(),
                        });
                    }
                };
                let relationship = VerificationRelationship::try_from(tag).map_err(|e| {
                    ChainError::TxRejected {
                        status: format!("Aborted: {e}"),
                    }
                })?;
                let adding = tx.target == entry::ADD_TO_RELATIONSHIP;
                let document = Self::sender_document(&mut state, &sender)?;
                let vm_id = document.id.with_fragment(&fragment);
                let entries = document.relationship_mut(relationship);
                if adding {
                    if !entries.contains(&vm_id) {
                        entries.push(vm_id);
                    }
                } else {
                    entries.retain(|entry| entry != &vm_id);
                }
                Ok(TxResult {
                    status: ExecutionStatus::Executed,
                    events: Vec::new(),
                })
            }
            other => Err(ChainError::TxRejected {
                status: format!("Aborted: unknown entry function {other}"),
            }),
        }
    }
}
