//! The chain-client port and chain-derived identifiers.
//!
//! The core never talks to a node directly; it goes through [`ChainClient`],
//! which covers view calls, transaction submission, and event observation.
//! Channel ids are derived off-chain with [`derive_channel_id`], replicating
//! the chain's own computation so both sides agree without a round trip.

use alloy_primitives::B256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt::{self, Display};
use std::str::FromStr;
use url::Url;

use crate::did::Did;
use crate::error::ErrorCode;
use crate::signer::Signer;

/// Canonical struct tag of the on-chain payment channel object.
pub const PAYMENT_CHANNEL_STRUCT_TAG: &str = "0x3::payment_channel::PaymentChannel";

/// Network selector for chain endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkTag {
    Dev,
    Test,
    Main,
}

impl NetworkTag {
    /// The node endpoint serving this network.
    pub fn node_url(&self) -> Url {
        let url = match self {
            NetworkTag::Dev => "http://127.0.0.1:6767",
            NetworkTag::Test => "https://test-seed.rooch.network",
            NetworkTag::Main => "https://main-seed.rooch.network",
        };
        Url::parse(url).expect("static node url")
    }

    /// The numeric chain id carried in SubRAV records.
    pub fn chain_id(&self) -> u64 {
        match self {
            NetworkTag::Main => 1,
            NetworkTag::Test => 2,
            NetworkTag::Dev => 3,
        }
    }

    pub fn variants() -> &'static [NetworkTag] {
        &[NetworkTag::Dev, NetworkTag::Test, NetworkTag::Main]
    }
}

impl Display for NetworkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkTag::Dev => "dev",
            NetworkTag::Test => "test",
            NetworkTag::Main => "main",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown network tag {0}")]
pub struct NetworkTagError(String);

impl FromStr for NetworkTag {
    type Err = NetworkTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(NetworkTag::Dev),
            "test" => Ok(NetworkTag::Test),
            "main" => Ok(NetworkTag::Main),
            other => Err(NetworkTagError(other.into())),
        }
    }
}

/// Execution status reported by the chain for views and transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Executed,
    Failed,
}

/// Result of a view-function call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewResult {
    pub status: ExecutionStatus,
    pub return_values: Vec<Vec<u8>>,
}

/// An event emitted by a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
    pub event_type: String,
    pub data: Vec<u8>,
}

/// Result of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResult {
    pub status: ExecutionStatus,
    pub events: Vec<ChainEvent>,
}

impl TxResult {
    /// The first event of the given type, if any.
    pub fn event(&self, event_type: &str) -> Option<&ChainEvent> {
        self.events.iter().find(|e| e.event_type == event_type)
    }
}

/// A typed argument to an entry or view function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    Str(String),
    U8(u8),
    Address(String),
    U8Vec(Vec<u8>),
    StrVec(Vec<String>),
}

/// A transaction payload: a fully-qualified entry function and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxPayload {
    pub target: String,
    pub args: Vec<CallArg>,
}

impl TxPayload {
    pub fn new(target: impl Into<String>, args: Vec<CallArg>) -> Self {
        TxPayload {
            target: target.into(),
            args,
        }
    }
}

/// Errors surfaced by chain clients.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The node endpoint could not be reached.
    #[error("chain unreachable: {0}")]
    Unreachable(String),
    /// The chain rejected the transaction with the embedded execution status.
    #[error("transaction rejected: {status}")]
    TxRejected { status: String },
    /// An observed event payload does not match the expected schema.
    #[error("event {event_type} does not match schema: {reason}")]
    EventSchemaMismatch { event_type: String, reason: String },
}

impl ChainError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ChainError::Unreachable(_) => ErrorCode::ChainUnreachable,
            ChainError::TxRejected { .. } => ErrorCode::TxRejected,
            ChainError::EventSchemaMismatch { .. } => ErrorCode::EventUnparseable,
        }
    }
}

/// The asynchronous interface to a chain node.
///
/// Implementations wrap an RPC transport; the core only depends on this
/// trait, so tests substitute an in-memory double.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Calls a view function and returns its raw return values.
    async fn call_view(&self, target: &str, args: Vec<CallArg>) -> Result<ViewResult, ChainError>;

    /// Signs and submits a transaction, returning its status and events.
    async fn send_tx(&self, tx: TxPayload, signer: &dyn Signer) -> Result<TxResult, ChainError>;
}

/// Derives the deterministic channel id for `(payer, payee, asset)`.
///
/// Replicates the chain's computation: sha3-256 over the canonical struct
/// tag followed by each identifier as u32-BE length-prefixed UTF-8.
pub fn derive_channel_id(payer: &Did, payee: &Did, asset_id: &str) -> B256 {
    let mut hasher = Sha3_256::new();
    hasher.update(PAYMENT_CHANNEL_STRUCT_TAG.as_bytes());
    for part in [payer.to_string(), payee.to_string(), asset_id.to_string()] {
        hasher.update((part.len() as u32).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    B256::from_slice(&hasher.finalize())
}
