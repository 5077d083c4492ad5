//! Deferred SubRAV micropayment negotiation for Nuwa services.
//!
//! Every billable request carries the client's latest signed SubRAV; the
//! server verifies it, executes the operation, prices it, and answers with a
//! payment envelope proposing the next unsigned SubRAV. Settlement is
//! deferred: the client pays for request *n* by signing the proposal
//! returned with request *n-1*.
//!
//! The crate is protocol-agnostic: transports hand requests to the
//! [`processor`](processor::PaymentProcessor) and relay its envelopes.
//!
//! # Modules
//!
//! - [`billing`] - Rule matching and cost strategies
//! - [`channels`] - Channel lifecycle administration
//! - [`claim`] - The claim-trigger hand-off port
//! - [`client`] - The payer-side sub-channel state machine
//! - [`error`] - Processor-level protocol failures
//! - [`processor`] - The four-stage payment processor
//! - [`rate`] - Asset/USD rate provider port
//! - [`rav`] - SubRAV signing, verification, and succession laws
//! - [`store`] - Storage ports for channels, RAVs, and pending proposals
//! - [`verifier`] - The per-request RAV decision algorithm

pub mod billing;
pub mod channels;
pub mod claim;
pub mod client;
pub mod error;
pub mod processor;
pub mod rate;
pub mod rav;
pub mod store;
pub mod verifier;
