//! Rust implementation of the Nuwa protocol core.
//!
//! This crate bundles identity and payment infrastructure for decentralized
//! agent services: a pluggable Verifiable Data Registry for DID documents,
//! Custodian-Assisted DID Onboarding (CADOP), and deferred SubRAV
//! micropayment negotiation gated in front of billable operations.
//!
//! # Roles
//!
//! - **Service**: a payment-gated endpoint. Wire storage, a DID resolver,
//!   and billing rules into a [`nuwa_payment::processor::PaymentProcessor`],
//!   then register operations on a [`nuwa_kit::ServiceKit`].
//! - **Custodian**: an onboarding service. Use
//!   [`nuwa_vdr::cadop::CadopCoordinator`] over a registry with the `rooch`
//!   driver.
//! - **Client**: construct and sign SubRAVs with [`nuwa_payment::rav`] and a
//!   [`Signer`](nuwa_types::signer::Signer).
//!
//! # Crates
//!
//! | Crate | Content |
//! |-------|---------|
//! | [`nuwa_types`] | DID documents, SubRAV records and codec, payment envelopes, ports |
//! | [`nuwa_crypto`] | Multibase keys, Ed25519/secp256k1 signatures, local signer |
//! | [`nuwa_vdr`] | Method-routed DID registry and the CADOP coordinator |
//! | [`nuwa_method_key`] | Self-resolving `did:key` driver |
//! | [`nuwa_method_rooch`] | On-chain `did:rooch` driver |
//! | [`nuwa_payment`] | Storage ports, RAV verifier, billing, payment processor |
//! | [`nuwa_kit`] | Operation registry, handler contract, built-in operations |
//!
//! The [`config`] module loads service configuration from the environment.

pub mod config;

pub use nuwa_crypto as crypto;
pub use nuwa_kit as kit;
pub use nuwa_method_key as method_key;
pub use nuwa_method_rooch as method_rooch;
pub use nuwa_payment as payment;
pub use nuwa_types as types;
pub use nuwa_vdr as vdr;
