//! Signature primitives and multibase key encoding for the Nuwa protocol.
//!
//! This crate covers the two cryptographic concerns of the core: verifying
//! and producing signatures over raw byte payloads (Ed25519 and secp256k1
//! ECDSA), and converting public keys between raw bytes and the multibase
//! `z…` form used in DID documents and `did:key` identifiers.
//!
//! # Modules
//!
//! - [`keys`] - Raw `sign`/`verify` over byte payloads per key type
//! - [`local`] - An in-process [`Signer`](nuwa_types::signer::Signer) holding raw keypairs
//! - [`multibase`] - base58btc multibase codec with multicodec key prefixes

pub mod keys;
pub mod local;
pub mod multibase;
