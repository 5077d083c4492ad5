//! `did:rooch` method driver.
//!
//! Rooch DIDs are anchored on-chain: the chain allocates the DID address at
//! creation time, and the driver recovers it from the `DIDCreatedEvent`
//! emitted by the transaction. Preferred DIDs supplied by callers are
//! advisory only.
//!
//! All chain interaction goes through the
//! [`ChainClient`](nuwa_types::chain::ChainClient) port; the [`mock`] module
//! provides an in-memory chain for tests.
//!
//! # Modules
//!
//! - [`driver`] - The [`RoochVdr`](driver::RoochVdr) driver
//! - [`entry`] - Typed entry-function and view targets of the `0x3::did` module
//! - [`event`] - `DIDCreatedEvent` schema, parser, and string fallback
//! - [`mock`] - An in-memory [`ChainClient`](nuwa_types::chain::ChainClient) double

pub mod driver;
pub mod entry;
pub mod event;
pub mod mock;

pub use driver::RoochVdr;
