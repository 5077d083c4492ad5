//! Service kit for Nuwa payment-gated services.
//!
//! The kit sits between a transport adapter and the operation handlers: the
//! transport parses the wire into a [`ServiceRequest`](kit::ServiceRequest),
//! the kit matches the billing rule, runs the payment processor around the
//! handler, and returns a [`ServiceResponse`](kit::ServiceResponse) carrying
//! the structured payment envelope. Transports (HTTP, tool-call JSON-RPC)
//! are plug-ins over this contract.
//!
//! Operation registration closes when the kit is built; the builder is the
//! only way in.
//!
//! # Modules
//!
//! - [`builtin`] - The `nuwa.*` built-in operations
//! - [`handler`] - The operation handler contract
//! - [`kit`] - The service kit and its builder

pub mod builtin;
pub mod handler;
pub mod kit;

pub use kit::{ServiceKit, ServiceKitBuilder, ServiceRequest, ServiceResponse};
