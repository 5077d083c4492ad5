//! Processor-level protocol failures.
//!
//! Request-level problems (bad signatures, conflicts, missing rates) never
//! surface here; they are recorded in the request state and answered with an
//! error envelope. A [`PaymentError`] means the request produced no usable
//! envelope at all and the transport must fail the call outright.

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// The caller's deadline fired before the pending proposal was
    /// persisted.
    #[error("request cancelled before persistence")]
    Cancelled,

    /// A storage port failed; the envelope must not be emitted because the
    /// pending proposal may not be visible to the next request.
    #[error("storage failure: {0}")]
    Store(#[source] anyhow::Error),
}
