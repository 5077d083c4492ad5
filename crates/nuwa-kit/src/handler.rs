//! The operation handler contract.
//!
//! Handlers receive parsed parameters and the authenticated caller, and
//! report usage units alongside their output so per-unit billing can price
//! the request after execution.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use nuwa_types::did::Did;

/// What a handler sees of one request.
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// The authenticated caller, when the transport established one.
    pub caller_did: Option<Did>,
    /// Operation parameters as parsed JSON.
    pub params: Value,
}

/// A handler's result: the response body plus billable usage units.
#[derive(Debug, Clone)]
pub struct OperationOutput {
    pub value: Value,
    /// Usage units (e.g. tokens) consumed; per-unit rules multiply by this.
    pub units: u64,
}

impl OperationOutput {
    pub fn with_units(value: Value, units: u64) -> Self {
        OperationOutput { value, units }
    }
}

impl From<Value> for OperationOutput {
    fn from(value: Value) -> Self {
        OperationOutput { value, units: 0 }
    }
}

/// An application-level handler failure. Surfaced in the response body; the
/// payment envelope still settles at zero cost so client promises resolve.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        HandlerError {
            message: message.into(),
        }
    }
}

/// One registered operation.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn handle(&self, ctx: OperationContext) -> Result<OperationOutput, HandlerError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> OperationHandler for FnHandler<F>
where
    F: Fn(OperationContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<OperationOutput, HandlerError>> + Send,
{
    async fn handle(&self, ctx: OperationContext) -> Result<OperationOutput, HandlerError> {
        (self.0)(ctx).await
    }
}

/// Wraps an async closure as an [`OperationHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn OperationHandler>
where
    F: Fn(OperationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<OperationOutput, HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
