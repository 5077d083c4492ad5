//! The service kit and its builder.
//!
//! A kit instance owns the rule matcher, the operation registry, and the
//! payment processor. Registration happens only through the builder, so the
//! operation set is closed once the service starts taking requests.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use alloy_primitives::B256;
use nuwa_payment::billing::{BillingRule, RuleMatcher};
use nuwa_payment::error::PaymentError;
use nuwa_payment::processor::{PaymentProcessor, PaymentRequest, RequestState};
use nuwa_payment::store::{ChannelStore, PendingRavStore, RavStore};
use nuwa_types::amount::Amount;
use nuwa_types::did::Did;
use nuwa_types::envelope::{PaymentEnvelope, service_tx_ref};
use nuwa_types::error::ErrorCode;
use nuwa_types::subrav::SignedSubRav;

use crate::handler::{HandlerError, OperationContext, OperationHandler, OperationOutput};

/// A transport-parsed request.
#[derive(Clone, Default)]
pub struct ServiceRequest {
    /// Normalized operation name, e.g. `POST /price` or `tool/analyze`.
    pub operation: String,
    /// Operation parameters.
    pub params: Value,
    /// The authenticated caller, when the transport established one.
    pub caller_did: Option<Did>,
    pub client_tx_ref: Option<String>,
    pub channel_id: Option<B256>,
    pub vm_id_fragment: Option<String>,
    pub signed_sub_rav: Option<SignedSubRav>,
    pub asset_id: Option<String>,
}

impl ServiceRequest {
    pub fn new(operation: impl Into<String>, params: Value) -> Self {
        ServiceRequest {
            operation: operation.into(),
            params,
            ..Default::default()
        }
    }

    pub fn with_caller(mut self, did: Did) -> Self {
        self.caller_did = Some(did);
        self
    }

    pub fn with_client_tx_ref(mut self, tx_ref: impl Into<String>) -> Self {
        self.client_tx_ref = Some(tx_ref.into());
        self
    }

    pub fn with_sub_channel(mut self, channel_id: B256, vm_id_fragment: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id);
        self.vm_id_fragment = Some(vm_id_fragment.into());
        self
    }

    pub fn with_signed_sub_rav(mut self, signed: SignedSubRav) -> Self {
        self.signed_sub_rav = Some(signed);
        self
    }

    fn payment_request(&self) -> PaymentRequest {
        PaymentRequest {
            operation: self.operation.clone(),
            client_tx_ref: self.client_tx_ref.clone(),
            channel_id: self.channel_id,
            vm_id_fragment: self.vm_id_fragment.clone(),
            signed_sub_rav: self.signed_sub_rav.clone(),
            asset_id: self.asset_id.clone(),
        }
    }
}

/// An error surfaced in the response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceError {
    /// Wire code for payment-level errors; absent for application errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    pub message: String,
}

/// What the transport serializes back to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ServiceError>,
    /// The payment envelope for billable operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentEnvelope>,
}

impl ServiceResponse {
    fn failure(code: Option<ErrorCode>, message: impl Into<String>) -> Self {
        ServiceResponse {
            result: None,
            error: Some(ServiceError {
                code,
                message: message.into(),
            }),
            payment: None,
        }
    }
}

pub(crate) struct Registration {
    pub(crate) handler: Arc<dyn OperationHandler>,
    pub(crate) schema: Option<Value>,
}

/// Builder for [`ServiceKit`]. Consumed by `build`; there is no way to
/// register operations afterwards.
pub struct ServiceKitBuilder<S> {
    service_id: String,
    service_did: Did,
    admin_dids: Vec<Did>,
    processor: Arc<PaymentProcessor<S>>,
    matcher: RuleMatcher,
    operations: HashMap<String, Registration>,
}

impl<S> ServiceKitBuilder<S>
where
    S: ChannelStore + RavStore + PendingRavStore,
{
    /// Registers a free, public operation.
    pub fn with_free_operation(
        mut self,
        name: impl Into<String>,
        handler: Arc<dyn OperationHandler>,
    ) -> Self {
        let name = name.into();
        self.matcher.push(BillingRule::free(format!("op-{name}"), name.clone()));
        self.operations.insert(
            name,
            Registration {
                handler,
                schema: None,
            },
        );
        self
    }

    /// Registers a billable operation under a custom rule. The rule's
    /// pattern should cover `name`.
    pub fn with_paid_operation(
        mut self,
        name: impl Into<String>,
        rule: BillingRule,
        handler: Arc<dyn OperationHandler>,
    ) -> Self {
        let name = name.into();
        self.matcher.push(rule);
        self.operations.insert(
            name,
            Registration {
                handler,
                schema: None,
            },
        );
        self
    }

    /// Attaches a parameter schema to an already-registered operation.
    /// Only the schema's `required` key list is enforced at dispatch.
    pub fn with_schema(mut self, name: &str, schema: Value) -> Self {
        if let Some(registration) = self.operations.get_mut(name) {
            registration.schema = Some(schema);
        }
        self
    }

    pub fn with_admin(mut self, did: Did) -> Self {
        self.admin_dids.push(did);
        self
    }

    pub fn build(self) -> ServiceKit<S> {
        ServiceKit {
            service_id: self.service_id,
            service_did: self.service_did,
            admin_dids: self.admin_dids,
            processor: self.processor,
            matcher: self.matcher,
            operations: self.operations,
        }
    }
}

/// The service kit: rule matching, auth gates, payment wiring, handlers.
pub struct ServiceKit<S> {
    pub(crate) service_id: String,
    pub(crate) service_did: Did,
    pub(crate) admin_dids: Vec<Did>,
    pub(crate) processor: Arc<PaymentProcessor<S>>,
    matcher: RuleMatcher,
    operations: HashMap<String, Registration>,
}

impl<S> ServiceKit<S>
where
    S: ChannelStore + RavStore + PendingRavStore,
{
    pub fn builder(
        service_id: impl Into<String>,
        service_did: Did,
        processor: Arc<PaymentProcessor<S>>,
    ) -> ServiceKitBuilder<S> {
        ServiceKitBuilder {
            service_id: service_id.into(),
            service_did,
            admin_dids: Vec::new(),
            processor,
            matcher: RuleMatcher::with_builtins(),
            operations: HashMap::new(),
        }
    }

    pub fn service_did(&self) -> &Did {
        &self.service_did
    }

    pub fn processor(&self) -> &Arc<PaymentProcessor<S>> {
        &self.processor
    }

    fn is_admin(&self, did: Option<&Did>) -> bool {
        did.is_some_and(|did| self.admin_dids.contains(did))
    }

    /// Shallow parameter validation: the schema's `required` keys must be
    /// present in the params object.
    fn check_schema(registration: &Registration, params: &Value) -> Result<(), String> {
        let Some(required) = registration
            .schema
            .as_ref()
            .and_then(|schema| schema.get("required"))
            .and_then(|required| required.as_array())
        else {
            return Ok(());
        };
        for key in required {
            let Some(key) = key.as_str() else { continue };
            if params.get(key).is_none() {
                return Err(format!("missing required parameter {key}"));
            }
        }
        Ok(())
    }

    /// Routes one request: rule lookup, auth gates, payment pre-processing,
    /// handler execution, settlement, persistence.
    #[instrument(skip_all, fields(operation = %request.operation))]
    pub async fn dispatch(
        &self,
        request: ServiceRequest,
        cancel: &CancellationToken,
    ) -> ServiceResponse {
        let Some(rule) = self.matcher.match_rule(&request.operation) else {
            return ServiceResponse::failure(None, format!("unknown operation {}", request.operation));
        };
        let rule = rule.clone();

        if rule.auth_required && request.caller_did.is_none() {
            return ServiceResponse::failure(
                Some(ErrorCode::PermissionDenied),
                "operation requires an authenticated caller",
            );
        }
        if rule.admin_only && !self.is_admin(request.caller_did.as_ref()) {
            return ServiceResponse::failure(
                Some(ErrorCode::PermissionDenied),
                "operation is restricted to admin DIDs",
            );
        }
        if let Some(registration) = self.operations.get(&request.operation) {
            if let Err(message) = Self::check_schema(registration, &request.params) {
                return ServiceResponse::failure(None, message);
            }
        }

        // Public free calls without payment context skip the pipeline
        // entirely; everything else goes through the processor. The commit
        // built-in ingests its RAV itself, so the outer pipeline must not
        // consume it first.
        let run_payment = (rule.payment_required
            || request.client_tx_ref.is_some()
            || request.signed_sub_rav.is_some())
            && request.operation != "nuwa.commit";
        let mut state: Option<RequestState> = None;
        if run_payment {
            match self
                .processor
                .pre_process(request.payment_request(), rule.clone(), cancel)
                .await
            {
                Ok(s) => state = Some(s),
                Err(e) => return Self::protocol_failure(e),
            }
        }

        // The handler only runs when the payment gate is clear.
        let gated = state.as_ref().and_then(|s| s.error()).is_some();
        let handler_result = if gated {
            None
        } else {
            match self.try_builtin(&request, cancel).await {
                Some(result) => Some(result),
                None => match self.operations.get(&request.operation) {
                    Some(registration) => Some(
                        registration
                            .handler
                            .handle(OperationContext {
                                caller_did: request.caller_did.clone(),
                                params: request.params.clone(),
                            })
                            .await,
                    ),
                    None => Some(Err(HandlerError::new(format!(
                        "no handler registered for {}",
                        request.operation
                    )))),
                },
            }
        };

        let (output, handler_error) = match handler_result {
            None => (None, None),
            Some(Ok(output)) => (Some(output), None),
            Some(Err(e)) => (None, Some(e)),
        };

        let mut payment = None;
        if let Some(mut s) = state {
            if handler_error.is_some() {
                // The operation failed before doing billable work: settle at
                // zero cost with no successor so the client's in-flight
                // promise still resolves.
                payment = Some(PaymentEnvelope::settled(
                    request.client_tx_ref.clone().unwrap_or_default(),
                    service_tx_ref(),
                    None,
                    Amount::ZERO,
                    None,
                ));
            } else {
                let units = output.as_ref().map(|o| o.units).unwrap_or(0);
                let envelope = match self.processor.settle(&mut s, units, cancel).await {
                    Ok(envelope) => envelope,
                    Err(e) => return Self::protocol_failure(e),
                };
                // The proposal must be visible before the envelope leaves.
                if let Err(e) = self.processor.persist(&mut s, cancel).await {
                    return Self::protocol_failure(e);
                }
                payment = Some(envelope);
            }
        }

        let error = handler_error
            .map(|e| ServiceError {
                code: None,
                message: e.message,
            })
            .or_else(|| {
                payment.as_ref().and_then(|envelope| {
                    envelope.error.as_ref().map(|e| ServiceError {
                        code: Some(e.code),
                        message: e.message.clone(),
                    })
                })
            });

        ServiceResponse {
            result: output.map(|o| o.value),
            error,
            payment,
        }
    }

    fn protocol_failure(error: PaymentError) -> ServiceResponse {
        match error {
            PaymentError::Cancelled => {
                ServiceResponse::failure(Some(ErrorCode::Cancelled), "request cancelled")
            }
            PaymentError::Store(e) => ServiceResponse::failure(None, format!("storage failure: {e}")),
        }
    }
}
