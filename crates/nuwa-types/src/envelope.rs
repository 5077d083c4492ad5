//! The payment envelope attached to every billable response.
//!
//! An envelope either carries the next unsigned SubRAV proposal together
//! with the charged cost, or a typed error. In both cases it echoes the
//! client's transaction reference so in-flight client promises resolve
//! deterministically.

use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display};

use crate::amount::Amount;
use crate::error::ErrorCode;
use crate::subrav::SubRav;
use crate::timestamp::UnixMillis;

/// Version marker for the payment envelope. Serializes as the integer `1`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeVersion1;

impl EnvelopeVersion1 {
    pub const VALUE: u8 = 1;
}

impl Serialize for EnvelopeVersion1 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for EnvelopeVersion1 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let num = u8::deserialize(deserializer)?;
        if num == Self::VALUE {
            Ok(EnvelopeVersion1)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected envelope version {}, got {}",
                Self::VALUE,
                num
            )))
        }
    }
}

impl Display for EnvelopeVersion1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::VALUE)
    }
}

/// A typed error embedded in an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub code: ErrorCode,
    pub message: String,
}

/// The payment envelope of a billable response.
///
/// Carries either `{sub_rav, cost, cost_usd}` or `{error}`, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEnvelope {
    pub version: EnvelopeVersion1,
    /// Echoed from the request.
    pub client_tx_ref: String,
    /// Server-generated, format `srv-<epochMs>-<random9>`.
    pub service_tx_ref: String,
    /// The next unsigned SubRAV proposal. Absent on free routes and errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_rav: Option<SubRav>,
    /// The cost charged for this request in asset base units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Amount>,
    /// The cost in USD as a decimal string, when a rate was available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}

impl PaymentEnvelope {
    /// A settled envelope proposing `sub_rav` (when the route is paid).
    pub fn settled(
        client_tx_ref: impl Into<String>,
        service_tx_ref: impl Into<String>,
        sub_rav: Option<SubRav>,
        cost: Amount,
        cost_usd: Option<String>,
    ) -> Self {
        PaymentEnvelope {
            version: EnvelopeVersion1,
            client_tx_ref: client_tx_ref.into(),
            service_tx_ref: service_tx_ref.into(),
            sub_rav,
            cost: Some(cost),
            cost_usd,
            error: None,
        }
    }

    /// An error envelope echoing the client's reference.
    pub fn failed(
        client_tx_ref: impl Into<String>,
        service_tx_ref: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        PaymentEnvelope {
            version: EnvelopeVersion1,
            client_tx_ref: client_tx_ref.into(),
            service_tx_ref: service_tx_ref.into(),
            sub_rav: None,
            cost: None,
            cost_usd: None,
            error: Some(EnvelopeError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Generates a service transaction reference: `srv-<epochMs>-<random9>`.
pub fn service_tx_ref() -> String {
    let now = UnixMillis::now_or_epoch();
    let suffix = Alphanumeric.sample_string(&mut rand::rng(), 9);
    format!("srv-{}-{}", now, suffix)
}
