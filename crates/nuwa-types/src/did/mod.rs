//! DID strings and DID documents.
//!
//! A DID is a `did:<method>:<identifier>` string; fragment ids of the form
//! `<did>#<fragment>` identify verification methods and services inside a
//! document. The document model and its invariants live in [`document`].

mod document;

pub use document::*;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;

/// A decentralized identifier split into its method and method-specific id.
///
/// Method-specific ids: `key` uses a multibase public key (`z…`), `rooch`
/// uses a hex or bech32 address produced by the chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Did {
    pub method: String,
    pub identifier: String,
}

impl Did {
    pub fn new<M: Into<String>, I: Into<String>>(method: M, identifier: I) -> Self {
        Self {
            method: method.into(),
            identifier: identifier.into(),
        }
    }

    /// Builds a `did:key` DID from a multibase-encoded public key.
    pub fn key<I: Into<String>>(public_key_multibase: I) -> Self {
        Self::new("key", public_key_multibase)
    }

    /// Builds a `did:rooch` DID from a chain address.
    pub fn rooch<I: Into<String>>(address: I) -> Self {
        Self::new("rooch", address)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The id of a verification method or service inside this DID's document.
    pub fn with_fragment(&self, fragment: &str) -> String {
        format!("{}#{}", self, fragment)
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "did:{}:{}", self.method, self.identifier)
    }
}

impl From<Did> for String {
    fn from(value: Did) -> Self {
        value.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid DID format {0}")]
pub struct DidFormatError(String);

impl FromStr for Did {
    type Err = DidFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let scheme = parts.next();
        let method = parts.next();
        let identifier = parts.next();
        match (scheme, method, identifier) {
            (Some("did"), Some(method), Some(identifier))
                if !method.is_empty() && !identifier.is_empty() =>
            {
                Ok(Did {
                    method: method.into(),
                    identifier: identifier.into(),
                })
            }
            _ => Err(DidFormatError(s.into())),
        }
    }
}

impl Serialize for Did {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Did::from_str(&s).map_err(de::Error::custom)
    }
}

/// Splits a `<did>#<fragment>` id into its DID and fragment parts.
///
/// Returns `None` when the string has no fragment or the DID part is invalid.
pub fn split_did_url(s: &str) -> Option<(Did, &str)> {
    let (did, fragment) = s.split_once('#')?;
    if fragment.is_empty() {
        return None;
    }
    let did = Did::from_str(did).ok()?;
    Some((did, fragment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_did_parse_key() {
        let did: Did = "did:key:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK"
            .parse()
            .unwrap();
        assert_eq!(did.method, "key");
        assert_eq!(did.identifier, "z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK");
    }

    #[test]
    fn test_did_parse_rooch_bech32() {
        let did: Did = "did:rooch:rooch1qxyz".parse().unwrap();
        assert_eq!(did.method, "rooch");
        assert_eq!(did.identifier, "rooch1qxyz");
    }

    #[test]
    fn test_did_rejects_missing_parts() {
        assert!(Did::from_str("did:key").is_err());
        assert!(Did::from_str("key:z6Mk").is_err());
        assert!(Did::from_str("did::z6Mk").is_err());
        assert!(Did::from_str("").is_err());
    }

    #[test]
    fn test_did_serde_roundtrip() {
        let did = Did::rooch("0x42");
        let json = serde_json::to_string(&did).unwrap();
        assert_eq!(json, "\"did:rooch:0x42\"");
        let back: Did = serde_json::from_str(&json).unwrap();
        assert_eq!(did, back);
    }

    #[test]
    fn test_with_fragment() {
        let did = Did::key("z6Mk");
        assert_eq!(did.with_fragment("key-1"), "did:key:z6Mk#key-1");
    }

    #[test]
    fn test_split_did_url() {
        let (did, fragment) = split_did_url("did:rooch:0x42#account-key").unwrap();
        assert_eq!(did, Did::rooch("0x42"));
        assert_eq!(fragment, "account-key");
        assert!(split_did_url("did:rooch:0x42").is_none());
        assert!(split_did_url("did:rooch:0x42#").is_none());
    }
}
