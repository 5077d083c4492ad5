//! Typed targets of the on-chain `0x3::did` module.
//!
//! Each function builds the exact [`TxPayload`] the chain expects; argument
//! order and types mirror the Move entry signatures.

use nuwa_types::chain::{CallArg, TxPayload};
use nuwa_types::did::VerificationRelationship;

pub const DID_MODULE: &str = "0x3::did";

pub const EXISTS_DID_FOR_ADDRESS: &str = "0x3::did::exists_did_for_address";
pub const GET_DID_DOCUMENT: &str = "0x3::did::get_did_document";
pub const CREATE_DID_FOR_SELF: &str = "0x3::did::create_did_object_for_self_entry";
pub const CREATE_DID_VIA_CADOP: &str = "0x3::did::create_did_object_via_cadop_with_did_key_entry";
pub const ADD_VERIFICATION_METHOD: &str = "0x3::did::add_verification_method_entry";
pub const REMOVE_VERIFICATION_METHOD: &str = "0x3::did::remove_verification_method_entry";
pub const ADD_SERVICE: &str = "0x3::did::add_service_entry";
pub const ADD_SERVICE_WITH_PROPERTIES: &str = "0x3::did::add_service_with_properties_entry";
pub const REMOVE_SERVICE: &str = "0x3::did::remove_service_entry";
pub const ADD_TO_RELATIONSHIP: &str = "0x3::did::add_to_verification_relationship_entry";
pub const REMOVE_FROM_RELATIONSHIP: &str = "0x3::did::remove_from_verification_relationship_entry";

/// The event type emitted by both creation entry functions.
pub const DID_CREATED_EVENT: &str = "0x3::did::DIDCreatedEvent";

pub fn create_did_for_self(public_key_multibase: &str) -> TxPayload {
    TxPayload::new(
        CREATE_DID_FOR_SELF,
        vec![CallArg::Str(public_key_multibase.into())],
    )
}

pub fn create_did_via_cadop(
    user_did_key: &str,
    custodian_public_key: &str,
    custodian_vm_type: &str,
) -> TxPayload {
    TxPayload::new(
        CREATE_DID_VIA_CADOP,
        vec![
            CallArg::Str(user_did_key.into()),
            CallArg::Str(custodian_public_key.into()),
            CallArg::Str(custodian_vm_type.into()),
        ],
    )
}

pub fn add_verification_method(
    fragment: &str,
    key_type: &str,
    public_key_multibase: &str,
    relationships: &[VerificationRelationship],
) -> TxPayload {
    TxPayload::new(
        ADD_VERIFICATION_METHOD,
        vec![
            CallArg::Str(fragment.into()),
            CallArg::Str(key_type.into()),
            CallArg::Str(public_key_multibase.into()),
            CallArg::U8Vec(relationships.iter().map(|r| r.tag()).collect()),
        ],
    )
}

pub fn remove_verification_method(fragment: &str) -> TxPayload {
    TxPayload::new(
        REMOVE_VERIFICATION_METHOD,
        vec![CallArg::Str(fragment.into())],
    )
}

pub fn add_service(fragment: &str, service_type: &str, endpoint: &str) -> TxPayload {
    TxPayload::new(
        ADD_SERVICE,
        vec![
            CallArg::Str(fragment.into()),
            CallArg::Str(service_type.into()),
            CallArg::Str(endpoint.into()),
        ],
    )
}

pub fn add_service_with_properties(
    fragment: &str,
    service_type: &str,
    endpoint: &str,
    keys: Vec<String>,
    values: Vec<String>,
) -> TxPayload {
    TxPayload::new(
        ADD_SERVICE_WITH_PROPERTIES,
        vec![
            CallArg::Str(fragment.into()),
            CallArg::Str(service_type.into()),
            CallArg::Str(endpoint.into()),
            CallArg::StrVec(keys),
            CallArg::StrVec(values),
        ],
    )
}

pub fn remove_service(fragment: &str) -> TxPayload {
    TxPayload::new(REMOVE_SERVICE, vec![CallArg::Str(fragment.into())])
}

pub fn add_to_relationship(fragment: &str, relationship: VerificationRelationship) -> TxPayload {
    TxPayload::new(
        ADD_TO_RELATIONSHIP,
        vec![CallArg::Str(fragment.into()), CallArg::U8(relationship.tag())],
    )
}

pub fn remove_from_relationship(
    fragment: &str,
    relationship: VerificationRelationship,
) -> TxPayload {
    TxPayload::new(
        REMOVE_FROM_RELATIONSHIP,
        vec![CallArg::Str(fragment.into()), CallArg::U8(relationship.tag())],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_verification_method_arg_shape() {
        let tx = add_verification_method(
            "key-2",
            "Ed25519VerificationKey2020",
            "z6Mk",
            &[
                VerificationRelationship::Authentication,
                VerificationRelationship::CapabilityDelegation,
            ],
        );
        assert_eq!(tx.target, ADD_VERIFICATION_METHOD);
        assert_eq!(tx.args.len(), 4);
        assert_eq!(tx.args[3], CallArg::U8Vec(vec![0, 3]));
    }

    #[test]
    fn test_relationship_entry_carries_tag() {
        let tx = add_to_relationship("key-2", VerificationRelationship::KeyAgreement);
        assert_eq!(tx.args[1], CallArg::U8(4));
    }

    #[test]
    fn test_service_with_properties_parallel_vectors() {
        let tx = add_service_with_properties(
            "svc",
            "CadopCustodianService",
            "https://custodian.example.com",
            vec!["custodianPublicKey".into()],
            vec!["z6Mk".into()],
        );
        assert_eq!(tx.args.len(), 5);
        assert!(matches!(&tx.args[3], CallArg::StrVec(keys) if keys.len() == 1));
    }
}
