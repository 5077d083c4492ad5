//! The driver trait and the method-routed registry.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use nuwa_types::did::{Did, DidDocument, VerificationRelationship};
use nuwa_types::resolver::{DidResolver, ResolverError};

use crate::error::VdrError;
use crate::types::{
    CadopCreateRequest, CreateDidRequest, CreationResult, OperationOptions, ServiceInput,
    VerificationMethodInput,
};

/// A DID method driver.
///
/// Drivers own everything behind one `did:<method>:` prefix: resolution,
/// creation, and document mutations. Read operations take no options; every
/// write takes [`OperationOptions`] so callers can override the signer per
/// call.
#[async_trait]
pub trait VdrDriver: Send + Sync {
    /// The method prefix this driver serves, e.g. `"rooch"`.
    fn method(&self) -> &'static str;

    async fn resolve(&self, did: &Did) -> Result<Option<DidDocument>, VdrError>;

    async fn exists(&self, did: &Did) -> Result<bool, VdrError> {
        Ok(self.resolve(did).await?.is_some())
    }

    async fn create(
        &self,
        request: &CreateDidRequest,
        options: &OperationOptions,
    ) -> Result<CreationResult, VdrError>;

    async fn create_via_cadop(
        &self,
        request: &CadopCreateRequest,
        options: &OperationOptions,
    ) -> Result<CreationResult, VdrError>;

    async fn add_verification_method(
        &self,
        did: &Did,
        method: &VerificationMethodInput,
        relationships: &[VerificationRelationship],
        options: &OperationOptions,
    ) -> Result<(), VdrError>;

    async fn remove_verification_method(
        &self,
        did: &Did,
        fragment: &str,
        options: &OperationOptions,
    ) -> Result<(), VdrError>;

    async fn add_service(
        &self,
        did: &Did,
        service: &ServiceInput,
        options: &OperationOptions,
    ) -> Result<(), VdrError>;

    async fn remove_service(
        &self,
        did: &Did,
        fragment: &str,
        options: &OperationOptions,
    ) -> Result<(), VdrError>;

    async fn update_relationships(
        &self,
        did: &Did,
        fragment: &str,
        add: &[VerificationRelationship],
        remove: &[VerificationRelationship],
        options: &OperationOptions,
    ) -> Result<(), VdrError>;
}

/// Builder for a [`VdrRegistry`]. Registration closes when `build` is called.
#[derive(Default)]
pub struct VdrRegistryBuilder {
    drivers: HashMap<&'static str, Arc<dyn VdrDriver>>,
}

impl VdrRegistryBuilder {
    pub fn and_register(mut self, driver: Arc<dyn VdrDriver>) -> Self {
        self.drivers.insert(driver.method(), driver);
        self
    }

    pub fn build(self) -> VdrRegistry {
        VdrRegistry {
            drivers: self.drivers,
        }
    }
}

/// Routes DID operations to method drivers by the DID's method prefix.
///
/// The driver set is fixed at build time; an unknown method is
/// [`VdrError::MethodUnsupported`].
pub struct VdrRegistry {
    drivers: HashMap<&'static str, Arc<dyn VdrDriver>>,
}

impl VdrRegistry {
    pub fn builder() -> VdrRegistryBuilder {
        VdrRegistryBuilder::default()
    }

    /// The driver for `method`, if registered.
    pub fn driver(&self, method: &str) -> Option<&Arc<dyn VdrDriver>> {
        self.drivers.get(method)
    }

    /// The registered method prefixes.
    pub fn methods(&self) -> Vec<&'static str> {
        let mut methods: Vec<&'static str> = self.drivers.keys().copied().collect();
        methods.sort_unstable();
        methods
    }

    fn route(&self, method: &str) -> Result<&Arc<dyn VdrDriver>, VdrError> {
        self.drivers
            .get(method)
            .ok_or_else(|| VdrError::MethodUnsupported(method.into()))
    }

    pub async fn resolve(&self, did: &Did) -> Result<Option<DidDocument>, VdrError> {
        self.route(did.method())?.resolve(did).await
    }

    pub async fn exists(&self, did: &Did) -> Result<bool, VdrError> {
        self.route(did.method())?.exists(did).await
    }

    /// Creates a DID with the given method.
    pub async fn create(
        &self,
        method: &str,
        request: &CreateDidRequest,
        options: &OperationOptions,
    ) -> Result<CreationResult, VdrError> {
        self.route(method)?.create(request, options).await
    }

    /// Creates a DID on behalf of a user through a custodian.
    pub async fn create_via_cadop(
        &self,
        method: &str,
        request: &CadopCreateRequest,
        options: &OperationOptions,
    ) -> Result<CreationResult, VdrError> {
        self.route(method)?.create_via_cadop(request, options).await
    }

    pub async fn add_verification_method(
        &self,
        did: &Did,
        method: &VerificationMethodInput,
        relationships: &[VerificationRelationship],
        options: &OperationOptions,
    ) -> Result<(), VdrError> {
        self.route(did.method())?
            .add_verification_method(did, method, relationships, options)
            .await
    }

    pub async fn remove_verification_method(
        &self,
        did: &Did,
        fragment: &str,
        options: &OperationOptions,
    ) -> Result<(), VdrError> {
        self.route(did.method())?
            .remove_verification_method(did, fragment, options)
            .await
    }

    pub async fn add_service(
        &self,
        did: &Did,
        service: &ServiceInput,
        options: &OperationOptions,
    ) -> Result<(), VdrError> {
        self.route(did.method())?.add_service(did, service, options).await
    }

    pub async fn remove_service(
        &self,
        did: &Did,
        fragment: &str,
        options: &OperationOptions,
    ) -> Result<(), VdrError> {
        self.route(did.method())?.remove_service(did, fragment, options).await
    }

    pub async fn update_relationships(
        &self,
        did: &Did,
        fragment: &str,
        add: &[VerificationRelationship],
        remove: &[VerificationRelationship],
        options: &OperationOptions,
    ) -> Result<(), VdrError> {
        self.route(did.method())?
            .update_relationships(did, fragment, add, remove, options)
            .await
    }
}

#[async_trait]
impl DidResolver for VdrRegistry {
    async fn resolve(&self, did: &Did) -> Result<Option<DidDocument>, ResolverError> {
        VdrRegistry::resolve(self, did).await.map_err(Into::into)
    }

    async fn exists(&self, did: &Did) -> Result<bool, ResolverError> {
        VdrRegistry::exists(self, did).await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nuwa_types::did::KeyType;

    struct FakeDriver;

    #[async_trait]
    impl VdrDriver for FakeDriver {
        fn method(&self) -> &'static str {
            "fake"
        }

        async fn resolve(&self, did: &Did) -> Result<Option<DidDocument>, VdrError> {
            Ok(Some(DidDocument::new(did.clone())))
        }

        async fn create(
            &self,
            request: &CreateDidRequest,
            _options: &OperationOptions,
        ) -> Result<CreationResult, VdrError> {
            Ok(CreationResult::new(Did::new(
                "fake",
                request.public_key_multibase.clone(),
            )))
        }

        async fn create_via_cadop(
            &self,
            request: &CadopCreateRequest,
            _options: &OperationOptions,
        ) -> Result<CreationResult, VdrError> {
            Ok(CreationResult::new(Did::new(
                "fake",
                request.user_did_key.identifier(),
            )))
        }

        async fn add_verification_method(
            &self,
            _did: &Did,
            _method: &VerificationMethodInput,
            _relationships: &[VerificationRelationship],
            _options: &OperationOptions,
        ) -> Result<(), VdrError> {
            Ok(())
        }

        async fn remove_verification_method(
            &self,
            _did: &Did,
            _fragment: &str,
            _options: &OperationOptions,
        ) -> Result<(), VdrError> {
            Ok(())
        }

        async fn add_service(
            &self,
            _did: &Did,
            _service: &ServiceInput,
            _options: &OperationOptions,
        ) -> Result<(), VdrError> {
            Ok(())
        }

        async fn remove_service(
            &self,
            _did: &Did,
            _fragment: &str,
            _options: &OperationOptions,
        ) -> Result<(), VdrError> {
            Ok(())
        }

        async fn update_relationships(
            &self,
            _did: &Did,
            _fragment: &str,
            _add: &[VerificationRelationship],
            _remove: &[VerificationRelationship],
            _options: &OperationOptions,
        ) -> Result<(), VdrError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_routes_by_method_prefix() {
        let registry = VdrRegistry::builder()
            .and_register(Arc::new(FakeDriver))
            .build();
        let did = Did::new("fake", "abc");
        assert!(registry.resolve(&did).await.unwrap().is_some());
        assert!(registry.exists(&did).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_method_unsupported() {
        let registry = VdrRegistry::builder()
            .and_register(Arc::new(FakeDriver))
            .build();
        let did = Did::new("web", "example.com");
        let error = registry.resolve(&did).await.unwrap_err();
        assert!(matches!(error, VdrError::MethodUnsupported(m) if m == "web"));
    }

    #[tokio::test]
    async fn test_create_routes_explicit_method() {
        let registry = VdrRegistry::builder()
            .and_register(Arc::new(FakeDriver))
            .build();
        let request = CreateDidRequest {
            public_key_multibase: "z6Mk".into(),
            key_type: KeyType::Ed25519,
            preferred_did: None,
        };
        let result = registry
            .create("fake", &request, &OperationOptions::default())
            .await
            .unwrap();
        assert_eq!(result.did, Did::new("fake", "z6Mk"));
        assert!(registry
            .create("missing", &request, &OperationOptions::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_methods_listed_sorted() {
        let registry = VdrRegistry::builder()
            .and_register(Arc::new(FakeDriver))
            .build();
        assert_eq!(registry.methods(), vec!["fake"]);
    }
}
