//! Plugin-based provider registry
//!
//! Backends register a factory under their name; the rest of the system
//! selects one by the `dns_provider` string in the configuration, without
//! if-else chains over vendor names.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use access_core::{ProviderCredentials, ProviderRegistry};
//!
//! let registry = ProviderRegistry::new();
//! access_providers::register_all(&registry);
//!
//! let creds = ProviderCredentials::new("key", "secret");
//! let provider = registry.create_provider("godaddy", &creds)?;
//! ```

use crate::config::ProviderCredentials;
use crate::error::{Error, Result};
use crate::traits::{ConfigField, DnsProvider, DnsProviderFactory, ProviderInfo};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Name → factory lookup for DNS backends
///
/// ## Thread Safety
///
/// Interior mutability with RwLock: concurrent reads, exclusive writes.
/// Factories never panic while the lock is held, so a poisoned lock still
/// guards a consistent map and is recovered rather than propagated.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<BTreeMap<String, Box<dyn DnsProviderFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any previous one
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        let name = name.into().to_ascii_lowercase();
        self.write().insert(name, factory);
    }

    /// Validate credentials and create a backend
    pub fn create_provider(
        &self,
        name: &str,
        credentials: &ProviderCredentials,
    ) -> Result<Box<dyn DnsProvider>> {
        let providers = self.read();
        let factory = providers
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| self.unknown(name, &providers))?;

        factory.validate(credentials)?;
        factory.create(credentials)
    }

    /// Metadata and credential schema of a registered backend
    pub fn describe(&self, name: &str) -> Result<(ProviderInfo, Vec<ConfigField>)> {
        let providers = self.read();
        let factory = providers
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| self.unknown(name, &providers))?;
        Ok((factory.info(), factory.required_config()))
    }

    /// Registered names, sorted
    pub fn list_providers(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Check if a provider is registered
    pub fn has_provider(&self, name: &str) -> bool {
        self.read().contains_key(&name.to_ascii_lowercase())
    }

    fn unknown(&self, name: &str, providers: &BTreeMap<String, Box<dyn DnsProviderFactory>>) -> Error {
        let known: Vec<&str> = providers.keys().map(String::as_str).collect();
        Error::config(format!(
            "unknown DNS provider '{}' (available: {})",
            name,
            known.join(", ")
        ))
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Box<dyn DnsProviderFactory>>> {
        self.providers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Box<dyn DnsProviderFactory>>> {
        self.providers.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordUpdate;
    use crate::traits::{Capabilities, FieldKind, UpdateResult};
    use async_trait::async_trait;

    const INFO: ProviderInfo = ProviderInfo {
        name: "mock",
        version: "0.1.0",
        capabilities: Capabilities {
            ipv4: true,
            ipv6: true,
            connection_test: false,
            dry_run: false,
        },
    };

    struct MockProvider;

    #[async_trait]
    impl DnsProvider for MockProvider {
        fn info(&self) -> ProviderInfo {
            INFO
        }

        async fn apply(&self, record: &RecordUpdate) -> Result<UpdateResult> {
            Ok(UpdateResult::Unchanged {
                current_ip: record.address(),
            })
        }
    }

    struct MockProviderFactory;

    impl DnsProviderFactory for MockProviderFactory {
        fn info(&self) -> ProviderInfo {
            INFO
        }

        fn required_config(&self) -> Vec<ConfigField> {
            vec![ConfigField::required("key", "API token", FieldKind::Secret)]
        }

        fn create(&self, _credentials: &ProviderCredentials) -> Result<Box<dyn DnsProvider>> {
            Ok(Box::new(MockProvider))
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = ProviderRegistry::new();
        assert!(!registry.has_provider("mock"));

        registry.register_provider("Mock", Box::new(MockProviderFactory));

        assert!(registry.has_provider("mock"));
        assert!(registry.has_provider("MOCK"));
        assert_eq!(registry.list_providers(), vec!["mock".to_string()]);

        let (info, fields) = registry.describe("mock").unwrap();
        assert_eq!(info.name, "mock");
        assert_eq!(fields[0].name, "key");
    }

    #[test]
    fn test_create_validates_credentials() {
        let registry = ProviderRegistry::new();
        registry.register_provider("mock", Box::new(MockProviderFactory));

        let missing = registry.create_provider("mock", &ProviderCredentials::default());
        assert!(matches!(missing, Err(Error::MissingCredentials { .. })));

        let provider = registry
            .create_provider("mock", &ProviderCredentials::new("t", ""))
            .unwrap();
        assert_eq!(provider.info().name, "mock");
    }

    #[test]
    fn test_unknown_provider_lists_alternatives() {
        let registry = ProviderRegistry::new();
        registry.register_provider("mock", Box::new(MockProviderFactory));

        let err = registry
            .create_provider("nope", &ProviderCredentials::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(ref m) if m.contains("mock")));
    }
}
