//! `test` backend: records upserts in memory, talks to nobody
//!
//! Useful for exercising setup, discovery and the sync path end to end
//! without vendor credentials. State lasts as long as the process.

use access_core::record::{RecordType, RecordUpdate};
use access_core::traits::{
    Capabilities, ConfigField, DnsProvider, DnsProviderFactory, FieldKind, ProviderInfo,
    UpdateResult,
};
use access_core::{ProviderCredentials, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

pub const NAME: &str = "test";

const INFO: ProviderInfo = ProviderInfo {
    name: NAME,
    version: env!("CARGO_PKG_VERSION"),
    capabilities: Capabilities {
        ipv4: true,
        ipv6: true,
        connection_test: true,
        dry_run: true,
    },
};

/// In-memory backend
#[derive(Debug, Default)]
pub struct TestProvider {
    records: Mutex<HashMap<(String, RecordType), IpAddr>>,
}

impl TestProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address currently held by a record
    pub fn record(&self, fqdn: &str, record_type: RecordType) -> Option<IpAddr> {
        self.records
            .lock()
            .ok()?
            .get(&(fqdn.to_string(), record_type))
            .copied()
    }
}

#[async_trait]
impl DnsProvider for TestProvider {
    fn info(&self) -> ProviderInfo {
        INFO
    }

    async fn apply(&self, record: &RecordUpdate) -> Result<UpdateResult> {
        let key = (record.fqdn(), record.record_type());
        let new_ip = record.address();
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let result = match records.insert(key, new_ip) {
            Some(current_ip) if current_ip == new_ip => UpdateResult::Unchanged { current_ip },
            Some(previous) => UpdateResult::Updated {
                previous_ip: Some(previous),
                new_ip,
            },
            None => UpdateResult::Created { new_ip },
        };

        tracing::info!(
            "[test backend] {} {} -> {} ({:?})",
            record.record_type(),
            record.fqdn(),
            new_ip,
            result
        );
        Ok(result)
    }

    async fn test(&self) -> Result<()> {
        Ok(())
    }
}

/// Factory for the in-memory backend
pub struct TestFactory;

impl DnsProviderFactory for TestFactory {
    fn info(&self) -> ProviderInfo {
        INFO
    }

    fn required_config(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::optional("key", "Ignored", FieldKind::Text, Some("")),
            ConfigField::optional("secret", "Ignored", FieldKind::Secret, Some("")),
        ]
    }

    fn create(&self, credentials: &ProviderCredentials) -> Result<Box<dyn DnsProvider>> {
        self.validate(credentials)?;
        Ok(Box::new(TestProvider::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repeat_update_is_unchanged() {
        let provider = TestProvider::new();

        let first = provider
            .update("example.com", "peer0", "203.0.113.5", None)
            .await
            .unwrap();
        let second = provider
            .update("example.com", "peer0", "203.0.113.5", None)
            .await
            .unwrap();

        assert!(first.mutated());
        assert!(!second.mutated());
        assert_eq!(
            provider.record("peer0.example.com", RecordType::A),
            Some("203.0.113.5".parse().unwrap())
        );
    }

    #[test]
    fn needs_no_credentials() {
        let provider = tokio_test::assert_ok!(TestFactory.create(&ProviderCredentials::default()));
        tokio_test::assert_ok!(tokio_test::block_on(provider.test()));
    }
}
