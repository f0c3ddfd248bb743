//! DNS vendor backends for access
//!
//! Every backend implements [`access_core::DnsProvider`] and ships a
//! factory describing its credential schema. [`register_all`] installs
//! them into a [`ProviderRegistry`] under their canonical names.

pub mod azure;
pub mod cloudflare;
pub mod digitalocean;
pub mod gcloud;
pub mod godaddy;
pub mod http;
pub mod oauth;
pub mod route53;
pub mod sigv4;
pub mod test_backend;

pub use azure::{AzureFactory, AzureProvider};
pub use cloudflare::{CloudflareFactory, CloudflareProvider};
pub use digitalocean::{DigitalOceanFactory, DigitalOceanProvider};
pub use gcloud::{GcloudFactory, GcloudProvider};
pub use godaddy::{GoDaddyFactory, GoDaddyProvider};
pub use route53::{Route53Factory, Route53Provider};
pub use test_backend::{TestFactory, TestProvider};

use access_core::ProviderRegistry;

/// Register every backend with a registry
///
/// # Example
///
/// ```rust
/// use access_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// access_providers::register_all(&registry);
/// assert!(registry.has_provider("route53"));
/// ```
pub fn register_all(registry: &ProviderRegistry) {
    registry.register_provider(godaddy::NAME, Box::new(GoDaddyFactory));
    registry.register_provider(cloudflare::NAME, Box::new(CloudflareFactory));
    registry.register_provider(digitalocean::NAME, Box::new(DigitalOceanFactory));
    registry.register_provider(azure::NAME, Box::new(AzureFactory));
    registry.register_provider(route53::NAME, Box::new(Route53Factory));
    registry.register_provider(gcloud::NAME, Box::new(GcloudFactory));
    registry.register_provider(test_backend::NAME, Box::new(TestFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use access_core::{Error, ProviderCredentials};

    #[test]
    fn registers_every_backend_under_its_info_name() {
        let registry = ProviderRegistry::new();
        register_all(&registry);

        let names = registry.list_providers();
        assert_eq!(
            names,
            vec!["azure", "cloudflare", "digitalocean", "gcloud", "godaddy", "route53", "test"]
        );
        for name in &names {
            let (info, schema) = registry.describe(name).unwrap();
            assert_eq!(info.name, name.as_str());
            assert!(info.capabilities.ipv4 && info.capabilities.ipv6);
            // key/secret come first so setup prompts in a stable order
            assert_eq!(schema.first().map(|f| f.name), Some("key"));
        }
    }

    #[test]
    fn registry_validates_before_creating() {
        let registry = ProviderRegistry::new();
        register_all(&registry);

        let err = registry
            .create_provider("route53", &ProviderCredentials::new("AKID", "secret"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::MissingCredentials { ref field, .. } if field == "hosted_zone_id"));

        let provider = registry
            .create_provider("test", &ProviderCredentials::default())
            .unwrap();
        assert_eq!(provider.info().name, "test");
    }

    #[tokio::test]
    async fn rejects_malformed_input_without_network() {
        let registry = ProviderRegistry::new();
        register_all(&registry);
        let creds = ProviderCredentials::new("k", "s")
            .with_extra("tenant_id", "t")
            .with_extra("subscription_id", "s")
            .with_extra("resource_group", "r")
            .with_extra("hosted_zone_id", "Z1")
            .with_extra("refresh_token", "r")
            .with_extra("project", "p")
            .with_extra("managed_zone", "z");

        for name in registry.list_providers() {
            let provider = registry.create_provider(&name, &creds).unwrap();
            let err = provider
                .update("example.com", "peer0", "not-an-ip", None)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{}: {:?}", name, err);
        }
    }
}
