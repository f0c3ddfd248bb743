// # DNS Liveness Probe
//
// Classifies `prefix{N}.domain` by resolving it and, when it resolves,
// trying a TCP connect to a few well-known ports.
//
// | DNS lookup                    | Result                                   |
// |-------------------------------|------------------------------------------|
// | NXDOMAIN / NOERROR, no data   | Free                                     |
// | timeout / SERVFAIL / transport| Occupied, inconclusive                   |
// | addresses                     | Occupied, `reachable` from connect probe |
//
// Only an authoritative "no such records" answer frees a slot. The connect
// probe never turns an occupied slot into a free one; it only annotates the
// status for logging.

use async_trait::async_trait;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::ProtoErrorKind;
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::{ResolveError, ResolveErrorKind, Resolver};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::config::DiscoveryTuning;
use crate::error::{Error, Result};
use crate::traits::{SlotProbe, SlotStatus};

/// What a name lookup established
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// The name resolved
    Addresses(Vec<IpAddr>),
    /// The name server answered that no address records exist
    NoRecords,
    /// Nothing could be established
    Failed(String),
}

/// Address lookup used by [`DnsLivenessProbe`]
#[async_trait]
pub trait NameLookup: Send + Sync {
    async fn lookup(&self, fqdn: &str) -> LookupOutcome;
}

/// [`NameLookup`] over the system resolver configuration
pub struct SystemResolver {
    resolver: Resolver<TokioConnectionProvider>,
}

impl SystemResolver {
    /// Read the system configuration; answers are never cached
    pub fn new() -> Result<Self> {
        let mut builder = Resolver::builder_tokio()
            .map_err(|e| Error::config(format!("system resolver: {}", e)))?;
        builder.options_mut().cache_size = 0;
        Ok(Self {
            resolver: builder.build(),
        })
    }
}

#[async_trait]
impl NameLookup for SystemResolver {
    async fn lookup(&self, fqdn: &str) -> LookupOutcome {
        // Absolute name: never expand through search domains
        let name = if fqdn.ends_with('.') {
            fqdn.to_string()
        } else {
            format!("{}.", fqdn)
        };
        match self.resolver.lookup_ip(name).await {
            Ok(found) => {
                let mut ips: Vec<IpAddr> = Vec::new();
                for ip in found.iter() {
                    if !ips.contains(&ip) {
                        ips.push(ip);
                    }
                }
                LookupOutcome::Addresses(ips)
            }
            Err(e) => classify(&e),
        }
    }
}

fn classify(err: &ResolveError) -> LookupOutcome {
    if let ResolveErrorKind::Proto(proto) = err.kind()
        && let ProtoErrorKind::NoRecordsFound { response_code, .. } = proto.kind()
        && matches!(*response_code, ResponseCode::NXDomain | ResponseCode::NoError)
    {
        return LookupOutcome::NoRecords;
    }
    LookupOutcome::Failed(err.to_string())
}

/// [`SlotProbe`] backed by DNS resolution and TCP connects
#[derive(Clone)]
pub struct DnsLivenessProbe {
    lookup: Arc<dyn NameLookup>,
    ports: Vec<u16>,
    timeout: Duration,
}

impl DnsLivenessProbe {
    /// Probe connecting to `ports`, each lookup/connect bounded by `timeout`
    pub fn new(lookup: Arc<dyn NameLookup>, ports: Vec<u16>, timeout: Duration) -> Self {
        Self {
            lookup,
            ports,
            timeout,
        }
    }

    /// Probe over the system resolver, configured from discovery tuning
    pub fn from_tuning(tuning: &DiscoveryTuning) -> Result<Self> {
        Ok(Self::new(
            Arc::new(SystemResolver::new()?),
            tuning.probe_ports.clone(),
            Duration::from_millis(tuning.probe_timeout_ms),
        ))
    }

    /// Whether any address accepts a connection on any probe port
    async fn reachable(&self, addresses: &[IpAddr]) -> bool {
        let mut attempts = JoinSet::new();
        for ip in addresses {
            for port in &self.ports {
                let target = SocketAddr::new(*ip, *port);
                let limit = self.timeout;
                attempts.spawn(async move {
                    matches!(timeout(limit, TcpStream::connect(target)).await, Ok(Ok(_)))
                });
            }
        }

        while let Some(joined) = attempts.join_next().await {
            if matches!(joined, Ok(true)) {
                attempts.abort_all();
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl SlotProbe for DnsLivenessProbe {
    async fn probe(&self, fqdn: &str) -> SlotStatus {
        let addresses = match timeout(self.timeout, self.lookup.lookup(fqdn)).await {
            Err(_) => {
                tracing::debug!("lookup of {} timed out; treating as occupied", fqdn);
                return SlotStatus::inconclusive();
            }
            Ok(LookupOutcome::Failed(reason)) => {
                tracing::debug!("lookup of {} failed ({}); treating as occupied", fqdn, reason);
                return SlotStatus::inconclusive();
            }
            Ok(LookupOutcome::NoRecords) => return SlotStatus::Free,
            Ok(LookupOutcome::Addresses(addresses)) => addresses,
        };

        if addresses.is_empty() {
            return SlotStatus::Free;
        }

        let reachable = if self.ports.is_empty() {
            None
        } else {
            Some(self.reachable(&addresses).await)
        };

        tracing::debug!(
            "{} resolves to {:?} (reachable: {:?})",
            fqdn,
            addresses,
            reachable
        );
        SlotStatus::Occupied {
            addresses,
            reachable,
        }
    }
}

impl std::fmt::Debug for DnsLivenessProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsLivenessProbe")
            .field("ports", &self.ports)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(LookupOutcome);

    #[async_trait]
    impl NameLookup for Scripted {
        async fn lookup(&self, _fqdn: &str) -> LookupOutcome {
            self.0.clone()
        }
    }

    struct Hanging;

    #[async_trait]
    impl NameLookup for Hanging {
        async fn lookup(&self, _fqdn: &str) -> LookupOutcome {
            std::future::pending().await
        }
    }

    fn probe(outcome: LookupOutcome) -> DnsLivenessProbe {
        DnsLivenessProbe::new(Arc::new(Scripted(outcome)), vec![], Duration::from_secs(2))
    }

    #[tokio::test]
    async fn lookup_failure_is_inconclusive() {
        let status = probe(LookupOutcome::Failed("SERVFAIL".into()))
            .probe("peer0.swarm.example.com")
            .await;
        assert_eq!(status, SlotStatus::inconclusive());
        assert!(!status.is_free());
    }

    #[tokio::test]
    async fn lookup_timeout_is_inconclusive() {
        let probe = DnsLivenessProbe::new(Arc::new(Hanging), vec![], Duration::from_millis(20));
        let status = probe.probe("peer0.swarm.example.com").await;
        assert_eq!(status, SlotStatus::inconclusive());
    }

    #[tokio::test]
    async fn no_records_is_free() {
        let status = probe(LookupOutcome::NoRecords)
            .probe("peer0.swarm.example.com")
            .await;
        assert_eq!(status, SlotStatus::Free);
    }

    #[tokio::test]
    async fn resolved_name_is_occupied() {
        let status = probe(LookupOutcome::Addresses(vec!["198.51.100.7".parse().unwrap()]))
            .probe("peer0.swarm.example.com")
            .await;
        assert_eq!(
            status,
            SlotStatus::Occupied {
                addresses: vec!["198.51.100.7".parse().unwrap()],
                reachable: None,
            }
        );
    }

    #[tokio::test]
    async fn listening_address_is_reachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = DnsLivenessProbe::new(
            Arc::new(Scripted(LookupOutcome::NoRecords)),
            vec![port],
            Duration::from_secs(2),
        );

        assert!(probe.reachable(&["127.0.0.1".parse().unwrap()]).await);
    }

    #[tokio::test]
    async fn reachability_annotates_occupied_slot() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = DnsLivenessProbe::new(
            Arc::new(Scripted(LookupOutcome::Addresses(vec![
                "127.0.0.1".parse().unwrap(),
            ]))),
            vec![port],
            Duration::from_secs(2),
        );

        let status = probe.probe("peer0.swarm.example.com").await;
        assert!(matches!(status, SlotStatus::Occupied { reachable: Some(true), .. }));
    }
}
