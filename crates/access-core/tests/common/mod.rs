//! Test doubles and common utilities for contract tests
//!
//! Minimal fakes that let the contract tests observe exactly which
//! backend calls, probes and address lookups happened.

#![allow(dead_code)]

use access_core::error::{Error, Result};
use access_core::record::{RecordType, RecordUpdate};
use access_core::traits::{
    Capabilities, DnsProvider, IpSource, IpVersion, ProviderInfo, SlotProbe, SlotStatus,
    UpdateResult,
};
use access_core::{DiscoveryConfig, ProviderCredentials};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const DOMAIN: &str = "swarm.example.com";
pub const PREFIX: &str = "peer";

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// Discovery configuration for the test zone, with a short scan depth
pub fn discovery_config() -> DiscoveryConfig {
    let mut config =
        DiscoveryConfig::new(DOMAIN, PREFIX, "test", ProviderCredentials::default());
    config.tuning.max_scan_depth = 16;
    config
}

const INFO: ProviderInfo = ProviderInfo {
    name: "recording",
    version: "0.0.0",
    capabilities: Capabilities {
        ipv4: true,
        ipv6: true,
        connection_test: false,
        dry_run: false,
    },
};

/// A DnsProvider holding records in memory and counting calls
///
/// Behaves like a real idempotent backend: writing an address a record
/// already holds is `Unchanged` and not counted as a write.
#[derive(Default)]
pub struct RecordingProvider {
    records: Mutex<HashMap<(String, RecordType), IpAddr>>,
    apply_calls: AtomicUsize,
    writes: AtomicUsize,
    published: Mutex<Vec<String>>,
}

impl RecordingProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of times apply() was reached
    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    /// Number of mutations
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// FQDNs passed to apply(), in order
    pub fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }

    /// Address currently held by `fqdn`
    pub fn record(&self, fqdn: &str, record_type: RecordType) -> Option<IpAddr> {
        self.records
            .lock()
            .unwrap()
            .get(&(fqdn.to_string(), record_type))
            .copied()
    }
}

#[async_trait::async_trait]
impl DnsProvider for RecordingProvider {
    fn info(&self) -> ProviderInfo {
        INFO
    }

    async fn apply(&self, record: &RecordUpdate) -> Result<UpdateResult> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        self.published.lock().unwrap().push(record.fqdn());

        let key = (record.fqdn(), record.record_type());
        let mut records = self.records.lock().unwrap();
        match records.insert(key, record.address()) {
            Some(previous) if previous == record.address() => Ok(UpdateResult::Unchanged {
                current_ip: previous,
            }),
            previous => {
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(match previous {
                    Some(previous) => UpdateResult::Updated {
                        previous_ip: Some(previous),
                        new_ip: record.address(),
                    },
                    None => UpdateResult::Created {
                        new_ip: record.address(),
                    },
                })
            }
        }
    }
}

/// A DnsProvider that blocks inside apply() until released
#[derive(Default)]
pub struct GatedProvider {
    pub entered: Notify,
    pub release: Notify,
    calls: AtomicUsize,
}

impl GatedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DnsProvider for GatedProvider {
    fn info(&self) -> ProviderInfo {
        INFO
    }

    async fn apply(&self, record: &RecordUpdate) -> Result<UpdateResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(UpdateResult::Created {
            new_ip: record.address(),
        })
    }
}

/// A DnsProvider whose every call fails with a transient error
#[derive(Default)]
pub struct FailingProvider {
    calls: AtomicUsize,
}

impl FailingProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DnsProvider for FailingProvider {
    fn info(&self) -> ProviderInfo {
        INFO
    }

    async fn apply(&self, _record: &RecordUpdate) -> Result<UpdateResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::transient(INFO.name, "HTTP 503"))
    }
}

/// A DnsProvider in dry-run mode: computes every write, sends none
pub struct DryRunProvider;

#[async_trait::async_trait]
impl DnsProvider for DryRunProvider {
    fn info(&self) -> ProviderInfo {
        INFO
    }

    async fn apply(&self, record: &RecordUpdate) -> Result<UpdateResult> {
        Ok(UpdateResult::Simulated {
            previous_ip: None,
            new_ip: record.address(),
        })
    }
}

/// An IpSource returning a settable address and counting lookups
pub struct FixedIpSource {
    address: Mutex<Option<IpAddr>>,
    calls: AtomicUsize,
}

impl FixedIpSource {
    pub fn new(address: IpAddr) -> Arc<Self> {
        Arc::new(Self {
            address: Mutex::new(Some(address)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set(&self, address: Option<IpAddr>) {
        *self.address.lock().unwrap() = address;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IpSource for FixedIpSource {
    async fn current(&self, family: Option<IpVersion>) -> Result<Option<IpAddr>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let address = *self.address.lock().unwrap();
        Ok(address.filter(|a| family.is_none_or(|f| f.matches(a))))
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// A scripted liveness oracle
///
/// Names not scripted are free. Every probe is recorded.
#[derive(Default)]
pub struct ScriptedProbe {
    script: Mutex<HashMap<String, SlotStatus>>,
    probed: Mutex<Vec<String>>,
}

impl ScriptedProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark `slot` of the test zone as held by `holder`
    pub fn occupy(&self, slot: u32, holder: IpAddr) {
        self.script.lock().unwrap().insert(
            slot_fqdn(slot),
            SlotStatus::Occupied {
                addresses: vec![holder],
                reachable: Some(true),
            },
        );
    }

    /// Mark `slot` as free again
    pub fn vacate(&self, slot: u32) {
        self.script.lock().unwrap().remove(&slot_fqdn(slot));
    }

    /// Names probed so far, in order
    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.probed.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl SlotProbe for ScriptedProbe {
    async fn probe(&self, fqdn: &str) -> SlotStatus {
        self.probed.lock().unwrap().push(fqdn.to_string());
        self.script
            .lock()
            .unwrap()
            .get(fqdn)
            .cloned()
            .unwrap_or(SlotStatus::Free)
    }
}

pub fn slot_fqdn(slot: u32) -> String {
    format!("{}{}.{}", PREFIX, slot, DOMAIN)
}
