//! Peer discovery engine
//!
//! Leaderless slot allocation over DNS. Each peer claims the lowest slot
//! `prefix{N}.domain` whose name does not resolve, publishes its address
//! there, and keeps drifting toward slot 0 as lower slots free up.
//!
//! ## Monitor cycle
//!
//! ```text
//! load registration ──none──▶ discover (scan from 0, register)
//!        │
//!   probe 0..slot ──free──▶ migrate to first free slot
//!        │
//!   current slot held by another address ──▶ rescan from 0
//!        │
//!   address changed ──▶ republish same slot
//!        │
//!   heartbeat only (slot 0 reports already optimal)
//! ```
//!
//! A lower slot resolving to our own address is still occupied: peers
//! behind one NAT share a public address. Only the slot named in our own
//! persisted registration is reclaimed on a rescan.
//!
//! There is no cross-host lock. Two peers may transiently claim the same
//! slot; the loser notices on a later cycle that its slot resolves to
//! someone else and rescans.

pub mod probe;

pub use probe::{DnsLivenessProbe, LookupOutcome, NameLookup, SystemResolver};

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::address::AddressResolver;
use crate::config::{DiscoveryConfig, DiscoveryTuning};
use crate::error::{Error, Result};
use crate::sync::{SyncOutcome, UpdateCoordinator};
use crate::traits::{DnsProvider, PeerRegistration, PeerStore, SlotProbe};

/// What one monitor cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// No registration existed; a fresh discovery ran
    Discovered(PeerRegistration),
    /// Still holding slot 0; heartbeat refreshed
    AlreadyOptimal(PeerRegistration),
    /// Moved to a lower free slot
    Migrated {
        /// Slot left behind
        from: u32,
        /// New registration
        registration: PeerRegistration,
    },
    /// The current slot resolved to another address; rescanned from 0
    Rediscovered {
        /// Slot lost to another peer
        lost: u32,
        /// New registration
        registration: PeerRegistration,
    },
    /// Same slot, new address published
    Republished(PeerRegistration),
    /// Nothing changed; heartbeat refreshed
    Heartbeat(PeerRegistration),
}

impl MonitorOutcome {
    /// Registration after the cycle
    pub fn registration(&self) -> &PeerRegistration {
        match self {
            MonitorOutcome::Discovered(r)
            | MonitorOutcome::AlreadyOptimal(r)
            | MonitorOutcome::Republished(r)
            | MonitorOutcome::Heartbeat(r) => r,
            MonitorOutcome::Migrated { registration, .. }
            | MonitorOutcome::Rediscovered { registration, .. } => registration,
        }
    }
}

/// Slot probing, registration and self-healing
pub struct PeerDiscovery {
    domain: String,
    prefix: String,
    tuning: DiscoveryTuning,
    provider: Arc<dyn DnsProvider>,
    resolver: AddressResolver,
    probe: Arc<dyn SlotProbe>,
    peers: Arc<dyn PeerStore>,
    sync: Option<UpdateCoordinator>,
}

impl PeerDiscovery {
    /// Engine for the zone and prefix in `config`
    pub fn new(
        config: &DiscoveryConfig,
        provider: Arc<dyn DnsProvider>,
        resolver: AddressResolver,
        probe: Arc<dyn SlotProbe>,
        peers: Arc<dyn PeerStore>,
    ) -> Self {
        Self {
            domain: config.domain.to_ascii_lowercase(),
            prefix: config.host_prefix.to_ascii_lowercase(),
            tuning: config.tuning.clone(),
            provider,
            resolver,
            probe,
            peers,
            sync: None,
        }
    }

    /// Also run `coordinator` for the registered host on every daemon cycle
    pub fn with_auto_sync(mut self, coordinator: UpdateCoordinator) -> Self {
        self.sync = Some(coordinator);
        self
    }

    /// Host token of `slot`
    pub fn hostname(&self, slot: u32) -> String {
        format!("{}{}", self.prefix, slot)
    }

    /// FQDN of `slot`
    pub fn fqdn(&self, slot: u32) -> String {
        format!("{}{}.{}", self.prefix, slot, self.domain)
    }

    /// Linear scan from slot 0 for the first slot that may be claimed
    ///
    /// A slot is claimable when its name does not resolve, or when it is
    /// the slot of `own` and resolves only to `own.address`. Nothing past
    /// the returned slot is probed.
    pub async fn find_lowest_available_slot(
        &self,
        own: Option<&PeerRegistration>,
    ) -> Result<u32> {
        for slot in 0..self.tuning.max_scan_depth {
            let status = self.probe.probe(&self.fqdn(slot)).await;
            let ours = own.is_some_and(|r| r.slot == slot && status.held_only_by(r.address));
            if status.is_free() || ours {
                debug!("slot {} is available", slot);
                return Ok(slot);
            }
            debug!("slot {} occupied: {:?}", slot, status);
        }
        Err(Error::NoSlotAvailable(self.tuning.max_scan_depth))
    }

    /// Publish `address` at `slot` and persist the registration
    ///
    /// A backend failure is a hard failure; nothing is persisted. A dry-run
    /// backend publishes nothing, so its result is refused the same way.
    pub async fn register(&self, slot: u32, address: IpAddr) -> Result<PeerRegistration> {
        let hostname = self.hostname(slot);
        let result = self
            .provider
            .update(&self.domain, &hostname, &address.to_string(), None)
            .await?;
        debug!("publish {}: {:?}", self.fqdn(slot), result);
        if !result.is_confirmed() {
            return Err(Error::rejected(
                self.provider.info().name,
                format!("dry run; {} not published", self.fqdn(slot)),
            ));
        }

        let registration = PeerRegistration::claimed(slot, hostname, &self.domain, address);
        self.peers.save(&registration).await?;
        info!("registered {} -> {}", registration.fqdn, address);
        Ok(registration)
    }

    /// Resolve the local address, find the lowest free slot and claim it
    pub async fn discover(&self) -> Result<PeerRegistration> {
        let address = self.resolver.resolve(self.tuning.address_family).await?;
        let own = self.peers.load().await?;
        let slot = self.find_lowest_available_slot(own.as_ref()).await?;
        self.register(slot, address).await
    }

    /// Current registration, if any
    pub async fn status(&self) -> Result<Option<PeerRegistration>> {
        self.peers.load().await
    }

    /// One self-healing pass
    pub async fn monitor(&self) -> Result<MonitorOutcome> {
        let Some(mut current) = self.peers.load().await? else {
            info!("no registration; discovering");
            return self.discover().await.map(MonitorOutcome::Discovered);
        };

        let address = self.resolver.resolve(self.tuning.address_family).await?;

        for slot in 0..current.slot {
            let status = self.probe.probe(&self.fqdn(slot)).await;
            if status.is_free() {
                info!("slot {} is free; migrating from {}", slot, current.slot);
                let registration = self.register(slot, address).await?;
                return Ok(MonitorOutcome::Migrated {
                    from: current.slot,
                    registration,
                });
            }
        }

        let status = self.probe.probe(&current.fqdn).await;
        if status.held_by_other(address) && status.held_by_other(current.address) {
            warn!(
                "{} now resolves to another peer; rescanning",
                current.fqdn
            );
            let registration = self.discover().await?;
            return Ok(MonitorOutcome::Rediscovered {
                lost: current.slot,
                registration,
            });
        }

        if current.address != address {
            info!(
                "address changed {} -> {}; republishing {}",
                current.address, address, current.fqdn
            );
            let registration = self.register(current.slot, address).await?;
            return Ok(MonitorOutcome::Republished(registration));
        }

        current.touch();
        self.peers.save(&current).await?;
        if current.slot == 0 {
            Ok(MonitorOutcome::AlreadyOptimal(current))
        } else {
            Ok(MonitorOutcome::Heartbeat(current))
        }
    }

    /// Sleep before the next cycle: short while not in slot 0
    pub fn next_interval(&self, slot: Option<u32>) -> Duration {
        match slot {
            Some(0) => Duration::from_secs(self.tuning.steady_interval_secs),
            _ => Duration::from_secs(self.tuning.fast_interval_secs),
        }
    }

    /// Loop monitor cycles until shutdown
    ///
    /// Shutdown is honoured only between cycles. With `None`, Ctrl-C stops
    /// the loop.
    pub async fn run_daemon(&self, shutdown: Option<oneshot::Receiver<()>>) -> Result<()> {
        let mut shutdown = shutdown;
        info!(
            "daemon started for {}{{N}}.{}",
            self.prefix, self.domain
        );

        loop {
            let slot = self.cycle().await;
            let interval = self.next_interval(slot);
            debug!("next cycle in {:?}", interval);

            let stop = match shutdown.as_mut() {
                Some(rx) => tokio::select! {
                    _ = tokio::time::sleep(interval) => false,
                    _ = rx => true,
                },
                None => tokio::select! {
                    _ = tokio::time::sleep(interval) => false,
                    _ = tokio::signal::ctrl_c() => true,
                },
            };

            if stop {
                info!("Shutdown signal received");
                break;
            }
        }

        Ok(())
    }

    /// One daemon cycle; returns the slot held afterwards
    async fn cycle(&self) -> Option<u32> {
        let registration = match self.monitor().await {
            Ok(outcome) => {
                log_outcome(&outcome);
                Some(outcome.registration().clone())
            }
            Err(Error::NoSlotAvailable(depth)) => {
                warn!("no free slot within {} slots; nothing published", depth);
                None
            }
            Err(e) if e.is_transient() => {
                warn!("monitor cycle failed: {}", e);
                self.peers.load().await.ok().flatten()
            }
            Err(e) => {
                error!("monitor cycle failed: {}", e);
                self.peers.load().await.ok().flatten()
            }
        };

        if let (Some(sync), Some(reg)) = (&self.sync, &registration) {
            match sync.run(&self.domain, &reg.hostname).await {
                Ok(SyncOutcome::Updated(result)) => info!("sync {}: {:?}", reg.fqdn, result),
                Ok(outcome) => debug!("sync {}: {:?}", reg.fqdn, outcome),
                Err(e) => error!("sync {} failed: {}", reg.fqdn, e),
            }
        }

        registration.map(|r| r.slot)
    }
}

fn log_outcome(outcome: &MonitorOutcome) {
    match outcome {
        MonitorOutcome::Discovered(r) => info!("discovered slot {} ({})", r.slot, r.fqdn),
        MonitorOutcome::AlreadyOptimal(r) => debug!("holding optimal slot {}", r.fqdn),
        MonitorOutcome::Migrated { from, registration } => {
            info!("migrated from slot {} to {}", from, registration.fqdn)
        }
        MonitorOutcome::Rediscovered { lost, registration } => {
            info!("lost slot {}; now {}", lost, registration.fqdn)
        }
        MonitorOutcome::Republished(r) => info!("republished {} -> {}", r.fqdn, r.address),
        MonitorOutcome::Heartbeat(r) => debug!("heartbeat {}", r.fqdn),
    }
}

impl std::fmt::Debug for PeerDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerDiscovery")
            .field("domain", &self.domain)
            .field("prefix", &self.prefix)
            .field("provider", &self.provider.info().name)
            .field("resolver", &self.resolver)
            .field("auto_sync", &self.sync.is_some())
            .finish()
    }
}
