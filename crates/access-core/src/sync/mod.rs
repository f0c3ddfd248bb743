//! Update coordinator (sync path)
//!
//! One invocation publishes the host's current address for a single record
//! if, and only if, it changed and the debounce window has elapsed.
//!
//! ## Flow
//!
//! ```text
//! validate ─▶ run-lock ─▶ debounce ─▶ resolve ─▶ compare ─▶ update ─▶ persist
//!               │busy        │recent     │none      │same      │err/dry run
//!               ▼            ▼           ▼          ▼          ▼
//!           LockBusy      Skipped   AddressUnav.   NoOp     error / Simulated
//! ```
//!
//! The run-lock is held for the whole invocation. Sync state is written only
//! after the backend confirms, so the debounce window always measures time
//! since the last successful publish. A dry-run backend confirms nothing and
//! leaves state untouched.

pub mod lock;

pub use lock::{RunLock, RunLockGuard};

use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::address::AddressResolver;
use crate::config::SyncSettings;
use crate::error::Result;
use crate::record::{self, RecordUpdate};
use crate::traits::{DnsProvider, StateStore, SyncState, UpdateResult};

/// Outcome of one successful (non-error) sync invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The backend confirmed the record
    Updated(UpdateResult),
    /// The backend ran in dry-run mode; nothing was published or persisted
    Simulated(UpdateResult),
    /// Address equals the last confirmed one
    NoOp {
        /// Current address
        address: IpAddr,
    },
    /// Last successful publish is inside the debounce window
    Skipped,
    /// Another sync holds the run-lock
    LockBusy,
}

/// Lock-protected, debounced "update record if changed"
pub struct UpdateCoordinator {
    provider: Arc<dyn DnsProvider>,
    resolver: AddressResolver,
    state: Arc<dyn StateStore>,
    lock: RunLock,
    settings: SyncSettings,
}

impl UpdateCoordinator {
    /// Create a coordinator
    pub fn new(
        provider: Arc<dyn DnsProvider>,
        resolver: AddressResolver,
        state: Arc<dyn StateStore>,
        lock: RunLock,
        settings: SyncSettings,
    ) -> Self {
        Self {
            provider,
            resolver,
            state,
            lock,
            settings,
        }
    }

    /// Run one sync pass for `host.domain`
    ///
    /// Malformed names fail with `InvalidInput` before the lock is touched.
    pub async fn run(&self, domain: &str, host: &str) -> Result<SyncOutcome> {
        let record_name = record::record_name(domain, host)?;

        let Some(_guard) = self.lock.try_acquire()? else {
            info!("sync for {} already running; skipping", record_name);
            return Ok(SyncOutcome::LockBusy);
        };

        let previous = self.state.get(&record_name).await?;
        let window = chrono::Duration::seconds(self.settings.debounce_secs as i64);
        if let Some(state) = &previous {
            if state.within(window, chrono::Utc::now()) {
                debug!(
                    "{} synced at {}; inside {}s debounce window",
                    record_name, state.last_sync_timestamp, self.settings.debounce_secs
                );
                return Ok(SyncOutcome::Skipped);
            }
        }

        let address = self.resolver.resolve(self.settings.family).await?;

        if previous.as_ref().map(|s| s.last_known_address) == Some(address) {
            debug!("{} already at {}", record_name, address);
            return Ok(SyncOutcome::NoOp { address });
        }

        let record = RecordUpdate::for_ip(domain, host, address)?;
        let result = self.provider.apply(&record).await?;

        match &result {
            UpdateResult::Updated { previous_ip, new_ip } => {
                info!("Updated {} -> {} (previous: {:?})", record_name, new_ip, previous_ip);
            }
            UpdateResult::Created { new_ip } => {
                info!("Created record {} -> {}", record_name, new_ip);
            }
            UpdateResult::Unchanged { current_ip } => {
                info!("Record {} already held {}", record_name, current_ip);
            }
            UpdateResult::Simulated { new_ip, .. } => {
                info!("Dry run: {} -> {} not published", record_name, new_ip);
                return Ok(SyncOutcome::Simulated(result));
            }
        }

        self.state
            .set(&record_name, &SyncState::confirmed(address))
            .await?;

        Ok(SyncOutcome::Updated(result))
    }
}
