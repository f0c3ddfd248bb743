//! Contract Test: Sync Path Debounce & Mutual Exclusion
//!
//! Constraints verified:
//! - Two runs within the debounce window of a success both succeed and
//!   write at most once; the second does not even resolve the address
//! - The debounce window is measured from the last successful publish
//! - Two racing runs: exactly one reaches the backend, the other observes
//!   LockBusy
//! - An unavailable address is an error and leaves state untouched

mod common;

use access_core::sync::{RunLock, SyncOutcome, UpdateCoordinator};
use access_core::traits::{StateStore, SyncState, UpdateResult};
use access_core::{AddressResolver, Error, MemoryStateStore, SyncSettings};
use common::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn coordinator(
    provider: Arc<dyn access_core::DnsProvider>,
    source: Arc<FixedIpSource>,
    state: Arc<MemoryStateStore>,
    lock_dir: &Path,
) -> UpdateCoordinator {
    UpdateCoordinator::new(
        provider,
        AddressResolver::new(vec![source]),
        state,
        RunLock::new(lock_dir.join("sync.lock")),
        SyncSettings::default(),
    )
}

#[tokio::test]
async fn second_run_inside_window_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let provider = RecordingProvider::new();
    let source = FixedIpSource::new(ip("203.0.113.30"));
    let state = Arc::new(MemoryStateStore::new());
    let sync = coordinator(provider.clone(), source.clone(), state.clone(), dir.path());

    let first = sync.run(DOMAIN, "peer0").await.unwrap();
    let second = sync.run(DOMAIN, "peer0").await.unwrap();

    assert!(matches!(first, SyncOutcome::Updated(_)));
    assert_eq!(second, SyncOutcome::Skipped);
    assert_eq!(provider.writes(), 1);
    // Debounce is checked before resolving
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn changed_address_waits_for_window() {
    let dir = tempfile::tempdir().unwrap();
    let provider = RecordingProvider::new();
    let source = FixedIpSource::new(ip("203.0.113.31"));
    let state = Arc::new(MemoryStateStore::new());
    let sync = coordinator(provider.clone(), source.clone(), state.clone(), dir.path());

    sync.run(DOMAIN, "peer0").await.unwrap();
    source.set(Some(ip("203.0.113.32")));
    assert_eq!(sync.run(DOMAIN, "peer0").await.unwrap(), SyncOutcome::Skipped);
    assert_eq!(provider.writes(), 1);

    // Pretend the last success happened 121 seconds ago
    let aged = SyncState::confirmed_at(
        ip("203.0.113.31"),
        chrono::Utc::now() - chrono::Duration::seconds(121),
    );
    state.set(&slot_fqdn(0), &aged).await.unwrap();

    let outcome = sync.run(DOMAIN, "peer0").await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Updated(UpdateResult::Updated {
            previous_ip: Some(ip("203.0.113.31")),
            new_ip: ip("203.0.113.32"),
        })
    );
    assert_eq!(
        state.get(&slot_fqdn(0)).await.unwrap().map(|s| s.last_known_address),
        Some(ip("203.0.113.32"))
    );
}

#[tokio::test]
async fn unchanged_address_after_window_is_noop_without_touching_state() {
    let dir = tempfile::tempdir().unwrap();
    let provider = RecordingProvider::new();
    let source = FixedIpSource::new(ip("203.0.113.33"));
    let state = Arc::new(MemoryStateStore::new());
    let sync = coordinator(provider.clone(), source, state.clone(), dir.path());

    let synced_at = chrono::Utc::now() - chrono::Duration::seconds(600);
    let aged = SyncState::confirmed_at(ip("203.0.113.33"), synced_at);
    state.set(&slot_fqdn(0), &aged).await.unwrap();

    let outcome = sync.run(DOMAIN, "peer0").await.unwrap();

    assert_eq!(
        outcome,
        SyncOutcome::NoOp {
            address: ip("203.0.113.33")
        }
    );
    assert_eq!(provider.apply_calls(), 0);
    // No-op paths never move the timestamp
    assert_eq!(
        state.get(&slot_fqdn(0)).await.unwrap().unwrap().last_sync_timestamp,
        synced_at
    );
}

#[tokio::test]
async fn racing_runs_reach_backend_once() {
    let dir = tempfile::tempdir().unwrap();
    let provider = GatedProvider::new();
    let source = FixedIpSource::new(ip("203.0.113.34"));
    let state = Arc::new(MemoryStateStore::new());

    let first = coordinator(provider.clone(), source.clone(), state.clone(), dir.path());
    let second = coordinator(provider.clone(), source.clone(), state.clone(), dir.path());

    let running = tokio::spawn(async move { first.run(DOMAIN, "peer0").await });

    // Wait until the first run is inside the backend, holding the lock
    tokio::time::timeout(Duration::from_secs(5), provider.entered.notified())
        .await
        .expect("first run reached the backend");

    let raced = second.run(DOMAIN, "peer0").await.unwrap();
    assert_eq!(raced, SyncOutcome::LockBusy);

    provider.release.notify_one();
    let finished = running.await.unwrap().unwrap();

    assert!(matches!(finished, SyncOutcome::Updated(_)));
    assert_eq!(provider.calls(), 1);

    // Lock released on completion
    let again = second.run(DOMAIN, "peer0").await.unwrap();
    assert_eq!(again, SyncOutcome::Skipped);
}

#[tokio::test]
async fn missing_address_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let provider = RecordingProvider::new();
    let source = FixedIpSource::new(ip("203.0.113.35"));
    source.set(None);
    let state = Arc::new(MemoryStateStore::new());
    let sync = coordinator(provider.clone(), source, state.clone(), dir.path());

    let err = sync.run(DOMAIN, "peer0").await.unwrap_err();

    assert!(matches!(err, Error::AddressUnavailable(_)));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(provider.apply_calls(), 0);
    assert!(state.is_empty().await);
}
