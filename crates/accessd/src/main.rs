// # access
//
// Thin command-line layer over access-core. All discovery, sync and DNS
// logic lives in the library crates; this binary reads configuration,
// wires the components together and maps errors to exit codes.
//
// ## Files
//
// Everything lives under `$ACCESS_CONFIG_DIR` (default `~/.config/access`):
// `discovery.json` (written by `setup`), `peer.json`, `sync-state.json`
// and `sync.lock`.
//
// ## Environment
//
// - `ACCESS_CONFIG_DIR`: configuration directory
// - `ACCESS_LOG_LEVEL`: trace, debug, info, warn or error (default info)
// - `ACCESS_DISCOVERY_DOMAIN`, `ACCESS_DISCOVERY_PREFIX`, `ACCESS_DNS_PROVIDER`,
//   `ACCESS_DNS_KEY`, `ACCESS_DNS_SECRET`, `ACCESS_CLOUDFLARE_EMAIL`,
//   `ACCESS_CLOUDFLARE_ZONE_ID`, `ACCESS_DNS_EXTRA_<FIELD>`: non-interactive setup
//
// ## Example
//
// ```bash
// export ACCESS_DISCOVERY_DOMAIN=swarm.example.com
// export ACCESS_DNS_PROVIDER=cloudflare
// export ACCESS_DNS_KEY=your_token
// access setup && access discover
// ```

mod setup;

use access_core::{
    AddressResolver, ConfigPaths, DiscoveryConfig, DnsLivenessProbe, DnsProvider, FilePeerStore,
    FileStateStore, IpSource, PeerDiscovery, PeerStore, ProviderRegistry, RunLock, SyncOutcome,
    SyncSettings, UpdateCoordinator,
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for the `access` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessExitCode {
    /// Success, or a benign skip
    Success = 0,
    /// Any failure
    Failure = 1,
    /// Configuration missing or incomplete
    ConfigMissing = 6,
}

impl AccessExitCode {
    fn from_error(error: &anyhow::Error) -> Self {
        match error.downcast_ref::<access_core::Error>().map(|e| e.exit_code()) {
            Some(access_core::error::EXIT_OK) => AccessExitCode::Success,
            Some(access_core::error::EXIT_CONFIG_MISSING) => AccessExitCode::ConfigMissing,
            _ => AccessExitCode::Failure,
        }
    }
}

impl From<AccessExitCode> for ExitCode {
    fn from(code: AccessExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Dynamic DNS with self-assigned peer slots
#[derive(Debug, Parser)]
#[command(name = "access", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write the discovery configuration (prompts on a terminal, else reads ACCESS_* variables)
    Setup,
    /// Claim the lowest free peer slot
    Discover,
    /// Run one self-healing cycle
    Monitor,
    /// Run monitor cycles until SIGTERM or SIGINT
    Daemon,
    /// Print the current registration as JSON
    Status,
    /// Publish this host's address if it changed
    Sync {
        /// Host label to update (default: the registered peer host)
        #[arg(long)]
        host: Option<String>,
    },
    /// Check that the configured provider accepts the credentials
    Test,
    /// List available DNS providers and their settings
    Providers,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match std::env::var("ACCESS_LOG_LEVEL")
        .unwrap_or_default()
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("access: error: failed to set tracing subscriber: {}", e);
        return AccessExitCode::Failure.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("access: error: failed to create tokio runtime: {}", e);
            return AccessExitCode::Failure.into();
        }
    };

    match rt.block_on(run(cli.command)) {
        Ok(()) => AccessExitCode::Success.into(),
        Err(e) => {
            let code = AccessExitCode::from_error(&e);
            if code == AccessExitCode::Success {
                info!("{:#}", e);
            } else {
                eprintln!("access: error: {:#}", e);
            }
            code.into()
        }
    }
}

async fn run(command: Command) -> Result<()> {
    let paths = ConfigPaths::from_env()?;
    let registry = ProviderRegistry::new();
    access_providers::register_all(&registry);

    match command {
        Command::Setup => setup(&paths, &registry).await,
        Command::Providers => {
            print_providers(&registry)?;
            Ok(())
        }
        Command::Test => {
            let config = DiscoveryConfig::load_required(&paths.discovery()).await?;
            let provider = registry.create_provider(&config.dns_provider, &config.credentials())?;
            provider.test().await?;
            println!("{}: connection OK", config.dns_provider);
            Ok(())
        }
        Command::Sync { host } => {
            let config = DiscoveryConfig::load_required(&paths.discovery()).await?;
            let host = match host {
                Some(host) => host,
                None => FilePeerStore::new(paths.peer_state())
                    .load()
                    .await?
                    .map(|r| r.hostname)
                    .ok_or_else(|| {
                        access_core::Error::config_missing(
                            "no registered peer host; pass --host or run `access discover`",
                        )
                    })?,
            };
            let provider = build_provider(&registry, &config)?;
            let coordinator = build_coordinator(&paths, &config, provider).await?;
            match coordinator.run(&config.domain, &host).await? {
                SyncOutcome::Updated(result) => {
                    println!("{}.{}: {}", host, config.domain, result.address())
                }
                SyncOutcome::Simulated(result) => println!(
                    "{}.{}: {} (dry run, not published)",
                    host,
                    config.domain,
                    result.address()
                ),
                outcome => info!("{}.{}: {:?}", host, config.domain, outcome),
            }
            Ok(())
        }
        Command::Discover => {
            let discovery = build_discovery(&registry, &paths).await?;
            let registration = discovery.discover().await?;
            println!("{}", registration.fqdn);
            Ok(())
        }
        Command::Monitor => {
            let discovery = build_discovery(&registry, &paths).await?;
            let outcome = discovery.monitor().await?;
            debug!("{:?}", outcome);
            println!("{}", outcome.registration().fqdn);
            Ok(())
        }
        Command::Status => {
            let peers = FilePeerStore::new(paths.peer_state());
            match peers.load().await? {
                Some(registration) => println!("{}", serde_json::to_string_pretty(&registration)?),
                None => println!("not registered"),
            }
            Ok(())
        }
        Command::Daemon => {
            let discovery = build_discovery(&registry, &paths).await?;
            let (tx, rx) = oneshot::channel();
            let signals = tokio::spawn(async move {
                match wait_for_shutdown().await {
                    Ok(signal) => info!("Received shutdown signal: {}", signal),
                    Err(e) => error!("Shutdown handler error: {}", e),
                }
                let _ = tx.send(());
            });

            let result = discovery.run_daemon(Some(rx)).await;
            signals.abort();
            info!("Daemon stopped");
            result.map_err(Into::into)
        }
    }
}

async fn setup(paths: &ConfigPaths, registry: &ProviderRegistry) -> Result<()> {
    let mut config = if std::io::stdin().is_terminal() {
        tokio::task::block_in_place(|| {
            let stdin = std::io::stdin();
            let mut input = stdin.lock();
            let mut output = std::io::stdout();
            setup::prompt_config(registry, &mut input, &mut output)
        })?
    } else {
        DiscoveryConfig::from_env()?
    };

    // Fail setup now rather than on the first sync
    registry.create_provider(&config.dns_provider, &config.credentials())?;

    let path = paths.discovery();
    config.save(&path).await?;
    info!("Configuration saved to {}", path.display());
    println!("Saved {}", path.display());
    Ok(())
}

fn print_providers(registry: &ProviderRegistry) -> Result<()> {
    for name in registry.list_providers() {
        let (info, fields) = registry.describe(&name)?;
        println!("{} ({})", info.name, info.version);
        for field in fields {
            let requirement = if field.required { "required" } else { "optional" };
            match field.default {
                Some(default) if !default.is_empty() => println!(
                    "    {:<16} {:<9} {} [default: {}]",
                    field.name, requirement, field.description, default
                ),
                _ => println!(
                    "    {:<16} {:<9} {}",
                    field.name, requirement, field.description
                ),
            }
        }
    }
    Ok(())
}

fn build_provider(registry: &ProviderRegistry, config: &DiscoveryConfig) -> Result<Arc<dyn DnsProvider>> {
    let provider = registry.create_provider(&config.dns_provider, &config.credentials())?;
    Ok(Arc::from(provider))
}

/// Interface addresses first, then the HTTP echo services
fn build_resolver() -> AddressResolver {
    let mut sources: Vec<Arc<dyn IpSource>> = Vec::new();

    #[cfg(feature = "iface")]
    sources.push(Arc::new(access_ip_iface::InterfaceIpSource::new()));

    #[cfg(feature = "http")]
    sources.push(Arc::new(access_ip_http::HttpIpSource::new()));

    AddressResolver::new(sources)
}

async fn build_coordinator(
    paths: &ConfigPaths,
    config: &DiscoveryConfig,
    provider: Arc<dyn DnsProvider>,
) -> Result<UpdateCoordinator> {
    let state = FileStateStore::new(paths.sync_state()).await?;
    let settings = SyncSettings {
        family: config.tuning.address_family,
        ..SyncSettings::default()
    };
    Ok(UpdateCoordinator::new(
        provider,
        build_resolver(),
        Arc::new(state),
        RunLock::new(paths.sync_lock()),
        settings,
    ))
}

async fn build_discovery(registry: &ProviderRegistry, paths: &ConfigPaths) -> Result<PeerDiscovery> {
    let config = DiscoveryConfig::load_required(&paths.discovery()).await?;
    let provider = build_provider(registry, &config)?;

    let mut discovery = PeerDiscovery::new(
        &config,
        Arc::clone(&provider),
        build_resolver(),
        Arc::new(DnsLivenessProbe::from_tuning(&config.tuning)?),
        Arc::new(FilePeerStore::new(paths.peer_state())),
    );
    if config.enable_auto_sync {
        discovery = discovery.with_auto_sync(build_coordinator(paths, &config, provider).await?);
    }
    Ok(discovery)
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for Ctrl-C
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use access_core::Error;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sync_accepts_host_flag() {
        let cli = Cli::try_parse_from(["access", "sync", "--host", "gateway"]).unwrap();
        assert!(matches!(cli.command, Command::Sync { host: Some(ref h) } if h == "gateway"));

        let cli = Cli::try_parse_from(["access", "sync"]).unwrap();
        assert!(matches!(cli.command, Command::Sync { host: None }));
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["access", "teleport"]).is_err());
        assert!(Cli::try_parse_from(["access"]).is_err());
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        let missing = anyhow::Error::from(Error::config_missing("no discovery.json"));
        assert_eq!(AccessExitCode::from_error(&missing), AccessExitCode::ConfigMissing);

        let busy = anyhow::Error::from(Error::LockBusy("sync.lock".into()));
        assert_eq!(AccessExitCode::from_error(&busy), AccessExitCode::Success);

        let auth = anyhow::Error::from(Error::auth("godaddy", "401"));
        assert_eq!(AccessExitCode::from_error(&auth), AccessExitCode::Failure);

        let other = anyhow::anyhow!("runtime failed");
        assert_eq!(AccessExitCode::from_error(&other), AccessExitCode::Failure);
        assert_eq!(AccessExitCode::ConfigMissing as u8, 6);
    }
}
