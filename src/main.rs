//! Claim Wager Authority
//!
//! Runs the settlement authority behind its WebSocket server, with an
//! optional in-process resolver and clarity advisor.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use claim_wager::{
    VERSION,
    authority::{AccountHandle, ClaimLedger, ProtocolConfig, SettlementAuthority},
    core::clock::{Clock, SystemClock},
    network::{AuthConfig, AuthorityServer, ServerConfig},
    resolver::{ResolverConfig, ResolverTask},
    services::{WebhookClarityAdvisor, WebhookResolutionSource},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    info!("Claim Wager Authority v{}", VERSION);

    let server_config = ServerConfig::from_env();
    let auth_config = AuthConfig::from_env();
    let protocol_config = ProtocolConfig::from_env();
    let resolver_config = ResolverConfig::from_env();
    let snapshot_path = std::env::var("SNAPSHOT_PATH").ok().map(PathBuf::from);
    let snapshot_interval = std::env::var("SNAPSHOT_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(5));

    if !auth_config.is_configured() {
        warn!("No AUTH_SECRET or AUTH_PUBLIC_KEY_PEM set; submissions will be refused");
    }
    info!(
        "Auto-settle at {}% confidence, {} resolvers, {} arbiters",
        protocol_config.auto_settle_threshold,
        protocol_config.resolvers.len(),
        protocol_config.arbiters.len()
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut authority = SettlementAuthority::new(&protocol_config, clock.clone());
    if let Some(path) = &snapshot_path {
        let ledger = ClaimLedger::load(path)
            .await
            .with_context(|| format!("Failed to load snapshot {}", path.display()))?;
        authority = authority.with_ledger(ledger);
    }
    let authority = Arc::new(authority);

    let mut server = AuthorityServer::new(server_config, auth_config, authority.clone());
    if let Some(url) = &resolver_config.clarity_webhook {
        info!("Clarity checks via {}", url);
        server = server.with_advisor(Arc::new(WebhookClarityAdvisor::new(url.clone(), resolver_config.request_timeout)));
    }
    let server = Arc::new(server);

    let (stop_tx, _) = broadcast::channel::<()>(1);

    // Resolver
    let resolver_handle = match (&resolver_config.verdict_webhook, resolver_config.account) {
        (Some(url), Some(account)) => {
            info!("Resolver polling every {:?} as {}", resolver_config.poll_interval, account.short());
            let handle = Arc::new(AccountHandle::new(authority.clone(), account));
            let source = Arc::new(WebhookResolutionSource::new(url.clone(), resolver_config.request_timeout));
            let task = ResolverTask::new(handle, source, clock.clone());
            let period = resolver_config.poll_interval;
            let stop_rx = stop_tx.subscribe();
            Some(tokio::spawn(async move { task.run(period, stop_rx).await }))
        }
        _ => {
            info!("Resolver disabled (set RESOLVER_VERDICT_WEBHOOK and RESOLVER_ACCOUNT)");
            None
        }
    };

    // Snapshots
    let snapshot_handle = snapshot_path.clone().map(|path| {
        let authority = authority.clone();
        let stop_rx = stop_tx.subscribe();
        tokio::spawn(async move { authority.run_snapshots(path, snapshot_interval, stop_rx).await })
    });

    let running = server.clone();
    let mut server_handle = tokio::spawn(async move { running.run().await });

    let finished = tokio::select! {
        result = shutdown_signal() => {
            result.context("Failed to listen for shutdown signals")?;
            None
        }
        joined = &mut server_handle => Some(joined),
    };

    server.shutdown();
    let _ = stop_tx.send(());

    let joined = match finished {
        Some(joined) => joined,
        None => server_handle.await,
    };
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Server error: {}", e),
        Err(e) => error!("Server task failed: {}", e),
    }
    if let Some(handle) = resolver_handle {
        let _ = handle.await;
    }
    if let Some(handle) = snapshot_handle {
        let _ = handle.await;
    }

    info!("Stopped");
    Ok(())
}

/// Resolve on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Ctrl-C received, shutting down");
            }
            _ = terminate.recv() => info!("SIGTERM received, shutting down"),
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Ctrl-C received, shutting down");
        Ok(())
    }
}
