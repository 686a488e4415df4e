//! Server assembly: state construction, background tasks, and the listen
//! loop.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use storgate_config::{ConfigStore, FileConfigStore};
use storgate_ledger::{FenceSweeper, QuotaLedger};
use storgate_policy::PolicyClient;
use storgate_store::{KvStore, MemoryKvStore, RedisKvStore};
use storgate_token::{TokenAuthority, TokenConfig};

use crate::config::ProxyConfig;
use crate::handlers;
use crate::state::AppState;

/// Builds the application state from configuration.
pub async fn build_state(config: &ProxyConfig) -> anyhow::Result<(AppState, Arc<dyn KvStore>)> {
    let store: Arc<dyn KvStore> = match &config.store.redis_url {
        Some(url) => {
            let redis = RedisKvStore::from_url(url).context("building redis pool")?;
            redis.ping().await.context("reaching the shared store")?;
            info!("connected to shared store");
            Arc::new(redis)
        }
        None => {
            warn!("no shared store configured; using process-local state (single replica only)");
            Arc::new(MemoryKvStore::new())
        }
    };

    let secret = std::fs::read(&config.token.secret_path).with_context(|| {
        format!(
            "reading signing secret from {}",
            config.token.secret_path.display()
        )
    })?;

    let tokens = Arc::new(TokenAuthority::new(
        &secret,
        TokenConfig {
            issuer: config.token.issuer.clone(),
            audience: config.token.audience.clone(),
            access_lifetime: time::Duration::seconds(config.token.access_lifetime_secs),
            refresh_lifetime: time::Duration::seconds(config.token.refresh_lifetime_secs),
        },
        store.clone(),
    ));

    let policy = PolicyClient::new(&config.policy.url, config.policy_timeout())
        .context("building policy client")?;
    let ledger = QuotaLedger::new(store.clone());

    let config_store = FileConfigStore::load(
        &config.documents.storage_path,
        &config.documents.roles_path,
        store.clone(),
    )
    .context("loading configuration documents")?;
    let _watcher = storgate_config::start_watcher(config_store.clone());

    let state = AppState::new(
        tokens,
        policy,
        ledger,
        config_store as Arc<dyn ConfigStore>,
        config.login_timeout(),
        config.session_ttl(),
        config.forward_timeout(),
    )
    .map_err(|e| anyhow::anyhow!("building state: {e}"))?;

    Ok((state, store))
}

/// Runs the proxy until interrupted.
pub async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    let (state, store) = build_state(&config).await?;
    let _invalidation = state.spawn_cache_invalidation();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = FenceSweeper::new(store)
        .with_fence_after(config.fence_after())
        .with_interval(config.sweep_interval());
    let sweeper_task = tokio::spawn(sweeper.run(shutdown_rx));

    let app = handlers::router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.listen.port))
        .await
        .with_context(|| format!("binding port {}", config.listen.port))?;
    info!(port = config.listen.port, "storgate proxy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("serving")?;

    let _ = shutdown_tx.send(true);
    let _ = sweeper_task.await;
    Ok(())
}

/// Watches the proxy configuration file and applies logging changes at
/// runtime. Only the `logging` section is hot; everything else needs a
/// restart.
pub fn spawn_logging_reload(path: String) -> Option<std::thread::JoinHandle<()>> {
    use notify::{RecursiveMode, Watcher, recommended_watcher};
    use std::time::{Duration, Instant};

    let watched = std::path::PathBuf::from(&path);
    if !watched.exists() {
        return None;
    }

    Some(std::thread::spawn(move || {
        let mut last = Instant::now() - Duration::from_secs(1);
        let reload_path = path.clone();
        let mut watcher = match recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
            if res.is_err() {
                return;
            }
            if last.elapsed() < Duration::from_millis(500) {
                return;
            }
            last = Instant::now();
            match ProxyConfig::load(Some(&reload_path)) {
                Ok(new_config) => {
                    crate::observability::apply_logging_level(&new_config.logging.level);
                    info!(level = %new_config.logging.level, "logging level reloaded");
                }
                Err(e) => warn!(error = %e, "config reload failed"),
            }
        }) {
            Ok(w) => w,
            Err(e) => {
                warn!(error = %e, "failed to start config watcher");
                return;
            }
        };

        if watcher.watch(&watched, RecursiveMode::NonRecursive).is_err() {
            return;
        }
        loop {
            std::thread::park();
        }
    }))
}
