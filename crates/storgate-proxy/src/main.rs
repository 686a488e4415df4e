use storgate_proxy::{ProxyConfig, observability, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::var("STORGATE_CONFIG").ok();
    let config = ProxyConfig::load(config_path.as_deref())?;

    observability::init_tracing(&config.logging, &config.otel);
    if let Some(path) = config_path {
        let _log_watcher = server::spawn_logging_reload(path);
    }

    server::run(config).await
}
