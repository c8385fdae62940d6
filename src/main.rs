use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use storefront_identity::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let cfg = Config::from_env()?;

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "startup",
        "storefront identity starting: RUST_LOG='{}', bind={}:{}, access_ttl={}s, refresh_ttl={}s, confirmation_ttl={}s, admins={:?}, paid={:?}, mailgun={}",
        rust_log, cfg.bind, cfg.http_port, cfg.access_ttl_secs, cfg.refresh_ttl_secs, cfg.confirmation_ttl_secs,
        cfg.admin_ids, cfg.paid_ids, cfg.mailgun_domain.as_deref().unwrap_or("<unset>")
    );

    storefront_identity::server::run(cfg).await
}
