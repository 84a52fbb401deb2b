//! Warden kernel binary
//!
//! Bootstraps the site-status service: configuration, logging, document
//! stores, signal dispatch (MQTT optional) and the REST API.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use warden_kernel::config::{config_path, load_config};
use warden_kernel::http::{self, AppState};
use warden_kernel::models::SiteRecord;
use warden_kernel::mqtt::MqttPublisher;
use warden_kernel::{logging, Dispatcher, HttpSiteConnection, JsonFileStore, ModuleEntry, SiteService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let cfg = load_config(&config_path()).await;
    logging::init(&cfg.logging.filter);

    std::fs::create_dir_all(&cfg.data_dir)
        .with_context(|| format!("failed to create data dir {}", cfg.data_dir.display()))?;

    let sites = Arc::new(JsonFileStore::<SiteRecord>::open(cfg.sites_file()).context("failed to open site store")?);
    let modules =
        Arc::new(JsonFileStore::<ModuleEntry>::open(cfg.modules_file()).context("failed to open module store")?);

    let dispatcher = Arc::new(Dispatcher::new());
    match &cfg.mqtt {
        Some(mqtt) => {
            dispatcher.subscribe_all(Arc::new(MqttPublisher::connect(mqtt)));
            tracing::info!(host = %mqtt.host, port = mqtt.port, "signals forwarded to MQTT");
        }
        None => tracing::info!("no MQTT broker configured, signals stay local"),
    }

    let connection = HttpSiteConnection::new(Duration::from_secs(cfg.refresh.timeout_secs))
        .context("failed to build HTTP client")?;

    let service = SiteService::new(sites, modules, dispatcher, Arc::new(connection))
        .with_catalog_policy(cfg.catalog)
        .with_report_path(cfg.refresh.report_path.clone());

    let api_key = std::env::var("WARDEN_API_KEY").ok().filter(|k| !k.is_empty());
    if api_key.is_none() {
        tracing::warn!("WARDEN_API_KEY not set - every route except /health will refuse requests");
    }

    let app = http::build_router(AppState {
        service: Arc::new(service),
        api_key: api_key.map(Arc::from),
    });

    let listener = TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("failed to bind {}", cfg.http.bind))?;
    tracing::info!("listening on http://{}", cfg.http.bind);
    axum::serve(listener, app).await?;
    Ok(())
}
