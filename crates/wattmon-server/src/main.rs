use anyhow::Result;
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;
use wattmon_alert::engine::AlertEngine;
use wattmon_storage::Store;

use wattmon_server::app;
use wattmon_server::config::ServerConfig;
use wattmon_server::rule_builder;
use wattmon_server::rule_seed;
use wattmon_server::scheduler::EvaluationScheduler;
use wattmon_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    wattmon_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("wattmon=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .get(1)
        .map(|s| s.as_str())
        .unwrap_or("config/server.toml");
    let config = ServerConfig::load(config_path)?;

    tracing::info!(
        http_port = config.http_port,
        data_dir = %config.data_dir,
        "wattmon-server starting"
    );

    if config.database_url.is_none() {
        std::fs::create_dir_all(&config.data_dir)?;
    }
    let store = Arc::new(Store::new(&config.connection_url()).await?);

    // Seed default rules on a fresh database
    if let Err(e) = rule_seed::init_default_rules(&store, &config.evaluation).await {
        tracing::error!(error = %e, "Failed to initialize default alert rules");
    }

    // Load the alert engine from stored rules
    let engine = Arc::new(Mutex::new(AlertEngine::new(vec![])));
    if let Err(e) = rule_builder::reload_alert_engine(&store, &engine).await {
        tracing::error!(error = %e, "Failed to load alert rules from DB");
    }

    let state = AppState {
        store: store.clone(),
        engine: engine.clone(),
        start_time: Utc::now(),
        config: Arc::new(config.clone()),
    };

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let app = app::build_http_app(state);
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    let http_server = axum::serve(http_listener, app);

    // Evaluation scheduler
    let scheduler_handle = if config.evaluation.enabled {
        let scheduler = EvaluationScheduler::new(store, engine, config.evaluation.clone());
        Some(tokio::spawn(async move {
            scheduler.run().await;
        }))
    } else {
        tracing::info!("Evaluation scheduler disabled");
        None
    };

    tracing::info!(http = %http_addr, "Server started");

    tokio::select! {
        result = http_server.with_graceful_shutdown(async { signal::ctrl_c().await.ok(); }) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("Shutting down gracefully");
        }
    }

    if let Some(h) = scheduler_handle {
        h.abort();
    }
    tracing::info!("Server stopped");

    Ok(())
}
