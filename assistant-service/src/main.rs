use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod amortization;
mod api;
mod auth;
mod bot;
mod config;
mod db;
mod dialogue;
mod error;
mod i18n;
mod scheduler;
mod service;
mod websocket;

use crate::api::AppState;
use crate::auth::TokenAuthority;
use crate::bot::telegram::{TelegramClient, TelegramUpdates};
use crate::bot::{ChatBot, run_updates};
use crate::config::load_static_config;
use crate::db::Database;
use crate::dialogue::DialogueStore;
use crate::i18n::I18n;
use crate::scheduler::RecurringScheduler;
use crate::service::AssistantService;
use crate::websocket::EventHub;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    info!(
        "Starting assistant service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = load_static_config()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        "Configuration loaded"
    );

    let db_path = config.storage.data_dir.join("assistant.db");
    let db = Arc::new(Database::open(&db_path)?);
    info!(path = %db_path.display(), "Database initialized");

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus exporter unavailable, /metrics disabled");
            None
        }
    };

    let hub = EventHub::new(config.hub.client_queue_capacity);
    let service = Arc::new(AssistantService::new(
        db,
        hub.clone(),
        config.storage.operation_timeout(),
    ));
    if config.auth.uses_default_secret() {
        warn!(
            "auth.token_secret is the built-in default; anyone can forge access tokens. \
             Set ASSISTANT__AUTH__TOKEN_SECRET"
        );
    }
    let tokens = TokenAuthority::new(
        &config.auth.token_secret,
        std::time::Duration::from_secs(config.auth.token_ttl_secs),
    )?;

    let shutdown = CancellationToken::new();

    let scheduler = tokio::spawn(
        RecurringScheduler::new(service.clone(), config.scheduler.interval()).run(shutdown.clone()),
    );

    let bot_token = config
        .telegram
        .bot_token
        .clone()
        .filter(|token| !token.is_empty());
    let ingestion = match &bot_token {
        Some(token) => {
            let client = Arc::new(TelegramClient::new(&config.telegram, token)?);
            let bot = Arc::new(ChatBot::new(
                client.clone(),
                service.clone(),
                Arc::new(DialogueStore::new()),
                Arc::new(I18n::new()),
                config.telegram.locale.clone(),
            ));
            let updates = TelegramUpdates::new(client, shutdown.clone());
            info!(locale = %config.telegram.locale, "Telegram bot enabled");
            Some(tokio::spawn(run_updates(
                updates,
                bot,
                shutdown.clone(),
                config.telegram.reconnect_grace(),
            )))
        }
        None => {
            warn!("No Telegram bot token configured; chat ingestion and init-data login disabled");
            None
        }
    };

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    let state = Arc::new(AppState {
        service,
        tokens,
        start_time: Instant::now(),
        metrics,
        bot_token,
        init_data_max_age: std::time::Duration::from_secs(config.auth.init_data_max_age_secs),
    });
    let app = api::router(state, config.server.request_timeout());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    let server_shutdown = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            server_shutdown.cancelled().await;
            hub.shutdown().await;
        })
        .await;

    // Background tasks stop before the database goes away
    shutdown.cancel();
    if let Err(e) = scheduler.await {
        warn!(error = %e, "Scheduler task ended abnormally");
    }
    if let Some(ingestion) = ingestion {
        if let Err(e) = ingestion.await {
            warn!(error = %e, "Chat ingestion task ended abnormally");
        }
    }

    served?;
    info!("Assistant service stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("assistant_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
