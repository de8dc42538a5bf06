//! Gateway HTTP server: health probe, Telegram webhook, and the inbound processing tasks.

use crate::allowlist::OperatorAllowlist;
use crate::catalog::Catalog;
use crate::channels::{InboundMessage, TelegramChannel, TelegramUpdate};
use crate::config::{self, Config, ConfigError};
use crate::dispatch::Dispatcher;
use crate::relay::RelayCoordinator;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

const INBOUND_QUEUE: usize = 64;

/// Everything resolved from config before the bot starts.
/// Fails on missing token, bad operator ids, zero relay timings or a bad catalog.
pub struct Startup {
    pub token: String,
    pub destinations: Vec<i64>,
    pub allowlist: OperatorAllowlist,
    pub catalog: Catalog,
}

impl Startup {
    pub fn load(config: &Config, config_path: &Path) -> Result<Self> {
        let token = config::resolve_telegram_token(config).ok_or(ConfigError::MissingToken)?;
        let destinations = config::resolve_operator_destinations(config)?;
        config::validate_relay(&config.relay)?;
        let allowlist = OperatorAllowlist::from_relay(&destinations, &config.relay.operator_ids);
        let catalog = Catalog::load(&config::resolve_catalog_path(config, config_path))?;
        Ok(Self {
            token,
            destinations,
            allowlist,
            catalog,
        })
    }
}

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
    /// Sender for inbound channel messages (Telegram webhook POSTs or the long-poll loop). Processor task receives.
    pub inbound_tx: mpsc::Sender<InboundMessage>,
    /// In-process channel connector tasks; awaited during graceful shutdown.
    pub channel_tasks: Arc<RwLock<Vec<JoinHandle<()>>>>,
}

impl GatewayState {
    /// Returns the state and the receiving end of the inbound queue.
    pub fn new(
        config: Arc<Config>,
        dispatcher: Arc<Dispatcher>,
    ) -> (Self, mpsc::Receiver<InboundMessage>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
        let state = Self {
            config,
            dispatcher,
            inbound_tx,
            channel_tasks: Arc::new(RwLock::new(Vec::new())),
        };
        (state, inbound_rx)
    }
}

/// Receive inbound messages and handle each on its own task, so one slow send does not hold up other users.
pub fn spawn_inbound_processor(
    dispatcher: Arc<Dispatcher>,
    mut inbound_rx: mpsc::Receiver<InboundMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = inbound_rx.recv().await {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher.handle(msg).await;
            });
        }
        log::debug!("inbound processor stopped");
    })
}

/// Periodically drop relayed questions that never got a reply.
pub fn spawn_eviction_sweep(relay: Arc<RelayCoordinator>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = relay.evict_expired().await;
            if evicted > 0 {
                log::info!("relay: evicted {} unanswered inquiries", evicted);
            }
        }
    })
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/telegram/webhook", post(telegram_webhook))
        .with_state(state)
}

/// Run the bot and its HTTP listener on config.gateway.bind:config.gateway.port.
/// Fails before binding when the token, operator ids, relay timings or catalog are invalid.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config, config_path: std::path::PathBuf) -> Result<()> {
    let startup = Startup::load(&config, &config_path)?;
    if startup.destinations.is_empty() {
        log::warn!(
            "no operator destinations configured; every unmatched question will get the apology"
        );
    }
    log::info!(
        "catalog: {} categories, {} questions; operator destinations: {:?}",
        startup.catalog.categories().len(),
        startup.catalog.question_count(),
        startup.destinations
    );

    let bind = config.gateway.bind.trim().to_string();
    let webhook_url = config.channels.telegram.webhook_url.clone();
    let webhook_secret = config.channels.telegram.webhook_secret.clone();
    if !config::is_loopback_bind(&bind) && webhook_url.is_some() && webhook_secret.is_none() {
        log::warn!(
            "webhook listener on {} has no webhookSecret; anyone reaching it can inject updates",
            bind
        );
    }

    let telegram = Arc::new(TelegramChannel::new(Some(startup.token)));
    let relay = RelayCoordinator::new(
        telegram.clone(),
        startup.destinations,
        config.relay.mode,
        config.messages.clone(),
        Duration::from_secs(config.relay.entry_ttl_secs),
    )
    .with_send_timeout(Duration::from_secs(config.relay.send_timeout_secs));
    let relay = Arc::new(relay);
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(startup.catalog),
        Arc::new(startup.allowlist),
        relay.clone(),
        telegram.clone(),
    ));

    let port = config.gateway.port;
    let sweep_every = Duration::from_secs(config.relay.sweep_interval_secs);
    let (state, inbound_rx) = GatewayState::new(Arc::new(config), dispatcher.clone());
    spawn_inbound_processor(dispatcher, inbound_rx);
    spawn_eviction_sweep(relay, sweep_every);

    let webhook_mode = if let Some(ref url) = webhook_url {
        telegram
            .set_webhook(url, webhook_secret.as_deref())
            .await
            .with_context(|| format!("registering telegram webhook {}", url))?;
        log::info!("telegram channel registered (webhook mode): {}", url);
        true
    } else {
        if let Err(e) = telegram.delete_webhook().await {
            log::debug!("telegram delete_webhook before long-poll: {}", e);
        }
        let handle = telegram.clone().start_inbound(state.inbound_tx.clone());
        state.channel_tasks.write().await.push(handle);
        log::info!("telegram channel registered and getUpdates loop started");
        false
    };

    let channel_tasks = state.channel_tasks.clone();
    let app = build_router(state);

    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(telegram, webhook_mode, channel_tasks))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Stops the long-poll loop, removes the Telegram webhook if used, then awaits in-process channel tasks.
async fn shutdown_signal(
    telegram: Arc<TelegramChannel>,
    webhook_mode: bool,
    channel_tasks: Arc<RwLock<Vec<JoinHandle<()>>>>,
) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, stopping telegram channel");

    telegram.stop();
    if webhook_mode {
        if let Err(e) = telegram.delete_webhook().await {
            log::debug!("telegram delete_webhook on shutdown: {}", e);
        }
    }

    let handles = {
        let mut g = channel_tasks.write().await;
        std::mem::take(&mut *g)
    };
    for h in handles {
        let _ = h.await;
    }
    log::info!("channel tasks finished");
}

/// POST /telegram/webhook — receives Telegram update JSON; verifies optional secret, pushes InboundMessage.
async fn telegram_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(ref expected) = state.config.channels.telegram.webhook_secret {
        let provided = headers
            .get("X-Telegram-Bot-Api-Secret-Token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != expected.as_str() {
            return StatusCode::FORBIDDEN;
        }
    }
    let update: TelegramUpdate = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(_) => return StatusCode::BAD_REQUEST,
    };
    let Some(inbound) = update.into_inbound() else {
        return StatusCode::OK;
    };
    if state.inbound_tx.send(inbound).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let relay = state.dispatcher.relay();
    let pending = relay.pending().await;
    Json(json!({
        "runtime": "running",
        "pendingRelays": pending,
        "operatorDestinations": relay.destinations().len(),
        "port": state.config.gateway.port,
    }))
}
