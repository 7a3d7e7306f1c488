//! Gateway: HTTP server (health + Telegram webhook), inbound dispatch loop, graceful shutdown.

use crate::channels::{ChannelHandle, InboundMessage, TelegramChannel, TelegramUpdate};
use crate::config::{self, Config};
use crate::coordinator::{CoordinatorSettings, SessionCoordinator};
use crate::events::EventEmitter;
use crate::init;
use crate::llm::DeepSeekClient;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

const INBOUND_QUEUE: usize = 64;
const WEBHOOK_SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";
/// Extra time past the answer deadline that shutdown waits for in-flight messages.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Sender for inbound channel messages (e.g. Telegram webhook POSTs). Dispatch task receives.
    pub inbound_tx: mpsc::Sender<InboundMessage>,
    /// True when a Telegram bot token is configured.
    pub telegram_enabled: bool,
}

/// Receive inbound messages and hand each one to the coordinator in its own task.
/// A panic while handling one message is logged and does not affect the others.
/// Once the queue closes, waits for the messages already being handled before returning.
pub fn spawn_dispatcher(
    coordinator: Arc<SessionCoordinator>,
    mut inbound_rx: mpsc::Receiver<InboundMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                msg = inbound_rx.recv() => {
                    let Some(msg) = msg else { break };
                    let coordinator = coordinator.clone();
                    in_flight.spawn(async move {
                        let user_id = msg.user_id;
                        let task = tokio::spawn(async move { coordinator.dispatch(&msg).await });
                        if let Err(e) = task.await {
                            log::error!("dispatch: handling message from user {} aborted: {}", user_id, e);
                        }
                    });
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }
        if !in_flight.is_empty() {
            log::info!("dispatch: inbound queue closed, finishing {} message(s)", in_flight.len());
        }
        while in_flight.join_next().await.is_some() {}
        log::debug!("dispatch: all messages handled");
    })
}

/// Build the HTTP router.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/telegram/webhook", post(telegram_webhook))
        .with_state(state)
}

/// Run the bot; serves HTTP on config.gateway.bind:config.gateway.port.
/// Without a Telegram token only the health endpoint is served.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config, config_path: PathBuf) -> Result<()> {
    init::warn_if_uninitialized(&config_path);

    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(INBOUND_QUEUE);
    let telegram_token = config::resolve_telegram_token(&config);
    let telegram = telegram_token.map(|t| Arc::new(TelegramChannel::new(Some(t))));
    let mut channel_tasks: Vec<JoinHandle<()>> = Vec::new();
    let mut dispatcher: Option<JoinHandle<()>> = None;
    let mut webhook_for_shutdown: Option<Arc<TelegramChannel>> = None;

    if let Some(ref telegram) = telegram {
        let api_key = config::resolve_answer_api_key(&config);
        if api_key.is_none() {
            log::warn!("answer api key not configured (set answer.apiKey or DEEPSEEK_API_KEY); every message will get the error reply");
        }
        let producer = DeepSeekClient::new(
            config.answer.base_url.clone(),
            api_key,
            config.answer.model.clone(),
        );
        let coordinator = Arc::new(SessionCoordinator::new(
            telegram.clone(),
            Arc::new(producer),
            EventEmitter::logging(),
            CoordinatorSettings::from_config(&config),
        ));
        log::info!(
            "coordinator ready (mode {:?}, json {}, typing every {:?}, deadline {:?})",
            coordinator.settings().ask_options.mode,
            coordinator.settings().ask_options.use_structured,
            coordinator.settings().typing_delay,
            coordinator.settings().answer_timeout,
        );
        dispatcher = Some(spawn_dispatcher(coordinator, inbound_rx));

        if let Some(ref url) = config.channels.telegram.webhook_url {
            let secret = config.channels.telegram.webhook_secret.as_deref();
            if let Err(e) = telegram.set_webhook(url, secret).await {
                log::warn!("telegram set_webhook failed: {}", e);
            } else {
                log::info!("telegram channel registered (webhook mode): {}", url);
            }
            webhook_for_shutdown = Some(telegram.clone());
        } else {
            if let Err(e) = telegram.delete_webhook().await {
                log::debug!("telegram delete_webhook before polling: {}", e);
            }
            channel_tasks.push(telegram.clone().start_inbound(inbound_tx.clone()));
            log::info!("telegram channel started (getUpdates long-poll)");
        }
    } else {
        log::warn!("telegram bot token not configured (set channels.telegram.botToken or TELEGRAM_BOT_TOKEN); serving health only");
    }

    let state = GatewayState {
        config: Arc::new(config.clone()),
        inbound_tx,
        telegram_enabled: telegram.is_some(),
    };
    let app = router(state);

    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    let drain_deadline = config.answer.timeout() + SHUTDOWN_GRACE;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(telegram, webhook_for_shutdown, channel_tasks))
        .await
        .context("gateway server exited")?;
    // All inbound senders are gone by now, so the dispatcher finishes once in-flight messages are answered.
    if let Some(mut d) = dispatcher {
        if tokio::time::timeout(drain_deadline, &mut d).await.is_err() {
            log::warn!("dispatch: messages still in flight after {:?}, abandoning them", drain_deadline);
            d.abort();
        }
    }
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Stops the Telegram connector, removes the webhook if used, then awaits the long-poll task
/// (at most one getUpdates timeout).
async fn shutdown_signal(
    telegram: Option<Arc<TelegramChannel>>,
    telegram_webhook: Option<Arc<TelegramChannel>>,
    channel_tasks: Vec<JoinHandle<()>>,
) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl+C: {}", e);
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
    log::info!("shutdown signal received, stopping channel");

    if let Some(ref t) = telegram {
        t.stop();
    }
    if let Some(t) = telegram_webhook {
        if let Err(e) = t.delete_webhook().await {
            log::debug!("telegram delete_webhook on shutdown: {}", e);
        }
    }

    for h in channel_tasks {
        let _ = h.await;
    }
    log::info!("channel tasks finished");
}

/// POST /telegram/webhook: receives Telegram update JSON; verifies optional secret, pushes InboundMessage.
async fn telegram_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if !state.telegram_enabled {
        return StatusCode::NOT_FOUND;
    }
    if let Some(ref expected) = state.config.channels.telegram.webhook_secret {
        let provided = headers
            .get(WEBHOOK_SECRET_HEADER)
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
    let Some(inbound) = update.into_inbound("telegram") else {
        return StatusCode::OK;
    };
    if state.inbound_tx.send(inbound).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "telegram": state.telegram_enabled,
    }))
}
