use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;

use crate::broadcast::{ClientEvent, ServerEvent};
use crate::config::DeliveryMode;
use crate::constants::SERVICE_NAME;
use crate::error::FeedError;
use crate::feed::QuoteFeed;
use crate::logging;
use crate::model::{Quote, Symbol};

use super::metrics::{MetricsEvent, MetricsTx};

const NO_DATA_MESSAGE: &str = "Invalid symbol or no data available";
const QUOTE_FAILED_MESSAGE: &str = "Failed to fetch stock data";
const HISTORY_FAILED_MESSAGE: &str = "Failed to fetch historical data";

/// Shared handle given to every handler.
#[derive(Clone)]
pub struct AppState {
    pub feed: Arc<QuoteFeed>,
    pub delivery: DeliveryMode,
    pub metrics: MetricsTx,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// REST lookups, status and the `/ws` push channel. Middleware (CORS) is
/// attached by the caller.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/stocks/history/:symbol", get(stock_history))
        .route("/api/stocks/:symbol", get(stock_quote))
        .route("/ws", get(websocket_upgrade))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn status(State(state): State<AppState>) -> Response {
    Json(state.feed.status().await).into_response()
}

async fn stock_quote(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let Some(symbol) = Symbol::parse(&raw) else {
        return error_response(StatusCode::NOT_FOUND, NO_DATA_MESSAGE);
    };

    match state.feed.service().quote(&symbol).await {
        Ok(quote) => Json(quote).into_response(),
        Err(err) => lookup_failed("api.quote_failed", &symbol, &err, QUOTE_FAILED_MESSAGE),
    }
}

async fn stock_history(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let Some(symbol) = Symbol::parse(&raw) else {
        return error_response(StatusCode::NOT_FOUND, NO_DATA_MESSAGE);
    };

    match state.feed.service().history(&symbol).await {
        Ok(points) => Json(points).into_response(),
        Err(err) => lookup_failed("api.history_failed", &symbol, &err, HISTORY_FAILED_MESSAGE),
    }
}

fn lookup_failed(event: &str, symbol: &Symbol, err: &FeedError, upstream_message: &str) -> Response {
    let metadata = json!({ "symbol": symbol.as_str(), "error": err.to_string() });
    match err {
        FeedError::NotFound { .. } => {
            logging::warn(event, "Lookup returned no data", metadata);
            error_response(err.status_code(), NO_DATA_MESSAGE)
        }
        FeedError::Upstream { .. } => {
            logging::error(event, "Upstream lookup failed", metadata);
            error_response(err.status_code(), upstream_message)
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

async fn websocket_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        if let Err(err) = run_session(socket, state).await {
            logging::warn(
                "gateway.client_error",
                "Listener session ended with error",
                json!({ "error": format!("{err:?}") }),
            );
        }
    })
}

/// Symbols one listener holds in the registry.
#[derive(Debug, Default)]
struct ListenerSession {
    symbols: BTreeSet<Symbol>,
}

impl ListenerSession {
    /// Returns the symbols this listener did not already hold.
    fn add(&mut self, symbols: Vec<Symbol>) -> Vec<Symbol> {
        symbols
            .into_iter()
            .filter(|symbol| self.symbols.insert(symbol.clone()))
            .collect()
    }

    /// Returns the symbols this listener actually held.
    fn remove(&mut self, symbols: Vec<Symbol>) -> Vec<Symbol> {
        symbols
            .into_iter()
            .filter(|symbol| self.symbols.remove(symbol))
            .collect()
    }

    fn release(&mut self) -> Vec<Symbol> {
        std::mem::take(&mut self.symbols).into_iter().collect()
    }

    fn wants(&self, quote: &Quote, delivery: DeliveryMode) -> bool {
        match delivery {
            DeliveryMode::Global => true,
            DeliveryMode::Subscribed => Symbol::parse(&quote.symbol)
                .map(|symbol| self.symbols.contains(&symbol))
                .unwrap_or(false),
        }
    }
}

async fn run_session(socket: WebSocket, state: AppState) -> Result<()> {
    logging::info_simple("gateway.client.connected", "Listener connected");
    state.metrics.report(MetricsEvent::ListenerConnected);

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut updates = state.feed.updates();
    let mut session = ListenerSession::default();

    let outcome: Result<()> = loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(err) = handle_client_frame(&text, &state, &mut session, &mut ws_sender).await {
                            break Err(err);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break Ok(()),
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        logging::info(
                            "gateway.client.read_error",
                            "Listener connection dropped",
                            json!({ "reason": err.to_string() }),
                        );
                        break Ok(());
                    }
                }
            }
            update = updates.recv() => {
                match update {
                    Ok(quote) => {
                        if !session.wants(&quote, state.delivery) {
                            continue;
                        }
                        if send_event(&mut ws_sender, &ServerEvent::StockUpdate(quote)).await.is_err() {
                            break Ok(());
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        logging::warn(
                            "gateway.client.lagged",
                            "Listener lagged behind stock updates",
                            json!({ "skipped": skipped }),
                        );
                        state.metrics.report(MetricsEvent::ListenerLagged { skipped });
                    }
                    Err(broadcast::error::RecvError::Closed) => break Ok(()),
                }
            }
        }
    };

    let held = session.release();
    state.feed.unsubscribe(&held).await;

    state.metrics.report(MetricsEvent::ListenerDisconnected);
    logging::info(
        "gateway.client.disconnected",
        "Listener disconnected",
        json!({ "released": held }),
    );
    outcome
}

async fn handle_client_frame(
    text: &str,
    state: &AppState,
    session: &mut ListenerSession,
    ws_sender: &mut SplitSink<WebSocket, Message>,
) -> Result<()> {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(ClientEvent::Subscribe(raw)) => {
            let added = session.add(Symbol::parse_all(raw));
            logging::info(
                "gateway.client.subscribe",
                "Listener subscribed",
                json!({ "symbols": added }),
            );
            state.feed.subscribe(&added).await;
        }
        Ok(ClientEvent::Unsubscribe(raw)) => {
            let removed = session.remove(Symbol::parse_all(raw));
            logging::info(
                "gateway.client.unsubscribe",
                "Listener unsubscribed",
                json!({ "symbols": removed }),
            );
            state.feed.unsubscribe(&removed).await;
        }
        Err(err) => {
            let event = ServerEvent::Error {
                message: format!("unrecognised frame: {err}"),
            };
            send_event(ws_sender, &event).await?;
        }
    }
    Ok(())
}

async fn send_event(
    ws_sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<()> {
    let payload = serde_json::to_string(event).context("serialize server event")?;
    ws_sender
        .send(Message::Text(payload))
        .await
        .context("listener socket closed")
}
