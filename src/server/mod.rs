mod gateway;
pub mod metrics;

use std::future::IntoFuture;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

use crate::broadcast::BroadcastSink;
use crate::clock::{Clock, SystemClock};
use crate::config::FeedConfig;
use crate::feed::QuoteFeed;
use crate::logging;
use crate::provider::{self, QuoteProvider};
use crate::scheduler::PollScheduler;
use crate::service::StockService;

pub use gateway::{build_router, AppState, ErrorBody, HealthResponse};
use metrics::MetricsTx;

/// `Graceful` lets in-flight requests finish; `Immediate` stops serving at
/// once. Both stop polling and the metrics reporter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownSignal {
    None,
    Graceful,
    Immediate,
}

/// Wire the service object graph: provider → service (cache) → feed.
pub fn build_feed(
    config: &FeedConfig,
    provider: Arc<dyn QuoteProvider>,
    clock: Arc<dyn Clock>,
    metrics: MetricsTx,
) -> Arc<QuoteFeed> {
    let service = Arc::new(StockService::new(provider, clock, config.cache_ttl));
    Arc::new(QuoteFeed::new(
        service,
        BroadcastSink::new(config.broadcast_capacity),
        PollScheduler::new(config.poll_interval),
        metrics,
    ))
}

pub async fn run_with_config(config: FeedConfig) -> Result<()> {
    config.validate()?;
    let provider = provider::from_config(&config.provider)?;

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind http listener at {}", config.bind_addr))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownSignal::None);
    let signals_task = tokio::spawn(handle_signals(shutdown_tx));

    let result = serve(listener, config, provider, Arc::new(SystemClock), shutdown_rx).await;

    signals_task.abort();
    let _ = signals_task.await;
    result
}

/// Run the HTTP/websocket server on `listener` until `shutdown` leaves
/// [`ShutdownSignal::None`]. `Immediate` drops open connections instead of
/// draining them.
pub async fn serve(
    listener: TcpListener,
    config: FeedConfig,
    provider: Arc<dyn QuoteProvider>,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<ShutdownSignal>,
) -> Result<()> {
    let (metrics_tx, metrics_task) = metrics::reporter(config.metrics_interval, shutdown.clone());
    let feed = build_feed(&config, provider, clock, metrics_tx.clone());

    let addr = listener.local_addr().context("listener has no local address")?;
    logging::info(
        "server.bind",
        "Serving stock quotes and update stream",
        json!({
            "addr": addr.to_string(),
            "provider": feed.service().provider_name(),
            "poll_interval_ms": config.poll_interval.as_millis() as u64,
            "cache_ttl_ms": config.cache_ttl.as_millis() as u64,
        }),
    );

    let app = build_router(AppState {
        feed: Arc::clone(&feed),
        delivery: config.delivery,
        metrics: metrics_tx,
    })
    .layer(cors_layer(&config.cors_origin));

    let http_future = async {
        let server = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(wait_for_shutdown(shutdown.clone()))
            .into_future();
        tokio::select! {
            result = server => result.context("http server terminated with error"),
            _ = wait_for_immediate(shutdown.clone()) => {
                logging::warn(
                    "server.shutdown",
                    "Stopping without draining open connections",
                    json!({ "signal": "immediate" }),
                );
                Ok(())
            }
        }
    };

    let run_result = tokio::try_join!(http_future, metrics_task);

    feed.shutdown().await;
    logging::info_simple("server.stop", "Server stopped");
    run_result.map(|_| ())
}

/// Resolves on any shutdown request (or when the sender is gone).
async fn wait_for_shutdown(mut shutdown: watch::Receiver<ShutdownSignal>) {
    while shutdown.changed().await.is_ok() {
        if !matches!(*shutdown.borrow(), ShutdownSignal::None) {
            return;
        }
    }
}

/// Resolves only on [`ShutdownSignal::Immediate`].
async fn wait_for_immediate(mut shutdown: watch::Receiver<ShutdownSignal>) {
    loop {
        if matches!(*shutdown.borrow_and_update(), ShutdownSignal::Immediate) {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);
    match HeaderValue::from_str(origin) {
        Ok(origin) => layer.allow_origin(origin).allow_credentials(true),
        Err(_) => {
            logging::warn(
                "server.cors_origin_invalid",
                "Ignoring invalid CORS origin",
                json!({ "origin": origin }),
            );
            layer
        }
    }
}

async fn handle_signals(shutdown_tx: watch::Sender<ShutdownSignal>) -> Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("failed to register SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            logging::info(
                "signal.received",
                "SIGTERM received, initiating graceful shutdown",
                json!({ "signal": "SIGTERM" })
            );
            let _ = shutdown_tx.send(ShutdownSignal::Graceful);
        }
        _ = sigint.recv() => {
            logging::warn(
                "signal.received",
                "SIGINT received, shutting down",
                json!({ "signal": "SIGINT" })
            );
            let _ = shutdown_tx.send(ShutdownSignal::Immediate);
        }
    }

    Ok(())
}
