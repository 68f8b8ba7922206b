//! The subscription-driven polling engine.
//!
//! [`QuoteFeed`] is built once at startup and shared by reference. Registry
//! mutation and scheduler start/stop happen under one lock, so reference
//! counts are never lost and at most one poll timer exists. The poll task
//! reads the live set from a `watch` channel, taking a snapshot at the start
//! of every tick.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio::sync::{broadcast, watch, Mutex};

use crate::broadcast::BroadcastSink;
use crate::cache::CacheStats;
use crate::logging;
use crate::model::{Quote, Symbol};
use crate::poller::run_tick;
use crate::registry::SubscriptionRegistry;
use crate::scheduler::{PollScheduler, SchedulerState, Transitions};
use crate::server::metrics::{MetricsEvent, MetricsTx};
use crate::service::StockService;

struct FeedState {
    registry: SubscriptionRegistry,
    scheduler: PollScheduler,
}

pub struct QuoteFeed {
    service: Arc<StockService>,
    sink: BroadcastSink,
    state: Mutex<FeedState>,
    live_tx: watch::Sender<BTreeSet<Symbol>>,
    metrics: MetricsTx,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatus {
    pub scheduler: SchedulerState,
    pub transitions: Transitions,
    pub live_symbols: Vec<Symbol>,
    pub listeners: usize,
    pub cache: CacheStats,
}

impl QuoteFeed {
    pub fn new(
        service: Arc<StockService>,
        sink: BroadcastSink,
        scheduler: PollScheduler,
        metrics: MetricsTx,
    ) -> Self {
        let (live_tx, _) = watch::channel(BTreeSet::new());
        Self {
            service,
            sink,
            state: Mutex::new(FeedState {
                registry: SubscriptionRegistry::new(),
                scheduler,
            }),
            live_tx,
            metrics,
        }
    }

    pub fn service(&self) -> &Arc<StockService> {
        &self.service
    }

    pub fn updates(&self) -> broadcast::Receiver<Quote> {
        self.sink.subscribe()
    }

    /// Count a subscription for each symbol and start polling if this made
    /// the registry active.
    pub async fn subscribe(&self, symbols: &[Symbol]) {
        if symbols.is_empty() {
            return;
        }

        let mut state = self.state.lock().await;
        state.registry.add_symbols(symbols);
        self.live_tx.send_replace(state.registry.live_symbols());

        if state.registry.is_active() && !state.scheduler.is_running() {
            state.scheduler.start(self.tick_job());
            logging::info(
                "feed.polling_started",
                "Registry became active, polling started",
                json!({
                    "symbols": symbols,
                    "interval_ms": state.scheduler.period().as_millis() as u64,
                }),
            );
        }
    }

    /// Release one subscription per symbol and stop polling once nothing is
    /// live. The scheduler is stopped before this returns.
    pub async fn unsubscribe(&self, symbols: &[Symbol]) {
        if symbols.is_empty() {
            return;
        }

        let mut state = self.state.lock().await;
        state.registry.remove_symbols(symbols);
        self.live_tx.send_replace(state.registry.live_symbols());

        if !state.registry.is_active() && state.scheduler.stop() {
            logging::info(
                "feed.polling_stopped",
                "Registry is empty, polling stopped",
                json!({ "symbols": symbols }),
            );
        }
    }

    pub async fn live_symbols(&self) -> BTreeSet<Symbol> {
        self.state.lock().await.registry.live_symbols()
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.registry.is_active()
    }

    pub async fn scheduler_state(&self) -> SchedulerState {
        self.state.lock().await.scheduler.state()
    }

    pub async fn transitions(&self) -> Transitions {
        self.state.lock().await.scheduler.transitions()
    }

    pub async fn status(&self) -> FeedStatus {
        let (scheduler, transitions, live_symbols) = {
            let state = self.state.lock().await;
            (
                state.scheduler.state(),
                state.scheduler.transitions(),
                state.registry.live_symbols().into_iter().collect(),
            )
        };
        FeedStatus {
            scheduler,
            transitions,
            live_symbols,
            listeners: self.sink.listener_count(),
            cache: self.service.cache_stats().await,
        }
    }

    /// Stop polling regardless of registry state.
    pub async fn shutdown(&self) {
        if self.state.lock().await.scheduler.stop() {
            logging::info_simple("feed.shutdown", "Polling stopped for shutdown");
        }
    }

    fn tick_job(&self) -> impl FnMut() -> TickFuture + Send + 'static {
        let service = Arc::clone(&self.service);
        let sink = self.sink.clone();
        let live = self.live_tx.subscribe();
        let metrics = self.metrics.clone();

        move || {
            let symbols = live.borrow().clone();
            let service = Arc::clone(&service);
            let sink = sink.clone();
            let metrics = metrics.clone();
            Box::pin(async move {
                let report = run_tick(&service, &sink, &symbols).await;
                metrics.report(MetricsEvent::PollTick {
                    symbols: report.symbols,
                    published: report.published,
                    failed: report.failed.len(),
                });
            })
        }
    }
}

type TickFuture = std::pin::Pin<Box<dyn Future<Output = ()> + Send>>;
