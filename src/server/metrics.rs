use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use tokio::{
    sync::{mpsc, watch},
    time::{interval_at, Instant, MissedTickBehavior},
};

use crate::logging;

use super::ShutdownSignal;

#[derive(Debug)]
pub enum MetricsEvent {
    PollTick {
        symbols: usize,
        published: usize,
        failed: usize,
    },
    ListenerConnected,
    ListenerDisconnected,
    ListenerLagged {
        skipped: u64,
    },
}

#[derive(Clone, Default)]
pub struct MetricsTx(Option<mpsc::UnboundedSender<MetricsEvent>>);

impl MetricsTx {
    pub fn report(&self, event: MetricsEvent) {
        if let Some(sender) = &self.0 {
            let _ = sender.send(event);
        }
    }

    pub fn noop() -> Self {
        Self(None)
    }
}

pub fn reporter(
    period: Duration,
    shutdown: watch::Receiver<ShutdownSignal>,
) -> (MetricsTx, impl std::future::Future<Output = Result<()>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MetricsTx(Some(tx)), process_events(rx, period, shutdown))
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Window {
    ticks: usize,
    symbols_polled: usize,
    published: usize,
    failed: usize,
    connected: usize,
    disconnected: usize,
    lag_events: usize,
    lag_skipped: u64,
}

impl Window {
    fn record(&mut self, event: MetricsEvent) {
        match event {
            MetricsEvent::PollTick {
                symbols,
                published,
                failed,
            } => {
                self.ticks = self.ticks.saturating_add(1);
                self.symbols_polled = self.symbols_polled.saturating_add(symbols);
                self.published = self.published.saturating_add(published);
                self.failed = self.failed.saturating_add(failed);
            }
            MetricsEvent::ListenerConnected => {
                self.connected = self.connected.saturating_add(1);
            }
            MetricsEvent::ListenerDisconnected => {
                self.disconnected = self.disconnected.saturating_add(1);
            }
            MetricsEvent::ListenerLagged { skipped } => {
                self.lag_events = self.lag_events.saturating_add(1);
                self.lag_skipped = self.lag_skipped.saturating_add(skipped);
            }
        }
    }

    fn is_empty(&self) -> bool {
        *self == Window::default()
    }
}

async fn process_events(
    mut rx: mpsc::UnboundedReceiver<MetricsEvent>,
    period: Duration,
    mut shutdown: watch::Receiver<ShutdownSignal>,
) -> Result<()> {
    let mut window = Window::default();

    let mut reporter = interval_at(Instant::now() + period, period);
    reporter.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            maybe_event = rx.recv() => {
                match maybe_event {
                    Some(event) => window.record(event),
                    None => break,
                }
            }
            _ = reporter.tick() => {
                if !window.is_empty() {
                    logging::info(
                        "metrics.summary",
                        "feed activity summary",
                        json!({
                            "window_secs": period.as_secs(),
                            "poll_ticks": window.ticks,
                            "avg_symbols_per_tick": if window.ticks > 0 { window.symbols_polled as f64 / window.ticks as f64 } else { 0.0 },
                            "updates_published": window.published,
                            "symbol_failures": window.failed,
                            "listeners_connected": window.connected,
                            "listeners_disconnected": window.disconnected,
                            "listener_lag_events": window.lag_events,
                            "listener_lag_skipped": window.lag_skipped,
                        })
                    );
                }
                window = Window::default();
            }
            changed = shutdown.changed() => {
                if changed.is_err() || !matches!(*shutdown.borrow(), ShutdownSignal::None) {
                    break;
                }
            }
        }
    }

    logging::info_simple("metrics.stop", "Metrics reporter stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_accumulates_poll_ticks() {
        let mut window = Window::default();
        assert!(window.is_empty());

        window.record(MetricsEvent::PollTick {
            symbols: 2,
            published: 1,
            failed: 1,
        });
        window.record(MetricsEvent::ListenerLagged { skipped: 7 });

        assert_eq!(window.ticks, 1);
        assert_eq!(window.published, 1);
        assert_eq!(window.failed, 1);
        assert_eq!(window.lag_skipped, 7);
        assert!(!window.is_empty());
    }

    #[tokio::test]
    async fn reporter_stops_on_shutdown() {
        crate::logging::set_silent(true);
        let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownSignal::None);
        let (metrics, task) = reporter(Duration::from_secs(30), shutdown_rx);
        let handle = tokio::spawn(task);

        metrics.report(MetricsEvent::ListenerConnected);
        shutdown_tx.send(ShutdownSignal::Graceful).unwrap();
        handle.await.unwrap().unwrap();
    }
}
