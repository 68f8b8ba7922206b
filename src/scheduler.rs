//! Single repeating task with explicit start/stop control.
//!
//! At most one task exists at a time. The first tick fires one full period
//! after `start`, then every period; ticks never overlap because each one is
//! awaited before the next. A tick that panics is logged and the next tick
//! still runs.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::logging;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Transitions {
    pub started: u64,
    pub stopped: u64,
}

#[derive(Debug)]
pub struct PollScheduler {
    period: Duration,
    task: Option<JoinHandle<()>>,
    transitions: Transitions,
}

impl PollScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            task: None,
            transitions: Transitions::default(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn state(&self) -> SchedulerState {
        if self.is_running() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    /// A task that has exited on its own does not count as running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn transitions(&self) -> Transitions {
        self.transitions
    }

    /// Spawn the repeating task. Returns `false` (and drops `on_tick`) if
    /// already running. Must be called from within a tokio runtime.
    pub fn start<F, Fut>(&mut self, mut on_tick: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_running() {
            return false;
        }

        let period = self.period;
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if AssertUnwindSafe(on_tick()).catch_unwind().await.is_err() {
                    logging::error(
                        "scheduler.tick_panicked",
                        "Poll tick panicked; continuing with the next tick",
                        json!({ "period_ms": period.as_millis() as u64 }),
                    );
                }
            }
        });

        self.task = Some(task);
        self.transitions.started += 1;
        true
    }

    /// Cancel the task, including a tick in flight. Returns `false` if
    /// already stopped.
    pub fn stop(&mut self) -> bool {
        let running = self.is_running();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if running {
            self.transitions.stopped += 1;
        }
        running
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
