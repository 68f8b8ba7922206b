use std::sync::Mutex;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::time::Instant;

/// Time source for cache freshness and quote dates.
///
/// `now` is monotonic and follows tokio's clock, so paused-time tests move
/// cache expiry together with the poll timer.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Calendar date used when the upstream does not supply a trading day.
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    state: Mutex<ManualState>,
}

#[derive(Debug)]
struct ManualState {
    elapsed: Duration,
    today: NaiveDate,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                today,
            }),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.elapsed += by;
    }

    pub fn set_today(&self, today: NaiveDate) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.today = today;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.origin + state.elapsed
    }

    fn today(&self) -> NaiveDate {
        let state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.today
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_on_advance() {
        let clock = ManualClock::new(NaiveDate::from_ymd_opt(2025, 8, 30).unwrap());
        let start = clock.now();
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_millis(1_500));
        assert_eq!(clock.now() - start, Duration::from_millis(1_500));
    }

    #[test]
    fn manual_clock_reports_configured_date() {
        let clock = ManualClock::new(NaiveDate::from_ymd_opt(2025, 8, 30).unwrap());
        clock.set_today(NaiveDate::from_ymd_opt(2025, 9, 1).unwrap());
        assert_eq!(clock.today().to_string(), "2025-09-01");
    }
}
