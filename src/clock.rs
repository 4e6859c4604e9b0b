//! Wall-clock access for the scheduler.
//!
//! The scheduler never calls `chrono::Local::now()` or `tokio::time::sleep`
//! directly, so sessions can be driven by [`ManualClock`] in tests.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::sync::Mutex;
use std::time::Duration;

/// Time source for the scheduler.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current local wall-clock time.
    fn now(&self) -> NaiveDateTime;

    /// Suspend for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Local time and real tokio sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that only moves when slept on or advanced explicitly.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    /// Clock frozen at `start`.
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move time forward.
    pub fn advance(&self, duration: Duration) {
        let step = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += step;
    }

    /// Jump to `time`.
    pub fn set(&self, time: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = time;
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        tokio::task::yield_now().await;
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn manual_clock_advances_on_sleep() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(23, 59, 58))
            .unwrap();
        let clock = ManualClock::new(start);
        clock.sleep(Duration::from_secs(5)).await;
        assert_eq!(clock.now().to_string(), "2024-01-02 00:00:03");
    }
}
