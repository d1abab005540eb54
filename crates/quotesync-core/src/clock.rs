//! Wall-clock sources for the reconciler.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::{UtcDateTime, ValidationError};

pub trait Clock: Send + Sync {
    fn now(&self) -> UtcDateTime;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UtcDateTime {
        UtcDateTime::now()
    }
}

/// Wall-clock time derived from the tokio timer, anchored at construction.
///
/// Follows `tokio::time::pause`/`advance`, which keeps reconciler timestamps
/// in step with controller timers under a paused test runtime.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor: UtcDateTime,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn new(anchor: UtcDateTime) -> Self {
        Self {
            anchor,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> UtcDateTime {
        self.anchor
            .checked_add(self.started.elapsed())
            .unwrap_or(self.anchor)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<UtcDateTime>>,
}

impl ManualClock {
    pub fn new(start: UtcDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, at: UtcDateTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn advance(&self, by: Duration) -> Result<UtcDateTime, ValidationError> {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = now.checked_add(by)?;
        Ok(*now)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> UtcDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> UtcDateTime {
        UtcDateTime::parse("2024-01-01T00:00:00Z").expect("ts")
    }

    #[test]
    fn manual_clock_moves_only_on_request() {
        let clock = ManualClock::new(start());
        assert_eq!(clock.now(), start());

        let later = clock.advance(Duration::from_secs(90)).expect("advance");
        assert_eq!(later.to_string(), "2024-01-01T00:01:30Z");
        assert_eq!(clock.now(), later);

        clock.set(start());
        assert_eq!(clock.now(), start());
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_paused_time() {
        let clock = TokioClock::new(start());
        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(clock.now().to_string(), "2024-01-01T00:05:00Z");
    }
}
