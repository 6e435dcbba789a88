use crate::primer::clock::Clock;
use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOutcome {
    pub slept: Duration,
    /// Set when the target had already passed and the wait was clamped to zero.
    pub overdue_by: Option<Duration>,
}

/// Non-negative distance from `now` to `target`, plus how late we are if negative.
pub fn clamped_duration<Tz: TimeZone>(
    now: &DateTime<Utc>,
    target: &DateTime<Tz>,
) -> (Duration, Option<Duration>) {
    let delta = target.with_timezone(&Utc) - *now;
    match delta.to_std() {
        Ok(duration) => (duration, None),
        Err(_) => (Duration::ZERO, Some((-delta).to_std().unwrap_or_default())),
    }
}

pub struct SleepController<'a> {
    clock: &'a dyn Clock,
}

impl<'a> SleepController<'a> {
    pub fn new(clock: &'a dyn Clock) -> Self {
        Self { clock }
    }

    /// One blocking wait until `target`. Past targets return immediately.
    pub fn sleep_until<Tz: TimeZone>(&self, target: &DateTime<Tz>) -> WaitOutcome {
        let (slept, overdue_by) = clamped_duration(&self.clock.now(), target);
        if !slept.is_zero() {
            self.clock.sleep(slept);
        }
        WaitOutcome { slept, overdue_by }
    }

    pub fn sleep_for(&self, duration: Duration) -> WaitOutcome {
        if !duration.is_zero() {
            self.clock.sleep(duration);
        }
        WaitOutcome {
            slept: duration,
            overdue_by: None,
        }
    }
}
