use chrono::{DateTime, Utc};
use std::thread;
use std::time::Duration;

const MAX_SLICE: Duration = Duration::from_secs(60);

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

/// Wall clock. `sleep` waits against a fixed wall-clock deadline in bounded
/// slices because the monotonic clock stalls while the host is suspended.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        let Ok(span) = chrono::Duration::from_std(duration) else {
            thread::sleep(duration);
            return;
        };
        let deadline = Utc::now() + span;
        loop {
            let remaining = match (deadline - Utc::now()).to_std() {
                Ok(remaining) if !remaining.is_zero() => remaining,
                _ => return,
            };
            thread::sleep(remaining.min(MAX_SLICE));
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::Clock;
    use chrono::{DateTime, Utc};
    use std::cell::{Cell, RefCell};
    use std::time::Duration;

    /// Clock that only moves when slept on, recording every wait.
    pub struct FakeClock {
        now: Cell<DateTime<Utc>>,
        pub sleeps: RefCell<Vec<Duration>>,
    }

    impl FakeClock {
        pub fn at(now: DateTime<Utc>) -> Self {
            Self {
                now: Cell::new(now),
                sleeps: RefCell::new(Vec::new()),
            }
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            self.now.get()
        }

        fn sleep(&self, duration: Duration) {
            self.sleeps.borrow_mut().push(duration);
            let span = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
            self.now.set(self.now.get() + span);
        }
    }
}
