use chrono::{DateTime, Duration, Utc};

/// Wall-clock source for cooldowns and transient notices.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn system() -> Self {
        Self::System
    }

    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// Moves a fixed clock forward; the system clock ignores it.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }
}

/// A "not before" gate, e.g. the throttle between quiz generation requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cooldown {
    until: Option<DateTime<Utc>>,
}

impl Cooldown {
    pub fn start(&mut self, now: DateTime<Utc>, length: Duration) {
        self.until = Some(now + length);
    }

    /// Time left before the gate opens, `None` once elapsed.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let until = self.until?;
        (until > now).then(|| until - now)
    }

    #[must_use]
    pub fn is_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.remaining(now).is_none()
    }
}

/// Seconds since the epoch used by `fixed_now` (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + Duration::seconds(FIXED_TEST_TIMESTAMP)
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}
