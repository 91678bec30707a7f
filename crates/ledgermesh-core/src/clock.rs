//! Injectable time source
//!
//! Manual operations, import sessions and the scan scheduler all stamp rows
//! with "now"; routing every read through a handle lets tests freeze time.

use chrono::{DateTime, TimeZone, Utc};

pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    fn now_millis(&self) -> i64 {
        self.now_utc().timestamp_millis()
    }
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to a fixed instant, for tests
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.0)
            .earliest()
            .unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_frozen() {
        let clock = FixedClock(1_735_689_600_000);
        assert_eq!(clock.now_millis(), 1_735_689_600_000);
        assert_eq!(clock.now_millis(), clock.now_millis());
    }
}
