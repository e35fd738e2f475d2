//! Time utilities and default timings.

use chrono::{DateTime, Utc};

/// Default timings and sizes of the refresh pipeline.
pub mod constants {
    use std::time::Duration;

    /// Job queue capacity (32 jobs).
    pub const QUEUE_CAPACITY: usize = 32;

    /// Worker pool size (10 workers).
    pub const WORKER_COUNT: usize = 10;

    /// Upper bound on a single external rate fetch (5 seconds).
    pub fn fetch_timeout() -> Duration {
        Duration::from_secs(5)
    }

    /// How long an admission may block on a full queue (5 seconds).
    pub fn enqueue_timeout() -> Duration {
        Duration::from_secs(5)
    }

    /// Grace period for in-flight admissions during shutdown (5 seconds).
    pub fn shutdown_grace_period() -> Duration {
        Duration::from_secs(5)
    }
}

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_monotonic_enough() {
        let a = now();
        let b = now();
        assert!(b >= a);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(constants::QUEUE_CAPACITY, 32);
        assert_eq!(constants::WORKER_COUNT, 10);
        assert_eq!(constants::fetch_timeout().as_secs(), 5);
    }
}
