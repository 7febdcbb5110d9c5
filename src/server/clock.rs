// ABOUTME: Server-side wall clock
// ABOUTME: Provides epoch-millisecond timestamps for scheduling and clock sync

use std::time::{SystemTime, UNIX_EPOCH};

/// Server clock for generating timestamps
///
/// Timestamps are wall-clock milliseconds since the Unix epoch, because
/// clients translate them through their own clock-offset estimate rather
/// than against a shared monotonic origin.
#[derive(Debug, Default)]
pub struct ServerClock;

impl ServerClock {
    /// Create a new server clock
    pub fn new() -> Self {
        Self
    }

    /// Get current server time in milliseconds since the Unix epoch
    #[inline]
    pub fn now_ms(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_clock_advances() {
        let clock = ServerClock::new();
        let t1 = clock.now_ms();
        sleep(Duration::from_millis(10));
        let t2 = clock.now_ms();

        assert!(t2 > t1, "Clock should advance");
        assert!(t2 - t1 >= 10.0, "At least 10ms should have passed");
    }
}
