// ABOUTME: Client-side clock synchronization
// ABOUTME: Ping/pong offset estimation with a median filter over recent samples

use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Number of rapid pings fired at connection time
pub const WARMUP_PINGS: u32 = 3;
/// Spacing between warm-up pings
pub const WARMUP_INTERVAL: Duration = Duration::from_millis(200);
/// Steady-state ping period after warm-up
pub const SYNC_INTERVAL: Duration = Duration::from_secs(5);

const MAX_SAMPLES: usize = 5;

/// One ping/pong measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncSample {
    /// Half-RTT latency estimate in milliseconds
    pub latency_ms: f64,
    /// Signed clock offset `serverTime − localTime` in milliseconds
    pub offset_ms: f64,
}

/// Clock synchronization state
///
/// Keeps the last five ping/pong samples; the median offset is authoritative.
/// Robust to a single severe outlier but not two (an accepted trade). A
/// missed pong simply leaves the previous median in force.
#[derive(Debug, Default)]
pub struct ClockSync {
    samples: VecDeque<SyncSample>,
}

impl ClockSync {
    /// Create a new clock synchronization instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a pong.
    ///
    /// `client_timestamp` is the echo of our ping's transmission time,
    /// `server_timestamp` the server's wall clock at response-write time,
    /// `now_ms` our wall clock at receipt. All in milliseconds since epoch.
    pub fn record_pong(&mut self, client_timestamp: f64, server_timestamp: f64, now_ms: f64) -> SyncSample {
        let rtt = now_ms - client_timestamp;
        let latency = rtt / 2.0;
        let offset = server_timestamp - client_timestamp - latency;

        let sample = SyncSample {
            latency_ms: latency,
            offset_ms: offset,
        };
        self.push(sample);
        sample
    }

    /// Add a raw sample (used by tests and replay tooling)
    pub fn push(&mut self, sample: SyncSample) {
        self.samples.push_back(sample);
        while self.samples.len() > MAX_SAMPLES {
            self.samples.pop_front();
        }
    }

    /// The authoritative clock offset: median over the retained samples.
    /// Zero before the first pong arrives.
    pub fn offset_ms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }

        let mut offsets: Vec<f64> = self.samples.iter().map(|s| s.offset_ms).collect();
        offsets.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mid = offsets.len() / 2;
        if offsets.len() % 2 == 1 {
            offsets[mid]
        } else {
            (offsets[mid - 1] + offsets[mid]) / 2.0
        }
    }

    /// Most recent half-RTT latency estimate, zero before the first pong.
    pub fn latency_ms(&self) -> f64 {
        self.samples.back().map(|s| s.latency_ms).unwrap_or(0.0)
    }

    /// Whether at least one sample has been taken
    pub fn is_synchronized(&self) -> bool {
        !self.samples.is_empty()
    }

    /// Translate a server timestamp into local epoch milliseconds
    pub fn server_to_local(&self, server_ms: f64) -> f64 {
        server_ms - self.offset_ms()
    }

    /// Translate a local timestamp into server epoch milliseconds
    pub fn local_to_server(&self, local_ms: f64) -> f64 {
        local_ms + self.offset_ms()
    }

    /// Translate a server timestamp into a local scheduling instant
    pub fn server_to_instant(&self, server_ms: f64) -> Instant {
        let local_ms = self.server_to_local(server_ms);
        let delta_ms = local_ms - local_epoch_ms();
        let now = Instant::now();

        if delta_ms >= 0.0 {
            now + Duration::from_secs_f64(delta_ms / 1000.0)
        } else {
            now.checked_sub(Duration::from_secs_f64(-delta_ms / 1000.0))
                .unwrap_or(now)
        }
    }
}

/// Local wall clock in milliseconds since the Unix epoch
pub fn local_epoch_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(offset_ms: f64) -> SyncSample {
        SyncSample {
            latency_ms: 10.0,
            offset_ms,
        }
    }

    #[test]
    fn test_pong_arithmetic() {
        let mut sync = ClockSync::new();

        // Ping left at 1000, pong carried server time 1100, arrived at 1040:
        // rtt 40, latency 20, offset 1100 - 1000 - 20 = 80.
        let s = sync.record_pong(1000.0, 1100.0, 1040.0);
        assert_eq!(s.latency_ms, 20.0);
        assert_eq!(s.offset_ms, 80.0);
        assert!(sync.is_synchronized());
    }

    #[test]
    fn test_median_rejects_single_outlier() {
        let mut sync = ClockSync::new();
        for off in [10.0, 10.0, 1000.0, 10.0, 10.0] {
            sync.push(sample(off));
        }
        assert_eq!(sync.offset_ms(), 10.0);
    }

    #[test]
    fn test_window_keeps_last_five() {
        let mut sync = ClockSync::new();
        for off in [500.0, 1.0, 2.0, 3.0, 4.0, 5.0] {
            sync.push(sample(off));
        }
        // The 500 sample has rolled out of the window.
        assert_eq!(sync.offset_ms(), 3.0);
    }

    #[test]
    fn test_translation_is_symmetric() {
        let mut sync = ClockSync::new();
        sync.push(sample(75.0));

        assert_eq!(sync.server_to_local(1075.0), 1000.0);
        assert_eq!(sync.local_to_server(1000.0), 1075.0);
        assert_eq!(sync.local_to_server(sync.server_to_local(4321.0)), 4321.0);
    }

    #[test]
    fn test_unsynchronized_defaults_to_zero_offset() {
        let sync = ClockSync::new();
        assert!(!sync.is_synchronized());
        assert_eq!(sync.offset_ms(), 0.0);
        assert_eq!(sync.server_to_local(123.0), 123.0);
    }
}
