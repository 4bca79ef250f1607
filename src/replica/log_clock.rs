use crate::logstore::LogId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Return current epoch time in microseconds (saturating).
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros()
        .min(u128::from(u64::MAX)) as u64
}

/// Strictly-monotonic LogId allocator: `max(previous + 1, now_micros)`.
/// Wall-clock microseconds keep ids monotonic across leader changes; the
/// `previous + 1` floor keeps them strict within one leader even when two
/// allocations land in the same microsecond.
pub struct LogIdClock {
    last: AtomicU64,
}

impl LogIdClock {
    /// `floor` is the id the new leader must stay above, normally the log
    /// store's last log id at startup.
    pub fn new(floor: LogId) -> Self {
        LogIdClock {
            last: AtomicU64::new(floor.val()),
        }
    }

    pub fn next(&self) -> LogId {
        let mut allocated = 0;
        self.last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                allocated = (prev + 1).max(now_micros());
                Some(allocated)
            })
            .expect("fetch_update closure always returns Some");
        LogId::new(allocated)
    }
}
