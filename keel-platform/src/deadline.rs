//!
//! Absolute wall-clock deadlines for timed waits.
//!
//! Timed platform waits take an absolute `timespec` on the wall clock.
//! Conversions here saturate: a deadline beyond the representable range
//! clamps to the maximum `timespec` instead of overflowing or wrapping,
//! so a far-future request still produces a valid (if effectively
//! unbounded) wait.
//!

use std::time::{Duration, SystemTime, UNIX_EPOCH};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// An absolute wall-clock deadline, ready to hand to the platform.
#[derive(Clone, Copy)]
pub struct Deadline {
    ts: libc::timespec,
}

impl Deadline {
    /// Deadline at the given wall-clock time point. Time points before
    /// the epoch clamp to the epoch (an already-elapsed deadline).
    pub fn from_system_time(at: SystemTime) -> Self {
        let since_epoch = at.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        Self::from_unix_duration(since_epoch)
    }

    /// Deadline `timeout` from now, saturating on overflow.
    pub fn after(timeout: Duration) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Self::from_unix_duration(now.checked_add(timeout).unwrap_or(Duration::MAX))
    }

    fn from_unix_duration(since_epoch: Duration) -> Self {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let secs = since_epoch.as_secs();
        if secs < libc::time_t::MAX as u64 {
            ts.tv_sec = secs as libc::time_t;
            ts.tv_nsec = since_epoch.subsec_nanos() as _;
        } else {
            // Saturating clamp: the largest representable deadline.
            ts.tv_sec = libc::time_t::MAX;
            ts.tv_nsec = (NANOS_PER_SEC - 1) as _;
        }
        Deadline { ts }
    }

    pub(crate) fn as_timespec(&self) -> &libc::timespec {
        &self.ts
    }
}
