//!
//! no-threads backend
//!
//! Degraded build for environments without thread support. The handles
//! keep the same API as the pthread backend but run over in-memory
//! counters: nothing ever blocks, paths that would have blocked emit a
//! warning, and timed waits report timeout immediately. `CAN_BLOCK` is
//! false so composed wait loops skip their blocking phase entirely.
//!

use std::os::raw::c_int;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::warn;

use crate::deadline::Deadline;

/// This backend can never block.
pub const CAN_BLOCK: bool = false;

/// Opaque identity of the calling execution context. With no threads
/// there is exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextId(());

impl ContextId {
    pub fn current() -> Self {
        ContextId(())
    }
}

/// Non-recursive lock over a plain counter.
pub struct RawMutex {
    count: AtomicU32,
}

impl RawMutex {
    pub fn new() -> Self {
        RawMutex {
            count: AtomicU32::new(0),
        }
    }

    pub fn lock(&self) -> c_int {
        if self.count.load(Ordering::Relaxed) != 0 {
            warn!("mutex lock cannot block without thread support");
        } else {
            self.count.store(1, Ordering::Relaxed);
        }
        0
    }

    pub fn try_lock(&self) -> bool {
        if self.count.load(Ordering::Relaxed) != 0 {
            false
        } else {
            self.count.store(1, Ordering::Relaxed);
            true
        }
    }

    pub fn unlock(&self) -> c_int {
        self.count.store(0, Ordering::Relaxed);
        0
    }
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

/// Re-entrant lock over a depth counter.
pub struct RawRecursiveMutex {
    count: AtomicU32,
}

impl RawRecursiveMutex {
    pub fn new() -> Result<Self, c_int> {
        Ok(RawRecursiveMutex {
            count: AtomicU32::new(0),
        })
    }

    pub fn lock(&self) -> c_int {
        self.count.fetch_add(1, Ordering::Relaxed);
        0
    }

    pub fn try_lock(&self) -> bool {
        self.count.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn unlock(&self) -> c_int {
        self.count.fetch_sub(1, Ordering::Relaxed);
        0
    }
}

/// Condition variable with nothing to wake.
pub struct RawCond {
    _private: (),
}

impl RawCond {
    pub fn new() -> Self {
        RawCond { _private: () }
    }

    pub fn signal(&self) {}

    pub fn broadcast(&self) {}

    /// # Safety
    ///
    /// The calling context must hold `mutex` (kept for API parity with
    /// the threaded backend; nothing is dereferenced here).
    pub unsafe fn wait(&self, _mutex: &RawMutex) -> c_int {
        warn!("condition variable wait cannot block without thread support");
        0
    }

    /// # Safety
    ///
    /// The calling context must hold `mutex` (kept for API parity with
    /// the threaded backend; nothing is dereferenced here).
    pub unsafe fn timed_wait(&self, _mutex: &RawMutex, _deadline: &Deadline) -> c_int {
        libc::ETIMEDOUT
    }
}

impl Default for RawCond {
    fn default() -> Self {
        Self::new()
    }
}
