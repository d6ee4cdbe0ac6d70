//!
//! Software-emulated locks with bounded waits.
//!
//! `TimedMutex` and `RecursiveTimedMutex` compose a plain [`Mutex`] with a
//! [`ConditionVariable`]: the inner mutex guards the logical lock state
//! (a flag, or a depth count plus owner identity) and is never exposed -
//! only the logical state is observable from outside. All reads and
//! writes of that state happen while the inner mutex is held.
//!

use std::cell::UnsafeCell;
use std::time::{Duration, SystemTime};

use keel_platform::{CAN_BLOCK, ContextId, Deadline};
use tracing::warn;

use crate::condvar::ConditionVariable;
use crate::error::{SyncError, WaitOutcome};
use crate::mutex::Mutex;

/// Exclusive lock supporting `try_lock_for` / `try_lock_until`.
pub struct TimedMutex {
    m: Mutex,
    cv: ConditionVariable,
    locked: UnsafeCell<bool>,
}

// `locked` is only touched while `m` is held.
unsafe impl Send for TimedMutex {}
unsafe impl Sync for TimedMutex {}

impl TimedMutex {
    pub fn new() -> Self {
        TimedMutex {
            m: Mutex::new(),
            cv: ConditionVariable::new(),
            locked: UnsafeCell::new(false),
        }
    }

    fn is_locked(&self) -> bool {
        unsafe { *self.locked.get() }
    }

    fn set_locked(&self, value: bool) {
        unsafe {
            *self.locked.get() = value;
        }
    }

    /// Blocks until the logical lock is acquired.
    pub fn lock(&self) -> Result<(), SyncError> {
        let mut session = self.m.session()?;
        if CAN_BLOCK {
            while self.is_locked() {
                self.cv.wait(&mut session)?;
            }
        } else if self.is_locked() {
            warn!("timed mutex lock cannot block without thread support");
        }
        self.set_locked(true);
        Ok(())
    }

    /// Non-blocking attempt: also refuses to wait for the inner mutex,
    /// so a contended inner lock reads as failure rather than a stall.
    pub fn try_lock(&self) -> bool {
        let mut session = self.m.session_deferred();
        if session.try_lock() && !self.is_locked() {
            self.set_locked(true);
            return true;
        }
        false
    }

    /// Bounded-wait acquisition. `Ok(false)` means the deadline elapsed
    /// with the lock still held elsewhere.
    pub fn try_lock_for(&self, timeout: Duration) -> Result<bool, SyncError> {
        self.lock_with_deadline(&Deadline::after(timeout))
    }

    /// As [`try_lock_for`](Self::try_lock_for) with an absolute
    /// wall-clock deadline.
    pub fn try_lock_until(&self, at: SystemTime) -> Result<bool, SyncError> {
        self.lock_with_deadline(&Deadline::from_system_time(at))
    }

    fn lock_with_deadline(&self, deadline: &Deadline) -> Result<bool, SyncError> {
        let mut session = self.m.session()?;
        while self.is_locked() {
            if self.cv.wait_deadline(&mut session, deadline)? == WaitOutcome::TimedOut {
                break;
            }
        }
        if !self.is_locked() {
            self.set_locked(true);
            return Ok(true);
        }
        Ok(false)
    }

    /// Releases the logical lock and wakes one waiter.
    pub fn unlock(&self) {
        let session = self
            .m
            .session()
            .expect("timed mutex unlock: inner lock failed");
        self.set_locked(false);
        drop(session);
        self.cv.notify_one();
    }
}

impl Default for TimedMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimedMutex {
    fn drop(&mut self) {
        // Synchronize with an in-flight unlock before teardown.
        if self.m.lock().is_ok() {
            self.m.unlock();
        }
    }
}

/// Re-entrant lock supporting bounded waits. Owner identity is an opaque
/// [`ContextId`] compared only by equality; `depth == 0` iff no owner.
pub struct RecursiveTimedMutex {
    m: Mutex,
    cv: ConditionVariable,
    count: UnsafeCell<usize>,
    owner: UnsafeCell<Option<ContextId>>,
}

// `count` and `owner` are only touched while `m` is held.
unsafe impl Send for RecursiveTimedMutex {}
unsafe impl Sync for RecursiveTimedMutex {}

impl RecursiveTimedMutex {
    pub fn new() -> Self {
        RecursiveTimedMutex {
            m: Mutex::new(),
            cv: ConditionVariable::new(),
            count: UnsafeCell::new(0),
            owner: UnsafeCell::new(None),
        }
    }

    fn depth(&self) -> usize {
        unsafe { *self.count.get() }
    }

    fn set_depth(&self, value: usize) {
        unsafe {
            *self.count.get() = value;
        }
    }

    fn owner(&self) -> Option<ContextId> {
        unsafe { *self.owner.get() }
    }

    fn set_owner(&self, value: Option<ContextId>) {
        unsafe {
            *self.owner.get() = value;
        }
    }

    /// Blocks until the calling context owns the lock; re-entrant for the
    /// current owner. Fails with [`SyncError::DepthExhausted`] when the
    /// re-entrancy counter is already at its maximum.
    pub fn lock(&self) -> Result<(), SyncError> {
        let id = ContextId::current();
        let mut session = self.m.session()?;
        if self.owner() == Some(id) {
            if self.depth() == usize::MAX {
                return Err(SyncError::DepthExhausted);
            }
            self.set_depth(self.depth() + 1);
            return Ok(());
        }
        if CAN_BLOCK {
            while self.depth() != 0 {
                self.cv.wait(&mut session)?;
            }
        } else if self.depth() != 0 {
            warn!("recursive timed mutex lock cannot block without thread support");
        }
        self.set_depth(1);
        self.set_owner(Some(id));
        Ok(())
    }

    /// Non-blocking attempt; succeeds when the lock is free or already
    /// owned by the caller with depth below the maximum.
    pub fn try_lock(&self) -> bool {
        let id = ContextId::current();
        let mut session = self.m.session_deferred();
        if session.try_lock() && (self.depth() == 0 || self.owner() == Some(id)) {
            if self.depth() == usize::MAX {
                return false;
            }
            self.set_depth(self.depth() + 1);
            self.set_owner(Some(id));
            return true;
        }
        false
    }

    pub fn try_lock_for(&self, timeout: Duration) -> Result<bool, SyncError> {
        self.lock_with_deadline(&Deadline::after(timeout))
    }

    pub fn try_lock_until(&self, at: SystemTime) -> Result<bool, SyncError> {
        self.lock_with_deadline(&Deadline::from_system_time(at))
    }

    fn lock_with_deadline(&self, deadline: &Deadline) -> Result<bool, SyncError> {
        let id = ContextId::current();
        let mut session = self.m.session()?;
        if self.owner() == Some(id) {
            if self.depth() == usize::MAX {
                return Ok(false);
            }
            self.set_depth(self.depth() + 1);
            return Ok(true);
        }
        while self.depth() != 0 {
            if self.cv.wait_deadline(&mut session, deadline)? == WaitOutcome::TimedOut {
                break;
            }
        }
        if self.depth() == 0 {
            self.set_depth(1);
            self.set_owner(Some(id));
            return Ok(true);
        }
        Ok(false)
    }

    /// Unwinds one level of re-entrancy; on the last level releases the
    /// lock and wakes one waiter. Calling without holding the lock is a
    /// contract violation and aborts via assertion.
    pub fn unlock(&self) {
        let session = self
            .m
            .session()
            .expect("recursive timed mutex unlock: inner lock failed");
        assert!(self.depth() > 0, "recursive timed mutex unlock without lock");
        let depth = self.depth() - 1;
        self.set_depth(depth);
        if depth == 0 {
            self.set_owner(None);
            drop(session);
            self.cv.notify_one();
        }
    }
}

impl Default for RecursiveTimedMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RecursiveTimedMutex {
    fn drop(&mut self) {
        if self.m.lock().is_ok() {
            self.m.unlock();
        }
    }
}
