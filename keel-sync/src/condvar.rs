//!
//! Condition variable coordinated with a caller-supplied lock session.
//!
//! The condition variable owns no lock of its own: every wait receives a
//! [`LockSession`] and verifies it is actually held before blocking -
//! waiting without the lock is a reported precondition violation, not
//! undefined behavior. Waits may return spuriously; callers re-check
//! their predicate in a loop (no predicate looping is provided here).
//!
//! Timed waits convert the caller's time point to an absolute platform
//! deadline with saturating clamping and report timeout as a distinct
//! [`WaitOutcome`], never as an error.
//!

use std::cell::RefCell;
use std::time::{Duration, SystemTime};

use keel_platform::{Deadline, ETIMEDOUT, RawCond};

use crate::error::{SyncError, WaitOutcome};
use crate::mutex::{LockSession, Mutex};

pub struct ConditionVariable {
    raw: RawCond,
}

impl ConditionVariable {
    pub fn new() -> Self {
        ConditionVariable {
            raw: RawCond::new(),
        }
    }

    /// Wakes at most one blocked waiter. Never blocks, never fails.
    pub fn notify_one(&self) {
        self.raw.signal();
    }

    /// Wakes every blocked waiter. Never blocks, never fails.
    pub fn notify_all(&self) {
        self.raw.broadcast();
    }

    /// Atomically releases the session's mutex and suspends until
    /// signaled, re-acquiring before returning. May wake spuriously.
    pub fn wait(&self, session: &mut LockSession<'_>) -> Result<(), SyncError> {
        if !session.owns() {
            return Err(SyncError::LockNotHeld);
        }
        let ec = unsafe { self.raw.wait(session.mutex().raw()) };
        if ec != 0 {
            return Err(SyncError::platform("condition variable wait failed", ec));
        }
        Ok(())
    }

    /// As [`wait`](Self::wait), bounded by an absolute wall-clock time
    /// point.
    pub fn wait_until(
        &self,
        session: &mut LockSession<'_>,
        at: SystemTime,
    ) -> Result<WaitOutcome, SyncError> {
        self.wait_deadline(session, &Deadline::from_system_time(at))
    }

    /// As [`wait`](Self::wait), bounded by a duration from now.
    pub fn wait_for(
        &self,
        session: &mut LockSession<'_>,
        timeout: Duration,
    ) -> Result<WaitOutcome, SyncError> {
        self.wait_deadline(session, &Deadline::after(timeout))
    }

    pub(crate) fn wait_deadline(
        &self,
        session: &mut LockSession<'_>,
        deadline: &Deadline,
    ) -> Result<WaitOutcome, SyncError> {
        if !session.owns() {
            return Err(SyncError::LockNotHeld);
        }
        let ec = unsafe { self.raw.timed_wait(session.mutex().raw(), deadline) };
        match ec {
            0 => Ok(WaitOutcome::Notified),
            ETIMEDOUT => Ok(WaitOutcome::TimedOut),
            ec => Err(SyncError::platform(
                "condition variable timed wait failed",
                ec,
            )),
        }
    }
}

impl Default for ConditionVariable {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static EXIT_NOTIFICATIONS: RefCell<ExitNotifications> =
        RefCell::new(ExitNotifications { entries: Vec::new() });
}

struct ExitNotifications {
    entries: Vec<(&'static ConditionVariable, &'static Mutex)>,
}

impl Drop for ExitNotifications {
    fn drop(&mut self) {
        for (cond, mutex) in self.entries.drain(..) {
            mutex.unlock();
            cond.notify_all();
        }
    }
}

/// Registers `cond` to be broadcast when the calling context terminates.
///
/// The session must own its mutex; ownership is relinquished to the
/// notification mechanism, which unlocks the mutex and then notifies all
/// waiters during thread teardown. Waiters should still re-check their
/// predicate under the lock.
pub fn notify_all_at_thread_exit(
    cond: &'static ConditionVariable,
    session: LockSession<'static>,
) -> Result<(), SyncError> {
    if !session.owns() {
        return Err(SyncError::LockNotHeld);
    }
    let mutex = session.release();
    EXIT_NOTIFICATIONS.with(|n| n.borrow_mut().entries.push((cond, mutex)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::UNIX_EPOCH;

    #[test]
    fn test_wait_without_lock_is_rejected() {
        let m = Mutex::new();
        let cv = ConditionVariable::new();
        let mut s = m.session_deferred();
        assert_eq!(cv.wait(&mut s).unwrap_err(), SyncError::LockNotHeld);
        assert_eq!(
            cv.wait_for(&mut s, Duration::from_millis(1)).unwrap_err(),
            SyncError::LockNotHeld
        );
    }

    #[test]
    fn test_notify_one_wakes_a_blocked_waiter() {
        let m = Arc::new(Mutex::new());
        let cv = Arc::new(ConditionVariable::new());
        let ready = Arc::new(AtomicUsize::new(0));

        let m2 = Arc::clone(&m);
        let cv2 = Arc::clone(&cv);
        let ready2 = Arc::clone(&ready);
        let waiter = thread::spawn(move || {
            let mut s = m2.session().unwrap();
            while ready2.load(Ordering::SeqCst) == 0 {
                cv2.wait(&mut s).unwrap();
            }
        });

        {
            let _s = m.session().unwrap();
            ready.store(1, Ordering::SeqCst);
        }
        cv.notify_one();
        waiter.join().unwrap();
    }

    #[test]
    fn test_notify_all_wakes_every_waiter() {
        let m = Arc::new(Mutex::new());
        let cv = Arc::new(ConditionVariable::new());
        let go = Arc::new(AtomicUsize::new(0));
        let woken = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = Arc::clone(&m);
                let cv = Arc::clone(&cv);
                let go = Arc::clone(&go);
                let woken = Arc::clone(&woken);
                thread::spawn(move || {
                    let mut s = m.session().unwrap();
                    while go.load(Ordering::SeqCst) == 0 {
                        cv.wait(&mut s).unwrap();
                    }
                    woken.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        {
            let _s = m.session().unwrap();
            go.store(1, Ordering::SeqCst);
        }
        cv.notify_all();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(woken.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_elapsed_deadline_reports_timeout() {
        let m = Mutex::new();
        let cv = ConditionVariable::new();
        let mut s = m.session().unwrap();
        let outcome = cv.wait_until(&mut s, UNIX_EPOCH).unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
        let outcome = cv.wait_for(&mut s, Duration::ZERO).unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    #[cfg(feature = "threads")]
    fn test_far_future_deadline_clamps_and_still_waits() {
        // A deadline around year 300000 must neither overflow nor wrap;
        // the wait blocks normally and a notify brings it back.
        let m = Arc::new(Mutex::new());
        let cv = Arc::new(ConditionVariable::new());
        let done = Arc::new(AtomicUsize::new(0));

        let m2 = Arc::clone(&m);
        let cv2 = Arc::clone(&cv);
        let done2 = Arc::clone(&done);
        let waiter = thread::spawn(move || {
            let far = UNIX_EPOCH + Duration::from_secs(300_000u64 * 365 * 24 * 60 * 60);
            let mut s = m2.session().unwrap();
            while done2.load(Ordering::SeqCst) == 0 {
                let outcome = cv2.wait_until(&mut s, far).unwrap();
                assert_eq!(outcome, WaitOutcome::Notified);
            }
        });

        thread::sleep(Duration::from_millis(50));
        {
            let _s = m.session().unwrap();
            done.store(1, Ordering::SeqCst);
        }
        cv.notify_one();
        waiter.join().unwrap();
    }

    #[test]
    fn test_notify_at_thread_exit_wakes_waiter() {
        static M: std::sync::OnceLock<Mutex> = std::sync::OnceLock::new();
        static CV: std::sync::OnceLock<ConditionVariable> = std::sync::OnceLock::new();
        static FLAG: AtomicUsize = AtomicUsize::new(0);

        let m = M.get_or_init(Mutex::new);
        let cv = CV.get_or_init(ConditionVariable::new);

        let worker = thread::spawn(move || {
            let session = m.session().unwrap();
            FLAG.store(1, Ordering::SeqCst);
            notify_all_at_thread_exit(cv, session).unwrap();
        });

        let mut s = m.session().unwrap();
        while FLAG.load(Ordering::SeqCst) == 0 {
            cv.wait(&mut s).unwrap();
        }
        drop(s);
        worker.join().unwrap();
    }
}
