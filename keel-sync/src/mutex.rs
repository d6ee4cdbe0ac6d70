//!
//! Mutual-exclusion locks over the platform handles.
//!
//! `Mutex` is the non-recursive exclusive lock; `RecursiveMutex` allows
//! re-entrant acquisition by the owning context, with the depth count
//! maintained by the platform primitive. `LockSession` tracks whether the
//! calling context currently holds a given mutex, which is what lets the
//! condition variable verify its precondition before blocking.
//!
//! Ownership policy is asymmetric on purpose: `unlock` of a mutex the
//! caller does not own is a fatal assertion (the platform cannot report
//! it without taxing every unlock), while the condition-variable wait
//! precondition is a reported error (the session makes it checkable for
//! free).
//!

use keel_platform::{EDEADLK, EPERM, RawMutex, RawRecursiveMutex};

use crate::error::SyncError;

/// Non-recursive exclusive lock.
pub struct Mutex {
    raw: RawMutex,
}

impl Mutex {
    pub fn new() -> Self {
        Mutex {
            raw: RawMutex::new(),
        }
    }

    /// Blocks until the calling context owns the mutex.
    pub fn lock(&self) -> Result<(), SyncError> {
        let ec = self.raw.lock();
        if ec != 0 {
            return Err(SyncError::platform("mutex lock failed", ec));
        }
        Ok(())
    }

    /// Returns true iff ownership was acquired immediately. Never blocks,
    /// never fails.
    pub fn try_lock(&self) -> bool {
        self.raw.try_lock()
    }

    /// Releases ownership. Calling without owning the mutex is a contract
    /// violation and aborts via assertion.
    pub fn unlock(&self) {
        let ec = self.raw.unlock();
        assert!(ec == 0, "mutex unlocked by a context that does not own it");
    }

    /// Acquires the mutex and returns a session that owns it.
    pub fn session(&self) -> Result<LockSession<'_>, SyncError> {
        let mut session = self.session_deferred();
        session.lock()?;
        Ok(session)
    }

    /// A session over this mutex that does not yet own it.
    pub fn session_deferred(&self) -> LockSession<'_> {
        LockSession {
            mutex: self,
            owned: false,
        }
    }

    pub(crate) fn raw(&self) -> &RawMutex {
        &self.raw
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive lock allowing re-entrant acquisition by its owner. A context
/// that locked k times must unlock k times before the mutex is free.
pub struct RecursiveMutex {
    raw: RawRecursiveMutex,
}

impl RecursiveMutex {
    /// Configures the platform recursive lock. Fails with the platform
    /// error code if the primitive cannot be set up; partially-acquired
    /// platform resources are released before the error propagates.
    pub fn new() -> Result<Self, SyncError> {
        let raw = RawRecursiveMutex::new()
            .map_err(|ec| SyncError::platform("recursive mutex constructor failed", ec))?;
        Ok(RecursiveMutex { raw })
    }

    pub fn lock(&self) -> Result<(), SyncError> {
        let ec = self.raw.lock();
        if ec != 0 {
            return Err(SyncError::platform("recursive mutex lock failed", ec));
        }
        Ok(())
    }

    pub fn try_lock(&self) -> bool {
        self.raw.try_lock()
    }

    pub fn unlock(&self) {
        let ec = self.raw.unlock();
        assert!(
            ec == 0,
            "recursive mutex unlocked by a context that does not own it"
        );
    }
}

/// A context's relationship to one [`Mutex`]: held or not. Dropping an
/// owning session releases the lock; `release` hands the still-locked
/// mutex back without unlocking.
pub struct LockSession<'m> {
    mutex: &'m Mutex,
    owned: bool,
}

impl<'m> LockSession<'m> {
    /// Acquires the underlying mutex. Locking through a session that
    /// already owns it is reported rather than deadlocking.
    pub fn lock(&mut self) -> Result<(), SyncError> {
        if self.owned {
            return Err(SyncError::platform(
                "lock session already owns the mutex",
                EDEADLK,
            ));
        }
        self.mutex.lock()?;
        self.owned = true;
        Ok(())
    }

    /// Non-blocking acquisition attempt; false when the mutex is
    /// contended or the session already owns it.
    pub fn try_lock(&mut self) -> bool {
        if self.owned {
            return false;
        }
        if self.mutex.try_lock() {
            self.owned = true;
        }
        self.owned
    }

    /// Releases the underlying mutex.
    pub fn unlock(&mut self) -> Result<(), SyncError> {
        if !self.owned {
            return Err(SyncError::platform(
                "unlock through a session that owns no lock",
                EPERM,
            ));
        }
        self.mutex.unlock();
        self.owned = false;
        Ok(())
    }

    /// Whether this session currently holds the mutex.
    pub fn owns(&self) -> bool {
        self.owned
    }

    pub fn mutex(&self) -> &'m Mutex {
        self.mutex
    }

    /// Relinquishes ownership bookkeeping without unlocking. The caller
    /// (or whoever inherits the returned mutex) becomes responsible for
    /// the eventual unlock.
    pub fn release(mut self) -> &'m Mutex {
        self.owned = false;
        self.mutex
    }
}

impl Drop for LockSession<'_> {
    fn drop(&mut self) {
        if self.owned {
            self.mutex.unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    #[cfg(feature = "threads")]
    use std::sync::Arc;
    #[cfg(feature = "threads")]
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_mutex_basic() {
        let m = Mutex::new();
        m.lock().unwrap();
        m.unlock();
        assert!(m.try_lock());
        m.unlock();
    }

    #[test]
    #[cfg(feature = "threads")]
    fn test_mutex_mutual_exclusion() {
        let m = Arc::new(Mutex::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let total = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&m);
                let inside = Arc::clone(&inside);
                let total = Arc::clone(&total);
                thread::spawn(move || {
                    for _ in 0..200 {
                        m.lock().unwrap();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        total.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(inside.fetch_sub(1, Ordering::SeqCst), 1);
                        m.unlock();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(total.load(Ordering::SeqCst), 8 * 200);
    }

    #[test]
    fn test_mutex_try_lock_contended() {
        let m = Mutex::new();
        m.lock().unwrap();
        thread::scope(|s| {
            s.spawn(|| assert!(!m.try_lock()));
        });
        m.unlock();
    }

    #[test]
    #[cfg(feature = "threads")]
    fn test_recursive_mutex_requires_matching_unlocks() {
        let m = Arc::new(RecursiveMutex::new().unwrap());
        for depth in [1usize, 2, 17, 100] {
            for _ in 0..depth {
                m.lock().unwrap();
            }
            for i in 0..depth {
                // Until the last unlock another context must be shut out.
                if i + 1 < depth {
                    let m2 = Arc::clone(&m);
                    let blocked = thread::spawn(move || m2.try_lock()).join().unwrap();
                    assert!(!blocked);
                }
                m.unlock();
            }
            let m2 = Arc::clone(&m);
            let acquired = thread::spawn(move || {
                let ok = m2.try_lock();
                if ok {
                    m2.unlock();
                }
                ok
            })
            .join()
            .unwrap();
            assert!(acquired);
        }
    }

    #[test]
    fn test_session_defer_then_lock() {
        let m = Mutex::new();
        let mut s = m.session_deferred();
        assert!(!s.owns());
        s.lock().unwrap();
        assert!(s.owns());
        assert_eq!(
            s.lock().unwrap_err(),
            SyncError::platform("lock session already owns the mutex", EDEADLK)
        );
        s.unlock().unwrap();
        assert_eq!(
            s.unlock().unwrap_err(),
            SyncError::platform("unlock through a session that owns no lock", EPERM)
        );
    }

    #[test]
    fn test_session_drop_releases() {
        let m = Mutex::new();
        {
            let _s = m.session().unwrap();
        }
        assert!(m.try_lock());
        m.unlock();
    }

    #[test]
    fn test_session_release_keeps_mutex_locked() {
        let m = Mutex::new();
        let s = m.session().unwrap();
        let back = s.release();
        // Still locked: a fresh try must fail, then we unlock by hand.
        thread::scope(|scope| {
            scope.spawn(|| assert!(!back.try_lock()));
        });
        back.unlock();
    }
}
