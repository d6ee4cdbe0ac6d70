//!
//! pthread backend
//!
//! Binds the pthread mutex and condition variable objects through libc.
//! Each handle boxes the OS object so its address stays stable for the
//! lifetime of the wrapper; the kernel may store pointers into it.
//!
//! Operations return the raw pthread error code (0 on success). Policy -
//! which codes are fatal, which are reported, which are timeouts - lives
//! in keel-sync.
//!

use std::cell::UnsafeCell;
use std::os::raw::c_int;

use crate::deadline::Deadline;

/// This backend really blocks.
pub const CAN_BLOCK: bool = true;

/// Opaque identity of the calling execution context. Only equality is
/// meaningful; the representation is not part of the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextId(std::thread::ThreadId);

impl ContextId {
    pub fn current() -> Self {
        ContextId(std::thread::current().id())
    }
}

/// Non-recursive pthread mutex handle.
pub struct RawMutex {
    inner: Box<UnsafeCell<libc::pthread_mutex_t>>,
}

unsafe impl Send for RawMutex {}
unsafe impl Sync for RawMutex {}

impl RawMutex {
    pub fn new() -> Self {
        RawMutex {
            inner: Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER)),
        }
    }

    pub fn lock(&self) -> c_int {
        unsafe { libc::pthread_mutex_lock(self.inner.get()) }
    }

    pub fn try_lock(&self) -> bool {
        unsafe { libc::pthread_mutex_trylock(self.inner.get()) == 0 }
    }

    pub fn unlock(&self) -> c_int {
        unsafe { libc::pthread_mutex_unlock(self.inner.get()) }
    }

    fn handle(&self) -> *mut libc::pthread_mutex_t {
        self.inner.get()
    }
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RawMutex {
    fn drop(&mut self) {
        // Destroying a locked or waited-on mutex is undefined at the
        // platform level; callers guarantee the handle is idle here.
        unsafe {
            libc::pthread_mutex_destroy(self.inner.get());
        }
    }
}

/// pthread mutex handle configured for re-entrant acquisition. The depth
/// count is maintained by the platform primitive itself.
pub struct RawRecursiveMutex {
    inner: Box<UnsafeCell<libc::pthread_mutex_t>>,
}

unsafe impl Send for RawRecursiveMutex {}
unsafe impl Sync for RawRecursiveMutex {}

impl RawRecursiveMutex {
    /// Configures a recursive mutex. Each partial-failure leg releases
    /// whatever platform resources were already acquired before the error
    /// code propagates.
    pub fn new() -> Result<Self, c_int> {
        let inner = Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));
        unsafe {
            let mut attr: libc::pthread_mutexattr_t = std::mem::zeroed();
            let ec = libc::pthread_mutexattr_init(&mut attr);
            if ec != 0 {
                return Err(ec);
            }
            let ec = libc::pthread_mutexattr_settype(&mut attr, libc::PTHREAD_MUTEX_RECURSIVE);
            if ec != 0 {
                libc::pthread_mutexattr_destroy(&mut attr);
                return Err(ec);
            }
            let ec = libc::pthread_mutex_init(inner.get(), &attr);
            if ec != 0 {
                libc::pthread_mutexattr_destroy(&mut attr);
                return Err(ec);
            }
            let ec = libc::pthread_mutexattr_destroy(&mut attr);
            if ec != 0 {
                libc::pthread_mutex_destroy(inner.get());
                return Err(ec);
            }
        }
        Ok(RawRecursiveMutex { inner })
    }

    pub fn lock(&self) -> c_int {
        unsafe { libc::pthread_mutex_lock(self.inner.get()) }
    }

    pub fn try_lock(&self) -> bool {
        unsafe { libc::pthread_mutex_trylock(self.inner.get()) == 0 }
    }

    pub fn unlock(&self) -> c_int {
        unsafe { libc::pthread_mutex_unlock(self.inner.get()) }
    }
}

impl Drop for RawRecursiveMutex {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_mutex_destroy(self.inner.get());
        }
    }
}

/// pthread condition variable handle.
pub struct RawCond {
    inner: Box<UnsafeCell<libc::pthread_cond_t>>,
}

unsafe impl Send for RawCond {}
unsafe impl Sync for RawCond {}

impl RawCond {
    pub fn new() -> Self {
        RawCond {
            inner: Box::new(UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER)),
        }
    }

    /// Wakes at most one blocked waiter. Never fails observably.
    pub fn signal(&self) {
        unsafe {
            libc::pthread_cond_signal(self.inner.get());
        }
    }

    /// Wakes every blocked waiter. Never fails observably.
    pub fn broadcast(&self) {
        unsafe {
            libc::pthread_cond_broadcast(self.inner.get());
        }
    }

    /// Atomically releases `mutex` and suspends until signaled, then
    /// re-acquires `mutex`. May wake spuriously.
    ///
    /// # Safety
    ///
    /// The calling context must hold `mutex`.
    pub unsafe fn wait(&self, mutex: &RawMutex) -> c_int {
        unsafe { libc::pthread_cond_wait(self.inner.get(), mutex.handle()) }
    }

    /// As [`wait`](Self::wait), bounded by an absolute wall-clock
    /// deadline. Returns `ETIMEDOUT` once the deadline has passed.
    ///
    /// # Safety
    ///
    /// The calling context must hold `mutex`.
    pub unsafe fn timed_wait(&self, mutex: &RawMutex, deadline: &Deadline) -> c_int {
        unsafe {
            libc::pthread_cond_timedwait(self.inner.get(), mutex.handle(), deadline.as_timespec())
        }
    }
}

impl Default for RawCond {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RawCond {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_cond_destroy(self.inner.get());
        }
    }
}
