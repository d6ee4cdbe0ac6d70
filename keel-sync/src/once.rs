//!
//! One-time initialization gate.
//!
//! An [`OnceFlag`] walks `Unstarted -> InProgress -> Done` exactly once.
//! The driving [`OnceGate`] owns its own raw mutex/cond pair; every call
//! site sharing a gate also shares that pair, so unrelated one-time
//! initializations should each get their own flag to avoid cross-flag
//! contention on the gate.
//!
//! A failing callback - an `Err` return or an unwind - resets the flag to
//! `Unstarted` and wakes all waiters, so a later caller can retry and
//! become the new invoker. Exactly one invocation ever reaches `Done`.
//!

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};

use keel_platform::{CAN_BLOCK, RawCond, RawMutex};
use tracing::debug;

const UNSTARTED: u8 = 0;
const IN_PROGRESS: u8 = 1;
const DONE: u8 = 2;

/// Per-initialization-site state. Lifetime is typically process-wide
/// (`static`); there is no teardown.
pub struct OnceFlag {
    state: AtomicU8,
}

impl OnceFlag {
    pub const fn new() -> Self {
        OnceFlag {
            state: AtomicU8::new(UNSTARTED),
        }
    }

    /// True once a callback has completed successfully.
    pub fn is_done(&self) -> bool {
        self.state.load(Ordering::Acquire) == DONE
    }
}

impl Default for OnceFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives [`OnceFlag`]s through their state machine. `global()` is the
/// shared process-wide gate; separate gates can be constructed where a
/// call site wants its own mutex/cond pair.
pub struct OnceGate {
    mutex: RawMutex,
    cond: RawCond,
}

impl OnceGate {
    pub fn new() -> Self {
        OnceGate {
            mutex: RawMutex::new(),
            cond: RawCond::new(),
        }
    }

    /// The lazily-created process-wide gate.
    pub fn global() -> &'static OnceGate {
        static GATE: OnceLock<OnceGate> = OnceLock::new();
        GATE.get_or_init(|| {
            debug!("initializing process-wide once gate");
            OnceGate::new()
        })
    }

    /// Runs `f` iff no callback for `flag` has completed yet. Concurrent
    /// callers block until the in-flight invocation resolves; the
    /// callback's failure propagates to its own caller and leaves the
    /// flag retryable.
    pub fn run<E, F>(&self, flag: &OnceFlag, f: F) -> Result<(), E>
    where
        F: FnOnce() -> Result<(), E>,
    {
        if flag.is_done() {
            return Ok(());
        }
        self.mutex.lock();
        while CAN_BLOCK && flag.state.load(Ordering::Acquire) == IN_PROGRESS {
            unsafe {
                self.cond.wait(&self.mutex);
            }
        }
        if flag.state.load(Ordering::Acquire) != UNSTARTED {
            self.mutex.unlock();
            return Ok(());
        }
        flag.state.store(IN_PROGRESS, Ordering::Release);
        self.mutex.unlock();

        // Resets the flag and wakes waiters on Err or unwind; defused on
        // success before the Done transition.
        let reset = ResetOnFailure { gate: self, flag };
        f()?;
        std::mem::forget(reset);

        self.mutex.lock();
        flag.state.store(DONE, Ordering::Release);
        self.mutex.unlock();
        self.cond.broadcast();
        Ok(())
    }
}

impl Default for OnceGate {
    fn default() -> Self {
        Self::new()
    }
}

struct ResetOnFailure<'a> {
    gate: &'a OnceGate,
    flag: &'a OnceFlag,
}

impl Drop for ResetOnFailure<'_> {
    fn drop(&mut self) {
        self.gate.mutex.lock();
        self.flag.state.store(UNSTARTED, Ordering::Release);
        self.gate.mutex.unlock();
        self.gate.cond.broadcast();
    }
}

/// Runs `f` through the process-wide gate.
pub fn call_once<E, F>(flag: &OnceFlag, f: F) -> Result<(), E>
where
    F: FnOnce() -> Result<(), E>,
{
    OnceGate::global().run(flag, f)
}
