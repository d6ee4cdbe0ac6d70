//!
//! keel-sync - Synchronization Primitives
//!
//! The synchronization layer of the keel runtime, built over the
//! platform handles in keel-platform.
//!
//! ## Locks
//!
//! - [`Mutex`] - non-recursive exclusive lock
//! - [`RecursiveMutex`] - re-entrant lock, depth tracked by the platform
//! - [`TimedMutex`] / [`RecursiveTimedMutex`] - software-emulated locks
//!   with `try_lock_for` / `try_lock_until` bounded waits
//! - [`LockSession`] - a context's held/not-held relationship to a mutex,
//!   consumed by the condition variable
//!
//! ## Coordination
//!
//! - [`ConditionVariable`] - wait/notify against a caller-supplied lock
//!   session, timed waits with saturating deadline clamping, and
//!   [`notify_all_at_thread_exit`] registration
//! - [`OnceFlag`] / [`OnceGate`] / [`call_once`] - one-time
//!   initialization with retry after a failed callback
//!
//! ## Failure model
//!
//! Recoverable failures are [`SyncError`] values returned to the caller;
//! timeouts are [`WaitOutcome::TimedOut`] (or `Ok(false)` from the timed
//! locks), never errors. Unlocking a mutex the caller does not own is a
//! fatal assertion.
//!
//! ## Platform Support
//!
//! Native platforms (pthread). Building without the default `threads`
//! feature selects the degraded no-threads backend where nothing blocks.
//!

pub mod condvar;
pub mod error;
pub mod mutex;
pub mod once;
pub mod timed;

pub use condvar::{ConditionVariable, notify_all_at_thread_exit};
pub use error::{SyncError, WaitOutcome};
pub use mutex::{LockSession, Mutex, RecursiveMutex};
pub use once::{OnceFlag, OnceGate, call_once};
pub use timed::{RecursiveTimedMutex, TimedMutex};

pub use keel_platform::ContextId;
