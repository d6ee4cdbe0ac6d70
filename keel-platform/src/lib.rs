//!
//! keel-platform - OS Thread Primitive Bindings
//!
//! Thin wrappers over the platform's thread primitives, consumed by
//! keel-sync. Nothing here implements locking policy; these types only
//! bind the OS objects and report raw error codes:
//!
//! - `RawMutex` - exclusive lock handle
//! - `RawRecursiveMutex` - lock handle configured for re-entrant acquisition
//! - `RawCond` - condition variable handle with absolute-deadline waits
//! - `Deadline` - wall-clock timespec with saturating clamping
//! - `ContextId` - opaque execution-context identity, compared by equality
//!
//! ## Backends
//!
//! Selected at build time through the `threads` feature (default on):
//! - `threads`: pthread via libc
//! - without it: in-memory counters; blocking paths warn and return,
//!   timed waits report timeout immediately. `CAN_BLOCK` tells callers
//!   which behavior they get, so composed wait loops can degrade the way
//!   the no-threads build is meant to.
//!

#[cfg(feature = "threads")]
mod pthread;
#[cfg(feature = "threads")]
pub use pthread::{CAN_BLOCK, ContextId, RawCond, RawMutex, RawRecursiveMutex};

#[cfg(not(feature = "threads"))]
mod unthreaded;
#[cfg(not(feature = "threads"))]
pub use unthreaded::{CAN_BLOCK, ContextId, RawCond, RawMutex, RawRecursiveMutex};

mod deadline;
pub use deadline::Deadline;

/// Error codes surfaced by the raw primitives, re-exported so callers can
/// classify results without binding libc themselves.
pub use libc::{EAGAIN, EDEADLK, EPERM, ETIMEDOUT};
