//!
//! Error and outcome types for the synchronization layer.
//!
//! Every recoverable failure is a `SyncError` returned to the immediate
//! caller; nothing is retried internally. Timeouts are not errors - timed
//! operations report them as a distinct `WaitOutcome` (or `Ok(false)` for
//! the timed locks) so callers can tell "deadline passed" from "predicate
//! not yet true".
//!

use keel_platform::{EAGAIN, EPERM};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// A platform primitive failed with the given error code.
    #[error("{op} (os error {code})")]
    Platform { op: &'static str, code: i32 },

    /// A condition-variable wait was attempted without holding the
    /// supplied lock.
    #[error("condition variable wait: mutex not locked")]
    LockNotHeld,

    /// The re-entrancy depth counter is already at its representable
    /// maximum.
    #[error("recursive lock depth limit reached")]
    DepthExhausted,
}

impl SyncError {
    pub fn platform(op: &'static str, code: i32) -> Self {
        SyncError::Platform { op, code }
    }

    /// Platform error code carried by (or conventionally matching) this
    /// failure.
    pub fn code(&self) -> i32 {
        match self {
            SyncError::Platform { code, .. } => *code,
            SyncError::LockNotHeld => EPERM,
            SyncError::DepthExhausted => EAGAIN,
        }
    }
}

/// How a timed condition-variable wait came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Woken by a notify, or spuriously; the deadline had not passed.
    Notified,
    /// The deadline elapsed before a wake was observed.
    TimedOut,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_follow_convention() {
        assert_eq!(SyncError::platform("mutex lock failed", 22).code(), 22);
        assert_eq!(SyncError::LockNotHeld.code(), EPERM);
        assert_eq!(SyncError::DepthExhausted.code(), EAGAIN);
    }

    #[test]
    fn test_platform_error_message_carries_code() {
        let err = SyncError::platform("recursive mutex constructor failed", 12);
        assert_eq!(
            err.to_string(),
            "recursive mutex constructor failed (os error 12)"
        );
    }
}
