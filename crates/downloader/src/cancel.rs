//! Cooperative cancellation token.

use crate::error::JobError;
use std::sync::atomic::{AtomicBool, Ordering};

/// Single-writer, many-reader cancellation flag.
///
/// Cancellation is advisory: in-flight work polls [`CancelToken::is_requested`]
/// at natural checkpoints (between files, between phases) and returns promptly.
/// Nothing is ever forcefully interrupted.
///
/// The token is created once per controller and shared via `Arc`; it is reset
/// at the start of each job, never destroyed.
#[derive(Debug, Default)]
pub struct CancelToken {
    requested: AtomicBool,
    active: AtomicBool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent, callable from any thread.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Relaxed);
    }

    /// Lock-free read of the flag; safe to poll at high frequency.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
    }

    /// Clear the flag before a new job starts.
    ///
    /// Fails with [`JobError::InvalidState`] while a job is active.
    pub fn reset(&self) -> Result<(), JobError> {
        if self.active.load(Ordering::Acquire) {
            return Err(JobError::InvalidState(
                "cannot reset cancel token while a job is active",
            ));
        }
        self.requested.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// Marks whether a job currently owns this token. Maintained by the
    /// controller; gates [`CancelToken::reset`].
    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_idempotent() {
        let token = CancelToken::new();
        assert!(!token.is_requested());
        token.request();
        token.request();
        assert!(token.is_requested());
    }

    #[test]
    fn reset_clears_the_flag_when_idle() {
        let token = CancelToken::new();
        token.request();
        token.reset().unwrap();
        assert!(!token.is_requested());
    }

    #[test]
    fn reset_fails_while_active() {
        let token = CancelToken::new();
        token.set_active(true);
        token.request();
        assert!(matches!(token.reset(), Err(JobError::InvalidState(_))));
        // Flag untouched by the failed reset.
        assert!(token.is_requested());

        token.set_active(false);
        token.reset().unwrap();
        assert!(!token.is_requested());
    }
}
