// SPDX-License-Identifier: MIT
//
// Observable cancellation token, checked by long-running conversions between
// page boundaries.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A clonable cancellation flag shared between a conversion worker and the
/// caller that requested the conversion.
///
/// Cancellation is cooperative: the worker polls [`is_cancelled`] between
/// pipeline stages (at page boundaries at the latest), stops processing, and
/// discards any partially assembled output.
///
/// [`is_cancelled`]: CancelToken::is_cancelled
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Return `Err(SnapfolioError::Cancelled)` if cancellation was requested.
    ///
    /// Convenience for `?`-chaining inside pipeline loops.
    pub fn check(&self) -> crate::error::Result<()> {
        if self.is_cancelled() {
            Err(crate::SnapfolioError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_live_and_stays_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());

        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.check().is_err());

        // Idempotent.
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let observer = token.clone();
        token.cancel();
        assert!(observer.is_cancelled());
    }
}
