//! Cooperative cancellation for long-running queries.
//!
//! Analyses that iterate the whole forest check their token at least once
//! between files, return [`Cancelled`] when it has been triggered, and never
//! mutate state on the way out.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use thiserror::Error;

/// The error produced by a query that observed its token mid-flight.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("the query was cancelled")]
pub struct Cancelled;

/// A shareable cancellation flag.
///
/// Cloning a token yields a handle to the same flag, so a host can keep one
/// clone and hand the other to a query.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Returns `Err(Cancelled)` iff the token has been triggered.
    pub fn check(&self) -> Result<(), Cancelled> {
        match self.is_cancelled() {
            true => Err(Cancelled),
            false => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_trips_every_clone() {
        let token = CancelToken::new();
        let clone = token.clone();

        assert_eq!(token.check(), Ok(()));
        clone.cancel();
        assert_eq!(token.check(), Err(Cancelled));
    }
}
