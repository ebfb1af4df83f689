//! Cooperative cancellation.
//!
//! Every operation that touches git, the forge, or the user accepts a
//! [`Cancel`] token and checks it before starting a new side effect. The
//! token is a shared flag: flipping it does not interrupt an in-flight
//! subprocess or HTTP request, but no further side effect will begin once
//! it is set.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

/// The operation was cancelled before it could complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// A cloneable cancellation token.
///
/// Clones share the same underlying flag.
#[derive(Debug, Clone, Default)]
pub struct Cancel {
    flag: Arc<AtomicBool>,
}

impl Cancel {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Reports whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns [`Cancelled`] if cancellation has been requested.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] when the flag is set.
    pub fn bail(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}
