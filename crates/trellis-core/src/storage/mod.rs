//! Content-addressed key/value storage with atomic multi-key updates.
//!
//! The store is materialized as a chain of commits on a dedicated
//! non-branch ref. Each commit's tree is the full snapshot at that point;
//! each commit message records why the state changed, giving an audit
//! trail that `git log` can read.
//!
//! Keys are forward-slash-separated paths; values are opaque bytes (the
//! typed layer above stores JSON). A partially applied update is never
//! visible: writers construct the complete new tree and advance the ref
//! with compare-and-swap, retrying from the latest tip when another
//! writer got there first.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use crate::cancel::{Cancel, Cancelled};
use crate::git::GitError;

mod git;
mod memory;

pub use git::{GitBackend, STATE_REF};
pub use memory::MemoryBackend;

/// Errors from the storage backend.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The key does not exist. A first-class miss, never an I/O failure.
    #[error("key does not exist")]
    NotExist,

    /// The ref kept moving under us; compare-and-swap retries ran out.
    #[error("storage ref contended after {attempts} attempts")]
    Conflict {
        /// How many attempts were made.
        attempts: u32,
    },

    /// The underlying git operation failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// The operation was cancelled.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// One key to set in an [`UpdateRequest`].
#[derive(Debug, Clone)]
pub struct SetRequest {
    /// Slash-separated key path.
    pub key: String,
    /// Value bytes.
    pub value: Vec<u8>,
}

/// An atomic batch of sets and deletes with a change reason.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    /// Keys to set.
    pub sets: Vec<SetRequest>,
    /// Keys to delete. Deleting a missing key is a no-op.
    pub deletes: Vec<String>,
    /// Human-readable reason recorded in the commit message.
    pub message: String,
}

/// A key/value store with atomic batched updates.
pub trait Backend {
    /// Reads the value at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotExist`] for a missing key.
    fn get(&self, cancel: &Cancel, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Lists the direct children of `prefix` (an empty prefix lists the
    /// top level). Missing prefixes yield an empty set.
    ///
    /// # Errors
    ///
    /// Fails on underlying I/O failure.
    fn keys(&self, cancel: &Cancel, prefix: &str) -> Result<BTreeSet<String>, StorageError>;

    /// Applies all sets and deletes in one atomic step.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] when concurrent writers exhaust
    /// the retry budget.
    fn update(&self, cancel: &Cancel, req: &UpdateRequest) -> Result<(), StorageError>;

    /// Replaces the store with an empty snapshot.
    ///
    /// # Errors
    ///
    /// Fails on underlying I/O failure or contention.
    fn clear(&self, cancel: &Cancel, message: &str) -> Result<(), StorageError>;
}

impl<B: Backend + ?Sized> Backend for &B {
    fn get(&self, cancel: &Cancel, key: &str) -> Result<Vec<u8>, StorageError> {
        (**self).get(cancel, key)
    }

    fn keys(&self, cancel: &Cancel, prefix: &str) -> Result<BTreeSet<String>, StorageError> {
        (**self).keys(cancel, prefix)
    }

    fn update(&self, cancel: &Cancel, req: &UpdateRequest) -> Result<(), StorageError> {
        (**self).update(cancel, req)
    }

    fn clear(&self, cancel: &Cancel, message: &str) -> Result<(), StorageError> {
        (**self).clear(cancel, message)
    }
}

impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn get(&self, cancel: &Cancel, key: &str) -> Result<Vec<u8>, StorageError> {
        (**self).get(cancel, key)
    }

    fn keys(&self, cancel: &Cancel, prefix: &str) -> Result<BTreeSet<String>, StorageError> {
        (**self).keys(cancel, prefix)
    }

    fn update(&self, cancel: &Cancel, req: &UpdateRequest) -> Result<(), StorageError> {
        (**self).update(cancel, req)
    }

    fn clear(&self, cancel: &Cancel, message: &str) -> Result<(), StorageError> {
        (**self).clear(cancel, message)
    }
}
