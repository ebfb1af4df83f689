//! Branch operations: create, fold, restack, and submit.
//!
//! Each operation orchestrates the git capability, the branch store, and
//! (for submit) the forge, keeping the working repository and the store
//! consistent with each other. Store writes for one logical operation are
//! batched into a single atomic update.

use thiserror::Error;

use crate::cancel::Cancelled;
use crate::forge::ForgeError;
use crate::git::{GitError, Oid};
use crate::prompt::PromptError;
use crate::stack::StackError;
use crate::state::StoreError;

mod create;
mod fold;
mod restack;
mod submit;

pub use create::{create, CreateMode, CreateRequest};
pub use fold::fold;
pub use restack::{restack_branch, restack_upstack};
pub use submit::{submit, SubmitOptions, SubmitOutcome};

/// Errors from branch operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OpsError {
    /// The operation does not apply to the trunk branch.
    #[error("cannot {operation} the trunk branch")]
    Trunk {
        /// The refused operation.
        operation: &'static str,
    },

    /// A new branch cannot be created below the trunk.
    #[error("cannot create a branch below the trunk")]
    BelowTrunk,

    /// The branch has no record in the store.
    #[error("branch {branch:?} is not tracked")]
    Untracked {
        /// The untracked branch.
        branch: String,
    },

    /// The branch is out of date with its base.
    #[error(
        "branch {branch:?} needs to be restacked on {base:?} \
         (run `trellis branch restack`, or pass --force to submit anyway)"
    )]
    NeedsRestack {
        /// The out-of-date branch.
        branch: String,
        /// Its base branch.
        base: String,
        /// The base commit the store expects.
        expected: Oid,
        /// The fork point actually observed.
        actual: Oid,
    },

    /// The remote rejected the push; the ref moved past the expected
    /// value.
    #[error(
        "push of {branch:?} was rejected; the remote branch may have been \
         updated by someone else (pull and retry, or use --force)"
    )]
    PushRejected {
        /// The refused upstream branch.
        branch: String,
        /// The underlying push failure.
        #[source]
        source: GitError,
    },

    /// More than one open change request exists for the branch.
    #[error("multiple open change requests for {branch:?}")]
    MultipleOpenChanges {
        /// The ambiguous branch.
        branch: String,
    },

    /// There is nothing on the branch to submit.
    #[error("branch {branch:?} has no commits to submit")]
    NoCommits {
        /// The empty branch.
        branch: String,
    },

    /// A change cannot be created with a blank title.
    #[error("change title must not be blank")]
    BlankSubject,

    /// Interactive data is required but prompting is disabled.
    #[error("title and body are required when prompting is disabled (use --title/--body or --fill)")]
    NoPrompt,

    /// The prompt machinery failed.
    #[error("prompt failed: {0}")]
    PromptFailed(String),

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Git failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// The forge failed.
    #[error(transparent)]
    Forge(#[from] ForgeError),

    /// The operation was cancelled.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl From<StackError> for OpsError {
    fn from(err: StackError) -> Self {
        match err {
            StackError::Untracked { branch } => Self::Untracked { branch },
            StackError::NeedsRestack {
                branch,
                base,
                expected,
                actual,
            } => Self::NeedsRestack {
                branch,
                base,
                expected,
                actual,
            },
            StackError::Store(inner) => Self::Store(inner),
            StackError::Git(inner) => Self::Git(inner),
            StackError::Cancelled(inner) => Self::Cancelled(inner),
        }
    }
}

impl From<PromptError> for OpsError {
    fn from(err: PromptError) -> Self {
        match err {
            PromptError::Disabled => Self::NoPrompt,
            PromptError::Failed(reason) => Self::PromptFailed(reason),
            PromptError::Cancelled(inner) => Self::Cancelled(inner),
        }
    }
}
