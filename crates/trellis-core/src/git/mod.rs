//! Git capability consumed by the core.
//!
//! The core never shells out to git directly; it goes through the [`Git`]
//! trait (working-tree and ref operations) and the [`StateGit`] trait (the
//! plumbing subset the storage backend needs). [`GitCli`] implements both
//! over the `git` binary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::{Cancel, Cancelled};

mod cli;

pub use cli::GitCli;

#[cfg(test)]
pub(crate) use cli::testutil;

/// A full 40-character hexadecimal git object id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// The all-zero object id, used to assert ref non-existence.
    #[must_use]
    pub fn zero() -> Self {
        Self("0".repeat(40))
    }

    /// Returns the hex string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Oid {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(GitError::InvalidObjectId {
                value: s.to_string(),
            })
        }
    }
}

impl TryFrom<String> for Oid {
    type Error = GitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

/// Subject and body of a single commit message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMessage {
    /// First line of the message.
    pub subject: String,
    /// Everything after the first blank line, trimmed.
    pub body: String,
}

/// Request to create a commit at `HEAD`.
#[derive(Debug, Clone, Default)]
pub struct CommitRequest {
    /// Commit message. `None` lets git open the configured editor.
    pub message: Option<String>,
    /// Permit a commit with no changes.
    pub allow_empty: bool,
}

/// Request to create a branch without checking it out.
#[derive(Debug, Clone)]
pub struct CreateBranchRequest {
    /// Name of the new branch.
    pub name: String,
    /// Commit-ish the branch should point at.
    pub head: String,
}

/// Options for deleting a branch.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteBranchOptions {
    /// Delete even if the branch is not merged.
    pub force: bool,
}

/// Options for `git push`.
#[derive(Debug, Clone)]
pub struct PushOptions {
    /// Remote to push to.
    pub remote: String,
    /// Refspec, e.g. `<hash>:refs/heads/<name>`.
    pub refspec: String,
    /// Plain force push, bypassing all safety checks.
    pub force: bool,
    /// `--force-with-lease=<branch>:<expected-hash>` value. The push fails
    /// if the remote ref is not at the expected hash.
    pub force_with_lease: Option<String>,
}

/// Options for `git fetch`.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Remote to fetch from. `"."` fetches from the local repository.
    pub remote: String,
    /// Refspecs to fetch.
    pub refspecs: Vec<String>,
}

/// Request for `git rebase --onto`.
#[derive(Debug, Clone)]
pub struct RebaseRequest {
    /// New base commit-ish.
    pub onto: String,
    /// Upstream whose commits are excluded from the replayed range.
    pub upstream: String,
    /// Branch to rebase.
    pub branch: String,
}

/// Errors from git operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GitError {
    /// The git binary could not be spawned.
    #[error("spawn git: {source}")]
    Spawn {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// git exited with a failure status.
    #[error("git {command}: {stderr}")]
    Exit {
        /// The subcommand that failed.
        command: String,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// git produced output that could not be decoded.
    #[error("git {command}: invalid output: {reason}")]
    Output {
        /// The subcommand whose output was rejected.
        command: String,
        /// Why the output was rejected.
        reason: String,
    },

    /// A value was not a 40-character hex object id.
    #[error("invalid object id: {value:?}")]
    InvalidObjectId {
        /// The offending value.
        value: String,
    },

    /// The operation was cancelled.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Working-tree and ref operations the core depends on.
pub trait Git {
    /// Returns the name of the currently checked-out branch.
    ///
    /// # Errors
    ///
    /// Fails if `HEAD` is detached or git fails.
    fn current_branch(&self, cancel: &Cancel) -> Result<String, GitError>;

    /// Returns the names of all local branches.
    ///
    /// # Errors
    ///
    /// Fails if git fails.
    fn local_branches(&self, cancel: &Cancel) -> Result<Vec<String>, GitError>;

    /// Resolves a commit-ish to the commit it points at.
    ///
    /// # Errors
    ///
    /// Fails if the reference does not exist or does not peel to a commit.
    fn peel_to_commit(&self, cancel: &Cancel, reference: &str) -> Result<Oid, GitError>;

    /// Returns the messages of commits reachable from `head` but not from
    /// `base`, newest first.
    ///
    /// # Errors
    ///
    /// Fails if either reference is unknown.
    fn commit_message_range(
        &self,
        cancel: &Cancel,
        head: &str,
        base: &str,
    ) -> Result<Vec<CommitMessage>, GitError>;

    /// Creates a branch without checking it out.
    ///
    /// # Errors
    ///
    /// Fails if the branch already exists or `head` is unknown.
    fn create_branch(&self, cancel: &Cancel, req: &CreateBranchRequest) -> Result<(), GitError>;

    /// Deletes a local branch.
    ///
    /// # Errors
    ///
    /// Fails if the branch does not exist, or is unmerged and `force` is
    /// not set.
    fn delete_branch(
        &self,
        cancel: &Cancel,
        name: &str,
        opts: &DeleteBranchOptions,
    ) -> Result<(), GitError>;

    /// Checks out a branch.
    ///
    /// # Errors
    ///
    /// Fails if the checkout would clobber local changes.
    fn checkout(&self, cancel: &Cancel, branch: &str) -> Result<(), GitError>;

    /// Detaches `HEAD` at the given commit-ish.
    ///
    /// # Errors
    ///
    /// Fails if the reference is unknown.
    fn detach_head(&self, cancel: &Cancel, reference: &str) -> Result<(), GitError>;

    /// Creates a commit from the index at `HEAD`.
    ///
    /// # Errors
    ///
    /// Fails if there is nothing to commit and `allow_empty` is not set.
    fn commit(&self, cancel: &Cancel, req: &CommitRequest) -> Result<(), GitError>;

    /// Returns the paths that differ between the index and the given
    /// commit-ish.
    ///
    /// # Errors
    ///
    /// Fails if the reference is unknown.
    fn diff_index(&self, cancel: &Cancel, treeish: &str) -> Result<Vec<String>, GitError>;

    /// Pushes a refspec to a remote.
    ///
    /// # Errors
    ///
    /// Fails if the remote rejects the push, including a force-with-lease
    /// refusal.
    fn push(&self, cancel: &Cancel, opts: &PushOptions) -> Result<(), GitError>;

    /// Fetches refspecs from a remote.
    ///
    /// # Errors
    ///
    /// Fails if a refspec cannot be fast-forwarded or the remote is
    /// unknown.
    fn fetch(&self, cancel: &Cancel, opts: &FetchOptions) -> Result<(), GitError>;

    /// Rebases `branch` onto `onto`, replaying commits since `upstream`.
    ///
    /// # Errors
    ///
    /// Fails on rebase conflicts; the repository is left mid-rebase for
    /// the user to resolve.
    fn rebase(&self, cancel: &Cancel, req: &RebaseRequest) -> Result<(), GitError>;

    /// Returns the merge base of two commits.
    ///
    /// # Errors
    ///
    /// Fails if the commits share no history.
    fn merge_base(&self, cancel: &Cancel, a: &str, b: &str) -> Result<Oid, GitError>;

    /// Returns the commit at which `branch` forked from `base`.
    ///
    /// # Errors
    ///
    /// Fails if no fork point can be determined.
    fn fork_point(&self, cancel: &Cancel, base: &str, branch: &str) -> Result<Oid, GitError>;

    /// Sets the upstream tracking branch.
    ///
    /// # Errors
    ///
    /// Fails if the upstream reference is unknown.
    fn set_branch_upstream(
        &self,
        cancel: &Cancel,
        branch: &str,
        upstream: &str,
    ) -> Result<(), GitError>;

    /// Returns the default branch of the given remote.
    ///
    /// # Errors
    ///
    /// Fails if the remote `HEAD` is not known locally.
    fn default_branch(&self, cancel: &Cancel, remote: &str) -> Result<String, GitError>;

    /// Returns the names of all configured remotes.
    ///
    /// # Errors
    ///
    /// Fails if git fails.
    fn list_remotes(&self, cancel: &Cancel) -> Result<Vec<String>, GitError>;

    /// Returns the fetch URL of a remote.
    ///
    /// # Errors
    ///
    /// Fails if the remote is unknown.
    fn remote_url(&self, cancel: &Cancel, remote: &str) -> Result<String, GitError>;
}

/// A single entry for [`StateGit::write_tree`].
#[derive(Debug, Clone)]
pub struct TreeBlob {
    /// Slash-separated path inside the tree.
    pub path: String,
    /// Blob object id.
    pub blob: Oid,
}

/// Plumbing subset used by the storage backend.
///
/// Kept separate from [`Git`] so the store depends on exactly the
/// operations it needs.
pub trait StateGit {
    /// Resolves a ref to an object id, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Fails only on git failure, not on a missing ref.
    fn read_ref(&self, cancel: &Cancel, name: &str) -> Result<Option<Oid>, GitError>;

    /// Updates a ref with compare-and-swap semantics: the update fails if
    /// the ref is not currently at `old`. `old = Oid::zero()` asserts the
    /// ref does not exist.
    ///
    /// # Errors
    ///
    /// Fails when the ref moved away from `old`.
    fn update_ref(
        &self,
        cancel: &Cancel,
        name: &str,
        new: &Oid,
        old: &Oid,
    ) -> Result<(), GitError>;

    /// Writes a blob and returns its object id.
    ///
    /// # Errors
    ///
    /// Fails on git failure.
    fn write_blob(&self, cancel: &Cancel, data: &[u8]) -> Result<Oid, GitError>;

    /// Reads the blob at `<commit>:<path>`.
    ///
    /// Returns `None` if the path does not exist in the commit's tree.
    ///
    /// # Errors
    ///
    /// Fails on git failure other than a missing path.
    fn read_blob_at(
        &self,
        cancel: &Cancel,
        commit: &Oid,
        path: &str,
    ) -> Result<Option<Vec<u8>>, GitError>;

    /// Lists all blob paths (with their ids) in the commit's tree,
    /// recursively.
    ///
    /// # Errors
    ///
    /// Fails on git failure.
    fn list_tree(&self, cancel: &Cancel, commit: &Oid) -> Result<Vec<TreeBlob>, GitError>;

    /// Writes a (possibly nested) tree from blob entries and returns the
    /// root tree id. An empty entry list produces the empty tree.
    ///
    /// # Errors
    ///
    /// Fails on git failure.
    fn write_tree(&self, cancel: &Cancel, entries: &[TreeBlob]) -> Result<Oid, GitError>;

    /// Creates a commit object for `tree` with an optional parent.
    ///
    /// # Errors
    ///
    /// Fails on git failure.
    fn commit_tree(
        &self,
        cancel: &Cancel,
        tree: &Oid,
        parent: Option<&Oid>,
        message: &str,
    ) -> Result<Oid, GitError>;
}
