//! Fold a branch into its base.

use tracing::info;

use super::OpsError;
use crate::cancel::Cancel;
use crate::git::{DeleteBranchOptions, FetchOptions, Git};
use crate::stack::StackService;
use crate::state::{Store, UpdateRequest, UpsertRequest};
use crate::storage::Backend;

/// Merges `branch` into its base and removes it from the stack.
///
/// The base is fast-forwarded to the branch tip with a local fetch (no
/// checkout of the base needed), every direct child is reparented onto
/// the base at its new tip, the branch's record is deleted — all in one
/// atomic store update — and finally the base is checked out and the git
/// branch deleted.
///
/// # Errors
///
/// Refuses with [`OpsError::NeedsRestack`] unless the branch is restacked
/// on its base, and with [`OpsError::Untracked`] when it has no record.
pub fn fold<G: Git, B: Backend>(
    cancel: &Cancel,
    git: &G,
    store: &Store<B>,
    branch: &str,
) -> Result<(), OpsError> {
    let service = StackService::new(git, store);
    service.verify_restacked(cancel, branch)?;

    let record = store.lookup(cancel, branch)?;
    let children = service.children(cancel, branch)?;

    // Fast-forward the base to this branch without checking it out: fetch
    // from the local repository with a branch:base refspec.
    git.fetch(
        cancel,
        &FetchOptions {
            remote: ".".to_string(),
            refspecs: vec![format!("{branch}:{}", record.base)],
        },
    )?;
    let new_base_hash = git.peel_to_commit(cancel, &record.base)?;

    let upserts = children
        .iter()
        .map(|child| UpsertRequest {
            name: child.clone(),
            base: Some(record.base.clone()),
            base_hash: Some(new_base_hash.clone()),
            ..UpsertRequest::default()
        })
        .collect();
    store.update(
        cancel,
        &UpdateRequest {
            upserts,
            deletes: vec![branch.to_string()],
            message: format!("folding {branch} into {}", record.base),
        },
    )?;

    git.checkout(cancel, &record.base)?;
    // Already merged into the base; force is safe.
    git.delete_branch(cancel, branch, &DeleteBranchOptions { force: true })?;

    info!(branch, base = %record.base, "folded");
    Ok(())
}
