//! Move branches back on top of their bases after the stack changed.

use tracing::{debug, info};

use super::OpsError;
use crate::cancel::Cancel;
use crate::git::{Git, RebaseRequest};
use crate::stack::StackService;
use crate::state::{Store, StoreError, UpdateRequest, UpsertRequest};
use crate::storage::Backend;

/// Rebases `branch` onto the current tip of its base and records the new
/// base commit. A branch whose recorded base commit already matches the
/// base tip is left alone.
///
/// # Errors
///
/// Returns [`OpsError::Untracked`] for branches without a record. Rebase
/// conflicts surface as git errors, leaving the repository mid-rebase for
/// the user to resolve.
pub fn restack_branch<G: Git, B: Backend>(
    cancel: &Cancel,
    git: &G,
    store: &Store<B>,
    branch: &str,
) -> Result<(), OpsError> {
    let record = match store.lookup(cancel, branch) {
        Ok(record) => record,
        Err(StoreError::NotExist) => {
            return Err(OpsError::Untracked {
                branch: branch.to_string(),
            });
        }
        Err(err) => return Err(err.into()),
    };

    let base_tip = git.peel_to_commit(cancel, &record.base)?;
    if base_tip == record.base_hash {
        debug!(branch, base = %record.base, "already restacked");
        return Ok(());
    }

    git.rebase(
        cancel,
        &RebaseRequest {
            onto: base_tip.to_string(),
            upstream: record.base_hash.to_string(),
            branch: branch.to_string(),
        },
    )?;

    store.update(
        cancel,
        &UpdateRequest {
            upserts: vec![UpsertRequest {
                name: branch.to_string(),
                base_hash: Some(base_tip.clone()),
                ..UpsertRequest::default()
            }],
            deletes: vec![],
            message: format!("restack {branch} on {}", record.base),
        },
    )?;
    info!(branch, base = %record.base, "restacked");
    Ok(())
}

/// Restacks every descendant of `root` in topological order, parents
/// before children. Returns the branches processed.
///
/// # Errors
///
/// Stops at the first branch that fails; earlier branches stay restacked.
pub fn restack_upstack<G: Git, B: Backend>(
    cancel: &Cancel,
    git: &G,
    store: &Store<B>,
    root: &str,
) -> Result<Vec<String>, OpsError> {
    let service = StackService::new(git, store);
    let order = service.descendants(cancel, root)?;
    for branch in &order {
        restack_branch(cancel, git, store, branch)?;
    }
    Ok(order)
}
