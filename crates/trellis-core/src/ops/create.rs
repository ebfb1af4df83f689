//! Create a branch above, inside, or below the current stack position.

use tracing::warn;

use super::{restack_upstack, OpsError};
use crate::cancel::Cancel;
use crate::git::{CommitRequest, CreateBranchRequest, Git, Oid};
use crate::stack::StackService;
use crate::state::{Store, StoreError, UpdateRequest, UpsertRequest};
use crate::storage::Backend;

/// Where the new branch lands relative to the current branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreateMode {
    /// On top of the current branch.
    #[default]
    Above,
    /// On top of the current branch, taking over its children.
    Insert,
    /// Between the current branch and its base.
    Below,
}

/// Request for [`create`].
#[derive(Debug, Clone)]
pub struct CreateRequest {
    /// Name of the new branch.
    pub name: String,
    /// Commit message. `None` lets git open the editor.
    pub message: Option<String>,
    /// Stack position of the new branch.
    pub mode: CreateMode,
}

/// Creates a new tracked branch with a commit from the current index.
///
/// The commit is created on a detached `HEAD` at the computed base, the
/// new branch is checked out, and the store is updated atomically: the new
/// record plus one reparented record per child taken over. Reparented
/// subtrees are restacked onto the new branch.
///
/// On any error after the detach, the original branch is checked out
/// again.
///
/// # Errors
///
/// Returns [`OpsError::BelowTrunk`] for `--below` on the trunk, and
/// [`OpsError::Untracked`] for `--below` on an untracked branch.
pub fn create<G: Git, B: Backend>(
    cancel: &Cancel,
    git: &G,
    store: &Store<B>,
    req: &CreateRequest,
) -> Result<(), OpsError> {
    let current = git.current_branch(cancel)?;
    let head = git.peel_to_commit(cancel, "HEAD")?;
    let staged = git.diff_index(cancel, head.as_str())?;

    let (base_name, base_hash, reparent): (String, Oid, Vec<String>) = match req.mode {
        CreateMode::Above => (current.clone(), head, Vec::new()),
        CreateMode::Insert => {
            let service = StackService::new(git, store);
            let children = service.children(cancel, &current)?;
            (current.clone(), head, children)
        }
        CreateMode::Below => {
            if current == store.trunk() {
                return Err(OpsError::BelowTrunk);
            }
            let record = match store.lookup(cancel, &current) {
                Ok(record) => record,
                Err(StoreError::NotExist) => {
                    return Err(OpsError::Untracked {
                        branch: current.clone(),
                    });
                }
                Err(err) => return Err(err.into()),
            };
            (record.base, record.base_hash, vec![current.clone()])
        }
    };

    git.detach_head(cancel, &base_name)?;

    let result = finish_create(
        cancel,
        git,
        store,
        req,
        &base_name,
        &base_hash,
        staged.is_empty(),
        &reparent,
    );
    if result.is_err() {
        // Put the user back where they started. The restore runs even
        // when the failure was a cancellation.
        if let Err(restore) = git.checkout(&Cancel::new(), &current) {
            warn!(branch = %current, error = %restore, "could not restore checkout");
        }
    }
    result
}

#[allow(clippy::too_many_arguments)]
fn finish_create<G: Git, B: Backend>(
    cancel: &Cancel,
    git: &G,
    store: &Store<B>,
    req: &CreateRequest,
    base_name: &str,
    base_hash: &Oid,
    index_clean: bool,
    reparent: &[String],
) -> Result<(), OpsError> {
    git.commit(
        cancel,
        &CommitRequest {
            message: req.message.clone(),
            allow_empty: index_clean,
        },
    )?;

    git.create_branch(
        cancel,
        &CreateBranchRequest {
            name: req.name.clone(),
            head: "HEAD".to_string(),
        },
    )?;
    git.checkout(cancel, &req.name)?;

    let mut upserts = vec![UpsertRequest {
        name: req.name.clone(),
        base: Some(base_name.to_string()),
        base_hash: Some(base_hash.clone()),
        ..UpsertRequest::default()
    }];
    for child in reparent {
        upserts.push(UpsertRequest {
            name: child.clone(),
            base: Some(req.name.clone()),
            ..UpsertRequest::default()
        });
    }

    let message = match req.mode {
        CreateMode::Above => format!("create branch {}", req.name),
        CreateMode::Insert => format!("insert branch {} above {base_name}", req.name),
        CreateMode::Below => format!("insert branch {} below {base_name}", req.name),
    };
    store.update(
        cancel,
        &UpdateRequest {
            upserts,
            deletes: vec![],
            message,
        },
    )?;

    if !reparent.is_empty() {
        restack_upstack(cancel, git, store, &req.name)?;
        // Restacking rebases through the subtree; end up back on the new
        // branch.
        git.checkout(cancel, &req.name)?;
    }
    Ok(())
}
