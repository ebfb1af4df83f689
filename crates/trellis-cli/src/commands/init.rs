//! `trellis init` — initialize the branch store.

use anyhow::{Context, Result};
use tracing::info;
use trellis_core::git::{Git, GitCli};
use trellis_core::state::StoreError;
use trellis_core::storage::GitBackend;
use trellis_core::{Cancel, Store};

/// Initializes (or with `force`, re-initializes) the store.
///
/// Without `--trunk`, the trunk is taken from the remote's default branch
/// when there is exactly one remote, and from the current branch
/// otherwise.
pub fn run(cancel: &Cancel, trunk: Option<&str>, force: bool) -> Result<()> {
    let git = GitCli::new(".");

    let trunk = match trunk {
        Some(trunk) => trunk.to_string(),
        None => detect_trunk(cancel, &git)?,
    };

    let backend = GitBackend::new(git);
    let store = match Store::init(backend, cancel, &trunk, force) {
        Ok(store) => store,
        Err(StoreError::AlreadyInitialized) => {
            anyhow::bail!("branch store already initialized (use --force to reset it)")
        }
        Err(err) => return Err(err).context("initialize store"),
    };

    info!(trunk = %store.trunk(), "initialized branch store");
    Ok(())
}

fn detect_trunk(cancel: &Cancel, git: &GitCli) -> Result<String> {
    let remotes = git.list_remotes(cancel).context("list remotes")?;
    if let [remote] = remotes.as_slice() {
        if let Ok(branch) = git.default_branch(cancel, remote) {
            return Ok(branch);
        }
    }
    git.current_branch(cancel)
        .context("detect trunk from current branch")
}
