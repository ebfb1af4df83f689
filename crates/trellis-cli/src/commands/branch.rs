//! `trellis branch` — create, fold, restack, and submit stack branches.

use anyhow::{bail, Context, Result};
use tracing::debug;
use trellis_core::forge::github::GitHubForge;
use trellis_core::git::{Git, GitCli};
use trellis_core::ops::{self, CreateMode, CreateRequest, SubmitOptions};
use trellis_core::state::StoreError;
use trellis_core::storage::GitBackend;
use trellis_core::{Cancel, Store};

use crate::github;
use crate::prompt::ConsolePrompt;

type RepoStore = Store<GitBackend<GitCli>>;

fn open(cancel: &Cancel) -> Result<(GitCli, RepoStore)> {
    let git = GitCli::new(".");
    let store = match Store::open(GitBackend::new(git.clone()), cancel) {
        Ok(store) => store,
        Err(StoreError::NotInitialized) => {
            bail!("branch store not initialized; run `trellis init` first")
        }
        Err(err) => return Err(err).context("open store"),
    };
    Ok((git, store))
}

/// `trellis branch create NAME [--insert|--below] [-m MSG]`.
pub fn create(
    cancel: &Cancel,
    name: &str,
    insert: bool,
    below: bool,
    message: Option<String>,
) -> Result<()> {
    let (git, store) = open(cancel)?;
    let mode = if below {
        CreateMode::Below
    } else if insert {
        CreateMode::Insert
    } else {
        CreateMode::Above
    };
    ops::create(
        cancel,
        &git,
        &store,
        &CreateRequest {
            name: name.to_string(),
            message,
            mode,
        },
    )?;
    Ok(())
}

/// `trellis branch fold [--branch NAME]`.
pub fn fold(cancel: &Cancel, branch: Option<&str>) -> Result<()> {
    let (git, store) = open(cancel)?;
    let branch = match branch {
        Some(branch) => branch.to_string(),
        None => git.current_branch(cancel)?,
    };
    ops::fold(cancel, &git, &store, &branch)?;
    Ok(())
}

/// `trellis branch restack [--branch NAME]`.
pub fn restack(cancel: &Cancel, branch: Option<&str>) -> Result<()> {
    let (git, store) = open(cancel)?;
    let original = git.current_branch(cancel)?;
    let branch = match branch {
        Some(branch) => branch.to_string(),
        None => original.clone(),
    };
    ops::restack_branch(cancel, &git, &store, &branch)?;
    ops::restack_upstack(cancel, &git, &store, &branch)?;
    // Rebases move the checkout; end where we started.
    git.checkout(cancel, &original)?;
    Ok(())
}

/// Arguments for [`submit`].
pub struct SubmitArgs {
    pub branch: Option<String>,
    pub dry_run: bool,
    pub fill: bool,
    pub draft: Option<bool>,
    pub no_publish: bool,
    pub force: bool,
    pub title: Option<String>,
    pub body: Option<String>,
    pub remote: Option<String>,
    pub no_prompt: bool,
}

/// `trellis branch submit [flags]`.
pub fn submit(cancel: &Cancel, args: SubmitArgs) -> Result<()> {
    let (git, store) = open(cancel)?;

    let remote = resolve_remote(cancel, &git, args.remote.as_deref())?;
    let url = git
        .remote_url(cancel, &remote)
        .with_context(|| format!("get url of remote {remote}"))?;
    let repo = github::parse_github_repo(&url)
        .with_context(|| format!("remote {remote} ({url}) is not a GitHub repository"))?;
    let token = github::resolve_token()
        .context("no GitHub token found; export GITHUB_TOKEN or GH_TOKEN")?;
    let forge = GitHubForge::new(&repo, token)?;

    let mut prompt = ConsolePrompt::new(args.no_prompt);
    let outcome = ops::submit(
        cancel,
        &git,
        &store,
        &forge,
        &mut prompt,
        &remote,
        &SubmitOptions {
            branch: args.branch,
            dry_run: args.dry_run,
            fill: args.fill,
            draft: args.draft,
            no_publish: args.no_publish,
            force: args.force,
            title: args.title,
            body: args.body,
        },
    )?;

    debug!(branches = ?outcome.branches, "submit finished");
    Ok(())
}

fn resolve_remote(cancel: &Cancel, git: &GitCli, flag: Option<&str>) -> Result<String> {
    if let Some(remote) = flag {
        return Ok(remote.to_string());
    }
    let remotes = git.list_remotes(cancel).context("list remotes")?;
    match remotes.as_slice() {
        [] => bail!("repository has no remotes; add one to submit"),
        [only] => Ok(only.clone()),
        many => bail!(
            "repository has multiple remotes ({}); pass --remote",
            many.join(", ")
        ),
    }
}
