//! Submit a branch: push it and create or update its change request.
//!
//! One invocation reconciles one branch with its remote counterpart and
//! the forge. The interesting cases:
//!
//! - The store knows no change request but the forge has exactly one open
//!   for the branch: it was probably created by hand. The store record is
//!   healed to point at it.
//! - The push and the forge submission are not atomic. The store write
//!   that records the pushed upstream name (and the change reference, once
//!   obtained) is deferred to the end of the operation and flushed on
//!   every exit path, so an interrupted submission is recoverable: the
//!   next run finds the pushed branch and adopts the existing change.
//! - Prepared title/body are persisted before the push so a failed push
//!   does not lose what the user typed.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use super::OpsError;
use crate::cancel::Cancel;
use crate::forge::{
    ChangeState, ChangeTemplate, EditChangeOptions, FindChangeItem, FindChangesOptions,
    ForgeRepository, SubmitChangeRequest,
};
use crate::git::{CommitMessage, Git, Oid, PushOptions};
use crate::prompt::Prompt;
use crate::stack::StackService;
use crate::state::{ChangeRef, PreparedBranch, Store, StoreError, UpdateRequest, UpsertRequest};
use crate::storage::Backend;

/// How long the submit form waits for the template fetch running next to
/// it.
const TEMPLATE_WAIT: Duration = Duration::from_secs(1);

/// Options for [`submit`].
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Branch to submit. Defaults to the current branch.
    pub branch: Option<String>,
    /// Report what would happen without doing it.
    pub dry_run: bool,
    /// Fill title and body from the commit messages instead of prompting.
    pub fill: bool,
    /// Desired draft status. `None` leaves it unchanged.
    pub draft: Option<bool>,
    /// Push the branch but do not create a change request.
    pub no_publish: bool,
    /// Push with plain force and skip the restack check.
    pub force: bool,
    /// Change title, skipping the prompt.
    pub title: Option<String>,
    /// Change body, skipping the prompt.
    pub body: Option<String>,
}

/// What a submit run touched.
#[derive(Debug, Clone, Default)]
pub struct SubmitOutcome {
    /// Branches whose change requests were created or updated. Empty for
    /// dry runs and push-only submissions. Callers may sync stack
    /// navigation comments for these.
    pub branches: Vec<String>,
}

/// Submits one branch to the forge via `remote`.
///
/// # Errors
///
/// Refuses the trunk, untracked branches, and (without `force`)
/// out-of-date branches. See [`OpsError`] for the full taxonomy.
pub fn submit<G, B, F, P>(
    cancel: &Cancel,
    git: &G,
    store: &Store<B>,
    forge: &F,
    prompt: &mut P,
    remote: &str,
    opts: &SubmitOptions,
) -> Result<SubmitOutcome, OpsError>
where
    G: Git,
    B: Backend,
    F: ForgeRepository + Sync,
    P: Prompt,
{
    let branch = match &opts.branch {
        Some(branch) => branch.clone(),
        None => git.current_branch(cancel)?,
    };
    if branch == store.trunk() {
        return Err(OpsError::Trunk {
            operation: "submit",
        });
    }

    let record = match store.lookup(cancel, &branch) {
        Ok(record) => record,
        Err(StoreError::NotExist) => {
            return Err(OpsError::Untracked { branch });
        }
        Err(err) => return Err(err.into()),
    };

    if !opts.force {
        let service = StackService::new(git, store);
        service.verify_restacked(cancel, &branch)?;
    }

    let mut outcome = SubmitOutcome::default();
    if !opts.dry_run && !opts.no_publish {
        outcome.branches.push(branch.clone());
    }

    let commit = git.peel_to_commit(cancel, &branch)?;
    // A branch renamed locally keeps its original remote identity.
    let upstream_name = record.upstream.clone().unwrap_or_else(|| branch.clone());

    let existing = find_existing_change(cancel, store, forge, &branch, &upstream_name, &record.change, opts)?;

    match existing {
        None => submit_new(
            cancel,
            git,
            store,
            forge,
            prompt,
            remote,
            &branch,
            &upstream_name,
            &record.base,
            &commit,
            opts,
        )
        .map(|()| outcome),
        Some(change) => {
            update_existing(
                cancel,
                git,
                forge,
                remote,
                &branch,
                &upstream_name,
                &record.base,
                &commit,
                &change,
                opts,
            )?;
            Ok(outcome)
        }
    }
}

/// Resolves the change request the branch is associated with, if any.
///
/// With a stored change reference, the change is fetched by id (a closed
/// change still counts as existing). Without one, the forge is searched
/// by branch; a single hit is adopted into the store.
fn find_existing_change<B, F>(
    cancel: &Cancel,
    store: &Store<B>,
    forge: &F,
    branch: &str,
    upstream_name: &str,
    stored: &Option<ChangeRef>,
    opts: &SubmitOptions,
) -> Result<Option<FindChangeItem>, OpsError>
where
    B: Backend,
    F: ForgeRepository,
{
    if let Some(change_ref) = stored {
        if change_ref.forge == forge.forge_id() {
            let meta = forge.unmarshal_change_metadata(&change_ref.data)?;
            if let Some(id) = meta.change_id() {
                return Ok(Some(forge.find_change_by_id(cancel, &id)?));
            }
        }
        // Tagged for a different forge; fall through to the search and
        // re-associate against the active one.
        warn!(
            branch,
            forge = %change_ref.forge,
            "stored change request belongs to another forge",
        );
    }

    let changes = forge.find_changes_by_branch(
        cancel,
        upstream_name,
        &FindChangesOptions {
            state: Some(ChangeState::Open),
            limit: Some(3),
        },
    )?;

    match changes.as_slice() {
        [] => Ok(None),
        [change] => {
            // A change exists but the store does not know it; probably
            // created by hand. Heal the record.
            info!(branch, change = %change.id, "found existing change request");
            if !opts.dry_run {
                let meta = forge.new_change_metadata(cancel, &change.id)?;
                let data = forge.marshal_change_metadata(&meta)?;
                store.update(
                    cancel,
                    &UpdateRequest {
                        upserts: vec![UpsertRequest {
                            name: branch.to_string(),
                            change: Some(ChangeRef {
                                forge: forge.forge_id().to_string(),
                                data,
                            }),
                            ..UpsertRequest::default()
                        }],
                        deletes: vec![],
                        message: format!("{branch}: associate existing change"),
                    },
                )?;
            }
            Ok(Some(change.clone()))
        }
        _ => Err(OpsError::MultipleOpenChanges {
            branch: branch.to_string(),
        }),
    }
}

/// Pushes `commit` to `refs/heads/<upstream_name>` on the remote.
///
/// Without `force`, an existing remote branch is only moved if it is
/// still where we last saw it (force-with-lease); a missing remote branch
/// needs no lease.
fn push_branch<G: Git>(
    cancel: &Cancel,
    git: &G,
    remote: &str,
    upstream_name: &str,
    commit: &Oid,
    force: bool,
) -> Result<(), OpsError> {
    let mut push = PushOptions {
        remote: remote.to_string(),
        refspec: format!("{commit}:refs/heads/{upstream_name}"),
        force,
        force_with_lease: None,
    };
    if !force {
        if let Ok(prior) = git.peel_to_commit(cancel, &format!("{remote}/{upstream_name}")) {
            push.force_with_lease = Some(format!("{upstream_name}:{prior}"));
        }
    }
    git.push(cancel, &push).map_err(|source| OpsError::PushRejected {
        branch: upstream_name.to_string(),
        source,
    })
}

/// Records the pushed branch state when dropped, no matter how the
/// surrounding submission ended.
struct DeferredUpdate<'a, B: Backend> {
    store: &'a Store<B>,
    upsert: Option<UpsertRequest>,
    message: String,
}

impl<'a, B: Backend> DeferredUpdate<'a, B> {
    fn new(store: &'a Store<B>, upsert: UpsertRequest, message: String) -> Self {
        Self {
            store,
            upsert: Some(upsert),
            message,
        }
    }

    fn set_change(&mut self, change: ChangeRef) {
        if let Some(upsert) = &mut self.upsert {
            upsert.change = Some(change);
        }
    }
}

impl<B: Backend> Drop for DeferredUpdate<'_, B> {
    fn drop(&mut self) {
        let Some(upsert) = self.upsert.take() else {
            return;
        };
        // Flush even when the submission was cancelled mid-way; losing
        // this write would orphan the pushed branch.
        let result = self.store.update(
            &Cancel::new(),
            &UpdateRequest {
                upserts: vec![upsert],
                deletes: vec![],
                message: self.message.clone(),
            },
        );
        if let Err(err) = result {
            warn!(error = %err, "could not record submitted branch state");
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn submit_new<G, B, F, P>(
    cancel: &Cancel,
    git: &G,
    store: &Store<B>,
    forge: &F,
    prompt: &mut P,
    remote: &str,
    branch: &str,
    upstream_name: &str,
    base: &str,
    commit: &Oid,
    opts: &SubmitOptions,
) -> Result<(), OpsError>
where
    G: Git,
    B: Backend,
    F: ForgeRepository + Sync,
    P: Prompt,
{
    if opts.dry_run {
        if opts.no_publish {
            info!("would push branch {branch}");
        } else {
            info!("would create a change request for {branch}");
        }
        return Ok(());
    }

    let prepared = if opts.no_publish {
        None
    } else {
        Some(prepare(cancel, git, store, forge, prompt, branch, base, opts)?)
    };

    push_branch(cancel, git, remote, upstream_name, commit, opts.force)?;

    // The push happened; whatever happens next, the store must remember
    // the upstream name so the next run can pick up from here.
    let mut deferred = DeferredUpdate::new(
        store,
        UpsertRequest {
            name: branch.to_string(),
            upstream: Some(upstream_name.to_string()),
            ..UpsertRequest::default()
        },
        format!("branch submit {branch}"),
    );

    if let Err(err) = git.set_branch_upstream(cancel, branch, &format!("{remote}/{branch}")) {
        warn!(branch, error = %err, "could not set upstream");
    }

    match prepared {
        Some(prepared) => {
            let submitted = forge.submit_change(
                cancel,
                &SubmitChangeRequest {
                    subject: prepared.subject,
                    body: prepared.body,
                    head: upstream_name.to_string(),
                    base: base.to_string(),
                    draft: prepared.draft,
                },
            )?;
            if let Err(err) = store.clear_prepared(cancel, branch) {
                warn!(branch, error = %err, "could not clear prepared change");
            }
            info!(change = %submitted.id, url = %submitted.url, "created change request");

            let meta = forge.new_change_metadata(cancel, &submitted.id)?;
            let data = forge.marshal_change_metadata(&meta)?;
            deferred.set_change(ChangeRef {
                forge: forge.forge_id().to_string(),
                data,
            });
        }
        None => info!("pushed {branch}"),
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn update_existing<G, F>(
    cancel: &Cancel,
    git: &G,
    forge: &F,
    remote: &str,
    branch: &str,
    upstream_name: &str,
    base: &str,
    commit: &Oid,
    change: &FindChangeItem,
    opts: &SubmitOptions,
) -> Result<(), OpsError>
where
    G: Git,
    F: ForgeRepository,
{
    if opts.no_publish {
        warn!(
            url = %change.url,
            "ignoring --no-publish: {branch} was already published",
        );
    }

    let needs_push = change.head_hash != *commit;
    let needs_base = change.base_name != base;
    let needs_draft = opts.draft.is_some_and(|draft| change.draft != draft);

    let mut updates = Vec::new();
    if needs_push {
        updates.push("push branch".to_string());
    }
    if needs_base {
        updates.push(format!("set base to {base}"));
    }
    if let Some(draft) = opts.draft {
        if needs_draft {
            updates.push(format!("set draft to {draft}"));
        }
    }

    if updates.is_empty() {
        info!(change = %change.id, url = %change.url, "change request is up-to-date");
        return Ok(());
    }

    if opts.dry_run {
        info!("would update change request {}", change.id);
        for update in &updates {
            info!("  - {update}");
        }
        return Ok(());
    }

    if needs_push {
        push_branch(cancel, git, remote, upstream_name, commit, opts.force)?;
    }

    if needs_base || needs_draft {
        forge.edit_change(
            cancel,
            &change.id,
            &EditChangeOptions {
                base: needs_base.then(|| base.to_string()),
                draft: if needs_draft { opts.draft } else { None },
            },
        )?;
    }

    info!(change = %change.id, url = %change.url, "updated change request");
    Ok(())
}

struct PreparedChange {
    subject: String,
    body: String,
    draft: bool,
}

/// Collects the change title, body, and draft status, prompting where
/// needed. The repository's change templates are fetched on a side thread
/// while the user types; the body step waits at most [`TEMPLATE_WAIT`]
/// for them.
fn prepare<G, B, F, P>(
    cancel: &Cancel,
    git: &G,
    store: &Store<B>,
    forge: &F,
    prompt: &mut P,
    branch: &str,
    base: &str,
    opts: &SubmitOptions,
) -> Result<PreparedChange, OpsError>
where
    G: Git,
    B: Backend,
    F: ForgeRepository + Sync,
    P: Prompt,
{
    let fetch_cancel = Cancel::new();
    thread::scope(|scope| {
        let (tx, rx) = mpsc::sync_channel::<Vec<ChangeTemplate>>(1);
        {
            let fetch_cancel = fetch_cancel.clone();
            scope.spawn(move || {
                let templates = match forge.list_change_templates(&fetch_cancel) {
                    Ok(templates) => templates,
                    Err(err) => {
                        warn!(error = %err, "could not list change templates");
                        Vec::new()
                    }
                };
                let _ = tx.send(templates);
            });
        }

        let result = prepare_inner(cancel, git, store, prompt, branch, base, opts, &rx);
        // Stop an unconsumed fetch at its next cancellation check; the
        // scope joins the fetch thread before returning.
        fetch_cancel.cancel();
        result
    })
}

#[allow(clippy::too_many_arguments)]
fn prepare_inner<G, B, P>(
    cancel: &Cancel,
    git: &G,
    store: &Store<B>,
    prompt: &mut P,
    branch: &str,
    base: &str,
    opts: &SubmitOptions,
    templates: &mpsc::Receiver<Vec<ChangeTemplate>>,
) -> Result<PreparedChange, OpsError>
where
    G: Git,
    B: Backend,
    P: Prompt,
{
    let messages = git.commit_message_range(cancel, branch, base)?;
    if messages.is_empty() {
        return Err(OpsError::NoCommits {
            branch: branch.to_string(),
        });
    }
    let (default_subject, default_body) = derive_defaults(&messages);

    let mut need_title = opts.title.is_none();
    let mut need_body = opts.body.is_none();
    let mut title = opts.title.clone().unwrap_or(default_subject);
    let mut body = opts.body.clone().unwrap_or(default_body);
    let mut draft = opts.draft;

    if opts.fill {
        if need_body {
            // Take the first template, if one arrives in time.
            let fetched = templates.recv_timeout(TEMPLATE_WAIT).unwrap_or_default();
            if let Some(template) = fetched.first() {
                if !body.is_empty() {
                    body.push_str("\n\n");
                }
                body.push_str(&template.body);
            }
        }
        need_title = false;
        need_body = false;
    }

    let want_draft_prompt = prompt.can_prompt() && draft.is_none();
    if (need_title || need_body || want_draft_prompt) && !opts.fill {
        if !prompt.can_prompt() {
            return Err(OpsError::NoPrompt);
        }

        if need_title || need_body {
            if let Some(previous) = store.load_prepared(cancel, branch)? {
                let recover = prompt.confirm(
                    cancel,
                    "Recover previously filled information?",
                    "A previous submission attempt saved a title and body \
                     for this branch. Recover and edit them?",
                    true,
                )?;
                if recover {
                    title = previous.subject;
                    body = previous.body;
                    need_title = false;
                    need_body = false;
                } else if let Err(err) = store.clear_prepared(cancel, branch) {
                    warn!(branch, error = %err, "could not clear prepared change");
                }
            }
        }

        if need_title {
            title = prompt.input(cancel, "Title", "Short summary of the change", &title)?;
        }

        if need_body {
            let fetched = templates.recv_timeout(TEMPLATE_WAIT).unwrap_or_default();
            let template = match fetched.as_slice() {
                [] => None,
                [only] => Some(only),
                many => {
                    let labels: Vec<String> =
                        many.iter().map(|t| t.filename.clone()).collect();
                    let index = prompt.select(cancel, "Template", &labels)?;
                    many.get(index)
                }
            };
            if let Some(template) = template {
                if !body.is_empty() {
                    body.push_str("\n\n");
                }
                body.push_str(&template.body);
            }
            body = prompt.edit(cancel, "Body", &body)?;
        }

        if draft.is_none() {
            draft = Some(prompt.confirm(cancel, "Draft", "Mark the change as a draft?", false)?);
        }
    }

    if title.trim().is_empty() {
        return Err(OpsError::BlankSubject);
    }

    let prepared = PreparedBranch {
        name: branch.to_string(),
        subject: title.clone(),
        body: body.clone(),
    };
    if let Err(err) = store.save_prepared(cancel, &prepared) {
        warn!(
            branch,
            error = %err,
            "could not save prepared change; a failed push will lose it",
        );
    }

    Ok(PreparedChange {
        subject: title,
        body,
        draft: draft.unwrap_or(false),
    })
}

/// Default title and body from the commit messages, newest first on
/// input.
///
/// A single commit contributes its subject and body directly. Multiple
/// commits: the oldest subject becomes the title, and the body is every
/// message (subject, then body) oldest first, blank-line separated.
fn derive_defaults(messages: &[CommitMessage]) -> (String, String) {
    if let [only] = messages {
        return (only.subject.clone(), only.body.clone());
    }

    let subject = messages
        .last()
        .map(|msg| msg.subject.clone())
        .unwrap_or_default();
    let mut body = String::new();
    for msg in messages.iter().rev() {
        if !body.is_empty() {
            body.push_str("\n\n");
        }
        body.push_str(&msg.subject);
        if !msg.body.is_empty() {
            body.push_str("\n\n");
            body.push_str(&msg.body);
        }
    }
    (subject, body)
}
