//! Mock collaborators for unit tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::cancel::Cancel;
use crate::forge::{
    ChangeId, ChangeMetadata, ChangeState, ChangeTemplate, EditChangeOptions, FindChangeItem,
    FindChangesOptions, ForgeError, ForgeRepository, SubmitChangeRequest, SubmittedChange,
};
use crate::git::{
    CommitMessage, CommitRequest, CreateBranchRequest, DeleteBranchOptions, FetchOptions, Git,
    GitError, Oid, PushOptions, RebaseRequest,
};
use crate::prompt::{Prompt, PromptError};

/// Shared, ordered log of side effects across mocks.
pub type Events = Arc<Mutex<Vec<String>>>;

/// Creates an empty event log.
pub fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

fn record(events: &Events, entry: String) {
    events.lock().expect("events lock").push(entry);
}

fn unknown_ref(reference: &str) -> GitError {
    GitError::Exit {
        command: "rev-parse".to_string(),
        stderr: format!("unknown ref {reference}"),
    }
}

#[derive(Debug, Default)]
struct GitState {
    current_branch: String,
    commits: BTreeMap<String, Oid>,
    fork_points: BTreeMap<(String, String), Oid>,
    messages: BTreeMap<(String, String), Vec<CommitMessage>>,
    remotes: Vec<String>,
    staged: Vec<String>,
    fail_push: bool,
    pushes: Vec<PushOptions>,
    commit_counter: u64,
}

/// Scriptable in-memory [`Git`].
pub struct MockGit {
    state: Mutex<GitState>,
    events: Events,
}

impl MockGit {
    /// Creates a mock on `main` with one `origin` remote.
    pub fn new() -> Self {
        Self::with_events(events())
    }

    /// Creates a mock recording side effects into a shared log.
    pub fn with_events(events: Events) -> Self {
        Self {
            state: Mutex::new(GitState {
                current_branch: "main".to_string(),
                remotes: vec!["origin".to_string()],
                ..GitState::default()
            }),
            events,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GitState> {
        self.state.lock().expect("git mock lock")
    }

    /// Sets the checked-out branch.
    pub fn set_current(&self, name: &str) {
        self.lock().current_branch = name.to_string();
    }

    /// Maps a commit-ish to an object id.
    pub fn set_commit(&self, reference: &str, oid: Oid) {
        self.lock().commits.insert(reference.to_string(), oid);
    }

    /// Sets the fork point (and merge base) of a branch pair.
    pub fn set_fork_point(&self, base: &str, branch: &str, oid: Oid) {
        self.lock()
            .fork_points
            .insert((base.to_string(), branch.to_string()), oid);
    }

    /// Sets the commit messages reported for `base..head`.
    pub fn set_messages(&self, head: &str, base: &str, messages: Vec<CommitMessage>) {
        self.lock()
            .messages
            .insert((head.to_string(), base.to_string()), messages);
    }

    /// Sets the staged paths reported by `diff_index`.
    pub fn set_staged(&self, paths: &[&str]) {
        self.lock().staged = paths.iter().map(ToString::to_string).collect();
    }

    /// Makes every push fail like a lost force-with-lease.
    pub fn fail_pushes(&self) {
        self.lock().fail_push = true;
    }

    /// Returns the pushes performed so far.
    pub fn pushes(&self) -> Vec<PushOptions> {
        self.lock().pushes.clone()
    }

    /// Returns the recorded side effects.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("events lock").clone()
    }
}

impl Git for MockGit {
    fn current_branch(&self, cancel: &Cancel) -> Result<String, GitError> {
        cancel.bail()?;
        Ok(self.lock().current_branch.clone())
    }

    fn local_branches(&self, cancel: &Cancel) -> Result<Vec<String>, GitError> {
        cancel.bail()?;
        Ok(self
            .lock()
            .commits
            .keys()
            .filter(|name| *name != "HEAD" && !name.contains('/'))
            .cloned()
            .collect())
    }

    fn peel_to_commit(&self, cancel: &Cancel, reference: &str) -> Result<Oid, GitError> {
        cancel.bail()?;
        self.lock()
            .commits
            .get(reference)
            .cloned()
            .ok_or_else(|| unknown_ref(reference))
    }

    fn commit_message_range(
        &self,
        cancel: &Cancel,
        head: &str,
        base: &str,
    ) -> Result<Vec<CommitMessage>, GitError> {
        cancel.bail()?;
        Ok(self
            .lock()
            .messages
            .get(&(head.to_string(), base.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn create_branch(&self, cancel: &Cancel, req: &CreateBranchRequest) -> Result<(), GitError> {
        cancel.bail()?;
        record(&self.events, format!("create_branch {} {}", req.name, req.head));
        let mut state = self.lock();
        if let Some(oid) = state.commits.get(&req.head).cloned() {
            state.commits.insert(req.name.clone(), oid);
        }
        Ok(())
    }

    fn delete_branch(
        &self,
        cancel: &Cancel,
        name: &str,
        opts: &DeleteBranchOptions,
    ) -> Result<(), GitError> {
        cancel.bail()?;
        record(
            &self.events,
            format!("delete_branch {name} force={}", opts.force),
        );
        self.lock().commits.remove(name);
        Ok(())
    }

    fn checkout(&self, cancel: &Cancel, branch: &str) -> Result<(), GitError> {
        cancel.bail()?;
        record(&self.events, format!("checkout {branch}"));
        self.lock().current_branch = branch.to_string();
        Ok(())
    }

    fn detach_head(&self, cancel: &Cancel, reference: &str) -> Result<(), GitError> {
        cancel.bail()?;
        record(&self.events, format!("detach_head {reference}"));
        Ok(())
    }

    fn commit(&self, cancel: &Cancel, req: &CommitRequest) -> Result<(), GitError> {
        cancel.bail()?;
        record(
            &self.events,
            format!(
                "commit allow_empty={} message={:?}",
                req.allow_empty,
                req.message.as_deref().unwrap_or("")
            ),
        );
        // Each commit advances HEAD to a fresh id.
        let mut state = self.lock();
        state.commit_counter += 1;
        let oid: Oid = format!("{:040x}", 0x00c0_ffee_u64 + state.commit_counter)
            .parse()
            .expect("generated oid");
        state.commits.insert("HEAD".to_string(), oid);
        Ok(())
    }

    fn diff_index(&self, cancel: &Cancel, _treeish: &str) -> Result<Vec<String>, GitError> {
        cancel.bail()?;
        Ok(self.lock().staged.clone())
    }

    fn push(&self, cancel: &Cancel, opts: &PushOptions) -> Result<(), GitError> {
        cancel.bail()?;
        if self.lock().fail_push {
            return Err(GitError::Exit {
                command: "push".to_string(),
                stderr: "stale info, remote ref has moved".to_string(),
            });
        }
        record(&self.events, format!("push {} {}", opts.remote, opts.refspec));
        self.lock().pushes.push(opts.clone());
        Ok(())
    }

    fn fetch(&self, cancel: &Cancel, opts: &FetchOptions) -> Result<(), GitError> {
        cancel.bail()?;
        record(
            &self.events,
            format!("fetch {} {}", opts.remote, opts.refspecs.join(" ")),
        );
        Ok(())
    }

    fn rebase(&self, cancel: &Cancel, req: &RebaseRequest) -> Result<(), GitError> {
        cancel.bail()?;
        record(
            &self.events,
            format!("rebase --onto {} {} {}", req.onto, req.upstream, req.branch),
        );
        Ok(())
    }

    fn merge_base(&self, cancel: &Cancel, a: &str, b: &str) -> Result<Oid, GitError> {
        cancel.bail()?;
        self.lock()
            .fork_points
            .get(&(a.to_string(), b.to_string()))
            .cloned()
            .ok_or_else(|| unknown_ref(a))
    }

    fn fork_point(&self, cancel: &Cancel, base: &str, branch: &str) -> Result<Oid, GitError> {
        cancel.bail()?;
        self.lock()
            .fork_points
            .get(&(base.to_string(), branch.to_string()))
            .cloned()
            .ok_or_else(|| unknown_ref(base))
    }

    fn set_branch_upstream(
        &self,
        cancel: &Cancel,
        branch: &str,
        upstream: &str,
    ) -> Result<(), GitError> {
        cancel.bail()?;
        record(&self.events, format!("set_upstream {branch} {upstream}"));
        Ok(())
    }

    fn default_branch(&self, cancel: &Cancel, _remote: &str) -> Result<String, GitError> {
        cancel.bail()?;
        Ok("main".to_string())
    }

    fn list_remotes(&self, cancel: &Cancel) -> Result<Vec<String>, GitError> {
        cancel.bail()?;
        Ok(self.lock().remotes.clone())
    }

    fn remote_url(&self, cancel: &Cancel, _remote: &str) -> Result<String, GitError> {
        cancel.bail()?;
        Ok("git@github.com:acme/widgets.git".to_string())
    }
}

#[derive(Debug, Default)]
struct ForgeState {
    by_branch: BTreeMap<String, Vec<FindChangeItem>>,
    by_id: BTreeMap<String, FindChangeItem>,
    templates: Vec<ChangeTemplate>,
    submits: Vec<SubmitChangeRequest>,
    edits: Vec<(ChangeId, EditChangeOptions)>,
    next_number: u64,
    fail_submit: bool,
}

/// Scriptable in-memory [`ForgeRepository`].
pub struct MockForge {
    state: Mutex<ForgeState>,
    events: Events,
}

impl MockForge {
    /// Creates an empty forge.
    pub fn new() -> Self {
        Self::with_events(events())
    }

    /// Creates a forge recording calls into a shared log.
    pub fn with_events(events: Events) -> Self {
        Self {
            state: Mutex::new(ForgeState {
                next_number: 100,
                ..ForgeState::default()
            }),
            events,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ForgeState> {
        self.state.lock().expect("forge mock lock")
    }

    /// Registers an open change for a branch.
    pub fn add_change(&self, branch: &str, change: FindChangeItem) {
        let mut state = self.lock();
        state.by_id.insert(change.id.0.clone(), change.clone());
        state.by_branch.entry(branch.to_string()).or_default().push(change);
    }

    /// Makes templates available.
    pub fn set_templates(&self, templates: Vec<ChangeTemplate>) {
        self.lock().templates = templates;
    }

    /// Makes every submission fail with a server error.
    pub fn fail_submits(&self) {
        self.lock().fail_submit = true;
    }

    /// Returns the changes submitted so far.
    pub fn submits(&self) -> Vec<SubmitChangeRequest> {
        self.lock().submits.clone()
    }

    /// Returns the edits performed so far.
    pub fn edits(&self) -> Vec<(ChangeId, EditChangeOptions)> {
        self.lock().edits.clone()
    }

    /// Returns the recorded calls.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("events lock").clone()
    }
}

impl ForgeRepository for MockForge {
    fn forge_id(&self) -> &'static str {
        "github"
    }

    fn find_changes_by_branch(
        &self,
        cancel: &Cancel,
        branch: &str,
        opts: &FindChangesOptions,
    ) -> Result<Vec<FindChangeItem>, ForgeError> {
        cancel.bail()?;
        record(&self.events, format!("find_changes_by_branch {branch}"));
        let mut found = self
            .lock()
            .by_branch
            .get(branch)
            .cloned()
            .unwrap_or_default();
        if let Some(state) = opts.state {
            found.retain(|change| change.state == state);
        }
        if let Some(limit) = opts.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    fn find_change_by_id(
        &self,
        cancel: &Cancel,
        id: &ChangeId,
    ) -> Result<FindChangeItem, ForgeError> {
        cancel.bail()?;
        record(&self.events, format!("find_change_by_id {id}"));
        self.lock()
            .by_id
            .get(&id.0)
            .cloned()
            .ok_or_else(|| ForgeError::Api {
                status: 404,
                message: format!("no change {id}"),
            })
    }

    fn submit_change(
        &self,
        cancel: &Cancel,
        req: &SubmitChangeRequest,
    ) -> Result<SubmittedChange, ForgeError> {
        cancel.bail()?;
        record(&self.events, format!("submit_change {}", req.head));
        let mut state = self.lock();
        if state.fail_submit {
            return Err(ForgeError::Api {
                status: 502,
                message: "submit failed".to_string(),
            });
        }
        state.next_number += 1;
        let number = state.next_number;
        state.submits.push(req.clone());
        Ok(SubmittedChange {
            id: ChangeId(number.to_string()),
            url: format!("https://github.example/acme/widgets/pull/{number}"),
        })
    }

    fn edit_change(
        &self,
        cancel: &Cancel,
        id: &ChangeId,
        opts: &EditChangeOptions,
    ) -> Result<(), ForgeError> {
        cancel.bail()?;
        record(&self.events, format!("edit_change {id}"));
        self.lock().edits.push((id.clone(), opts.clone()));
        Ok(())
    }

    fn list_change_templates(&self, cancel: &Cancel) -> Result<Vec<ChangeTemplate>, ForgeError> {
        cancel.bail()?;
        record(&self.events, "list_change_templates".to_string());
        Ok(self.lock().templates.clone())
    }

    fn new_change_metadata(
        &self,
        cancel: &Cancel,
        id: &ChangeId,
    ) -> Result<ChangeMetadata, ForgeError> {
        cancel.bail()?;
        let number = id
            .0
            .parse()
            .map_err(|_| ForgeError::Parse(format!("bad change id {id}")))?;
        Ok(ChangeMetadata::GitHub { number })
    }

    fn marshal_change_metadata(
        &self,
        meta: &ChangeMetadata,
    ) -> Result<serde_json::Value, ForgeError> {
        match meta {
            ChangeMetadata::GitHub { number } => Ok(serde_json::json!({ "number": number })),
            ChangeMetadata::Unknown { data, .. } => Ok(data.clone()),
        }
    }

    fn unmarshal_change_metadata(
        &self,
        data: &serde_json::Value,
    ) -> Result<ChangeMetadata, ForgeError> {
        let number = data
            .get("number")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| ForgeError::Parse(format!("not GitHub metadata: {data}")))?;
        Ok(ChangeMetadata::GitHub { number })
    }
}

/// A prompt that replays scripted answers, falling back to defaults.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    enabled: bool,
    inputs: VecDeque<String>,
    confirms: VecDeque<bool>,
    selects: VecDeque<usize>,
    edits: VecDeque<String>,
    /// Titles of the prompts that ran, in order.
    pub log: Vec<String>,
}

impl ScriptedPrompt {
    /// Creates an enabled prompt with no scripted answers: every prompt
    /// accepts its default.
    pub fn accepting() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Creates a disabled prompt.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Queues an input answer.
    pub fn push_input(&mut self, value: &str) {
        self.inputs.push_back(value.to_string());
    }

    /// Queues a confirm answer.
    pub fn push_confirm(&mut self, value: bool) {
        self.confirms.push_back(value);
    }

    /// Queues a select answer.
    pub fn push_select(&mut self, index: usize) {
        self.selects.push_back(index);
    }

    /// Queues an edit answer.
    pub fn push_edit(&mut self, value: &str) {
        self.edits.push_back(value.to_string());
    }
}

impl Prompt for ScriptedPrompt {
    fn can_prompt(&self) -> bool {
        self.enabled
    }

    fn input(
        &mut self,
        cancel: &Cancel,
        title: &str,
        _description: &str,
        initial: &str,
    ) -> Result<String, PromptError> {
        cancel.bail()?;
        if !self.enabled {
            return Err(PromptError::Disabled);
        }
        self.log.push(format!("input {title}"));
        Ok(self
            .inputs
            .pop_front()
            .unwrap_or_else(|| initial.to_string()))
    }

    fn select(
        &mut self,
        cancel: &Cancel,
        title: &str,
        options: &[String],
    ) -> Result<usize, PromptError> {
        cancel.bail()?;
        if !self.enabled {
            return Err(PromptError::Disabled);
        }
        self.log.push(format!("select {title} ({})", options.len()));
        Ok(self.selects.pop_front().unwrap_or(0))
    }

    fn confirm(
        &mut self,
        cancel: &Cancel,
        title: &str,
        _description: &str,
        default: bool,
    ) -> Result<bool, PromptError> {
        cancel.bail()?;
        if !self.enabled {
            return Err(PromptError::Disabled);
        }
        self.log.push(format!("confirm {title}"));
        Ok(self.confirms.pop_front().unwrap_or(default))
    }

    fn edit(&mut self, cancel: &Cancel, title: &str, initial: &str) -> Result<String, PromptError> {
        cancel.bail()?;
        if !self.enabled {
            return Err(PromptError::Disabled);
        }
        self.log.push(format!("edit {title}"));
        Ok(self
            .edits
            .pop_front()
            .unwrap_or_else(|| initial.to_string()))
    }
}
