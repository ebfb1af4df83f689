//! Subprocess-backed implementation of the git capabilities.
//!
//! All git commands are spawned as `git -C <dir>` with explicit args and a
//! pinned environment: `GIT_TERMINAL_PROMPT=0` so a missing credential
//! fails loudly instead of hanging on a hidden prompt, and
//! `GIT_CONFIG_NOSYSTEM=1` so system-wide configuration cannot inject
//! aliases or credential helpers into our invocations. Commit creation
//! without a message is the one interactive exception: it inherits the
//! terminal so git can open the configured editor.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::trace;

use super::{
    CommitMessage, CommitRequest, CreateBranchRequest, DeleteBranchOptions, FetchOptions, Git,
    GitError, Oid, PushOptions, RebaseRequest, StateGit, TreeBlob,
};
use crate::cancel::Cancel;

const RECORD_SEP: char = '\x1e';
const UNIT_SEP: char = '\x1f';

/// Runs git commands against one repository directory.
#[derive(Debug, Clone)]
pub struct GitCli {
    dir: PathBuf,
}

impl GitCli {
    /// Creates a handle for the repository at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The repository directory this handle operates on.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(&self.dir)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_CONFIG_NOSYSTEM", "1");
        cmd
    }

    fn run_raw(&self, cancel: &Cancel, args: &[&str]) -> Result<Vec<u8>, GitError> {
        cancel.bail()?;
        trace!(command = %args.join(" "), "git");
        let output = self
            .command(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| GitError::Spawn { source })?;
        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(exit_error(args, &output.stderr))
        }
    }

    fn run(&self, cancel: &Cancel, args: &[&str]) -> Result<String, GitError> {
        let stdout = self.run_raw(cancel, args)?;
        Ok(String::from_utf8_lossy(&stdout).trim_end().to_string())
    }

    /// Like [`Self::run`], but a failure exit maps to `Ok(None)`.
    fn run_ok(&self, cancel: &Cancel, args: &[&str]) -> Result<Option<String>, GitError> {
        cancel.bail()?;
        trace!(command = %args.join(" "), "git");
        let output = self
            .command(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| GitError::Spawn { source })?;
        if output.status.success() {
            Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
            ))
        } else {
            Ok(None)
        }
    }

    fn run_with_stdin(
        &self,
        cancel: &Cancel,
        args: &[&str],
        stdin: &[u8],
    ) -> Result<String, GitError> {
        cancel.bail()?;
        trace!(command = %args.join(" "), "git");
        let mut child = self
            .command(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| GitError::Spawn { source })?;
        child
            .stdin
            .take()
            .expect("stdin was piped")
            .write_all(stdin)
            .map_err(|source| GitError::Spawn { source })?;
        let output = child
            .wait_with_output()
            .map_err(|source| GitError::Spawn { source })?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
        } else {
            Err(exit_error(args, &output.stderr))
        }
    }

    /// Runs a command with inherited stdio so git can interact with the
    /// terminal.
    fn run_interactive(&self, cancel: &Cancel, args: &[&str]) -> Result<(), GitError> {
        cancel.bail()?;
        trace!(command = %args.join(" "), "git (interactive)");
        let status = self
            .command(args)
            .status()
            .map_err(|source| GitError::Spawn { source })?;
        if status.success() {
            Ok(())
        } else {
            Err(exit_error(args, b""))
        }
    }

    fn write_dir(&self, cancel: &Cancel, dir: &TreeDir) -> Result<Oid, GitError> {
        let mut lines = String::new();
        for (name, sub) in &dir.dirs {
            let oid = self.write_dir(cancel, sub)?;
            lines.push_str(&format!("040000 tree {oid}\t{name}\n"));
        }
        for (name, blob) in &dir.blobs {
            lines.push_str(&format!("100644 blob {blob}\t{name}\n"));
        }
        self.run_with_stdin(cancel, &["mktree"], lines.as_bytes())?
            .parse()
    }
}

fn exit_error(args: &[&str], stderr: &[u8]) -> GitError {
    GitError::Exit {
        command: args.first().map_or_else(String::new, ToString::to_string),
        stderr: String::from_utf8_lossy(stderr).trim().to_string(),
    }
}

#[derive(Default)]
struct TreeDir {
    blobs: BTreeMap<String, Oid>,
    dirs: BTreeMap<String, TreeDir>,
}

impl TreeDir {
    fn insert(&mut self, path: &str, blob: Oid) {
        match path.split_once('/') {
            None => {
                self.blobs.insert(path.to_string(), blob);
            }
            Some((dir, rest)) => {
                self.dirs.entry(dir.to_string()).or_default().insert(rest, blob);
            }
        }
    }
}

impl Git for GitCli {
    fn current_branch(&self, cancel: &Cancel) -> Result<String, GitError> {
        self.run(cancel, &["symbolic-ref", "--short", "HEAD"])
    }

    fn local_branches(&self, cancel: &Cancel) -> Result<Vec<String>, GitError> {
        let out = self.run(
            cancel,
            &["for-each-ref", "--format=%(refname:short)", "refs/heads/"],
        )?;
        Ok(out.lines().map(ToString::to_string).collect())
    }

    fn peel_to_commit(&self, cancel: &Cancel, reference: &str) -> Result<Oid, GitError> {
        let spec = format!("{reference}^{{commit}}");
        self.run(cancel, &["rev-parse", "--verify", &spec])?.parse()
    }

    fn commit_message_range(
        &self,
        cancel: &Cancel,
        head: &str,
        base: &str,
    ) -> Result<Vec<CommitMessage>, GitError> {
        let format = format!("--format=%s{UNIT_SEP}%b{RECORD_SEP}");
        let range = format!("{base}..{head}");
        let out = self.run(cancel, &["log", &format, &range])?;
        let mut messages = Vec::new();
        for record in out.split(RECORD_SEP) {
            let record = record.trim_matches(['\n', ' ']);
            if record.is_empty() {
                continue;
            }
            let (subject, body) = record.split_once(UNIT_SEP).ok_or_else(|| GitError::Output {
                command: "log".to_string(),
                reason: "missing subject/body separator".to_string(),
            })?;
            messages.push(CommitMessage {
                subject: subject.trim().to_string(),
                body: body.trim().to_string(),
            });
        }
        Ok(messages)
    }

    fn create_branch(&self, cancel: &Cancel, req: &CreateBranchRequest) -> Result<(), GitError> {
        self.run(cancel, &["branch", &req.name, &req.head])?;
        Ok(())
    }

    fn delete_branch(
        &self,
        cancel: &Cancel,
        name: &str,
        opts: &DeleteBranchOptions,
    ) -> Result<(), GitError> {
        let flag = if opts.force { "-D" } else { "-d" };
        self.run(cancel, &["branch", flag, name])?;
        Ok(())
    }

    fn checkout(&self, cancel: &Cancel, branch: &str) -> Result<(), GitError> {
        self.run(cancel, &["checkout", branch])?;
        Ok(())
    }

    fn detach_head(&self, cancel: &Cancel, reference: &str) -> Result<(), GitError> {
        self.run(cancel, &["checkout", "--detach", reference])?;
        Ok(())
    }

    fn commit(&self, cancel: &Cancel, req: &CommitRequest) -> Result<(), GitError> {
        let mut args = vec!["commit"];
        if req.allow_empty {
            args.push("--allow-empty");
        }
        match &req.message {
            Some(message) => {
                args.extend(["-m", message]);
                self.run(cancel, &args)?;
                Ok(())
            }
            // No message: let git open the editor.
            None => self.run_interactive(cancel, &args),
        }
    }

    fn diff_index(&self, cancel: &Cancel, treeish: &str) -> Result<Vec<String>, GitError> {
        let out = self.run(
            cancel,
            &["diff-index", "--cached", "--name-only", treeish],
        )?;
        Ok(out
            .lines()
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect())
    }

    fn push(&self, cancel: &Cancel, opts: &PushOptions) -> Result<(), GitError> {
        let mut args = vec!["push".to_string()];
        if opts.force {
            args.push("--force".to_string());
        } else if let Some(lease) = &opts.force_with_lease {
            args.push(format!("--force-with-lease={lease}"));
        }
        args.push(opts.remote.clone());
        args.push(opts.refspec.clone());
        let borrowed: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(cancel, &borrowed)?;
        Ok(())
    }

    fn fetch(&self, cancel: &Cancel, opts: &FetchOptions) -> Result<(), GitError> {
        let mut args = vec!["fetch", opts.remote.as_str()];
        args.extend(opts.refspecs.iter().map(String::as_str));
        self.run(cancel, &args)?;
        Ok(())
    }

    fn rebase(&self, cancel: &Cancel, req: &RebaseRequest) -> Result<(), GitError> {
        self.run(
            cancel,
            &["rebase", "--onto", &req.onto, &req.upstream, &req.branch],
        )?;
        Ok(())
    }

    fn merge_base(&self, cancel: &Cancel, a: &str, b: &str) -> Result<Oid, GitError> {
        self.run(cancel, &["merge-base", a, b])?.parse()
    }

    fn fork_point(&self, cancel: &Cancel, base: &str, branch: &str) -> Result<Oid, GitError> {
        // --fork-point needs reflog entries; fall back to the plain merge
        // base when they are gone.
        match self.run_ok(cancel, &["merge-base", "--fork-point", base, branch])? {
            Some(out) if !out.is_empty() => out.parse(),
            _ => self.merge_base(cancel, base, branch),
        }
    }

    fn set_branch_upstream(
        &self,
        cancel: &Cancel,
        branch: &str,
        upstream: &str,
    ) -> Result<(), GitError> {
        let flag = format!("--set-upstream-to={upstream}");
        self.run(cancel, &["branch", &flag, branch])?;
        Ok(())
    }

    fn default_branch(&self, cancel: &Cancel, remote: &str) -> Result<String, GitError> {
        let spec = format!("{remote}/HEAD");
        let out = self.run(cancel, &["rev-parse", "--abbrev-ref", &spec])?;
        out.strip_prefix(&format!("{remote}/"))
            .map(ToString::to_string)
            .ok_or_else(|| GitError::Output {
                command: "rev-parse".to_string(),
                reason: format!("unexpected remote head {out:?}"),
            })
    }

    fn list_remotes(&self, cancel: &Cancel) -> Result<Vec<String>, GitError> {
        let out = self.run(cancel, &["remote"])?;
        Ok(out
            .lines()
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect())
    }

    fn remote_url(&self, cancel: &Cancel, remote: &str) -> Result<String, GitError> {
        self.run(cancel, &["remote", "get-url", remote])
    }
}

impl StateGit for GitCli {
    fn read_ref(&self, cancel: &Cancel, name: &str) -> Result<Option<Oid>, GitError> {
        match self.run_ok(cancel, &["rev-parse", "--verify", "--quiet", name])? {
            Some(out) if !out.is_empty() => Ok(Some(out.parse()?)),
            _ => Ok(None),
        }
    }

    fn update_ref(
        &self,
        cancel: &Cancel,
        name: &str,
        new: &Oid,
        old: &Oid,
    ) -> Result<(), GitError> {
        self.run(cancel, &["update-ref", name, new.as_str(), old.as_str()])?;
        Ok(())
    }

    fn write_blob(&self, cancel: &Cancel, data: &[u8]) -> Result<Oid, GitError> {
        self.run_with_stdin(cancel, &["hash-object", "-w", "--stdin"], data)?
            .parse()
    }

    fn read_blob_at(
        &self,
        cancel: &Cancel,
        commit: &Oid,
        path: &str,
    ) -> Result<Option<Vec<u8>>, GitError> {
        let spec = format!("{commit}:{path}");
        let Some(blob) = self.run_ok(cancel, &["rev-parse", "--verify", "--quiet", &spec])? else {
            return Ok(None);
        };
        self.run_raw(cancel, &["cat-file", "blob", &blob]).map(Some)
    }

    fn list_tree(&self, cancel: &Cancel, commit: &Oid) -> Result<Vec<TreeBlob>, GitError> {
        let out = self.run(cancel, &["ls-tree", "-r", "-z", commit.as_str()])?;
        let mut entries = Vec::new();
        for record in out.split('\0') {
            if record.is_empty() {
                continue;
            }
            let parsed = record.split_once('\t').and_then(|(meta, path)| {
                let mut fields = meta.split(' ');
                let _mode = fields.next()?;
                let kind = fields.next()?;
                let oid = fields.next()?;
                Some((kind, oid, path))
            });
            let Some((kind, oid, path)) = parsed else {
                return Err(GitError::Output {
                    command: "ls-tree".to_string(),
                    reason: format!("unparsable entry {record:?}"),
                });
            };
            if kind != "blob" {
                continue;
            }
            entries.push(TreeBlob {
                path: path.to_string(),
                blob: oid.parse()?,
            });
        }
        Ok(entries)
    }

    fn write_tree(&self, cancel: &Cancel, entries: &[TreeBlob]) -> Result<Oid, GitError> {
        let mut root = TreeDir::default();
        for entry in entries {
            root.insert(&entry.path, entry.blob.clone());
        }
        self.write_dir(cancel, &root)
    }

    fn commit_tree(
        &self,
        cancel: &Cancel,
        tree: &Oid,
        parent: Option<&Oid>,
        message: &str,
    ) -> Result<Oid, GitError> {
        let mut args = vec!["commit-tree", tree.as_str(), "-m", message];
        let parent_str;
        if let Some(parent) = parent {
            parent_str = parent.to_string();
            args.extend(["-p", &parent_str]);
        }
        self.run(cancel, &args)?.parse()
    }
}
