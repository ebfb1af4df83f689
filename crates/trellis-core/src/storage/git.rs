//! Git-ref-backed storage.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::{Backend, SetRequest, StorageError, UpdateRequest};
use crate::cancel::Cancel;
use crate::git::{Oid, StateGit, TreeBlob};

/// The ref the state is committed to.
pub const STATE_REF: &str = "refs/trellis/state";

/// How many times an update re-reads the tip and retries after losing a
/// compare-and-swap race.
const CAS_ATTEMPTS: u32 = 5;

/// Storage backend that appends snapshot commits to a hidden ref.
#[derive(Debug, Clone)]
pub struct GitBackend<S> {
    git: S,
    ref_name: String,
}

impl<S: StateGit> GitBackend<S> {
    /// Creates a backend on the conventional [`STATE_REF`].
    pub fn new(git: S) -> Self {
        Self::with_ref(git, STATE_REF)
    }

    /// Creates a backend on a custom ref.
    pub fn with_ref(git: S, ref_name: impl Into<String>) -> Self {
        Self {
            git,
            ref_name: ref_name.into(),
        }
    }

    fn tip(&self, cancel: &Cancel) -> Result<Option<Oid>, StorageError> {
        Ok(self.git.read_ref(cancel, &self.ref_name)?)
    }

    fn snapshot_entries(
        &self,
        cancel: &Cancel,
        tip: Option<&Oid>,
    ) -> Result<BTreeMap<String, Oid>, StorageError> {
        let Some(tip) = tip else {
            return Ok(BTreeMap::new());
        };
        let entries = self.git.list_tree(cancel, tip)?;
        Ok(entries
            .into_iter()
            .map(|entry| (entry.path, entry.blob))
            .collect())
    }

    fn commit_snapshot(
        &self,
        cancel: &Cancel,
        entries: &BTreeMap<String, Oid>,
        parent: Option<&Oid>,
        message: &str,
    ) -> Result<Oid, StorageError> {
        let blobs: Vec<TreeBlob> = entries
            .iter()
            .map(|(path, blob)| TreeBlob {
                path: path.clone(),
                blob: blob.clone(),
            })
            .collect();
        let tree = self.git.write_tree(cancel, &blobs)?;
        Ok(self.git.commit_tree(cancel, &tree, parent, message)?)
    }

    /// Re-applies `apply` on the latest tip until the ref advance wins the
    /// compare-and-swap or the attempt budget runs out.
    fn swap<F>(&self, cancel: &Cancel, message: &str, apply: F) -> Result<(), StorageError>
    where
        F: Fn(&mut BTreeMap<String, Oid>) -> Result<(), StorageError>,
    {
        for attempt in 1..=CAS_ATTEMPTS {
            cancel.bail()?;
            let tip = self.tip(cancel)?;
            let mut entries = self.snapshot_entries(cancel, tip.as_ref())?;
            apply(&mut entries)?;
            let commit = self.commit_snapshot(cancel, &entries, tip.as_ref(), message)?;

            let expected = tip.unwrap_or_else(Oid::zero);
            match self.git.update_ref(cancel, &self.ref_name, &commit, &expected) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    debug!(
                        attempt,
                        ref_name = %self.ref_name,
                        error = %err,
                        "state ref moved, retrying",
                    );
                }
            }
        }
        Err(StorageError::Conflict {
            attempts: CAS_ATTEMPTS,
        })
    }
}

impl<S: StateGit> Backend for GitBackend<S> {
    fn get(&self, cancel: &Cancel, key: &str) -> Result<Vec<u8>, StorageError> {
        let tip = self.tip(cancel)?.ok_or(StorageError::NotExist)?;
        self.git
            .read_blob_at(cancel, &tip, key)?
            .ok_or(StorageError::NotExist)
    }

    fn keys(&self, cancel: &Cancel, prefix: &str) -> Result<BTreeSet<String>, StorageError> {
        let Some(tip) = self.tip(cancel)? else {
            return Ok(BTreeSet::new());
        };
        let entries = self.git.list_tree(cancel, &tip)?;
        let mut names = BTreeSet::new();
        for entry in entries {
            let suffix = if prefix.is_empty() {
                Some(entry.path.as_str())
            } else {
                entry.path.strip_prefix(&format!("{prefix}/"))
            };
            if let Some(suffix) = suffix {
                let name = suffix.split('/').next().unwrap_or(suffix);
                names.insert(name.to_string());
            }
        }
        Ok(names)
    }

    fn update(&self, cancel: &Cancel, req: &UpdateRequest) -> Result<(), StorageError> {
        // Hash the new values once; retries only rebuild trees.
        let mut sets: Vec<(String, Oid)> = Vec::with_capacity(req.sets.len());
        for SetRequest { key, value } in &req.sets {
            sets.push((key.clone(), self.git.write_blob(cancel, value)?));
        }

        self.swap(cancel, &req.message, |entries| {
            for (key, blob) in &sets {
                entries.insert(key.clone(), blob.clone());
            }
            for key in &req.deletes {
                entries.remove(key);
            }
            Ok(())
        })
    }

    fn clear(&self, cancel: &Cancel, message: &str) -> Result<(), StorageError> {
        self.swap(cancel, message, |entries| {
            entries.clear();
            Ok(())
        })
    }
}
