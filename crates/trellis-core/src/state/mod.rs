//! Typed branch state on top of [`crate::storage`].
//!
//! The store owns three kinds of records:
//!
//! - `repo` — repository-wide info, currently just the trunk name.
//! - `branches/<name>` — one record per tracked branch: its base, the
//!   last-known base commit, an optional upstream branch name, and an
//!   optional change-request reference.
//! - `prepared/<name>` — transient change title/body saved before a
//!   submission so a failed push does not lose what the user typed.
//!
//! Branch names are percent-encoded in keys so slashed names stay direct
//! children of their directory. All mutation flows through
//! [`Store::update`], which merges each upsert with the prior record and
//! commits the whole batch as one atomic storage update.

use std::collections::BTreeMap;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::{Cancel, Cancelled};
use crate::git::Oid;
use crate::storage::{Backend, SetRequest, StorageError, UpdateRequest as StorageUpdate};

const REPO_KEY: &str = "repo";
const BRANCHES_DIR: &str = "branches";
const PREPARED_DIR: &str = "prepared";

/// Characters that stay literal in store keys. Everything else (notably
/// `/` and `%`) is percent-encoded.
const KEY_KEEP: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.');

/// Errors from the branch state store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The repository has no initialized store.
    #[error("store not initialized")]
    NotInitialized,

    /// The store is already initialized and `force` was not given.
    #[error("store already initialized")]
    AlreadyInitialized,

    /// Trunk name was empty at init.
    #[error("trunk branch name is required")]
    EmptyTrunk,

    /// The branch has no record.
    #[error("branch not tracked")]
    NotExist,

    /// An upsert named the trunk, which is never tracked.
    #[error("trunk branch {name:?} is not tracked as a stack branch")]
    Trunk {
        /// The offending name.
        name: String,
    },

    /// An upsert was structurally invalid.
    #[error("invalid upsert: {reason}")]
    InvalidUpsert {
        /// Why the upsert was rejected.
        reason: String,
    },

    /// The upsert would create a base cycle.
    #[error("branch {name:?} would be its own ancestor")]
    CycleDetected {
        /// The branch whose chain loops.
        name: String,
    },

    /// The upsert's base chain never reaches the trunk.
    #[error("base chain of {name:?} stops at untracked branch {base:?}")]
    BaseUnreachable {
        /// The branch being upserted.
        name: String,
        /// The untracked branch the chain stopped at.
        base: String,
    },

    /// A stored record could not be decoded.
    #[error("corrupt record at {key:?}: {reason}")]
    Corrupt {
        /// Store key of the bad record.
        key: String,
        /// Decode failure description.
        reason: String,
    },

    /// The storage backend failed.
    #[error(transparent)]
    Storage(StorageError),

    /// The operation was cancelled.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Cancelled(inner) => Self::Cancelled(inner),
            other => Self::Storage(other),
        }
    }
}

/// Reference to a change request on a forge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRef {
    /// Identifier of the owning forge, e.g. `"github"`.
    pub forge: String,
    /// Opaque forge metadata. Must round-trip through the owning forge.
    pub data: serde_json::Value,
}

/// A tracked branch's stored state.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchRecord {
    /// Branch name.
    pub name: String,
    /// Name of the base branch.
    pub base: String,
    /// Last-known commit of the base branch.
    pub base_hash: Oid,
    /// Remote branch name, when it differs from the local name.
    pub upstream: Option<String>,
    /// Associated change request, if any.
    pub change: Option<ChangeRef>,
}

/// Change title/body captured before a submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedBranch {
    /// Branch name.
    pub name: String,
    /// Change title.
    pub subject: String,
    /// Change body.
    pub body: String,
}

/// One branch to add or modify. `None` fields keep their prior values;
/// new records must carry a base.
#[derive(Debug, Clone, Default)]
pub struct UpsertRequest {
    /// Branch name. Required.
    pub name: String,
    /// Base branch to record.
    pub base: Option<String>,
    /// Last-known base commit to record.
    pub base_hash: Option<Oid>,
    /// Upstream branch name to record.
    pub upstream: Option<String>,
    /// Change-request reference to record.
    pub change: Option<ChangeRef>,
}

/// A batch of upserts and deletes applied atomically.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    /// Branches to add or modify.
    pub upserts: Vec<UpsertRequest>,
    /// Branches whose records are removed.
    pub deletes: Vec<String>,
    /// Change reason. Empty defaults to a timestamped message.
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RepoJson {
    trunk: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct BaseJson {
    name: String,
    hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct BranchJson {
    base: BaseJson,
    #[serde(skip_serializing_if = "Option::is_none")]
    upstream: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    change: Option<ChangeRef>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PreparedJson {
    subject: String,
    body: String,
}

fn branch_key(name: &str) -> String {
    format!("{BRANCHES_DIR}/{}", utf8_percent_encode(name, KEY_KEEP))
}

fn prepared_key(name: &str) -> String {
    format!("{PREPARED_DIR}/{}", utf8_percent_encode(name, KEY_KEEP))
}

fn decode_json<T: for<'de> Deserialize<'de>>(key: &str, data: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(data).map_err(|err| StoreError::Corrupt {
        key: key.to_string(),
        reason: err.to_string(),
    })
}

fn encode_json<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|err| StoreError::Corrupt {
        key: key.to_string(),
        reason: err.to_string(),
    })
}

/// The branch state store for one repository.
#[derive(Debug)]
pub struct Store<B> {
    backend: B,
    trunk: String,
}

impl<B: Backend> Store<B> {
    /// Initializes the store with the given trunk branch.
    ///
    /// With `force`, an existing store is cleared and re-initialized;
    /// without it, initialization of an existing store fails.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyInitialized`] if a store exists and
    /// `force` is not set, or [`StoreError::EmptyTrunk`] for an empty
    /// trunk name.
    pub fn init(backend: B, cancel: &Cancel, trunk: &str, force: bool) -> Result<Self, StoreError> {
        if trunk.is_empty() {
            return Err(StoreError::EmptyTrunk);
        }

        match backend.get(cancel, REPO_KEY) {
            Ok(_) if !force => return Err(StoreError::AlreadyInitialized),
            Ok(_) => backend.clear(cancel, "re-initializing store")?,
            Err(StorageError::NotExist) => {}
            Err(err) => return Err(err.into()),
        }

        let info = RepoJson {
            trunk: trunk.to_string(),
        };
        backend.update(
            cancel,
            &StorageUpdate {
                sets: vec![SetRequest {
                    key: REPO_KEY.to_string(),
                    value: encode_json(REPO_KEY, &info)?,
                }],
                deletes: vec![],
                message: "initialize store".to_string(),
            },
        )?;

        Ok(Self {
            backend,
            trunk: trunk.to_string(),
        })
    }

    /// Opens an existing store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotInitialized`] when no store exists.
    pub fn open(backend: B, cancel: &Cancel) -> Result<Self, StoreError> {
        let data = match backend.get(cancel, REPO_KEY) {
            Ok(data) => data,
            Err(StorageError::NotExist) => return Err(StoreError::NotInitialized),
            Err(err) => return Err(err.into()),
        };
        let info: RepoJson = decode_json(REPO_KEY, &data)?;
        Ok(Self {
            backend,
            trunk: info.trunk,
        })
    }

    /// Name of the trunk branch.
    #[must_use]
    pub fn trunk(&self) -> &str {
        &self.trunk
    }

    /// Returns the record for a tracked branch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotExist`] for untracked branches.
    pub fn lookup(&self, cancel: &Cancel, name: &str) -> Result<BranchRecord, StoreError> {
        let key = branch_key(name);
        let data = match self.backend.get(cancel, &key) {
            Ok(data) => data,
            Err(StorageError::NotExist) => return Err(StoreError::NotExist),
            Err(err) => return Err(err.into()),
        };
        let json: BranchJson = decode_json(&key, &data)?;
        let base_hash = json.base.hash.parse().map_err(|_| StoreError::Corrupt {
            key: key.clone(),
            reason: format!("invalid base hash {:?}", json.base.hash),
        })?;
        Ok(BranchRecord {
            name: name.to_string(),
            base: json.base.name,
            base_hash,
            upstream: json.upstream,
            change: json.change,
        })
    }

    /// Lists all tracked branch names, sorted. Never includes the trunk.
    ///
    /// # Errors
    ///
    /// Fails on storage failure.
    pub fn list(&self, cancel: &Cancel) -> Result<Vec<String>, StoreError> {
        let keys = self.backend.keys(cancel, BRANCHES_DIR)?;
        let mut names = Vec::with_capacity(keys.len());
        for key in keys {
            let name = percent_decode_str(&key)
                .decode_utf8()
                .map_err(|err| StoreError::Corrupt {
                    key: format!("{BRANCHES_DIR}/{key}"),
                    reason: err.to_string(),
                })?
                .into_owned();
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    /// Adds, modifies, or removes state for zero or more branches in one
    /// atomic step.
    ///
    /// Upserted fields left as `None` keep their prior values. Records are
    /// refused when they would name the trunk, lose their base, loop back
    /// onto themselves, or hang from a chain that never reaches the trunk.
    ///
    /// # Errors
    ///
    /// See [`StoreError`]; the store is unchanged on any error.
    pub fn update(&self, cancel: &Cancel, req: &UpdateRequest) -> Result<(), StoreError> {
        let message = if req.message.is_empty() {
            format!("update at {}", chrono::Utc::now().to_rfc3339())
        } else {
            req.message.clone()
        };

        // Final base of every branch touched by this request, used to
        // validate chains against the post-update view.
        let mut pending: BTreeMap<String, String> = BTreeMap::new();
        let mut sets = Vec::with_capacity(req.upserts.len());

        for upsert in &req.upserts {
            if upsert.name.is_empty() {
                return Err(StoreError::InvalidUpsert {
                    reason: "branch name is required".to_string(),
                });
            }
            if upsert.name == self.trunk {
                return Err(StoreError::Trunk {
                    name: upsert.name.clone(),
                });
            }

            let mut json = match self.lookup(cancel, &upsert.name) {
                Ok(prior) => BranchJson {
                    base: BaseJson {
                        name: prior.base,
                        hash: prior.base_hash.to_string(),
                    },
                    upstream: prior.upstream,
                    change: prior.change,
                },
                Err(StoreError::NotExist) => BranchJson {
                    base: BaseJson {
                        name: String::new(),
                        hash: String::new(),
                    },
                    upstream: None,
                    change: None,
                },
                Err(err) => return Err(err),
            };

            if let Some(base) = &upsert.base {
                json.base.name.clone_from(base);
            }
            if let Some(hash) = &upsert.base_hash {
                json.base.hash = hash.to_string();
            }
            if let Some(upstream) = &upsert.upstream {
                json.upstream = Some(upstream.clone());
            }
            if let Some(change) = &upsert.change {
                json.change = Some(change.clone());
            }

            if json.base.name.is_empty() {
                return Err(StoreError::InvalidUpsert {
                    reason: format!("branch {:?} would have no base", upsert.name),
                });
            }

            pending.insert(upsert.name.clone(), json.base.name.clone());
            let key = branch_key(&upsert.name);
            let value = encode_json(&key, &json)?;
            sets.push(SetRequest { key, value });
        }

        for name in pending.keys() {
            self.check_base_chain(cancel, name, &pending)?;
        }

        let deletes = req.deletes.iter().map(|name| branch_key(name)).collect();
        self.backend.update(
            cancel,
            &StorageUpdate {
                sets,
                deletes,
                message,
            },
        )?;
        Ok(())
    }

    /// Walks the base chain of `name` through the pending view, then the
    /// stored records, until it reaches the trunk.
    fn check_base_chain(
        &self,
        cancel: &Cancel,
        name: &str,
        pending: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let mut seen = vec![name.to_string()];
        let mut cursor = pending[name].clone();
        loop {
            if cursor == self.trunk {
                return Ok(());
            }
            if seen.contains(&cursor) {
                return Err(StoreError::CycleDetected {
                    name: name.to_string(),
                });
            }
            seen.push(cursor.clone());

            let next = if let Some(base) = pending.get(&cursor) {
                base.clone()
            } else {
                match self.lookup(cancel, &cursor) {
                    Ok(record) => record.base,
                    Err(StoreError::NotExist) => {
                        return Err(StoreError::BaseUnreachable {
                            name: name.to_string(),
                            base: cursor,
                        });
                    }
                    Err(err) => return Err(err),
                }
            };
            cursor = next;
        }
    }

    /// Saves prepared change information for a branch.
    ///
    /// # Errors
    ///
    /// Fails on storage failure.
    pub fn save_prepared(&self, cancel: &Cancel, prepared: &PreparedBranch) -> Result<(), StoreError> {
        let key = prepared_key(&prepared.name);
        let value = encode_json(
            &key,
            &PreparedJson {
                subject: prepared.subject.clone(),
                body: prepared.body.clone(),
            },
        )?;
        self.backend.update(
            cancel,
            &StorageUpdate {
                sets: vec![SetRequest { key, value }],
                deletes: vec![],
                message: format!("save prepared change for {}", prepared.name),
            },
        )?;
        Ok(())
    }

    /// Loads prepared change information, if any was saved.
    ///
    /// # Errors
    ///
    /// Fails on storage failure.
    pub fn load_prepared(
        &self,
        cancel: &Cancel,
        name: &str,
    ) -> Result<Option<PreparedBranch>, StoreError> {
        let key = prepared_key(name);
        let data = match self.backend.get(cancel, &key) {
            Ok(data) => data,
            Err(StorageError::NotExist) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let json: PreparedJson = decode_json(&key, &data)?;
        Ok(Some(PreparedBranch {
            name: name.to_string(),
            subject: json.subject,
            body: json.body,
        }))
    }

    /// Discards prepared change information for a branch.
    ///
    /// # Errors
    ///
    /// Fails on storage failure.
    pub fn clear_prepared(&self, cancel: &Cancel, name: &str) -> Result<(), StoreError> {
        self.backend.update(
            cancel,
            &StorageUpdate {
                sets: vec![],
                deletes: vec![prepared_key(name)],
                message: format!("clear prepared change for {name}"),
            },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    fn store() -> Store<MemoryBackend> {
        let cancel = Cancel::new();
        Store::init(MemoryBackend::new(), &cancel, "main", false).expect("init store")
    }

    fn oid(fill: char) -> Oid {
        fill.to_string().repeat(40).parse().expect("valid oid")
    }

    fn track<B: Backend>(store: &Store<B>, name: &str, base: &str, hash: &Oid) {
        store
            .update(
                &Cancel::new(),
                &UpdateRequest {
                    upserts: vec![UpsertRequest {
                        name: name.to_string(),
                        base: Some(base.to_string()),
                        base_hash: Some(hash.clone()),
                        ..UpsertRequest::default()
                    }],
                    deletes: vec![],
                    message: format!("track {name}"),
                },
            )
            .expect("track branch");
    }

    #[test]
    fn init_twice_requires_force() {
        let cancel = Cancel::new();
        let backend = MemoryBackend::new();
        let store = Store::init(&backend, &cancel, "main", false).unwrap();
        assert_eq!(store.trunk(), "main");

        assert!(matches!(
            Store::init(&backend, &cancel, "main", false),
            Err(StoreError::AlreadyInitialized)
        ));

        // Force clears previous state.
        track(&store, "feat", "main", &oid('a'));
        let store = Store::init(&backend, &cancel, "master", true).unwrap();
        assert_eq!(store.trunk(), "master");
        assert!(store.list(&cancel).unwrap().is_empty());
    }

    #[test]
    fn open_uninitialized_fails() {
        let cancel = Cancel::new();
        assert!(matches!(
            Store::open(MemoryBackend::new(), &cancel),
            Err(StoreError::NotInitialized)
        ));
    }

    #[test]
    fn open_reads_trunk_back() {
        let cancel = Cancel::new();
        let backend = MemoryBackend::new();
        Store::init(&backend, &cancel, "develop", false).unwrap();
        let store = Store::open(&backend, &cancel).unwrap();
        assert_eq!(store.trunk(), "develop");
    }

    #[test]
    fn upsert_round_trips_all_fields() {
        let cancel = Cancel::new();
        let store = store();
        let change = ChangeRef {
            forge: "github".to_string(),
            data: serde_json::json!({"number": 7}),
        };

        store
            .update(
                &cancel,
                &UpdateRequest {
                    upserts: vec![UpsertRequest {
                        name: "feat".to_string(),
                        base: Some("main".to_string()),
                        base_hash: Some(oid('a')),
                        upstream: Some("feat-remote".to_string()),
                        change: Some(change.clone()),
                    }],
                    deletes: vec![],
                    message: "track feat".to_string(),
                },
            )
            .unwrap();

        let record = store.lookup(&cancel, "feat").unwrap();
        assert_eq!(record.base, "main");
        assert_eq!(record.base_hash, oid('a'));
        assert_eq!(record.upstream.as_deref(), Some("feat-remote"));
        assert_eq!(record.change, Some(change));
    }

    #[test]
    fn omitted_fields_keep_prior_values() {
        let cancel = Cancel::new();
        let store = store();
        track(&store, "feat", "main", &oid('a'));

        store
            .update(
                &cancel,
                &UpdateRequest {
                    upserts: vec![UpsertRequest {
                        name: "feat".to_string(),
                        upstream: Some("renamed".to_string()),
                        ..UpsertRequest::default()
                    }],
                    deletes: vec![],
                    message: "set upstream".to_string(),
                },
            )
            .unwrap();

        let record = store.lookup(&cancel, "feat").unwrap();
        assert_eq!(record.base, "main");
        assert_eq!(record.base_hash, oid('a'));
        assert_eq!(record.upstream.as_deref(), Some("renamed"));
    }

    #[test]
    fn trunk_upserts_are_rejected() {
        let cancel = Cancel::new();
        let store = store();
        let err = store
            .update(
                &cancel,
                &UpdateRequest {
                    upserts: vec![UpsertRequest {
                        name: "main".to_string(),
                        base: Some("other".to_string()),
                        ..UpsertRequest::default()
                    }],
                    deletes: vec![],
                    message: String::new(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Trunk { name } if name == "main"));
    }

    #[test]
    fn new_record_requires_a_base() {
        let cancel = Cancel::new();
        let store = store();
        let err = store
            .update(
                &cancel,
                &UpdateRequest {
                    upserts: vec![UpsertRequest {
                        name: "feat".to_string(),
                        ..UpsertRequest::default()
                    }],
                    deletes: vec![],
                    message: String::new(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidUpsert { .. }));
    }

    #[test]
    fn self_base_and_two_branch_cycles_are_rejected() {
        let cancel = Cancel::new();
        let store = store();
        track(&store, "a", "main", &oid('a'));
        track(&store, "b", "a", &oid('b'));

        let err = store
            .update(
                &cancel,
                &UpdateRequest {
                    upserts: vec![UpsertRequest {
                        name: "a".to_string(),
                        base: Some("a".to_string()),
                        ..UpsertRequest::default()
                    }],
                    deletes: vec![],
                    message: String::new(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::CycleDetected { name } if name == "a"));

        // Re-basing a onto b would make a its own ancestor.
        let err = store
            .update(
                &cancel,
                &UpdateRequest {
                    upserts: vec![UpsertRequest {
                        name: "a".to_string(),
                        base: Some("b".to_string()),
                        ..UpsertRequest::default()
                    }],
                    deletes: vec![],
                    message: String::new(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::CycleDetected { name } if name == "a"));
    }

    #[test]
    fn chains_must_reach_the_trunk() {
        let cancel = Cancel::new();
        let store = store();
        let err = store
            .update(
                &cancel,
                &UpdateRequest {
                    upserts: vec![UpsertRequest {
                        name: "feat".to_string(),
                        base: Some("untracked".to_string()),
                        base_hash: Some(oid('a')),
                        ..UpsertRequest::default()
                    }],
                    deletes: vec![],
                    message: String::new(),
                },
            )
            .unwrap_err();
        assert!(
            matches!(err, StoreError::BaseUnreachable { base, .. } if base == "untracked")
        );
    }

    #[test]
    fn batched_upserts_validate_against_the_new_view() {
        let cancel = Cancel::new();
        let store = store();
        // b's base a only becomes tracked within the same update.
        store
            .update(
                &cancel,
                &UpdateRequest {
                    upserts: vec![
                        UpsertRequest {
                            name: "a".to_string(),
                            base: Some("main".to_string()),
                            base_hash: Some(oid('a')),
                            ..UpsertRequest::default()
                        },
                        UpsertRequest {
                            name: "b".to_string(),
                            base: Some("a".to_string()),
                            base_hash: Some(oid('b')),
                            ..UpsertRequest::default()
                        },
                    ],
                    deletes: vec![],
                    message: "track a and b".to_string(),
                },
            )
            .unwrap();
        assert_eq!(store.list(&cancel).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn list_is_sorted_and_decodes_slashed_names() {
        let cancel = Cancel::new();
        let store = store();
        track(&store, "zeta", "main", &oid('a'));
        track(&store, "user/feat", "main", &oid('b'));

        assert_eq!(store.list(&cancel).unwrap(), vec!["user/feat", "zeta"]);
        assert!(store.lookup(&cancel, "user/feat").is_ok());
    }

    #[test]
    fn empty_message_gets_a_timestamped_default() {
        let cancel = Cancel::new();
        let backend = MemoryBackend::new();
        let store = Store::init(&backend, &cancel, "main", false).unwrap();
        store
            .update(
                &cancel,
                &UpdateRequest {
                    upserts: vec![UpsertRequest {
                        name: "feat".to_string(),
                        base: Some("main".to_string()),
                        base_hash: Some(oid('a')),
                        ..UpsertRequest::default()
                    }],
                    deletes: vec![],
                    message: String::new(),
                },
            )
            .unwrap();

        let messages = backend.messages();
        assert!(messages.last().unwrap().starts_with("update at "));
    }

    #[test]
    fn prepared_branch_lifecycle() {
        let cancel = Cancel::new();
        let store = store();
        assert_eq!(store.load_prepared(&cancel, "feat").unwrap(), None);

        let prepared = PreparedBranch {
            name: "feat".to_string(),
            subject: "Add widget".to_string(),
            body: "Body text".to_string(),
        };
        store.save_prepared(&cancel, &prepared).unwrap();
        assert_eq!(store.load_prepared(&cancel, "feat").unwrap(), Some(prepared));

        store.clear_prepared(&cancel, "feat").unwrap();
        assert_eq!(store.load_prepared(&cancel, "feat").unwrap(), None);
    }

    #[test]
    fn delete_removes_the_record() {
        let cancel = Cancel::new();
        let store = store();
        track(&store, "feat", "main", &oid('a'));

        store
            .update(
                &cancel,
                &UpdateRequest {
                    upserts: vec![],
                    deletes: vec!["feat".to_string()],
                    message: "untrack feat".to_string(),
                },
            )
            .unwrap();
        assert!(matches!(
            store.lookup(&cancel, "feat"),
            Err(StoreError::NotExist)
        ));
    }
}
