//! In-memory storage with the same snapshot semantics as the git backend.
//!
//! Used by tests and by callers that want to stage state without a
//! repository. All mutation happens under one lock, so an update is
//! observed fully applied or not at all.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use super::{Backend, SetRequest, StorageError, UpdateRequest};
use crate::cancel::Cancel;

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, Vec<u8>>,
    log: Vec<String>,
}

/// A [`Backend`] holding the snapshot in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the full snapshot.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.inner.lock().expect("storage lock").entries.clone()
    }

    /// Returns the recorded change messages, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.inner.lock().expect("storage lock").log.clone()
    }
}

impl Backend for MemoryBackend {
    fn get(&self, cancel: &Cancel, key: &str) -> Result<Vec<u8>, StorageError> {
        cancel.bail()?;
        let inner = self.inner.lock().expect("storage lock");
        inner.entries.get(key).cloned().ok_or(StorageError::NotExist)
    }

    fn keys(&self, cancel: &Cancel, prefix: &str) -> Result<BTreeSet<String>, StorageError> {
        cancel.bail()?;
        let inner = self.inner.lock().expect("storage lock");
        let mut names = BTreeSet::new();
        for path in inner.entries.keys() {
            let suffix = if prefix.is_empty() {
                Some(path.as_str())
            } else {
                path.strip_prefix(&format!("{prefix}/"))
            };
            if let Some(suffix) = suffix {
                let name = suffix.split('/').next().unwrap_or(suffix);
                names.insert(name.to_string());
            }
        }
        Ok(names)
    }

    fn update(&self, cancel: &Cancel, req: &UpdateRequest) -> Result<(), StorageError> {
        cancel.bail()?;
        let mut inner = self.inner.lock().expect("storage lock");
        for SetRequest { key, value } in &req.sets {
            inner.entries.insert(key.clone(), value.clone());
        }
        for key in &req.deletes {
            inner.entries.remove(key);
        }
        inner.log.push(req.message.clone());
        Ok(())
    }

    fn clear(&self, cancel: &Cancel, message: &str) -> Result<(), StorageError> {
        cancel.bail()?;
        let mut inner = self.inner.lock().expect("storage lock");
        inner.entries.clear();
        inner.log.push(message.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn batched_update_is_never_observed_partially() {
        let backend = Arc::new(MemoryBackend::new());
        let cancel = Cancel::new();
        let keys: Vec<String> = (0..8).map(|i| format!("branches/b{i}")).collect();

        // Seed generation zero.
        let seed = UpdateRequest {
            sets: keys
                .iter()
                .map(|key| SetRequest {
                    key: key.clone(),
                    value: b"0".to_vec(),
                })
                .collect(),
            deletes: vec![],
            message: "seed".to_string(),
        };
        backend.update(&cancel, &seed).unwrap();

        let writer = {
            let backend = Arc::clone(&backend);
            let keys = keys.clone();
            thread::spawn(move || {
                let cancel = Cancel::new();
                for generation in 1..=100_u32 {
                    let req = UpdateRequest {
                        sets: keys
                            .iter()
                            .map(|key| SetRequest {
                                key: key.clone(),
                                value: generation.to_string().into_bytes(),
                            })
                            .collect(),
                        deletes: vec![],
                        message: format!("generation {generation}"),
                    };
                    backend.update(&cancel, &req).unwrap();
                }
            })
        };

        // Concurrent readers must always see one generation across every
        // key, never a mix of two.
        for _ in 0..200 {
            let snapshot = backend.snapshot();
            let values: BTreeSet<&[u8]> = keys
                .iter()
                .map(|key| snapshot.get(key).expect("key present").as_slice())
                .collect();
            assert_eq!(values.len(), 1, "observed a torn update: {values:?}");
        }

        writer.join().unwrap();
        assert_eq!(backend.messages().len(), 101);
    }

    #[test]
    fn keys_returns_direct_children_only() {
        let backend = MemoryBackend::new();
        let cancel = Cancel::new();
        backend
            .update(
                &cancel,
                &UpdateRequest {
                    sets: vec![
                        SetRequest {
                            key: "repo".to_string(),
                            value: b"{}".to_vec(),
                        },
                        SetRequest {
                            key: "branches/x".to_string(),
                            value: b"1".to_vec(),
                        },
                        SetRequest {
                            key: "branches/y".to_string(),
                            value: b"2".to_vec(),
                        },
                    ],
                    deletes: vec![],
                    message: String::new(),
                },
            )
            .unwrap();

        let top = backend.keys(&cancel, "").unwrap();
        assert!(top.contains("repo"));
        assert!(top.contains("branches"));

        let branches = backend.keys(&cancel, "branches").unwrap();
        assert_eq!(
            branches.into_iter().collect::<Vec<_>>(),
            vec!["x".to_string(), "y".to_string()]
        );
    }
}
