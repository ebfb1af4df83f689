//! Derived stack topology.
//!
//! The store records one base edge per branch; everything else — parents,
//! children, ancestor chains, descendant subtrees, and the restack check —
//! is computed here on demand.

use thiserror::Error;

use crate::cancel::{Cancel, Cancelled};
use crate::git::{Git, GitError, Oid};
use crate::state::{Store, StoreError};
use crate::storage::Backend;

/// Errors from topology queries and the restack check.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StackError {
    /// The branch has no record in the store.
    #[error("branch {branch:?} is not tracked")]
    Untracked {
        /// The untracked branch.
        branch: String,
    },

    /// The branch's base has advanced past the recorded base commit.
    #[error("branch {branch:?} needs to be restacked on {base:?}")]
    NeedsRestack {
        /// The out-of-date branch.
        branch: String,
        /// Its base branch.
        base: String,
        /// The base commit the store expects.
        expected: Oid,
        /// The fork point actually observed.
        actual: Oid,
    },

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Git failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// The operation was cancelled.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Stack queries over a repository and its branch store.
pub struct StackService<'a, G, B> {
    git: &'a G,
    store: &'a Store<B>,
}

impl<'a, G: Git, B: Backend> StackService<'a, G, B> {
    /// Creates a service over the given repository and store.
    pub fn new(git: &'a G, store: &'a Store<B>) -> Self {
        Self { git, store }
    }

    /// Returns the base of `branch`, or `None` for the trunk and for
    /// untracked branches.
    ///
    /// # Errors
    ///
    /// Fails on store failure.
    pub fn parent(&self, cancel: &Cancel, branch: &str) -> Result<Option<String>, StackError> {
        if branch == self.store.trunk() {
            return Ok(None);
        }
        match self.store.lookup(cancel, branch) {
            Ok(record) => Ok(Some(record.base)),
            Err(StoreError::NotExist) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Returns the tracked branches based directly on `branch`, sorted by
    /// name.
    ///
    /// # Errors
    ///
    /// Fails on store failure.
    pub fn children(&self, cancel: &Cancel, branch: &str) -> Result<Vec<String>, StackError> {
        let mut children = Vec::new();
        for name in self.store.list(cancel)? {
            let record = self.store.lookup(cancel, &name)?;
            if record.base == branch {
                children.push(name);
            }
        }
        Ok(children)
    }

    /// Returns the chain of bases from `branch` up to and including the
    /// trunk.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Untracked`] if the chain passes through a
    /// branch without a record.
    pub fn ancestors(&self, cancel: &Cancel, branch: &str) -> Result<Vec<String>, StackError> {
        let mut chain = Vec::new();
        let mut cursor = branch.to_string();
        while cursor != self.store.trunk() {
            let record = match self.store.lookup(cancel, &cursor) {
                Ok(record) => record,
                Err(StoreError::NotExist) => {
                    return Err(StackError::Untracked { branch: cursor });
                }
                Err(err) => return Err(err.into()),
            };
            chain.push(record.base.clone());
            cursor = record.base;
        }
        Ok(chain)
    }

    /// Returns all transitive children of `branch` in depth-first order,
    /// parents before children, siblings sorted by name.
    ///
    /// # Errors
    ///
    /// Fails on store failure.
    pub fn descendants(&self, cancel: &Cancel, branch: &str) -> Result<Vec<String>, StackError> {
        let mut result = Vec::new();
        let mut pending = self.children(cancel, branch)?;
        pending.reverse();
        while let Some(name) = pending.pop() {
            let mut grandchildren = self.children(cancel, &name)?;
            grandchildren.reverse();
            pending.extend(grandchildren);
            result.push(name);
        }
        Ok(result)
    }

    /// Verifies that `branch` is restacked on its base: the fork point
    /// between the branch and its base must equal the recorded base
    /// commit.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::NeedsRestack`] when the base has advanced,
    /// or [`StackError::Untracked`] for branches without a record.
    pub fn verify_restacked(&self, cancel: &Cancel, branch: &str) -> Result<(), StackError> {
        let record = match self.store.lookup(cancel, branch) {
            Ok(record) => record,
            Err(StoreError::NotExist) => {
                return Err(StackError::Untracked {
                    branch: branch.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        let actual = self.git.fork_point(cancel, &record.base, branch)?;
        if actual == record.base_hash {
            Ok(())
        } else {
            Err(StackError::NeedsRestack {
                branch: branch.to_string(),
                base: record.base,
                expected: record.base_hash,
                actual,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{UpdateRequest, UpsertRequest};
    use crate::storage::MemoryBackend;
    use crate::testsupport::MockGit;

    fn oid(fill: char) -> Oid {
        fill.to_string().repeat(40).parse().expect("valid oid")
    }

    fn store_with(branches: &[(&str, &str, char)]) -> Store<MemoryBackend> {
        let cancel = Cancel::new();
        let store = Store::init(MemoryBackend::new(), &cancel, "main", false).unwrap();
        for (name, base, fill) in branches {
            store
                .update(
                    &cancel,
                    &UpdateRequest {
                        upserts: vec![UpsertRequest {
                            name: (*name).to_string(),
                            base: Some((*base).to_string()),
                            base_hash: Some(oid(*fill)),
                            ..UpsertRequest::default()
                        }],
                        deletes: vec![],
                        message: format!("track {name}"),
                    },
                )
                .unwrap();
        }
        store
    }

    #[test]
    fn parent_children_and_ancestors() {
        let cancel = Cancel::new();
        let store = store_with(&[("a", "main", 'a'), ("b", "a", 'b'), ("c", "a", 'c')]);
        let git = MockGit::new();
        let svc = StackService::new(&git, &store);

        assert_eq!(svc.parent(&cancel, "main").unwrap(), None);
        assert_eq!(svc.parent(&cancel, "b").unwrap(), Some("a".to_string()));
        assert_eq!(svc.parent(&cancel, "stray").unwrap(), None);

        assert_eq!(svc.children(&cancel, "a").unwrap(), vec!["b", "c"]);
        assert_eq!(svc.children(&cancel, "main").unwrap(), vec!["a"]);

        assert_eq!(svc.ancestors(&cancel, "b").unwrap(), vec!["a", "main"]);
        assert_eq!(svc.ancestors(&cancel, "main").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn descendants_walks_depth_first_parents_before_children() {
        let cancel = Cancel::new();
        let store = store_with(&[
            ("a", "main", 'a'),
            ("b", "a", 'b'),
            ("d", "b", 'd'),
            ("c", "a", 'c'),
        ]);
        let git = MockGit::new();
        let svc = StackService::new(&git, &store);

        assert_eq!(svc.descendants(&cancel, "main").unwrap(), vec!["a", "b", "d", "c"]);
        assert_eq!(svc.descendants(&cancel, "a").unwrap(), vec!["b", "d", "c"]);
        assert_eq!(svc.descendants(&cancel, "d").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn verify_restacked_compares_fork_point_with_recorded_hash() {
        let cancel = Cancel::new();
        let store = store_with(&[("a", "main", 'a')]);
        let git = MockGit::new();
        git.set_fork_point("main", "a", oid('a'));
        let svc = StackService::new(&git, &store);

        svc.verify_restacked(&cancel, "a").unwrap();

        // The base moved: fork point no longer matches the record.
        git.set_fork_point("main", "a", oid('f'));
        let err = svc.verify_restacked(&cancel, "a").unwrap_err();
        match err {
            StackError::NeedsRestack {
                branch,
                base,
                expected,
                actual,
            } => {
                assert_eq!(branch, "a");
                assert_eq!(base, "main");
                assert_eq!(expected, oid('a'));
                assert_eq!(actual, oid('f'));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn verify_restacked_requires_a_record() {
        let cancel = Cancel::new();
        let store = store_with(&[]);
        let git = MockGit::new();
        let svc = StackService::new(&git, &store);
        assert!(matches!(
            svc.verify_restacked(&cancel, "stray"),
            Err(StackError::Untracked { branch }) if branch == "stray"
        ));
    }
}
