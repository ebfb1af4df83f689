//! # trellis-core
//!
//! Core library for trellis — a tool that manages stacks of dependent
//! branches in a git repository and keeps them in sync with a code-review
//! forge.
//!
//! A stack is a chain of short, reviewable branches where each branch's
//! base is another branch (possibly the trunk), forming a forest rooted at
//! the trunk. The library tracks each branch's base, its last-known base
//! commit, and any associated change request on the forge.
//!
//! ## Layout
//!
//! - [`storage`] — content-addressed key/value store committed to a hidden
//!   ref inside the repository, giving atomic multi-key updates with an
//!   audit trail.
//! - [`state`] — typed branch store on top of [`storage`]: trunk info,
//!   per-branch records, and transient prepared-change records.
//! - [`git`] — the git capability consumed by the core, plus a
//!   subprocess-backed implementation.
//! - [`forge`] — the code-review forge capability and a GitHub provider.
//! - [`stack`] — derived stack topology and the restack check.
//! - [`ops`] — branch operations: create, fold, restack, and the submit
//!   state machine.
//! - [`prompt`] — the interactive-prompt capability consumed by submit.
//! - [`cancel`] — cooperative cancellation shared by all of the above.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cancel;
pub mod forge;
pub mod git;
pub mod ops;
pub mod prompt;
pub mod stack;
pub mod state;
pub mod storage;

#[cfg(test)]
pub(crate) mod testsupport;

pub use cancel::Cancel;
pub use git::Oid;
pub use state::Store;
