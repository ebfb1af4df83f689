//! Forge-agnostic change-request data shapes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::git::Oid;

/// Forge-side identifier of a change request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeId(pub String);

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChangeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Change request lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeState {
    /// The change is open for review.
    Open,
    /// The change was closed without merging.
    Closed,
    /// The change was merged.
    Merged,
}

impl ChangeState {
    /// Returns the lowercase wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Merged => "merged",
        }
    }
}

/// Filters for finding change requests by branch.
#[derive(Debug, Clone, Default)]
pub struct FindChangesOptions {
    /// Restrict results to this state.
    pub state: Option<ChangeState>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

/// A change request found on the forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindChangeItem {
    /// Change identifier.
    pub id: ChangeId,
    /// Web URL of the change.
    pub url: String,
    /// Change title.
    pub subject: String,
    /// Lifecycle state.
    pub state: ChangeState,
    /// Commit at the head of the change.
    pub head_hash: Oid,
    /// Branch the change merges into.
    pub base_name: String,
    /// Whether the change is marked as a draft.
    pub draft: bool,
}

/// Request to create a change on the forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitChangeRequest {
    /// Change title.
    pub subject: String,
    /// Change body.
    pub body: String,
    /// Branch to merge from.
    pub head: String,
    /// Branch to merge into.
    pub base: String,
    /// Create as a draft.
    pub draft: bool,
}

/// A freshly created change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedChange {
    /// Change identifier.
    pub id: ChangeId,
    /// Web URL of the change.
    pub url: String,
}

/// Fields to modify on an existing change. `None` leaves the field
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditChangeOptions {
    /// New base branch.
    pub base: Option<String>,
    /// New draft status.
    pub draft: Option<bool>,
}

/// A change-body template offered by the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeTemplate {
    /// Template file name, shown when the user picks between several.
    pub filename: String,
    /// Template contents.
    pub body: String,
}

/// Forge-specific metadata stored with a branch.
///
/// Each forge marshals its own payload; payloads tagged for a forge this
/// build does not know still round-trip through [`ChangeMetadata::Unknown`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeMetadata {
    /// GitHub pull request metadata.
    GitHub {
        /// Pull request number.
        number: u64,
    },
    /// Metadata for a forge not compiled into this build.
    Unknown {
        /// The owning forge's identifier.
        forge: String,
        /// The opaque payload, preserved byte-for-byte as JSON.
        data: serde_json::Value,
    },
}

impl ChangeMetadata {
    /// Identifier of the forge that owns this metadata.
    #[must_use]
    pub fn forge_id(&self) -> &str {
        match self {
            Self::GitHub { .. } => "github",
            Self::Unknown { forge, .. } => forge,
        }
    }

    /// The change id, when this build understands the payload.
    #[must_use]
    pub fn change_id(&self) -> Option<ChangeId> {
        match self {
            Self::GitHub { number } => Some(ChangeId(number.to_string())),
            Self::Unknown { .. } => None,
        }
    }
}
