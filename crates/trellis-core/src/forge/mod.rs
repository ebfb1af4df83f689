//! Forge capability: the remote code-review service.
//!
//! The core is agnostic to the specific forge; it talks to one repository
//! on one forge through [`ForgeRepository`]. [`github::GitHubForge`] is
//! the built-in provider.

use thiserror::Error;

use crate::cancel::{Cancel, Cancelled};

pub mod github;
mod types;

pub use types::{
    ChangeId, ChangeMetadata, ChangeState, ChangeTemplate, EditChangeOptions, FindChangeItem,
    FindChangesOptions, SubmitChangeRequest, SubmittedChange,
};

/// Errors emitted by forge providers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ForgeError {
    /// Invalid provider configuration.
    #[error("forge configuration error: {0}")]
    Configuration(String),

    /// Provider authentication failed.
    #[error("forge authentication error: {0}")]
    Authentication(String),

    /// Request transport failed.
    #[error("forge transport error: {0}")]
    Transport(String),

    /// API request failed with a structured status code.
    #[error("forge API error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the forge API.
        status: u16,
        /// Error body/message.
        message: String,
    },

    /// API payload parse failed.
    #[error("forge parse error: {0}")]
    Parse(String),

    /// The operation was cancelled.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl From<reqwest::Error> for ForgeError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

impl From<serde_json::Error> for ForgeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

/// One repository on a forge.
pub trait ForgeRepository {
    /// Identifier of the forge, e.g. `"github"`. Stored with change
    /// metadata to tag its owner.
    fn forge_id(&self) -> &'static str;

    /// Finds change requests whose head is `branch`.
    ///
    /// # Errors
    ///
    /// Fails when the forge cannot be reached or rejects the request.
    fn find_changes_by_branch(
        &self,
        cancel: &Cancel,
        branch: &str,
        opts: &FindChangesOptions,
    ) -> Result<Vec<FindChangeItem>, ForgeError>;

    /// Returns the change with the given id.
    ///
    /// # Errors
    ///
    /// Fails when the change does not exist or the forge cannot be
    /// reached.
    fn find_change_by_id(
        &self,
        cancel: &Cancel,
        id: &ChangeId,
    ) -> Result<FindChangeItem, ForgeError>;

    /// Creates a change request.
    ///
    /// # Errors
    ///
    /// Fails when the forge rejects the submission.
    fn submit_change(
        &self,
        cancel: &Cancel,
        req: &SubmitChangeRequest,
    ) -> Result<SubmittedChange, ForgeError>;

    /// Modifies an existing change request.
    ///
    /// # Errors
    ///
    /// Fails when the change does not exist or the edit is rejected.
    fn edit_change(
        &self,
        cancel: &Cancel,
        id: &ChangeId,
        opts: &EditChangeOptions,
    ) -> Result<(), ForgeError>;

    /// Lists the change-body templates offered by the repository.
    ///
    /// # Errors
    ///
    /// Fails when the forge cannot be reached.
    fn list_change_templates(&self, cancel: &Cancel) -> Result<Vec<ChangeTemplate>, ForgeError>;

    /// Builds this forge's metadata for a change id.
    ///
    /// # Errors
    ///
    /// Fails when the id is not of this forge's expected shape.
    fn new_change_metadata(
        &self,
        cancel: &Cancel,
        id: &ChangeId,
    ) -> Result<ChangeMetadata, ForgeError>;

    /// Serializes change metadata for storage.
    ///
    /// # Errors
    ///
    /// Fails when the metadata is not serializable.
    fn marshal_change_metadata(
        &self,
        meta: &ChangeMetadata,
    ) -> Result<serde_json::Value, ForgeError>;

    /// Deserializes change metadata previously produced by
    /// [`Self::marshal_change_metadata`].
    ///
    /// # Errors
    ///
    /// Fails when the payload does not parse.
    fn unmarshal_change_metadata(
        &self,
        data: &serde_json::Value,
    ) -> Result<ChangeMetadata, ForgeError>;
}
