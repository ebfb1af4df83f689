//! Interactive-prompt capability consumed by submit.
//!
//! The terminal form subsystem lives outside this crate; the core only
//! needs a handful of primitives and a way to tell that no interactive
//! channel exists at all ([`PromptError::Disabled`]).

use thiserror::Error;

use crate::cancel::{Cancel, Cancelled};

/// Errors from prompting the user.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PromptError {
    /// Prompting is disabled: no terminal, or the user opted out.
    #[error("prompting is disabled")]
    Disabled,

    /// The prompt machinery itself failed.
    #[error("prompt failed: {0}")]
    Failed(String),

    /// The operation was cancelled.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Primitive interactions with the user.
pub trait Prompt {
    /// Whether prompting can succeed at all. Callers consult this before
    /// deciding to gather data interactively.
    fn can_prompt(&self) -> bool;

    /// Asks for a line of text, pre-filled with `initial`.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::Disabled`] when no interactive channel
    /// exists.
    fn input(
        &mut self,
        cancel: &Cancel,
        title: &str,
        description: &str,
        initial: &str,
    ) -> Result<String, PromptError>;

    /// Asks the user to pick one of `options`, returning its index.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::Disabled`] when no interactive channel
    /// exists.
    fn select(
        &mut self,
        cancel: &Cancel,
        title: &str,
        options: &[String],
    ) -> Result<usize, PromptError>;

    /// Asks a yes/no question.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::Disabled`] when no interactive channel
    /// exists.
    fn confirm(
        &mut self,
        cancel: &Cancel,
        title: &str,
        description: &str,
        default: bool,
    ) -> Result<bool, PromptError>;

    /// Opens longer-form text for editing, returning the edited text.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::Disabled`] when no interactive channel
    /// exists.
    fn edit(&mut self, cancel: &Cancel, title: &str, initial: &str) -> Result<String, PromptError>;
}

/// A prompt with no user behind it. Every interaction fails with
/// [`PromptError::Disabled`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledPrompt;

impl Prompt for DisabledPrompt {
    fn can_prompt(&self) -> bool {
        false
    }

    fn input(
        &mut self,
        _cancel: &Cancel,
        _title: &str,
        _description: &str,
        _initial: &str,
    ) -> Result<String, PromptError> {
        Err(PromptError::Disabled)
    }

    fn select(
        &mut self,
        _cancel: &Cancel,
        _title: &str,
        _options: &[String],
    ) -> Result<usize, PromptError> {
        Err(PromptError::Disabled)
    }

    fn confirm(
        &mut self,
        _cancel: &Cancel,
        _title: &str,
        _description: &str,
        _default: bool,
    ) -> Result<bool, PromptError> {
        Err(PromptError::Disabled)
    }

    fn edit(
        &mut self,
        _cancel: &Cancel,
        _title: &str,
        _initial: &str,
    ) -> Result<String, PromptError> {
        Err(PromptError::Disabled)
    }
}
