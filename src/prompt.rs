// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Interactive confirmation.

use inquire::{Confirm as InquireConfirm, InquireError};
use tracing::warn;

/// Ask user to confirm an action.
pub trait Confirm {
    /// Ask yes/no question, defaulting to no.
    fn confirm(&self, question: &str) -> Result<bool>;
}

/// Confirmation through an inquire prompt on the terminal.
///
/// Without a terminal to ask on, the answer is always no.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, question: &str) -> Result<bool> {
        match InquireConfirm::new(question).with_default(false).prompt() {
            Ok(answer) => Ok(answer),
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(false),
            Err(InquireError::NotTTY) => {
                warn!("no terminal to confirm on, pass --yes to skip confirmation");
                Ok(false)
            }
            Err(error) => Err(PromptError(error)),
        }
    }
}

/// Prompt cannot be shown.
#[derive(Debug, thiserror::Error)]
#[error("cannot prompt for confirmation: {0}")]
pub struct PromptError(#[source] InquireError);

/// Friendly result alias :3
pub type Result<T, E = PromptError> = std::result::Result<T, E>;
