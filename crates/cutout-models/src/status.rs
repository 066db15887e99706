//! Status message state machine.
//!
//! Each job owns one chat message that is edited in place as the job moves
//! `Accepted -> Processing -> Uploading -> Done`, or to `Failed` from any
//! non-terminal state.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ModelError, ModelResult};

/// Longest text the chat transport accepts in one message.
pub const MAX_MESSAGE_CHARS: usize = 4096;

const ACCEPTED_TEXT: &str = "Got it. Cooking your cutout… ⏳";
const UPLOADING_TEXT: &str = "Uploading your cutout… 🚀";
const DONE_TEXT: &str = "Done ✅";

/// User-visible job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusState {
    /// Posted by intake when the job is enqueued
    Accepted,
    /// Backend call in flight (no message edit)
    Processing,
    /// Result ready, delivery in progress
    Uploading,
    /// Result delivered
    Done,
    /// Any step failed
    Failed,
}

impl StatusState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusState::Accepted => "accepted",
            StatusState::Processing => "processing",
            StatusState::Uploading => "uploading",
            StatusState::Done => "done",
            StatusState::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusState::Done | StatusState::Failed)
    }

    /// Transitions only move forward; `Failed` is reachable from any
    /// non-terminal state.
    pub fn can_transition_to(&self, next: StatusState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            StatusState::Accepted => false,
            StatusState::Processing => *self == StatusState::Accepted,
            StatusState::Uploading => {
                matches!(self, StatusState::Accepted | StatusState::Processing)
            }
            StatusState::Done => *self == StatusState::Uploading,
            StatusState::Failed => true,
        }
    }

    /// Validate and perform a transition.
    pub fn transition(self, next: StatusState) -> ModelResult<StatusState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ModelError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// Text shown for this state. `None` for states without a chat edit.
    /// Failed text depends on the reason, see [`StatusState::failed_text`].
    pub fn text(&self) -> Option<&'static str> {
        match self {
            StatusState::Accepted => Some(ACCEPTED_TEXT),
            StatusState::Uploading => Some(UPLOADING_TEXT),
            StatusState::Done => Some(DONE_TEXT),
            StatusState::Processing | StatusState::Failed => None,
        }
    }

    /// Failure text, truncated to the transport limit.
    pub fn failed_text(reason: &str) -> String {
        truncate_message(&format!("Failed: {}", reason))
    }
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cut `text` to at most [`MAX_MESSAGE_CHARS`] characters, marking the cut
/// with an ellipsis.
pub fn truncate_message(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_MESSAGE_CHARS - 1).collect();
    out.push('…');
    out
}
