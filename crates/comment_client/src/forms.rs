use serde::Serialize;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormState {
    Collapsed,
    Expanded,
    Posting,
}

/// New-comment form of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCommentForm {
    pub state: FormState,
    /// Content kept for resubmission after a failed post.
    pub draft: String,
}

impl Default for NewCommentForm {
    fn default() -> Self {
        Self {
            state: FormState::Collapsed,
            draft: String::new(),
        }
    }
}

impl NewCommentForm {
    pub fn toggle(&mut self) {
        self.state = match self.state {
            FormState::Collapsed => FormState::Expanded,
            FormState::Expanded => FormState::Collapsed,
            FormState::Posting => FormState::Posting,
        };
    }

    pub fn begin_post(&mut self, content: &str) {
        self.draft = content.to_string();
        self.state = FormState::Posting;
    }

    pub fn post_succeeded(&mut self) {
        self.draft.clear();
        self.state = FormState::Collapsed;
    }

    pub fn post_failed(&mut self) {
        self.state = FormState::Expanded;
    }
}

/// Edit cycle of a single comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EditState {
    Viewing,
    FetchingCanonical { original: String },
    Editing { original: String, canonical: String },
    Saving { original: String, canonical: String },
}

impl EditState {
    pub fn begin(&self, original: String) -> EngineResult<Self> {
        match self {
            EditState::Viewing => Ok(EditState::FetchingCanonical { original }),
            _ => Err(EngineError::InvalidState("comment is already being edited")),
        }
    }

    pub fn loaded(&self, canonical: String) -> EngineResult<Self> {
        match self {
            EditState::FetchingCanonical { original } => Ok(EditState::Editing {
                original: original.clone(),
                canonical,
            }),
            _ => Err(EngineError::InvalidState("no canonical fetch pending")),
        }
    }

    pub fn save(&self) -> EngineResult<Self> {
        match self {
            EditState::Editing {
                original,
                canonical,
            } => Ok(EditState::Saving {
                original: original.clone(),
                canonical: canonical.clone(),
            }),
            _ => Err(EngineError::InvalidState("comment is not in edit mode")),
        }
    }

    pub fn save_failed(&self) -> Self {
        match self {
            EditState::Saving {
                original,
                canonical,
            } => EditState::Editing {
                original: original.clone(),
                canonical: canonical.clone(),
            },
            other => other.clone(),
        }
    }

    /// Leaves edit mode and hands back the cached pre-edit content.
    pub fn cancel(&self) -> EngineResult<(Self, String)> {
        match self {
            EditState::Editing { original, .. } => Ok((EditState::Viewing, original.clone())),
            _ => Err(EngineError::InvalidState("comment is not in edit mode")),
        }
    }
}
