//! Per-container thread state and its transition function.
//!
//! `ThreadState::reduce` is pure: it takes the current state and an action
//! (usually carrying a store response) and returns the next state plus the
//! effect the engine has to perform. Rendering is left to the caller.

use serde::Serialize;
use shared::domain::{Comment, CommentId, VoteDirection};

use crate::pagination::PaginationCursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Closed,
    Loading,
    Open,
}

#[derive(Debug, Clone)]
pub enum ThreadAction {
    Open,
    Close,
    /// By-target scan answered.
    Loaded(Vec<Comment>),
    /// The scan failed; the thread can be opened again.
    LoadFailed,
    /// A recency page answered. `append` keeps the rows already shown.
    PageLoaded {
        rows: Vec<Comment>,
        cursor: PaginationCursor,
        append: bool,
    },
    Inserted(Comment),
    Removed(CommentId),
    ContentReplaced {
        id: CommentId,
        content: String,
    },
    VoteConfirmed {
        id: CommentId,
        direction: Option<VoteDirection>,
        total: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadEffect {
    None,
    FetchByTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadState {
    pub status: ThreadStatus,
    pub comments: Vec<Comment>,
    /// Whether `comments` holds a fetched list (possibly empty).
    pub cached: bool,
    pub cursor: Option<PaginationCursor>,
    /// Cleared for good once the listing is exhausted.
    pub more_available: bool,
    pub show_form: bool,
}

impl Default for ThreadState {
    fn default() -> Self {
        Self {
            status: ThreadStatus::Closed,
            comments: Vec::new(),
            cached: false,
            cursor: None,
            more_available: false,
            show_form: true,
        }
    }
}

impl ThreadState {
    /// Thread for the recency listing: never offers a new-comment form.
    pub fn listing() -> Self {
        Self {
            show_form: false,
            ..Self::default()
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == ThreadStatus::Open
    }

    pub fn comment(&self, id: &CommentId) -> Option<&Comment> {
        self.comments.iter().find(|c| &c.id == id)
    }

    fn comment_mut(&mut self, id: &CommentId) -> Option<&mut Comment> {
        self.comments.iter_mut().find(|c| &c.id == id)
    }

    pub fn reduce(mut self, action: ThreadAction) -> (Self, ThreadEffect) {
        let mut effect = ThreadEffect::None;
        match action {
            ThreadAction::Open => match self.status {
                ThreadStatus::Closed if self.cached => self.status = ThreadStatus::Open,
                ThreadStatus::Closed => {
                    self.status = ThreadStatus::Loading;
                    effect = ThreadEffect::FetchByTarget;
                }
                ThreadStatus::Loading | ThreadStatus::Open => {}
            },
            ThreadAction::Close => {
                if self.status == ThreadStatus::Open {
                    self.status = ThreadStatus::Closed;
                }
            }
            ThreadAction::Loaded(rows) => {
                if self.status == ThreadStatus::Loading {
                    self.comments = rows;
                    self.cached = true;
                    self.status = ThreadStatus::Open;
                }
            }
            ThreadAction::LoadFailed => {
                if self.status == ThreadStatus::Loading {
                    self.status = ThreadStatus::Closed;
                }
            }
            ThreadAction::PageLoaded {
                rows,
                cursor,
                append,
            } => {
                if append {
                    // The store resumes at the last key, so that row comes back again.
                    let fresh: Vec<Comment> = rows
                        .into_iter()
                        .filter(|row| self.comment(&row.id).is_none())
                        .collect();
                    self.comments.extend(fresh);
                    self.more_available = self.more_available && cursor.has_more();
                } else {
                    self.comments = rows;
                    self.more_available = cursor.has_more();
                }
                self.cursor = Some(cursor);
                self.cached = true;
                self.status = ThreadStatus::Open;
            }
            ThreadAction::Inserted(comment) => {
                if self.comment(&comment.id).is_none() {
                    self.comments.push(comment);
                }
            }
            ThreadAction::Removed(id) => self.comments.retain(|c| c.id != id),
            ThreadAction::ContentReplaced { id, content } => {
                if let Some(comment) = self.comment_mut(&id) {
                    comment.content = content;
                }
            }
            ThreadAction::VoteConfirmed {
                id,
                direction,
                total,
            } => {
                if let Some(comment) = self.comment_mut(&id) {
                    comment.viewer_vote = direction;
                    comment.vote_score = total;
                }
            }
        }
        (self, effect)
    }
}
