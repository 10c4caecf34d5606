//! Action table for whatever UI layer owns presentation.

use shared::domain::{Comment, CommentId, ContainerId, VoteDirection};

use crate::{
    error::EngineResult, forms::FormState, mutations::NewComment, store::VoteOutcome,
    CommentEngine, FetchMore, RemovalPrompt, ThreadSnapshot,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ToggleComments {
        container: ContainerId,
    },
    OpenComments {
        container: ContainerId,
    },
    /// Opens a member's thread from the class overview.
    ShowMemberComments {
        container: ContainerId,
    },
    ToggleNewComment {
        container: ContainerId,
    },
    PostComment {
        container: ContainerId,
        comment: NewComment,
    },
    EditComment {
        container: ContainerId,
        comment: CommentId,
    },
    UpdateComment {
        comment: CommentId,
        content: String,
    },
    CancelUpdateComment {
        comment: CommentId,
    },
    DeleteComment {
        container: ContainerId,
        comment: CommentId,
    },
    FetchMoreComments {
        container: ContainerId,
    },
    Vote {
        container: ContainerId,
        comment: CommentId,
        direction: VoteDirection,
    },
    UpdateSubscription {
        container: ContainerId,
        subscribed: bool,
    },
}

#[derive(Debug)]
pub enum CommandOutcome {
    Thread(Option<ThreadSnapshot>),
    Form(FormState),
    Posted(Option<Comment>),
    Editing(Option<String>),
    Updated(Option<String>),
    Restored(String),
    /// Deletes are confirmed by handing the prompt to [`CommentEngine::remove`].
    ConfirmDelete(RemovalPrompt),
    More(FetchMore),
    Voted(VoteOutcome),
    Subscription(bool),
}

impl CommentEngine {
    pub async fn dispatch(&self, command: Command) -> EngineResult<CommandOutcome> {
        Ok(match command {
            Command::ToggleComments { container } => {
                CommandOutcome::Thread(self.toggle(&container).await?)
            }
            Command::OpenComments { container } | Command::ShowMemberComments { container } => {
                CommandOutcome::Thread(self.open(&container).await?)
            }
            Command::ToggleNewComment { container } => {
                CommandOutcome::Form(self.toggle_new_comment(&container).await?)
            }
            Command::PostComment { container, comment } => {
                CommandOutcome::Posted(self.create(&container, comment).await?)
            }
            Command::EditComment { container, comment } => {
                CommandOutcome::Editing(self.begin_edit(&container, &comment).await?)
            }
            Command::UpdateComment { comment, content } => {
                CommandOutcome::Updated(self.save_edit(&comment, &content).await?)
            }
            Command::CancelUpdateComment { comment } => {
                CommandOutcome::Restored(self.cancel_edit(&comment).await?)
            }
            Command::DeleteComment { container, comment } => {
                CommandOutcome::ConfirmDelete(self.prompt_remove(&container, &comment)?)
            }
            Command::FetchMoreComments { container } => {
                CommandOutcome::More(self.fetch_more(&container).await?)
            }
            Command::Vote {
                container,
                comment,
                direction,
            } => CommandOutcome::Voted(self.vote(&container, &comment, direction).await?),
            Command::UpdateSubscription {
                container,
                subscribed,
            } => CommandOutcome::Subscription(self.set_subscription(&container, subscribed).await?),
        })
    }
}
