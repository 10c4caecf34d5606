use shared::{
    domain::{Comment, CommentId, CommentTarget, ContainerId, TargetKind, VoteDirection},
    protocol::CreateCommentForm,
};
use tracing::{debug, info, warn};

use crate::{
    error::{DuplicateAction, EngineError, EngineResult},
    events::{EngineEvent, NoticeLevel},
    forms::{EditState, FormState},
    guards::ControlKey,
    store::VoteOutcome,
    thread::ThreadAction,
    CommentEngine, EditSession,
};

const DELETE_PROMPT: &str = "Are you sure you wish to delete this comment?";
const SUBSCRIBED_NOTICE: &str = "Updates to this thread will be e-mailed to you.";
const UNSUBSCRIBED_NOTICE: &str = "You have unsubscribed from this thread.";
const SUBSCRIPTION_FAILED_NOTICE: &str = "Subscription change failed.";

/// Contents of the new-comment form at submit time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewComment {
    pub content: String,
    /// Feedback rating picked in the form, if any.
    pub rating: Option<String>,
    pub action: String,
}

impl NewComment {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            rating: None,
            action: String::new(),
        }
    }
}

/// Pending delete confirmation. Only [`CommentEngine::remove`] consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct RemovalPrompt {
    container: ContainerId,
    comment: CommentId,
}

impl RemovalPrompt {
    pub fn message(&self) -> &'static str {
        DELETE_PROMPT
    }

    pub fn container(&self) -> &ContainerId {
        &self.container
    }

    pub fn comment(&self) -> &CommentId {
        &self.comment
    }
}

/// `(title, url)` the store records for notification mails.
fn permalink(target: &CommentTarget, page_url: &str) -> (String, String) {
    let name = target.name.as_str();
    let (title, prefix, path) = match target.kind {
        TargetKind::Video => (format!("Video {name}"), "#!/video/", name.to_string()),
        TargetKind::Guide => (format!("Guide {name}"), "#!/guide/", name.to_string()),
        _ if !target.member.is_empty() => (
            format!("{name} {}", target.member),
            "#!/api/",
            format!("{name}-{}", target.member),
        ),
        _ => (name.to_string(), "#!/api/", name.to_string()),
    };
    (title, format!("{page_url}{prefix}{path}"))
}

impl CommentEngine {
    fn require_login(&self) -> EngineResult<()> {
        if self.auth.is_logged_in() {
            Ok(())
        } else {
            Err(EngineError::AuthRequired)
        }
    }

    fn surface(&self, container: Option<&ContainerId>, err: &EngineError) {
        self.events
            .notice(container, NoticeLevel::Error, err.user_message());
    }

    pub async fn toggle_new_comment(&self, container: &ContainerId) -> EngineResult<FormState> {
        self.require_login()?;
        let mut guard = self.inner.lock().await;
        let slot = guard.slot(container);
        if !slot.thread.show_form {
            return Err(EngineError::InvalidState("container does not accept comments"));
        }
        slot.form.toggle();
        Ok(slot.form.state)
    }

    /// Posts a comment to the container's target.
    ///
    /// Returns the stored representation once the follow-up scan found it;
    /// `Ok(None)` when the comment was stored but the follow-up scan failed.
    pub async fn create(
        &self,
        container: &ContainerId,
        comment: NewComment,
    ) -> EngineResult<Option<Comment>> {
        self.require_login()?;
        if comment.content.trim().is_empty() {
            return Err(EngineError::Validation);
        }

        let submit = ControlKey::Submit(container.clone());
        let generation = {
            let mut guard = self.inner.lock().await;
            if !guard.slot(container).thread.show_form {
                return Err(EngineError::InvalidState("container does not accept comments"));
            }
            if let Some(retry_after_secs) = guard
                .rate_limit
                .retry_after(self.clock.now_epoch_seconds())
            {
                return Err(EngineError::RateLimited {
                    interval_secs: guard.rate_limit.interval_secs(),
                    retry_after_secs,
                });
            }
            if !guard.locks.try_lock(submit.clone()) {
                return Err(EngineError::DuplicateAction(DuplicateAction::InFlight));
            }
            let slot = guard.slot(container);
            slot.form.begin_post(&comment.content);
            slot.generation
        };

        let target = self.resolve(container);
        let (title, url) = permalink(&target, &self.config.page_url);
        let form = CreateCommentForm {
            target: target.encode(),
            comment: comment.content,
            rating: comment.rating,
            action: comment.action,
            title,
            url,
        };
        let session = self.auth.session_id();
        let result = self.store.create(&form, session.as_deref()).await;

        let id = {
            let mut guard = self.inner.lock().await;
            guard.locks.unlock(&submit);
            match result {
                Ok(id) => {
                    guard.rate_limit.record_post(self.clock.now_epoch_seconds());
                    if let Some(slot) = guard.live_slot(container, generation) {
                        slot.form.post_succeeded();
                    }
                    id
                }
                Err(err) => {
                    if let Some(slot) = guard.live_slot(container, generation) {
                        slot.form.post_failed();
                    }
                    drop(guard);
                    warn!(container = %container, error = %err, "comment post failed");
                    self.surface(Some(container), &err);
                    return Err(err);
                }
            }
        };
        info!(container = %container, comment_id = %id, "comment posted");

        // The store may normalize content; show what it actually kept.
        let viewer = self.viewer();
        let stored = match self.store.fetch_by_target(&target, viewer.as_deref()).await {
            Ok(rows) => rows
                .iter()
                .find(|row| row.id == id)
                .or_else(|| rows.last())
                .cloned(),
            Err(err) => {
                warn!(container = %container, error = %err, "could not reload posted comment");
                self.surface(Some(container), &err);
                None
            }
        };

        let placed = {
            let mut guard = self.inner.lock().await;
            match (stored, guard.live_slot(container, generation)) {
                (Some(stored), Some(slot)) => {
                    slot.apply(ThreadAction::Inserted(stored.clone()));
                    Some(stored)
                }
                (stored, None) => {
                    debug!(container = %container, "container torn down before posted comment arrived");
                    stored
                }
                (None, Some(_)) => None,
            }
        };
        self.events.publish(EngineEvent::Added {
            container: container.clone(),
            target,
        });
        Ok(placed)
    }

    /// Fetches the raw content of a comment and enters edit mode.
    pub async fn begin_edit(
        &self,
        container: &ContainerId,
        comment: &CommentId,
    ) -> EngineResult<Option<String>> {
        self.require_login()?;
        let generation = {
            let mut guard = self.inner.lock().await;
            let Some(slot) = guard.threads.get(container) else {
                return Err(EngineError::UnknownContainer(container.clone()));
            };
            let Some(original) = slot.thread.comment(comment).map(|c| c.content.clone()) else {
                return Err(EngineError::UnknownComment(comment.clone()));
            };
            let generation = slot.generation;
            let current = guard
                .edits
                .get(comment)
                .map(|session| session.state.clone())
                .unwrap_or(EditState::Viewing);
            let state = current.begin(original)?;
            guard.edits.insert(
                comment.clone(),
                EditSession {
                    container: container.clone(),
                    generation,
                    state,
                },
            );
            generation
        };

        let session = self.auth.session_id();
        let result = self.store.fetch_single(comment, session.as_deref()).await;

        let mut guard = self.inner.lock().await;
        let live = guard
            .edits
            .get(comment)
            .is_some_and(|s| s.generation == generation && &s.container == container);
        if !live {
            debug!(comment_id = %comment, "edit session dropped before content arrived");
            return Ok(None);
        }
        match result {
            Ok(canonical) => {
                if let Some(session) = guard.edits.get_mut(comment) {
                    session.state = session.state.loaded(canonical.clone())?;
                }
                Ok(Some(canonical))
            }
            Err(err) => {
                guard.edits.remove(comment);
                drop(guard);
                self.surface(Some(container), &err);
                Err(err)
            }
        }
    }

    /// Saves an edit; on success the thread shows the store's version.
    pub async fn save_edit(
        &self,
        comment: &CommentId,
        content: &str,
    ) -> EngineResult<Option<String>> {
        self.require_login()?;
        let save = ControlKey::Save(comment.clone());
        let (container, generation) = {
            let mut guard = self.inner.lock().await;
            let Some(session) = guard.edits.get(comment) else {
                return Err(EngineError::InvalidState("comment is not in edit mode"));
            };
            let next = session.state.save()?;
            let key = (session.container.clone(), session.generation);
            if !guard.locks.try_lock(save.clone()) {
                return Err(EngineError::DuplicateAction(DuplicateAction::InFlight));
            }
            if let Some(session) = guard.edits.get_mut(comment) {
                session.state = next;
            }
            key
        };

        let session = self.auth.session_id();
        let result = self
            .store
            .update(comment, content, session.as_deref())
            .await;

        let mut guard = self.inner.lock().await;
        guard.locks.unlock(&save);
        let live = guard
            .edits
            .get(comment)
            .is_some_and(|s| s.generation == generation);
        match result {
            Ok(stored) => {
                if live {
                    guard.edits.remove(comment);
                }
                guard.apply_everywhere(ThreadAction::ContentReplaced {
                    id: comment.clone(),
                    content: stored.clone(),
                });
                info!(comment_id = %comment, "comment updated");
                Ok(Some(stored))
            }
            Err(err) => {
                if let Some(session) = guard.edits.get_mut(comment).filter(|_| live) {
                    session.state = session.state.save_failed();
                }
                drop(guard);
                self.surface(Some(&container), &err);
                Err(err)
            }
        }
    }

    /// Leaves edit mode without a request, restoring the cached content.
    pub async fn cancel_edit(&self, comment: &CommentId) -> EngineResult<String> {
        let mut guard = self.inner.lock().await;
        let Some(session) = guard.edits.get(comment) else {
            return Err(EngineError::InvalidState("comment is not in edit mode"));
        };
        let (_, original) = session.state.cancel()?;
        guard.edits.remove(comment);
        guard.apply_everywhere(ThreadAction::ContentReplaced {
            id: comment.clone(),
            content: original.clone(),
        });
        Ok(original)
    }

    pub async fn edit_state(&self, comment: &CommentId) -> EditState {
        self.inner
            .lock()
            .await
            .edits
            .get(comment)
            .map(|session| session.state.clone())
            .unwrap_or(EditState::Viewing)
    }

    /// First step of a delete: nothing is sent until the prompt is confirmed.
    pub fn prompt_remove(
        &self,
        container: &ContainerId,
        comment: &CommentId,
    ) -> EngineResult<RemovalPrompt> {
        self.require_login()?;
        Ok(RemovalPrompt {
            container: container.clone(),
            comment: comment.clone(),
        })
    }

    /// Confirmed delete. Returns whether the comment was removed.
    pub async fn remove(&self, prompt: RemovalPrompt) -> EngineResult<bool> {
        self.require_login()?;
        let RemovalPrompt { container, comment } = prompt;
        let delete = ControlKey::Delete(comment.clone());
        if !self.inner.lock().await.locks.try_lock(delete.clone()) {
            return Err(EngineError::DuplicateAction(DuplicateAction::InFlight));
        }

        let session = self.auth.session_id();
        let result = self.store.delete(&comment, session.as_deref()).await;

        let mut guard = self.inner.lock().await;
        guard.locks.unlock(&delete);
        if let Err(err) = result {
            drop(guard);
            warn!(comment_id = %comment, error = %err, "comment delete failed");
            self.surface(Some(&container), &err);
            return Err(err);
        }
        guard.apply_everywhere(ThreadAction::Removed(comment.clone()));
        guard.edits.remove(&comment);
        drop(guard);

        info!(container = %container, comment_id = %comment, "comment deleted");
        self.events.publish(EngineEvent::Removed {
            target: self.resolve(&container),
            container,
        });
        Ok(true)
    }

    /// Single vote per comment per session.
    pub async fn vote(
        &self,
        container: &ContainerId,
        comment: &CommentId,
        direction: VoteDirection,
    ) -> EngineResult<VoteOutcome> {
        self.require_login()?;
        if !self.inner.lock().await.votes.try_lock(comment) {
            return Err(EngineError::DuplicateAction(DuplicateAction::Vote));
        }

        let session = self.auth.session_id();
        let result = self
            .store
            .vote(comment, direction, session.as_deref())
            .await;

        let mut guard = self.inner.lock().await;
        match result {
            Ok(outcome) => {
                guard.apply_everywhere(ThreadAction::VoteConfirmed {
                    id: comment.clone(),
                    direction: outcome.direction,
                    total: outcome.total,
                });
                debug!(comment_id = %comment, total = outcome.total, "vote recorded");
                Ok(outcome)
            }
            Err(err) => {
                guard.votes.release(comment);
                drop(guard);
                self.surface(Some(container), &err);
                Err(err)
            }
        }
    }

    /// Toggles mail notifications for a thread. Nothing changes locally
    /// until the store confirms.
    pub async fn set_subscription(
        &self,
        container: &ContainerId,
        subscribed: bool,
    ) -> EngineResult<bool> {
        self.require_login()?;
        let key = ControlKey::Subscription(container.clone());
        if !self.inner.lock().await.locks.try_lock(key.clone()) {
            return Err(EngineError::DuplicateAction(DuplicateAction::InFlight));
        }

        let target = self.resolve(container);
        let session = self.auth.session_id();
        let result = self
            .store
            .set_subscription(&target, subscribed, session.as_deref())
            .await;

        let mut guard = self.inner.lock().await;
        guard.locks.unlock(&key);
        match result {
            Ok(()) => {
                guard.subscriptions.insert(container.clone(), subscribed);
                drop(guard);
                let message = if subscribed {
                    SUBSCRIBED_NOTICE
                } else {
                    UNSUBSCRIBED_NOTICE
                };
                self.events
                    .notice(Some(container), NoticeLevel::Info, message);
                self.events.publish(EngineEvent::SubscriptionChanged {
                    container: container.clone(),
                    target,
                    subscribed,
                });
                Ok(subscribed)
            }
            Err(err) => {
                drop(guard);
                warn!(container = %container, error = %err, "subscription change failed");
                self.events
                    .notice(Some(container), NoticeLevel::Error, SUBSCRIPTION_FAILED_NOTICE);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permalinks_follow_target_kind() {
        let page = "http://docs.example.com/ext/";
        assert_eq!(
            permalink(&CommentTarget::new(TargetKind::Video, "intro", ""), page),
            (
                "Video intro".to_string(),
                "http://docs.example.com/ext/#!/video/intro".to_string()
            )
        );
        assert_eq!(
            permalink(&CommentTarget::new(TargetKind::Guide, "grid", ""), page).0,
            "Guide grid"
        );
        assert_eq!(
            permalink(&CommentTarget::new(TargetKind::Class, "Widget", "method-show"), page),
            (
                "Widget method-show".to_string(),
                "http://docs.example.com/ext/#!/api/Widget-method-show".to_string()
            )
        );
        assert_eq!(
            permalink(&CommentTarget::new(TargetKind::Class, "Widget", ""), page).1,
            "http://docs.example.com/ext/#!/api/Widget"
        );
    }
}
