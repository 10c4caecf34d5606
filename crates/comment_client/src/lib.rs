use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use serde::Serialize;
use shared::domain::{Comment, CommentId, CommentTarget, ContainerId, SortKey};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub mod auth;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod forms;
pub mod guards;
mod mutations;
pub mod pagination;
pub mod store;
pub mod target;
pub mod thread;

pub use auth::{AuthProvider, CurrentUser, SessionAuth};
pub use commands::{Command, CommandOutcome};
pub use config::{EngineConfig, Settings};
pub use error::{DuplicateAction, EngineError, EngineResult, ErrorKind};
pub use events::{EngineEvent, EventBus, NoticeLevel};
pub use mutations::{NewComment, RemovalPrompt};
pub use store::{CommentStore, HttpCommentStore, RecentPage, StoreEndpoint, VoteOutcome};
pub use target::{ContentEntity, ShowOptions, TargetResolver};

use crate::{
    forms::{EditState, NewCommentForm},
    guards::{Clock, ControlKey, ControlLocks, RateLimitWindow, SystemClock, VoteGuard},
    pagination::PaginationCursor,
    thread::{ThreadAction, ThreadEffect, ThreadState},
};

/// Container holding the recency-ordered comment index.
pub const RECENT_CONTAINER: &str = "recentcomments";

/// What the renderer needs to project one container.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadSnapshot {
    pub container: ContainerId,
    pub target: CommentTarget,
    pub thread: ThreadState,
    pub form: NewCommentForm,
    pub subscribed: bool,
    pub logged_in: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchMore {
    Loaded(ThreadSnapshot),
    /// The listing was already exhausted; nothing was requested.
    Exhausted,
    /// The container was re-rendered before the page arrived.
    Discarded,
}

struct ThreadSlot {
    generation: u64,
    thread: ThreadState,
    form: NewCommentForm,
}

impl ThreadSlot {
    fn apply(&mut self, action: ThreadAction) -> ThreadEffect {
        let (next, effect) = std::mem::take(&mut self.thread).reduce(action);
        self.thread = next;
        effect
    }
}

struct EditSession {
    container: ContainerId,
    generation: u64,
    state: EditState,
}

struct EngineState {
    threads: HashMap<ContainerId, ThreadSlot>,
    edits: HashMap<CommentId, EditSession>,
    subscriptions: HashMap<ContainerId, bool>,
    rate_limit: RateLimitWindow,
    votes: VoteGuard,
    locks: ControlLocks,
    next_generation: u64,
    recent_loaded: bool,
}

impl EngineState {
    fn slot(&mut self, container: &ContainerId) -> &mut ThreadSlot {
        let next_generation = &mut self.next_generation;
        self.threads.entry(container.clone()).or_insert_with(|| {
            *next_generation += 1;
            let thread = if container.as_str() == RECENT_CONTAINER {
                ThreadState::listing()
            } else {
                ThreadState::default()
            };
            ThreadSlot {
                generation: *next_generation,
                thread,
                form: NewCommentForm::default(),
            }
        })
    }

    /// The slot a pending response belongs to, unless it was torn down meanwhile.
    fn live_slot(&mut self, container: &ContainerId, generation: u64) -> Option<&mut ThreadSlot> {
        self.threads
            .get_mut(container)
            .filter(|slot| slot.generation == generation)
    }

    fn apply_everywhere(&mut self, action: ThreadAction) {
        for slot in self.threads.values_mut() {
            slot.apply(action.clone());
        }
    }

    fn lock_annotated_votes(&mut self, rows: &[Comment]) {
        for row in rows.iter().filter(|row| row.viewer_vote.is_some()) {
            self.votes.try_lock(&row.id);
        }
    }
}

/// Comment interaction and synchronization engine.
///
/// All state lives behind one mutex that is never held across a store call;
/// responses re-acquire it and check that their container still exists.
pub struct CommentEngine {
    store: Arc<dyn CommentStore>,
    auth: Arc<dyn AuthProvider>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    inner: Mutex<EngineState>,
    events: EventBus,
}

impl CommentEngine {
    pub fn new(
        store: Arc<dyn CommentStore>,
        auth: Arc<dyn AuthProvider>,
        config: EngineConfig,
    ) -> Arc<Self> {
        Self::new_with_dependencies(store, auth, Arc::new(SystemClock), config)
    }

    pub fn new_with_dependencies(
        store: Arc<dyn CommentStore>,
        auth: Arc<dyn AuthProvider>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            auth,
            clock,
            inner: Mutex::new(EngineState {
                threads: HashMap::new(),
                edits: HashMap::new(),
                subscriptions: config.subscriptions.clone(),
                rate_limit: RateLimitWindow::new(config.post_interval_secs),
                votes: VoteGuard::default(),
                locks: ControlLocks::default(),
                next_generation: 0,
                recent_loaded: false,
            }),
            config,
            events: EventBus::default(),
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn resolve(&self, container: &ContainerId) -> CommentTarget {
        self.config.targets.resolve(container)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn viewer(&self) -> Option<String> {
        self.auth.current_user().map(|user| user.user_name)
    }

    fn snapshot_of(&self, state: &EngineState, container: &ContainerId) -> Option<ThreadSnapshot> {
        let slot = state.threads.get(container)?;
        Some(ThreadSnapshot {
            container: container.clone(),
            target: self.resolve(container),
            thread: slot.thread.clone(),
            form: slot.form.clone(),
            subscribed: state.subscriptions.get(container).copied().unwrap_or(false),
            logged_in: self.auth.is_logged_in(),
        })
    }

    pub async fn snapshot(&self, container: &ContainerId) -> Option<ThreadSnapshot> {
        let guard = self.inner.lock().await;
        self.snapshot_of(&guard, container)
    }

    pub async fn subscribed(&self, container: &ContainerId) -> bool {
        let guard = self.inner.lock().await;
        guard.subscriptions.get(container).copied().unwrap_or(false)
    }

    /// Seconds until the next comment may be posted, if currently blocked.
    pub async fn post_blocked_for(&self) -> Option<i64> {
        let guard = self.inner.lock().await;
        guard.rate_limit.retry_after(self.clock.now_epoch_seconds())
    }

    pub async fn already_voted(&self, comment: &CommentId) -> bool {
        self.inner.lock().await.votes.already_voted(comment)
    }

    /// Opens a thread; fetches it only when no list is cached yet.
    ///
    /// `Ok(None)` means the container was re-rendered while the scan was in
    /// flight and the result was dropped.
    pub async fn open(&self, container: &ContainerId) -> EngineResult<Option<ThreadSnapshot>> {
        let (effect, generation) = {
            let mut guard = self.inner.lock().await;
            let slot = guard.slot(container);
            (slot.apply(ThreadAction::Open), slot.generation)
        };

        if effect == ThreadEffect::FetchByTarget {
            let target = self.resolve(container);
            let viewer = self.viewer();
            debug!(container = %container, target = %target, "loading comment thread");
            let result = self.store.fetch_by_target(&target, viewer.as_deref()).await;

            let mut guard = self.inner.lock().await;
            if guard.live_slot(container, generation).is_none() {
                debug!(container = %container, "thread torn down before its comments arrived");
                return Ok(None);
            }
            match result {
                Ok(rows) => {
                    guard.lock_annotated_votes(&rows);
                    if let Some(slot) = guard.live_slot(container, generation) {
                        slot.apply(ThreadAction::Loaded(rows));
                    }
                }
                Err(err) => {
                    if let Some(slot) = guard.live_slot(container, generation) {
                        slot.apply(ThreadAction::LoadFailed);
                    }
                    drop(guard);
                    warn!(container = %container, error = %err, "failed to load comment thread");
                    self.events
                        .notice(Some(container), NoticeLevel::Error, err.user_message());
                    return Err(err);
                }
            }
        }

        Ok(self.snapshot(container).await)
    }

    pub async fn close(&self, container: &ContainerId) -> Option<ThreadSnapshot> {
        let mut guard = self.inner.lock().await;
        if let Some(slot) = guard.threads.get_mut(container) {
            slot.apply(ThreadAction::Close);
        }
        self.snapshot_of(&guard, container)
    }

    pub async fn toggle(&self, container: &ContainerId) -> EngineResult<Option<ThreadSnapshot>> {
        let is_open = {
            let guard = self.inner.lock().await;
            guard
                .threads
                .get(container)
                .map(|slot| slot.thread.is_open())
                .unwrap_or(false)
        };
        if is_open {
            Ok(self.close(container).await)
        } else {
            self.open(container).await
        }
    }

    /// Fetches the recency index into [`RECENT_CONTAINER`], once per engine.
    pub async fn load_index(&self) -> EngineResult<Option<ThreadSnapshot>> {
        let container = ContainerId::from(RECENT_CONTAINER);
        {
            let mut guard = self.inner.lock().await;
            if guard.recent_loaded {
                return Ok(self.snapshot_of(&guard, &container));
            }
            guard.recent_loaded = true;
        }
        let result = self
            .fetch_recent_page(&container, self.config.recent_limit, None, false)
            .await;
        if result.is_err() {
            self.inner.lock().await.recent_loaded = false;
        }
        result
    }

    /// Loads the next recency page of `container`, appending to what is shown.
    pub async fn fetch_more(&self, container: &ContainerId) -> EngineResult<FetchMore> {
        let request = {
            let mut guard = self.inner.lock().await;
            let Some(slot) = guard.threads.get(container) else {
                return Err(EngineError::UnknownContainer(container.clone()));
            };
            let next = slot
                .thread
                .cursor
                .as_ref()
                .filter(|_| slot.thread.more_available)
                .and_then(PaginationCursor::next_request);
            let Some(next) = next else {
                return Ok(FetchMore::Exhausted);
            };
            if !guard.locks.try_lock(ControlKey::More(container.clone())) {
                return Err(EngineError::DuplicateAction(DuplicateAction::InFlight));
            }
            next
        };

        let result = self
            .fetch_recent_page(container, request.limit, request.after_key, true)
            .await;
        self.inner
            .lock()
            .await
            .locks
            .unlock(&ControlKey::More(container.clone()));

        Ok(match result? {
            Some(snapshot) => FetchMore::Loaded(snapshot),
            None => FetchMore::Discarded,
        })
    }

    async fn fetch_recent_page(
        &self,
        container: &ContainerId,
        limit: u32,
        after_key: Option<SortKey>,
        append: bool,
    ) -> EngineResult<Option<ThreadSnapshot>> {
        let generation = self.inner.lock().await.slot(container).generation;
        let session = self.auth.session_id();
        let result = self
            .store
            .fetch_recent(limit, after_key.as_ref(), session.as_deref())
            .await;

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                warn!(container = %container, error = %err, "failed to load recent comments");
                self.events
                    .notice(Some(container), NoticeLevel::Error, err.user_message());
                return Err(err);
            }
        };

        let mut guard = self.inner.lock().await;
        if guard.live_slot(container, generation).is_none() {
            debug!(container = %container, "listing torn down before its page arrived");
            return Ok(None);
        }
        guard.lock_annotated_votes(&page.rows);
        // An empty page keeps resuming from the last row already shown.
        let previous_key = guard
            .threads
            .get(container)
            .filter(|_| append)
            .and_then(|slot| slot.thread.cursor.as_ref())
            .and_then(|cursor| cursor.last_key.clone());
        let cursor = PaginationCursor {
            limit,
            offset: page.offset,
            total_rows: page.total_rows,
            last_key: page.rows.last().map(|row| row.key.clone()).or(previous_key),
        };
        debug!(
            container = %container,
            offset = cursor.offset,
            total_rows = cursor.total_rows,
            has_more = cursor.has_more(),
            "recent comments page loaded"
        );
        if let Some(slot) = guard.live_slot(container, generation) {
            slot.apply(ThreadAction::PageLoaded {
                rows: page.rows,
                cursor,
                append,
            });
        }
        Ok(self.snapshot_of(&guard, container))
    }

    /// Entry point for the class/guide/video controllers.
    ///
    /// A re-rendered entity loses every thread, form and edit session of its
    /// containers; responses still pending for them are discarded on arrival.
    pub async fn content_shown(
        &self,
        entity: &ContentEntity,
        options: ShowOptions,
    ) -> Vec<ContainerId> {
        if !options.re_rendered {
            return Vec::new();
        }
        let containers = self.config.targets.containers_for(entity);
        let dropped: HashSet<&ContainerId> = containers.iter().collect();
        let mut guard = self.inner.lock().await;
        guard.threads.retain(|id, _| !dropped.contains(id));
        guard
            .edits
            .retain(|_, session| !dropped.contains(&session.container));
        info!(entity = ?entity, containers = containers.len(), "comment containers recreated");
        containers
    }

    /// Login/logout notification from the authentication controller.
    pub fn auth_changed(&self) {
        let user = self.auth.current_user();
        self.events.publish(EngineEvent::AuthChanged {
            logged_in: user.is_some(),
            show_index: user.map(|u| u.moderator).unwrap_or(false),
        });
    }
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
