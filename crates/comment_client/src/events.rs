use shared::domain::{CommentTarget, ContainerId};
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// `add`: a comment was stored for the container's target.
    Added {
        container: ContainerId,
        target: CommentTarget,
    },
    /// `remove`: a comment was deleted from the container's thread.
    Removed {
        container: ContainerId,
        target: CommentTarget,
    },
    /// `changeSubscription`
    SubscriptionChanged {
        container: ContainerId,
        target: CommentTarget,
        subscribed: bool,
    },
    /// Login state changed; new-comment forms must be re-rendered.
    AuthChanged { logged_in: bool, show_index: bool },
    /// Transient message for the user.
    Notice {
        container: Option<ContainerId>,
        level: NoticeLevel,
        message: String,
    },
}

/// Broadcast fan-out to sibling controllers and the presentation layer.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publishing with no subscriber is not an error.
    pub fn publish(&self, event: EngineEvent) {
        if self.sender.send(event).is_err() {
            debug!("engine event dropped: no subscribers");
        }
    }

    pub fn notice(&self, container: Option<&ContainerId>, level: NoticeLevel, message: impl Into<String>) {
        self.publish(EngineEvent::Notice {
            container: container.cloned(),
            level,
            message: message.into(),
        });
    }
}
