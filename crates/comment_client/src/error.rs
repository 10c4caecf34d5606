use shared::domain::{CommentId, ContainerId};
use thiserror::Error;

pub const GENERIC_FAILURE_MESSAGE: &str = "There was an error submitting your request";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateAction {
    /// The comment already carries a vote from this session.
    Vote,
    /// A request from the same control has not answered yet.
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    RateLimit,
    AuthRequired,
    DuplicateAction,
    Network,
    ServerReported,
    State,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("comment content is empty")]
    Validation,
    #[error("please wait {interval_secs} seconds between posting comments")]
    RateLimited {
        interval_secs: i64,
        retry_after_secs: i64,
    },
    #[error("login required")]
    AuthRequired,
    #[error("duplicate action: {0:?}")]
    DuplicateAction(DuplicateAction),
    #[error("comment store unreachable or replied with a malformed body: {0}")]
    Network(String),
    #[error("comment store rejected the request: {}", .reason.as_deref().unwrap_or(GENERIC_FAILURE_MESSAGE))]
    ServerReported { reason: Option<String> },
    #[error("unknown comment container {0}")]
    UnknownContainer(ContainerId),
    #[error("unknown comment {0}")]
    UnknownComment(CommentId),
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation => ErrorKind::Validation,
            EngineError::RateLimited { .. } => ErrorKind::RateLimit,
            EngineError::AuthRequired => ErrorKind::AuthRequired,
            EngineError::DuplicateAction(_) => ErrorKind::DuplicateAction,
            EngineError::Network(_) => ErrorKind::Network,
            EngineError::ServerReported { .. } => ErrorKind::ServerReported,
            EngineError::UnknownContainer(_)
            | EngineError::UnknownComment(_)
            | EngineError::InvalidState(_) => ErrorKind::State,
        }
    }

    /// True when the error was decided without talking to the store.
    pub fn is_local(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Network | ErrorKind::ServerReported)
    }

    /// Text for the transient message shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::Validation => "Please enter a comment.".into(),
            EngineError::RateLimited { interval_secs, .. } => {
                format!("Please wait {interval_secs} seconds between posting comments.")
            }
            EngineError::AuthRequired => "Please login to continue.".into(),
            EngineError::DuplicateAction(DuplicateAction::Vote) => {
                "You have already voted on this comment".into()
            }
            EngineError::DuplicateAction(DuplicateAction::InFlight) => {
                "Your previous request is still being processed".into()
            }
            EngineError::ServerReported {
                reason: Some(reason),
            } if !reason.trim().is_empty() => reason.clone(),
            _ => GENERIC_FAILURE_MESSAGE.into(),
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(value: reqwest::Error) -> Self {
        EngineError::Network(value.to_string())
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_reason_wins_over_generic_message() {
        let err = EngineError::ServerReported {
            reason: Some("Comment too long".into()),
        };
        assert_eq!(err.user_message(), "Comment too long");
        assert!(!err.is_local());
    }

    #[test]
    fn missing_or_blank_reason_falls_back_to_generic_message() {
        for reason in [None, Some("  ".to_string())] {
            let err = EngineError::ServerReported { reason };
            assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);
        }
    }

    #[test]
    fn local_rejections_are_classified_as_local() {
        assert!(EngineError::Validation.is_local());
        assert!(EngineError::AuthRequired.is_local());
        assert!(EngineError::DuplicateAction(DuplicateAction::Vote).is_local());
        assert!(!EngineError::Network("eof".into()).is_local());
    }
}
