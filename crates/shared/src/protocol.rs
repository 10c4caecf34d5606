use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Comment, CommentId, CommentTarget, SortKey, VoteDirection};

/// Query string of `GET /comments` (range scan by target).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ByTargetQuery {
    pub reduce: bool,
    pub startkey: String,
    pub endkey: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Query string of `GET /comments_recent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentQuery {
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startkey: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCommentForm {
    /// JSON-encoded target triple.
    pub target: String,
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
    pub action: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCommentForm {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteForm {
    pub vote: VoteDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeForm {
    pub target: String,
    pub subscribed: bool,
}

/// A stored comment row as returned by both range scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRow {
    #[serde(rename = "_id")]
    pub id: CommentId,
    pub target: CommentTarget,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub content: String,
    #[serde(
        rename = "createdAt",
        default,
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub moderator: bool,
    /// Present when the scan was scoped to a viewer who already voted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<SortKey>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        let key = row.key.unwrap_or_else(|| row.target.sort_key());
        Comment {
            id: row.id,
            target: row.target,
            author: row.author,
            content: row.content,
            created_at: row.created_at,
            vote_score: row.score,
            author_is_moderator: row.moderator,
            viewer_vote: row.vote.as_deref().and_then(parse_direction),
            key,
        }
    }
}

pub fn parse_direction(raw: &str) -> Option<VoteDirection> {
    match raw {
        "up" => Some(VoteDirection::Up),
        "down" => Some(VoteDirection::Down),
        _ => None,
    }
}

/// Reply of `GET /comments_recent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentReply {
    pub rows: Vec<CommentRow>,
    #[serde(default)]
    pub offset: u64,
    pub total_rows: u64,
}

/// `{success, reason?}` envelope every write (and single fetch) answers with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreReply<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub payload: T,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ack {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreatedPayload {
    pub id: Option<CommentId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentPayload {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VotePayload {
    pub direction: Option<String>,
    pub total: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TargetKind;

    #[test]
    fn failed_reply_decodes_without_payload_fields() {
        let reply: StoreReply<VotePayload> =
            serde_json::from_str(r#"{"success":false,"reason":"Already voted"}"#).expect("decode");
        assert!(!reply.success);
        assert_eq!(reply.reason.as_deref(), Some("Already voted"));
        assert!(reply.payload.total.is_none());
    }

    #[test]
    fn row_without_key_paginates_on_target_key() {
        let row: CommentRow = serde_json::from_str(
            r#"{"_id":"c1","target":["class","Widget",""],"author":"ann","content":"hi","score":2,"vote":"up"}"#,
        )
        .expect("decode");
        let comment = Comment::from(row);
        assert_eq!(comment.target.kind, TargetKind::Class);
        assert_eq!(comment.key, comment.target.sort_key());
        assert_eq!(comment.viewer_vote, Some(VoteDirection::Up));
        assert_eq!(comment.vote_score, 2);
    }

    #[test]
    fn foreign_target_row_does_not_spoil_the_scan() {
        let rows: Vec<CommentRow> = serde_json::from_str(
            r#"[{"_id":"a","target":["class","W",""]},{"_id":"b","target":["package","X",""]}]"#,
        )
        .expect("decode");
        let comments: Vec<Comment> = rows.into_iter().map(Comment::from).collect();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].target.kind, TargetKind::Class);
        assert!(comments[1].target.is_unknown());
    }
}
