//! HTTP access to the comment store: range scans and mutations.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Comment, CommentId, CommentTarget, SortKey, VoteDirection},
    protocol::{
        parse_direction, Ack, ByTargetQuery, CommentRow, ContentPayload, CreateCommentForm,
        CreatedPayload, RecentQuery, RecentReply, StoreReply, SubscribeForm, UpdateCommentForm,
        VoteForm, VotePayload,
    },
};
use tracing::debug;
use url::Url;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq)]
pub struct RecentPage {
    pub rows: Vec<Comment>,
    pub offset: u64,
    pub total_rows: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteOutcome {
    pub direction: Option<VoteDirection>,
    pub total: i64,
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Range scan `[target, target + sentinel)`, annotated for `viewer` when given.
    async fn fetch_by_target(
        &self,
        target: &CommentTarget,
        viewer: Option<&str>,
    ) -> EngineResult<Vec<Comment>>;
    async fn fetch_recent(
        &self,
        limit: u32,
        after_key: Option<&SortKey>,
        session: Option<&str>,
    ) -> EngineResult<RecentPage>;
    async fn fetch_single(&self, id: &CommentId, session: Option<&str>) -> EngineResult<String>;
    async fn create(
        &self,
        form: &CreateCommentForm,
        session: Option<&str>,
    ) -> EngineResult<CommentId>;
    async fn update(
        &self,
        id: &CommentId,
        content: &str,
        session: Option<&str>,
    ) -> EngineResult<String>;
    async fn delete(&self, id: &CommentId, session: Option<&str>) -> EngineResult<()>;
    async fn vote(
        &self,
        id: &CommentId,
        direction: VoteDirection,
        session: Option<&str>,
    ) -> EngineResult<VoteOutcome>;
    async fn set_subscription(
        &self,
        target: &CommentTarget,
        subscribed: bool,
        session: Option<&str>,
    ) -> EngineResult<()>;
}

/// `{base_url}/{comments_db}/{comments_version}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEndpoint {
    base: Url,
}

impl StoreEndpoint {
    pub fn new(base_url: &str, comments_db: &str, comments_version: &str) -> anyhow::Result<Self> {
        let mut base = Url::parse(base_url.trim())
            .with_context(|| format!("invalid comment store url '{base_url}'"))?;
        base.path_segments_mut()
            .map_err(|_| anyhow!("comment store url '{base_url}' cannot carry a path"))?
            .pop_if_empty()
            .extend(
                [comments_db, comments_version]
                    .into_iter()
                    .map(str::trim)
                    .filter(|segment| !segment.is_empty()),
            );
        Ok(Self { base })
    }

    pub fn as_str(&self) -> &str {
        self.base.as_str()
    }

    /// Resource url; the session id rides along as `sid` when present.
    pub fn url(&self, segments: &[&str], session: Option<&str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if let Some(sid) = session {
            url.query_pairs_mut().append_pair("sid", sid);
        }
        url
    }
}

pub struct HttpCommentStore {
    http: Client,
    endpoint: StoreEndpoint,
}

impl HttpCommentStore {
    pub fn new(endpoint: StoreEndpoint) -> Self {
        Self {
            http: Client::new(),
            endpoint,
        }
    }

    pub fn with_client(http: Client, endpoint: StoreEndpoint) -> Self {
        Self { http, endpoint }
    }

    pub fn endpoint(&self) -> &StoreEndpoint {
        &self.endpoint
    }
}

async fn decode_reply<T: DeserializeOwned>(response: Response) -> EngineResult<T> {
    let status = response.status();
    let body = response.text().await?;
    if body.trim().is_empty() {
        return Err(EngineError::Network(format!(
            "empty reply body (status {status})"
        )));
    }
    let reply: StoreReply<T> = serde_json::from_str(&body).map_err(|err| {
        EngineError::Network(format!("malformed reply body (status {status}): {err}"))
    })?;
    if !reply.success {
        return Err(EngineError::ServerReported {
            reason: reply.reason,
        });
    }
    Ok(reply.payload)
}

#[async_trait]
impl CommentStore for HttpCommentStore {
    async fn fetch_by_target(
        &self,
        target: &CommentTarget,
        viewer: Option<&str>,
    ) -> EngineResult<Vec<Comment>> {
        let range = target.key_range();
        let query = ByTargetQuery {
            reduce: false,
            startkey: range.start.encode(),
            endkey: range.end.encode(),
            user: viewer.map(str::to_string),
        };
        debug!(target = %target, "fetching comments by target");
        let rows: Vec<CommentRow> = self
            .http
            .get(self.endpoint.url(&["comments"], None))
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn fetch_recent(
        &self,
        limit: u32,
        after_key: Option<&SortKey>,
        session: Option<&str>,
    ) -> EngineResult<RecentPage> {
        let query = RecentQuery {
            limit,
            startkey: after_key.map(SortKey::encode),
        };
        let reply: RecentReply = self
            .http
            .get(self.endpoint.url(&["comments_recent"], session))
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(RecentPage {
            rows: reply.rows.into_iter().map(Comment::from).collect(),
            offset: reply.offset,
            total_rows: reply.total_rows,
        })
    }

    async fn fetch_single(&self, id: &CommentId, session: Option<&str>) -> EngineResult<String> {
        let response = self
            .http
            .get(self.endpoint.url(&["comments", id.as_str()], session))
            .send()
            .await?;
        let payload: ContentPayload = decode_reply(response).await?;
        payload
            .content
            .ok_or_else(|| EngineError::Network(format!("reply for comment {id} has no content")))
    }

    async fn create(
        &self,
        form: &CreateCommentForm,
        session: Option<&str>,
    ) -> EngineResult<CommentId> {
        let response = self
            .http
            .post(self.endpoint.url(&["comments"], session))
            .form(form)
            .send()
            .await?;
        let payload: CreatedPayload = decode_reply(response).await?;
        payload.id.ok_or(EngineError::ServerReported { reason: None })
    }

    async fn update(
        &self,
        id: &CommentId,
        content: &str,
        session: Option<&str>,
    ) -> EngineResult<String> {
        let response = self
            .http
            .post(self.endpoint.url(&["comments", id.as_str()], session))
            .form(&UpdateCommentForm {
                content: content.to_string(),
            })
            .send()
            .await?;
        let payload: ContentPayload = decode_reply(response).await?;
        Ok(payload.content.unwrap_or_else(|| content.to_string()))
    }

    async fn delete(&self, id: &CommentId, session: Option<&str>) -> EngineResult<()> {
        let response = self
            .http
            .post(self.endpoint.url(&["comments", id.as_str(), "delete"], session))
            .send()
            .await?;
        let _: Ack = decode_reply(response).await?;
        Ok(())
    }

    async fn vote(
        &self,
        id: &CommentId,
        direction: VoteDirection,
        session: Option<&str>,
    ) -> EngineResult<VoteOutcome> {
        let response = self
            .http
            .post(self.endpoint.url(&["comments", id.as_str()], session))
            .form(&VoteForm { vote: direction })
            .send()
            .await?;
        let payload: VotePayload = decode_reply(response).await?;
        let total = payload
            .total
            .ok_or_else(|| EngineError::Network(format!("vote reply for {id} has no total")))?;
        Ok(VoteOutcome {
            direction: payload.direction.as_deref().and_then(parse_direction),
            total,
        })
    }

    async fn set_subscription(
        &self,
        target: &CommentTarget,
        subscribed: bool,
        session: Option<&str>,
    ) -> EngineResult<()> {
        let response = self
            .http
            .post(self.endpoint.url(&["subscribe"], session))
            .form(&SubscribeForm {
                target: target.encode(),
                subscribed,
            })
            .send()
            .await?;
        let _: Ack = decode_reply(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_db_and_version() {
        let endpoint = StoreEndpoint::new("http://docs.example.com/", "comments", "v2").expect("endpoint");
        assert_eq!(endpoint.as_str(), "http://docs.example.com/comments/v2");
        assert_eq!(
            endpoint.url(&["comments", "c 1", "delete"], Some("s3cr3t")).as_str(),
            "http://docs.example.com/comments/v2/comments/c%201/delete?sid=s3cr3t"
        );
    }

    #[test]
    fn endpoint_skips_empty_segments() {
        let endpoint = StoreEndpoint::new("http://localhost:3000", "", "").expect("endpoint");
        assert_eq!(
            endpoint.url(&["subscribe"], None).as_str(),
            "http://localhost:3000/subscribe"
        );
    }

    #[test]
    fn endpoint_rejects_garbage() {
        assert!(StoreEndpoint::new("not a url", "db", "v1").is_err());
    }
}
