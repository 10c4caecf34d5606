use serde::Serialize;
use shared::domain::SortKey;

pub const DEFAULT_RECENT_LIMIT: u32 = 100;

/// Position within the recency-ordered listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationCursor {
    pub limit: u32,
    pub offset: u64,
    pub total_rows: u64,
    /// Sort key of the last row returned; the next page starts after it.
    pub last_key: Option<SortKey>,
}

/// Parameters of the follow-up `fetch_recent` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentRequest {
    pub limit: u32,
    pub after_key: Option<SortKey>,
}

impl PaginationCursor {
    pub fn has_more(&self) -> bool {
        self.offset.saturating_add(u64::from(self.limit)) < self.total_rows
    }

    /// Upper bound of the rows shown so far ("Showing comments 1-N of M").
    pub fn shown_through(&self) -> u64 {
        self.offset
            .saturating_add(u64::from(self.limit))
            .min(self.total_rows)
    }

    pub fn next_request(&self) -> Option<RecentRequest> {
        if !self.has_more() {
            return None;
        }
        Some(RecentRequest {
            limit: self.limit,
            after_key: self.last_key.clone(),
        })
    }
}
