//! Forum records consumed by the summarization pipeline.
//!
//! These are snapshots handed over by the forum API client; the pipeline never
//! mutates or persists them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author reference attached to threads and posts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub id: Option<String>,
    pub username: String,
}

/// A discussion thread with its opening post
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: Author,
}

/// A reply within a thread
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub body: String,
    pub thread_id: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub author: Option<Author>,
}

impl Post {
    /// Display name of the poster, falling back to the raw author id
    pub fn username(&self) -> String {
        match &self.author {
            Some(author) if !author.username.trim().is_empty() => author.username.clone(),
            _ => format!("user-{}", self.author_id),
        }
    }
}

/// Epoch-millisecond string of the most recent activity on a thread.
///
/// Uses the newest post when there is one, otherwise the thread's own
/// `updated_at`. Suitable as the `lastPostTimestamp` half of a cache key.
pub fn last_post_timestamp(thread: &Thread, posts: &[Post]) -> String {
    let latest = posts
        .iter()
        .map(|p| p.created_at)
        .max()
        .unwrap_or(thread.updated_at);
    latest.timestamp_millis().max(0).to_string()
}
