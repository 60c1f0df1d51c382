use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const COMMITS_KEY: &str = "commits";
pub const PULLS_KEY: &str = "pulls";
pub const VOTES_KEY: &str = "votes";

/// Which upstream collection a set of items was mirrored from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    #[default]
    Commits,
    Pulls,
}

impl CollectionKind {
    /// Store key holding this collection's items document.
    pub fn items_key(self) -> &'static str {
        match self {
            CollectionKind::Commits => COMMITS_KEY,
            CollectionKind::Pulls => PULLS_KEY,
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.items_key())
    }
}

impl FromStr for CollectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            COMMITS_KEY => Ok(CollectionKind::Commits),
            PULLS_KEY => Ok(CollectionKind::Pulls),
            other => Err(format!("unknown collection kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullState {
    Open,
    Closed,
}

/// One upstream commit or pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalItem {
    pub id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub author: String,
    pub date: DateTime<Utc>,
    pub link: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PullState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,
}

impl CanonicalItem {
    /// True if `needle` (already lower-cased) occurs in the message, author or description.
    pub fn matches(&self, needle: &str) -> bool {
        self.message.to_lowercase().contains(needle)
            || self.author.to_lowercase().contains(needle)
            || self
                .description
                .as_deref()
                .is_some_and(|description| description.to_lowercase().contains(needle))
    }
}

/// A single upvote. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub item_id: String,
    pub voter_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedItem {
    #[serde(flatten)]
    pub item: CanonicalItem,
    pub upvotes: u64,
}
