use board::PullState;
use chrono::{DateTime, Utc};
use serde::Deserialize;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_EXCLUDED_AUTHOR: &str = "github-actions[bot]";
pub const DEFAULT_EXCLUDED_PREFIX: &str = "Merge";
pub const DEFAULT_MAX_PAGES: u32 = 100;
pub const PAGE_SIZE: u32 = 100;

pub const ACCEPT: &str = "application/vnd.github+json";
pub const USER_AGENT: &str = concat!("commitboard-mirror/", env!("CARGO_PKG_VERSION"));

/// Entry of `GET /repos/{owner}/{repo}/commits`.
#[derive(Deserialize)]
pub struct RawCommit {
    pub sha: String,
    pub html_url: String,
    pub commit: CommitDetail,
}

#[derive(Deserialize)]
pub struct CommitDetail {
    pub message: String,
    pub author: Option<GitActor>,
    pub committer: Option<GitActor>,
}

#[derive(Deserialize)]
pub struct GitActor {
    pub name: String,
    pub date: DateTime<Utc>,
}

/// Entry of `GET /repos/{owner}/{repo}/pulls`.
#[derive(Deserialize)]
pub struct RawPull {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub user: Option<User>,
    pub state: PullState,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub html_url: String,
}

#[derive(Deserialize)]
pub struct User {
    pub login: String,
}

/// GitHub's error payload, e.g. `{"message": "Bad credentials"}`.
#[derive(Deserialize)]
pub struct ErrorBody {
    pub message: String,
}
