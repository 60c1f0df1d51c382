//! # Mirror
//!
//! Pulls a repository's commits or pull requests from the GitHub REST API and
//! stores them as the board's items.
//!
//!
//!
//! ## Pagination
//!
//! - Pages of 100, authenticated with the caller's bearer token
//! - The next page is whatever URL the `Link` header advertises as `rel="next"`
//! - No `next` means we are done
//! - `max_pages` caps the walk. Hitting it while `next` is still advertised is an
//!   error, so a truncated collection never replaces a good snapshot
//!
//!
//!
//! ## Normalization
//!
//! Commits
//! - Skip anything authored by the excluded identity (bots, release tooling)
//! - Skip messages starting with the excluded prefix (merge commits)
//! - `id` is the SHA
//!
//! Pull requests
//! - Nothing is skipped
//! - `id` is the PR number, `message` the title, `description` the body
//! - `merged` is true iff GitHub reports a merge timestamp
//!
//!
//!
//! ## Sync
//!
//! All or nothing. Any failed page aborts the sync before the store is touched, so
//! the previous snapshot keeps serving until a sync completes.
//!
//!
//!
//! ## CLI
//!
//! Sync commits into `./data` without running the server.
//! ```sh
//! GITHUB_TOKEN=... cargo run -p mirror -- --owner rust-lang --repo rustlings
//! ```
//!
//! Pull requests instead.
//! ```sh
//! cargo run -p mirror -- --owner rust-lang --repo rustlings --kind pulls
//! ```
pub mod client;
pub mod models;
pub mod sync;
pub mod utils;

pub use client::{FetchError, GithubClient, UpstreamConfig};
pub use sync::{Orchestrator, SyncError};
