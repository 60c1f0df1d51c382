//! # Board
//!
//! Everything the leaderboard persists and derives.
//!
//!
//!
//! ## Documents
//!
//! All state lives in flat JSON files under one data directory.
//!
//! - `commits.json`: mirrored commits, replaced wholesale on every sync
//! - `pulls.json`: mirrored pull requests, replaced wholesale on every sync
//! - `votes.json`: the vote ledger, append-only
//!
//! Each document seeds itself to `[]` on first read.
//!
//!
//!
//! ## Ranking
//!
//! Vote counts are never stored. Every listing joins the items document with the
//! ledger, sorts by upvotes and filters by search term on the fly. Fine for a few
//! thousand items, revisit if a repository gets much bigger than that.
//!
//!
//!
//! ## Concurrency
//!
//! Handlers run on a multi-threaded runtime, so [`store::JsonStore`] keeps an
//! async mutex per key. Vote de-duplication and snapshot replacement both run
//! inside that critical section. Nothing protects against a second process
//! sharing the same data directory.
pub mod ledger;
pub mod models;
pub mod ranking;
pub mod store;

pub use ledger::{VoteError, VoteLedger};
pub use models::{CanonicalItem, CollectionKind, PullState, RankedItem, Vote};
pub use ranking::{RankingView, rank};
pub use store::{CorruptPolicy, JsonStore, StoreError};
