//! # Vote Ledger
//!
//! Append-only list of votes stored under [`VOTES_KEY`].
//!
//! - At most one vote per (item, voter) pair, compared case-sensitively
//! - Votes are never edited or removed
//! - Item ids are not checked against any items document, so a vote can outlive its item
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    models::{VOTES_KEY, Vote},
    store::{JsonStore, StoreError},
};

#[derive(Error, Debug)]
pub enum VoteError {
    #[error("{0}")]
    InvalidRequest(&'static str),

    #[error("Already voted for this item")]
    DuplicateVote,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct VoteLedger {
    store: Arc<JsonStore>,
}

impl VoteLedger {
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }

    pub async fn all(&self) -> Result<Vec<Vote>, StoreError> {
        self.store.read(VOTES_KEY, Vec::new()).await
    }

    /// Appends a vote unless this voter already voted for the item.
    pub async fn record(
        &self,
        item_id: &str,
        voter_id: &str,
        origin_address: Option<String>,
    ) -> Result<Vote, VoteError> {
        if item_id.trim().is_empty() {
            return Err(VoteError::InvalidRequest("Missing itemId"));
        }
        if voter_id.trim().is_empty() {
            return Err(VoteError::InvalidRequest("Missing voterId"));
        }

        let vote = self
            .store
            .update(VOTES_KEY, Vec::<Vote>::new(), |votes| {
                if votes
                    .iter()
                    .any(|vote| vote.item_id == item_id && vote.voter_id == voter_id)
                {
                    debug!("Duplicate vote from {voter_id} on {item_id}");
                    return Err(VoteError::DuplicateVote);
                }

                let vote = Vote {
                    item_id: item_id.to_string(),
                    voter_id: voter_id.to_string(),
                    timestamp: Utc::now(),
                    origin_address,
                };
                votes.push(vote.clone());

                Ok(vote)
            })
            .await?;

        info!("Recorded vote from {voter_id} on {item_id}");

        Ok(vote)
    }

    /// Ids of every item `voter_id` has voted for, in voting order.
    pub async fn voted_items(&self, voter_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|vote| vote.voter_id == voter_id)
            .map(|vote| vote.item_id)
            .collect())
    }
}
