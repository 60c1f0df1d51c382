use std::{collections::HashSet, sync::Arc};

use board::{CanonicalItem, CollectionKind, JsonStore, StoreError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{FetchError, GithubClient};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Fetches a whole collection and swaps it in as the new snapshot.
#[derive(Clone)]
pub struct Orchestrator {
    github: Arc<GithubClient>,
    store: Arc<JsonStore>,
}

impl Orchestrator {
    pub fn new(github: Arc<GithubClient>, store: Arc<JsonStore>) -> Self {
        Self { github, store }
    }

    pub async fn sync_all(&self, kind: CollectionKind, token: &str) -> Result<usize, SyncError> {
        self.sync_all_with(kind, token, |_, _| {}).await
    }

    /// Returns how many items were written. The previous snapshot is left alone
    /// unless the whole fetch succeeds.
    pub async fn sync_all_with<F>(
        &self,
        kind: CollectionKind,
        token: &str,
        on_page: F,
    ) -> Result<usize, SyncError>
    where
        F: FnMut(u32, usize),
    {
        info!("Syncing {kind}...");

        let mut items = self
            .github
            .fetch_all_with(kind, token, on_page)
            .await
            .inspect_err(|e| warn!("Sync of {kind} aborted: {e}"))?;

        dedup(&mut items);

        self.store.write(kind.items_key(), &items).await?;
        info!("Synced {} {kind}", items.len());

        Ok(items.len())
    }
}

/// Pages can shift while we walk them, keep the first copy of each id.
fn dedup(items: &mut Vec<CanonicalItem>) {
    let mut seen = HashSet::new();
    let before = items.len();

    items.retain(|item| seen.insert(item.id.clone()));

    if items.len() != before {
        debug!("Dropped {} duplicate items", before - items.len());
    }
}
