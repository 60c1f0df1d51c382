use std::{collections::HashMap, sync::Arc};

use crate::{
    models::{CanonicalItem, CollectionKind, RankedItem, VOTES_KEY, Vote},
    store::{JsonStore, StoreError},
};

/// Joins items with their vote counts, most upvoted first.
///
/// The sort is stable so equally voted items keep their collection order. An empty
/// `search` keeps every item, otherwise only items whose message, author or
/// description contain it case-insensitively. The term is matched as given,
/// whitespace included.
pub fn rank(items: Vec<CanonicalItem>, votes: &[Vote], search: Option<&str>) -> Vec<RankedItem> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for vote in votes {
        *counts.entry(vote.item_id.as_str()).or_default() += 1;
    }

    let mut ranked: Vec<RankedItem> = items
        .into_iter()
        .map(|item| RankedItem {
            upvotes: counts.get(item.id.as_str()).copied().unwrap_or(0),
            item,
        })
        .collect();

    ranked.sort_by(|a, b| b.upvotes.cmp(&a.upvotes));

    match search.filter(|term| !term.is_empty()) {
        Some(term) => {
            let needle = term.to_lowercase();
            ranked.retain(|ranked| ranked.item.matches(&needle));
            ranked
        }
        None => ranked,
    }
}

#[derive(Clone)]
pub struct RankingView {
    store: Arc<JsonStore>,
}

impl RankingView {
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }

    pub async fn list(
        &self,
        kind: CollectionKind,
        search: Option<&str>,
    ) -> Result<Vec<RankedItem>, StoreError> {
        let items: Vec<CanonicalItem> = self.store.read(kind.items_key(), Vec::new()).await?;
        let votes: Vec<Vote> = self.store.read(VOTES_KEY, Vec::new()).await?;

        Ok(rank(items, &votes, search))
    }
}
