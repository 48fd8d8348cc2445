//! Priority-ordered queue of pending campaign ids.
//!
//! Ordering, from most to least important:
//! 1. Index of the campaign's game in the configured priority list
//!    (games missing from the list sort after every listed game)
//! 2. Earlier end time
//! 3. Campaign id, lexicographically, so the order is deterministic

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::domain::Campaign;

/// Comparator over campaign ids resolved through the campaign map.
#[derive(Debug, Clone, Copy)]
pub struct CampaignOrdering<'a> {
    campaigns: &'a HashMap<String, Campaign>,
    game_priority: &'a [String],
}

impl<'a> CampaignOrdering<'a> {
    pub fn new(campaigns: &'a HashMap<String, Campaign>, game_priority: &'a [String]) -> Self {
        Self {
            campaigns,
            game_priority,
        }
    }

    /// Position of a game in the priority list, `usize::MAX` when unlisted.
    fn game_rank(&self, game_id: &str) -> usize {
        self.game_priority
            .iter()
            .position(|g| g == game_id)
            .unwrap_or(usize::MAX)
    }

    /// Compare two campaign ids. Less means "pursue first".
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }

        let (ca, cb) = match (self.campaigns.get(a), self.campaigns.get(b)) {
            (Some(ca), Some(cb)) => (ca, cb),
            // Ids without a campaign record sort last.
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (None, None) => return a.cmp(b),
        };

        self.game_rank(&ca.game_id)
            .cmp(&self.game_rank(&cb.game_id))
            .then_with(|| ca.ends_at.cmp(&cb.ends_at))
            .then_with(|| a.cmp(b))
    }
}

/// Pending campaign ids, kept sorted and free of duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingQueue {
    ids: Vec<String>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an id at its ordered position. Returns `false` if it was already queued.
    pub fn insert(&mut self, id: impl Into<String>, ordering: &CampaignOrdering<'_>) -> bool {
        let id = id.into();
        if self.contains(&id) {
            return false;
        }
        let index = self
            .ids
            .partition_point(|existing| ordering.compare(existing, &id) == Ordering::Less);
        self.ids.insert(index, id);
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.ids.len();
        self.ids.retain(|existing| existing != id);
        self.ids.len() != before
    }

    pub fn remove_all(&mut self) {
        self.ids.clear();
    }

    /// Clear and refill the queue from `ids`.
    pub fn rebuild<I, S>(&mut self, ids: I, ordering: &CampaignOrdering<'_>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_all();
        for id in ids {
            self.insert(id, ordering);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|existing| existing == id)
    }

    /// Ids in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
