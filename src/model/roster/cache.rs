use std::{
    collections::HashSet,
    sync::{Arc, PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};

use crate::error::VoteError;

/// One immutable generation of the eligible-voter roster.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Roster {
    identities: HashSet<String>,
}

impl Roster {
    pub fn new<I, S>(identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identities: identities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.identities.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// The identities in a stable order.
    pub fn sorted(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.identities.iter().cloned().collect();
        ids.sort_unstable();
        ids
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterStats {
    pub total: usize,
    pub has_backup: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterCount {
    pub count: usize,
}

#[derive(Debug, Default)]
struct Generations {
    current: Arc<Roster>,
    previous: Option<Arc<Roster>>,
}

/// In-memory copy of the current and previous roster generations.
///
/// Readers take an [`Arc`] of a whole generation, so a swap is never
/// observed half-done, and a reader holding a snapshot keeps using it
/// after a swap.
#[derive(Debug, Default)]
pub struct RosterCache {
    generations: RwLock<Generations>,
}

impl RosterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current generation.
    pub fn current(&self) -> Arc<Roster> {
        let generations = self.generations.read().unwrap_or_else(PoisonError::into_inner);
        generations.current.clone()
    }

    pub fn is_eligible(&self, identity: &str) -> bool {
        self.current().contains(identity)
    }

    /// Install `roster` as current, keeping the old current as the backup.
    /// Any older backup is discarded. An empty current roster means none
    /// was ever installed, so it is not kept.
    pub fn replace(&self, roster: Roster) -> RosterCount {
        let roster = Arc::new(roster);
        let count = roster.len();
        let mut generations = self.generations.write().unwrap_or_else(PoisonError::into_inner);
        let old = std::mem::replace(&mut generations.current, roster);
        generations.previous = (!old.is_empty()).then_some(old);
        RosterCount { count }
    }

    /// Make the backup current again. The backup is consumed.
    pub fn rollback(&self) -> Result<RosterCount, VoteError> {
        let mut generations = self.generations.write().unwrap_or_else(PoisonError::into_inner);
        let previous = generations.previous.take().ok_or(VoteError::NoBackup)?;
        let count = previous.len();
        generations.current = previous;
        Ok(RosterCount { count })
    }

    /// Overwrite both generations, e.g. with what was persisted.
    pub fn restore(&self, current: Roster, previous: Option<Roster>) {
        let mut generations = self.generations.write().unwrap_or_else(PoisonError::into_inner);
        *generations = Generations {
            current: Arc::new(current),
            previous: previous.map(Arc::new),
        };
    }

    pub fn has_backup(&self) -> bool {
        let generations = self.generations.read().unwrap_or_else(PoisonError::into_inner);
        generations.previous.is_some()
    }

    pub fn stats(&self) -> RosterStats {
        let generations = self.generations.read().unwrap_or_else(PoisonError::into_inner);
        RosterStats {
            total: generations.current.len(),
            has_backup: generations.previous.is_some(),
        }
    }
}
