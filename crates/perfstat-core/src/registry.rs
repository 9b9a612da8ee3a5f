//! Find-or-create lookup of [`Stat`]s within one ingestion run.

use std::collections::HashMap;

use crate::error::Result;
use crate::stat::{Stat, StatKey};

/// Insertion-ordered set of stats indexed by [`StatKey`].
///
/// Lookups go through a hash index, so their cost tracks the number of
/// distinct (process, metric) pairs rather than the number of samples.
#[derive(Debug, Default, Clone)]
pub struct StatRegistry {
    stats: Vec<Stat>,
    index: HashMap<StatKey, usize>,
}

impl StatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the stat for `(process, metric)`, registering a new empty one
    /// the first time the pair is seen. Process matching ignores case; the
    /// stored stat keeps the casing it was created with.
    pub fn find_or_create(&mut self, process: &str, metric: &str) -> Result<&mut Stat> {
        let idx = self.position_or_insert(process, metric)?;
        Ok(&mut self.stats[idx])
    }

    /// Index of the stat for `(process, metric)` in insertion order,
    /// registering it when absent.
    pub fn position_or_insert(&mut self, process: &str, metric: &str) -> Result<usize> {
        let key = StatKey::new(process, metric);
        if let Some(&idx) = self.index.get(&key) {
            return Ok(idx);
        }

        let stat = Stat::new(process, metric)?;
        let idx = self.stats.len();
        self.stats.push(stat);
        self.index.insert(key, idx);
        tracing::debug!(process, metric, "registered stat");
        Ok(idx)
    }

    pub fn get(&self, process: &str, metric: &str) -> Option<&Stat> {
        self.index
            .get(&StatKey::new(process, metric))
            .map(|&idx| &self.stats[idx])
    }

    pub fn get_mut_at(&mut self, idx: usize) -> Option<&mut Stat> {
        self.stats.get_mut(idx)
    }

    /// Stats in the order they were first registered.
    pub fn stats(&self) -> &[Stat] {
        &self.stats
    }

    /// Owned copy of the current stats, for handing to readers while
    /// ingestion continues.
    pub fn snapshot(&self) -> Vec<Stat> {
        self.stats.clone()
    }

    pub fn into_stats(self) -> Vec<Stat> {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}
