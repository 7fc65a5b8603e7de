//! Snapshot thinning.
//!
//! The newest `keep_recent` snapshots are always kept. Older ones are thinned
//! in generations: a snapshot whose age (in captures) falls in
//! `[keep_recent * 2^(g-1), keep_recent * 2^g)` belongs to generation `g` and
//! survives only if its sequence number is a multiple of `2^g`. Density
//! halves with every generation, so history reaches back exponentially far
//! for a logarithmic number of snapshots. Because the generation of a
//! snapshot only grows with age, a dropped snapshot is never needed again.
//!
//! The event log is bounded along with the snapshots: events older than the
//! oldest retained snapshot are dropped.

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Snapshots kept at full capture density.
    pub keep_recent: NonZeroUsize,
    /// Hard cap on retained snapshots; the oldest go first.
    pub max_snapshots: Option<NonZeroUsize>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_recent: NonZeroUsize::new(32).expect("non-zero"),
            max_snapshots: None,
        }
    }
}

impl RetentionPolicy {
    /// Whether snapshot `seq` survives once snapshot `latest` exists.
    pub fn keeps(&self, seq: u64, latest: u64) -> bool {
        let age = latest.saturating_sub(seq);
        let recent = self.keep_recent.get() as u64;
        if age < recent {
            return true;
        }
        let generation = (age / recent).ilog2() + 1;
        if generation >= u64::BITS {
            return seq == 0;
        }
        seq % (1u64 << generation) == 0
    }

    /// Number of snapshots to drop from the oldest end to honour the cap.
    pub fn overflow(&self, retained: usize) -> usize {
        self.max_snapshots
            .map_or(0, |max| retained.saturating_sub(max.get()))
    }
}
