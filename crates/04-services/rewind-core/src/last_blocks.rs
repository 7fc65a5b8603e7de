//! Per-region choice between a fresh full copy and a diff.
//!
//! Every region keeps a weak handle to its current anchor and the number of
//! diff bytes produced since that anchor was made. Once those diffs have
//! cost as much as one copy would, the next snapshot pays for a new copy.
//! Anchors owned only by evicted snapshots disappear on their own; the weak
//! handle then fails to upgrade and the next snapshot starts a new copy.

use crate::block::{DeltaBlock, DeltaBlockCopy, DeltaBlockDiff};
use crate::host::RegionId;
use log::trace;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

#[derive(Debug)]
struct Info {
    size: usize,
    anchor: Weak<DeltaBlockCopy>,
    accumulated_diff: usize,
}

#[derive(Debug, Default)]
pub struct LastDeltaBlocks {
    infos: HashMap<RegionId, Info>,
}

impl LastDeltaBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the block recording `data` as the latest state of region `id`.
    ///
    /// # Panics
    ///
    /// Panics when `data` differs in size from earlier observations of `id`.
    pub fn create_new(&mut self, id: RegionId, data: &[u8]) -> DeltaBlock {
        let size = data.len();
        let info = self.infos.entry(id).or_insert_with(|| Info {
            size,
            anchor: Weak::new(),
            accumulated_diff: 0,
        });
        assert_eq!(
            info.size, size,
            "region {id} changed size from {} to {size} bytes",
            info.size
        );

        let anchor = if info.accumulated_diff >= size {
            None
        } else {
            info.anchor.upgrade()
        };

        match anchor {
            Some(anchor) => {
                let diff = DeltaBlockDiff::new(anchor, data);
                info.accumulated_diff += diff.delta_size();
                trace!(
                    "last_blocks: region={id} diff bytes={} accumulated={}/{size}",
                    diff.delta_size(),
                    info.accumulated_diff
                );
                DeltaBlock::Diff(Rc::new(diff))
            }
            None => {
                let copy = Rc::new(DeltaBlockCopy::new(data));
                info.anchor = Rc::downgrade(&copy);
                info.accumulated_diff = 0;
                trace!("last_blocks: region={id} new anchor size={size}");
                DeltaBlock::Copy(copy)
            }
        }
    }

    /// Diff bytes accumulated against the current anchor of `id`.
    pub fn accumulated_diff(&self, id: RegionId) -> Option<usize> {
        self.infos.get(&id).map(|info| info.accumulated_diff)
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Forgets every region.
    pub fn clear(&mut self) {
        self.infos.clear();
    }
}
