//! Snapshot chunks and the recorded event log.

use crate::block::{DeltaBlock, DeltaBlockCopy, DeltaBlockDiff};
use crate::host::RegionId;
use crate::last_blocks::LastDeltaBlocks;
use crate::retention::RetentionPolicy;
use crate::time::EmuTime;
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashSet};
use std::mem;
use std::rc::Rc;

/// One region's block inside a snapshot.
#[derive(Clone, Debug)]
pub struct RegionBlock {
    pub id: RegionId,
    pub block: DeltaBlock,
}

/// Whole-machine snapshot plus the event-log cursor valid at capture time.
#[derive(Clone, Debug)]
pub struct ReverseChunk {
    seq: u64,
    time: EmuTime,
    blocks: SmallVec<[RegionBlock; 8]>,
    next_event_index: usize,
}

impl ReverseChunk {
    pub fn new(
        seq: u64,
        time: EmuTime,
        blocks: SmallVec<[RegionBlock; 8]>,
        next_event_index: usize,
    ) -> Self {
        Self {
            seq,
            time,
            blocks,
            next_event_index,
        }
    }

    /// Capture sequence number.
    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[inline]
    pub fn time(&self) -> EmuTime {
        self.time
    }

    /// Index of the first event recorded after this snapshot.
    #[inline]
    pub fn next_event_index(&self) -> usize {
        self.next_event_index
    }

    pub fn blocks(&self) -> &[RegionBlock] {
        &self.blocks
    }

    pub fn regions(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.blocks.iter().map(|rb| rb.id)
    }

    /// Full bytes of region `id` at capture time.
    pub fn reconstruct(&self, id: RegionId) -> Option<Vec<u8>> {
        self.blocks
            .iter()
            .find(|rb| rb.id == id)
            .map(|rb| rb.block.to_vec())
    }
}

/// Recorded external input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventChunk<E> {
    pub time: EmuTime,
    pub event: E,
}

/// Snapshots and event log of one rewind session.
#[derive(Debug)]
pub struct ReverseHistory<E> {
    chunks: BTreeMap<EmuTime, ReverseChunk>,
    events: Vec<EventChunk<E>>,
    pub(crate) last_blocks: LastDeltaBlocks,
}

impl<E> Default for ReverseHistory<E> {
    fn default() -> Self {
        Self {
            chunks: BTreeMap::new(),
            events: Vec::new(),
            last_blocks: LastDeltaBlocks::new(),
        }
    }
}

impl<E> ReverseHistory<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Snapshots ordered by time.
    pub fn chunks(&self) -> impl DoubleEndedIterator<Item = &ReverseChunk> + '_ {
        self.chunks.values()
    }

    pub fn chunk(&self, time: EmuTime) -> Option<&ReverseChunk> {
        self.chunks.get(&time)
    }

    /// Latest snapshot taken at or before `time`.
    pub fn chunk_at_or_before(&self, time: EmuTime) -> Option<&ReverseChunk> {
        self.chunks.range(..=time).next_back().map(|(_, chunk)| chunk)
    }

    /// Snapshot times at or before `time`, newest first.
    pub fn chunk_times_at_or_before(&self, time: EmuTime) -> Vec<EmuTime> {
        self.chunks.range(..=time).rev().map(|(t, _)| *t).collect()
    }

    /// Time of the oldest retained snapshot.
    pub fn begin(&self) -> Option<EmuTime> {
        self.chunks.keys().next().copied()
    }

    pub fn last_chunk(&self) -> Option<&ReverseChunk> {
        self.chunks.values().next_back()
    }

    pub fn events(&self) -> &[EventChunk<E>] {
        &self.events
    }

    pub(crate) fn insert_chunk(&mut self, chunk: ReverseChunk) {
        self.chunks.insert(chunk.time, chunk);
    }

    /// Appends an event; time must not run backwards.
    pub(crate) fn push_event(&mut self, time: EmuTime, event: E) {
        if let Some(last) = self.events.last() {
            assert!(
                last.time <= time,
                "event log time went backwards: {} after {}",
                time,
                last.time
            );
        }
        self.events.push(EventChunk { time, event });
    }

    /// Drops snapshots newer than `time` and events from `event_index` on.
    pub(crate) fn truncate_after(&mut self, time: EmuTime, event_index: usize) {
        self.chunks.retain(|chunk_time, _| *chunk_time <= time);
        self.events.truncate(event_index);
    }

    /// Applies `policy` after snapshot `latest_seq` was inserted. The newest
    /// snapshot is never dropped. Events older than the oldest surviving
    /// snapshot can no longer be replayed and are dropped with it. Returns
    /// the number of snapshots evicted.
    pub(crate) fn apply_retention(&mut self, policy: &RetentionPolicy, latest_seq: u64) -> usize {
        let before = self.chunks.len();
        let newest = self.chunks.keys().next_back().copied();
        self.chunks
            .retain(|time, chunk| Some(*time) == newest || policy.keeps(chunk.seq, latest_seq));
        for _ in 0..policy.overflow(self.chunks.len()) {
            self.chunks.pop_first();
        }
        self.drop_unreachable_events();
        before - self.chunks.len()
    }

    /// Removes the event prefix no snapshot refers to and rebases every
    /// chunk's cursor onto the shortened log.
    fn drop_unreachable_events(&mut self) {
        let Some(base) = self.chunks.values().next().map(|c| c.next_event_index) else {
            return;
        };
        if base == 0 {
            return;
        }
        self.events.drain(..base);
        for chunk in self.chunks.values_mut() {
            chunk.next_event_index -= base;
        }
    }

    /// Approximate memory held by snapshots and events. Shared anchors are
    /// counted once.
    pub fn memory_bytes(&self) -> usize {
        let mut copies: HashSet<*const DeltaBlockCopy> = HashSet::new();
        let mut diffs: HashSet<*const DeltaBlockDiff> = HashSet::new();
        let mut total = self.chunks.len() * mem::size_of::<ReverseChunk>();
        for chunk in self.chunks.values() {
            for rb in chunk.blocks() {
                if let DeltaBlock::Diff(diff) = &rb.block {
                    if diffs.insert(Rc::as_ptr(diff)) {
                        total += rb.block.payload_bytes();
                    }
                }
                let anchor = rb.block.anchor();
                if copies.insert(Rc::as_ptr(anchor)) {
                    total += anchor.len() + mem::size_of::<DeltaBlockCopy>();
                }
            }
        }
        total + self.events.len() * mem::size_of::<EventChunk<E>>()
    }
}
