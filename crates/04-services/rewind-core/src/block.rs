//! Snapshot blocks: full copies and diffs against a full copy.
//!
//! A diff always points at a [`DeltaBlockCopy`], never at another diff, so
//! rebuilding any block costs at most one copy plus one patch. The anchor
//! field is typed as the concrete copy to keep it that way.

use crate::delta::{apply_delta_in_place, calc_delta};
use std::mem;
use std::rc::Rc;

/// Immutable full copy of a region.
#[derive(Debug, PartialEq, Eq)]
pub struct DeltaBlockCopy {
    data: Box<[u8]>,
}

impl DeltaBlockCopy {
    pub fn new(data: &[u8]) -> Self {
        Self {
            data: Box::from(data),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Copies the stored bytes into `dst`.
    pub fn apply(&self, dst: &mut [u8]) {
        assert_eq!(
            dst.len(),
            self.data.len(),
            "destination does not match block size"
        );
        dst.copy_from_slice(&self.data);
    }
}

/// Region bytes expressed as a patch on top of an anchor copy.
#[derive(Debug)]
pub struct DeltaBlockDiff {
    anchor: Rc<DeltaBlockCopy>,
    delta: Box<[u8]>,
}

impl DeltaBlockDiff {
    /// Encodes `data` relative to `anchor`.
    pub fn new(anchor: Rc<DeltaBlockCopy>, data: &[u8]) -> Self {
        let delta = calc_delta(anchor.data(), data).into_boxed_slice();
        Self { anchor, delta }
    }

    #[inline]
    pub fn anchor(&self) -> &Rc<DeltaBlockCopy> {
        &self.anchor
    }

    /// Size of the encoded patch. Used for cost accounting only.
    #[inline]
    pub fn delta_size(&self) -> usize {
        self.delta.len()
    }

    /// Rebuilds the region: anchor bytes first, then the patch.
    pub fn apply(&self, dst: &mut [u8]) {
        self.anchor.apply(dst);
        apply_delta_in_place(dst, &self.delta);
    }
}

/// Shared handle to either kind of block.
#[derive(Clone, Debug)]
pub enum DeltaBlock {
    Copy(Rc<DeltaBlockCopy>),
    Diff(Rc<DeltaBlockDiff>),
}

impl DeltaBlock {
    /// Reconstructs the full region into `dst`, which must be `size()` bytes.
    pub fn apply(&self, dst: &mut [u8]) {
        match self {
            DeltaBlock::Copy(copy) => copy.apply(dst),
            DeltaBlock::Diff(diff) => diff.apply(dst),
        }
    }

    /// Size of the reconstructed region.
    pub fn size(&self) -> usize {
        match self {
            DeltaBlock::Copy(copy) => copy.len(),
            DeltaBlock::Diff(diff) => diff.anchor.len(),
        }
    }

    /// The full copy this block is rebuilt from (itself for a copy).
    pub fn anchor(&self) -> &Rc<DeltaBlockCopy> {
        match self {
            DeltaBlock::Copy(copy) => copy,
            DeltaBlock::Diff(diff) => diff.anchor(),
        }
    }

    pub fn is_copy(&self) -> bool {
        matches!(self, DeltaBlock::Copy(_))
    }

    /// Bytes owned by this block alone, excluding a shared anchor.
    pub fn payload_bytes(&self) -> usize {
        match self {
            DeltaBlock::Copy(copy) => copy.len() + mem::size_of::<DeltaBlockCopy>(),
            DeltaBlock::Diff(diff) => diff.delta_size() + mem::size_of::<DeltaBlockDiff>(),
        }
    }

    /// Reconstructs the region into a fresh buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.size()];
        self.apply(&mut out);
        out
    }
}
