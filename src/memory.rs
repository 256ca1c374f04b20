use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

use crate::allocator::{Allocator, Region};
use crate::config::AllocationStrategy;
use crate::constants::*;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameStatus {
    Free,
    Allocated,
}

/// The (process, page) a frame currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FrameOwner {
    pub pid: Pid,
    pub page: PageId,
}

/// Per-frame status bits and replacement metadata.
///
/// Lives only in the frame arena; page tables point at the frame instead of
/// carrying their own copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameMeta {
    /// Tick at which the current page was brought in
    pub load_order: u64,
    /// Tick of the most recent access
    pub last_access: u64,
    pub access_count: u64,
    pub referenced: bool,
    pub modified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub id: FrameId,
    pub status: FrameStatus,
    pub owner: Option<FrameOwner>,
    /// Bytes of the frame the owner asked for
    pub used_bytes: u64,
    pub meta: FrameMeta,
}

impl Frame {
    fn new(id: FrameId) -> Self {
        Frame {
            id,
            status: FrameStatus::Free,
            owner: None,
            used_bytes: 0,
            meta: FrameMeta::default(),
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.status == FrameStatus::Free
    }

    fn release(&mut self) -> Option<FrameOwner> {
        self.status = FrameStatus::Free;
        self.used_bytes = 0;
        self.meta = FrameMeta::default();
        self.owner.take()
    }
}

/// Fixed-size arena of physical frames, indexed by frame id
#[derive(Debug, Clone)]
pub struct PhysicalMemory {
    frames: Vec<Frame>,
    frame_size: u64,
    allocator: Allocator,
}

impl PhysicalMemory {
    /// Create physical memory with every frame free
    pub fn new(num_frames: usize, frame_size: u64, strategy: AllocationStrategy) -> Self {
        PhysicalMemory {
            frames: (0..num_frames).map(Frame::new).collect(),
            frame_size,
            allocator: Allocator::new(strategy),
        }
    }

    #[inline]
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn frame_size(&self) -> u64 {
        self.frame_size
    }

    /// Total size in bytes
    pub fn size(&self) -> u64 {
        (self.frames.len() as u64).saturating_mul(self.frame_size)
    }

    pub fn allocation_strategy(&self) -> AllocationStrategy {
        self.allocator.strategy()
    }

    pub fn set_allocation_strategy(&mut self, strategy: AllocationStrategy) {
        self.allocator.set_strategy(strategy);
    }

    /// Each free frame as a unit-size region based at its index
    fn free_regions(&self) -> Vec<Region> {
        self.frames
            .iter()
            .filter(|f| f.is_free())
            .map(|f| Region::new(f.id as u64, 1))
            .collect()
    }

    /// Allocate a frame for `owner`, letting the allocator pick which one.
    ///
    /// `used_bytes` is clamped to the frame size.
    pub fn allocate_frame(&mut self, owner: FrameOwner, used_bytes: u64) -> Result<FrameId> {
        let regions = self.free_regions();
        let region = self.allocator.select(&regions, 1)?;
        let id = region.base as FrameId;

        let frame = &mut self.frames[id];
        frame.status = FrameStatus::Allocated;
        frame.owner = Some(owner);
        frame.used_bytes = used_bytes.min(self.frame_size);
        frame.meta = FrameMeta::default();

        debug!(frame = id, pid = owner.pid, page = owner.page, "frame allocated");
        Ok(id)
    }

    /// Free a frame, returning its previous owner if it was allocated
    pub fn free_frame(&mut self, id: FrameId) -> Option<FrameOwner> {
        let frame = self.frames.get_mut(id)?;
        if frame.is_free() {
            return None;
        }
        let owner = frame.release();
        debug!(frame = id, "frame freed");
        owner
    }

    pub fn status(&self, id: FrameId) -> Option<FrameStatus> {
        self.frames.get(id).map(|f| f.status)
    }

    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(id)
    }

    pub(crate) fn frame_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.frames.get_mut(id)
    }

    /// Read-only view of the whole arena, in frame order
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn free_count(&self) -> usize {
        self.frames.iter().filter(|f| f.is_free()).count()
    }

    pub fn allocated_count(&self) -> usize {
        self.frames.len() - self.free_count()
    }

    /// Fraction of frames allocated, in `[0, 1]`
    pub fn utilization(&self) -> f64 {
        if self.frames.is_empty() {
            return 0.0;
        }
        self.allocated_count() as f64 / self.frames.len() as f64
    }

    /// Unused bytes inside allocated frames
    pub fn internal_fragmentation(&self) -> u64 {
        self.frames
            .iter()
            .filter(|f| !f.is_free())
            .map(|f| self.frame_size - f.used_bytes)
            .sum()
    }

    /// Calculate the starting address of a frame
    #[inline]
    pub fn frame_address(&self, id: FrameId) -> u64 {
        (id as u64).saturating_mul(self.frame_size)
    }

    /// Free every frame and rewind the allocator
    pub fn reset(&mut self) {
        for frame in &mut self.frames {
            frame.release();
        }
        self.allocator.reset();
    }
}

/// Backing store oracle.
///
/// Records which (process, page) pairs have a copy on disk and counts the
/// transfers; no page contents are simulated.
#[derive(Debug, Clone, Default)]
pub struct BackingStore {
    pages: BTreeSet<(Pid, PageId)>,
    swap_ins: u64,
    swap_outs: u64,
}

impl BackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page as existing on disk without counting a transfer
    pub fn register(&mut self, pid: Pid, page: PageId) {
        self.pages.insert((pid, page));
    }

    pub fn contains(&self, pid: Pid, page: PageId) -> bool {
        self.pages.contains(&(pid, page))
    }

    /// Record a page being read into memory. Returns false if the store has no copy.
    pub fn swap_in(&mut self, pid: Pid, page: PageId) -> bool {
        if !self.contains(pid, page) {
            return false;
        }
        self.swap_ins += 1;
        true
    }

    /// Record a dirty page being written back
    pub fn swap_out(&mut self, pid: Pid, page: PageId) {
        self.pages.insert((pid, page));
        self.swap_outs += 1;
    }

    /// Drop every page belonging to `pid`
    pub fn remove_process(&mut self, pid: Pid) {
        self.pages.retain(|&(owner, _)| owner != pid);
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn swap_ins(&self) -> u64 {
        self.swap_ins
    }

    pub fn swap_outs(&self) -> u64 {
        self.swap_outs
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
