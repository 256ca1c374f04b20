//! Fixed-size paging: process lifecycle, frame allocation and
//! logical-to-physical translation.

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::{AllocationStrategy, SimConfig};
use crate::constants::{FrameId, PageId, Pid};
use crate::error::{Result, SimError};
use crate::memory::{FrameMeta, FrameOwner, PhysicalMemory};
use crate::page_table::PageTable;
use crate::replacement::ResidentPage;
use crate::stats::{Statistics, ratio};
use crate::translation::{LogicalAddress, PageTranslation};

#[derive(Debug, Clone)]
pub struct PagingEngine {
    memory: PhysicalMemory,
    tables: BTreeMap<Pid, PageTable>,
    /// Monotonic step counter; never derived from wall-clock time
    tick: u64,
    page_faults: u64,
    successful_translations: u64,
}

impl PagingEngine {
    pub fn new(config: &SimConfig) -> Result<Self> {
        config.validate()?;
        Ok(PagingEngine {
            memory: PhysicalMemory::new(
                config.num_frames,
                config.frame_size,
                config.allocation_strategy,
            ),
            tables: BTreeMap::new(),
            tick: 0,
            page_faults: 0,
            successful_translations: 0,
        })
    }

    pub fn memory(&self) -> &PhysicalMemory {
        &self.memory
    }

    #[inline]
    pub fn frame_size(&self) -> u64 {
        self.memory.frame_size()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub(crate) fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    pub fn set_allocation_strategy(&mut self, strategy: AllocationStrategy) {
        self.memory.set_allocation_strategy(strategy);
    }

    /// Create a process whose page table covers pages `0..num_pages`
    pub fn create_process(&mut self, pid: Pid, num_pages: u32) -> Result<()> {
        self.insert_table(PageTable::with_page_count(pid, num_pages))
    }

    pub(crate) fn insert_table(&mut self, table: PageTable) -> Result<()> {
        let pid = table.pid();
        if self.tables.contains_key(&pid) {
            return Err(SimError::ProcessExists(pid));
        }
        info!(pid, pages = table.len(), "process created");
        self.tables.insert(pid, table);
        Ok(())
    }

    /// Remove a process and release every frame it owns.
    ///
    /// Returns the number of frames released.
    pub fn remove_process(&mut self, pid: Pid) -> Result<usize> {
        let table = self.tables.remove(&pid).ok_or(SimError::InvalidProcess(pid))?;
        let mut freed = 0;
        for (_, frame) in table.resident() {
            if self.memory.free_frame(frame).is_some() {
                freed += 1;
            }
        }
        info!(pid, freed, "process removed");
        Ok(freed)
    }

    pub fn page_table(&self, pid: Pid) -> Result<&PageTable> {
        self.tables.get(&pid).ok_or(SimError::InvalidProcess(pid))
    }

    pub fn process_ids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.tables.keys().copied()
    }

    pub fn has_process(&self, pid: Pid) -> bool {
        self.tables.contains_key(&pid)
    }

    /// Bring `page` into a frame chosen by the allocator.
    ///
    /// Returns the existing frame if the page is already present. Fails with
    /// `OutOfMemory` when no frame is free; eviction is the caller's call.
    pub fn allocate_page(&mut self, pid: Pid, page: PageId) -> Result<FrameId> {
        let tick = self.next_tick();
        let bytes = self.frame_size();
        self.map_page(pid, page, bytes, tick)
    }

    /// Like [`allocate_page`](Self::allocate_page) for a request of `bytes`
    /// (`1..=frame_size`); the rest of the frame is internal fragmentation.
    pub fn allocate_page_sized(&mut self, pid: Pid, page: PageId, bytes: u64) -> Result<FrameId> {
        if bytes == 0 || bytes > self.frame_size() {
            return Err(SimError::InvalidConfig(format!(
                "page request of {} bytes must be within 1..={}",
                bytes,
                self.frame_size()
            )));
        }
        let tick = self.next_tick();
        self.map_page(pid, page, bytes, tick)
    }

    pub(crate) fn map_page(
        &mut self,
        pid: Pid,
        page: PageId,
        bytes: u64,
        tick: u64,
    ) -> Result<FrameId> {
        let table = self.tables.get_mut(&pid).ok_or(SimError::InvalidProcess(pid))?;
        let entry = table.entry(page).ok_or(SimError::InvalidAddress { pid, page })?;
        if let Some(frame) = entry.frame {
            return Ok(frame);
        }

        let frame = self.memory.allocate_frame(FrameOwner { pid, page }, bytes)?;
        table.map(page, frame);
        if let Some(f) = self.memory.frame_mut(frame) {
            f.meta.load_order = tick;
            f.meta.last_access = tick;
        }
        debug!(pid, page, frame, tick, "page mapped");
        Ok(frame)
    }

    /// Release the frame behind `page`. Returns `None` if it was not present.
    pub fn deallocate_page(&mut self, pid: Pid, page: PageId) -> Result<Option<FrameId>> {
        Ok(self.unmap_page(pid, page)?.map(|(frame, _)| frame))
    }

    /// Unmap and free `page`, returning its frame and the metadata it had
    pub(crate) fn unmap_page(&mut self, pid: Pid, page: PageId) -> Result<Option<(FrameId, FrameMeta)>> {
        let table = self.tables.get_mut(&pid).ok_or(SimError::InvalidProcess(pid))?;
        if !table.contains(page) {
            return Err(SimError::InvalidAddress { pid, page });
        }
        let Some(frame) = table.unmap(page) else {
            return Ok(None);
        };
        let meta = self
            .memory
            .frame(frame)
            .map(|f| f.meta)
            .unwrap_or_default();
        self.memory.free_frame(frame);
        debug!(pid, page, frame, "page unmapped");
        Ok(Some((frame, meta)))
    }

    /// Translate a logical address of `pid`.
    ///
    /// A non-present page is a page fault (`Ok` with `page_fault` set); a page
    /// outside the process's table is `InvalidAddress`.
    pub fn translate_address(&mut self, pid: Pid, logical_address: u64) -> Result<PageTranslation> {
        let frame_size = self.frame_size();
        let table = self.tables.get(&pid).ok_or(SimError::InvalidProcess(pid))?;
        let logical = LogicalAddress::split(logical_address, frame_size);

        let page = PageId::try_from(logical.page_number)
            .ok()
            .filter(|p| table.contains(*p))
            .ok_or(SimError::InvalidAddress {
                pid,
                page: logical.page_number.min(PageId::MAX as u64) as PageId,
            })?;

        match table.entry(page).and_then(|e| e.frame) {
            Some(frame) => {
                if let Some(f) = self.memory.frame_mut(frame) {
                    f.meta.referenced = true;
                }
                self.successful_translations += 1;
                Ok(PageTranslation::resident(logical, frame, frame_size))
            }
            None => {
                self.page_faults += 1;
                debug!(pid, page, "page fault on translation");
                Ok(PageTranslation::fault(logical))
            }
        }
    }

    /// Access a page without demand paging.
    ///
    /// Returns `true` on a hit; a non-present page counts as a fault and
    /// returns `false`.
    pub fn access_page(&mut self, pid: Pid, page: PageId, write: bool) -> Result<bool> {
        let frame = self.frame_of(pid, page)?;
        let tick = self.next_tick();
        match frame {
            Some(frame) => {
                self.touch(frame, tick, write);
                self.successful_translations += 1;
                Ok(true)
            }
            None => {
                self.page_faults += 1;
                Ok(false)
            }
        }
    }

    /// Frame currently backing `page`, validating pid and page first
    pub fn frame_of(&self, pid: Pid, page: PageId) -> Result<Option<FrameId>> {
        let table = self.page_table(pid)?;
        let entry = table.entry(page).ok_or(SimError::InvalidAddress { pid, page })?;
        Ok(entry.frame)
    }

    /// Status bits and replacement metadata of a present page
    pub fn page_meta(&self, pid: Pid, page: PageId) -> Option<FrameMeta> {
        let frame = self.frame_of(pid, page).ok().flatten()?;
        self.memory.frame(frame).map(|f| f.meta)
    }

    /// Record an access against the frame's metadata in place
    pub(crate) fn touch(&mut self, frame: FrameId, tick: u64, write: bool) {
        if let Some(f) = self.memory.frame_mut(frame) {
            f.meta.referenced = true;
            f.meta.modified |= write;
            f.meta.access_count += 1;
            f.meta.last_access = tick;
        }
    }

    /// Resident set of one process, ascending by page
    pub fn resident_pages(&self, pid: Pid) -> Result<Vec<ResidentPage>> {
        let table = self.page_table(pid)?;
        Ok(self.snapshot(table))
    }

    /// Resident set across all processes
    pub fn all_resident_pages(&self) -> Vec<ResidentPage> {
        self.tables.values().flat_map(|t| self.snapshot(t)).collect()
    }

    fn snapshot(&self, table: &PageTable) -> Vec<ResidentPage> {
        table
            .resident()
            .filter_map(|(page, frame)| {
                self.memory.frame(frame).map(|f| ResidentPage {
                    pid: table.pid(),
                    page,
                    frame,
                    meta: f.meta,
                })
            })
            .collect()
    }

    /// Number of present entries across every page table
    pub fn present_entries(&self) -> usize {
        self.tables.values().map(|t| t.resident_count()).sum()
    }

    pub fn get_statistics(&self) -> Statistics {
        let mut stats = Statistics::new();
        let attempts = self.page_faults + self.successful_translations;

        stats.count("total_processes", self.tables.len() as u64);
        stats.count(
            "total_pages",
            self.tables.values().map(|t| t.len() as u64).sum(),
        );
        stats.count("page_faults", self.page_faults);
        stats.count("successful_translations", self.successful_translations);
        stats.record("page_fault_rate", ratio(self.page_faults, attempts));
        stats.count("total_frames", self.memory.num_frames() as u64);
        stats.count("free_frames", self.memory.free_count() as u64);
        stats.count("allocated_frames", self.memory.allocated_count() as u64);
        stats.record("utilization", self.memory.utilization());
        stats.count(
            "internal_fragmentation_bytes",
            self.memory.internal_fragmentation(),
        );
        stats
    }

    /// Drop every process and counter; configuration is kept
    pub fn reset(&mut self) {
        self.memory.reset();
        self.tables.clear();
        self.tick = 0;
        self.page_faults = 0;
        self.successful_translations = 0;
        info!("paging engine reset");
    }
}
