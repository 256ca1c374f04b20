//! Per-process page tables.
//!
//! An entry stores only the index of the frame backing it. Status bits and
//! replacement metadata are kept in the frame arena and read through
//! [`PhysicalMemory`](crate::memory::PhysicalMemory).

use serde::Serialize;
use std::collections::BTreeMap;

use crate::constants::{FrameId, PageId, Pid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageTableEntry {
    pub page_id: PageId,
    pub frame: Option<FrameId>,
}

impl PageTableEntry {
    pub fn new(page_id: PageId) -> Self {
        PageTableEntry {
            page_id,
            frame: None,
        }
    }

    #[inline]
    pub fn is_present(&self) -> bool {
        self.frame.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct PageTable {
    pid: Pid,
    entries: BTreeMap<PageId, PageTableEntry>,
}

impl PageTable {
    /// Table covering pages `0..num_pages`
    pub fn with_page_count(pid: Pid, num_pages: u32) -> Self {
        Self::with_pages(pid, 0..num_pages)
    }

    /// Table covering an arbitrary page set; duplicates collapse
    pub fn with_pages<I: IntoIterator<Item = PageId>>(pid: Pid, pages: I) -> Self {
        let entries = pages
            .into_iter()
            .map(|page| (page, PageTableEntry::new(page)))
            .collect();
        PageTable { pid, entries }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn contains(&self, page: PageId) -> bool {
        self.entries.contains_key(&page)
    }

    pub fn entry(&self, page: PageId) -> Option<&PageTableEntry> {
        self.entries.get(&page)
    }

    /// Point `page` at `frame`. Returns false if the page is not in the table.
    pub(crate) fn map(&mut self, page: PageId, frame: FrameId) -> bool {
        match self.entries.get_mut(&page) {
            Some(entry) => {
                entry.frame = Some(frame);
                true
            }
            None => false,
        }
    }

    /// Clear the mapping for `page`, returning the frame it held
    pub(crate) fn unmap(&mut self, page: PageId) -> Option<FrameId> {
        self.entries.get_mut(&page).and_then(|e| e.frame.take())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageTableEntry> {
        self.entries.values()
    }

    /// `(page, frame)` for every present page, ascending by page
    pub fn resident(&self) -> impl Iterator<Item = (PageId, FrameId)> + '_ {
        self.entries
            .values()
            .filter_map(|e| e.frame.map(|f| (e.page_id, f)))
    }

    pub fn resident_count(&self) -> usize {
        self.resident().count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
