//! Demand-paging orchestrator.
//!
//! Drives one access at a time: hits update the frame's metadata in place,
//! misses take a free frame or evict a victim chosen by the configured
//! [`ReplacementPolicy`], with swap traffic recorded against the
//! [`BackingStore`].

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::mem;
use tracing::{debug, info, warn};

use crate::config::{ReplacementPolicy, SimConfig};
use crate::constants::{FrameId, PageId, Pid};
use crate::error::{Result, SimError};
use crate::io::MemoryAccess;
use crate::memory::{BackingStore, Frame};
use crate::page_table::PageTable;
use crate::paging::PagingEngine;
use crate::replacement::{PageRef, ResidentPage};
use crate::stats::{SimEvent, Statistics, ratio};
use crate::translation::PageTranslation;

/// Result of one `access_page` step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessOutcome {
    pub pid: Pid,
    pub page: PageId,
    pub tick: u64,
    /// Frame holding the page after the access
    pub frame: FrameId,
    pub page_fault: bool,
    /// `(pid, page)` evicted to make room, if any
    pub evicted_page: Option<PageRef>,
    pub swap_in: bool,
    /// The victim was dirty and written back
    pub swap_out: bool,
}

#[derive(Debug, Clone)]
pub struct VirtualMemoryManager {
    config: SimConfig,
    paging: PagingEngine,
    backing_store: BackingStore,
    page_faults: u64,
    page_hits: u64,
    evictions: u64,
    events: Vec<SimEvent>,
}

impl VirtualMemoryManager {
    pub fn new(config: SimConfig) -> Result<Self> {
        let paging = PagingEngine::new(&config)?;
        info!(
            frames = config.num_frames,
            frame_size = config.frame_size,
            policy = %config.replacement_policy,
            "virtual memory manager created"
        );
        Ok(VirtualMemoryManager {
            config,
            paging,
            backing_store: BackingStore::new(),
            page_faults: 0,
            page_hits: 0,
            evictions: 0,
            events: Vec::new(),
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn policy(&self) -> ReplacementPolicy {
        self.config.replacement_policy
    }

    /// Read-only access to page tables and the frame arena
    pub fn paging(&self) -> &PagingEngine {
        &self.paging
    }

    pub fn backing_store(&self) -> &BackingStore {
        &self.backing_store
    }

    /// Register a process and its page set; every page starts on disk
    pub fn load_process(&mut self, pid: Pid, pages: &[PageId]) -> Result<()> {
        self.paging
            .insert_table(PageTable::with_pages(pid, pages.iter().copied()))?;
        for &page in pages {
            self.backing_store.register(pid, page);
        }
        Ok(())
    }

    /// Remove a process, freeing its frames and its backing-store pages
    pub fn remove_process(&mut self, pid: Pid) -> Result<usize> {
        let freed = self.paging.remove_process(pid)?;
        self.backing_store.remove_process(pid);
        Ok(freed)
    }

    /// Access a page with no knowledge of future references
    pub fn access_page(&mut self, pid: Pid, page: PageId, write: bool) -> Result<AccessOutcome> {
        self.access_page_with_lookahead(pid, page, write, &[])
    }

    /// Access a page; `lookahead` is the remaining trace, consulted by Optimal
    pub fn access_page_with_lookahead(
        &mut self,
        pid: Pid,
        page: PageId,
        write: bool,
        lookahead: &[PageRef],
    ) -> Result<AccessOutcome> {
        let resident = self.paging.frame_of(pid, page)?;
        let tick = self.paging.next_tick();

        if let Some(frame) = resident {
            self.paging.touch(frame, tick, write);
            self.page_hits += 1;
            self.events.push(SimEvent::Hit {
                tick,
                pid,
                page,
                frame,
            });
            return Ok(AccessOutcome {
                pid,
                page,
                tick,
                frame,
                page_fault: false,
                evicted_page: None,
                swap_in: false,
                swap_out: false,
            });
        }

        let mut evicted_page = None;
        let mut swap_out = false;
        if self.paging.memory().free_count() == 0 {
            let victim = self.evict_for(pid, tick, lookahead)?;
            evicted_page = Some((victim.pid, victim.page));
            swap_out = victim.meta.modified;
        }

        let swap_in = self.backing_store.swap_in(pid, page);
        let frame = self
            .paging
            .map_page(pid, page, self.config.frame_size, tick)?;
        self.paging.touch(frame, tick, write);
        self.page_faults += 1;
        self.events.push(SimEvent::Fault {
            tick,
            pid,
            page,
            frame,
        });
        debug!(pid, page, frame, tick, ?evicted_page, "page fault serviced");

        Ok(AccessOutcome {
            pid,
            page,
            tick,
            frame,
            page_fault: true,
            evicted_page,
            swap_in,
            swap_out,
        })
    }

    /// Choose and evict a victim for `pid`, writing it back if dirty.
    ///
    /// Candidates are `pid`'s own resident pages; if it holds none, every
    /// resident page is a candidate.
    fn evict_for(&mut self, pid: Pid, tick: u64, lookahead: &[PageRef]) -> Result<ResidentPage> {
        let mut candidates = self.paging.resident_pages(pid)?;
        if candidates.is_empty() {
            debug!(pid, "no resident pages of requester, widening victim scope");
            candidates = self.paging.all_resident_pages();
        }

        let victim = self
            .policy()
            .select_victim(&candidates, lookahead)
            .ok_or(SimError::OutOfMemory {
                requested: self.config.frame_size,
            })?;

        self.paging.unmap_page(victim.pid, victim.page)?;
        let written_back = victim.meta.modified;
        if written_back {
            self.backing_store.swap_out(victim.pid, victim.page);
        }
        self.evictions += 1;
        self.events.push(SimEvent::Eviction {
            tick,
            pid: victim.pid,
            page: victim.page,
            frame: victim.frame,
            written_back,
        });
        debug!(
            policy = %self.policy(),
            pid = victim.pid,
            page = victim.page,
            frame = victim.frame,
            written_back,
            "victim evicted"
        );
        Ok(victim)
    }

    /// Translate a virtual address without servicing faults
    pub fn translate_address(&mut self, pid: Pid, virtual_address: u64) -> Result<PageTranslation> {
        self.paging.translate_address(pid, virtual_address)
    }

    pub fn resident_pages(&self, pid: Pid) -> Result<Vec<ResidentPage>> {
        self.paging.resident_pages(pid)
    }

    /// Frame-by-frame view for the presentation layer
    pub fn memory_layout(&self) -> &[Frame] {
        self.paging.memory().frames()
    }

    /// Drive a whole trace through the manager.
    ///
    /// Processes not loaded yet are loaded with the distinct pages their
    /// accesses touch. Each access sees the rest of the trace as lookahead.
    /// Accesses that fail are logged and skipped.
    pub fn run_trace(&mut self, accesses: &[MemoryAccess]) -> Vec<AccessOutcome> {
        let frame_size = self.config.frame_size;
        let mut refs: Vec<PageRef> = Vec::with_capacity(accesses.len());
        let mut writes: Vec<bool> = Vec::with_capacity(accesses.len());

        for access in accesses {
            match PageId::try_from(access.address / frame_size) {
                Ok(page) => {
                    refs.push((access.pid, page));
                    writes.push(access.op.is_write());
                }
                Err(_) => warn!(
                    pid = access.pid,
                    address = access.address,
                    "address beyond addressable pages, skipping"
                ),
            }
        }

        let mut page_sets: BTreeMap<Pid, BTreeSet<PageId>> = BTreeMap::new();
        for &(pid, page) in &refs {
            page_sets.entry(pid).or_default().insert(page);
        }
        for (pid, pages) in page_sets {
            if self.paging.has_process(pid) {
                continue;
            }
            let pages: Vec<PageId> = pages.into_iter().collect();
            if let Err(err) = self.load_process(pid, &pages) {
                warn!(pid, %err, "failed to load process from trace");
            }
        }

        let mut outcomes = Vec::with_capacity(refs.len());
        for (i, &(pid, page)) in refs.iter().enumerate() {
            match self.access_page_with_lookahead(pid, page, writes[i], &refs[i + 1..]) {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => warn!(pid, page, %err, "access failed"),
            }
        }
        info!(
            accesses = outcomes.len(),
            faults = self.page_faults,
            hits = self.page_hits,
            "trace complete"
        );
        outcomes
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    /// Hand over the accumulated events, leaving the log empty
    pub fn take_events(&mut self) -> Vec<SimEvent> {
        mem::take(&mut self.events)
    }

    pub fn get_statistics(&self) -> Statistics {
        let mut stats = Statistics::new();
        let total = self.page_faults + self.page_hits;
        let memory = self.paging.memory();

        stats.count("page_faults", self.page_faults);
        stats.count("page_hits", self.page_hits);
        stats.count("total_accesses", total);
        stats.record("hit_rate", ratio(self.page_hits, total));
        stats.record("fault_rate", ratio(self.page_faults, total));
        stats.count("swap_ins", self.backing_store.swap_ins());
        stats.count("swap_outs", self.backing_store.swap_outs());
        stats.count("evictions", self.evictions);
        stats.record("utilization", memory.utilization());
        stats.count(
            "internal_fragmentation_bytes",
            memory.internal_fragmentation(),
        );
        stats.count("resident_pages", self.paging.present_entries() as u64);
        stats.count("backing_store_pages", self.backing_store.len() as u64);
        stats.count("processes", self.paging.process_ids().count() as u64);
        stats.count("num_frames", memory.num_frames() as u64);
        stats.count("frame_size", memory.frame_size());
        stats
    }

    /// Clear all processes, counters and events; configuration is kept
    pub fn reset(&mut self) {
        self.paging.reset();
        self.backing_store.clear();
        self.page_faults = 0;
        self.page_hits = 0;
        self.evictions = 0;
        self.events.clear();
        info!("virtual memory manager reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::AccessOp;

    fn vmm(frames: usize, policy: ReplacementPolicy) -> VirtualMemoryManager {
        let config = SimConfig::new(frames, 4096).with_replacement_policy(policy);
        VirtualMemoryManager::new(config).unwrap()
    }

    fn run(vm: &mut VirtualMemoryManager, pid: Pid, pages: &[PageId]) -> Vec<AccessOutcome> {
        pages
            .iter()
            .map(|&p| vm.access_page(pid, p, false).unwrap())
            .collect()
    }

    #[test]
    fn test_fifo_scenario() {
        let mut vm = vmm(3, ReplacementPolicy::Fifo);
        vm.load_process(1, &[1, 2, 3, 4]).unwrap();
        let out = run(&mut vm, 1, &[1, 2, 3, 1, 4]);

        let faults: Vec<bool> = out.iter().map(|o| o.page_fault).collect();
        assert_eq!(faults, vec![true, true, true, false, true]);
        assert_eq!(out[4].evicted_page, Some((1, 1)));
        assert!(out[4].swap_in);
        assert!(!out[4].swap_out);

        let stats = vm.get_statistics();
        assert_eq!(stats.get("page_faults"), Some(4.0));
        assert_eq!(stats.get("page_hits"), Some(1.0));
        assert_eq!(stats.get("hit_rate"), Some(0.2));
        // Demand-paged frames are filled completely
        assert_eq!(stats.get("internal_fragmentation_bytes"), Some(0.0));
    }

    #[test]
    fn test_lru_scenario() {
        let mut vm = vmm(3, ReplacementPolicy::Lru);
        vm.load_process(1, &[1, 2, 3, 4]).unwrap();
        let out = run(&mut vm, 1, &[1, 2, 3, 1, 4]);

        assert_eq!(out.iter().filter(|o| o.page_fault).count(), 4);
        assert_eq!(out[4].evicted_page, Some((1, 2)));
    }

    #[test]
    fn test_hit_keeps_frame_and_updates_meta() {
        let mut vm = vmm(2, ReplacementPolicy::Lfu);
        vm.load_process(1, &[0, 1]).unwrap();
        let first = vm.access_page(1, 0, false).unwrap();
        let second = vm.access_page(1, 0, true).unwrap();
        assert_eq!(first.frame, second.frame);

        let meta = vm.paging().page_meta(1, 0).unwrap();
        assert_eq!(meta.access_count, 2);
        assert!(meta.modified);
        assert_eq!(meta.last_access, second.tick);
        assert_eq!(meta.load_order, first.tick);
    }

    #[test]
    fn test_dirty_victim_swaps_out() {
        let mut vm = vmm(1, ReplacementPolicy::Fifo);
        vm.load_process(1, &[0, 1]).unwrap();
        vm.access_page(1, 0, true).unwrap();
        let out = vm.access_page(1, 1, false).unwrap();
        assert_eq!(out.evicted_page, Some((1, 0)));
        assert!(out.swap_out);

        // Clean victim is discarded
        let out = vm.access_page(1, 0, false).unwrap();
        assert_eq!(out.evicted_page, Some((1, 1)));
        assert!(!out.swap_out);

        let stats = vm.get_statistics();
        assert_eq!(stats.get("swap_outs"), Some(1.0));
        assert_eq!(stats.get("swap_ins"), Some(3.0));
        assert_eq!(stats.get("evictions"), Some(2.0));
    }

    #[test]
    fn test_fault_resets_metadata() {
        let mut vm = vmm(1, ReplacementPolicy::Fifo);
        vm.load_process(1, &[0, 1]).unwrap();
        vm.access_page(1, 0, true).unwrap();
        vm.access_page(1, 0, true).unwrap();
        let out = vm.access_page(1, 1, false).unwrap();

        let meta = vm.paging().page_meta(1, 1).unwrap();
        assert_eq!(meta.access_count, 1);
        assert!(!meta.modified);
        assert_eq!(meta.load_order, out.tick);
        assert!(vm.paging().page_meta(1, 0).is_none());
    }

    #[test]
    fn test_unknown_process_and_page() {
        let mut vm = vmm(2, ReplacementPolicy::Fifo);
        assert!(matches!(vm.access_page(3, 0, false), Err(SimError::InvalidProcess(3))));
        vm.load_process(3, &[0]).unwrap();
        assert!(matches!(
            vm.access_page(3, 4, false),
            Err(SimError::InvalidAddress { pid: 3, page: 4 })
        ));
        assert!(matches!(vm.load_process(3, &[1]), Err(SimError::ProcessExists(3))));
        // Failed accesses do not count
        assert_eq!(vm.get_statistics().get("total_accesses"), Some(0.0));
    }

    #[test]
    fn test_eviction_scoped_to_requesting_process() {
        let mut vm = vmm(3, ReplacementPolicy::Fifo);
        vm.load_process(1, &[0, 1]).unwrap();
        vm.load_process(2, &[0, 1, 2]).unwrap();
        vm.access_page(1, 0, false).unwrap();
        vm.access_page(2, 0, false).unwrap();
        vm.access_page(2, 1, false).unwrap();

        // Process 1's page 0 is globally oldest, but process 2 evicts its own
        let out = vm.access_page(2, 2, false).unwrap();
        assert_eq!(out.evicted_page, Some((2, 0)));
        let out = vm.access_page(1, 1, false).unwrap();
        assert_eq!(out.evicted_page, Some((1, 0)));
    }

    #[test]
    fn test_eviction_widens_when_requester_has_no_frames() {
        let mut vm = vmm(2, ReplacementPolicy::Fifo);
        vm.load_process(1, &[0, 1]).unwrap();
        vm.load_process(2, &[0]).unwrap();
        vm.access_page(1, 0, false).unwrap();
        vm.access_page(1, 1, false).unwrap();

        let out = vm.access_page(2, 0, false).unwrap();
        assert_eq!(out.evicted_page, Some((1, 0)));
    }

    #[test]
    fn test_optimal_uses_lookahead() {
        let mut vm = vmm(3, ReplacementPolicy::Optimal);
        vm.load_process(1, &[1, 2, 3, 4]).unwrap();
        for p in [1, 2, 3] {
            vm.access_page(1, p, false).unwrap();
        }
        let out = vm
            .access_page_with_lookahead(1, 4, false, &[(1, 1), (1, 2), (1, 4)])
            .unwrap();
        assert_eq!(out.evicted_page, Some((1, 3)));
    }

    #[test]
    fn test_translate_after_access() {
        let mut vm = vmm(4, ReplacementPolicy::Lru);
        vm.load_process(1, &[0, 1]).unwrap();
        let t = vm.translate_address(1, 0x1010).unwrap();
        assert!(t.page_fault);

        let out = vm.access_page(1, 1, false).unwrap();
        let t = vm.translate_address(1, 0x1010).unwrap();
        assert_eq!(t.physical_address, Some(out.frame as u64 * 4096 + 0x10));
    }

    #[test]
    fn test_run_trace_loads_processes() {
        let mut vm = vmm(2, ReplacementPolicy::Optimal);
        let trace = vec![
            MemoryAccess { pid: 1, address: 0x0000, op: AccessOp::Read },
            MemoryAccess { pid: 1, address: 0x1000, op: AccessOp::Write },
            MemoryAccess { pid: 1, address: 0x2000, op: AccessOp::Read },
            MemoryAccess { pid: 1, address: 0x0010, op: AccessOp::Read },
        ];
        let out = vm.run_trace(&trace);
        assert_eq!(out.len(), 4);
        assert_eq!(vm.paging().page_table(1).unwrap().len(), 3);
        // Page 1 never comes back, page 0 does: evict page 1
        assert_eq!(out[2].evicted_page, Some((1, 1)));
        assert!(out[2].swap_out);
        assert!(!out[3].page_fault);
    }

    #[test]
    fn test_remove_process_and_reset() {
        let mut vm = vmm(2, ReplacementPolicy::Mfu);
        vm.load_process(1, &[0, 1, 2]).unwrap();
        vm.access_page(1, 0, false).unwrap();
        vm.access_page(1, 1, false).unwrap();
        assert_eq!(vm.remove_process(1).unwrap(), 2);
        assert!(vm.backing_store().is_empty());
        assert_eq!(vm.paging().memory().allocated_count(), 0);

        vm.load_process(2, &[0]).unwrap();
        vm.access_page(2, 0, false).unwrap();
        assert_eq!(vm.take_events().len(), 3);
        vm.reset();
        let stats = vm.get_statistics();
        assert_eq!(stats.get("processes"), Some(0.0));
        assert_eq!(stats.get("page_faults"), Some(0.0));
        assert!(vm.events().is_empty());
        assert_eq!(vm.config().num_frames, 2);
    }

    #[test]
    fn test_statistics_idempotent() {
        let mut vm = vmm(2, ReplacementPolicy::Lru);
        vm.load_process(1, &[0, 1, 2]).unwrap();
        run(&mut vm, 1, &[0, 1, 2, 0]);
        assert_eq!(vm.get_statistics(), vm.get_statistics());
    }
}
