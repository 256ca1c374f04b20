//! Integration tests for the memory simulator

use memsim::io::parse_trace;
use memsim::{
    AccessOp, AllocationStrategy, MemoryAccess, PagingEngine, ReplacementPolicy,
    SegmentationEngine, SimConfig, SimError, VirtualMemoryManager,
};

const PAGE: u64 = 4096;

fn manager(frames: usize, policy: ReplacementPolicy) -> VirtualMemoryManager {
    VirtualMemoryManager::new(SimConfig::new(frames, PAGE).with_replacement_policy(policy))
        .unwrap()
}

fn trace_of(pid: u32, pages: &[u64]) -> Vec<MemoryAccess> {
    pages
        .iter()
        .map(|&p| MemoryAccess {
            pid,
            address: p * PAGE,
            op: AccessOp::Read,
        })
        .collect()
}

/// Reference string used in most operating systems textbooks
const TEXTBOOK: [u64; 20] = [7, 0, 1, 2, 0, 3, 0, 4, 2, 3, 0, 3, 2, 1, 2, 0, 1, 7, 0, 1];

fn faults_for(policy: ReplacementPolicy, frames: usize, pages: &[u64]) -> usize {
    let mut vm = manager(frames, policy);
    vm.run_trace(&trace_of(1, pages))
        .iter()
        .filter(|o| o.page_fault)
        .count()
}

#[test]
fn test_textbook_reference_string() {
    assert_eq!(faults_for(ReplacementPolicy::Fifo, 3, &TEXTBOOK), 15);
    assert_eq!(faults_for(ReplacementPolicy::Lru, 3, &TEXTBOOK), 12);
    assert_eq!(faults_for(ReplacementPolicy::Optimal, 3, &TEXTBOOK), 9);
}

#[test]
fn test_belady_anomaly_under_fifo() {
    let pages = [1, 2, 3, 4, 1, 2, 5, 1, 2, 3, 4, 5];
    assert_eq!(faults_for(ReplacementPolicy::Fifo, 3, &pages), 9);
    assert_eq!(faults_for(ReplacementPolicy::Fifo, 4, &pages), 10);
}

#[test]
fn test_optimal_never_worse() {
    let pages = [1, 3, 0, 3, 5, 6, 3, 1, 0, 2, 5, 6, 1, 4];
    let optimal = faults_for(ReplacementPolicy::Optimal, 3, &pages);
    for policy in ReplacementPolicy::ALL {
        assert!(optimal <= faults_for(policy, 3, &pages), "{} beat optimal", policy);
    }
}

#[test]
fn test_fifo_and_lru_victims() {
    let mut fifo = manager(3, ReplacementPolicy::Fifo);
    let out = fifo.run_trace(&trace_of(1, &[1, 2, 3, 1, 4]));
    assert!(!out[3].page_fault);
    assert_eq!(out[4].evicted_page, Some((1, 1)));

    let mut lru = manager(3, ReplacementPolicy::Lru);
    let out = lru.run_trace(&trace_of(1, &[1, 2, 3, 1, 4]));
    assert_eq!(out.iter().filter(|o| o.page_fault).count(), 4);
    assert_eq!(out[4].evicted_page, Some((1, 2)));
}

#[test]
fn test_lfu_and_mfu_victims() {
    let pages = [1, 1, 2, 3, 4];

    let mut lfu = manager(3, ReplacementPolicy::Lfu);
    let out = lfu.run_trace(&trace_of(1, &pages));
    // 2 and 3 were each used once; 2 was loaded first
    assert_eq!(out[4].evicted_page, Some((1, 2)));

    let mut mfu = manager(3, ReplacementPolicy::Mfu);
    let out = mfu.run_trace(&trace_of(1, &pages));
    assert_eq!(out[4].evicted_page, Some((1, 1)));
}

/// Small deterministic generator so the sweep is reproducible
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}

#[test]
fn test_frame_accounting_invariants() {
    for policy in ReplacementPolicy::ALL {
        let mut rng = Lcg(0x5eed);
        let mut vm = manager(5, policy);
        for pid in 1..=3 {
            vm.load_process(pid, &(0..8).collect::<Vec<_>>()).unwrap();
        }

        for _ in 0..400 {
            let pid = rng.next(3) as u32 + 1;
            let page = rng.next(8) as u32;
            let write = rng.next(4) == 0;
            vm.access_page(pid, page, write).unwrap();

            let paging = vm.paging();
            let memory = paging.memory();
            assert_eq!(memory.allocated_count(), paging.present_entries());
            assert!(paging.present_entries() <= memory.num_frames());

            // Every allocated frame is referenced by exactly its owner's entry
            for frame in vm.memory_layout().iter().filter(|f| !f.is_free()) {
                let owner = frame.owner.unwrap();
                assert_eq!(
                    paging.frame_of(owner.pid, owner.page).unwrap(),
                    Some(frame.id)
                );
            }
        }

        let stats = vm.get_statistics();
        assert_eq!(stats.get("total_accesses"), Some(400.0));
        assert_eq!(
            stats.get("page_faults").unwrap() + stats.get("page_hits").unwrap(),
            400.0
        );
        assert_eq!(stats, vm.get_statistics());
    }
}

#[test]
fn test_paging_translation_scenario() {
    let mut paging = PagingEngine::new(&SimConfig::new(8, PAGE)).unwrap();
    paging.create_process(1, 8).unwrap();
    for page in [0, 2, 3, 4, 5] {
        paging.allocate_page(1, page).unwrap();
    }
    assert_eq!(paging.allocate_page(1, 1).unwrap(), 5);

    let t = paging.translate_address(1, 0x1500).unwrap();
    assert_eq!(t.logical.page_number, 1);
    assert_eq!(t.logical.offset, 0x500);
    assert_eq!(t.physical_address, Some(0x5500));
    assert!(!t.page_fault);

    let t = paging.translate_address(1, 0x6000).unwrap();
    assert!(t.page_fault);
    assert!(matches!(
        paging.translate_address(1, 0x8000),
        Err(SimError::InvalidAddress { pid: 1, page: 8 })
    ));
}

#[test]
fn test_segmentation_scenario() {
    let mut seg = SegmentationEngine::with_memory_size(0x10000, AllocationStrategy::FirstFit);
    seg.create_process(1).unwrap();
    seg.add_segment(1, 0, "code", 0x200, Some(0x1000)).unwrap();

    let t = seg.translate_address(1, 0, 0x1FF).unwrap();
    assert_eq!(t.physical_address, 0x11FF);
    assert!(matches!(
        seg.translate_address(1, 0, 0x200),
        Err(SimError::SegmentationFault { segment: 0, offset: 0x200, size: 0x200 })
    ));

    // Engine stays usable after a fault
    assert!(seg.translate_address(1, 0, 0).is_ok());
    let stats = seg.get_statistics();
    assert_eq!(stats.get("bounds_violations"), Some(1.0));
    assert_eq!(stats.get("access_successes"), Some(2.0));
    assert_eq!(seg.take_events().len(), 1);
}

#[test]
fn test_segment_placement_strategies() {
    let expected = [
        (AllocationStrategy::FirstFit, 100),
        (AllocationStrategy::BestFit, 300),
        (AllocationStrategy::WorstFit, 400),
    ];
    for (strategy, base) in expected {
        let mut seg = SegmentationEngine::with_memory_size(1000, strategy);
        seg.create_process(1).unwrap();
        // Leaves holes of 100 at 100, 50 at 300 and 600 at 400
        seg.add_segment(1, 0, "code", 100, Some(0)).unwrap();
        seg.add_segment(1, 1, "data", 100, Some(200)).unwrap();
        seg.add_segment(1, 2, "heap", 50, Some(350)).unwrap();

        let placed = seg.add_segment(1, 3, "stack", 40, None).unwrap();
        assert_eq!(placed.base, base, "{}", strategy);
    }
}

#[test]
fn test_segment_overlap_and_exhaustion() {
    let mut seg = SegmentationEngine::with_memory_size(1000, AllocationStrategy::FirstFit);
    seg.create_process(1).unwrap();
    seg.create_process(2).unwrap();
    seg.add_segment(1, 0, "code", 500, Some(0)).unwrap();

    assert!(matches!(
        seg.add_segment(2, 0, "code", 100, Some(450)),
        Err(SimError::SegmentOverlap { base: 450, size: 100 })
    ));
    assert!(matches!(
        seg.add_segment(2, 0, "code", 600, None),
        Err(SimError::OutOfMemory { requested: 600 })
    ));
    assert!(matches!(
        seg.add_segment(1, 0, "again", 10, None),
        Err(SimError::SegmentExists { pid: 1, segment: 0 })
    ));

    assert_eq!(seg.remove_process(1).unwrap(), 1);
    assert!(seg.add_segment(2, 0, "code", 600, None).is_ok());
}

#[test]
fn test_parsed_trace_through_manager() {
    let text = "\
# PID  ADDRESS  OP
1      0x0040   READ
1      0x1040   WRITE
2      0x0000   READ
1      0x2000   READ
bogus line
1      0x0044   WRITE
";
    let trace = parse_trace(text).unwrap();
    assert_eq!(trace.len(), 5);

    let mut vm = manager(2, ReplacementPolicy::Lru);
    let out = vm.run_trace(&trace);
    assert_eq!(out.len(), 5);
    assert_eq!(vm.paging().process_ids().collect::<Vec<_>>(), vec![1, 2]);
    // Process 2 holds no frames, so the victim comes from process 1
    assert_eq!(out[2].evicted_page, Some((1, 0)));
    // Afterwards process 1 only evicts its own pages
    assert_eq!(out[3].evicted_page, Some((1, 1)));
    assert!(out[4].page_fault);

    let stats = vm.get_statistics();
    assert_eq!(stats.get("page_faults"), Some(5.0));
    assert_eq!(stats.get("resident_pages"), Some(2.0));
    // Five faults and three evictions
    assert_eq!(vm.events().len(), 8);
}
