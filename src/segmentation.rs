//! Segmentation: per-process segment tables over a shared byte address space,
//! bounds-checked translation and fragmentation accounting.

use serde::Serialize;
use std::collections::BTreeMap;
use std::mem;
use tracing::{debug, info, warn};

use crate::allocator::{Allocator, Region};
use crate::config::{AllocationStrategy, SimConfig};
use crate::constants::{Pid, SegmentId};
use crate::error::{Result, SimError};
use crate::stats::{SimEvent, Statistics, ratio};
use crate::translation::SegmentTranslation;

/// A named, variable-size region `[base, base + size)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub id: SegmentId,
    pub name: String,
    pub base: u64,
    pub size: u64,
    pub pid: Pid,
}

impl Segment {
    #[inline]
    pub fn end(&self) -> u64 {
        self.base + self.size
    }

    /// Offsets are valid in `[0, size)`; `size` itself faults
    #[inline]
    pub fn contains_offset(&self, offset: u64) -> bool {
        offset < self.size
    }

    fn overlaps(&self, base: u64, size: u64) -> bool {
        base < self.end() && self.base < base + size
    }
}

/// Fragmentation of one process's segments
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FragmentationReport {
    pub internal_bytes: u64,
    /// Gaps between consecutive segments of the process
    pub external_bytes: u64,
    pub internal_percent: f64,
    pub external_percent: f64,
}

#[derive(Debug, Clone)]
pub struct SegmentationEngine {
    memory_size: u64,
    allocator: Allocator,
    tables: BTreeMap<Pid, BTreeMap<SegmentId, Segment>>,
    /// Reference size for external fragmentation: largest segment placed so far
    largest_request: u64,
    access_attempts: u64,
    access_successes: u64,
    bounds_violations: u64,
    events: Vec<SimEvent>,
}

impl SegmentationEngine {
    /// Engine over the configured physical memory (`num_frames * frame_size` bytes)
    pub fn new(config: &SimConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_memory_size(
            config.memory_size(),
            config.allocation_strategy,
        ))
    }

    pub fn with_memory_size(memory_size: u64, strategy: AllocationStrategy) -> Self {
        SegmentationEngine {
            memory_size,
            allocator: Allocator::new(strategy),
            tables: BTreeMap::new(),
            largest_request: 0,
            access_attempts: 0,
            access_successes: 0,
            bounds_violations: 0,
            events: Vec::new(),
        }
    }

    pub fn memory_size(&self) -> u64 {
        self.memory_size
    }

    pub fn set_allocation_strategy(&mut self, strategy: AllocationStrategy) {
        self.allocator.set_strategy(strategy);
    }

    pub fn create_process(&mut self, pid: Pid) -> Result<()> {
        if self.tables.contains_key(&pid) {
            return Err(SimError::ProcessExists(pid));
        }
        self.tables.insert(pid, BTreeMap::new());
        info!(pid, "segmented process created");
        Ok(())
    }

    /// Remove a process, releasing its segments. Returns how many were freed.
    pub fn remove_process(&mut self, pid: Pid) -> Result<usize> {
        let table = self.tables.remove(&pid).ok_or(SimError::InvalidProcess(pid))?;
        info!(pid, segments = table.len(), "segmented process removed");
        Ok(table.len())
    }

    fn all_segments(&self) -> impl Iterator<Item = &Segment> {
        self.tables.values().flat_map(|t| t.values())
    }

    /// Add a segment to `pid`.
    ///
    /// With `base == None` the allocator picks a free range of `size` bytes;
    /// an explicit base is checked against memory bounds and every live
    /// segment of every process.
    pub fn add_segment(
        &mut self,
        pid: Pid,
        segment_id: SegmentId,
        name: &str,
        size: u64,
        base: Option<u64>,
    ) -> Result<Segment> {
        let table = self.tables.get(&pid).ok_or(SimError::InvalidProcess(pid))?;
        if table.contains_key(&segment_id) {
            return Err(SimError::SegmentExists {
                pid,
                segment: segment_id,
            });
        }
        if size == 0 {
            return Err(SimError::InvalidConfig(
                "segment size must be greater than zero".to_string(),
            ));
        }
        let base = match base {
            Some(base) => {
                let in_bounds = base
                    .checked_add(size)
                    .is_some_and(|end| end <= self.memory_size);
                if !in_bounds {
                    return Err(SimError::SegmentOutOfBounds {
                        base,
                        size,
                        limit: self.memory_size,
                    });
                }
                if self.all_segments().any(|s| s.overlaps(base, size)) {
                    return Err(SimError::SegmentOverlap { base, size });
                }
                base
            }
            None => {
                let free = self.free_regions();
                self.allocator.select(&free, size)?.base
            }
        };

        let segment = Segment {
            id: segment_id,
            name: name.to_string(),
            base,
            size,
            pid,
        };
        self.largest_request = self.largest_request.max(size);
        debug!(pid, segment = segment_id, name, base, size, "segment added");
        self.tables
            .entry(pid)
            .or_default()
            .insert(segment_id, segment.clone());
        Ok(segment)
    }

    pub fn remove_segment(&mut self, pid: Pid, segment_id: SegmentId) -> Result<Segment> {
        let table = self.tables.get_mut(&pid).ok_or(SimError::InvalidProcess(pid))?;
        let segment = table.remove(&segment_id).ok_or(SimError::InvalidSegment {
            pid,
            segment: segment_id,
        })?;
        debug!(pid, segment = segment_id, "segment removed");
        Ok(segment)
    }

    pub fn segment(&self, pid: Pid, segment_id: SegmentId) -> Result<&Segment> {
        self.tables
            .get(&pid)
            .ok_or(SimError::InvalidProcess(pid))?
            .get(&segment_id)
            .ok_or(SimError::InvalidSegment {
                pid,
                segment: segment_id,
            })
    }

    /// Segments of `pid`, ascending by segment id
    pub fn segments(&self, pid: Pid) -> Result<Vec<&Segment>> {
        let table = self.tables.get(&pid).ok_or(SimError::InvalidProcess(pid))?;
        Ok(table.values().collect())
    }

    /// Translate `(segment, offset)` to `base + offset`.
    ///
    /// `offset >= size` is a `SegmentationFault`; the engine stays usable.
    /// Unknown processes and segments count as violations too.
    pub fn translate_address(
        &mut self,
        pid: Pid,
        segment_id: SegmentId,
        offset: u64,
    ) -> Result<SegmentTranslation> {
        self.access_attempts += 1;
        let (base, size) = match self.segment(pid, segment_id) {
            Ok(segment) => (segment.base, segment.size),
            Err(err) => {
                self.bounds_violations += 1;
                return Err(err);
            }
        };

        if offset >= size {
            self.bounds_violations += 1;
            warn!(pid, segment = segment_id, offset, size, "segmentation fault");
            self.events.push(SimEvent::SegmentationFault {
                pid,
                segment: segment_id,
                offset,
                size,
            });
            return Err(SimError::SegmentationFault {
                segment: segment_id,
                offset,
                size,
            });
        }

        let physical_address = base + offset;
        self.access_successes += 1;
        Ok(SegmentTranslation {
            segment: segment_id,
            offset,
            physical_address,
        })
    }

    /// Holes between live segments across the whole address space, by base
    pub fn free_regions(&self) -> Vec<Region> {
        let mut used: Vec<(u64, u64)> = self.all_segments().map(|s| (s.base, s.end())).collect();
        used.sort_unstable();

        let mut free = Vec::new();
        let mut cursor = 0;
        for (base, end) in used {
            if base > cursor {
                free.push(Region::new(cursor, base - cursor));
            }
            cursor = cursor.max(end);
        }
        if cursor < self.memory_size {
            free.push(Region::new(cursor, self.memory_size - cursor));
        }
        free
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.all_segments().map(|s| s.size).sum()
    }

    pub fn free_bytes(&self) -> u64 {
        self.memory_size - self.allocated_bytes()
    }

    pub fn largest_free_region(&self) -> u64 {
        self.free_regions().iter().map(|r| r.size).max().unwrap_or(0)
    }

    /// Free bytes in holes too small for the largest segment placed so far
    pub fn external_fragmentation(&self) -> u64 {
        Allocator::external_fragmentation(&self.free_regions(), self.largest_request)
    }

    pub fn process_fragmentation(&self, pid: Pid) -> Result<FragmentationReport> {
        let table = self.tables.get(&pid).ok_or(SimError::InvalidProcess(pid))?;
        let mut segments: Vec<&Segment> = table.values().collect();
        segments.sort_by_key(|s| s.base);

        let external_bytes: u64 = segments
            .windows(2)
            .map(|w| w[1].base.saturating_sub(w[0].end()))
            .sum();
        let total: u64 = segments.iter().map(|s| s.size).sum();

        // Segments are sized exactly to the request
        let internal_bytes = 0;
        Ok(FragmentationReport {
            internal_bytes,
            external_bytes,
            internal_percent: ratio(internal_bytes, total) * 100.0,
            external_percent: ratio(external_bytes, total) * 100.0,
        })
    }

    pub fn take_events(&mut self) -> Vec<SimEvent> {
        mem::take(&mut self.events)
    }

    pub fn get_statistics(&self) -> Statistics {
        let mut stats = Statistics::new();
        let allocated = self.allocated_bytes();

        stats.count("total_processes", self.tables.len() as u64);
        stats.count("segments", self.all_segments().count() as u64);
        stats.count("access_attempts", self.access_attempts);
        stats.count("access_successes", self.access_successes);
        stats.count("bounds_violations", self.bounds_violations);
        stats.record(
            "success_rate",
            ratio(self.access_successes, self.access_attempts),
        );
        stats.count("memory_size", self.memory_size);
        stats.count("allocated_bytes", allocated);
        stats.count("free_bytes", self.memory_size - allocated);
        stats.record("utilization", ratio(allocated, self.memory_size));
        stats.count("external_fragmentation_bytes", self.external_fragmentation());
        stats.count("largest_free_region", self.largest_free_region());
        stats
    }

    pub fn reset(&mut self) {
        self.tables.clear();
        self.allocator.reset();
        self.largest_request = 0;
        self.access_attempts = 0;
        self.access_successes = 0;
        self.bounds_violations = 0;
        self.events.clear();
        info!("segmentation engine reset");
    }
}
