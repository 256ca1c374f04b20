//! Placement strategies over a list of free regions.
//!
//! Paging hands the allocator one unit-size region per free frame (base is the
//! frame index); segmentation hands it the byte-addressed holes between live
//! segments. Regions must be sorted by ascending base.

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::AllocationStrategy;
use crate::error::{Result, SimError};

/// A contiguous free range `[base, base + size)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub base: u64,
    pub size: u64,
}

impl Region {
    pub fn new(base: u64, size: u64) -> Self {
        Region { base, size }
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.base + self.size
    }

    #[inline]
    fn fits(&self, request: u64) -> bool {
        self.size >= request
    }
}

#[derive(Debug, Clone)]
pub struct Allocator {
    strategy: AllocationStrategy,
    /// Next-Fit resumes at the first region starting at or after this address
    cursor: u64,
}

impl Allocator {
    pub fn new(strategy: AllocationStrategy) -> Self {
        Allocator {
            strategy,
            cursor: 0,
        }
    }

    pub fn strategy(&self) -> AllocationStrategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: AllocationStrategy) {
        self.strategy = strategy;
        self.cursor = 0;
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Choose the free region a request of `request` units is placed into.
    ///
    /// The request always starts at the chosen region's base.
    pub fn select(&mut self, free: &[Region], request: u64) -> Result<Region> {
        debug_assert!(free.windows(2).all(|w| w[0].base < w[1].base));

        let choice = match self.strategy {
            AllocationStrategy::FirstFit => free.iter().find(|r| r.fits(request)).copied(),
            AllocationStrategy::BestFit => free
                .iter()
                .filter(|r| r.fits(request))
                .min_by_key(|r| (r.size - request, r.base))
                .copied(),
            AllocationStrategy::WorstFit => free
                .iter()
                .filter(|r| r.fits(request))
                // Equal slack keeps the earlier (lower base) region
                .fold(None, |best: Option<Region>, r| match best {
                    Some(b) if b.size >= r.size => Some(b),
                    _ => Some(*r),
                }),
            AllocationStrategy::NextFit => self.next_fit(free, request),
        };

        match choice {
            Some(region) => {
                if self.strategy == AllocationStrategy::NextFit {
                    self.cursor = region.base + request;
                }
                debug!(
                    strategy = %self.strategy,
                    base = region.base,
                    size = region.size,
                    request,
                    "region selected"
                );
                Ok(region)
            }
            None => {
                warn!(strategy = %self.strategy, request, "no free region fits request");
                Err(SimError::OutOfMemory { requested: request })
            }
        }
    }

    fn next_fit(&self, free: &[Region], request: u64) -> Option<Region> {
        let start = free
            .iter()
            .position(|r| r.base >= self.cursor)
            .unwrap_or(0);

        free[start..]
            .iter()
            .chain(free[..start].iter())
            .find(|r| r.fits(request))
            .copied()
    }

    /// Bytes held in free regions individually too small for `reference_request`
    pub fn external_fragmentation(free: &[Region], reference_request: u64) -> u64 {
        free.iter()
            .filter(|r| r.size < reference_request)
            .map(|r| r.size)
            .sum()
    }
}
