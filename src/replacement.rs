//! Victim selection for demand paging.
//!
//! Every policy is a pure function of the resident-set snapshot (plus, for
//! Optimal, the caller-supplied remaining trace), so replays are
//! deterministic.

use serde::Serialize;
use std::cmp::Reverse;

use crate::config::ReplacementPolicy;
use crate::constants::{FrameId, PageId, Pid};
use crate::memory::FrameMeta;

/// A reference to one page of one process in an access trace
pub type PageRef = (Pid, PageId);

/// Snapshot of one resident page, read out of the frame arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResidentPage {
    pub pid: Pid,
    pub page: PageId,
    pub frame: FrameId,
    pub meta: FrameMeta,
}

impl ReplacementPolicy {
    /// Pick exactly one page to evict from `resident`.
    ///
    /// Returns `None` only when `resident` is empty. `lookahead` is the
    /// remaining access trace and is read by Optimal alone; a page that never
    /// appears in it counts as infinitely far away.
    pub fn select_victim(
        &self,
        resident: &[ResidentPage],
        lookahead: &[PageRef],
    ) -> Option<ResidentPage> {
        let victim = match self {
            ReplacementPolicy::Fifo => resident.iter().min_by_key(|r| r.meta.load_order),
            ReplacementPolicy::Lru => resident.iter().min_by_key(|r| r.meta.last_access),
            ReplacementPolicy::Lfu => resident
                .iter()
                .min_by_key(|r| (r.meta.access_count, r.meta.load_order)),
            ReplacementPolicy::Mfu => resident
                .iter()
                .min_by_key(|r| (Reverse(r.meta.access_count), r.meta.load_order)),
            ReplacementPolicy::Optimal => resident.iter().min_by_key(|r| {
                let next_use = lookahead
                    .iter()
                    .position(|&(pid, page)| pid == r.pid && page == r.page)
                    .unwrap_or(usize::MAX);
                (Reverse(next_use), r.page, r.pid)
            }),
        };
        victim.copied()
    }
}
