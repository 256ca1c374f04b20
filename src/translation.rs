use serde::Serialize;
use std::fmt;

use crate::constants::{FrameId, SegmentId};

/// A logical address split into page number and offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogicalAddress {
    pub address: u64,
    pub page_number: u64,
    pub offset: u64,
}

impl LogicalAddress {
    /// Decompose a raw address for the given page size (must be non-zero)
    pub fn split(address: u64, page_size: u64) -> Self {
        LogicalAddress {
            address,
            page_number: address / page_size,
            offset: address % page_size,
        }
    }

    /// Inverse of [`split`](Self::split)
    #[inline]
    pub fn combine(page_number: u64, offset: u64, page_size: u64) -> u64 {
        page_number * page_size + offset
    }
}

impl fmt::Display for LogicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LA({:#x}) = (p={}, d={:#x})",
            self.address, self.page_number, self.offset
        )
    }
}

/// Physical address of `offset` within `frame`
#[inline]
pub fn physical_address(frame: FrameId, frame_size: u64, offset: u64) -> u64 {
    frame as u64 * frame_size + offset
}

/// Outcome of a paged translation that named a valid page.
///
/// A page fault is a normal outcome here, not an error: `physical_address`
/// is `None` and `page_fault` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageTranslation {
    pub logical: LogicalAddress,
    pub frame: Option<FrameId>,
    pub physical_address: Option<u64>,
    pub page_fault: bool,
}

impl PageTranslation {
    pub fn resident(logical: LogicalAddress, frame: FrameId, frame_size: u64) -> Self {
        PageTranslation {
            logical,
            frame: Some(frame),
            physical_address: Some(physical_address(frame, frame_size, logical.offset)),
            page_fault: false,
        }
    }

    pub fn fault(logical: LogicalAddress) -> Self {
        PageTranslation {
            logical,
            frame: None,
            physical_address: None,
            page_fault: true,
        }
    }
}

/// Successful segment translation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentTranslation {
    pub segment: SegmentId,
    pub offset: u64,
    pub physical_address: u64,
}
