pub mod allocator;
pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod memory;
pub mod page_table;
pub mod paging;
pub mod replacement;
pub mod segmentation;
pub mod stats;
pub mod translation;
pub mod vm_manager;

// Re-export commonly used items for convenience
pub use config::{AllocationStrategy, ReplacementPolicy, SimConfig};
pub use constants::*;
pub use error::{Result, SimError};
pub use io::{AccessOp, MemoryAccess};
pub use memory::{BackingStore, Frame, FrameStatus, PhysicalMemory};
pub use paging::PagingEngine;
pub use replacement::{PageRef, ResidentPage};
pub use segmentation::{Segment, SegmentationEngine};
pub use stats::{SimEvent, Statistics};
pub use translation::{LogicalAddress, PageTranslation, SegmentTranslation};
pub use vm_manager::{AccessOutcome, VirtualMemoryManager};
