pub const DEFAULT_NUM_FRAMES: usize = 16;
pub const DEFAULT_FRAME_SIZE: u64 = 4096;

/// Lines in a trace file starting with this marker are ignored
pub const TRACE_COMMENT: char = '#';

/// Process ids as they appear in traces and engine calls
pub type Pid = u32;
/// Logical page number within a process
pub type PageId = u32;
pub type SegmentId = u32;
/// Index into the physical frame arena
pub type FrameId = usize;
