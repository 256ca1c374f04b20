//! Error type shared by every engine in the crate.
//!
//! None of these conditions is fatal: engines return them to the caller and
//! keep their state consistent, so a simulation can continue after any of them.

use std::io;
use thiserror::Error;

use crate::constants::{PageId, Pid, SegmentId};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("out of memory: no free region fits a request of {requested}")]
    OutOfMemory { requested: u64 },

    #[error("segmentation fault: offset {offset:#x} outside segment {segment} (size {size:#x})")]
    SegmentationFault {
        segment: SegmentId,
        offset: u64,
        size: u64,
    },

    #[error("invalid address: page {page} is not part of process {pid}")]
    InvalidAddress { pid: Pid, page: PageId },

    #[error("unknown process {0}")]
    InvalidProcess(Pid),

    #[error("process {pid} has no segment {segment}")]
    InvalidSegment { pid: Pid, segment: SegmentId },

    #[error("process {0} already exists")]
    ProcessExists(Pid),

    #[error("process {pid} already has segment {segment}")]
    SegmentExists { pid: Pid, segment: SegmentId },

    #[error("segment [{base:#x}, +{size:#x}) overlaps a live segment")]
    SegmentOverlap { base: u64, size: u64 },

    #[error("segment [{base:#x}, +{size:#x}) exceeds memory size {limit:#x}")]
    SegmentOutOfBounds { base: u64, size: u64, limit: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("trace line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("trace contains no parseable accesses")]
    EmptyTrace,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SimError {
    fn from(err: serde_json::Error) -> Self {
        SimError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
