//! Simulation configuration.
//!
//! Fixed at construction time; engines keep their config across `reset()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

use crate::constants::{DEFAULT_FRAME_SIZE, DEFAULT_NUM_FRAMES};
use crate::error::{Result, SimError};

/// Placement strategy used when choosing among free frames or free ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStrategy {
    #[default]
    FirstFit,
    BestFit,
    WorstFit,
    NextFit,
}

impl AllocationStrategy {
    pub const ALL: [AllocationStrategy; 4] = [
        AllocationStrategy::FirstFit,
        AllocationStrategy::BestFit,
        AllocationStrategy::WorstFit,
        AllocationStrategy::NextFit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationStrategy::FirstFit => "FIRST_FIT",
            AllocationStrategy::BestFit => "BEST_FIT",
            AllocationStrategy::WorstFit => "WORST_FIT",
            AllocationStrategy::NextFit => "NEXT_FIT",
        }
    }
}

/// Page replacement algorithm used by the virtual memory manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplacementPolicy {
    #[default]
    Fifo,
    Lru,
    Optimal,
    Lfu,
    Mfu,
}

impl ReplacementPolicy {
    pub const ALL: [ReplacementPolicy; 5] = [
        ReplacementPolicy::Fifo,
        ReplacementPolicy::Lru,
        ReplacementPolicy::Optimal,
        ReplacementPolicy::Lfu,
        ReplacementPolicy::Mfu,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReplacementPolicy::Fifo => "FIFO",
            ReplacementPolicy::Lru => "LRU",
            ReplacementPolicy::Optimal => "OPTIMAL",
            ReplacementPolicy::Lfu => "LFU",
            ReplacementPolicy::Mfu => "MFU",
        }
    }
}

/// Normalize `best-fit`, `Best_Fit`, `BESTFIT` and friends to `BESTFIT`
fn normalize(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect::<String>()
        .to_ascii_uppercase()
}

impl FromStr for AllocationStrategy {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "FIRSTFIT" | "FIRST" => Ok(AllocationStrategy::FirstFit),
            "BESTFIT" | "BEST" => Ok(AllocationStrategy::BestFit),
            "WORSTFIT" | "WORST" => Ok(AllocationStrategy::WorstFit),
            "NEXTFIT" | "NEXT" => Ok(AllocationStrategy::NextFit),
            _ => Err(SimError::InvalidConfig(format!(
                "unknown allocation strategy: {}",
                s
            ))),
        }
    }
}

impl FromStr for ReplacementPolicy {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "FIFO" => Ok(ReplacementPolicy::Fifo),
            "LRU" => Ok(ReplacementPolicy::Lru),
            "OPTIMAL" | "OPT" => Ok(ReplacementPolicy::Optimal),
            "LFU" => Ok(ReplacementPolicy::Lfu),
            "MFU" => Ok(ReplacementPolicy::Mfu),
            _ => Err(SimError::InvalidConfig(format!(
                "unknown replacement algorithm: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ReplacementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constructor-time simulation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of physical frames
    pub num_frames: usize,
    /// Size of each frame (and page) in bytes
    pub frame_size: u64,
    pub allocation_strategy: AllocationStrategy,
    pub replacement_policy: ReplacementPolicy,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            num_frames: DEFAULT_NUM_FRAMES,
            frame_size: DEFAULT_FRAME_SIZE,
            allocation_strategy: AllocationStrategy::default(),
            replacement_policy: ReplacementPolicy::default(),
        }
    }
}

impl SimConfig {
    pub fn new(num_frames: usize, frame_size: u64) -> Self {
        Self {
            num_frames,
            frame_size,
            ..Self::default()
        }
    }

    pub fn with_allocation_strategy(mut self, strategy: AllocationStrategy) -> Self {
        self.allocation_strategy = strategy;
        self
    }

    pub fn with_replacement_policy(mut self, policy: ReplacementPolicy) -> Self {
        self.replacement_policy = policy;
        self
    }

    /// Total addressable physical memory in bytes; saturates on overflow,
    /// which `validate` rejects
    pub fn memory_size(&self) -> u64 {
        (self.num_frames as u64).saturating_mul(self.frame_size)
    }

    /// Validate configuration.
    ///
    /// A frame size that is not a power of two is accepted with a warning.
    pub fn validate(&self) -> Result<()> {
        if self.num_frames == 0 {
            return Err(SimError::InvalidConfig(
                "num_frames must be greater than zero".to_string(),
            ));
        }
        if self.frame_size == 0 {
            return Err(SimError::InvalidConfig(
                "frame_size must be greater than zero".to_string(),
            ));
        }
        if (self.num_frames as u64).checked_mul(self.frame_size).is_none() {
            return Err(SimError::InvalidConfig(format!(
                "{} frames of {} bytes overflow the address space",
                self.num_frames, self.frame_size
            )));
        }
        if !self.frame_size.is_power_of_two() {
            warn!(frame_size = self.frame_size, "frame size is not a power of two");
        }
        Ok(())
    }

    /// Load and validate a JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: SimConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}
