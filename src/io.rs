use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::constants::*;
use crate::error::{Result, SimError};
use crate::stats::{SimEvent, Statistics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessOp {
    Read,
    Write,
}

impl AccessOp {
    #[inline]
    pub fn is_write(&self) -> bool {
        matches!(self, AccessOp::Write)
    }
}

impl FromStr for AccessOp {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        if s.eq_ignore_ascii_case("READ") {
            Ok(AccessOp::Read)
        } else if s.eq_ignore_ascii_case("WRITE") {
            Ok(AccessOp::Write)
        } else {
            Err(format!("invalid operation: {}", s))
        }
    }
}

/// One validated line of a trace file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryAccess {
    pub pid: Pid,
    pub address: u64,
    pub op: AccessOp,
}

/// Parse an address written as `0x`-prefixed hex or plain decimal
pub fn parse_address(token: &str) -> Option<u64> {
    match token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => token.parse().ok(),
    }
}

fn parse_line(line: &str, line_no: usize) -> Result<MemoryAccess> {
    let parse_err = |reason: String| SimError::Parse {
        line: line_no,
        reason,
    };

    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != 3 {
        return Err(parse_err(format!(
            "expected 3 columns (PID ADDRESS OP), found {}",
            tokens.len()
        )));
    }

    let pid: Pid = tokens[0]
        .parse()
        .map_err(|_| parse_err(format!("invalid process id: {}", tokens[0])))?;
    let address = parse_address(tokens[1])
        .ok_or_else(|| parse_err(format!("invalid address: {}", tokens[1])))?;
    let op: AccessOp = tokens[2].parse().map_err(parse_err)?;

    Ok(MemoryAccess { pid, address, op })
}

/// Parse trace text into accesses, in file order.
///
/// Comment and blank lines are ignored; malformed lines are skipped with a
/// warning. Fails only when no line parses.
pub fn parse_trace(content: &str) -> Result<Vec<MemoryAccess>> {
    let mut accesses = Vec::new();
    let mut skipped = 0usize;

    for (idx, raw) in content.lines().enumerate() {
        // Anything after a comment marker is ignored
        let line = raw.split(TRACE_COMMENT).next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line, idx + 1) {
            Ok(access) => accesses.push(access),
            Err(err) => {
                skipped += 1;
                warn!(line = idx + 1, %err, "skipping malformed trace line");
            }
        }
    }

    if accesses.is_empty() {
        return Err(SimError::EmptyTrace);
    }
    info!(accesses = accesses.len(), skipped, "trace parsed");
    Ok(accesses)
}

pub fn read_trace<P: AsRef<Path>>(path: P) -> Result<Vec<MemoryAccess>> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_trace(&content)
}

pub fn write_statistics_json<P: AsRef<Path>>(path: P, stats: &Statistics) -> Result<()> {
    let content = serde_json::to_string_pretty(stats)?;
    fs::write(path.as_ref(), content)?;
    Ok(())
}

/// Write one JSON object per line
pub fn write_events_jsonl<P: AsRef<Path>>(path: P, events: &[SimEvent]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    for event in events {
        serde_json::to_writer(&mut writer, event)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
