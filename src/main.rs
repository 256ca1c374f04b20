//! memsim - Replay a memory access trace through the paging simulator
//!
//! Usage:
//!   memsim trace.txt                          # FIFO, 16 frames of 4 KiB
//!   memsim -a lru -f 8 trace.txt              # LRU over 8 frames
//!   memsim --compare trace.txt                # All policies side by side
//!   memsim -c sim.json --stats-out s.json --events-out e.jsonl trace.txt

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use memsim::io::{read_trace, write_events_jsonl, write_statistics_json};
use memsim::{
    AllocationStrategy, MemoryAccess, ReplacementPolicy, SimConfig, Statistics,
    VirtualMemoryManager,
};

#[derive(Parser)]
#[command(name = "memsim")]
#[command(about = "Simulate demand paging over a memory access trace")]
struct Args {
    /// Trace file: one `PID ADDRESS READ|WRITE` per line
    trace: PathBuf,

    /// Number of physical frames
    #[arg(short, long)]
    frames: Option<usize>,

    /// Frame (and page) size in bytes
    #[arg(short = 's', long)]
    frame_size: Option<u64>,

    /// Page replacement algorithm (fifo, lru, optimal, lfu, mfu)
    #[arg(short, long)]
    algorithm: Option<ReplacementPolicy>,

    /// Frame allocation strategy (first-fit, best-fit, worst-fit, next-fit)
    #[arg(long)]
    strategy: Option<AllocationStrategy>,

    /// JSON configuration file; flags given on the command line override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run every replacement algorithm and print a comparison table
    #[arg(long)]
    compare: bool,

    /// Write statistics as JSON
    #[arg(long)]
    stats_out: Option<PathBuf>,

    /// Write the access event log as JSON lines
    #[arg(long)]
    events_out: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str())),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let config = build_config(&args)?;
    let trace = read_trace(&args.trace)
        .with_context(|| format!("failed to read trace {}", args.trace.display()))?;

    if args.compare {
        compare(&config, &trace)
    } else {
        run(&args, config, &trace)
    }
}

fn build_config(args: &Args) -> Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => SimConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SimConfig::default(),
    };

    if let Some(frames) = args.frames {
        config.num_frames = frames;
    }
    if let Some(frame_size) = args.frame_size {
        config.frame_size = frame_size;
    }
    if let Some(policy) = args.algorithm {
        config.replacement_policy = policy;
    }
    if let Some(strategy) = args.strategy {
        config.allocation_strategy = strategy;
    }
    config.validate()?;
    Ok(config)
}

fn run(args: &Args, config: SimConfig, trace: &[MemoryAccess]) -> Result<()> {
    info!(
        trace = %args.trace.display(),
        accesses = trace.len(),
        policy = %config.replacement_policy,
        "starting simulation"
    );

    let mut vm = VirtualMemoryManager::new(config)?;
    vm.run_trace(trace);
    let stats = vm.get_statistics();

    if let Some(path) = &args.stats_out {
        write_statistics_json(path, &stats)?;
        info!(path = %path.display(), "statistics written");
    }
    if let Some(path) = &args.events_out {
        write_events_jsonl(path, vm.events())?;
        info!(path = %path.display(), events = vm.events().len(), "events written");
    }

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn compare(config: &SimConfig, trace: &[MemoryAccess]) -> Result<()> {
    let mut rows: Vec<(ReplacementPolicy, Statistics)> = Vec::new();
    for policy in ReplacementPolicy::ALL {
        let mut vm = VirtualMemoryManager::new(config.clone().with_replacement_policy(policy))?;
        vm.run_trace(trace);
        rows.push((policy, vm.get_statistics()));
    }

    println!(
        "{:<10} {:>10} {:>10} {:>10}",
        "ALGORITHM", "FAULTS", "HITS", "HIT RATE"
    );
    for (policy, stats) in &rows {
        println!(
            "{:<10} {:>10} {:>10} {:>9.1}%",
            policy.as_str(),
            stats.get("page_faults").unwrap_or(0.0),
            stats.get("page_hits").unwrap_or(0.0),
            stats.get("hit_rate").unwrap_or(0.0) * 100.0
        );
    }
    Ok(())
}
