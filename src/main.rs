//! RAID-DP Layout Exerciser
//!
//! Writes a known pattern through the layout engine into per-stripe files
//! under a directory, then reads it back and verifies it, optionally with
//! one target playing dead to exercise the recovery path.
//!
//! ```text
//! raiddp --dir /tmp/raiddp --stripes 3 --block-size 4096 --corrupt 1
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use raiddp::target::{FileTarget, MemoryTarget, StripeTarget};
use raiddp::{LayoutConfig, RaidDpFile};

// =============================================================================
// CLI Arguments
// =============================================================================

/// RAID-DP layout exerciser - write, corrupt, recover, verify
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the per-stripe files
    #[arg(long, env = "RAIDDP_DIR")]
    dir: PathBuf,

    /// Number of data stripes (N); the layout uses N + 2 files
    #[arg(long, env = "RAIDDP_STRIPES", default_value = "3")]
    stripes: usize,

    /// Block size in bytes (W)
    #[arg(long, env = "RAIDDP_BLOCK_SIZE", default_value = "4096")]
    block_size: usize,

    /// Bytes of pattern data to write; defaults to three full groups
    #[arg(long, env = "RAIDDP_SIZE")]
    size: Option<u64>,

    /// Load the layout configuration from a JSON file instead of the
    /// --stripes/--block-size flags
    #[arg(long, env = "RAIDDP_CONFIG")]
    config: Option<PathBuf>,

    /// Simulate a dead target with this physical index during readback
    #[arg(long)]
    corrupt: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<LayoutConfig>(&raw).context("parsing layout configuration")?
        }
        None => LayoutConfig::new(args.stripes, args.block_size),
    };
    config.validate().context("invalid layout configuration")?;

    std::fs::create_dir_all(&args.dir)
        .with_context(|| format!("creating {}", args.dir.display()))?;

    let group_size = (config.stripe_count * config.stripe_count * config.block_size) as u64;
    let size = args.size.unwrap_or(3 * group_size) as usize;

    info!(
        stripes = config.stripe_count,
        block_size = config.block_size,
        size,
        "writing pattern"
    );
    write_pattern(&args, &config, size).await?;

    info!(corrupt = ?args.corrupt, "reading back");
    verify_pattern(&args, &config, size).await?;

    info!("pattern verified, layout intact");
    Ok(())
}

fn pattern_byte(i: usize) -> u8 {
    ((i * 31 + 7) % 251) as u8
}

async fn open_file_targets(
    args: &Args,
    config: &LayoutConfig,
) -> anyhow::Result<Vec<Box<dyn StripeTarget>>> {
    let mut targets: Vec<Box<dyn StripeTarget>> = Vec::with_capacity(config.target_count());

    for i in 0..config.target_count() {
        let path = args.dir.join(format!("stripe.{}", i));
        let target = FileTarget::open(&path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        targets.push(Box::new(target));
    }

    Ok(targets)
}

async fn write_pattern(args: &Args, config: &LayoutConfig, size: usize) -> anyhow::Result<()> {
    let targets = open_file_targets(args, config).await?;
    let mut file = RaidDpFile::open(config.clone(), targets)?;

    let data: Vec<u8> = (0..size).map(pattern_byte).collect();

    // Several unaligned calls, the way a streaming writer would arrive.
    let mut offset = 0usize;
    for chunk in data.chunks(config.block_size * config.stripe_count + 13) {
        file.write(offset as u64, chunk).await?;
        offset += chunk.len();
    }

    file.close().await?;
    Ok(())
}

async fn verify_pattern(args: &Args, config: &LayoutConfig, size: usize) -> anyhow::Result<()> {
    let mut targets = open_file_targets(args, config).await?;

    if let Some(dead) = args.corrupt {
        if dead >= config.target_count() {
            bail!("--corrupt {} out of range (targets: 0..{})", dead, config.target_count());
        }

        // A target that errors every read, as a crashed storage node would.
        let broken = MemoryTarget::new();
        broken.fail_all_reads().await;
        targets[dead] = Box::new(broken);
    }

    let mut file = RaidDpFile::open(config.clone(), targets)?;
    let read = file.read(0, size).await?;

    for (i, &byte) in read.iter().enumerate() {
        if byte != pattern_byte(i) {
            bail!("pattern mismatch at offset {}: got {:#04x}", i, byte);
        }
    }

    file.close().await?;
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
