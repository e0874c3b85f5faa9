//! demo - end-to-end synthetic recording run

use anyhow::{anyhow, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clip_sentry::{ArtifactConfig, Pipeline, SentrydConfig, SourceConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Duration in seconds of synthetic footage.
    #[arg(long, default_value_t = 5)]
    seconds: u64,
    /// Frames per second for the synthetic source.
    #[arg(long, default_value_t = 10)]
    fps: u32,
    /// Output directory for clips and snapshots.
    #[arg(long, default_value = "demo_out")]
    out: String,
    /// Trigger confidence threshold.
    #[arg(long, default_value_t = 0.5)]
    threshold: f32,
    /// Pace frames at the nominal rate instead of running flat out.
    #[arg(long, default_value_t = false)]
    realtime: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }
    if !(0.0 < args.threshold && args.threshold <= 1.0) {
        return Err(anyhow!("threshold must be in (0, 1]"));
    }

    let out_dir = PathBuf::from(&args.out);
    fs::create_dir_all(&out_dir)?;

    stage("configure synthetic stream");
    let mut cfg = SentrydConfig::default();
    cfg.sources = vec![SourceConfig {
        url: "stub://demo".to_string(),
        nominal_fps: args.fps,
        width: 320,
        height: 240,
    }];
    cfg.recording.buffer_seconds = 3;
    cfg.recording.trigger_threshold = args.threshold;
    cfg.artifacts = ArtifactConfig {
        clips_dir: out_dir.join("clips"),
        snapshots_dir: out_dir.join("snapshots"),
        snapshot_probability: 1.0,
    };

    let total_frames = args.seconds.saturating_mul(args.fps as u64);

    stage("run recording pipeline");
    let mut pipeline = Pipeline::from_config(&cfg)?;
    pipeline.limit_frames(total_frames);
    if args.realtime {
        pipeline.pace(Duration::from_millis(1000 / args.fps as u64));
    }
    let summary = pipeline.run()?;

    println!("demo summary:");
    println!("  frames processed: {}", summary.frames_processed);
    println!("  clips written: {}", summary.clips_written);
    println!("  snapshots written: {}", summary.snapshots_written);
    println!("  clips abandoned: {}", summary.clips_abandoned);
    println!("  clips dir: {}", cfg.artifacts.clips_dir.display());
    println!("  snapshots dir: {}", cfg.artifacts.snapshots_dir.display());
    println!("next steps:");
    println!("  ls -la {}", out_dir.display());
    Ok(())
}

fn stage(msg: &str) {
    eprintln!("demo: {}", msg);
}
