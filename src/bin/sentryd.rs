//! sentryd - event-triggered clip recording daemon
//!
//! This daemon:
//! 1. Ingests frames from configured sources
//! 2. Buffers the last few seconds of each stream in a ring buffer
//! 3. Runs the detector on every frame
//! 4. Records clips around triggering detections, with pre-event context
//! 5. Writes metadata sidecars and probabilistic snapshots
//! 6. Serves the latest frame over a local HTTP endpoint

use anyhow::Result;
use std::sync::atomic::Ordering;

use clip_sentry::{ApiConfig, LiveApiServer, Pipeline, SentrydConfig};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = SentrydConfig::load()?;
    let mut pipeline = Pipeline::from_config(&cfg)?;

    let api_handle = LiveApiServer::new(
        ApiConfig {
            addr: cfg.api_addr.clone(),
        },
        pipeline.latest_slot(),
    )
    .spawn()?;
    log::info!("live api listening on {}", api_handle.addr);

    let stop = pipeline.stop_flag();
    ctrlc::set_handler(move || {
        log::info!("shutdown requested");
        stop.store(true, Ordering::SeqCst);
    })?;

    log::info!(
        "sentryd running: {} stream(s), clips -> {}, snapshots -> {}",
        cfg.sources.len(),
        cfg.artifacts.clips_dir.display(),
        cfg.artifacts.snapshots_dir.display()
    );
    for (idx, source) in cfg.sources.iter().enumerate() {
        log::info!(
            "stream {}: {} ({}x{} @ {} fps, {}s pre-roll)",
            idx,
            source.url,
            source.width,
            source.height,
            source.nominal_fps,
            cfg.recording.buffer_seconds
        );
    }

    let summary = pipeline.run()?;

    api_handle.stop()?;
    log::info!(
        "sentryd done: {} frames, {} clips written, {} snapshots, {} clips abandoned",
        summary.frames_processed,
        summary.clips_written,
        summary.snapshots_written,
        summary.clips_abandoned
    );
    Ok(())
}
