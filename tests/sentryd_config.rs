use std::sync::Mutex;

use tempfile::NamedTempFile;

use clip_sentry::config::SentrydConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SENTRY_CONFIG",
        "SENTRY_SOURCE_URL",
        "SENTRY_API_ADDR",
        "SENTRY_CLIPS_DIR",
        "SENTRY_SNAPSHOTS_DIR",
        "SENTRY_TRIGGER_THRESHOLD",
        "SENTRY_FPS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "sources": [
            {
                "url": "stub://garden",
                "fps": 12,
                "width": 800,
                "height": 600
            }
        ],
        "recording": {
            "buffer_seconds": 10,
            "post_detection_seconds": 5,
            "extension_seconds": 4,
            "extension_window_seconds": 3,
            "trigger_threshold": 0.6,
            "tier_medium": 0.7,
            "tier_high": 0.85
        },
        "artifacts": {
            "clips_dir": "captures",
            "snapshots_dir": "stills",
            "snapshot_probability": 0.5
        },
        "api": {
            "addr": "0.0.0.0:9000"
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SENTRY_CONFIG", file.path());
    std::env::set_var("SENTRY_TRIGGER_THRESHOLD", "0.45");
    std::env::set_var("SENTRY_FPS", "15");

    let cfg = SentrydConfig::load().expect("load config");

    assert_eq!(cfg.sources.len(), 1);
    assert_eq!(cfg.sources[0].url, "stub://garden");
    assert_eq!(cfg.sources[0].nominal_fps, 15); // env override
    assert_eq!(cfg.sources[0].width, 800);
    assert_eq!(cfg.sources[0].height, 600);
    assert_eq!(cfg.recording.buffer_seconds, 10);
    assert_eq!(cfg.recording.post_detection_secs, 5);
    assert_eq!(cfg.recording.extension_secs, 4);
    assert_eq!(cfg.recording.extension_window_secs, 3);
    assert_eq!(cfg.recording.trigger_threshold, 0.45); // env override
    assert_eq!(cfg.recording.tier_medium, 0.7);
    assert_eq!(cfg.recording.tier_high, 0.85);
    assert_eq!(cfg.artifacts.clips_dir.to_str().unwrap(), "captures");
    assert_eq!(cfg.artifacts.snapshots_dir.to_str().unwrap(), "stills");
    assert_eq!(cfg.artifacts.snapshot_probability, 0.5);
    assert_eq!(cfg.api_addr, "0.0.0.0:9000");

    clear_env();
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SentrydConfig::load().expect("load config");

    assert_eq!(cfg.sources.len(), 1);
    assert_eq!(cfg.sources[0].url, "stub://front_camera");
    assert_eq!(cfg.sources[0].nominal_fps, 30);
    assert_eq!(cfg.recording.buffer_seconds, 15);
    assert_eq!(cfg.recording.post_detection_secs, 7);
    assert_eq!(cfg.recording.extension_secs, 7);
    assert_eq!(cfg.recording.extension_window_secs, 2);
    assert_eq!(cfg.recording.trigger_threshold, 0.5);
    assert_eq!(cfg.artifacts.snapshot_probability, 0.75);
    assert_eq!(cfg.api_addr, "127.0.0.1:8799");

    clear_env();
}

#[test]
fn invalid_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    // Threshold outside (0, 1]
    std::env::set_var("SENTRY_TRIGGER_THRESHOLD", "1.5");
    assert!(SentrydConfig::load().is_err());
    std::env::remove_var("SENTRY_TRIGGER_THRESHOLD");

    // Zero fps
    std::env::set_var("SENTRY_FPS", "0");
    assert!(SentrydConfig::load().is_err());
    std::env::remove_var("SENTRY_FPS");

    // Unordered tier breakpoints
    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "recording": { "tier_medium": 0.9, "tier_high": 0.6 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    std::env::set_var("SENTRY_CONFIG", file.path());
    assert!(SentrydConfig::load().is_err());

    clear_env();
}
