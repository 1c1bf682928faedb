use std::sync::Mutex;

use tempfile::NamedTempFile;

use wayfinder::config::{SourceSelector, WayfinderdConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "WAYFINDER_CONFIG",
        "WAYFINDER_SOURCE",
        "WAYFINDER_MODEL",
        "WAYFINDER_CONFIDENCE",
        "WAYFINDER_RECORD_DIR",
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
        "source": "external-camera:1",
        "model": "stub",
        "confidence_threshold": 0.4,
        "mirror": false,
        "voice": {
            "enabled": true,
            "announce_zones": false,
            "cooldown_secs": 2.5,
            "repeat_secs": 12.0,
            "announce_all_clear": true,
            "rate_wpm": 170,
            "volume": 0.8
        },
        "camera": {
            "width": 800,
            "height": 600,
            "fps": 25
        },
        "file": {
            "pace_playback": false,
            "loop_playback": true
        },
        "recording": {
            "directory": "/tmp/wayfinder-test-recordings",
            "fps": 15,
            "keep_last": 10,
            "auto_record": true
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("WAYFINDER_CONFIG", file.path());
    std::env::set_var("WAYFINDER_SOURCE", "file:/tmp/clip.wfv");
    std::env::set_var("WAYFINDER_CONFIDENCE", "0.6");

    let cfg = WayfinderdConfig::load().expect("load config");

    // Env wins over file for the overridden keys.
    assert_eq!(
        cfg.source,
        SourceSelector::File(std::path::PathBuf::from("/tmp/clip.wfv"))
    );
    assert_eq!(cfg.confidence_threshold, 0.6);

    // The rest comes from the file.
    assert_eq!(cfg.model, "stub");
    assert_eq!(cfg.mirror, Some(false));
    assert!(cfg.voice.enabled);
    assert!(!cfg.voice.announce_zones);
    assert_eq!(cfg.voice.cooldown.as_secs_f64(), 2.5);
    assert_eq!(cfg.voice.repeat_interval.unwrap().as_secs_f64(), 12.0);
    assert!(cfg.voice.announce_all_clear);
    assert_eq!(cfg.voice.rate_wpm, 170);
    assert_eq!(cfg.camera.width, 800);
    assert_eq!(cfg.camera.fps, 25);
    assert!(!cfg.file.pace_playback);
    assert!(cfg.file.loop_playback);
    assert_eq!(
        cfg.recording.directory,
        std::path::PathBuf::from("/tmp/wayfinder-test-recordings")
    );
    assert_eq!(cfg.recording.fps, 15);
    assert_eq!(cfg.recording.keep_last, Some(10));
    assert!(cfg.recording.auto_record);

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = WayfinderdConfig::load().expect("load defaults");
    assert_eq!(cfg.source, SourceSelector::InternalCamera);
    assert_eq!(cfg.model, "stub");
    assert!(cfg.voice.enabled);
    assert!(cfg.mirror_enabled());
    assert!(!cfg.recording.auto_record);

    clear_env();
}

#[test]
fn invalid_source_env_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("WAYFINDER_SOURCE", "telepathy");
    assert!(WayfinderdConfig::load().is_err());

    clear_env();
}
