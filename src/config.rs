use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_MODEL: &str = "stub";
const DEFAULT_CONF_THRESHOLD: f32 = 0.25;
const MIN_CONF_THRESHOLD: f32 = 0.01;
const MAX_CONF_THRESHOLD: f32 = 1.0;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 20;
const DEFAULT_COOLDOWN_SECS: f64 = 3.0;
const DEFAULT_SPEECH_RATE_WPM: u32 = 150;
const DEFAULT_SPEECH_VOLUME: f32 = 0.9;
const DEFAULT_RECORDING_FPS: u32 = 20;

/// Where frames come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSelector {
    InternalCamera,
    ExternalCamera(u32),
    File(PathBuf),
}

impl SourceSelector {
    /// Parse the CLI/env form: `internal-camera`, `external-camera:<index>`
    /// or `file:<path>`.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value == "internal-camera" {
            return Ok(Self::InternalCamera);
        }
        if let Some(index) = value.strip_prefix("external-camera:") {
            let index: u32 = index
                .parse()
                .map_err(|_| anyhow!("external camera index must be an integer"))?;
            return Ok(Self::ExternalCamera(index));
        }
        if let Some(path) = value.strip_prefix("file:") {
            if path.is_empty() {
                return Err(anyhow!("file source needs a path"));
            }
            return Ok(Self::File(PathBuf::from(path)));
        }
        Err(anyhow!(
            "unknown source '{}' (expected internal-camera, external-camera:<index> or file:<path>)",
            value
        ))
    }
}

#[derive(Debug, Deserialize, Default)]
struct WayfinderdConfigFile {
    source: Option<String>,
    model: Option<String>,
    confidence_threshold: Option<f32>,
    voice: Option<VoiceConfigFile>,
    mirror: Option<bool>,
    camera: Option<CameraConfigFile>,
    file: Option<FileConfigFile>,
    recording: Option<RecordingConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct VoiceConfigFile {
    enabled: Option<bool>,
    announce_zones: Option<bool>,
    cooldown_secs: Option<f64>,
    repeat_secs: Option<f64>,
    announce_all_clear: Option<bool>,
    rate_wpm: Option<u32>,
    volume: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct FileConfigFile {
    pace_playback: Option<bool>,
    loop_playback: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct RecordingConfigFile {
    directory: Option<PathBuf>,
    fps: Option<u32>,
    keep_last: Option<usize>,
    auto_record: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct VoiceSettings {
    pub enabled: bool,
    pub announce_zones: bool,
    pub cooldown: Duration,
    /// `None` disables StillPresent repeats.
    pub repeat_interval: Option<Duration>,
    pub announce_all_clear: bool,
    pub rate_wpm: u32,
    pub volume: f32,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

#[derive(Debug, Clone)]
pub struct FilePlaybackSettings {
    pub pace_playback: bool,
    pub loop_playback: bool,
}

#[derive(Debug, Clone)]
pub struct RecordingSettings {
    pub directory: PathBuf,
    pub fps: u32,
    /// Delete all but this many recordings at startup; `None` keeps all.
    pub keep_last: Option<usize>,
    /// Start recording as soon as the pipeline runs.
    pub auto_record: bool,
}

#[derive(Debug, Clone)]
pub struct WayfinderdConfig {
    pub source: SourceSelector,
    pub model: String,
    pub confidence_threshold: f32,
    /// Mirror frames at capture. `None` picks the source default (on for
    /// the internal camera, off otherwise).
    pub mirror: Option<bool>,
    pub voice: VoiceSettings,
    pub camera: CameraSettings,
    pub file: FilePlaybackSettings,
    pub recording: RecordingSettings,
}

impl WayfinderdConfig {
    /// Load from the file named by `WAYFINDER_CONFIG` (if set), then apply
    /// `WAYFINDER_*` env overrides, then validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("WAYFINDER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: WayfinderdConfigFile) -> Result<Self> {
        let source = match file.source.as_deref() {
            Some(value) => SourceSelector::parse(value)?,
            None => SourceSelector::InternalCamera,
        };
        let voice_file = file.voice.unwrap_or_default();
        let voice = VoiceSettings {
            enabled: voice_file.enabled.unwrap_or(true),
            announce_zones: voice_file.announce_zones.unwrap_or(true),
            cooldown: Duration::from_secs_f64(
                voice_file.cooldown_secs.unwrap_or(DEFAULT_COOLDOWN_SECS),
            ),
            repeat_interval: voice_file.repeat_secs.map(Duration::from_secs_f64),
            announce_all_clear: voice_file.announce_all_clear.unwrap_or(false),
            rate_wpm: voice_file.rate_wpm.unwrap_or(DEFAULT_SPEECH_RATE_WPM),
            volume: voice_file.volume.unwrap_or(DEFAULT_SPEECH_VOLUME),
        };
        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            fps: camera_file.fps.unwrap_or(DEFAULT_CAMERA_FPS),
        };
        let file_playback = file.file.unwrap_or_default();
        let playback = FilePlaybackSettings {
            pace_playback: file_playback.pace_playback.unwrap_or(true),
            loop_playback: file_playback.loop_playback.unwrap_or(false),
        };
        let recording_file = file.recording.unwrap_or_default();
        let recording = RecordingSettings {
            directory: recording_file
                .directory
                .unwrap_or_else(default_recording_dir),
            fps: recording_file.fps.unwrap_or(DEFAULT_RECORDING_FPS),
            keep_last: recording_file.keep_last,
            auto_record: recording_file.auto_record.unwrap_or(false),
        };
        Ok(Self {
            source,
            model: file.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            confidence_threshold: file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONF_THRESHOLD),
            mirror: file.mirror,
            voice,
            camera,
            file: playback,
            recording,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("WAYFINDER_SOURCE") {
            if !source.trim().is_empty() {
                self.source = SourceSelector::parse(&source)?;
            }
        }
        if let Ok(model) = std::env::var("WAYFINDER_MODEL") {
            if !model.trim().is_empty() {
                self.model = model;
            }
        }
        if let Ok(threshold) = std::env::var("WAYFINDER_CONFIDENCE") {
            self.confidence_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("WAYFINDER_CONFIDENCE must be a number in 0..1"))?;
        }
        if let Ok(dir) = std::env::var("WAYFINDER_RECORD_DIR") {
            if !dir.trim().is_empty() {
                self.recording.directory = PathBuf::from(dir);
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.confidence_threshold = self
            .confidence_threshold
            .clamp(MIN_CONF_THRESHOLD, MAX_CONF_THRESHOLD);
        if !(0.0..=1.0).contains(&self.voice.volume) {
            return Err(anyhow!("voice volume must be within 0.0..=1.0"));
        }
        if self.camera.fps == 0 {
            return Err(anyhow!("camera fps must be greater than zero"));
        }
        if self.recording.fps == 0 {
            return Err(anyhow!("recording fps must be greater than zero"));
        }
        if let SourceSelector::File(path) = &self.source {
            if path.as_os_str().is_empty() {
                return Err(anyhow!("file source needs a path"));
            }
        }
        Ok(())
    }

    /// Effective mirror setting: explicit value, else on for the internal
    /// camera only (self-view), off for external cameras and files.
    pub fn mirror_enabled(&self) -> bool {
        self.mirror
            .unwrap_or(self.source == SourceSelector::InternalCamera)
    }
}

fn default_recording_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join("wayfinder_recordings")
}

fn read_config_file(path: &Path) -> Result<WayfinderdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_selector_parses_the_three_forms() {
        assert_eq!(
            SourceSelector::parse("internal-camera").unwrap(),
            SourceSelector::InternalCamera
        );
        assert_eq!(
            SourceSelector::parse("external-camera:2").unwrap(),
            SourceSelector::ExternalCamera(2)
        );
        assert_eq!(
            SourceSelector::parse("file:/tmp/clip.wfv").unwrap(),
            SourceSelector::File(PathBuf::from("/tmp/clip.wfv"))
        );
        assert!(SourceSelector::parse("carrier-pigeon").is_err());
        assert!(SourceSelector::parse("external-camera:two").is_err());
        assert!(SourceSelector::parse("file:").is_err());
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = WayfinderdConfig::from_file(WayfinderdConfigFile::default()).unwrap();
        assert_eq!(cfg.source, SourceSelector::InternalCamera);
        assert_eq!(cfg.model, "stub");
        assert!(cfg.voice.enabled);
        assert!(cfg.voice.announce_zones);
        assert!(cfg.voice.repeat_interval.is_none());
        assert!(cfg.mirror_enabled()); // internal camera mirrors by default
    }

    #[test]
    fn mirror_defaults_follow_the_source() {
        let mut cfg = WayfinderdConfig::from_file(WayfinderdConfigFile::default()).unwrap();
        cfg.source = SourceSelector::ExternalCamera(1);
        assert!(!cfg.mirror_enabled());
        cfg.mirror = Some(true);
        assert!(cfg.mirror_enabled());
    }

    #[test]
    fn confidence_threshold_is_clamped() {
        let mut cfg = WayfinderdConfig::from_file(WayfinderdConfigFile::default()).unwrap();
        cfg.confidence_threshold = 7.5;
        cfg.validate().unwrap();
        assert_eq!(cfg.confidence_threshold, MAX_CONF_THRESHOLD);

        cfg.confidence_threshold = -1.0;
        cfg.validate().unwrap();
        assert_eq!(cfg.confidence_threshold, MIN_CONF_THRESHOLD);
    }

    #[test]
    fn zero_fps_is_rejected() {
        let mut cfg = WayfinderdConfig::from_file(WayfinderdConfigFile::default()).unwrap();
        cfg.camera.fps = 0;
        assert!(cfg.validate().is_err());
    }
}
