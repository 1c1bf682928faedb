//! wayfinderd - navigation assistant daemon
//!
//! This daemon:
//! 1. Ingests frames from the configured source (camera or recorded file)
//! 2. Runs detection + tracking and classifies each track into a zone
//! 3. Debounces zone events and speaks them through the voice backend
//! 4. Optionally records the annotated stream
//! 5. Shuts the pipeline down in order on Ctrl-C or end of stream

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use clap::Parser;

use wayfinder::record::{cleanup_old_recordings, timestamped_path, ContainerSink};
use wayfinder::{
    BackendRegistry, CameraConfig, CameraSource, DebouncerConfig, FileConfig, FileSource,
    FrameSource, LogSpeech, MuteSpeech, Pipeline, PipelineConfig, RecordingOptions,
    SourceSelector, Speech, SpeechSettings, StageEvent, StubBackend, TrackerConfig,
    WayfinderdConfig,
};

#[derive(Parser, Debug)]
#[command(name = "wayfinderd", about = "Spoken spatial alerts from live video")]
struct Args {
    /// Config file (JSON). Also read from WAYFINDER_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source: internal-camera, external-camera:<index> or file:<path>.
    #[arg(long)]
    source: Option<String>,

    /// Detection model name.
    #[arg(long)]
    model: Option<String>,

    /// Confidence threshold in 0..1.
    #[arg(long)]
    confidence: Option<f32>,

    /// Start recording immediately.
    #[arg(long)]
    record: bool,

    /// Disable voice output for this run.
    #[arg(long)]
    no_voice: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Some(path) = &args.config {
        std::env::set_var("WAYFINDER_CONFIG", path);
    }
    let mut cfg = WayfinderdConfig::load()?;
    if let Some(source) = &args.source {
        cfg.source = SourceSelector::parse(source)?;
    }
    if let Some(model) = &args.model {
        cfg.model = model.clone();
    }
    if let Some(confidence) = args.confidence {
        cfg.confidence_threshold = confidence.clamp(0.01, 1.0);
    }
    if args.no_voice {
        cfg.voice.enabled = false;
    }

    let mut registry = BackendRegistry::new();
    registry.register("stub", || Box::new(StubBackend::new()));
    let detector = registry
        .create(&cfg.model)
        .map_err(|e| anyhow!("model selection failed: {}", e))?;

    let source: Box<dyn FrameSource> = match &cfg.source {
        SourceSelector::InternalCamera => Box::new(CameraSource::new(CameraConfig {
            index: 0,
            width: cfg.camera.width,
            height: cfg.camera.height,
            fps: cfg.camera.fps,
        })),
        SourceSelector::ExternalCamera(index) => Box::new(CameraSource::new(CameraConfig {
            index: *index,
            width: cfg.camera.width,
            height: cfg.camera.height,
            fps: cfg.camera.fps,
        })),
        SourceSelector::File(path) => {
            let mut file_config = FileConfig::new(path.clone());
            file_config.pace_playback = cfg.file.pace_playback;
            file_config.loop_playback = cfg.file.loop_playback;
            Box::new(FileSource::new(file_config))
        }
    };

    let speech: Arc<dyn Speech> = if cfg.voice.enabled {
        Arc::new(LogSpeech::new(SpeechSettings {
            rate_wpm: cfg.voice.rate_wpm,
            volume: cfg.voice.volume,
        }))
    } else {
        Arc::new(MuteSpeech)
    };

    let pipeline_config = PipelineConfig {
        tracker: TrackerConfig {
            confidence_threshold: cfg.confidence_threshold,
            ..TrackerConfig::default()
        },
        debouncer: DebouncerConfig {
            cooldown: cfg.voice.cooldown,
            repeat_interval: cfg.voice.repeat_interval,
            announce_all_clear: cfg.voice.announce_all_clear,
        },
        include_zone_in_phrase: cfg.voice.announce_zones,
        mirror: cfg.mirror_enabled(),
        ..PipelineConfig::default()
    };

    if let Some(keep) = cfg.recording.keep_last {
        cleanup_old_recordings(&cfg.recording.directory, keep);
    }

    let mut pipeline = Pipeline::new(pipeline_config);
    pipeline.start(source, detector, speech, Box::new(ContainerSink::new()))?;

    log::info!(
        "wayfinderd running: model={}, confidence={:.2}, voice={}",
        cfg.model,
        cfg.confidence_threshold,
        cfg.voice.enabled
    );

    if args.record || cfg.recording.auto_record {
        let path = timestamped_path(&cfg.recording.directory);
        pipeline.start_recording(RecordingOptions {
            path,
            fps: cfg.recording.fps,
        })?;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::Release);
        })?;
    }

    let events = pipeline.events().expect("running pipeline has events");
    let mut last_health_log = Instant::now();
    loop {
        if shutdown.load(Ordering::Acquire) {
            log::info!("shutdown requested");
            break;
        }
        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(StageEvent::SourceEnded) => {
                log::info!("source ended; stopping");
                break;
            }
            Ok(StageEvent::SourceFailed(message)) => {
                log::error!("source failed: {}; stopping", message);
                break;
            }
            Ok(StageEvent::DetectorFailed { frame_seq, message }) => {
                log::warn!("detector failed on frame {}: {}", frame_seq, message);
            }
            Ok(StageEvent::SpeechFailed(message)) => {
                log::warn!("speech failed: {}", message);
            }
            Ok(StageEvent::RecordingFailed(message)) => {
                log::warn!("recording failed: {}", message);
            }
            Ok(StageEvent::RecordingStarted(path)) => {
                log::info!("recording to {}", path.display());
            }
            Ok(StageEvent::RecordingStopped {
                path,
                frames_written,
            }) => {
                log::info!(
                    "recording finished: {} ({} frames)",
                    path.display(),
                    frames_written
                );
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let stats = pipeline.stats();
            log::info!(
                "health: captured={} processed={} replaced={} spoken={} voice_dropped={} rec_written={} rec_dropped={}",
                stats.frames_captured,
                stats.frames_processed,
                stats.frames_replaced,
                stats.announcements_spoken,
                stats.announcements_dropped,
                stats.recording_frames_written,
                stats.recording_frames_dropped
            );
            last_health_log = Instant::now();
        }
    }

    let stats = pipeline.stats();
    pipeline.stop();
    log::info!(
        "session summary: {} frames captured, {} processed, {} announcements spoken, {} dropped",
        stats.frames_captured,
        stats.frames_processed,
        stats.announcements_spoken,
        stats.announcements_dropped
    );
    Ok(())
}
