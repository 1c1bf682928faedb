//! Pipeline lifecycle.
//!
//! `Pipeline` owns the state machine Idle → Running ⇄ Paused → Stopped and
//! the `Session` holding every piece of per-run state: stage threads,
//! queues, counters, the speech handle, the recorder control channel. Stop
//! tears the session down completely; nothing survives into the next start.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::announce::{announcement_queue, Speech};
use crate::detect::DetectorBackend;
use crate::error::PipelineError;
use crate::ingest::{FrameSource, SourceGate};
use crate::notify::{DebouncerConfig, NotificationDebouncer};
use crate::record::{Recorder, VideoSink};
use crate::track::{Tracker, TrackerConfig};

use super::stages::{
    announce_stage, capture_stage, debounce_stage, latest_wins_queue, record_stage, track_stage,
    RecorderCommand,
};
use super::{CancelToken, PipelineState, PipelineStats, StageEvent, StatsSnapshot};

/// Knobs for assembling a session. Everything here is configuration, not
/// hidden behavior.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub tracker: TrackerConfig,
    pub debouncer: DebouncerConfig,
    /// Include the zone in spoken phrases (zone-announcement toggle).
    pub include_zone_in_phrase: bool,
    /// Mirror frames at capture (webcam self-view).
    pub mirror: bool,
    /// Capture → tracker queue capacity; latest-wins on overflow.
    pub capture_queue_capacity: usize,
    /// Tracker → debouncer queue capacity.
    pub snapshot_queue_capacity: usize,
    /// Debouncer → announcer queue capacity; drop-oldest on overflow.
    pub announce_queue_capacity: usize,
    /// Tracker → recorder queue capacity; drop-counted on overflow.
    pub record_queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            debouncer: DebouncerConfig::default(),
            include_zone_in_phrase: true,
            mirror: false,
            capture_queue_capacity: 1,
            snapshot_queue_capacity: 4,
            announce_queue_capacity: 8,
            record_queue_capacity: 16,
        }
    }
}

/// Recording parameters for `start_recording`.
#[derive(Clone, Debug)]
pub struct RecordingOptions {
    pub path: PathBuf,
    pub fps: u32,
}

/// All state belonging to one run. Dropped wholesale on stop.
struct Session {
    cancel: CancelToken,
    pause: Arc<AtomicBool>,
    source_gate: SourceGate,
    speech: Arc<dyn Speech>,
    recorder_control: Sender<RecorderCommand>,
    recording_active: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
    events_rx: Receiver<StageEvent>,
    handles: Vec<JoinHandle<()>>,
}

pub struct Pipeline {
    config: PipelineConfig,
    state: PipelineState,
    session: Option<Session>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            state: PipelineState::Idle,
            session: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Spawn a session: connect the source, warm up the detector, wire the
    /// stage threads. Fails with `AlreadyRunning` unless no session is live
    /// (Idle, or Stopped from a previous session).
    pub fn start(
        &mut self,
        mut source: Box<dyn FrameSource>,
        mut detector: Box<dyn DetectorBackend>,
        speech: Arc<dyn Speech>,
        sink: Box<dyn VideoSink>,
    ) -> Result<(), PipelineError> {
        if matches!(self.state, PipelineState::Running | PipelineState::Paused) {
            return Err(PipelineError::AlreadyRunning);
        }

        source.connect()?;
        detector.warm_up()?;

        let cancel = CancelToken::new();
        let pause = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(PipelineStats::default());
        let source_gate = source.gate();
        let recording_active = Arc::new(AtomicBool::new(false));

        let (events_tx, events_rx) = unbounded();
        let (frame_tx, frame_rx) =
            latest_wins_queue(self.config.capture_queue_capacity, stats.clone());
        let (obs_tx, obs_rx) = bounded(self.config.snapshot_queue_capacity);
        let (announce_tx, announce_rx) = announcement_queue(
            self.config.announce_queue_capacity,
            stats.announcements_dropped.clone(),
        );
        let (record_frame_tx, record_frame_rx) = bounded(self.config.record_queue_capacity);
        let (recorder_control_tx, recorder_control_rx) = unbounded();

        let mut handles = Vec::with_capacity(5);

        {
            let cancel = cancel.clone();
            let pause = pause.clone();
            let stats = stats.clone();
            let events = events_tx.clone();
            let mirror = self.config.mirror;
            handles.push(spawn_stage("capture", move || {
                capture_stage(source, frame_tx, mirror, cancel, pause, stats, events)
            }));
        }
        {
            let cancel = cancel.clone();
            let stats = stats.clone();
            let events = events_tx.clone();
            let tracker = Tracker::new(self.config.tracker.clone());
            let recording_active = recording_active.clone();
            handles.push(spawn_stage("track", move || {
                track_stage(
                    detector,
                    tracker,
                    frame_rx,
                    obs_tx,
                    record_frame_tx,
                    recording_active,
                    cancel,
                    stats,
                    events,
                )
            }));
        }
        {
            let cancel = cancel.clone();
            let stats = stats.clone();
            let debouncer = NotificationDebouncer::new(self.config.debouncer.clone());
            handles.push(spawn_stage("debounce", move || {
                debounce_stage(debouncer, obs_rx, announce_tx, cancel, stats)
            }));
        }
        {
            let cancel = cancel.clone();
            let pause = pause.clone();
            let stats = stats.clone();
            let events = events_tx.clone();
            let speech = speech.clone();
            let include_zone = self.config.include_zone_in_phrase;
            handles.push(spawn_stage("announce", move || {
                announce_stage(speech, announce_rx, include_zone, cancel, pause, stats, events)
            }));
        }
        {
            let cancel = cancel.clone();
            let stats = stats.clone();
            let recorder = Recorder::new(sink);
            let recording_active = recording_active.clone();
            handles.push(spawn_stage("record", move || {
                record_stage(
                    recorder,
                    record_frame_rx,
                    recorder_control_rx,
                    recording_active,
                    cancel,
                    stats,
                    events_tx,
                )
            }));
        }

        self.session = Some(Session {
            cancel,
            pause,
            source_gate,
            speech,
            recorder_control: recorder_control_tx,
            recording_active,
            stats,
            events_rx,
            handles,
        });
        self.state = PipelineState::Running;
        log::info!("pipeline started");
        Ok(())
    }

    /// Running → Paused. The source stops producing, queued frames are
    /// discarded, the current utterance is interrupted.
    pub fn pause(&mut self) -> Result<(), PipelineError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::InvalidTransition(
                "pause requires a running pipeline",
            ));
        }
        let session = self.session.as_ref().expect("running implies session");
        session.pause.store(true, Ordering::Release);
        session.speech.cancel();
        self.state = PipelineState::Paused;
        log::info!("pipeline paused");
        Ok(())
    }

    /// Paused → Running.
    pub fn resume(&mut self) -> Result<(), PipelineError> {
        if self.state != PipelineState::Paused {
            return Err(PipelineError::InvalidTransition(
                "resume requires a paused pipeline",
            ));
        }
        let session = self.session.as_ref().expect("paused implies session");
        session.pause.store(false, Ordering::Release);
        self.state = PipelineState::Running;
        log::info!("pipeline resumed");
        Ok(())
    }

    /// Any state → Stopped. Cancels every stage, closes the source, flushes
    /// and closes the recorder, then discards all session state. Idempotent.
    pub fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            self.state = PipelineState::Stopped;
            return;
        };

        // Downstream-to-source teardown order: signal everything, then
        // unblock the source so capture exits promptly.
        session.cancel.cancel();
        session.pause.store(false, Ordering::Release);
        session.speech.cancel();
        session.source_gate.close();

        for handle in session.handles {
            let name = handle.thread().name().unwrap_or("stage").to_string();
            if handle.join().is_err() {
                log::error!("stage '{}' panicked during shutdown", name);
            }
        }
        self.state = PipelineState::Stopped;
        log::info!("pipeline stopped");
    }

    /// Begin recording annotated frames. The output opens on the next
    /// processed frame, when the frame dimensions are known.
    pub fn start_recording(&mut self, options: RecordingOptions) -> Result<(), PipelineError> {
        let session = self.live_session("recording requires a live pipeline")?;
        session
            .recorder_control
            .send(RecorderCommand::Start {
                path: options.path,
                fps: options.fps,
            })
            .map_err(|_| PipelineError::RecordingUnavailable("recorder stage gone".to_string()))
    }

    /// Stop recording, flushing and closing the output.
    pub fn stop_recording(&mut self) -> Result<(), PipelineError> {
        let session = self.live_session("recording requires a live pipeline")?;
        session
            .recorder_control
            .send(RecorderCommand::Stop)
            .map_err(|_| PipelineError::RecordingUnavailable("recorder stage gone".to_string()))
    }

    pub fn is_recording(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.recording_active.load(Ordering::Acquire))
    }

    /// Structured stage events for the current session.
    pub fn events(&self) -> Option<Receiver<StageEvent>> {
        self.session.as_ref().map(|s| s.events_rx.clone())
    }

    /// Counters for the current session.
    pub fn stats(&self) -> StatsSnapshot {
        self.session
            .as_ref()
            .map(|s| s.stats.snapshot())
            .unwrap_or_default()
    }

    fn live_session(&self, why: &'static str) -> Result<&Session, PipelineError> {
        if !matches!(self.state, PipelineState::Running | PipelineState::Paused) {
            return Err(PipelineError::InvalidTransition(why));
        }
        Ok(self.session.as_ref().expect("live state implies session"))
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_stage<F>(name: &str, body: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .expect("spawn stage thread")
}
