//! The streaming pipeline: stages, queues, lifecycle.
//!
//! Each stage runs on its own thread, connected to its neighbors by bounded
//! single-producer/single-consumer channels carrying owned values. No stage
//! shares mutable state with another; the controller supervises them through
//! a cancellation token, a pause flag, and a stream of structured events.

mod controller;
mod stages;

pub use controller::{Pipeline, PipelineConfig, RecordingOptions};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Paused,
    /// Terminal for the session that just ended; a new `start()` opens a
    /// fresh session.
    Stopped,
}

/// Cooperative cancellation token. Every stage checks it at its most
/// frequent blocking point and exits within one poll tick of `cancel()`.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Counters shared by all stages of one session. Plain atomics: stages only
/// ever increment, observers only read.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub frames_captured: AtomicU64,
    /// Frames replaced in the capture queue because the tracker was behind
    /// (latest-wins policy).
    pub frames_replaced: AtomicU64,
    pub frames_processed: AtomicU64,
    pub detector_failures: AtomicU64,
    pub events_emitted: AtomicU64,
    pub announcements_spoken: AtomicU64,
    /// Events shed from the full announcement queue (drop-oldest policy).
    /// Behind an `Arc` because the queue lives below the pipeline layer and
    /// counts its own drops.
    pub announcements_dropped: Arc<AtomicU64>,
    pub speech_failures: AtomicU64,
    pub recording_frames_written: AtomicU64,
    /// Frames dropped from the recording path only; detection never loses
    /// frames to recording pressure.
    pub recording_frames_dropped: AtomicU64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_replaced: self.frames_replaced.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            detector_failures: self.detector_failures.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            announcements_spoken: self.announcements_spoken.load(Ordering::Relaxed),
            announcements_dropped: self.announcements_dropped.load(Ordering::Relaxed),
            speech_failures: self.speech_failures.load(Ordering::Relaxed),
            recording_frames_written: self.recording_frames_written.load(Ordering::Relaxed),
            recording_frames_dropped: self.recording_frames_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the session counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatsSnapshot {
    pub frames_captured: u64,
    pub frames_replaced: u64,
    pub frames_processed: u64,
    pub detector_failures: u64,
    pub events_emitted: u64,
    pub announcements_spoken: u64,
    pub announcements_dropped: u64,
    pub speech_failures: u64,
    pub recording_frames_written: u64,
    pub recording_frames_dropped: u64,
}

/// Structured stage reports surfaced to the controller's observer. Errors
/// never disappear silently: anything a stage swallows shows up here and in
/// the counters.
#[derive(Clone, Debug)]
pub enum StageEvent {
    /// The source reached end of stream or was closed.
    SourceEnded,
    /// The source died; the pipeline is starving and should be stopped.
    SourceFailed(String),
    DetectorFailed { frame_seq: u64, message: String },
    SpeechFailed(String),
    RecordingFailed(String),
    RecordingStarted(PathBuf),
    RecordingStopped { path: PathBuf, frames_written: u64 },
}
