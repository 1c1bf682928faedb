//! Wayfinder
//!
//! This crate implements the streaming core of a navigation assistant for
//! visually impaired users: live video in, spoken spatially-located alerts
//! out, with optional annotated recording.
//!
//! # Architecture
//!
//! Independent stage threads connected by bounded queues:
//!
//! ```text
//! source -> tracker(+detector) -> debouncer -> announcer
//!                  \-> recorder (when recording)
//! ```
//!
//! - The capture queue is latest-wins: a slow tracker loses frames, never
//!   freshness.
//! - The announcement queue is drop-oldest: a slow speech engine sheds
//!   stale phrases, never blocks detection.
//! - The recording queue drops (and counts) frames under write pressure
//!   without touching the live path.
//! - Stop cancels cooperatively; every stage exits within one poll tick and
//!   closes its outbound queue so nothing downstream hangs.
//!
//! Detection models, speech synthesis and hardware capture are external
//! capabilities behind the `DetectorBackend`, `Speech`, `FrameSource` and
//! `VideoSink` traits.
//!
//! # Module Structure
//!
//! - `ingest`: frame sources (camera, recorded file)
//! - `detect`: detector capability boundary and model registry
//! - `track`: identity tracking over noisy detections
//! - `zone`: left/center/right classification
//! - `notify`: announcement debouncing
//! - `announce`: phrase rendering and the speech boundary
//! - `record`: annotated recording and the video sink boundary
//! - `pipeline`: stage wiring and the lifecycle state machine

pub mod announce;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod notify;
pub mod overlay;
pub mod pipeline;
pub mod record;
pub mod track;
pub mod zone;

pub use announce::{LogSpeech, MuteSpeech, RecordingSpeech, Speech, SpeechSettings};
pub use config::{SourceSelector, WayfinderdConfig};
pub use detect::{BackendRegistry, Detection, DetectorBackend, StubBackend};
pub use error::PipelineError;
pub use frame::Frame;
pub use ingest::{
    CameraConfig, CameraSource, FileConfig, FileSource, FrameSource, SourceGate, SourceStats,
};
pub use notify::{DebouncerConfig, EventKind, NotificationDebouncer, NotificationEvent};
pub use pipeline::{
    Pipeline, PipelineConfig, PipelineState, RecordingOptions, StageEvent, StatsSnapshot,
};
pub use record::{ContainerSink, Recorder, VideoSink};
pub use track::{
    BoundingBox, FrameObservation, LostTrack, TrackId, TrackSnapshot, Tracker, TrackerConfig,
};
pub use zone::{classify, Zone};
