use thiserror::Error;

/// Errors produced by the pipeline and its capability boundaries.
///
/// Only `SourceUnavailable` is fatal to a session: a starved pipeline has
/// nothing left to do and transitions to Stopped. Every other kind is local
/// to one stage and is surfaced as a structured event while the sibling
/// stages keep running.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Camera or file source cannot be opened or died mid-stream.
    #[error("video source unavailable: {0}")]
    SourceUnavailable(String),

    /// The detector failed on one frame. That frame's tracking update is
    /// skipped; the pipeline continues.
    #[error("detector failure: {0}")]
    DetectorFailure(String),

    /// The speech engine rejected an utterance. Logged and retried on the
    /// next event; never stops detection, tracking, or recording.
    #[error("speech unavailable: {0}")]
    SpeechUnavailable(String),

    /// The recording destination cannot be opened or written. Detection and
    /// voice continue.
    #[error("recording unavailable: {0}")]
    RecordingUnavailable(String),

    /// `start()` was called while a session is already live.
    #[error("pipeline already running")]
    AlreadyRunning,

    /// A lifecycle call that the current state does not permit, e.g.
    /// `pause()` while Idle.
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
