//! Stage thread bodies.
//!
//! Every blocking operation here is bounded by `TICK` so a cancelled stage
//! exits within one tick. Stages close their outbound channels by dropping
//! the senders on exit; downstream stages observe disconnect as end of
//! stream instead of hanging.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{
    bounded, select, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError,
};

use crate::announce::{render_phrase, AnnouncementSender, Speech};
use crate::detect::DetectorBackend;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::notify::NotificationDebouncer;
use crate::overlay;
use crate::record::Recorder;
use crate::track::{FrameObservation, Tracker};

use super::{CancelToken, PipelineStats, StageEvent};

/// Cancellation poll interval; the bound on stage shutdown latency.
pub(crate) const TICK: Duration = Duration::from_millis(50);

/// Sender half of the capture queue (capacity 1): a newer frame replaces the
/// pending one rather than blocking capture. Real-time responsiveness beats
/// processing every frame.
pub(crate) struct LatestWinsSender {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
    stats: Arc<PipelineStats>,
}

impl LatestWinsSender {
    pub(crate) fn push(&self, frame: Frame) {
        let mut frame = frame;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    if self.rx.try_recv().is_ok() {
                        self.stats.frames_replaced.fetch_add(1, Ordering::Relaxed);
                    }
                    frame = back;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// Discard anything queued; used while paused.
    pub(crate) fn drain(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}

pub(crate) fn latest_wins_queue(
    capacity: usize,
    stats: Arc<PipelineStats>,
) -> (LatestWinsSender, Receiver<Frame>) {
    let (tx, rx) = bounded(capacity);
    (
        LatestWinsSender {
            tx,
            rx: rx.clone(),
            stats,
        },
        rx,
    )
}

/// Blocking send that keeps observing the cancellation token. Returns false
/// when cancelled or the receiver is gone.
fn send_or_cancel<T>(tx: &Sender<T>, value: T, cancel: &CancelToken) -> bool {
    let mut value = value;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        match tx.send_timeout(value, TICK) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(back)) => value = back,
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

/// Capture stage: pull frames from the source at its native rate and push
/// them to the tracker queue, latest-wins. While paused the source is left
/// alone and anything queued is discarded.
#[allow(clippy::too_many_arguments)]
pub(crate) fn capture_stage(
    mut source: Box<dyn FrameSource>,
    frame_tx: LatestWinsSender,
    mirror: bool,
    cancel: CancelToken,
    pause: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
    events: Sender<StageEvent>,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        if pause.load(Ordering::Acquire) {
            frame_tx.drain();
            std::thread::sleep(TICK);
            continue;
        }

        match source.next_frame() {
            Ok(Some(mut frame)) => {
                if mirror {
                    frame.mirror_horizontal();
                }
                stats.frames_captured.fetch_add(1, Ordering::Relaxed);
                frame_tx.push(frame);
            }
            Ok(None) => {
                log::info!("source ended after {} frames", source.stats().frames_produced);
                let _ = events.send(StageEvent::SourceEnded);
                break;
            }
            Err(e) => {
                log::error!("source failed: {}", e);
                let _ = events.send(StageEvent::SourceFailed(e.to_string()));
                break;
            }
        }
    }
    // Dropping frame_tx closes the queue; the tracker stage sees
    // end-of-stream.
}

/// Tracker stage: detector + tracker + zone classification. Emits one
/// observation per processed frame and tees annotated frames to the
/// recording queue while recording is active.
#[allow(clippy::too_many_arguments)]
pub(crate) fn track_stage(
    mut detector: Box<dyn DetectorBackend>,
    mut tracker: Tracker,
    frame_rx: Receiver<Frame>,
    obs_tx: Sender<FrameObservation>,
    record_tx: Sender<Frame>,
    recording_active: Arc<AtomicBool>,
    cancel: CancelToken,
    stats: Arc<PipelineStats>,
    events: Sender<StageEvent>,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let frame = match frame_rx.recv_timeout(TICK) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let detections = match detector.detect(frame.data(), frame.width, frame.height) {
            Ok(detections) => detections,
            Err(e) => {
                // Per-frame failure: skip this frame's tracking update and
                // keep going.
                stats.detector_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("detector failed on frame {}: {}", frame.seq, e);
                let _ = events.send(StageEvent::DetectorFailed {
                    frame_seq: frame.seq,
                    message: e.to_string(),
                });
                continue;
            }
        };

        let (snapshots, lost) = tracker.update(frame.seq, frame.width, &detections);
        let observation = FrameObservation {
            frame_seq: frame.seq,
            frame_width: frame.width,
            observed_at: Instant::now(),
            snapshots: snapshots.clone(),
            lost,
        };
        if !send_or_cancel(&obs_tx, observation, &cancel) {
            break;
        }

        if recording_active.load(Ordering::Acquire) {
            let annotated = overlay::annotate(frame, &snapshots);
            match record_tx.try_send(annotated) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    // Recording pressure sheds recording frames only.
                    stats.recording_frames_dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }

        stats.frames_processed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Debounce stage: fold per-frame observations into sparse notification
/// events and push them toward the announcer.
pub(crate) fn debounce_stage(
    mut debouncer: NotificationDebouncer,
    obs_rx: Receiver<FrameObservation>,
    announce_tx: AnnouncementSender,
    cancel: CancelToken,
    stats: Arc<PipelineStats>,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let observation = match obs_rx.recv_timeout(TICK) {
            Ok(obs) => obs,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        for event in debouncer.observe(&observation) {
            stats.events_emitted.fetch_add(1, Ordering::Relaxed);
            announce_tx.push(event);
        }
    }
}

/// Announcer stage: strictly sequential utterance delivery. Never more than
/// one utterance in flight; speech failures are logged and the next event is
/// still attempted. While paused, nothing is consumed — the bounded queue
/// sheds stale events by itself.
pub(crate) fn announce_stage(
    speech: Arc<dyn Speech>,
    announce_rx: Receiver<crate::notify::NotificationEvent>,
    include_zone: bool,
    cancel: CancelToken,
    pause: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
    events: Sender<StageEvent>,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        if pause.load(Ordering::Acquire) {
            std::thread::sleep(TICK);
            continue;
        }
        let event = match announce_rx.recv_timeout(TICK) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        let phrase = render_phrase(&event, include_zone);
        match speech.speak(&phrase) {
            Ok(()) => {
                stats.announcements_spoken.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                // Voice failure never stops detection, tracking, or
                // recording.
                stats.speech_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("speech failed: {}", e);
                let _ = events.send(StageEvent::SpeechFailed(e.to_string()));
            }
        }
    }
}

/// Control messages for the recorder stage.
pub(crate) enum RecorderCommand {
    Start { path: PathBuf, fps: u32 },
    Stop,
}

/// Recorder stage: owns the `Recorder` and its sink. The output is opened
/// lazily on the first teed frame (that is when the frame dimensions are
/// known) and is always released exactly once — on Stop, on teardown, or on
/// write failure.
#[allow(clippy::too_many_arguments)]
pub(crate) fn record_stage(
    mut recorder: Recorder,
    frame_rx: Receiver<Frame>,
    control_rx: Receiver<RecorderCommand>,
    recording_active: Arc<AtomicBool>,
    cancel: CancelToken,
    stats: Arc<PipelineStats>,
    events: Sender<StageEvent>,
) {
    let mut pending_path: Option<(PathBuf, u32)> = None;
    let mut frames_gone = false;
    loop {
        if cancel.is_cancelled() {
            break;
        }
        if frames_gone {
            // Upstream ended; only control messages remain meaningful. An
            // open recording stays open until Stop or teardown flushes it.
            match control_rx.recv_timeout(TICK) {
                Ok(RecorderCommand::Stop) => {
                    recording_active.store(false, Ordering::Release);
                    pending_path = None;
                    if let Some(summary) = recorder.stop() {
                        let _ = events.send(StageEvent::RecordingStopped {
                            path: summary.path,
                            frames_written: summary.frames_written,
                        });
                    }
                }
                Ok(RecorderCommand::Start { .. }) => {
                    log::warn!("recording start ignored: source has ended");
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            continue;
        }
        select! {
            recv(control_rx) -> msg => match msg {
                Ok(RecorderCommand::Start { path, fps }) => {
                    recording_active.store(true, Ordering::Release);
                    pending_path = Some((path, fps));
                }
                Ok(RecorderCommand::Stop) => {
                    recording_active.store(false, Ordering::Release);
                    pending_path = None;
                    if let Some(summary) = recorder.stop() {
                        let _ = events.send(StageEvent::RecordingStopped {
                            path: summary.path,
                            frames_written: summary.frames_written,
                        });
                    }
                }
                Err(_) => break,
            },
            recv(frame_rx) -> msg => match msg {
                Ok(frame) => {
                    if let Some((path, fps)) = pending_path.take() {
                        match recorder.start(path.clone(), frame.width, frame.height, fps) {
                            Ok(()) => {
                                let _ = events.send(StageEvent::RecordingStarted(path));
                            }
                            Err(e) => {
                                log::error!("recording start failed: {}", e);
                                recording_active.store(false, Ordering::Release);
                                let _ = events.send(StageEvent::RecordingFailed(e.to_string()));
                                continue;
                            }
                        }
                    }
                    match recorder.write(&frame) {
                        Ok(()) => {
                            if recorder.is_recording() {
                                stats.recording_frames_written.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        Err(e) => {
                            log::error!("recording write failed: {}", e);
                            recording_active.store(false, Ordering::Release);
                            recorder.stop();
                            let _ = events.send(StageEvent::RecordingFailed(e.to_string()));
                        }
                    }
                }
                Err(_) => frames_gone = true,
            },
            default(TICK) => {}
        }
    }

    recording_active.store(false, Ordering::Release);
    if let Some(summary) = recorder.stop() {
        let _ = events.send(StageEvent::RecordingStopped {
            path: summary.path,
            frames_written: summary.frames_written,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u64) -> Frame {
        Frame::new(seq, 4, 4, vec![0u8; 4 * 4 * 3])
    }

    #[test]
    fn latest_wins_replaces_pending_frame() {
        let stats = Arc::new(PipelineStats::default());
        let (tx, rx) = latest_wins_queue(1, stats.clone());

        tx.push(frame(1));
        tx.push(frame(2));
        tx.push(frame(3));

        // Only the newest survives, and both replacements were counted.
        assert_eq!(rx.recv().unwrap().seq, 3);
        assert!(rx.try_recv().is_err());
        assert_eq!(stats.frames_replaced.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn send_or_cancel_returns_on_cancellation() {
        let (tx, _rx) = bounded::<u32>(1);
        tx.send(1).unwrap(); // fill the queue; nobody drains it
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(!send_or_cancel(&tx, 2, &cancel));
    }
}
