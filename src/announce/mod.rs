//! Voice announcements.
//!
//! The speech engine is the slowest resource in the system: one utterance at
//! a time, seconds each. Events therefore flow through a small bounded queue
//! that sheds the OLDEST entry when full — a stale "entering" is worse than
//! saying nothing — and a single worker delivers utterances strictly
//! sequentially. Speech failures are logged and counted; the rest of the
//! pipeline never notices them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::error::PipelineError;
use crate::notify::{EventKind, NotificationEvent};

/// Speech capability boundary. Implementations deliver one utterance per
/// `speak` call; `cancel` interrupts the current utterance and is called on
/// pause and stop. Shared behind an `Arc` so the controller can cancel while
/// the announcer worker owns delivery.
pub trait Speech: Send + Sync {
    fn speak(&self, text: &str) -> Result<(), PipelineError>;
    fn cancel(&self);
}

/// Voice tuning forwarded to the engine.
#[derive(Clone, Copy, Debug)]
pub struct SpeechSettings {
    /// Words per minute.
    pub rate_wpm: u32,
    /// 0.0..=1.0
    pub volume: f32,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            rate_wpm: 150,
            volume: 0.9,
        }
    }
}

/// Render an event to the spoken phrase. `include_zone` is the
/// zone-announcement toggle; with it off the user hears what, not where.
pub fn render_phrase(event: &NotificationEvent, include_zone: bool) -> String {
    match event.kind {
        EventKind::Entered => {
            if include_zone {
                format!("{} entering {} zone", event.label, event.zone)
            } else {
                format!("{} detected", event.label)
            }
        }
        EventKind::StillPresent => {
            if include_zone {
                format!("{} still in {} zone", event.label, event.zone)
            } else {
                format!("{} still present", event.label)
            }
        }
        EventKind::Left => {
            if include_zone {
                format!("{} leaving {} zone", event.label, event.zone)
            } else {
                format!("{} gone", event.label)
            }
        }
        EventKind::AllClear => "no objects detected".to_string(),
    }
}

/// Producer half of the announcement queue. Holds a receiver clone so a full
/// queue can shed its oldest entry instead of blocking the debounce stage.
pub struct AnnouncementSender {
    tx: Sender<NotificationEvent>,
    rx: Receiver<NotificationEvent>,
    dropped: Arc<AtomicU64>,
}

impl AnnouncementSender {
    /// Enqueue an event, dropping the oldest queued event when full. Never
    /// blocks. Returns false once the consumer is gone.
    pub fn push(&self, event: NotificationEvent) -> bool {
        let mut event = event;
        loop {
            match self.tx.try_send(event) {
                Ok(()) => return true,
                Err(TrySendError::Full(back)) => {
                    if self.rx.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    event = back;
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Build the bounded announcement queue.
pub fn announcement_queue(
    capacity: usize,
    dropped: Arc<AtomicU64>,
) -> (AnnouncementSender, Receiver<NotificationEvent>) {
    let (tx, rx) = bounded(capacity);
    (
        AnnouncementSender {
            tx,
            rx: rx.clone(),
            dropped,
        },
        rx,
    )
}

/// Speech backend that logs utterances. Default for the daemon when no
/// platform TTS engine is wired in.
pub struct LogSpeech {
    settings: SpeechSettings,
}

impl LogSpeech {
    pub fn new(settings: SpeechSettings) -> Self {
        Self { settings }
    }
}

impl Speech for LogSpeech {
    fn speak(&self, text: &str) -> Result<(), PipelineError> {
        log::info!(
            "speak ({}wpm, vol {:.1}): {}",
            self.settings.rate_wpm,
            self.settings.volume,
            text
        );
        Ok(())
    }

    fn cancel(&self) {}
}

/// No-op backend used when voice is disabled; events still flow and are
/// counted, nothing is spoken.
pub struct MuteSpeech;

impl Speech for MuteSpeech {
    fn speak(&self, _text: &str) -> Result<(), PipelineError> {
        Ok(())
    }

    fn cancel(&self) {}
}

/// Test backend that records utterances.
pub struct RecordingSpeech {
    pub spoken: std::sync::Mutex<Vec<String>>,
    pub cancels: AtomicU64,
}

impl RecordingSpeech {
    pub fn new() -> Self {
        Self {
            spoken: std::sync::Mutex::new(Vec::new()),
            cancels: AtomicU64::new(0),
        }
    }

    pub fn phrases(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

impl Default for RecordingSpeech {
    fn default() -> Self {
        Self::new()
    }
}

impl Speech for RecordingSpeech {
    fn speak(&self, text: &str) -> Result<(), PipelineError> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::Zone;
    use std::time::Instant;

    fn event(id: u64, kind: EventKind) -> NotificationEvent {
        NotificationEvent {
            track_id: id,
            label: "person".to_string(),
            zone: Zone::Left,
            kind,
            at: Instant::now(),
        }
    }

    #[test]
    fn phrases_name_class_action_and_zone() {
        let e = event(1, EventKind::Entered);
        assert_eq!(render_phrase(&e, true), "person entering left zone");
        assert_eq!(render_phrase(&e, false), "person detected");

        let e = event(1, EventKind::Left);
        assert_eq!(render_phrase(&e, true), "person leaving left zone");

        let e = event(0, EventKind::AllClear);
        assert_eq!(render_phrase(&e, true), "no objects detected");
    }

    #[test]
    fn full_queue_sheds_oldest_and_counts() {
        let dropped = Arc::new(AtomicU64::new(0));
        let (tx, rx) = announcement_queue(2, dropped.clone());

        for id in 1..=5 {
            assert!(tx.push(event(id, EventKind::Entered)));
        }

        // Capacity held at 2 throughout; the three oldest were shed.
        assert_eq!(tx.dropped(), 3);
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.recv().unwrap().track_id, 4);
        assert_eq!(rx.recv().unwrap().track_id, 5);
    }

    #[test]
    fn queue_survives_consumer_teardown() {
        let dropped = Arc::new(AtomicU64::new(0));
        let (tx, rx) = announcement_queue(2, dropped);
        drop(rx);
        // The sender keeps its own receiver clone; the channel stays alive,
        // but pushes still succeed and will be dropped unheard. This is why
        // the worker's receiver disconnect is signalled via cancellation,
        // not channel teardown.
        assert!(tx.push(event(1, EventKind::Entered)));
    }
}
