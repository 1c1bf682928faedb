//! Frame sources.
//!
//! A source produces timestamped frames at its native rate until it reaches
//! end of stream or is closed. Sources are the only producers of `Frame`
//! values; everything downstream receives them by ownership transfer.
//!
//! Closing is cross-thread: every source hands out a cloneable
//! [`SourceGate`], and a `close()` on the gate makes an in-flight
//! `next_frame()` return end-of-stream within a bounded delay (sources check
//! the gate at every blocking point, sleeping in short slices).

pub mod camera;
pub mod file;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::PipelineError;
use crate::frame::Frame;

pub use camera::{CameraConfig, CameraSource};
pub use file::{FileConfig, FileSource};

/// Longest uninterruptible sleep inside a source. Bounds how late a source
/// can notice its gate closing.
pub(crate) const GATE_POLL: Duration = Duration::from_millis(25);

/// Cross-thread close handle for a source.
#[derive(Clone, Debug, Default)]
pub struct SourceGate {
    closed: Arc<AtomicBool>,
}

impl SourceGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Safe from any thread; an in-flight `next_frame()` observes this at
    /// its next gate check.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Sleep until the deadline, waking early when the gate closes.
    /// Returns false if the gate closed.
    pub(crate) fn pace_until(&self, deadline: Instant) -> bool {
        loop {
            if self.is_closed() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(GATE_POLL));
        }
    }
}

/// Per-source counters for health logging.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_produced: u64,
    pub description: String,
}

/// The frame-acquisition contract.
pub trait FrameSource: Send {
    /// Open the device or file. Failure is `SourceUnavailable`.
    fn connect(&mut self) -> Result<(), PipelineError>;

    /// Produce the next frame; `Ok(None)` is end of stream. May block
    /// briefly (pacing, hardware readout) but must observe the gate within
    /// a bounded delay.
    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError>;

    /// Close handle usable from other threads.
    fn gate(&self) -> SourceGate;

    fn stats(&self) -> SourceStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_close_interrupts_pacing() {
        let gate = SourceGate::new();
        let waiter = gate.clone();
        let handle = thread::spawn(move || {
            let start = Instant::now();
            let completed = waiter.pace_until(Instant::now() + Duration::from_secs(10));
            (completed, start.elapsed())
        });
        thread::sleep(Duration::from_millis(60));
        gate.close();

        let (completed, waited) = handle.join().unwrap();
        assert!(!completed);
        assert!(waited < Duration::from_secs(1), "waited {waited:?}");
    }

    #[test]
    fn pacing_runs_to_deadline_when_open() {
        let gate = SourceGate::new();
        let deadline = Instant::now() + Duration::from_millis(50);
        assert!(gate.pace_until(deadline));
        assert!(Instant::now() >= deadline);
    }
}
