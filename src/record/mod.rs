//! Annotated-frame recording.
//!
//! `start()`/`stop()` bracket one output file. The open handle is released
//! exactly once, whether by an explicit `stop()` or by teardown (`Drop`), so
//! an aborted pipeline still leaves a flushed, closed file behind. Failure
//! to open or write is `RecordingUnavailable` and never touches the
//! detection or voice paths.

pub mod container;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::error::PipelineError;
use crate::frame::Frame;
use container::ContainerHeader;

/// Video sink capability: open a destination, append frames, close.
/// `close` must be safe to call more than once.
pub trait VideoSink: Send {
    fn open(
        &mut self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<(), PipelineError>;
    fn append(&mut self, seq: u64, pixels: &[u8]) -> Result<(), PipelineError>;
    fn close(&mut self) -> Result<(), PipelineError>;
}

/// Sink writing the `.wfv` container.
pub struct ContainerSink {
    writer: Option<BufWriter<File>>,
}

impl ContainerSink {
    pub fn new() -> Self {
        Self { writer: None }
    }
}

impl Default for ContainerSink {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSink for ContainerSink {
    fn open(
        &mut self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<(), PipelineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| PipelineError::RecordingUnavailable(e.to_string()))?;
        }
        let file =
            File::create(path).map_err(|e| PipelineError::RecordingUnavailable(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        let header = ContainerHeader { width, height, fps };
        writer
            .write_all(&header.encode())
            .map_err(|e| PipelineError::RecordingUnavailable(e.to_string()))?;
        self.writer = Some(writer);
        Ok(())
    }

    fn append(&mut self, seq: u64, pixels: &[u8]) -> Result<(), PipelineError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| PipelineError::RecordingUnavailable("sink not open".to_string()))?;
        writer
            .write_all(&seq.to_le_bytes())
            .and_then(|_| writer.write_all(pixels))
            .map_err(|e| PipelineError::RecordingUnavailable(e.to_string()))
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .map_err(|e| PipelineError::RecordingUnavailable(e.to_string()))?;
        }
        Ok(())
    }
}

/// Summary returned by `stop()`.
#[derive(Clone, Debug)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub frames_written: u64,
    pub duration: Duration,
}

/// Recorder state machine around a sink. Owned by the recorder stage.
pub struct Recorder {
    sink: Box<dyn VideoSink>,
    open_path: Option<PathBuf>,
    frames_written: u64,
    started_at: Option<Instant>,
}

impl Recorder {
    pub fn new(sink: Box<dyn VideoSink>) -> Self {
        Self {
            sink,
            open_path: None,
            frames_written: 0,
            started_at: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.open_path.is_some()
    }

    /// Open a new output. A recording already in progress is closed first.
    pub fn start(
        &mut self,
        path: PathBuf,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<(), PipelineError> {
        if self.is_recording() {
            self.stop();
        }
        self.sink.open(&path, width, height, fps)?;
        log::info!("recording started: {}", path.display());
        self.open_path = Some(path);
        self.frames_written = 0;
        self.started_at = Some(Instant::now());
        Ok(())
    }

    pub fn write(&mut self, frame: &Frame) -> Result<(), PipelineError> {
        if self.open_path.is_none() {
            return Ok(());
        }
        self.sink.append(frame.seq, frame.data())?;
        self.frames_written += 1;
        Ok(())
    }

    /// Close the current output, flushing buffered frames. Idempotent; a
    /// close failure is logged, never propagated, and still releases the
    /// handle.
    pub fn stop(&mut self) -> Option<RecordingSummary> {
        let path = self.open_path.take()?;
        if let Err(e) = self.sink.close() {
            log::warn!("recording close failed: {}", e);
        }
        let summary = RecordingSummary {
            path,
            frames_written: self.frames_written,
            duration: self.started_at.map(|t| t.elapsed()).unwrap_or_default(),
        };
        log::info!(
            "recording stopped: {} ({} frames, {:.2}s)",
            summary.path.display(),
            summary.frames_written,
            summary.duration.as_secs_f64()
        );
        self.started_at = None;
        summary.into()
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        // Teardown path: release the handle even when nobody called stop().
        self.stop();
    }
}

/// Timestamped output path inside the recordings directory.
pub fn timestamped_path(directory: &Path) -> PathBuf {
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    directory.join(format!("recording_{epoch}.wfv"))
}

/// All recordings in a directory, newest first.
pub fn list_recordings(directory: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(directory) else {
        return Vec::new();
    };
    let mut recordings: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension().is_some_and(|ext| ext == "wfv")
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("recording_"))
        })
        .collect();
    recordings.sort();
    recordings.reverse();
    recordings
}

/// Delete all but the newest `keep` recordings.
pub fn cleanup_old_recordings(directory: &Path, keep: usize) {
    for old in list_recordings(directory).into_iter().skip(keep) {
        match fs::remove_file(&old) {
            Ok(()) => log::info!("removed old recording {}", old.display()),
            Err(e) => log::warn!("could not remove {}: {}", old.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::container::ContainerReader;
    use super::*;

    fn frame(seq: u64, width: u32, height: u32, fill: u8) -> Frame {
        Frame::new(seq, width, height, vec![fill; (width * height * 3) as usize])
    }

    #[test]
    fn start_write_stop_produces_replayable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wfv");

        let mut recorder = Recorder::new(Box::new(ContainerSink::new()));
        recorder.start(path.clone(), 8, 6, 20).unwrap();
        recorder.write(&frame(1, 8, 6, 10)).unwrap();
        recorder.write(&frame(2, 8, 6, 20)).unwrap();
        let summary = recorder.stop().unwrap();
        assert_eq!(summary.frames_written, 2);

        let mut reader = ContainerReader::open(&path).unwrap();
        assert_eq!(reader.header().width, 8);
        assert_eq!(reader.header().fps, 20);
        let (seq, pixels) = reader.next_frame().unwrap().unwrap();
        assert_eq!(seq, 1);
        assert!(pixels.iter().all(|&b| b == 10));
        let (seq, _) = reader.next_frame().unwrap().unwrap();
        assert_eq!(seq, 2);
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::new(Box::new(ContainerSink::new()));
        recorder
            .start(dir.path().join("out.wfv"), 4, 4, 10)
            .unwrap();
        assert!(recorder.stop().is_some());
        assert!(recorder.stop().is_none());
        assert!(recorder.stop().is_none());
    }

    #[test]
    fn drop_flushes_and_closes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wfv");
        {
            let mut recorder = Recorder::new(Box::new(ContainerSink::new()));
            recorder.start(path.clone(), 4, 4, 10).unwrap();
            recorder.write(&frame(1, 4, 4, 7)).unwrap();
            // No stop(): teardown must still flush the buffered frame.
        }
        let mut reader = ContainerReader::open(&path).unwrap();
        assert!(reader.next_frame().unwrap().is_some());
    }

    #[test]
    fn unopenable_destination_is_recording_unavailable() {
        let mut sink = ContainerSink::new();
        let err = sink.open(Path::new("/dev/null/impossible/out.wfv"), 4, 4, 10);
        assert!(matches!(
            err,
            Err(PipelineError::RecordingUnavailable(_))
        ));
    }

    #[test]
    fn cleanup_keeps_newest_recordings() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            let mut recorder = Recorder::new(Box::new(ContainerSink::new()));
            recorder
                .start(dir.path().join(format!("recording_{i:010}.wfv")), 2, 2, 10)
                .unwrap();
            recorder.stop();
        }
        cleanup_old_recordings(dir.path(), 2);
        let left = list_recordings(dir.path());
        assert_eq!(left.len(), 2);
        assert!(left[0].to_string_lossy().contains("0000000004"));
    }
}
