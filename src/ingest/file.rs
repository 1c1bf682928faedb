//! File frame source.
//!
//! Replays a recorded `.wfv` container, pacing playback to the file's
//! nominal frame rate (or as fast as the consumer pulls, when configured).
//! Optionally loops at end of file, which is how the original player handled
//! demo clips.

use std::path::PathBuf;
use std::time::Instant;

use crate::error::PipelineError;
use crate::frame::Frame;
use crate::record::container::{ContainerHeader, ContainerReader};

use super::{FrameSource, SourceGate, SourceStats};

#[derive(Clone, Debug)]
pub struct FileConfig {
    pub path: PathBuf,
    /// Pace playback to the file's fps; false replays as fast as possible.
    pub pace_playback: bool,
    /// Restart from the first frame at end of file.
    pub loop_playback: bool,
}

impl FileConfig {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            pace_playback: true,
            loop_playback: false,
        }
    }
}

pub struct FileSource {
    config: FileConfig,
    gate: SourceGate,
    reader: Option<ContainerReader>,
    header: Option<ContainerHeader>,
    frame_count: u64,
    next_deadline: Option<Instant>,
}

impl FileSource {
    pub fn new(config: FileConfig) -> Self {
        Self {
            config,
            gate: SourceGate::new(),
            reader: None,
            header: None,
            frame_count: 0,
            next_deadline: None,
        }
    }

    fn open_reader(&mut self) -> Result<(), PipelineError> {
        let reader = ContainerReader::open(&self.config.path)
            .map_err(|e| PipelineError::SourceUnavailable(e.to_string()))?;
        self.header = Some(reader.header());
        self.reader = Some(reader);
        Ok(())
    }

    fn frame_interval(&self) -> Option<std::time::Duration> {
        if !self.config.pace_playback {
            return None;
        }
        let fps = self.header.map(|h| h.fps).unwrap_or(0);
        if fps == 0 {
            return None;
        }
        Some(std::time::Duration::from_secs_f64(1.0 / fps as f64))
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<(), PipelineError> {
        self.open_reader()?;
        let header = self.header.expect("header set by open_reader");
        log::info!(
            "FileSource: opened {} ({}x{}@{}fps)",
            self.config.path.display(),
            header.width,
            header.height,
            header.fps
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        if self.gate.is_closed() {
            return Ok(None);
        }
        let Some(reader) = self.reader.as_mut() else {
            return Err(PipelineError::SourceUnavailable(
                "file source not connected".to_string(),
            ));
        };

        let pixels = match reader
            .next_frame()
            .map_err(|e| PipelineError::SourceUnavailable(e.to_string()))?
        {
            Some((_, pixels)) => pixels,
            None => {
                if !self.config.loop_playback {
                    return Ok(None);
                }
                self.open_reader()?;
                match self
                    .reader
                    .as_mut()
                    .expect("reader reopened")
                    .next_frame()
                    .map_err(|e| PipelineError::SourceUnavailable(e.to_string()))?
                {
                    Some((_, pixels)) => pixels,
                    // An empty file loops into nothing; end the stream
                    // rather than spin.
                    None => return Ok(None),
                }
            }
        };

        if let Some(interval) = self.frame_interval() {
            let deadline = self.next_deadline.unwrap_or_else(Instant::now);
            if !self.gate.pace_until(deadline) {
                return Ok(None);
            }
            let now = Instant::now();
            let behind = now.checked_sub(interval).unwrap_or(now);
            self.next_deadline = Some(deadline.max(behind) + interval);
        }

        let header = self.header.expect("header set on connect");
        // Sequence numbers restart on loop, so the session sees its own
        // monotonic numbering.
        self.frame_count += 1;
        Ok(Some(Frame::new(
            self.frame_count,
            header.width,
            header.height,
            pixels,
        )))
    }

    fn gate(&self) -> SourceGate {
        self.gate.clone()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_produced: self.frame_count,
            description: format!("file:{}", self.config.path.display()),
        }
    }
}
