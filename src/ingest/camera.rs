//! Camera frame source.
//!
//! Hardware capture is an external capability; this backend synthesizes a
//! paced camera feed with one bright object sweeping across the frame, which
//! exercises the whole pipeline (the stub detector finds the object, tracks
//! cross all three zones). A real capture backend slots in behind the same
//! `FrameSource` contract.

use std::time::Instant;

use crate::error::PipelineError;
use crate::frame::Frame;

use super::{FrameSource, SourceGate, SourceStats};

/// Background pixel values stay far below the stub detector's luminance
/// threshold.
const BACKGROUND_LEVELS: u8 = 60;

#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device index: 0 internal, 1+ external.
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 640,
            height: 480,
            fps: 20,
        }
    }
}

pub struct CameraSource {
    config: CameraConfig,
    gate: SourceGate,
    connected: bool,
    frame_count: u64,
    next_deadline: Option<Instant>,
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            gate: SourceGate::new(),
            connected: false,
            frame_count: 0,
            next_deadline: None,
        }
    }

    fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.config.fps.max(1) as f64)
    }

    /// Paint the background pattern and the moving object. The object sweeps
    /// left-to-right and wraps, ~8 seconds per crossing at the default rate.
    fn generate_pixels(&self) -> Vec<u8> {
        let width = self.config.width;
        let height = self.config.height;
        let mut pixels = vec![0u8; (width * height * 3) as usize];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count) % BACKGROUND_LEVELS as u64) as u8;
        }

        let side = (width / 6).max(4);
        let sweep = (width - side).max(1) as u64;
        let step = (width as u64 / (8 * self.config.fps.max(1) as u64)).max(1);
        let x0 = (self.frame_count * step) % sweep;
        let y0 = (height.saturating_sub(side)) / 2;

        for y in y0..(y0 + side).min(height) {
            for x in x0 as u32..(x0 as u32 + side).min(width) {
                let idx = ((y * width + x) * 3) as usize;
                pixels[idx..idx + 3].copy_from_slice(&[255, 255, 255]);
            }
        }
        pixels
    }
}

impl FrameSource for CameraSource {
    fn connect(&mut self) -> Result<(), PipelineError> {
        if self.config.width == 0 || self.config.height == 0 {
            return Err(PipelineError::SourceUnavailable(format!(
                "camera {} has empty frame dimensions",
                self.config.index
            )));
        }
        log::info!(
            "CameraSource: opened device {} at {}x{}@{}fps (synthetic)",
            self.config.index,
            self.config.width,
            self.config.height,
            self.config.fps
        );
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        if !self.connected {
            return Err(PipelineError::SourceUnavailable(
                "camera not connected".to_string(),
            ));
        }
        if self.gate.is_closed() {
            return Ok(None);
        }

        // Pace to the native rate; the first frame goes out immediately.
        let deadline = self.next_deadline.unwrap_or_else(Instant::now);
        if !self.gate.pace_until(deadline) {
            return Ok(None);
        }
        // Schedule from the deadline, not from now, so jitter does not
        // accumulate; a slow consumer resets the schedule instead of
        // building up debt.
        let now = Instant::now();
        let behind = now.checked_sub(self.frame_interval()).unwrap_or(now);
        self.next_deadline = Some(deadline.max(behind) + self.frame_interval());

        let pixels = self.generate_pixels();
        self.frame_count += 1;
        Ok(Some(Frame::new(
            self.frame_count,
            self.config.width,
            self.config.height,
            pixels,
        )))
    }

    fn gate(&self) -> SourceGate {
        self.gate.clone()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_produced: self.frame_count,
            description: format!("camera:{}", self.config.index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CameraConfig {
        CameraConfig {
            index: 0,
            width: 96,
            height: 48,
            fps: 1000,
        }
    }

    #[test]
    fn produces_frames_with_configured_dimensions() {
        let mut source = CameraSource::new(fast_config());
        source.connect().unwrap();

        let frame = source.next_frame().unwrap().expect("frame");
        assert_eq!(frame.width, 96);
        assert_eq!(frame.height, 48);
        assert_eq!(frame.seq, 1);
        assert_eq!(frame.byte_len(), 96 * 48 * 3);
    }

    #[test]
    fn object_moves_between_frames() {
        let mut source = CameraSource::new(fast_config());
        source.connect().unwrap();

        let a = source.next_frame().unwrap().unwrap();
        let mut b = None;
        for _ in 0..20 {
            b = source.next_frame().unwrap();
        }
        assert_ne!(a.data(), b.unwrap().data());
    }

    #[test]
    fn closed_gate_yields_end_of_stream() {
        let mut source = CameraSource::new(fast_config());
        source.connect().unwrap();
        source.gate().close();
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn next_frame_before_connect_is_source_unavailable() {
        let mut source = CameraSource::new(fast_config());
        assert!(matches!(
            source.next_frame(),
            Err(PipelineError::SourceUnavailable(_))
        ));
    }
}
