use crate::detect::result::Detection;
use crate::error::PipelineError;

/// Detector backend trait — the capability boundary around the model.
///
/// Backends are interchangeable implementations selected by model name at
/// pipeline start. The contract is deliberately narrow: pixels in,
/// detections out, synchronous. A backend may be arbitrarily slow; the
/// caller owns frame-dropping upstream and must not assume bounded latency.
pub trait DetectorBackend: Send {
    /// Backend identifier, used as the model-selector key.
    fn name(&self) -> &'static str;

    /// Run detection on one RGB24 frame.
    ///
    /// A failure here is per-frame: the caller skips that frame's tracking
    /// update and continues with the next frame.
    fn detect(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, PipelineError>;

    /// Optional warm-up hook, called once before the first frame.
    fn warm_up(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}
