use anyhow::Result;

use crate::frame::Frame;

use super::labels::LabelTable;
use super::result::Detection;

/// Detector backend trait.
///
/// Backends are stateless between calls from the pilot's point of view; any
/// model state is internal. Boxes are returned in the coordinate space of the
/// frame that was passed in, in the order the model produced them.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class vocabulary of the loaded model.
    fn labels(&self) -> &LabelTable;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
