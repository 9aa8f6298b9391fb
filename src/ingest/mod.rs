//! Frame ingestion sources.
//!
//! Sources produce `Frame` instances already normalized to the working
//! resolution. The ingestion layer is responsible for:
//! - Capturing the fixed display region configured at startup
//! - Resizing to the working resolution
//! - Reporting attached displays for startup environment checks
//!
//! The ingestion layer MUST NOT retain frames after handing them off.

mod crop;
pub mod screen;

use anyhow::Result;

use crate::frame::Frame;

pub use screen::{CaptureBackend, ScreenConfig, ScreenSource};

/// One attached display, in absolute desktop coordinates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayInfo {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub primary: bool,
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub backend: &'static str,
}

/// Producer of working-resolution frames.
pub trait FrameSource {
    fn name(&self) -> &'static str;

    /// Open the capture backend.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Displays visible to this source.
    fn displays(&self) -> Result<Vec<DisplayInfo>>;

    /// Capture the next frame. Failures are not retried.
    fn next_frame(&mut self) -> Result<Frame>;

    fn stats(&self) -> SourceStats;
}

/// Fail when fewer than `required` displays are attached.
pub fn require_displays(displays: &[DisplayInfo], required: usize) -> Result<()> {
    if displays.len() < required {
        anyhow::bail!(
            "expected at least {} display(s), found {}",
            required,
            displays.len()
        );
    }
    Ok(())
}

/// The first non-primary display, where the debug overlay is placed.
pub fn secondary_display(displays: &[DisplayInfo]) -> Option<&DisplayInfo> {
    displays.iter().find(|d| !d.primary).or(displays.get(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display(name: &str, x: i32, primary: bool) -> DisplayInfo {
        DisplayInfo {
            name: name.to_string(),
            x,
            y: 0,
            width: 1920,
            height: 1080,
            primary,
        }
    }

    #[test]
    fn display_requirement() {
        let one = vec![display("a", 0, true)];
        assert!(require_displays(&one, 1).is_ok());
        assert!(require_displays(&one, 2).is_err());
        assert!(require_displays(&[], 0).is_ok());
    }

    #[test]
    fn secondary_prefers_non_primary() {
        let displays = vec![display("b", 1920, false), display("a", 0, true)];
        assert_eq!(secondary_display(&displays).map(|d| d.x), Some(1920));
        assert!(secondary_display(&displays[1..]).is_none());
    }
}
