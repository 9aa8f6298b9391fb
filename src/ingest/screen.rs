//! Screen-region frame source.
//!
//! `ScreenSource` captures a fixed rectangle of the desktop and normalizes
//! it to the working resolution. Real capture uses `xcap` (feature
//! `capture-xcap`); the `stub` backend produces synthetic frames for tests,
//! the demo and dry runs on machines without a display.

use anyhow::Result;
#[cfg(feature = "capture-xcap")]
use anyhow::{anyhow, Context};
use serde::Deserialize;

use super::{DisplayInfo, FrameSource, SourceStats};
use crate::frame::{CaptureRegion, Frame, WorkingResolution};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackend {
    #[default]
    Screen,
    Stub,
}

impl CaptureBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "screen" => Some(Self::Screen),
            "stub" => Some(Self::Stub),
            _ => None,
        }
    }
}

/// Configuration for a screen source.
#[derive(Clone, Debug, PartialEq)]
pub struct ScreenConfig {
    pub backend: CaptureBackend,
    /// Absolute display rectangle to capture.
    pub region: CaptureRegion,
    /// Size every frame is resized to.
    pub working: WorkingResolution,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            backend: CaptureBackend::Screen,
            // Upper right 640x480 game window plus its 30px title bar on a
            // 1920-wide primary display.
            region: CaptureRegion::new(1280, 0, 1920, 510),
            working: WorkingResolution::default(),
        }
    }
}

/// Screen frame source.
pub struct ScreenSource {
    backend: ScreenBackend,
    working: WorkingResolution,
    frames_captured: u64,
}

enum ScreenBackend {
    Synthetic(SyntheticScreen),
    #[cfg(feature = "capture-xcap")]
    Xcap(XcapScreen),
}

impl ScreenSource {
    pub fn new(config: ScreenConfig) -> Result<Self> {
        if config.region.is_empty() {
            anyhow::bail!("capture region {:?} is empty", config.region);
        }
        let backend = match config.backend {
            CaptureBackend::Stub => ScreenBackend::Synthetic(SyntheticScreen::new(config.region)),
            CaptureBackend::Screen => {
                #[cfg(feature = "capture-xcap")]
                {
                    ScreenBackend::Xcap(XcapScreen::new(config.region))
                }
                #[cfg(not(feature = "capture-xcap"))]
                {
                    anyhow::bail!("screen capture requires the capture-xcap feature")
                }
            }
        };
        Ok(Self {
            backend,
            working: config.working,
            frames_captured: 0,
        })
    }
}

impl FrameSource for ScreenSource {
    fn name(&self) -> &'static str {
        match &self.backend {
            ScreenBackend::Synthetic(_) => "stub",
            #[cfg(feature = "capture-xcap")]
            ScreenBackend::Xcap(_) => "xcap",
        }
    }

    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            ScreenBackend::Synthetic(screen) => screen.connect(),
            #[cfg(feature = "capture-xcap")]
            ScreenBackend::Xcap(screen) => screen.connect(),
        }
    }

    fn displays(&self) -> Result<Vec<DisplayInfo>> {
        match &self.backend {
            ScreenBackend::Synthetic(_) => Ok(SyntheticScreen::displays()),
            #[cfg(feature = "capture-xcap")]
            ScreenBackend::Xcap(_) => XcapScreen::displays(),
        }
    }

    /// Capture the region and resize it to the working resolution.
    fn next_frame(&mut self) -> Result<Frame> {
        let raw = match &mut self.backend {
            ScreenBackend::Synthetic(screen) => screen.next_frame()?,
            #[cfg(feature = "capture-xcap")]
            ScreenBackend::Xcap(screen) => screen.next_frame()?,
        };
        self.frames_captured += 1;
        raw.normalize(self.working)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            backend: self.name(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub backend)
// ----------------------------------------------------------------------------

struct SyntheticScreen {
    region: CaptureRegion,
    frame_count: u64,
}

impl SyntheticScreen {
    fn new(region: CaptureRegion) -> Self {
        Self {
            region,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("ScreenSource: capturing {:?} (synthetic)", self.region);
        Ok(())
    }

    /// A virtual dual-head desktop: game on the primary display, overlay on
    /// the second.
    fn displays() -> Vec<DisplayInfo> {
        vec![
            DisplayInfo {
                name: "stub-0".to_string(),
                x: 0,
                y: 0,
                width: 1920,
                height: 1080,
                primary: true,
            },
            DisplayInfo {
                name: "stub-1".to_string(),
                x: 1920,
                y: 0,
                width: 1920,
                height: 1080,
                primary: false,
            },
        ]
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        let width = self.region.width();
        let height = self.region.height();
        let shift = self.frame_count;
        let mut pixels = vec![0u8; width as usize * height as usize * 3];
        for (i, px) in pixels.chunks_exact_mut(3).enumerate() {
            let x = (i % width as usize) as u64;
            let y = (i / width as usize) as u64;
            px[0] = ((x + shift) % 256) as u8;
            px[1] = ((y + shift / 2) % 256) as u8;
            px[2] = 96;
        }
        Frame::from_rgb(pixels, width, height)
    }
}

// ----------------------------------------------------------------------------
// xcap source
// ----------------------------------------------------------------------------

#[cfg(feature = "capture-xcap")]
struct XcapScreen {
    region: CaptureRegion,
    monitor: Option<xcap::Monitor>,
}

#[cfg(feature = "capture-xcap")]
impl XcapScreen {
    fn new(region: CaptureRegion) -> Self {
        Self {
            region,
            monitor: None,
        }
    }

    fn displays() -> Result<Vec<DisplayInfo>> {
        let monitors = xcap::Monitor::all().map_err(|e| anyhow!("failed to list displays: {}", e))?;
        Ok(monitors
            .iter()
            .map(|m| DisplayInfo {
                name: m.name().to_string(),
                x: m.x(),
                y: m.y(),
                width: m.width(),
                height: m.height(),
                primary: m.is_primary(),
            })
            .collect())
    }

    fn connect(&mut self) -> Result<()> {
        let monitor = xcap::Monitor::from_point(self.region.left, self.region.top)
            .map_err(|e| anyhow!("no display contains {:?}: {}", self.region, e))?;
        let inside_x = self.region.right <= monitor.x() + monitor.width() as i32;
        let inside_y = self.region.bottom <= monitor.y() + monitor.height() as i32;
        if !inside_x || !inside_y {
            return Err(anyhow!(
                "capture region {:?} spans beyond display '{}'",
                self.region,
                monitor.name()
            ));
        }
        log::info!(
            "ScreenSource: capturing {:?} on display '{}'",
            self.region,
            monitor.name()
        );
        self.monitor = Some(monitor);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let monitor = self
            .monitor
            .as_ref()
            .ok_or_else(|| anyhow!("screen source not connected"))?;
        let image = monitor
            .capture_image()
            .map_err(|e| anyhow!("screen capture failed: {}", e))?;
        let (src_width, src_height) = (image.width(), image.height());
        let rgba = super::crop::crop_rgba(
            &image.into_raw(),
            src_width,
            src_height,
            (self.region.left - monitor.x()) as u32,
            (self.region.top - monitor.y()) as u32,
            self.region.width(),
            self.region.height(),
        )
        .context("capture region does not fit the captured display")?;
        Frame::from_rgba(&rgba, self.region.width(), self.region.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> ScreenConfig {
        ScreenConfig {
            backend: CaptureBackend::Stub,
            ..ScreenConfig::default()
        }
    }

    #[test]
    fn stub_frames_are_normalized() -> Result<()> {
        let mut source = ScreenSource::new(stub_config())?;
        source.connect()?;
        let frame = source.next_frame()?;
        assert_eq!((frame.width, frame.height), (640, 480));
        assert_eq!(source.stats().frames_captured, 1);
        assert_eq!(source.name(), "stub");
        Ok(())
    }

    #[test]
    fn stub_reports_two_displays() -> Result<()> {
        let source = ScreenSource::new(stub_config())?;
        let displays = source.displays()?;
        assert_eq!(displays.len(), 2);
        assert!(displays[0].primary);
        Ok(())
    }

    #[test]
    fn stub_desktop_fails_a_three_display_requirement() -> Result<()> {
        let source = ScreenSource::new(stub_config())?;
        let displays = source.displays()?;
        assert!(super::super::require_displays(&displays, 2).is_ok());
        let err = super::super::require_displays(&displays, 3).unwrap_err();
        assert!(err.to_string().contains("at least 3"));
        Ok(())
    }

    #[test]
    fn empty_region_is_rejected() {
        let config = ScreenConfig {
            region: CaptureRegion::new(0, 0, 0, 480),
            ..stub_config()
        };
        assert!(ScreenSource::new(config).is_err());
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!(CaptureBackend::parse("Screen"), Some(CaptureBackend::Screen));
        assert_eq!(CaptureBackend::parse("stub"), Some(CaptureBackend::Stub));
        assert_eq!(CaptureBackend::parse("rtsp"), None);
    }
}
