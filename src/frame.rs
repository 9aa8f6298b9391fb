//! Captured frames and working-resolution normalization.
//!
//! - `Frame`: owned RGB8 pixel grid for one detection cycle.
//! - `CaptureRegion`: the fixed display rectangle a frame is taken from.
//! - `WorkingResolution`: the downscaled size all inference and steering
//!   math happens in.
//!
//! A `Frame` is produced by an ingest source, consumed by the detection loop
//! and dropped at the end of the cycle. It is intentionally not `Clone`.

use std::time::Instant;

use anyhow::{anyhow, Result};
use image::{imageops, imageops::FilterType, RgbImage};
use serde::Deserialize;

/// Absolute display rectangle `(left, top, right, bottom)`, right/bottom exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct CaptureRegion {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl CaptureRegion {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> u32 {
        (self.right - self.left).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top).max(0) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Parse `left,top,right,bottom`.
    pub fn parse(value: &str) -> Result<Self> {
        let parts: Vec<i32> = value
            .split(',')
            .map(|p| p.trim().parse::<i32>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| anyhow!("region must be four integers: left,top,right,bottom"))?;
        match parts.as_slice() {
            [left, top, right, bottom] => Ok(Self::new(*left, *top, *right, *bottom)),
            _ => Err(anyhow!("region must be four integers: left,top,right,bottom")),
        }
    }
}

/// Fixed frame size used for inference and coordinate math.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct WorkingResolution {
    pub width: u32,
    pub height: u32,
}

impl Default for WorkingResolution {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// One captured RGB8 frame.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    captured_at: Instant,
}

impl Frame {
    /// Build a frame from tightly packed RGB8 bytes.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            captured_at: Instant::now(),
        })
    }

    /// Build a frame from RGBA8 bytes, dropping alpha.
    pub fn from_rgba(rgba: &[u8], width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| anyhow!("RGBA frame dimensions overflow"))?;
        if rgba.len() != expected {
            return Err(anyhow!(
                "RGBA frame length mismatch: expected {}, got {}",
                expected,
                rgba.len()
            ));
        }
        let data = rgba
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        Self::from_rgb(data, width, height)
    }

    /// Solid-color frame (synthetic sources and tests).
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb.repeat(width as usize * height as usize);
        Self {
            data,
            width,
            height,
            captured_at: Instant::now(),
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Resize to the working resolution. Returns `self` untouched when the
    /// size already matches. The capture timestamp is preserved.
    pub fn normalize(self, working: WorkingResolution) -> Result<Self> {
        if self.width == working.width && self.height == working.height {
            return Ok(self);
        }
        let captured_at = self.captured_at;
        let image = self.into_image()?;
        let resized = imageops::resize(&image, working.width, working.height, FilterType::Triangle);
        let mut frame = Self::from_rgb(resized.into_raw(), working.width, working.height)?;
        frame.captured_at = captured_at;
        Ok(frame)
    }

    /// Copy of the pixels as an `image` buffer, for drawing.
    pub fn to_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))
    }

    fn into_image(self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data)
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))
    }
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))
}
