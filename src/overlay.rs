//! Live debug overlay.
//!
//! Shows each working-resolution frame with every detection outlined and
//! captioned with its label and confidence, and the published target
//! highlighted. The window (feature `overlay-window`) is
//! purely diagnostic; the only input it reads is the quit request (`q`,
//! Escape, or closing the window). Without the feature, or when disabled in
//! config, the overlay runs headless and only keeps counters.

use anyhow::Result;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detect::{BoundingBox, Detection};
use crate::frame::{Frame, WorkingResolution};
use crate::state::Target;

pub const WINDOW_TITLE: &str = "vision-pilot";

const DETECTION_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const TARGET_COLOR: Rgb<u8> = Rgb([230, 30, 30]);
const BAR_BACKGROUND: Rgb<u8> = Rgb([40, 40, 40]);
const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BAR_HEIGHT: u32 = 4;
/// Side of one `font8x8` glyph cell.
const GLYPH: i32 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlayEvent {
    Continue,
    Quit,
}

pub struct DebugOverlay {
    #[cfg(feature = "overlay-window")]
    window: Option<minifb::Window>,
    #[cfg(feature = "overlay-window")]
    buffer: Vec<u32>,
    frames_shown: u64,
}

impl DebugOverlay {
    pub fn headless() -> Self {
        Self {
            #[cfg(feature = "overlay-window")]
            window: None,
            #[cfg(feature = "overlay-window")]
            buffer: Vec::new(),
            frames_shown: 0,
        }
    }

    /// Open the overlay window at `position` (absolute desktop coordinates),
    /// or fall back to headless when windows are not compiled in.
    pub fn open(working: WorkingResolution, position: Option<(i32, i32)>) -> Result<Self> {
        #[cfg(feature = "overlay-window")]
        {
            use anyhow::anyhow;

            let mut window = minifb::Window::new(
                WINDOW_TITLE,
                working.width as usize,
                working.height as usize,
                minifb::WindowOptions::default(),
            )
            .map_err(|e| anyhow!("failed to open overlay window: {}", e))?;
            if let Some((x, y)) = position {
                window.set_position(x as isize, y as isize);
            }
            log::info!(
                "overlay window {}x{} at {:?}",
                working.width,
                working.height,
                position
            );
            Ok(Self {
                window: Some(window),
                buffer: vec![0; working.width as usize * working.height as usize],
                frames_shown: 0,
            })
        }
        #[cfg(not(feature = "overlay-window"))]
        {
            let _ = (working, position);
            log::warn!("overlay-window feature not compiled in; running headless");
            Ok(Self::headless())
        }
    }

    pub fn is_headless(&self) -> bool {
        #[cfg(feature = "overlay-window")]
        {
            self.window.is_none()
        }
        #[cfg(not(feature = "overlay-window"))]
        {
            true
        }
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }

    /// Draw detections and the published target onto a copy of `frame`.
    pub fn render(
        frame: &Frame,
        detections: &[Detection],
        target: Option<&Target>,
    ) -> Result<RgbImage> {
        let mut image = frame.to_image()?;
        for detection in detections {
            outline(&mut image, detection.bbox, DETECTION_COLOR);
            confidence_bar(&mut image, detection.bbox, detection.confidence);
            caption(
                &mut image,
                detection.bbox,
                &format!("{} {:.2}", detection.label, detection.confidence),
            );
        }
        if let Some(target) = target {
            outline(&mut image, target.bbox, TARGET_COLOR);
        }
        Ok(image)
    }

    /// Render one frame. Returns `Quit` when the user asked to stop.
    pub fn show(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        target: Option<&Target>,
    ) -> Result<OverlayEvent> {
        self.frames_shown += 1;
        #[cfg(feature = "overlay-window")]
        {
            use anyhow::anyhow;
            use minifb::{Key, KeyRepeat};

            let Some(window) = self.window.as_mut() else {
                return Ok(OverlayEvent::Continue);
            };
            if !window.is_open() {
                return Ok(OverlayEvent::Quit);
            }
            let image = Self::render(frame, detections, target)?;
            let (width, height) = image.dimensions();
            self.buffer.clear();
            self.buffer.extend(
                image
                    .pixels()
                    .map(|p| (u32::from(p[0]) << 16) | (u32::from(p[1]) << 8) | u32::from(p[2])),
            );
            window
                .update_with_buffer(&self.buffer, width as usize, height as usize)
                .map_err(|e| anyhow!("overlay update failed: {}", e))?;
            let quit = window.is_key_pressed(Key::Q, KeyRepeat::No)
                || window.is_key_down(Key::Escape)
                || !window.is_open();
            Ok(if quit {
                OverlayEvent::Quit
            } else {
                OverlayEvent::Continue
            })
        }
        #[cfg(not(feature = "overlay-window"))]
        {
            let _ = (frame, detections, target);
            Ok(OverlayEvent::Continue)
        }
    }

    /// Destroy the window, if any.
    pub fn close(&mut self) {
        #[cfg(feature = "overlay-window")]
        {
            if self.window.take().is_some() {
                log::info!("overlay window closed after {} frames", self.frames_shown);
            }
        }
    }
}

fn outline(image: &mut RgbImage, bbox: BoundingBox, color: Rgb<u8>) {
    let bbox = bbox.clamped(image.width(), image.height());
    if bbox.width() <= 0 || bbox.height() <= 0 {
        return;
    }
    let rect = Rect::at(bbox.x1, bbox.y1).of_size(bbox.width() as u32, bbox.height() as u32);
    draw_hollow_rect_mut(image, rect, color);
}

/// Horizontal bar along the top edge of the box, filled in proportion to
/// the confidence.
fn confidence_bar(image: &mut RgbImage, bbox: BoundingBox, confidence: f32) {
    let bbox = bbox.clamped(image.width(), image.height());
    let width = bbox.width();
    if width <= 0 {
        return;
    }
    let y = (bbox.y1 - BAR_HEIGHT as i32).max(0);
    draw_filled_rect_mut(
        image,
        Rect::at(bbox.x1, y).of_size(width as u32, BAR_HEIGHT),
        BAR_BACKGROUND,
    );
    let filled = (width as f32 * confidence.clamp(0.0, 1.0)).round() as u32;
    if filled > 0 {
        draw_filled_rect_mut(
            image,
            Rect::at(bbox.x1, y).of_size(filled, BAR_HEIGHT),
            DETECTION_COLOR,
        );
    }
}

/// Write `text` just above the confidence bar, or inside the top of the box
/// when there is no room above it.
fn caption(image: &mut RgbImage, bbox: BoundingBox, text: &str) {
    let bbox = bbox.clamped(image.width(), image.height());
    if bbox.width() <= 0 || bbox.height() <= 0 {
        return;
    }
    let above = bbox.y1 - BAR_HEIGHT as i32 - GLYPH - 1;
    let y = if above >= 0 { above } else { bbox.y1 + 2 };
    draw_text_line(image, bbox.x1, y, text, LABEL_COLOR);
}

fn draw_text_line(image: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let (width, height) = (image.width() as i32, image.height() as i32);
    let mut cursor_x = x;
    for ch in text.chars() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            cursor_x += GLYPH;
            continue;
        };
        for (row, &bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH {
                if (bits >> col) & 1 == 0 {
                    continue;
                }
                let (px, py) = (cursor_x + col, y + row as i32);
                if px >= 0 && py >= 0 && px < width && py < height {
                    image.put_pixel(px as u32, py as u32, color);
                }
            }
        }
        cursor_x += GLYPH;
        if cursor_x >= width {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::ClassId;

    fn person(bbox: BoundingBox, confidence: f32) -> Detection {
        Detection::new(bbox, ClassId(0), "person", confidence)
    }

    #[test]
    fn render_outlines_detections_and_target() -> Result<()> {
        let frame = Frame::filled(64, 48, [0, 0, 0]);
        let bbox = BoundingBox::new(10, 10, 30, 30);
        let target = Target {
            bbox,
            confidence: 0.9,
        };
        let image = DebugOverlay::render(&frame, &[person(bbox, 0.9)], Some(&target))?;
        assert_eq!(image.dimensions(), (64, 48));
        assert_eq!(*image.get_pixel(10, 20), TARGET_COLOR);
        assert_eq!(*image.get_pixel(20, 20), Rgb([0, 0, 0]));
        Ok(())
    }

    #[test]
    fn label_is_written_above_the_box() -> Result<()> {
        let frame = Frame::filled(96, 96, [0, 0, 0]);
        let image =
            DebugOverlay::render(&frame, &[person(BoundingBox::new(20, 40, 80, 80), 0.9)], None)?;
        // caption rows sit above the 4px confidence bar
        let lit = (27..35)
            .flat_map(|y| (20..80).map(move |x| (x, y)))
            .filter(|&(x, y)| *image.get_pixel(x, y) == LABEL_COLOR)
            .count();
        assert!(lit > 0);
        Ok(())
    }

    #[test]
    fn label_moves_inside_box_at_top_edge() -> Result<()> {
        let frame = Frame::filled(96, 96, [0, 0, 0]);
        let image =
            DebugOverlay::render(&frame, &[person(BoundingBox::new(20, 2, 80, 60), 0.9)], None)?;
        let lit = (4..12)
            .flat_map(|y| (20..80).map(move |x| (x, y)))
            .filter(|&(x, y)| *image.get_pixel(x, y) == LABEL_COLOR)
            .count();
        assert!(lit > 0);
        Ok(())
    }

    #[test]
    fn degenerate_boxes_are_skipped() -> Result<()> {
        let frame = Frame::filled(16, 16, [5, 5, 5]);
        let image = DebugOverlay::render(
            &frame,
            &[person(BoundingBox::new(40, 40, 50, 50), 0.8)],
            None,
        )?;
        assert!(image.pixels().all(|p| *p == Rgb([5, 5, 5])));
        Ok(())
    }

    #[test]
    fn headless_never_quits() -> Result<()> {
        let mut overlay = DebugOverlay::headless();
        let frame = Frame::filled(8, 8, [0, 0, 0]);
        assert!(overlay.is_headless());
        assert_eq!(overlay.show(&frame, &[], None)?, OverlayEvent::Continue);
        assert_eq!(overlay.frames_shown(), 1);
        overlay.close();
        Ok(())
    }
}
