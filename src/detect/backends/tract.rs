#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::labels::LabelTable;
use crate::detect::result::{BoundingBox, ClassId, Detection};
use crate::frame::Frame;

use super::non_max_suppression;

type YoloPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

const LETTERBOX_FILL: u8 = 114;

/// Tract-based backend for YOLOv8 ONNX exports.
///
/// The model is expected to take a `1x3xSxS` float input in `[0, 1]` and to
/// produce `1x(4+C)xN` (or `1xNx(4+C)`) rows of `cx, cy, w, h, class scores`.
/// Frames are letterboxed into the square input and boxes are mapped back
/// into frame coordinates.
pub struct TractBackend {
    model: YoloPlan,
    labels: LabelTable,
    input_size: u32,
    confidence_floor: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32, labels: LabelTable) -> Result<Self> {
        let model_path = model_path.as_ref();
        if input_size == 0 {
            return Err(anyhow!("model input size must be non-zero"));
        }
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_size as usize, input_size as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            labels,
            input_size,
            confidence_floor: 0.25,
            iou_threshold: 0.45,
        })
    }

    /// Override the minimum score a box needs to be reported at all.
    pub fn with_confidence_floor(mut self, floor: f32) -> Self {
        self.confidence_floor = floor;
        self
    }

    /// Override the NMS overlap threshold.
    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<(Tensor, f32)> {
        let image = frame.to_image()?;
        let (canvas, scale) = letterbox(&image, self.input_size);
        let size = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            canvas.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok((input.into_tensor(), scale))
    }

    fn decode(&self, outputs: TVec<TValue>, scale: f32, frame: &Frame) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }

        let attrs = 4 + self.labels.len();
        let (rows, channels_first) = if shape[1] == attrs {
            (shape[2], true)
        } else if shape[2] == attrs {
            (shape[1], false)
        } else {
            return Err(anyhow!(
                "model output shape {:?} does not match {} labels",
                shape,
                self.labels.len()
            ));
        };
        let at = |row: usize, attr: usize| {
            if channels_first {
                view[[0, attr, row]]
            } else {
                view[[0, row, attr]]
            }
        };

        let mut candidates = Vec::new();
        for row in 0..rows {
            let (class, score) = (0..self.labels.len())
                .map(|c| (c, at(row, 4 + c)))
                .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
            if !score.is_finite() || score < self.confidence_floor {
                continue;
            }
            let (cx, cy, w, h) = (at(row, 0), at(row, 1), at(row, 2), at(row, 3));
            let bbox = BoundingBox::new(
                ((cx - w / 2.0) / scale).round() as i32,
                ((cy - h / 2.0) / scale).round() as i32,
                ((cx + w / 2.0) / scale).round() as i32,
                ((cy + h / 2.0) / scale).round() as i32,
            )
            .clamped(frame.width, frame.height);
            let class = ClassId(class);
            let label = self.labels.name(class).unwrap_or("unknown");
            candidates.push(Detection::new(bbox, class, label, score.min(1.0)));
        }

        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn labels(&self) -> &LabelTable {
        &self.labels
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let (input, scale) = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, scale, frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::filled(self.input_size, self.input_size, [0, 0, 0]);
        self.detect(&blank).map(|_| ())
    }
}

/// Scale `image` to fit a `size x size` square (top-left aligned), padding
/// the remainder. Returns the canvas and the applied scale factor.
fn letterbox(image: &RgbImage, size: u32) -> (RgbImage, f32) {
    let scale = (size as f32 / image.width() as f32).min(size as f32 / image.height() as f32);
    let w = ((image.width() as f32 * scale).round() as u32).clamp(1, size);
    let h = ((image.height() as f32 * scale).round() as u32).clamp(1, size);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([LETTERBOX_FILL; 3]));
    if w == image.width() && h == image.height() {
        imageops::replace(&mut canvas, image, 0, 0);
    } else {
        let resized = imageops::resize(image, w, h, FilterType::Triangle);
        imageops::replace(&mut canvas, &resized, 0, 0);
    }
    (canvas, scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letterbox_keeps_working_frame_unscaled() {
        let image = RgbImage::from_pixel(640, 480, Rgb([1, 2, 3]));
        let (canvas, scale) = letterbox(&image, 640);
        assert_eq!(scale, 1.0);
        assert_eq!(canvas.dimensions(), (640, 640));
        assert_eq!(canvas.get_pixel(10, 10), &Rgb([1, 2, 3]));
        assert_eq!(canvas.get_pixel(10, 600), &Rgb([LETTERBOX_FILL; 3]));
    }
}
