use std::collections::VecDeque;

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::labels::LabelTable;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

enum Step {
    Detections(Vec<Detection>),
    Fail(String),
}

/// Scripted backend for tests and the synthetic demo.
///
/// Each `detect` call pops the next scripted step. When the script runs out
/// the backend returns no detections, or restarts the script when built with
/// `cycling()`.
pub struct ScriptedBackend {
    labels: LabelTable,
    script: VecDeque<Step>,
    played: Vec<Step>,
    cycle: bool,
}

impl ScriptedBackend {
    pub fn new(labels: LabelTable) -> Self {
        Self {
            labels,
            script: VecDeque::new(),
            played: Vec::new(),
            cycle: false,
        }
    }

    pub fn coco() -> Self {
        Self::new(LabelTable::coco())
    }

    pub fn cycling(mut self) -> Self {
        self.cycle = true;
        self
    }

    /// Queue the detections returned for one frame.
    pub fn then(mut self, detections: Vec<Detection>) -> Self {
        self.script.push_back(Step::Detections(detections));
        self
    }

    /// Queue a single labeled box for one frame.
    pub fn then_box(self, label: &str, bbox: BoundingBox, confidence: f32) -> Self {
        let detection = self.detection(label, bbox, confidence);
        self.then(detection.into_iter().collect())
    }

    /// Queue an empty frame.
    pub fn then_nothing(self) -> Self {
        self.then(Vec::new())
    }

    /// Queue an inference failure.
    pub fn then_fail(mut self, message: &str) -> Self {
        self.script.push_back(Step::Fail(message.to_string()));
        self
    }

    /// Build a detection using this backend's label table. Unknown labels
    /// yield `None`.
    pub fn detection(&self, label: &str, bbox: BoundingBox, confidence: f32) -> Option<Detection> {
        let class = self.labels.resolve(label).ok()?;
        Some(Detection::new(bbox, class, label, confidence))
    }

    fn next_step(&mut self) -> Option<Step> {
        if self.script.is_empty() && self.cycle && !self.played.is_empty() {
            self.script.extend(self.played.drain(..));
        }
        self.script.pop_front()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn labels(&self) -> &LabelTable {
        &self.labels
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        match self.next_step() {
            Some(Step::Detections(detections)) => {
                let out = detections.clone();
                if self.cycle {
                    self.played.push(Step::Detections(detections));
                }
                Ok(out)
            }
            Some(Step::Fail(message)) => {
                let err = anyhow!("scripted inference failure: {}", message);
                if self.cycle {
                    self.played.push(Step::Fail(message));
                }
                Err(err)
            }
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_script_then_goes_quiet() -> Result<()> {
        let frame = Frame::filled(4, 4, [0, 0, 0]);
        let mut backend = ScriptedBackend::coco()
            .then_box("person", BoundingBox::new(1, 1, 3, 3), 0.9)
            .then_fail("gpu lost");

        let first = backend.detect(&frame)?;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].label, "person");
        assert!(backend.detect(&frame).is_err());
        assert!(backend.detect(&frame)?.is_empty());
        Ok(())
    }

    #[test]
    fn cycling_script_repeats() -> Result<()> {
        let frame = Frame::filled(4, 4, [0, 0, 0]);
        let mut backend = ScriptedBackend::coco()
            .then_box("person", BoundingBox::new(0, 0, 2, 2), 0.8)
            .then_nothing()
            .cycling();

        let lens: Vec<usize> = (0..5)
            .map(|_| backend.detect(&frame).map(|d| d.len()))
            .collect::<Result<_>>()?;
        assert_eq!(lens, vec![1, 0, 1, 0, 1]);
        Ok(())
    }
}
