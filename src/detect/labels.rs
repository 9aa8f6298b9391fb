use anyhow::{anyhow, Result};

use super::result::ClassId;

/// The 80-class COCO vocabulary used by stock YOLOv8 exports.
pub const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// Class label table of a detector backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn coco() -> Self {
        Self::new(COCO_LABELS)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn name(&self, class: ClassId) -> Option<&str> {
        self.labels.get(class.0).map(String::as_str)
    }

    /// Resolve a configured label once at startup. Fails if the model does
    /// not know the label.
    pub fn resolve(&self, label: &str) -> Result<ClassId> {
        let wanted = label.trim();
        self.labels
            .iter()
            .position(|l| l.eq_ignore_ascii_case(wanted))
            .map(ClassId)
            .ok_or_else(|| {
                anyhow!(
                    "target label '{}' is not in the detector vocabulary ({} labels)",
                    wanted,
                    self.labels.len()
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_person_in_coco() -> Result<()> {
        let table = LabelTable::coco();
        assert_eq!(table.len(), 80);
        assert_eq!(table.resolve("person")?, ClassId(0));
        assert_eq!(table.resolve(" Person ")?, ClassId(0));
        assert_eq!(table.name(ClassId(2)), Some("car"));
        Ok(())
    }

    #[test]
    fn unknown_label_fails_fast() {
        let table = LabelTable::new(["cat", "dog"]);
        let err = table.resolve("person").unwrap_err();
        assert!(err.to_string().contains("not in the detector vocabulary"));
    }
}
