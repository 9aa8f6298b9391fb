mod backend;
pub mod backends;
mod labels;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::{non_max_suppression, ScriptedBackend};
pub use labels::{LabelTable, COCO_LABELS};
pub use registry::{BackendRegistry, ModelOptions};
pub use result::{BoundingBox, ClassId, Detection};

#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
