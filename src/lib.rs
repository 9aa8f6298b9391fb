//! vision-pilot
//!
//! Watches a fixed region of the screen, runs an object detector over every
//! captured frame and turns the detected target into simulated pointer and
//! keyboard input for whatever window has focus.
//!
//! # Architecture
//!
//! One producer, two consumers:
//!
//! - The **detection loop** (`pilot`) runs on the main thread. Each cycle it
//!   captures a frame, runs the detector, selects the target detection and
//!   publishes it to the shared state. It is the only writer.
//! - The **aim controller** (`control::aim`) steers the pointer toward the
//!   target and clicks once it is centered.
//! - The **advance controller** (`control::advance`) pulses the forward key
//!   while a target is visible.
//!
//! Controllers block on `state::SharedDetection` until a new target is
//! published and act at most once per publish. Shutdown is cooperative: the
//! shared state carries a shutdown flag that wakes every waiter.
//!
//! # Module Structure
//!
//! - `frame`: captured frames, capture region, working resolution
//! - `ingest`: frame sources (screen capture, synthetic stub)
//! - `detect`: detector trait, backends, label tables
//! - `state`: shared detection state
//! - `pilot`: the detection loop and target selection
//! - `control`: aim and advance controllers
//! - `action`: input-injection sinks
//! - `overlay`: live debug overlay
//! - `config`: file and environment configuration

pub mod action;
pub mod config;
pub mod control;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod pilot;
pub mod state;
pub mod ui;

pub use action::{ActionCommand, ActionSink, LogSink, MouseButton, RecordingSink, SinkError};
pub use config::PilotConfig;
pub use control::{
    spawn_controller, AdvanceController, AdvancePolicy, AimController, AimPolicy,
    ControllerHandle,
};
pub use detect::{
    BackendRegistry, BoundingBox, ClassId, Detection, DetectorBackend, LabelTable, ModelOptions,
    ScriptedBackend,
};
pub use frame::{CaptureRegion, Frame, WorkingResolution};
pub use ingest::{CaptureBackend, FrameSource, ScreenConfig, ScreenSource};
pub use overlay::DebugOverlay;
pub use pilot::{DetectionLoop, LoopSettings, SelectionPolicy, StopReason};
pub use state::{SharedDetection, Target};
