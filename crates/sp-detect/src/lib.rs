/// Detection orchestration: capture, classify, and drive the pillow
/// actuation sequence, plus the supervisory auto-run loop and the manual
/// operations exposed to a request layer.

pub mod error;
pub mod orchestrator;
pub mod report;
mod sequence;
mod supervisor;

pub use error::ControlError;
pub use orchestrator::{Components, DetectionOrchestrator};
pub use report::{CycleReport, Settings, SystemInfo};
