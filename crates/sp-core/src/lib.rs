/// Configuration, shared state, and common types for snorepillow.
///
/// Every other crate of the workspace depends on this one; it holds no
/// hardware or audio code.

pub mod cancel;
pub mod config;
pub mod error;
pub mod sink;
pub mod store;
pub mod types;

pub use cancel::CancelToken;
pub use config::SystemConfig;
pub use error::CoreError;
pub use sink::{EventSink, NullSink};
pub use store::SharedStateStore;
pub use types::{
    ActivityLogEntry, ClassificationResult, DetectionRecord, ModelVariant, Phase, StatusUpdate,
    SystemStatus, UserId,
};
