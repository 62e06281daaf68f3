/// Audio capture, clip storage, and spectral feature extraction for snorepillow.

pub mod capture;
pub mod decode;
pub mod dsp;
pub mod error;
pub mod mel;
pub mod retention;
pub mod stft;

pub use capture::{AudioCaptureService, FrameSource, SyntheticSource};
#[cfg(feature = "mic")]
pub use capture::MicSource;
pub use error::CaptureError;
