use sp_actuator::ActuatorError;
use sp_audio::CaptureError;
use sp_infer::InferenceError;
use thiserror::Error;

/// Failure of a request-facing orchestrator operation.
#[derive(Error, Debug)]
pub enum ControlError {
    /// Actuator or audio device absent or failing.
    #[error("Hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// Cycle aborted during capture.
    #[error("Capture failed: {0}")]
    Capture(CaptureError),

    /// Cycle aborted during classification.
    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),

    /// Parameter out of range; nothing was changed.
    #[error("{0}")]
    Validation(String),

    /// Actuation could not be started or completed.
    #[error("Sequence failed: {0}")]
    Sequence(String),

    /// A capture or actuation sequence is already in progress.
    #[error("{0}")]
    Busy(String),
}

impl From<CaptureError> for ControlError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::Busy => Self::Busy(e.to_string()),
            CaptureError::NoInputDevice => Self::HardwareUnavailable(e.to_string()),
            other => Self::Capture(other),
        }
    }
}

impl From<ActuatorError> for ControlError {
    fn from(e: ActuatorError) -> Self {
        match e {
            ActuatorError::InvalidChannel(_) | ActuatorError::InvalidAction(_) => Self::Validation(e.to_string()),
            ActuatorError::Unavailable | ActuatorError::Pin(_) => Self::HardwareUnavailable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_errors_map_to_kinds() {
        assert!(matches!(ControlError::from(CaptureError::Busy), ControlError::Busy(_)));
        assert!(matches!(ControlError::from(CaptureError::NoFrames), ControlError::Capture(_)));
        assert!(matches!(
            ControlError::from(ActuatorError::InvalidChannel(3)),
            ControlError::Validation(_)
        ));
        assert!(matches!(
            ControlError::from(ActuatorError::Unavailable),
            ControlError::HardwareUnavailable(_)
        ));
        assert!(matches!(
            ControlError::from(InferenceError::ModelUnloaded),
            ControlError::Inference(_)
        ));
    }
}
