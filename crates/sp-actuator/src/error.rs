use thiserror::Error;

/// Errors originating from the actuator controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActuatorError {
    /// Channel number outside 1..=2.
    #[error("Invalid channel {0} (must be 1 or 2)")]
    InvalidChannel(u8),

    /// Unrecognised on/off keyword.
    #[error("Invalid action '{0}' (must be on or off)")]
    InvalidAction(String),

    /// Pin initialization failed; the controller is permanently degraded.
    #[error("GPIO not available")]
    Unavailable,

    /// A pin write failed.
    #[error("Pin error: {0}")]
    Pin(String),
}
