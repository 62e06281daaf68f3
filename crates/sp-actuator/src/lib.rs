/// Pump and valve actuation for the two pillow air channels.
///
/// Pins are driven through the `embedded-hal` digital traits so the same
/// controller runs on Linux GPIO (feature `gpio`) and on in-memory pins.

pub mod channel;
pub mod controller;
pub mod error;
#[cfg(feature = "gpio")]
pub mod gpio;
pub mod pin;

pub use channel::{Action, ChannelId};
pub use controller::{ActuatorController, ChannelPins, ChannelState};
pub use error::ActuatorError;
pub use pin::{DynPin, MemoryPin, PinEvent, PinFault, PinJournal};
