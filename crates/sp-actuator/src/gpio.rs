//! Linux GPIO character-device backend.

use embedded_hal::digital::{ErrorType, OutputPin};
use linux_embedded_hal::CdevPin;
use linux_embedded_hal::gpio_cdev::{Chip, LineRequestFlags};
use sp_core::config::GpioConfig;

use crate::controller::ChannelPins;
use crate::error::ActuatorError;
use crate::pin::{DynPin, PinFault};

/// Requested output line, errors mapped to [`PinFault`].
struct GpioLine {
    pin: CdevPin,
    line: u32,
}

impl ErrorType for GpioLine {
    type Error = PinFault;
}

impl OutputPin for GpioLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.pin
            .set_low()
            .map_err(|e| PinFault(format!("line {}: {e:?}", self.line)))
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.pin
            .set_high()
            .map_err(|e| PinFault(format!("line {}: {e:?}", self.line)))
    }
}

/// Claim the four configured lines as outputs, initially low.
///
/// # Errors
/// Returns [`ActuatorError::Pin`] if the chip cannot be opened or any line
/// cannot be requested.
pub fn open_channels(config: &GpioConfig) -> Result<[ChannelPins; 2], ActuatorError> {
    let mut chip = Chip::new(&config.chip)
        .map_err(|e| ActuatorError::Pin(format!("{}: {e}", config.chip.display())))?;

    let mut claim = |line: u32, label: &str| -> Result<DynPin, ActuatorError> {
        let handle = chip
            .get_line(line)
            .and_then(|l| l.request(LineRequestFlags::OUTPUT, 0, label))
            .map_err(|e| ActuatorError::Pin(format!("line {line}: {e}")))?;
        let pin = CdevPin::new(handle).map_err(|e| ActuatorError::Pin(format!("line {line}: {e}")))?;
        log::debug!("Claimed GPIO line {line} as {label}");
        Ok(Box::new(GpioLine { pin, line }))
    };

    Ok([
        ChannelPins {
            pump: claim(config.pump1_line, "snorepillow-pump1")?,
            valve: claim(config.valve1_line, "snorepillow-valve1")?,
        },
        ChannelPins {
            pump: claim(config.pump2_line, "snorepillow-pump2")?,
            valve: claim(config.valve2_line, "snorepillow-valve2")?,
        },
    ])
}
