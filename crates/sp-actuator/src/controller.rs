use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use embedded_hal::digital::OutputPin;
use sp_core::{SharedStateStore, StatusUpdate};

use crate::channel::{Action, ChannelId};
use crate::error::ActuatorError;
use crate::pin::{DynPin, PinFault};

/// Pump and valve outputs of one channel.
pub struct ChannelPins {
    pub pump: DynPin,
    pub valve: DynPin,
}

/// Last level successfully written to each output of a channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelState {
    pub pump_on: bool,
    pub valve_open: bool,
}

impl ChannelState {
    /// Pump running; the valve alone does not count.
    #[must_use]
    pub fn engaged(self) -> bool {
        self.pump_on
    }
}

struct Channel {
    id: ChannelId,
    pins: ChannelPins,
    state: ChannelState,
}

impl Channel {
    fn set_valve(&mut self, open: bool) -> Result<(), PinFault> {
        if open {
            self.pins.valve.set_high()?;
        } else {
            self.pins.valve.set_low()?;
        }
        self.state.valve_open = open;
        Ok(())
    }

    fn set_pump(&mut self, on: bool) -> Result<(), PinFault> {
        if on {
            self.pins.pump.set_high()?;
        } else {
            self.pins.pump.set_low()?;
        }
        self.state.pump_on = on;
        Ok(())
    }

    /// Valve opens before the pump starts.
    fn switch_on(&mut self, settle: Duration) -> Result<(), PinFault> {
        self.set_valve(true)?;
        thread::sleep(settle);
        self.set_pump(true)
    }

    /// Pump stops before the valve closes.
    fn switch_off(&mut self, settle: Duration) -> Result<(), PinFault> {
        self.set_pump(false)?;
        thread::sleep(settle);
        self.set_valve(false)
    }

    /// Drive both outputs low, attempting every pin even after a failure.
    fn force_off(&mut self) -> Vec<PinFault> {
        let mut faults = Vec::new();
        if let Err(e) = self.set_pump(false) {
            log::error!("Channel {}: pump OFF failed: {e}", self.id);
            faults.push(e);
        }
        if let Err(e) = self.set_valve(false) {
            log::error!("Channel {}: valve OFF failed: {e}", self.id);
            faults.push(e);
        }
        faults
    }
}

/// Serialized access to the two pump+valve channels.
///
/// Every public call holds one controller-wide mutex for its whole
/// duration, settle delay included. If pin initialization failed the
/// controller is built in degraded mode and every call returns
/// [`ActuatorError::Unavailable`] without touching hardware.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use sp_actuator::{Action, ActuatorController, ChannelId, ChannelPins, PinJournal};
/// use sp_core::config::StoreConfig;
/// use sp_core::SharedStateStore;
///
/// let store = Arc::new(SharedStateStore::new(&StoreConfig::default(), 5));
/// let journal = PinJournal::new();
/// let pins = [1, 2].map(|n| ChannelPins {
///     pump: journal.pin(format!("pump{n}")).boxed(),
///     valve: journal.pin(format!("valve{n}")).boxed(),
/// });
/// let ctl = ActuatorController::new(Ok(pins), Duration::ZERO, store);
/// ctl.engage(ChannelId::One, Action::On).unwrap();
/// assert_eq!(journal.level("pump1"), Some(true));
/// ```
pub struct ActuatorController {
    channels: Option<Mutex<[Channel; 2]>>,
    settle: Duration,
    store: Arc<SharedStateStore>,
}

impl ActuatorController {
    /// Take ownership of the initialized pins, or enter degraded mode when
    /// `init` is an error. Outputs start low.
    #[must_use]
    pub fn new(init: Result<[ChannelPins; 2], ActuatorError>, settle: Duration, store: Arc<SharedStateStore>) -> Self {
        let channels = match init {
            Ok([one, two]) => {
                let mut channels = [(ChannelId::One, one), (ChannelId::Two, two)].map(|(id, pins)| Channel {
                    id,
                    pins,
                    state: ChannelState::default(),
                });
                for channel in &mut channels {
                    channel.force_off();
                }
                store.update_status(StatusUpdate {
                    actuator_ready: Some(true),
                    pump: Some(false),
                    ..StatusUpdate::default()
                });
                store.append_log("GPIO initialized - channels 1 and 2 ready");
                Some(Mutex::new(channels))
            }
            Err(e) => {
                log::warn!("GPIO not available: {e}");
                store.update_status(StatusUpdate {
                    actuator_ready: Some(false),
                    ..StatusUpdate::default()
                });
                store.append_log(format!("GPIO initialization failed: {e}"));
                None
            }
        };
        Self {
            channels,
            settle,
            store,
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.channels.is_some()
    }

    fn lock(&self) -> Result<MutexGuard<'_, [Channel; 2]>, ActuatorError> {
        let channels = self.channels.as_ref().ok_or(ActuatorError::Unavailable)?;
        Ok(channels.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish_pump(&self, channels: &[Channel; 2]) {
        self.store.update_status(StatusUpdate {
            pump: Some(channels.iter().any(|c| c.state.pump_on)),
            ..StatusUpdate::default()
        });
    }

    /// Switch a channel's pump and valve together.
    ///
    /// ON opens the valve, waits the settle delay, then starts the pump.
    /// OFF reverses the order. A failed ON leaves the channel forced off.
    ///
    /// # Errors
    /// [`ActuatorError::Unavailable`] in degraded mode, [`ActuatorError::Pin`]
    /// if a write fails.
    pub fn engage(&self, channel: ChannelId, action: Action) -> Result<String, ActuatorError> {
        let mut channels = self.lock()?;
        let ch = &mut channels[channel.index()];
        let outcome = match action {
            Action::On => {
                let result = ch.switch_on(self.settle);
                if result.is_err() {
                    ch.force_off();
                }
                result
            }
            Action::Off => ch.switch_off(self.settle),
        };
        self.publish_pump(&channels);
        drop(channels);

        match outcome {
            Ok(()) => {
                self.store
                    .append_log(format!("Pump {channel} & Valve {channel}: {action}"));
                Ok(format!("Pump {channel} and Valve {channel} {action} successful"))
            }
            Err(e) => {
                self.store
                    .append_log(format!("Pump {channel}/Valve {channel} control error: {e}"));
                Err(ActuatorError::Pin(e.0))
            }
        }
    }

    /// Open or close a channel's valve without touching its pump.
    ///
    /// # Errors
    /// [`ActuatorError::Unavailable`] in degraded mode, [`ActuatorError::Pin`]
    /// if the write fails.
    pub fn set_valve(&self, channel: ChannelId, action: Action) -> Result<String, ActuatorError> {
        let mut channels = self.lock()?;
        let outcome = channels[channel.index()].set_valve(action.is_on());
        drop(channels);

        match outcome {
            Ok(()) => {
                self.store.append_log(format!("Valve {channel}: {action}"));
                Ok(format!("Valve {channel} {action} successful"))
            }
            Err(e) => {
                self.store
                    .append_log(format!("Valve {channel} control error: {e}"));
                Err(ActuatorError::Pin(e.0))
            }
        }
    }

    /// Force every pump, then every valve, low.
    ///
    /// Idempotent. Pin failures are logged and do not stop the remaining
    /// writes. A degraded controller has nothing to switch off.
    pub fn shutdown_all(&self) {
        let Ok(mut channels) = self.lock() else {
            return;
        };
        let faults: usize = channels.iter_mut().map(|c| c.force_off().len()).sum();
        self.publish_pump(&channels);
        drop(channels);

        if faults == 0 {
            self.store.append_log("All pumps and valves turned off");
        } else {
            self.store
                .append_log(format!("Shutdown completed with {faults} pin error(s)"));
        }
    }

    /// Last written state of both channels; all off when degraded.
    #[must_use]
    pub fn channel_states(&self) -> [ChannelState; 2] {
        match self.lock() {
            Ok(channels) => [channels[0].state, channels[1].state],
            Err(_) => [ChannelState::default(); 2],
        }
    }
}
