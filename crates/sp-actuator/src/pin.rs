use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use embedded_hal::digital::{self, ErrorKind, ErrorType, OutputPin};
use thiserror::Error;

/// Failure reported by any output pin backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct PinFault(pub String);

impl digital::Error for PinFault {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Type-erased output pin used by the controller.
pub type DynPin = Box<dyn OutputPin<Error = PinFault> + Send>;

/// One level change seen by a [`MemoryPin`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PinEvent {
    pub pin: String,
    pub high: bool,
    pub at: Instant,
}

/// Shared record of every write to a set of [`MemoryPin`]s.
///
/// Clones share the same journal, so a test keeps one handle while the
/// controller owns the pins.
#[derive(Clone, Debug, Default)]
pub struct PinJournal {
    inner: Arc<Mutex<JournalState>>,
}

#[derive(Debug, Default)]
struct JournalState {
    events: Vec<PinEvent>,
    levels: HashMap<String, bool>,
    failing: HashSet<String>,
}

impl PinJournal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, JournalState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a pin recording into this journal.
    #[must_use]
    pub fn pin(&self, name: impl Into<String>) -> MemoryPin {
        let name = name.into();
        self.lock().levels.insert(name.clone(), false);
        MemoryPin {
            name,
            journal: self.clone(),
        }
    }

    /// Make every subsequent write to `name` fail.
    pub fn fail(&self, name: &str) {
        self.lock().failing.insert(name.to_string());
    }

    pub fn heal(&self, name: &str) {
        self.lock().failing.remove(name);
    }

    /// Current level of `name`; `None` for unknown pins.
    #[must_use]
    pub fn level(&self, name: &str) -> Option<bool> {
        self.lock().levels.get(name).copied()
    }

    #[must_use]
    pub fn events(&self) -> Vec<PinEvent> {
        self.lock().events.clone()
    }

    /// `(pin, high)` pairs in write order.
    #[must_use]
    pub fn sequence(&self) -> Vec<(String, bool)> {
        self.lock()
            .events
            .iter()
            .map(|e| (e.pin.clone(), e.high))
            .collect()
    }

    pub fn clear(&self) {
        self.lock().events.clear();
    }

    fn write(&self, name: &str, high: bool) -> Result<(), PinFault> {
        let mut state = self.lock();
        if state.failing.contains(name) {
            return Err(PinFault(format!("{name}: write rejected")));
        }
        state.levels.insert(name.to_string(), high);
        state.events.push(PinEvent {
            pin: name.to_string(),
            high,
            at: Instant::now(),
        });
        Ok(())
    }
}

/// Output pin that only records its level.
///
/// Backs `--simulate` runs and tests.
#[derive(Debug)]
pub struct MemoryPin {
    name: String,
    journal: PinJournal,
}

impl MemoryPin {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn boxed(self) -> DynPin {
        Box::new(self)
    }
}

impl ErrorType for MemoryPin {
    type Error = PinFault;
}

impl OutputPin for MemoryPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.journal.write(&self.name, false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.journal.write(&self.name, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_tracks_levels_and_order() {
        let journal = PinJournal::new();
        let mut a = journal.pin("a");
        let mut b = journal.pin("b");
        a.set_high().expect("a high");
        b.set_high().expect("b high");
        a.set_low().expect("a low");

        assert_eq!(journal.level("a"), Some(false));
        assert_eq!(journal.level("b"), Some(true));
        assert_eq!(journal.level("c"), None);
        assert_eq!(
            journal.sequence(),
            [("a".into(), true), ("b".into(), true), ("a".into(), false)]
        );
    }

    #[test]
    fn failing_pin_keeps_its_level() {
        let journal = PinJournal::new();
        let mut pin = journal.pin("pump");
        journal.fail("pump");
        assert!(pin.set_high().is_err());
        assert_eq!(journal.level("pump"), Some(false));
        journal.heal("pump");
        assert!(pin.set_high().is_ok());
    }
}
