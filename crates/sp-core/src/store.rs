use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Local;

use crate::config::StoreConfig;
use crate::types::{ActivityLogEntry, DetectionRecord, Phase, StatusUpdate, SystemStatus};

/// Thread-safe holder of the system status, detection history and
/// activity log.
///
/// One mutex guards all three; it is held only for the in-memory mutation
/// and never across I/O. Readers receive copies.
///
/// # Example
/// ```
/// use sp_core::config::StoreConfig;
/// use sp_core::store::SharedStateStore;
/// let store = SharedStateStore::new(&StoreConfig::default(), 5);
/// assert!(store.try_begin_sequence());
/// assert!(!store.try_begin_sequence());
/// store.end_sequence();
/// assert!(!store.snapshot_status().sequence_active);
/// ```
pub struct SharedStateStore {
    inner: Mutex<Inner>,
    max_history: usize,
    max_log: usize,
}

struct Inner {
    status: SystemStatus,
    history: VecDeque<DetectionRecord>,
    log: VecDeque<ActivityLogEntry>,
}

impl SharedStateStore {
    #[must_use]
    pub fn new(config: &StoreConfig, detection_delay_minutes: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                status: SystemStatus::new(detection_delay_minutes),
                history: VecDeque::with_capacity(config.max_detection_history + 1),
                log: VecDeque::with_capacity(config.max_activity_log + 1),
            }),
            max_history: config.max_detection_history,
            max_log: config.max_activity_log,
        }
    }

    // Mutations are single writes or push/pop pairs: a poisoned lock still
    // guards consistent data.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record, evicting the oldest one past capacity.
    pub fn record_detection(&self, record: DetectionRecord) {
        let mut inner = self.lock();
        inner.history.push_back(record);
        while inner.history.len() > self.max_history {
            inner.history.pop_front();
        }
    }

    /// Append a timestamped activity line and mirror it to the log facade.
    pub fn append_log(&self, message: impl Into<String>) {
        let message = message.into();
        log::info!("{message}");
        let entry = ActivityLogEntry {
            timestamp: Local::now(),
            message,
        };
        let mut inner = self.lock();
        inner.log.push_back(entry);
        while inner.log.len() > self.max_log {
            inner.log.pop_front();
        }
    }

    /// Merge the `Some` fields of `update` in one critical section.
    pub fn update_status(&self, update: StatusUpdate) {
        let mut inner = self.lock();
        update.apply(&mut inner.status);
    }

    #[must_use]
    pub fn snapshot_status(&self) -> SystemStatus {
        self.lock().status.clone()
    }

    /// Atomically claim the system-wide sequence slot.
    ///
    /// Returns `false` without side effects if a sequence is already active.
    #[must_use]
    pub fn try_begin_sequence(&self) -> bool {
        let mut inner = self.lock();
        if inner.status.sequence_active {
            return false;
        }
        inner.status.sequence_active = true;
        true
    }

    /// Move to phase `to` only if the current phase is one of `from`.
    pub fn transition_phase(&self, from: &[Phase], to: Phase) -> bool {
        let mut inner = self.lock();
        if from.contains(&inner.status.phase) {
            inner.status.phase = to;
            true
        } else {
            false
        }
    }

    /// Release the sequence slot.
    pub fn end_sequence(&self) {
        self.lock().status.sequence_active = false;
    }

    /// Raise the recording flag for the lifetime of the returned guard.
    #[must_use = "the recording flag drops back to false with the guard"]
    pub fn begin_recording(&self) -> RecordingGuard<'_> {
        self.lock().status.recording = true;
        RecordingGuard { store: self }
    }

    /// Most recent records first, at most `limit`.
    #[must_use]
    pub fn history(&self, limit: usize) -> Vec<DetectionRecord> {
        self.lock().history.iter().rev().take(limit).cloned().collect()
    }

    /// Activity log in insertion order.
    #[must_use]
    pub fn activity_log(&self) -> Vec<ActivityLogEntry> {
        self.lock().log.iter().cloned().collect()
    }
}

/// Clears the recording flag when dropped, on every exit path.
pub struct RecordingGuard<'a> {
    store: &'a SharedStateStore,
}

impl Drop for RecordingGuard<'_> {
    fn drop(&mut self) {
        self.store.lock().status.recording = false;
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;
    use crate::types::{ClassificationResult, ModelVariant};

    fn store() -> SharedStateStore {
        SharedStateStore::new(&StoreConfig::default(), 5)
    }

    fn record(n: usize) -> DetectionRecord {
        let result = ClassificationResult {
            label: format!("clip{n}"),
            class_index: 0,
            confidence: 50.0,
            model_variant: ModelVariant::Legacy,
        };
        DetectionRecord::new(&result, PathBuf::from(format!("recording_{n}.wav")), false)
    }

    #[test]
    fn history_evicts_oldest_first() {
        let store = store();
        for n in 0..51 {
            store.record_detection(record(n));
        }
        let history = store.history(usize::MAX);
        assert_eq!(history.len(), 50);
        assert_eq!(history.first().map(|r| r.label.as_str()), Some("clip50"));
        assert_eq!(history.last().map(|r| r.label.as_str()), Some("clip1"));
    }

    #[test]
    fn history_limit_returns_most_recent() {
        let store = store();
        for n in 0..10 {
            store.record_detection(record(n));
        }
        let labels: Vec<_> = store.history(3).into_iter().map(|r| r.label).collect();
        assert_eq!(labels, ["clip9", "clip8", "clip7"]);
    }

    #[test]
    fn activity_log_is_bounded() {
        let store = store();
        for n in 0..205 {
            store.append_log(format!("line {n}"));
        }
        let log = store.activity_log();
        assert_eq!(log.len(), 200);
        assert_eq!(log[0].message, "line 5");
        assert_eq!(log[199].message, "line 204");
    }

    #[test]
    fn partial_update_touches_only_given_fields() {
        let store = store();
        store.update_status(StatusUpdate {
            model_loaded: Some(true),
            phase: Some(Phase::Classifying),
            ..StatusUpdate::default()
        });
        let status = store.snapshot_status();
        assert!(status.model_loaded);
        assert_eq!(status.phase, Phase::Classifying);
        assert!(!status.actuator_ready);
        assert_eq!(status.detection_delay_minutes, 5);
    }

    #[test]
    fn phase_transition_is_conditional() {
        let store = store();
        assert!(store.transition_phase(&[Phase::Idle], Phase::Capturing));
        assert!(!store.transition_phase(&[Phase::Stage1], Phase::Idle));
        assert_eq!(store.snapshot_status().phase, Phase::Capturing);
    }

    #[test]
    fn recording_guard_clears_on_drop() {
        let store = store();
        {
            let _guard = store.begin_recording();
            assert!(store.snapshot_status().recording);
        }
        assert!(!store.snapshot_status().recording);
    }

    #[test]
    fn sequence_claim_is_exclusive_under_contention() {
        let store = Arc::new(store());
        let winners = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    if store.try_begin_sequence() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("claim thread");
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
