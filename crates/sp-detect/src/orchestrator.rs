use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use log::Level;
use sp_actuator::{Action, ActuatorController, ChannelId};
use sp_audio::{AudioCaptureService, CaptureError};
use sp_core::config::{DETECTION_DELAY_RANGE, SystemConfig};
use sp_core::{
    ActivityLogEntry, CancelToken, DetectionRecord, EventSink, Phase, SharedStateStore, StatusUpdate,
    SystemStatus, UserId,
};
use sp_infer::InferenceEngine;

use crate::error::ControlError;
use crate::report::{CycleReport, Settings, SystemInfo};
use crate::sequence::{self, Plan, RunningSequence};
use crate::supervisor::{self, LoopHandle};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything the orchestrator drives, built by the caller.
pub struct Components {
    pub config: SystemConfig,
    pub store: Arc<SharedStateStore>,
    pub capture: AudioCaptureService,
    pub engine: InferenceEngine,
    pub actuator: ActuatorController,
    pub sink: Arc<dyn EventSink>,
}

pub(crate) struct Inner {
    pub(crate) config: SystemConfig,
    pub(crate) store: Arc<SharedStateStore>,
    pub(crate) capture: AudioCaptureService,
    pub(crate) engine: InferenceEngine,
    pub(crate) actuator: ActuatorController,
    sink: Arc<dyn EventSink>,
    /// Cancelled once, at shutdown; parent of every loop and sequence token.
    pub(crate) root: CancelToken,
    pub(crate) sequence: Mutex<Option<RunningSequence>>,
    supervisor: Mutex<Option<LoopHandle>>,
    /// A `trigger_capture` thread has been accepted and not yet finished.
    capture_pending: AtomicBool,
}

/// Composes capture, classification and actuation into detection cycles,
/// and owns the auto-run loop and the actuation state machine.
///
/// Cloning is cheap and yields a handle to the same instance. Every
/// operation is safe to call from any thread.
///
/// # Example
/// ```no_run
/// # fn demo(components: sp_detect::Components) -> Result<(), sp_detect::ControlError> {
/// use sp_detect::DetectionOrchestrator;
/// let orchestrator = DetectionOrchestrator::new(components);
/// orchestrator.set_detection_delay(10)?;
/// orchestrator.start()?;
/// // ...
/// orchestrator.shutdown();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DetectionOrchestrator {
    inner: Arc<Inner>,
}

impl DetectionOrchestrator {
    #[must_use]
    pub fn new(components: Components) -> Self {
        let Components {
            config,
            store,
            capture,
            engine,
            actuator,
            sink,
        } = components;
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                capture,
                engine,
                actuator,
                sink,
                root: CancelToken::new(),
                sequence: Mutex::new(None),
                supervisor: Mutex::new(None),
                capture_pending: AtomicBool::new(false),
            }),
        }
    }

    /// Run one capture→classify→(actuate) cycle on the calling thread.
    ///
    /// A confident positive detection starts the response sequence on its
    /// own thread and returns without waiting for it.
    ///
    /// # Errors
    /// [`ControlError::Busy`] if a capture or sequence is in progress;
    /// capture and inference failures abort the cycle.
    pub fn record_and_classify(&self, user: Option<UserId>) -> Result<CycleReport, ControlError> {
        self.inner.cycle(user, None)
    }

    /// Accept an on-demand cycle and run it in the background.
    ///
    /// # Errors
    /// [`ControlError::Busy`] if recording, a sequence is active, or another
    /// triggered cycle has not finished yet.
    pub fn trigger_capture(&self, user: Option<UserId>) -> Result<String, ControlError> {
        let status = self.inner.store.snapshot_status();
        if status.is_busy() {
            return Err(ControlError::Busy(busy_reason(&status).into()));
        }
        if self
            .inner
            .capture_pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ControlError::Busy("A capture is already in progress".into()));
        }

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new().name("capture".into()).spawn(move || {
            let _pending = PendingFlag(&inner.capture_pending);
            match inner.cycle(user, None) {
                Ok(report) => log::debug!("Triggered cycle finished: {}", report.result.label),
                Err(e) => log::warn!("Triggered cycle aborted: {e}"),
            }
        });
        if let Err(e) = spawned {
            self.inner.capture_pending.store(false, Ordering::SeqCst);
            return Err(CaptureError::Io(e).into());
        }
        Ok("Capture started".into())
    }

    /// Start the auto-run loop.
    ///
    /// # Errors
    /// [`ControlError::Busy`] if the loop is already running or the system
    /// is shutting down.
    pub fn start(&self) -> Result<String, ControlError> {
        if self.inner.root.is_cancelled() {
            return Err(ControlError::Busy("System is shutting down".into()));
        }
        let mut slot = lock(&self.inner.supervisor);
        if slot.as_ref().is_some_and(LoopHandle::is_alive) {
            return Err(ControlError::Busy("Auto detection already running".into()));
        }

        self.inner.store.update_status(StatusUpdate {
            auto_run: Some(true),
            ..StatusUpdate::default()
        });
        match supervisor::spawn(&self.inner) {
            Ok(handle) => {
                *slot = Some(handle);
                drop(slot);
                self.inner.note("Auto detection started", Level::Info, None);
                Ok("Auto detection started".into())
            }
            Err(e) => {
                self.inner.store.update_status(StatusUpdate {
                    auto_run: Some(false),
                    ..StatusUpdate::default()
                });
                Err(ControlError::Sequence(format!("cannot start auto detection: {e}")))
            }
        }
    }

    /// Stop the auto-run loop and cancel a running response sequence.
    ///
    /// Idempotent; never waits longer than the configured join timeout.
    ///
    /// # Errors
    /// Never fails today; the `Result` keeps all mutating operations uniform.
    pub fn stop(&self) -> Result<String, ControlError> {
        self.inner.store.update_status(StatusUpdate {
            auto_run: Some(false),
            ..StatusUpdate::default()
        });
        let handle = lock(&self.inner.supervisor).take();

        // The loop goes first: a cycle still in flight must not claim the
        // slot after the cancel below.
        let Some(handle) = handle else {
            self.inner.cancel_sequence_where(Plan::is_automatic);
            return Ok("Auto detection is not running".into());
        };
        if !handle.stop(self.inner.config.sequence.stop_join_timeout()) {
            log::warn!("Auto detection loop did not exit in time; detached");
        }
        self.inner.cancel_sequence_where(Plan::is_automatic);
        self.inner.note("Auto detection stopped", Level::Info, None);
        Ok("Auto detection stopped".into())
    }

    /// # Errors
    /// See [`start`](Self::start).
    pub fn set_auto_run(&self, enabled: bool) -> Result<String, ControlError> {
        if enabled { self.start() } else { self.stop() }
    }

    /// Whether the auto-run loop thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.inner.supervisor)
            .as_ref()
            .is_some_and(LoopHandle::is_alive)
    }

    /// Set the pause after a confident detection, in minutes.
    ///
    /// # Errors
    /// [`ControlError::Validation`] outside 1..=60; the value is never
    /// clamped.
    pub fn set_detection_delay(&self, minutes: u32) -> Result<String, ControlError> {
        if !DETECTION_DELAY_RANGE.contains(&minutes) {
            return Err(ControlError::Validation(format!(
                "Delay must be between {} and {} minutes",
                DETECTION_DELAY_RANGE.start(),
                DETECTION_DELAY_RANGE.end()
            )));
        }
        self.inner.store.update_status(StatusUpdate {
            detection_delay_minutes: Some(minutes),
            ..StatusUpdate::default()
        });
        let message = format!("Detection delay set to {minutes} minutes");
        self.inner.note(message.clone(), Level::Info, None);
        Ok(message)
    }

    /// Switch a channel's pump and valve together.
    ///
    /// # Errors
    /// [`ControlError::Validation`] for a channel other than 1 or 2;
    /// [`ControlError::HardwareUnavailable`] if the actuator is degraded or
    /// a pin write fails.
    pub fn control_actuator(&self, channel: u8, action: Action) -> Result<String, ControlError> {
        let channel = ChannelId::try_from(channel)?;
        Ok(self.inner.actuator.engage(channel, action)?)
    }

    /// Open or close a channel's valve only.
    ///
    /// # Errors
    /// As [`control_actuator`](Self::control_actuator).
    pub fn control_valve(&self, channel: u8, action: Action) -> Result<String, ControlError> {
        let channel = ChannelId::try_from(channel)?;
        Ok(self.inner.actuator.set_valve(channel, action)?)
    }

    /// Deflate, then inflate to `level` (1..=3), in the background.
    ///
    /// Progress is visible through [`status`](Self::status).
    ///
    /// # Errors
    /// [`ControlError::Validation`] for another level,
    /// [`ControlError::HardwareUnavailable`] when degraded,
    /// [`ControlError::Busy`] while another sequence runs.
    pub fn adjust_pillow_level(&self, level: u8) -> Result<String, ControlError> {
        if !(1..=3).contains(&level) {
            return Err(ControlError::Validation("Level must be 1, 2, or 3".into()));
        }
        self.start_manual(Plan::PillowLevel(level))?;
        Ok(format!("Adjusting pillow to level {level}"))
    }

    /// Run the deflation channel for the configured time, in the background.
    ///
    /// # Errors
    /// As [`adjust_pillow_level`](Self::adjust_pillow_level).
    pub fn deflate(&self) -> Result<String, ControlError> {
        self.start_manual(Plan::Deflate)?;
        Ok("Deflating pillow".into())
    }

    fn start_manual(&self, plan: Plan) -> Result<(), ControlError> {
        if !self.inner.actuator.is_available() {
            return Err(ControlError::HardwareUnavailable("GPIO not available".into()));
        }
        if !self.inner.store.try_begin_sequence() {
            return Err(ControlError::Busy("An actuation sequence is already running".into()));
        }
        sequence::spawn(&self.inner, plan, &self.inner.root)
    }

    /// Cancel whatever sequence is running; its outputs are forced off.
    ///
    /// # Errors
    /// Never fails; returns a message saying whether anything was running.
    pub fn cancel_sequence(&self) -> Result<String, ControlError> {
        if self.inner.cancel_sequence_where(|_| true) {
            Ok("Sequence cancelled".into())
        } else {
            Ok("No sequence running".into())
        }
    }

    /// Block until no sequence holds the slot, at most `timeout`.
    ///
    /// Returns `true` if the system is free of sequences.
    #[must_use]
    pub fn wait_for_sequence(&self, timeout: Duration) -> bool {
        let waiter = lock(&self.inner.sequence).as_ref().map(RunningSequence::waiter);
        match waiter {
            None => true,
            Some(done) => !matches!(done.recv_timeout(timeout), Err(flume::RecvTimeoutError::Timeout)),
        }
    }

    #[must_use]
    pub fn status(&self) -> SystemStatus {
        self.inner.store.snapshot_status()
    }

    /// Most recent detections first.
    #[must_use]
    pub fn history(&self, limit: usize) -> Vec<DetectionRecord> {
        self.inner.store.history(limit)
    }

    #[must_use]
    pub fn activity_log(&self) -> Vec<ActivityLogEntry> {
        self.inner.store.activity_log()
    }

    #[must_use]
    pub fn info(&self) -> SystemInfo {
        let config = &self.inner.config;
        let status = self.inner.store.snapshot_status();
        SystemInfo {
            name: "snorepillow",
            version: env!("CARGO_PKG_VERSION"),
            model_path: self.inner.engine.model_path().to_path_buf(),
            model_loaded: self.inner.engine.is_loaded(),
            model_variant: self.inner.engine.variant(),
            actuator_ready: status.actuator_ready,
            confidence_threshold: config.detection.confidence_threshold,
            positive_labels: config.detection.positive_labels.clone(),
            stage1_secs: config.sequence.stage1_secs,
            interval_secs: config.sequence.interval_secs,
            stage2_secs: config.sequence.stage2_secs,
        }
    }

    #[must_use]
    pub fn settings(&self) -> Settings {
        let status = self.inner.store.snapshot_status();
        Settings {
            auto_run: status.auto_run,
            detection_delay_minutes: status.detection_delay_minutes,
        }
    }

    /// Stop the loop, cancel any sequence, and force every output off.
    ///
    /// Safe to call more than once and from a signal or panic handler
    /// thread. Every wait is bounded.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        inner.set_phase(Phase::ShuttingDown);
        let _ = self.stop();
        inner.root.cancel();

        let timeout = inner.config.sequence.stop_join_timeout();
        if !self.wait_for_sequence(timeout) {
            log::warn!("Actuation thread did not exit in time");
        }
        inner.actuator.shutdown_all();
        inner.set_phase(Phase::ShuttingDown);
        inner.note("System shutdown complete", Level::Info, None);
    }
}

impl Inner {
    /// Append to the activity log and forward to the persistent sink.
    pub(crate) fn note(&self, message: impl Into<String>, level: Level, user: Option<UserId>) {
        let message = message.into();
        self.store.append_log(message.clone());
        self.forward(&message, level, user);
    }

    /// Forward to the persistent sink only.
    fn forward(&self, message: &str, level: Level, user: Option<UserId>) {
        if let Err(e) = self.sink.append_log(message, level, user) {
            log::warn!("Cannot persist log line: {e:#}");
        }
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        self.store.update_status(StatusUpdate {
            phase: Some(phase),
            ..StatusUpdate::default()
        });
    }

    /// Cancel the running sequence if `pred` accepts its plan.
    fn cancel_sequence_where(&self, pred: impl Fn(Plan) -> bool) -> bool {
        match lock(&self.sequence).as_ref() {
            Some(running) if pred(running.plan) => {
                running.cancel();
                true
            }
            _ => false,
        }
    }

    /// One capture→classify→(actuate) pass.
    ///
    /// `loop_token` is the auto-run loop's token when the loop runs the
    /// cycle; a response started here is then cancelled with the loop, and
    /// none is started once the loop is cancelled.
    pub(crate) fn cycle(
        self: &Arc<Self>,
        user: Option<UserId>,
        loop_token: Option<&CancelToken>,
    ) -> Result<CycleReport, ControlError> {
        let status = self.store.snapshot_status();
        if status.is_busy() {
            return Err(ControlError::Busy(busy_reason(&status).into()));
        }

        let (audio_path, result) = {
            let _phase = PhaseScope::enter(&self.store);
            let audio_path = self
                .capture
                .capture(self.config.audio.clip_duration())
                .inspect_err(|e| {
                    if !matches!(e, CaptureError::Busy) {
                        self.forward(&format!("Recording failed: {e}"), Level::Error, user);
                    }
                })?;

            let _ = self.store.transition_phase(&[Phase::Capturing], Phase::Classifying);
            let result = self
                .engine
                .predict(&audio_path)
                .inspect_err(|e| self.forward(&format!("Prediction failed: {e}"), Level::Error, user))?;
            (audio_path, result)
        };

        self.note(
            format!(
                "Prediction: {} ({:.2}%) [Model: {}]",
                result.label, result.confidence, result.model_variant
            ),
            Level::Info,
            user,
        );

        let detection = &self.config.detection;
        let threshold = detection.confidence_threshold;
        let positive = detection.is_positive(&result.label);
        let above = result.confidence > threshold;
        log::debug!(
            "Confidence {:.2}% vs threshold {threshold}% = {above}; positive label = {positive}",
            result.confidence
        );

        let detected = positive && above;
        let mut triggered = false;
        let parent = loop_token.unwrap_or(&self.root);
        if detected {
            if parent.is_cancelled() {
                self.note(
                    "Snoring detected but auto detection was stopped - response skipped",
                    Level::Info,
                    user,
                );
            } else if self.store.try_begin_sequence() {
                self.note(
                    format!(
                        "TRIGGERING SNORING RESPONSE: '{}' detected with {:.2}% confidence > {threshold}%",
                        result.label, result.confidence
                    ),
                    Level::Warn,
                    user,
                );
                match sequence::spawn(self, Plan::Response, parent) {
                    Ok(()) => triggered = true,
                    Err(e) => self.note(format!("Cannot start response sequence: {e}"), Level::Error, user),
                }
            } else {
                self.note(
                    "Snoring detected but response sequence already in progress - skipped",
                    Level::Info,
                    user,
                );
            }
        } else if positive {
            self.note(
                format!(
                    "'{}' detected but confidence too low: {:.2}% <= {threshold}%",
                    result.label, result.confidence
                ),
                Level::Info,
                user,
            );
        } else {
            self.note(
                format!("No snoring detected - class: '{}'", result.label),
                Level::Info,
                user,
            );
        }

        // Recorded after the spawn so the flag says whether actuation started.
        let record = DetectionRecord::new(&result, audio_path.clone(), triggered);
        if let Err(e) = self.sink.append_detection_record(user, &record) {
            log::warn!("Cannot persist detection: {e:#}");
        }
        self.store.record_detection(record);

        self.capture.cleanup_retention();

        Ok(CycleReport {
            result,
            audio_path,
            detected,
            triggered,
        })
    }
}

fn busy_reason(status: &SystemStatus) -> &'static str {
    if status.recording {
        "Recording in progress"
    } else {
        "Actuation sequence in progress"
    }
}

/// Marks the capture and classify phases; returns to idle on drop only if
/// it was the one that left idle.
struct PhaseScope<'a> {
    store: &'a SharedStateStore,
    entered: bool,
}

impl<'a> PhaseScope<'a> {
    fn enter(store: &'a SharedStateStore) -> Self {
        let entered = store.transition_phase(&[Phase::Idle], Phase::Capturing);
        Self { store, entered }
    }
}

impl Drop for PhaseScope<'_> {
    fn drop(&mut self) {
        if self.entered {
            let _ = self
                .store
                .transition_phase(&[Phase::Capturing, Phase::Classifying], Phase::Idle);
        }
    }
}

/// Clears the triggered-capture flag when the background cycle ends.
struct PendingFlag<'a>(&'a AtomicBool);

impl Drop for PendingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
