#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::bail;
use ndarray::ArrayViewD;
use sp_actuator::{ActuatorController, ActuatorError, ChannelPins, PinJournal};
use sp_audio::{AudioCaptureService, CaptureError, FrameSource, SyntheticSource};
use sp_core::config::SystemConfig;
use sp_core::{DetectionRecord, EventSink, SharedStateStore, UserId};
use sp_detect::{Components, DetectionOrchestrator};
use sp_infer::{Classifier, InferenceEngine};

pub const TICK: Duration = Duration::from_millis(10);

/// Classifier whose output the test controls.
#[derive(Clone, Default)]
pub struct Script {
    scores: Arc<Mutex<Option<Vec<f32>>>>,
    calls: Arc<AtomicUsize>,
}

impl Script {
    pub fn new(scores: &[f32]) -> Self {
        let script = Self::default();
        script.set(scores);
        script
    }

    pub fn set(&self, scores: &[f32]) {
        *self.scores.lock().expect("script") = Some(scores.to_vec());
    }

    /// Make every following prediction fail.
    pub fn fail(&self) {
        *self.scores.lock().expect("script") = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct ScriptedClassifier(Script);

impl Classifier for ScriptedClassifier {
    fn input_shape(&self) -> Vec<Option<usize>> {
        vec![None, Some(40)]
    }

    fn predict(&mut self, _input: ArrayViewD<'_, f32>) -> anyhow::Result<Vec<f32>> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        match self.0.scores.lock().expect("script").clone() {
            Some(scores) => Ok(scores),
            None => bail!("scripted failure"),
        }
    }
}

/// Sine source that blocks until released and tracks overlap.
pub struct GatedSource {
    gate: Option<mpsc::Receiver<()>>,
    hold: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

#[derive(Clone, Default)]
pub struct Gauge {
    pub in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
}

impl Gauge {
    pub fn max(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl GatedSource {
    pub fn gated(gate: mpsc::Receiver<()>, gauge: &Gauge) -> Self {
        Self {
            gate: Some(gate),
            hold: Duration::ZERO,
            in_flight: Arc::clone(&gauge.in_flight),
            max_in_flight: Arc::clone(&gauge.max_in_flight),
        }
    }

    pub fn slow(hold: Duration, gauge: &Gauge) -> Self {
        Self {
            gate: None,
            hold,
            in_flight: Arc::clone(&gauge.in_flight),
            max_in_flight: Arc::clone(&gauge.max_in_flight),
        }
    }
}

impl FrameSource for GatedSource {
    fn record(&mut self, duration: Duration, sample_rate: u32) -> Result<Vec<Vec<f32>>, CaptureError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        thread::sleep(self.hold);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        SyntheticSource::new(180.0, 0.5).record(duration, sample_rate)
    }
}

/// Sink that keeps everything in memory.
#[derive(Default)]
pub struct MemorySink {
    pub records: Mutex<Vec<(Option<UserId>, DetectionRecord)>>,
    pub lines: Mutex<Vec<String>>,
}

impl EventSink for MemorySink {
    fn append_detection_record(&self, user: Option<UserId>, record: &DetectionRecord) -> anyhow::Result<()> {
        self.records.lock().expect("records").push((user, record.clone()));
        Ok(())
    }

    fn append_log(&self, message: &str, _level: log::Level, _user: Option<UserId>) -> anyhow::Result<()> {
        self.lines.lock().expect("lines").push(message.to_string());
        Ok(())
    }
}

pub struct Rig {
    pub orchestrator: DetectionOrchestrator,
    pub journal: PinJournal,
    pub script: Script,
    pub sink: Arc<MemorySink>,
    pub store: Arc<SharedStateStore>,
    pub dir: tempfile::TempDir,
}

/// Fast timings: one tick is 10 ms, stages are a handful of ticks.
pub fn config(dir: &std::path::Path) -> SystemConfig {
    let mut config = SystemConfig::default();
    config.audio.sample_rate = 16_000;
    config.audio.clip_secs = 1;
    config.audio.recordings_dir = dir.join("recordings");
    config.model.label_mapping = dir.join("label_mapping.json");
    config.model.metadata = dir.join("model_metadata.json");
    config.detection.retry_secs = 1;
    config.detection.busy_poll_secs = 1;
    config.detection.error_backoff_secs = 2;
    config.sequence.stage1_secs = 5;
    config.sequence.interval_secs = 3;
    config.sequence.stage2_secs = 5;
    config.sequence.tick_ms = 10;
    config.sequence.settle_ms = 0;
    config.sequence.stop_join_timeout_secs = 2;
    config.pillow.pre_deflate_secs = 2;
    config.pillow.level_secs = [1, 2, 3];
    config.pillow.deflate_secs = 2;
    config
}

pub struct RigBuilder {
    scores: Vec<f32>,
    source: Option<Box<dyn FrameSource>>,
    degraded: bool,
    tweak: Box<dyn FnOnce(&mut SystemConfig)>,
}

impl RigBuilder {
    pub fn new(scores: &[f32]) -> Self {
        Self {
            scores: scores.to_vec(),
            source: None,
            degraded: false,
            tweak: Box::new(|_| {}),
        }
    }

    pub fn source(mut self, source: impl FrameSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    pub fn tweak(mut self, f: impl FnOnce(&mut SystemConfig) + 'static) -> Self {
        self.tweak = Box::new(f);
        self
    }

    pub fn build(self) -> Rig {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = config(dir.path());
        (self.tweak)(&mut config);

        let store = Arc::new(SharedStateStore::new(
            &config.store,
            config.detection.detection_delay_minutes,
        ));
        let source = self
            .source
            .unwrap_or_else(|| Box::new(SyntheticSource::new(180.0, 0.5)));
        let capture = AudioCaptureService::new(&config.audio, source, Arc::clone(&store));

        let script = Script::new(&self.scores);
        let engine = InferenceEngine::new(
            Ok(Box::new(ScriptedClassifier(script.clone()))),
            &config.audio,
            &config.model,
            Arc::clone(&store),
        );

        let journal = PinJournal::new();
        let pins = if self.degraded {
            Err(ActuatorError::Pin("no gpio chip".into()))
        } else {
            Ok([1, 2].map(|n| ChannelPins {
                pump: journal.pin(format!("pump{n}")).boxed(),
                valve: journal.pin(format!("valve{n}")).boxed(),
            }))
        };
        let actuator = ActuatorController::new(pins, config.sequence.settle(), Arc::clone(&store));
        journal.clear();

        let sink = Arc::new(MemorySink::default());
        let orchestrator = DetectionOrchestrator::new(Components {
            config,
            store: Arc::clone(&store),
            capture,
            engine,
            actuator,
            sink: Arc::clone(&sink) as Arc<dyn EventSink>,
        });
        Rig {
            orchestrator,
            journal,
            script,
            sink,
            store,
            dir,
        }
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

pub fn all_low(journal: &PinJournal) -> bool {
    ["pump1", "valve1", "pump2", "valve2"]
        .iter()
        .all(|p| journal.level(p) == Some(false))
}

pub fn log_contains(rig: &Rig, needle: &str) -> bool {
    rig.store
        .activity_log()
        .iter()
        .any(|e| e.message.contains(needle))
}
