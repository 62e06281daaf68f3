use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::bail;
use ndarray::ArrayViewD;
use sp_core::config::{AudioConfig, ModelConfig, StoreConfig};
use sp_core::{ModelVariant, SharedStateStore};
use sp_infer::{Classifier, InferenceEngine, InferenceError};

/// Returns fixed scores and remembers the shape it was fed.
struct StubModel {
    shape: Vec<Option<usize>>,
    scores: Vec<f32>,
    seen: Arc<Mutex<Vec<Vec<usize>>>>,
}

impl Classifier for StubModel {
    fn input_shape(&self) -> Vec<Option<usize>> {
        self.shape.clone()
    }

    fn predict(&mut self, input: ArrayViewD<'_, f32>) -> anyhow::Result<Vec<f32>> {
        if input.iter().any(|v| !v.is_finite()) {
            bail!("non-finite input");
        }
        self.seen.lock().expect("seen").push(input.shape().to_vec());
        Ok(self.scores.clone())
    }
}

struct Rig {
    engine: InferenceEngine,
    store: Arc<SharedStateStore>,
    seen: Arc<Mutex<Vec<Vec<usize>>>>,
    dir: tempfile::TempDir,
}

fn audio() -> AudioConfig {
    AudioConfig {
        sample_rate: 16_000,
        clip_secs: 1,
        n_mels: 32,
        ..AudioConfig::default()
    }
}

fn rig(shape: Vec<Option<usize>>, scores: Vec<f32>, mapping: Option<&str>) -> Rig {
    let dir = tempfile::tempdir().expect("tempdir");
    let label_mapping = dir.path().join("label_mapping.json");
    if let Some(json) = mapping {
        std::fs::write(&label_mapping, json).expect("mapping");
    }
    let model_config = ModelConfig {
        label_mapping,
        metadata: dir.path().join("model_metadata.json"),
        ..ModelConfig::default()
    };
    let store = Arc::new(SharedStateStore::new(&StoreConfig::default(), 5));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let model = StubModel {
        shape,
        scores,
        seen: Arc::clone(&seen),
    };
    let engine = InferenceEngine::new(Ok(Box::new(model)), &audio(), &model_config, Arc::clone(&store));
    Rig {
        engine,
        store,
        seen,
        dir,
    }
}

fn write_clip(dir: &Path, name: &str, seconds: f32) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).expect("create wav");
    let n = (16_000.0 * seconds) as usize;
    for i in 0..n {
        let s = 0.4 * (2.0 * std::f32::consts::PI * 150.0 * i as f32 / 16_000.0).sin();
        writer.write_sample((s * f32::from(i16::MAX)) as i16).expect("sample");
    }
    writer.finalize().expect("finalize");
    path
}

#[test]
fn legacy_model_gets_batched_forty_vector() {
    let rig = rig(vec![None, Some(40)], vec![0.9], None);
    assert_eq!(rig.engine.variant(), ModelVariant::Legacy);
    let clip = write_clip(rig.dir.path(), "a.wav", 0.5);

    let result = rig.engine.predict(&clip).expect("predict");
    assert_eq!(result.class_index, 1);
    assert_eq!(result.label, "snoring");
    assert!((result.confidence - 90.0).abs() < 1e-3);
    assert_eq!(result.model_variant, ModelVariant::Legacy);
    assert_eq!(rig.seen.lock().expect("seen").as_slice(), [vec![1, 40]]);
}

#[test]
fn improved_model_gets_time_major_mels() {
    let rig = rig(vec![None, None, None], vec![0.2], None);
    assert_eq!(rig.engine.variant(), ModelVariant::Improved);
    let clip = write_clip(rig.dir.path(), "b.wav", 1.0);

    let result = rig.engine.predict(&clip).expect("predict");
    assert_eq!(result.label, "not_snoring");
    assert!((result.confidence - 80.0).abs() < 1e-3);
    assert_eq!(rig.seen.lock().expect("seen").as_slice(), [vec![1, 1 + 16_000 / 512, 32]]);
}

#[test]
fn unknown_shape_falls_back_to_legacy_features() {
    let rig = rig(vec![None, Some(13)], vec![0.6], None);
    assert_eq!(rig.engine.variant(), ModelVariant::Unknown);
    let clip = write_clip(rig.dir.path(), "c.wav", 0.5);

    let result = rig.engine.predict(&clip).expect("predict");
    assert_eq!(result.model_variant, ModelVariant::Unknown);
    assert_eq!(rig.seen.lock().expect("seen").as_slice(), [vec![1, 40]]);
    assert_eq!(rig.store.snapshot_status().model_variant, ModelVariant::Unknown);
}

#[test]
fn label_mapping_resolves_multi_class_output() {
    let mapping = r#"{"class_to_index": {"silence": 0, "snoring": 1, "talking": 2}}"#;
    let rig = rig(vec![None, Some(40)], vec![0.1, 0.2, 0.7], Some(mapping));
    let clip = write_clip(rig.dir.path(), "d.wav", 0.5);

    let result = rig.engine.predict(&clip).expect("predict");
    assert_eq!((result.class_index, result.label.as_str()), (2, "talking"));
    assert!((result.confidence - 70.0).abs() < 1e-3);
}

#[test]
fn index_missing_from_mapping_is_unknown() {
    let mapping = r#"{"class_to_index": {"snoring": 0}}"#;
    let rig = rig(vec![None, Some(40)], vec![0.1, 0.9], Some(mapping));
    let clip = write_clip(rig.dir.path(), "e.wav", 0.5);
    assert_eq!(rig.engine.predict(&clip).expect("predict").label, "Unknown");
}

#[test]
fn missing_file_is_reported() {
    let rig = rig(vec![None, Some(40)], vec![0.9], None);
    let missing = rig.dir.path().join("nope.wav");
    assert!(matches!(rig.engine.predict(&missing), Err(InferenceError::FileNotFound(_))));
    let last = rig.store.activity_log().pop().expect("log");
    assert!(last.message.starts_with("Prediction failed"));
}

#[test]
fn failed_load_rejects_predictions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(SharedStateStore::new(&StoreConfig::default(), 5));
    let model_config = ModelConfig {
        label_mapping: dir.path().join("none.json"),
        metadata: dir.path().join("none-meta.json"),
        ..ModelConfig::default()
    };
    let engine = InferenceEngine::new(
        Err(anyhow::anyhow!("corrupt model")),
        &audio(),
        &model_config,
        Arc::clone(&store),
    );

    assert!(!engine.is_loaded());
    assert!(!store.snapshot_status().model_loaded);
    let clip = write_clip(dir.path(), "f.wav", 0.2);
    assert!(matches!(engine.predict(&clip), Err(InferenceError::ModelUnloaded)));
}
