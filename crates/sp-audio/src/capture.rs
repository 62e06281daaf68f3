use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, TryLockError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local};
use sp_core::SharedStateStore;
use sp_core::config::AudioConfig;

use crate::dsp::peak_normalize;
use crate::error::CaptureError;
use crate::retention::{self, CLIP_EXTENSION, CLIP_PREFIX};

/// Producer of mono audio blocks.
///
/// Implementations stream for `duration` and hand back every block they
/// received, in order, at `sample_rate`.
pub trait FrameSource: Send {
    /// # Errors
    /// Returns an error if the stream cannot be opened or fails mid-way.
    fn record(&mut self, duration: Duration, sample_rate: u32) -> Result<Vec<Vec<f32>>, CaptureError>;
}

/// Microphone input via cpal.
///
/// The stream runs at the device's native configuration; the callback
/// downmixes into a lock-free ring buffer which is drained every
/// [`DRAIN_INTERVAL`](Self::DRAIN_INTERVAL). Blocks are resampled to the
/// requested rate afterwards.
#[cfg(feature = "mic")]
#[derive(Debug, Default)]
pub struct MicSource;

#[cfg(feature = "mic")]
impl MicSource {
    pub const DRAIN_INTERVAL: Duration = Duration::from_millis(100);

    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "mic")]
impl FrameSource for MicSource {
    fn record(&mut self, duration: Duration, sample_rate: u32) -> Result<Vec<Vec<f32>>, CaptureError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
        use rtrb::RingBuffer;

        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoInputDevice)?;
        let config = device
            .default_input_config()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;
        let native_rate = config.sample_rate().0;
        let channels = usize::from(config.channels()).max(1);

        // Ring buffer: 2 seconds of audio @ native rate
        let (mut producer, mut consumer) = RingBuffer::new(native_rate as usize * 2);

        let stream = device
            .build_input_stream(
                &config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for chunk in data.chunks(channels) {
                        let mono: f32 = chunk.iter().sum::<f32>() / channels as f32;
                        let _ = producer.push(mono);
                    }
                },
                |err| {
                    log::error!("Audio stream error: {err}");
                },
                None,
            )
            .map_err(|e| CaptureError::Stream(e.to_string()))?;
        stream.play().map_err(|e| CaptureError::Stream(e.to_string()))?;

        let mut blocks = Vec::new();
        let mut elapsed = Duration::ZERO;
        while elapsed < duration {
            let step = Self::DRAIN_INTERVAL.min(duration - elapsed);
            thread::sleep(step);
            elapsed += step;
            let mut block = Vec::with_capacity(consumer.slots());
            while let Ok(sample) = consumer.pop() {
                block.push(sample);
            }
            if !block.is_empty() {
                blocks.push(block);
            }
        }
        drop(stream);

        if native_rate != sample_rate {
            log::debug!("Resampling capture {native_rate}Hz -> {sample_rate}Hz");
            let joined = blocks.concat();
            return Ok(vec![crate::dsp::resample_linear(&joined, native_rate, sample_rate)]);
        }
        Ok(blocks)
    }
}

/// Sine generator standing in for a microphone (simulation and tests).
#[derive(Clone, Debug)]
pub struct SyntheticSource {
    pub frequency_hz: f32,
    pub amplitude: f32,
    /// Sleep for the requested duration like a real device would.
    pub realtime: bool,
}

impl SyntheticSource {
    const BLOCK: usize = 1024;

    #[must_use]
    pub fn new(frequency_hz: f32, amplitude: f32) -> Self {
        Self {
            frequency_hz,
            amplitude,
            realtime: false,
        }
    }

    #[must_use]
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }
}

impl FrameSource for SyntheticSource {
    fn record(&mut self, duration: Duration, sample_rate: u32) -> Result<Vec<Vec<f32>>, CaptureError> {
        if self.realtime {
            thread::sleep(duration);
        }
        let total = (duration.as_secs_f64() * f64::from(sample_rate)).round() as usize;
        let step = 2.0 * std::f32::consts::PI * self.frequency_hz / sample_rate as f32;
        let blocks = (0..total)
            .step_by(Self::BLOCK)
            .map(|start| {
                (start..(start + Self::BLOCK).min(total))
                    .map(|i| self.amplitude * (step * i as f32).sin())
                    .collect()
            })
            .collect();
        Ok(blocks)
    }
}

/// Records fixed-length clips to WAV files and keeps the recordings
/// directory bounded.
///
/// Only one capture runs at a time per instance; a concurrent call fails
/// immediately with [`CaptureError::Busy`] instead of queueing.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use sp_audio::capture::{AudioCaptureService, SyntheticSource};
/// use sp_core::config::{AudioConfig, StoreConfig};
/// use sp_core::SharedStateStore;
///
/// let store = Arc::new(SharedStateStore::new(&StoreConfig::default(), 5));
/// let service = AudioCaptureService::new(
///     &AudioConfig::default(),
///     Box::new(SyntheticSource::new(220.0, 0.3)),
///     store,
/// );
/// let clip = service.capture(Duration::from_secs(5)).unwrap();
/// ```
pub struct AudioCaptureService {
    source: Mutex<Box<dyn FrameSource>>,
    store: Arc<SharedStateStore>,
    recordings_dir: PathBuf,
    sample_rate: u32,
    max_files: usize,
}

impl AudioCaptureService {
    #[must_use]
    pub fn new(config: &AudioConfig, source: Box<dyn FrameSource>, store: Arc<SharedStateStore>) -> Self {
        Self {
            source: Mutex::new(source),
            store,
            recordings_dir: config.recordings_dir.clone(),
            sample_rate: config.sample_rate,
            max_files: config.max_audio_files,
        }
    }

    #[must_use]
    pub fn recordings_dir(&self) -> &Path {
        &self.recordings_dir
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Record `duration` of audio and persist it as a peak-normalized
    /// 16-bit mono WAV file.
    ///
    /// The recording flag is raised for the whole call and cleared on every
    /// exit path.
    ///
    /// # Errors
    /// [`CaptureError::Busy`] if another capture is running; otherwise any
    /// stream, empty-clip, or file error.
    pub fn capture(&self, duration: Duration) -> Result<PathBuf, CaptureError> {
        let mut source = match self.source.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(CaptureError::Busy),
            // A panicking source leaves nothing half-written behind the lock.
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        let _recording = self.store.begin_recording();
        self.store.append_log(format!(
            "Recording audio ({:.1}s @ {}Hz)",
            duration.as_secs_f32(),
            self.sample_rate
        ));

        let result = self.record_to_file(source.as_mut(), duration);
        match &result {
            Ok(path) => self.store.append_log(format!("Audio saved: {}", display_name(path))),
            Err(e) => self.store.append_log(format!("Recording failed: {e}")),
        }
        result
    }

    fn record_to_file(&self, source: &mut dyn FrameSource, duration: Duration) -> Result<PathBuf, CaptureError> {
        let blocks = source.record(duration, self.sample_rate)?;
        let mut clip = blocks.concat();
        if clip.is_empty() {
            return Err(CaptureError::NoFrames);
        }
        peak_normalize(&mut clip);

        fs::create_dir_all(&self.recordings_dir)?;
        let path = unique_clip_path(&self.recordings_dir, Local::now());
        if let Err(e) = write_wav(&path, &clip, self.sample_rate) {
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }
        log::debug!("Wrote {} samples to {}", clip.len(), path.display());
        Ok(path)
    }

    /// Delete the oldest clips beyond the retention count.
    ///
    /// Best-effort: failures are logged, never raised. Returns how many
    /// files were removed.
    pub fn cleanup_retention(&self) -> usize {
        match retention::sweep(&self.recordings_dir, self.max_files) {
            Ok(removed) => {
                for path in &removed {
                    self.store.append_log(format!("Cleaned up: {}", display_name(path)));
                }
                removed.len()
            }
            Err(e) => {
                log::warn!(
                    "Retention cleanup skipped for {}: {e}",
                    self.recordings_dir.display()
                );
                0
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// `recording_YYYYmmdd_HHMMSS_mmm.wav`, suffixed when that name is taken.
fn unique_clip_path(dir: &Path, now: DateTime<Local>) -> PathBuf {
    let stem = format!("{CLIP_PREFIX}{}", now.format("%Y%m%d_%H%M%S_%3f"));
    let mut path = dir.join(format!("{stem}.{CLIP_EXTENSION}"));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{stem}_{n}.{CLIP_EXTENSION}"));
        n += 1;
    }
    path
}

fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample((s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)?;
    }
    writer.finalize()
}
