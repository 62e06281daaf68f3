use std::io;
use std::panic;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sp_actuator::{ActuatorController, ActuatorError, ChannelPins, PinJournal};
use sp_audio::{AudioCaptureService, FrameSource, SyntheticSource};
use sp_core::config::{GpioConfig, ModelConfig, SystemConfig};
use sp_core::{EventSink, NullSink, SharedStateStore};
use sp_detect::{Components, ControlError, DetectionOrchestrator};
use sp_infer::{Classifier, InferenceEngine};

use crate::cli::{Cli, Command};

pub mod cli;
pub mod console;
pub mod sink;

/// Tone used by `--simulate` capture, roughly a snore's fundamental.
const SIMULATED_TONE_HZ: f32 = 120.0;
/// Polling interval while waiting for a manual or triggered sequence.
const SEQUENCE_POLL: Duration = Duration::from_millis(200);
/// Threads whose panics are contained where they run.
const CONTAINED_THREADS: [&str; 3] = ["actuation", "auto-detect", "capture"];

fn main() -> Result<()> {
    // 1. Parse CLI
    let cli = Cli::parse();

    // 2. Logging
    env_logger::Builder::new()
        .filter_level(cli.log_level.parse().unwrap_or(log::LevelFilter::Info))
        .init();

    // 3. Config
    let config = resolve_config(&cli)?;

    // 4. Components
    let orchestrator = build(&cli, config);
    install_panic_hook(&orchestrator);

    // 5. Signals: SIGINT and SIGTERM end the process through shutdown
    let (stop_tx, stop_rx) = flume::bounded::<()>(1);
    let signal_tx = stop_tx.clone();
    ctrlc::set_handler(move || {
        let _ = signal_tx.try_send(());
    })
    .context("Cannot install signal handler")?;

    // 6. Command
    let result = match cli.command() {
        Command::Run { auto, delay } => run(&orchestrator, auto, delay, stop_tx, &stop_rx),
        Command::Once => once(&orchestrator, &stop_rx),
        Command::Pillow { level } => manual(&orchestrator, orchestrator.adjust_pillow_level(level), &stop_rx),
        Command::Deflate => manual(&orchestrator, orchestrator.deflate(), &stop_rx),
        Command::Status => {
            println!(
                "{}",
                console::json(&serde_json::json!({
                    "info": orchestrator.info(),
                    "settings": orchestrator.settings(),
                    "status": orchestrator.status(),
                }))
            );
            Ok(())
        }
    };

    // 7. Outputs off, always
    orchestrator.shutdown();
    result
}

/// Config file if present, defaults otherwise.
fn resolve_config(cli: &Cli) -> Result<SystemConfig> {
    if cli.config.exists() {
        sp_core::config::load_config(&cli.config)
    } else {
        log::warn!("Config not found: {}. Using defaults.", cli.config.display());
        Ok(SystemConfig::default())
    }
}

fn build(cli: &Cli, config: SystemConfig) -> DetectionOrchestrator {
    let store = Arc::new(SharedStateStore::new(
        &config.store,
        config.detection.detection_delay_minutes,
    ));
    let capture = AudioCaptureService::new(&config.audio, frame_source(cli.simulate), Arc::clone(&store));
    let engine = InferenceEngine::new(
        load_classifier(&config.model),
        &config.audio,
        &config.model,
        Arc::clone(&store),
    );
    let pins = if cli.simulate {
        Ok(memory_pins())
    } else {
        open_pins(&config.gpio)
    };
    let actuator = ActuatorController::new(pins, config.sequence.settle(), Arc::clone(&store));

    let sink: Arc<dyn EventSink> = match sink::JsonlSink::open(&cli.events) {
        Ok(sink) => {
            log::info!("Events appended to {}", sink.path().display());
            Arc::new(sink)
        }
        Err(e) => {
            log::warn!("Event file unavailable, events are not persisted: {e:#}");
            Arc::new(NullSink)
        }
    };

    DetectionOrchestrator::new(Components {
        config,
        store,
        capture,
        engine,
        actuator,
        sink,
    })
}

#[cfg(feature = "mic")]
fn frame_source(simulate: bool) -> Box<dyn FrameSource> {
    if simulate {
        Box::new(SyntheticSource::new(SIMULATED_TONE_HZ, 0.3).realtime(true))
    } else {
        Box::new(sp_audio::MicSource::new())
    }
}

#[cfg(not(feature = "mic"))]
fn frame_source(simulate: bool) -> Box<dyn FrameSource> {
    if !simulate {
        log::warn!("Built without microphone support; capturing a synthetic tone");
    }
    Box::new(SyntheticSource::new(SIMULATED_TONE_HZ, 0.3).realtime(true))
}

#[cfg(feature = "onnx")]
fn load_classifier(config: &ModelConfig) -> Result<Box<dyn Classifier>> {
    Ok(Box::new(sp_infer::OnnxClassifier::load(&config.path)?))
}

#[cfg(not(feature = "onnx"))]
fn load_classifier(config: &ModelConfig) -> Result<Box<dyn Classifier>> {
    anyhow::bail!("{}: built without ONNX support", config.path.display())
}

#[cfg(feature = "gpio")]
fn open_pins(config: &GpioConfig) -> Result<[ChannelPins; 2], ActuatorError> {
    sp_actuator::gpio::open_channels(config)
}

#[cfg(not(feature = "gpio"))]
fn open_pins(_config: &GpioConfig) -> Result<[ChannelPins; 2], ActuatorError> {
    Err(ActuatorError::Unavailable)
}

fn memory_pins() -> [ChannelPins; 2] {
    let journal = PinJournal::new();
    [1, 2].map(|n| ChannelPins {
        pump: journal.pin(format!("pump{n}")).boxed(),
        valve: journal.pin(format!("valve{n}")).boxed(),
    })
}

/// Force outputs off when a thread without its own guard panics.
fn install_panic_hook(orchestrator: &DetectionOrchestrator) {
    let orchestrator = orchestrator.clone();
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        default_hook(info);
        let contained = thread::current()
            .name()
            .is_some_and(|name| CONTAINED_THREADS.contains(&name));
        if !contained {
            orchestrator.shutdown();
        }
    }));
}

fn run(
    orchestrator: &DetectionOrchestrator,
    auto: bool,
    delay: Option<u32>,
    stop_tx: flume::Sender<()>,
    stop_rx: &flume::Receiver<()>,
) -> Result<()> {
    if let Some(minutes) = delay {
        println!("{}", orchestrator.set_detection_delay(minutes)?);
    }
    if auto {
        println!("{}", orchestrator.start()?);
    }

    let console = orchestrator.clone();
    thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            println!("{}", console::HELP);
            if console::serve(&console, io::stdin().lock()) {
                let _ = stop_tx.try_send(());
            }
        })
        .context("Cannot start console")?;

    let _ = stop_rx.recv();
    log::info!("Shutting down");
    Ok(())
}

fn once(orchestrator: &DetectionOrchestrator, stop_rx: &flume::Receiver<()>) -> Result<()> {
    let report = orchestrator.record_and_classify(None)?;
    println!("{}", console::json(&report));
    if report.triggered {
        wait_for_sequence(orchestrator, stop_rx);
    }
    Ok(())
}

fn manual(
    orchestrator: &DetectionOrchestrator,
    started: Result<String, ControlError>,
    stop_rx: &flume::Receiver<()>,
) -> Result<()> {
    println!("{}", started?);
    wait_for_sequence(orchestrator, stop_rx);
    Ok(())
}

/// Block until the running sequence ends or a signal arrives.
fn wait_for_sequence(orchestrator: &DetectionOrchestrator, stop_rx: &flume::Receiver<()>) {
    while !orchestrator.wait_for_sequence(SEQUENCE_POLL) {
        if stop_rx.try_recv().is_ok() {
            log::warn!("Interrupted; cancelling sequence");
            let _ = orchestrator.cancel_sequence();
            return;
        }
    }
}
