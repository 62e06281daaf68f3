//! Timed actuation plans run on their own thread.

use std::sync::Arc;
use std::thread;

use log::Level;
use sp_actuator::{Action, ChannelId};
use sp_core::config::SystemConfig;
use sp_core::{CancelToken, Phase};

use crate::error::ControlError;
use crate::orchestrator::{Inner, lock};

/// What a sequence thread runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Plan {
    /// Automatic response to a confident detection.
    Response,
    /// Deflate, then inflate to level 1..=3.
    PillowLevel(u8),
    Deflate,
}

impl Plan {
    fn name(self) -> &'static str {
        match self {
            Self::Response => "Snoring response sequence",
            Self::PillowLevel(_) => "Pillow adjustment",
            Self::Deflate => "Deflation",
        }
    }

    pub(crate) fn is_automatic(self) -> bool {
        matches!(self, Self::Response)
    }

    fn steps(self, config: &SystemConfig) -> Vec<Step> {
        let seq = &config.sequence;
        let pillow = &config.pillow;
        match self {
            Self::Response => vec![
                Step::Hold {
                    channel: ChannelId::One,
                    secs: seq.stage1_secs,
                    phase: Phase::Stage1,
                },
                Step::Wait {
                    secs: seq.interval_secs,
                },
                Step::Hold {
                    channel: ChannelId::Two,
                    secs: seq.stage2_secs,
                    phase: Phase::Stage2,
                },
            ],
            Self::PillowLevel(level) => {
                let inflate = pillow
                    .level_secs
                    .get(usize::from(level.saturating_sub(1)))
                    .copied()
                    .unwrap_or_default();
                vec![
                    Step::Hold {
                        channel: ChannelId::Two,
                        secs: pillow.pre_deflate_secs,
                        phase: Phase::Manual,
                    },
                    Step::Hold {
                        channel: ChannelId::One,
                        secs: inflate,
                        phase: Phase::Manual,
                    },
                ]
            }
            Self::Deflate => vec![Step::Hold {
                channel: ChannelId::Two,
                secs: pillow.deflate_secs,
                phase: Phase::Manual,
            }],
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Step {
    /// Engage a channel for `secs` ticks, then release it.
    Hold { channel: ChannelId, secs: u64, phase: Phase },
    /// Idle between holds, logging progress.
    Wait { secs: u64 },
}

#[derive(Debug)]
enum Outcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// Handle on the sequence currently holding the sequence-active slot.
pub(crate) struct RunningSequence {
    pub(crate) plan: Plan,
    token: CancelToken,
    /// Disconnects when the thread exits.
    done: flume::Receiver<()>,
}

impl RunningSequence {
    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    pub(crate) fn waiter(&self) -> flume::Receiver<()> {
        self.done.clone()
    }
}

/// Run `plan` on a new thread, cancelled together with `parent`.
///
/// The caller must already hold the sequence-active slot; it is released
/// here if the thread cannot be started, and by the thread's finalizer
/// otherwise.
pub(crate) fn spawn(inner: &Arc<Inner>, plan: Plan, parent: &CancelToken) -> Result<(), ControlError> {
    let token = parent.child();
    let (done_tx, done_rx) = flume::bounded::<()>(1);
    *lock(&inner.sequence) = Some(RunningSequence {
        plan,
        token: token.clone(),
        done: done_rx,
    });

    let worker = Arc::clone(inner);
    let spawned = thread::Builder::new()
        .name("actuation".into())
        .spawn(move || {
            let _done = done_tx;
            let mut finalizer = Finalizer {
                inner: &worker,
                clean: false,
            };
            finalizer.clean = run(&worker, &token, plan);
        });

    if let Err(e) = spawned {
        *lock(&inner.sequence) = None;
        inner.store.end_sequence();
        return Err(ControlError::Sequence(format!("cannot start thread: {e}")));
    }
    Ok(())
}

/// Releases the sequence slot on every exit path; forces all outputs off
/// unless the plan completed.
struct Finalizer<'a> {
    inner: &'a Inner,
    clean: bool,
}

impl Drop for Finalizer<'_> {
    fn drop(&mut self) {
        if !self.clean {
            if thread::panicking() {
                log::error!("Actuation thread panicked; forcing outputs off");
            }
            self.inner.actuator.shutdown_all();
        }
        *lock(&self.inner.sequence) = None;
        let _ = self.inner.store.transition_phase(
            &[Phase::Stage1, Phase::Interval, Phase::Stage2, Phase::Manual],
            Phase::Idle,
        );
        self.inner.store.end_sequence();
    }
}

fn run(inner: &Inner, token: &CancelToken, plan: Plan) -> bool {
    inner.note(format!("Starting {}", plan.name().to_lowercase()), Level::Info, None);
    match execute(inner, token, plan) {
        Outcome::Completed => {
            inner.note(format!("{} completed successfully", plan.name()), Level::Info, None);
            true
        }
        Outcome::Cancelled => {
            inner.note(format!("{} interrupted", plan.name()), Level::Warn, None);
            false
        }
        Outcome::Failed(msg) => {
            inner.note(format!("{} failed: {msg}", plan.name()), Level::Error, None);
            false
        }
    }
}

fn execute(inner: &Inner, token: &CancelToken, plan: Plan) -> Outcome {
    let tick = inner.config.sequence.tick();
    let every = inner.config.sequence.progress_every_secs.max(1);

    for step in plan.steps(&inner.config) {
        match step {
            Step::Hold { channel, secs, phase } => {
                if token.is_cancelled() {
                    return Outcome::Cancelled;
                }
                inner.set_phase(phase);
                inner
                    .store
                    .append_log(format!("Activating pump {channel} & valve {channel} for {secs} seconds"));
                if let Err(e) = inner.actuator.engage(channel, Action::On) {
                    return Outcome::Failed(e.to_string());
                }
                if !token.sleep_ticks(secs, tick) {
                    if let Err(e) = inner.actuator.engage(channel, Action::Off) {
                        log::error!("Channel {channel} release after cancel failed: {e}");
                    }
                    return Outcome::Cancelled;
                }
                if let Err(e) = inner.actuator.engage(channel, Action::Off) {
                    return Outcome::Failed(e.to_string());
                }
            }
            Step::Wait { secs } => {
                inner.set_phase(Phase::Interval);
                inner
                    .store
                    .append_log(format!("Waiting {secs} seconds before next action"));
                let completed = token.sleep_ticks_with(secs, tick, |done| {
                    if done % every == 0 {
                        let minutes = (secs - done) / 60;
                        inner.store.append_log(format!("Waiting... {minutes} minutes remaining"));
                    }
                });
                if !completed {
                    return Outcome::Cancelled;
                }
            }
        }
    }
    Outcome::Completed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_plan_uses_configured_stages() {
        let config = SystemConfig::default();
        let steps = Plan::Response.steps(&config);
        assert_eq!(steps.len(), 3);
        assert!(matches!(
            steps[0],
            Step::Hold {
                channel: ChannelId::One,
                secs: 50,
                phase: Phase::Stage1
            }
        ));
        assert!(matches!(steps[1], Step::Wait { secs: 60 }));
        assert!(matches!(
            steps[2],
            Step::Hold {
                channel: ChannelId::Two,
                secs: 20,
                ..
            }
        ));
    }

    #[test]
    fn pillow_levels_deflate_then_inflate() {
        let config = SystemConfig::default();
        for (level, inflate) in [(1, 15), (2, 30), (3, 50)] {
            let steps = Plan::PillowLevel(level).steps(&config);
            assert!(matches!(
                steps[0],
                Step::Hold {
                    channel: ChannelId::Two,
                    secs: 20,
                    ..
                }
            ));
            assert!(matches!(steps[1], Step::Hold { channel: ChannelId::One, secs, .. } if secs == inflate));
        }
        assert!(matches!(
            Plan::Deflate.steps(&config)[..],
            [Step::Hold {
                channel: ChannelId::Two,
                secs: 30,
                ..
            }]
        ));
    }
}
