//! Auto-run loop.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::RecvTimeoutError;
use log::Level;
use sp_core::CancelToken;

use crate::error::ControlError;
use crate::orchestrator::Inner;

/// Handle on a running loop thread.
pub(crate) struct LoopHandle {
    token: CancelToken,
    /// Disconnects when the loop exits.
    done: flume::Receiver<()>,
    thread: JoinHandle<()>,
}

impl LoopHandle {
    pub(crate) fn is_alive(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Cancel and wait at most `timeout`. Returns `false` if the thread
    /// was still running when the wait gave up; it is then detached.
    pub(crate) fn stop(self, timeout: Duration) -> bool {
        self.token.cancel();
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.thread.join().is_err() {
                    log::error!("Auto detection thread panicked");
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

pub(crate) fn spawn(inner: &Arc<Inner>) -> io::Result<LoopHandle> {
    let token = inner.root.child();
    let (done_tx, done_rx) = flume::bounded::<()>(1);
    let worker = Arc::clone(inner);
    let loop_token = token.clone();
    let thread = thread::Builder::new()
        .name("auto-detect".into())
        .spawn(move || {
            let _done = done_tx;
            supervise(&worker, &loop_token);
            log::debug!("Auto detection loop exited");
        })?;
    Ok(LoopHandle {
        token,
        done: done_rx,
        thread,
    })
}

/// Run cycles until cancelled or auto-run is switched off.
///
/// Waits are counted in ticks of the configured length, one tick per
/// second of nominal time, so a cancel is seen within one tick.
fn supervise(inner: &Arc<Inner>, token: &CancelToken) {
    let detection = &inner.config.detection;
    let tick = inner.config.sequence.tick();

    while !token.is_cancelled() {
        let status = inner.store.snapshot_status();
        if !status.auto_run {
            break;
        }
        if status.is_busy() {
            if !token.sleep_ticks(detection.busy_poll_secs, tick) {
                break;
            }
            continue;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| inner.cycle(None, Some(token))));
        if token.is_cancelled() {
            break;
        }
        let wait_secs = match outcome {
            Ok(Ok(report)) if report.detected => {
                let minutes = inner.store.snapshot_status().detection_delay_minutes;
                inner
                    .store
                    .append_log(format!("Snoring detected - Next detection in {minutes} minutes"));
                u64::from(minutes) * 60
            }
            Ok(Ok(_)) => detection.retry_secs,
            Ok(Err(ControlError::Busy(_))) => detection.busy_poll_secs,
            Ok(Err(ControlError::Capture(_) | ControlError::Inference(_))) => detection.retry_secs,
            Ok(Err(e)) => {
                inner.note(format!("Auto detection error: {e}"), Level::Error, None);
                detection.error_backoff_secs
            }
            Err(_) => {
                inner.note("Auto detection error: cycle panicked", Level::Error, None);
                detection.error_backoff_secs
            }
        };

        if !token.sleep_ticks(wait_secs, tick) {
            break;
        }
    }
}
