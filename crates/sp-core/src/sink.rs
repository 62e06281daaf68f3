use crate::types::{DetectionRecord, UserId};

/// Persistent destination for detections and operator-visible log lines.
///
/// Calls are fire-and-forget from the caller's point of view: the
/// orchestrator logs a returned error and carries on.
///
/// # Example
/// ```
/// use sp_core::sink::{EventSink, NullSink};
/// let sink = NullSink;
/// assert!(sink.append_log("started", log::Level::Info, None).is_ok());
/// ```
pub trait EventSink: Send + Sync {
    /// Persist one classified clip.
    ///
    /// # Errors
    /// Returns an error if the record could not be stored.
    fn append_detection_record(&self, user: Option<UserId>, record: &DetectionRecord) -> anyhow::Result<()>;

    /// Persist one log line.
    ///
    /// # Errors
    /// Returns an error if the line could not be stored.
    fn append_log(&self, message: &str, level: log::Level, user: Option<UserId>) -> anyhow::Result<()>;
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn append_detection_record(&self, _user: Option<UserId>, _record: &DetectionRecord) -> anyhow::Result<()> {
        Ok(())
    }

    fn append_log(&self, _message: &str, _level: log::Level, _user: Option<UserId>) -> anyhow::Result<()> {
        Ok(())
    }
}
