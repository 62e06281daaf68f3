//! JSON-lines event file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local};
use serde::Serialize;
use sp_core::{DetectionRecord, EventSink, UserId};

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Event<'a> {
    Detection {
        user: Option<UserId>,
        #[serde(flatten)]
        record: &'a DetectionRecord,
    },
    Log {
        timestamp: DateTime<Local>,
        level: &'a str,
        user: Option<UserId>,
        message: &'a str,
    },
}

/// Appends every event as one JSON object per line.
pub struct JsonlSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlSink {
    /// Open `path` for appending, creating it and its parent directory.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("Cannot create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Cannot open {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, event: &Event<'_>) -> Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow!("{}: writer poisoned", self.path.display()))?;
        file.write_all(&line)
            .with_context(|| format!("Cannot write {}", self.path.display()))
    }
}

impl EventSink for JsonlSink {
    fn append_detection_record(&self, user: Option<UserId>, record: &DetectionRecord) -> Result<()> {
        self.write(&Event::Detection { user, record })
    }

    fn append_log(&self, message: &str, level: log::Level, user: Option<UserId>) -> Result<()> {
        self.write(&Event::Log {
            timestamp: Local::now(),
            level: level.as_str(),
            user,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sp_core::{ClassificationResult, ModelVariant};

    fn lines(path: &Path) -> Vec<serde_json::Value> {
        fs::read_to_string(path)
            .expect("read")
            .lines()
            .map(|l| serde_json::from_str(l).expect("json line"))
            .collect()
    }

    #[test]
    fn appends_one_object_per_event() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("events.jsonl");
        let sink = JsonlSink::open(&path).expect("open");

        let result = ClassificationResult {
            label: "snoring".into(),
            class_index: 1,
            confidence: 91.5,
            model_variant: ModelVariant::Legacy,
        };
        let record = DetectionRecord::new(&result, PathBuf::from("recording_1.wav"), true);
        sink.append_detection_record(Some(4), &record).expect("record");
        sink.append_log("Auto detection started", log::Level::Info, None)
            .expect("log");

        let events = lines(&path);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["kind"], "detection");
        assert_eq!(events[0]["user"], 4);
        assert_eq!(events[0]["label"], "snoring");
        assert_eq!(events[0]["actuation_triggered"], true);
        assert_eq!(events[1]["kind"], "log");
        assert_eq!(events[1]["level"], "INFO");
        assert!(events[1]["user"].is_null());
    }

    #[test]
    fn reopening_keeps_earlier_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.jsonl");
        JsonlSink::open(&path)
            .expect("open")
            .append_log("first", log::Level::Warn, Some(1))
            .expect("log");
        JsonlSink::open(&path)
            .expect("reopen")
            .append_log("second", log::Level::Error, None)
            .expect("log");

        let messages: Vec<_> = lines(&path)
            .iter()
            .map(|e| e["message"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(messages, ["first", "second"]);
    }
}
