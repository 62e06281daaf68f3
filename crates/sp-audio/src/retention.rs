use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// File name prefix of persisted clips.
pub const CLIP_PREFIX: &str = "recording_";
/// File extension of persisted clips.
pub const CLIP_EXTENSION: &str = "wav";

/// Whether `path` names a clip written by the capture service.
#[must_use]
pub fn is_clip(path: &Path) -> bool {
    let name_ok = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(CLIP_PREFIX));
    let ext_ok = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(CLIP_EXTENSION));
    name_ok && ext_ok
}

/// Clips in `dir`, oldest modification time first.
///
/// Entries whose metadata cannot be read are skipped.
///
/// # Errors
/// Returns an error if the directory cannot be listed.
pub fn list_clips(dir: &Path) -> io::Result<Vec<(PathBuf, SystemTime)>> {
    let mut clips: Vec<(PathBuf, SystemTime)> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_clip(path))
        .filter_map(|path| {
            let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
            Some((path, modified))
        })
        .collect();
    clips.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    Ok(clips)
}

/// Delete the oldest clips in `dir` so that at most `keep` remain.
///
/// Individual deletion failures are logged and skipped. Returns the paths
/// actually removed.
///
/// # Errors
/// Returns an error only if the directory cannot be listed.
pub fn sweep(dir: &Path, keep: usize) -> io::Result<Vec<PathBuf>> {
    let clips = list_clips(dir)?;
    let excess = clips.len().saturating_sub(keep);
    let mut removed = Vec::with_capacity(excess);
    for (path, _) in clips.into_iter().take(excess) {
        match fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(e) => log::warn!("Cannot remove old clip {}: {e}", path.display()),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::time::Duration;

    use super::*;

    fn touch(dir: &Path, name: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).expect("create");
        let mtime = SystemTime::now() - Duration::from_secs(age_secs);
        file.set_modified(mtime).expect("set mtime");
        path
    }

    #[test]
    fn only_recordings_are_considered() {
        assert!(is_clip(Path::new("/tmp/recording_20250101_000000_000.wav")));
        assert!(is_clip(Path::new("recording_x.WAV")));
        assert!(!is_clip(Path::new("notes.wav")));
        assert!(!is_clip(Path::new("recording_x.txt")));
    }

    #[test]
    fn sweep_removes_oldest_beyond_keep() {
        let dir = tempfile::tempdir().expect("tempdir");
        for i in 0..25u64 {
            touch(dir.path(), &format!("recording_{i:02}.wav"), 100 - i);
        }
        let unrelated = touch(dir.path(), "model.onnx", 1000);

        let removed = sweep(dir.path(), 20).expect("sweep");
        assert_eq!(removed.len(), 5);
        for i in 0..5 {
            assert!(!dir.path().join(format!("recording_{i:02}.wav")).exists());
        }
        assert!(dir.path().join("recording_05.wav").exists());
        assert!(unrelated.exists());
        assert_eq!(list_clips(dir.path()).expect("list").len(), 20);
    }

    #[test]
    fn sweep_under_limit_is_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "recording_a.wav", 10);
        assert!(sweep(dir.path(), 20).expect("sweep").is_empty());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(sweep(&dir.path().join("absent"), 20).is_err());
    }
}
