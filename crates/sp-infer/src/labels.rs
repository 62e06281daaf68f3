use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Label assigned to an index the table does not know.
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Deserialize)]
struct LabelMappingFile {
    class_to_index: HashMap<String, usize>,
}

/// Class index to label lookup, built from a `class_to_index` JSON map.
///
/// # Example
/// ```
/// use sp_infer::LabelTable;
/// let table = LabelTable::from_json(r#"{"class_to_index": {"not_snoring": 0, "snoring": 1}}"#).unwrap();
/// assert_eq!(table.resolve(1), "snoring");
/// assert_eq!(table.resolve(7), "Unknown");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelTable {
    index_to_label: HashMap<usize, String>,
}

impl LabelTable {
    /// # Errors
    /// Returns an error if the JSON is malformed or lacks `class_to_index`.
    pub fn from_json(text: &str) -> Result<Self> {
        let file: LabelMappingFile =
            serde_json::from_str(text).context("Invalid label mapping (expected class_to_index)")?;
        let index_to_label = file
            .class_to_index
            .into_iter()
            .map(|(label, index)| (index, label))
            .collect();
        Ok(Self { index_to_label })
    }

    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read label mapping: {}", path.display()))?;
        Self::from_json(&text)
    }

    #[must_use]
    pub fn resolve(&self, index: usize) -> String {
        self.index_to_label
            .get(&index)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index_to_label.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index_to_label.is_empty()
    }
}

/// Free-form model description, if present.
///
/// # Errors
/// Returns an error if the file exists but is not valid JSON.
pub fn load_metadata(path: &Path) -> Result<Option<serde_json::Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read model metadata: {}", path.display()))?;
    let value = serde_json::from_str(&text).context("Invalid model metadata JSON")?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_is_inverted() {
        let table = LabelTable::from_json(r#"{"class_to_index": {"quiet": 0, "snore": 1, "cough": 2}}"#)
            .expect("valid mapping");
        assert_eq!(table.len(), 3);
        assert_eq!(table.resolve(0), "quiet");
        assert_eq!(table.resolve(2), "cough");
        assert_eq!(table.resolve(3), UNKNOWN_LABEL);
    }

    #[test]
    fn mapping_without_class_to_index_is_rejected() {
        assert!(LabelTable::from_json(r#"{"labels": ["a", "b"]}"#).is_err());
        assert!(LabelTable::from_json("not json").is_err());
    }

    #[test]
    fn metadata_is_optional() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(load_metadata(&dir.path().join("absent.json")).expect("absent").is_none());

        let path = dir.path().join("meta.json");
        std::fs::write(&path, r#"{"accuracy": 0.93}"#).expect("write");
        let meta = load_metadata(&path).expect("load").expect("present");
        assert_eq!(meta["accuracy"], 0.93);

        std::fs::write(&path, "{").expect("write");
        assert!(load_metadata(&path).is_err());
    }
}
