//! Persistence for trained pattern references.
//!
//! Each pattern's latest [`TrainingResult`] is stored as pretty JSON at
//! `<dir>/<pattern>.json`.

use crate::core::{FeatureVector, PatternClassifier, TrainingResult};
use std::path::{Path, PathBuf};

/// Directory-backed store of training results.
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, pattern: &str) -> PathBuf {
        self.dir.join(format!("{pattern}.json"))
    }

    /// Save a training result, replacing any earlier one for the pattern.
    pub fn save(&self, result: &TrainingResult) -> Result<PathBuf, StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StoreError::IoError(e.to_string()))?;
        let json = serde_json::to_string_pretty(result)
            .map_err(|e| StoreError::SerializeError(e.to_string()))?;
        let path = self.path_for(&result.pattern_name);
        std::fs::write(&path, json).map_err(|e| StoreError::IoError(e.to_string()))?;
        Ok(path)
    }

    /// Load the stored result for a pattern, if any.
    pub fn load(&self, pattern: &str) -> Result<Option<TrainingResult>, StoreError> {
        let path = self.path_for(pattern);
        if !path.exists() {
            return Ok(None);
        }
        read_result(&path).map(Some)
    }

    /// Load every stored result, sorted by pattern name.
    pub fn load_all(&self) -> Result<Vec<TrainingResult>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries =
            std::fs::read_dir(&self.dir).map_err(|e| StoreError::IoError(e.to_string()))?;

        let mut results = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::IoError(e.to_string()))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                results.push(read_result(&path)?);
            }
        }
        results.sort_by(|a, b| a.pattern_name.cmp(&b.pattern_name));
        Ok(results)
    }

    /// Delete a pattern's stored result. Returns `false` if none existed.
    pub fn remove(&self, pattern: &str) -> Result<bool, StoreError> {
        let path = self.path_for(pattern);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).map_err(|e| StoreError::IoError(e.to_string()))?;
        Ok(true)
    }

    /// Install every stored reference into the classifier.
    ///
    /// Results for unregistered patterns, or whose length no longer fits the
    /// pattern's modality, are skipped with a warning. Returns the number
    /// installed.
    pub fn install_into(&self, classifier: &mut PatternClassifier) -> Result<usize, StoreError> {
        let mut installed = 0;
        for result in self.load_all()? {
            let reference = FeatureVector::new(result.features);
            match classifier.set_reference(&result.pattern_name, reference) {
                Ok(()) => installed += 1,
                Err(e) => {
                    tracing::warn!(pattern = %result.pattern_name, "skipping stored model: {e}")
                }
            }
        }
        Ok(installed)
    }
}

fn read_result(path: &Path) -> Result<TrainingResult, StoreError> {
    let content = std::fs::read_to_string(path).map_err(|e| StoreError::IoError(e.to_string()))?;
    serde_json::from_str(&content)
        .map_err(|e| StoreError::ParseError(format!("{}: {e}", path.display())))
}

/// Model store errors.
#[derive(Debug)]
pub enum StoreError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::IoError(e) => write!(f, "IO error: {e}"),
            StoreError::ParseError(e) => write!(f, "Parse error: {e}"),
            StoreError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::Modality;
    use crate::core::PatternDefinition;

    fn result(pattern: &str, features: Vec<f64>) -> TrainingResult {
        TrainingResult {
            pattern_name: pattern.to_string(),
            accuracy: 1.0,
            samples: 5,
            features,
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("models"));

        assert!(store.load("kettle").unwrap().is_none());
        let saved = result("kettle", vec![0.0, 1.0, 0.5]);
        let path = store.save(&saved).unwrap();
        assert!(path.ends_with("kettle.json"));
        assert_eq!(store.load("kettle").unwrap(), Some(saved));
    }

    #[test]
    fn test_load_all_sorted_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        store.save(&result("washer", vec![0.2; 4])).unwrap();
        store.save(&result("kettle", vec![0.1; 3])).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let all = store.load_all().unwrap();
        let names: Vec<&str> = all.iter().map(|r| r.pattern_name.as_str()).collect();
        assert_eq!(names, vec!["kettle", "washer"]);

        assert!(store.remove("kettle").unwrap());
        assert!(!store.remove("kettle").unwrap());
        assert_eq!(store.load_all().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("absent"));
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kettle.json"), "{not json").unwrap();
        let store = ModelStore::new(dir.path());
        assert!(matches!(store.load("kettle"), Err(StoreError::ParseError(_))));
    }

    #[test]
    fn test_install_into_skips_unknown_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        store.save(&result("kettle", vec![0.0, 1.0, 0.5])).unwrap();
        store.save(&result("toaster", vec![0.0, 1.0, 0.5])).unwrap();

        let mut classifier = PatternClassifier::default();
        classifier
            .register(PatternDefinition::new("kettle", Modality::Audio, 0.7))
            .unwrap();

        assert_eq!(store.install_into(&mut classifier).unwrap(), 1);
        assert!(classifier.reference("kettle").is_some());
    }
}
