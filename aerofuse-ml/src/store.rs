//! Durable storage for calibration artifacts
//!
//! ## Layout
//!
//! [`JsonFileStore`] keeps one directory per pollutant:
//! ```text
//! <root>/pm25/v1.json
//! <root>/pm25/v2.json
//! <root>/pm25/ACTIVE        ← "2"
//! ```
//!
//! Every file is written to a temporary sibling and renamed into place, so
//! a crash leaves either the old or the new content, never a torn file.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use aerofuse_core::Pollutant;
use log::{debug, warn};

use crate::errors::{CalibrationError, CalibrationResult};
use crate::model::CalibrationParameters;

const ACTIVE_FILE: &str = "ACTIVE";

/// Persistence for trained models and the active-version pointer
pub trait ArtifactStore: Send + Sync {
    /// Persist a model; overwrites the same pollutant and version
    fn save(&self, params: &CalibrationParameters) -> CalibrationResult<()>;

    /// Load one model version
    fn load(&self, pollutant: Pollutant, version: u32) -> CalibrationResult<CalibrationParameters>;

    /// Stored versions, ascending
    fn versions(&self, pollutant: Pollutant) -> CalibrationResult<Vec<u32>>;

    /// Record the active version
    fn set_active(&self, pollutant: Pollutant, version: u32) -> CalibrationResult<()>;

    /// Recorded active version, if any
    fn active(&self, pollutant: Pollutant) -> CalibrationResult<Option<u32>>;
}

/// In-process store, mostly for tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    models: BTreeMap<(Pollutant, u32), CalibrationParameters>,
    active: HashMap<Pollutant, u32>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ArtifactStore for MemoryStore {
    fn save(&self, params: &CalibrationParameters) -> CalibrationResult<()> {
        self.lock().models.insert((params.pollutant, params.version), params.clone());
        Ok(())
    }

    fn load(&self, pollutant: Pollutant, version: u32) -> CalibrationResult<CalibrationParameters> {
        self.lock()
            .models
            .get(&(pollutant, version))
            .cloned()
            .ok_or(CalibrationError::ModelNotFound { pollutant, version: Some(version) })
    }

    fn versions(&self, pollutant: Pollutant) -> CalibrationResult<Vec<u32>> {
        Ok(self
            .lock()
            .models
            .keys()
            .filter(|(p, _)| *p == pollutant)
            .map(|(_, v)| *v)
            .collect())
    }

    fn set_active(&self, pollutant: Pollutant, version: u32) -> CalibrationResult<()> {
        self.lock().active.insert(pollutant, version);
        Ok(())
    }

    fn active(&self, pollutant: Pollutant) -> CalibrationResult<Option<u32>> {
        Ok(self.lock().active.get(&pollutant).copied())
    }
}

/// JSON files on local disk
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Store rooted at `root`; the directory is created if missing
    pub fn open(root: impl Into<PathBuf>) -> CalibrationResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pollutant_dir(&self, pollutant: Pollutant) -> PathBuf {
        self.root.join(pollutant.name())
    }

    fn model_path(&self, pollutant: Pollutant, version: u32) -> PathBuf {
        self.pollutant_dir(pollutant).join(format!("v{version}.json"))
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> CalibrationResult<()> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl ArtifactStore for JsonFileStore {
    fn save(&self, params: &CalibrationParameters) -> CalibrationResult<()> {
        fs::create_dir_all(self.pollutant_dir(params.pollutant))?;
        let path = self.model_path(params.pollutant, params.version);
        let json = serde_json::to_vec_pretty(params)?;
        Self::write_atomic(&path, &json)?;
        debug!("Saved calibration artifact {}", path.display());
        Ok(())
    }

    fn load(&self, pollutant: Pollutant, version: u32) -> CalibrationResult<CalibrationParameters> {
        let path = self.model_path(pollutant, version);
        if !path.exists() {
            return Err(CalibrationError::ModelNotFound { pollutant, version: Some(version) });
        }
        let bytes = fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn versions(&self, pollutant: Pollutant) -> CalibrationResult<Vec<u32>> {
        let dir = self.pollutant_dir(pollutant);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut versions = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            let parsed = name
                .strip_prefix('v')
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|n| n.parse::<u32>().ok());
            match parsed {
                Some(v) => versions.push(v),
                None if name == ACTIVE_FILE => {}
                None => debug!("Ignoring stray file {} in {}", name, dir.display()),
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    fn set_active(&self, pollutant: Pollutant, version: u32) -> CalibrationResult<()> {
        let dir = self.pollutant_dir(pollutant);
        fs::create_dir_all(&dir)?;
        Self::write_atomic(&dir.join(ACTIVE_FILE), version.to_string().as_bytes())
    }

    fn active(&self, pollutant: Pollutant) -> CalibrationResult<Option<u32>> {
        let path = self.pollutant_dir(pollutant).join(ACTIVE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        match text.trim().parse::<u32>() {
            Ok(v) => Ok(Some(v)),
            Err(_) => {
                warn!("Unreadable active pointer at {}: {:?}", path.display(), text);
                Err(CalibrationError::Storage(format!("invalid active pointer for {pollutant}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ErrorMetrics;
    use chrono::{TimeZone, Utc};

    fn params(pollutant: Pollutant, version: u32) -> CalibrationParameters {
        CalibrationParameters {
            pollutant,
            version,
            trained_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            use_satellite_feature: false,
            feature_means: [1.0; 7],
            feature_scales: [2.0; 7],
            weights: [0.5, 0.1, -0.2, 0.0, 0.0, 0.0, 0.01],
            intercept: 3.0,
            residual_std: 1.2,
            holdout: ErrorMetrics::compute(&[1.0, 2.0], &[1.5, 2.5]),
            sample_count: 40,
            train_count: 32,
            eval_count: 8,
            feature_importance: BTreeMap::new(),
        }
    }

    fn exercise(store: &dyn ArtifactStore) {
        assert_eq!(store.versions(Pollutant::No2).unwrap(), Vec::<u32>::new());
        assert_eq!(store.active(Pollutant::No2).unwrap(), None);

        store.save(&params(Pollutant::No2, 2)).unwrap();
        store.save(&params(Pollutant::No2, 1)).unwrap();
        store.save(&params(Pollutant::O3, 1)).unwrap();
        store.set_active(Pollutant::No2, 2).unwrap();

        assert_eq!(store.versions(Pollutant::No2).unwrap(), vec![1, 2]);
        assert_eq!(store.active(Pollutant::No2).unwrap(), Some(2));
        assert_eq!(store.load(Pollutant::No2, 2).unwrap(), params(Pollutant::No2, 2));
        assert!(matches!(
            store.load(Pollutant::No2, 9),
            Err(CalibrationError::ModelNotFound { version: Some(9), .. })
        ));
    }

    #[test]
    fn memory_store_round_trip() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("models")).unwrap();
        exercise(&store);

        assert!(store.root().join("no2").join("v2.json").exists());
        assert!(!store.root().join("no2").join("v2.tmp").exists());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonFileStore::open(dir.path()).unwrap();
            store.save(&params(Pollutant::Pm25, 3)).unwrap();
            store.set_active(Pollutant::Pm25, 3).unwrap();
        }
        let store = JsonFileStore::open(dir.path()).unwrap();
        assert_eq!(store.active(Pollutant::Pm25).unwrap(), Some(3));
        assert_eq!(store.load(Pollutant::Pm25, 3).unwrap().intercept, 3.0);
    }

    #[test]
    fn corrupt_active_pointer_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        fs::create_dir_all(dir.path().join("co")).unwrap();
        fs::write(dir.path().join("co").join(ACTIVE_FILE), "latest").unwrap();
        assert!(matches!(store.active(Pollutant::Co), Err(CalibrationError::Storage(_))));
    }
}
