//! Versioned calibration model registry
//!
//! ## Lifecycle
//!
//! Per pollutant:
//! ```text
//! Untrained ──train──▶ Trained(v1) ──train──▶ Trained(v2) ──activate(v1)──▶ Trained(v1)
//! ```
//! Every trained model is retained under `(pollutant, version)`. The active
//! pointer only moves when a candidate beats the incumbent on the
//! candidate's held-out samples, or on an explicit [`ModelRegistry::activate`].
//!
//! ## Concurrency
//!
//! - Parameters are immutable `Arc`s in a version table; readers clone the
//!   `Arc` and never hold a lock while predicting.
//! - The active version is an atomic per pollutant, swapped after the new
//!   entry is in the table and persisted.
//! - Training holds a [`TrainingLease`]; a second request for the same
//!   pollutant gets `AlreadyTraining` instead of queueing. Rollback through
//!   [`ModelRegistry::activate`] takes the same lease.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use aerofuse_core::Pollutant;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::errors::{CalibrationError, CalibrationResult};
use crate::features::{CalibrationSample, SensorFeatures};
use crate::metrics::ErrorMetrics;
use crate::model::{self, CalibrationConfig, CalibrationParameters, Prediction};
use crate::store::ArtifactStore;

/// Version 0 marks "no model"
const NO_VERSION: u32 = 0;

type ModelTable = HashMap<(Pollutant, u32), Arc<CalibrationParameters>>;

#[derive(Debug, Default)]
struct PollutantSlot {
    active: AtomicU32,
    latest: AtomicU32,
    training: AtomicBool,
}

/// Summary of the active model for one pollutant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationMetrics {
    /// Pollutant
    pub pollutant: Pollutant,
    /// Active version
    pub active_version: u32,
    /// Held-out R²
    pub r_squared: f64,
    /// Held-out RMSE
    pub rmse: f64,
    /// Held-out MAE
    pub mae: f64,
    /// Held-out bias
    pub bias: f64,
    /// Samples the model was trained with
    pub sample_count: usize,
    /// Training time
    pub trained_at: DateTime<Utc>,
}

/// Result of one successful training job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingOutcome {
    /// Pollutant trained
    pub pollutant: Pollutant,
    /// Version assigned to the candidate
    pub version: u32,
    /// Whether the candidate is now active
    pub promoted: bool,
    /// Candidate metrics on its held-out samples
    pub metrics: ErrorMetrics,
    /// Samples provided
    pub sample_count: usize,
    /// Active version before training
    pub previous_version: Option<u32>,
    /// Incumbent RMSE on the candidate's held-out samples
    pub incumbent_rmse: Option<f64>,
}

/// Thread-safe registry of calibration models
pub struct ModelRegistry {
    config: CalibrationConfig,
    models: RwLock<ModelTable>,
    slots: [PollutantSlot; 6],
    store: Option<Arc<dyn ArtifactStore>>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("config", &self.config)
            .field("models", &self.read().len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(CalibrationConfig::default())
    }
}

impl ModelRegistry {
    /// Empty, in-memory registry
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            models: RwLock::new(HashMap::new()),
            slots: Default::default(),
            store: None,
        }
    }

    /// Empty registry that persists to `store`
    pub fn with_store(config: CalibrationConfig, store: Arc<dyn ArtifactStore>) -> Self {
        Self { store: Some(store), ..Self::new(config) }
    }

    /// Registry reloaded from every artifact in `store`
    pub fn restore(config: CalibrationConfig, store: Arc<dyn ArtifactStore>) -> CalibrationResult<Self> {
        let registry = Self::with_store(config, store.clone());
        {
            let mut models = registry.write();
            for pollutant in Pollutant::ALL {
                let slot = registry.slot(pollutant);
                for version in store.versions(pollutant)? {
                    let params = store.load(pollutant, version)?;
                    models.insert((pollutant, version), Arc::new(params));
                    slot.latest.fetch_max(version, Ordering::AcqRel);
                }
                match store.active(pollutant)? {
                    Some(v) if models.contains_key(&(pollutant, v)) => {
                        slot.active.store(v, Ordering::Release);
                    }
                    Some(v) => warn!("Active pointer for {} names missing version {}", pollutant, v),
                    None => {}
                }
            }
            info!("Restored {} calibration models", models.len());
        }
        Ok(registry)
    }

    /// Training settings
    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    fn slot(&self, pollutant: Pollutant) -> &PollutantSlot {
        &self.slots[pollutant.index()]
    }

    fn read(&self) -> RwLockReadGuard<'_, ModelTable> {
        self.models.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ModelTable> {
        self.models.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the training slot for `pollutant`
    ///
    /// Fails with `AlreadyTraining` while another lease is alive.
    pub fn begin_training(&self, pollutant: Pollutant) -> CalibrationResult<TrainingLease<'_>> {
        let slot = self.slot(pollutant);
        if slot
            .training
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CalibrationError::AlreadyTraining { pollutant });
        }
        Ok(TrainingLease { registry: self, pollutant })
    }

    /// Train a candidate and promote it if it beats the active model
    pub fn train(
        &self,
        pollutant: Pollutant,
        samples: &[CalibrationSample],
        trained_at: DateTime<Utc>,
    ) -> CalibrationResult<TrainingOutcome> {
        self.begin_training(pollutant)?.train(samples, trained_at)
    }

    fn train_locked(
        &self,
        pollutant: Pollutant,
        samples: &[CalibrationSample],
        trained_at: DateTime<Utc>,
    ) -> CalibrationResult<TrainingOutcome> {
        let slot = self.slot(pollutant);
        let version = slot.latest.load(Ordering::Acquire) + 1;
        let candidate = model::fit(pollutant, samples, &self.config, version, trained_at)?;

        let incumbent = self.active(pollutant);
        let (_, holdout) = model::split(samples, self.config.train_fraction);
        let incumbent_rmse = incumbent.as_ref().map(|m| m.evaluate(holdout).rmse);
        let promoted = match incumbent_rmse {
            None => true,
            Some(rmse) => candidate.holdout.rmse < rmse,
        };

        if let Some(store) = &self.store {
            store.save(&candidate)?;
            if promoted {
                store.set_active(pollutant, version)?;
            }
        }

        let metrics = candidate.holdout;
        self.write().insert((pollutant, version), Arc::new(candidate));
        slot.latest.store(version, Ordering::Release);
        if promoted {
            slot.active.store(version, Ordering::Release);
            info!(
                "Promoted {} calibration v{} (rmse {:.3}, incumbent {:?})",
                pollutant, version, metrics.rmse, incumbent_rmse
            );
        } else {
            warn!(
                "Retained {} calibration v{} without promotion (rmse {:.3} vs incumbent {:?})",
                pollutant, version, metrics.rmse, incumbent_rmse
            );
        }

        Ok(TrainingOutcome {
            pollutant,
            version,
            promoted,
            metrics,
            sample_count: samples.len(),
            previous_version: incumbent.map(|m| m.version),
            incumbent_rmse,
        })
    }

    /// Active model, if any
    pub fn active(&self, pollutant: Pollutant) -> Option<Arc<CalibrationParameters>> {
        let version = self.slot(pollutant).active.load(Ordering::Acquire);
        if version == NO_VERSION {
            return None;
        }
        self.read().get(&(pollutant, version)).cloned()
    }

    /// Active version number, if any
    pub fn active_version(&self, pollutant: Pollutant) -> Option<u32> {
        match self.slot(pollutant).active.load(Ordering::Acquire) {
            NO_VERSION => None,
            v => Some(v),
        }
    }

    /// A retained model version
    pub fn get(&self, pollutant: Pollutant, version: u32) -> CalibrationResult<Arc<CalibrationParameters>> {
        self.read()
            .get(&(pollutant, version))
            .cloned()
            .ok_or(CalibrationError::ModelNotFound { pollutant, version: Some(version) })
    }

    /// Retained versions, ascending
    pub fn versions(&self, pollutant: Pollutant) -> Vec<u32> {
        let mut versions: Vec<u32> = self
            .read()
            .keys()
            .filter(|(p, _)| *p == pollutant)
            .map(|(_, v)| *v)
            .collect();
        versions.sort_unstable();
        versions
    }

    /// Make a retained version active, e.g. to roll back
    ///
    /// Holds the training lease while it runs, so a rollback and a promotion
    /// never interleave; `AlreadyTraining` while a job is in progress.
    pub fn activate(&self, pollutant: Pollutant, version: u32) -> CalibrationResult<()> {
        let _lease = self.begin_training(pollutant)?;
        self.get(pollutant, version)?;
        if let Some(store) = &self.store {
            store.set_active(pollutant, version)?;
        }
        let previous = self.slot(pollutant).active.swap(version, Ordering::AcqRel);
        info!("Activated {} calibration v{} (was v{})", pollutant, version, previous);
        Ok(())
    }

    /// Calibrated value from the active model
    pub fn predict(&self, pollutant: Pollutant, features: &SensorFeatures) -> CalibrationResult<Prediction> {
        let model = self
            .active(pollutant)
            .ok_or(CalibrationError::ModelNotFound { pollutant, version: None })?;
        Ok(model.predict(features))
    }

    /// Score the active model against `samples` without changing it
    pub fn evaluate(&self, pollutant: Pollutant, samples: &[CalibrationSample]) -> CalibrationResult<ErrorMetrics> {
        let model = self
            .active(pollutant)
            .ok_or(CalibrationError::ModelNotFound { pollutant, version: None })?;
        debug!("Evaluating {} v{} on {} samples", pollutant, model.version, samples.len());
        Ok(model.evaluate(samples))
    }

    /// Held-out metrics of the active model
    pub fn metrics(&self, pollutant: Pollutant) -> CalibrationResult<CalibrationMetrics> {
        let model = self
            .active(pollutant)
            .ok_or(CalibrationError::ModelNotFound { pollutant, version: None })?;
        Ok(CalibrationMetrics {
            pollutant,
            active_version: model.version,
            r_squared: model.holdout.r_squared,
            rmse: model.holdout.rmse,
            mae: model.holdout.mae,
            bias: model.holdout.bias,
            sample_count: model.sample_count,
            trained_at: model.trained_at,
        })
    }
}

/// Exclusive right to train one pollutant; released on drop
#[derive(Debug)]
pub struct TrainingLease<'a> {
    registry: &'a ModelRegistry,
    pollutant: Pollutant,
}

impl TrainingLease<'_> {
    /// Pollutant held
    pub fn pollutant(&self) -> Pollutant {
        self.pollutant
    }

    /// Train under this lease
    pub fn train(self, samples: &[CalibrationSample], trained_at: DateTime<Utc>) -> CalibrationResult<TrainingOutcome> {
        self.registry.train_locked(self.pollutant, samples, trained_at)
    }
}

impl Drop for TrainingLease<'_> {
    fn drop(&mut self) {
        self.registry.slot(self.pollutant).training.store(false, Ordering::Release);
    }
}
