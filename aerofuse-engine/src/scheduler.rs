//! Periodic retraining
//!
//! The scheduler owns no thread. An embedding service calls
//! [`RetrainScheduler::tick`] from its own timer (cron, tokio interval, test
//! loop); each tick retrains every pollutant whose last attempt is older
//! than the interval.
//!
//! ```text
//! tick(t) ──→ due? ──yes──→ engine.train_calibration_at(p, [t - training_window, t))
//!               │                      │
//!               no                     └─→ last_attempt[p] = t
//! ```
//! The training window ends at the tick time, not at the engine clock, so a
//! replay or backfill trains on the data its bookkeeping claims.
//! An attempt counts even when it ends in `InsufficientData`, so a quiet
//! network is retried on the next interval rather than on every tick. An
//! `AlreadyTraining` result does not count: the pollutant stays due.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use aerofuse_core::{Pollutant, TimeRange};
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};

use crate::config::EngineConfig;
use crate::engine::{FusionEngine, TrainingReport};
use crate::errors::{EngineError, EngineResult};

/// Tracks retrain attempts per pollutant
#[derive(Debug)]
pub struct RetrainScheduler {
    interval: Duration,
    training_window: Duration,
    last_attempt: Mutex<HashMap<Pollutant, DateTime<Utc>>>,
}

impl RetrainScheduler {
    /// Scheduler retraining every `interval` on a trailing `training_window`
    pub fn new(interval: Duration, training_window: Duration) -> Self {
        Self {
            interval,
            training_window,
            last_attempt: Mutex::new(HashMap::new()),
        }
    }

    /// Scheduler using the engine's retrain settings
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.retrain_interval(), config.training_window())
    }

    /// Last recorded attempt
    pub fn last_attempt(&self, pollutant: Pollutant) -> Option<DateTime<Utc>> {
        self.last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pollutant)
            .copied()
    }

    /// Whether `pollutant` should be retrained at `now`
    pub fn due(&self, pollutant: Pollutant, now: DateTime<Utc>) -> bool {
        match self.last_attempt(pollutant) {
            None => true,
            Some(last) => now - last >= self.interval,
        }
    }

    /// Retrain every due pollutant of `engine`
    ///
    /// Returns one entry per pollutant attempted.
    pub fn tick(&self, engine: &FusionEngine, now: DateTime<Utc>) -> Vec<(Pollutant, EngineResult<TrainingReport>)> {
        let due: Vec<Pollutant> = engine
            .config()
            .pollutants
            .iter()
            .copied()
            .filter(|p| self.due(*p, now))
            .collect();

        due.into_iter()
            .map(|pollutant| {
                let result = TimeRange::trailing(now, self.training_window)
                    .map_err(EngineError::from)
                    .and_then(|range| engine.train_calibration_at(pollutant, &range));
                match &result {
                    Ok(TrainingReport::AlreadyTraining { .. }) => {}
                    Ok(report) => {
                        self.record(pollutant, now);
                        info!("Scheduled {} retrain: {}", pollutant, report_summary(report));
                    }
                    Err(e) => {
                        self.record(pollutant, now);
                        warn!("Scheduled {} retrain failed: {}", pollutant, e);
                    }
                }
                (pollutant, result)
            })
            .collect()
    }

    fn record(&self, pollutant: Pollutant, at: DateTime<Utc>) {
        self.last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pollutant, at);
    }
}

fn report_summary(report: &TrainingReport) -> String {
    match report {
        TrainingReport::Trained(o) => format!("v{} promoted={} rmse={:.3}", o.version, o.promoted, o.metrics.rmse),
        TrainingReport::InsufficientData { required, available, .. } => {
            format!("insufficient data ({available}/{required})")
        }
        TrainingReport::AlreadyTraining { .. } => "already training".to_string(),
    }
}
