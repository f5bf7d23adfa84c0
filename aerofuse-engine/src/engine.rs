//! Fusion run orchestration
//!
//! ## Run Pipeline
//!
//! ```text
//! readings ──┐
//!            ├─→ align ─→ cross-validate ─→ predict ─→ fuse per (window, cell) ─┐
//! satellite ─┘            (health, alerts)   (or raw)                            ├─→ FusionReport
//!                                                       gap-fill uncovered cells ─┘
//! ```
//! Stages run per configured pollutant. The run budget is checked between
//! stages, after each window of satellite queries and before each fused
//! site; when it runs out the report keeps the points finished so far and
//! is marked `Incomplete { RunTimeout }`.
//!
//! Upstream queries run on a worker thread and are waited for only as long
//! as the budget has left, so a stalled source cannot hold the run past its
//! budget. The stalled worker is left to finish on its own and its result is
//! discarded.
//!
//! ## Degradation
//!
//! | Condition                         | Effect                                     |
//! |-----------------------------------|--------------------------------------------|
//! | sensor source fails               | satellite-only gap fill                    |
//! | satellite query fails / empty     | sensor-only points for that window         |
//! | no active calibration model       | raw values at reduced confidence           |
//! | sensor drifting                   | kept, down-weighted, excluded from training|
//! | nothing for a site                | no point (`NoContributingSource`, logged)  |
//!
//! ## Concurrency
//!
//! The engine is `Send + Sync` and meant to be shared behind an `Arc`.
//! Identical requests (same region, snapped range and pollutant set) that
//! overlap in time are computed once and share the `Arc<FusionReport>`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration as StdDuration;

use aerofuse_core::aqi::BreakpointTable;
use aerofuse_core::constants::fusion::SPARSE_WINDOW_CONFIDENCE_FACTOR;
use aerofuse_core::events::NullSink;
use aerofuse_core::fusion::{FusionSite, SatelliteContribution, SensorContribution};
use aerofuse_core::temporal::{Reference, SensorWindow, Window};
use aerofuse_core::{
    Alignment, BoundingBox, CellId, Clock, CrossValidator, EngineEvent, EventSink, FusedDataPoint, FusionAggregator,
    FusionError, FusionReport, FusionResult, GeoPoint, HealthTracker, Pollutant, Resolution, RunStatus,
    SatelliteObservation, SensorReading, SystemClock, TemporalAligner, TimeRange, ValidationResult,
};
use aerofuse_ml::{CalibrationError, CalibrationMetrics, CalibrationSample, ModelRegistry, SensorFeatures, TrainingOutcome};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::errors::EngineResult;
use crate::inflight::InFlightRuns;
use crate::sources::{SatelliteSource, SensorReadingSource, SourceError};

/// Outcome of a calibration request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrainingReport {
    /// A candidate was trained (and maybe promoted)
    Trained(TrainingOutcome),
    /// Too few aligned samples; active model unchanged
    InsufficientData {
        /// Pollutant requested
        pollutant: Pollutant,
        /// Training minimum
        required: usize,
        /// Samples gathered
        available: usize,
    },
    /// Another job holds the pollutant's training slot
    AlreadyTraining {
        /// Pollutant requested
        pollutant: Pollutant,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RunKey {
    bbox: [u64; 4],
    span: TimeRange,
    pollutants: Vec<Pollutant>,
}

impl RunKey {
    fn new(bbox: &BoundingBox, span: TimeRange, pollutants: &[Pollutant]) -> Self {
        Self {
            bbox: [bbox.north, bbox.south, bbox.east, bbox.west].map(f64::to_bits),
            span,
            pollutants: pollutants.to_vec(),
        }
    }
}

type ValidationKey = (String, Pollutant, DateTime<Utc>, DateTime<Utc>);

/// Where a fused point sits: a satellite cell, or a lone sensor
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SiteKey {
    Cell { window: i64, source: String, cell: CellId },
    Sensor { window: i64, sensor_id: String },
}

struct SiteGroup<'a> {
    window: Window,
    reference: Option<&'a Reference>,
    sensors: Vec<SensorContribution>,
}

struct RunBudget<'a> {
    clock: &'a dyn Clock,
    started_ms: u64,
    budget_ms: u64,
}

impl<'a> RunBudget<'a> {
    fn start(clock: &'a dyn Clock, budget_ms: u64) -> Self {
        Self {
            clock,
            started_ms: clock.monotonic_ms(),
            budget_ms,
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.clock.monotonic_ms().saturating_sub(self.started_ms)
    }

    fn check(&self) -> FusionResult<()> {
        let elapsed_ms = self.elapsed_ms();
        if elapsed_ms > self.budget_ms {
            return Err(FusionError::RunTimeout {
                budget_ms: self.budget_ms,
                elapsed_ms,
            });
        }
        Ok(())
    }

    fn remaining(&self) -> StdDuration {
        StdDuration::from_millis(self.budget_ms.saturating_sub(self.elapsed_ms()))
    }

    /// Run an upstream call, waiting no longer than the budget has left
    fn bounded<T, F>(&self, call: F) -> FusionResult<Result<T, SourceError>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, SourceError> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            // Receiver is gone once the run has given up on this call
            let _ = tx.send(call());
        });
        match rx.recv_timeout(self.remaining()) {
            Ok(result) => Ok(result),
            Err(RecvTimeoutError::Timeout) => Err(FusionError::RunTimeout {
                budget_ms: self.budget_ms,
                elapsed_ms: self.elapsed_ms().max(self.budget_ms),
            }),
            Err(RecvTimeoutError::Disconnected) => Ok(Err(SourceError::Unavailable("upstream call panicked".into()))),
        }
    }
}

/// Air-quality data fusion engine
pub struct FusionEngine {
    config: EngineConfig,
    resolution: Resolution,
    readings: Arc<dyn SensorReadingSource>,
    satellites: Arc<dyn SatelliteSource>,
    registry: Arc<ModelRegistry>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    aligner: TemporalAligner,
    validator: CrossValidator,
    aggregator: FusionAggregator,
    health: Mutex<HealthTracker>,
    validations: Mutex<BTreeMap<ValidationKey, ValidationResult>>,
    in_flight: InFlightRuns<RunKey, Arc<FusionReport>>,
}

impl std::fmt::Debug for FusionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionEngine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

impl FusionEngine {
    /// Engine over two upstream sources
    ///
    /// Starts with an empty in-memory registry, the system clock and no
    /// event sink.
    pub fn new(
        config: EngineConfig,
        readings: Arc<dyn SensorReadingSource>,
        satellites: Arc<dyn SatelliteSource>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let resolution = config.resolution()?;
        Ok(Self {
            resolution,
            readings,
            satellites,
            registry: Arc::new(ModelRegistry::new(config.calibration.clone())),
            sink: Arc::new(NullSink),
            clock: Arc::new(SystemClock::new()),
            aligner: TemporalAligner::new(resolution, config.aligner.clone()),
            validator: CrossValidator::new(config.validator.clone()),
            aggregator: FusionAggregator::new(config.fusion.clone(), BreakpointTable::default()),
            health: Mutex::new(HealthTracker::new()),
            validations: Mutex::new(BTreeMap::new()),
            in_flight: InFlightRuns::new(),
            config,
        })
    }

    /// Publish events to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Use `clock` for timestamps and run budgets
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an existing registry, e.g. one restored from disk
    pub fn with_registry(mut self, registry: Arc<ModelRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Map concentrations with a custom AQI table
    pub fn with_breakpoints(mut self, breakpoints: BreakpointTable) -> Self {
        self.aggregator = FusionAggregator::new(self.config.fusion.clone(), breakpoints);
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Calibration registry
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Fuse every configured pollutant over a region and range
    ///
    /// The range is snapped outward to whole windows. A concurrent call
    /// with the same region, snapped range and pollutants joins the run in
    /// flight and receives the same report.
    pub fn fuse(&self, bbox: &BoundingBox, range: &TimeRange) -> EngineResult<Arc<FusionReport>> {
        bbox.validate()?;
        let span = self.resolution.snap(range);
        let key = RunKey::new(bbox, span, &self.config.pollutants);
        self.in_flight.run(key, || Ok(Arc::new(self.execute(bbox, &span))))
    }

    fn execute(&self, bbox: &BoundingBox, span: &TimeRange) -> FusionReport {
        let budget = RunBudget::start(self.clock.as_ref(), self.config.run_budget_ms);
        let mut points = Vec::new();
        let status = match self.run_stages(bbox, span, &budget, &mut points) {
            Ok(()) => RunStatus::Complete,
            Err(reason) => {
                warn!("Fusion run {}..{} stopped early: {}", span.start, span.end, reason);
                RunStatus::Incomplete { reason }
            }
        };

        let report = FusionReport::new(points, status, self.config.pollutants.clone(), *span);
        info!(
            "Fusion run {}..{} produced {} points (confidence {:.2}, complete: {})",
            span.start,
            span.end,
            report.points.len(),
            report.summary_confidence,
            report.status.is_complete()
        );
        self.publish_completed(&report);
        report
    }

    fn run_stages(
        &self,
        bbox: &BoundingBox,
        span: &TimeRange,
        budget: &RunBudget<'_>,
        points: &mut Vec<FusedDataPoint>,
    ) -> FusionResult<()> {
        let readings = self.query_readings(bbox, span, budget)?;
        debug!("Fusion run {}..{}: {} readings", span.start, span.end, readings.len());

        for &pollutant in &self.config.pollutants {
            let mut stage_points = Vec::new();
            let stage = budget
                .check()
                .and_then(|()| self.fuse_pollutant(pollutant, bbox, span, &readings, budget, &mut stage_points));
            stage_points.sort_by_key(|p| p.timestamp);
            points.append(&mut stage_points);

            if let Err(reason) = stage {
                debug!("Stage {} stopped after {} points", pollutant, points.len());
                return Err(reason);
            }
        }
        Ok(())
    }

    fn query_readings(
        &self,
        bbox: &BoundingBox,
        span: &TimeRange,
        budget: &RunBudget<'_>,
    ) -> FusionResult<Vec<SensorReading>> {
        let source = Arc::clone(&self.readings);
        let (range, area) = (*span, *bbox);
        match budget.bounded(move || source.query(None, &range, Some(&area)))? {
            Ok(readings) => Ok(readings),
            Err(e) => {
                warn!("Sensor source failed for {}..{}: {}; continuing without sensors", span.start, span.end, e);
                Ok(Vec::new())
            }
        }
    }

    fn fuse_pollutant(
        &self,
        pollutant: Pollutant,
        bbox: &BoundingBox,
        span: &TimeRange,
        readings: &[SensorReading],
        budget: &RunBudget<'_>,
        points: &mut Vec<FusedDataPoint>,
    ) -> FusionResult<()> {
        let observations = self.gather_observations(pollutant, bbox, span, Some(budget))?;
        let alignment = self.aligner.align(pollutant, readings, &observations, span);
        let verdicts = self.record_validation(&alignment);
        budget.check()?;

        if self.registry.active_version(pollutant).is_none() {
            debug!("No active {} calibration; fusing raw sensor values", pollutant);
        }

        let mut groups: BTreeMap<SiteKey, SiteGroup<'_>> = BTreeMap::new();
        for window in &alignment.windows {
            let key = match &window.reference {
                Some(r) => SiteKey::Cell {
                    window: window.window.index,
                    source: r.source.clone(),
                    cell: r.cell,
                },
                None => SiteKey::Sensor {
                    window: window.window.index,
                    sensor_id: window.sensor_id.clone(),
                },
            };
            let contribution = self.contribution(window, verdicts.get(window.sensor_id.as_str()));
            groups
                .entry(key)
                .or_insert_with(|| SiteGroup {
                    window: window.window,
                    reference: window.reference.as_ref(),
                    sensors: Vec::new(),
                })
                .sensors
                .push(contribution);
        }

        // Locations of sensor-backed cell sites per window, whatever product paired them
        let mut fused_sites: HashMap<i64, Vec<GeoPoint>> = HashMap::new();
        for (key, group) in &groups {
            budget.check()?;
            let location = group
                .reference
                .and_then(|r| cell_center(&observations, r))
                .unwrap_or_else(|| mean_location(&group.sensors));
            let cell = match key {
                SiteKey::Cell { window, cell, .. } => {
                    fused_sites.entry(*window).or_default().push(location);
                    Some(*cell)
                }
                SiteKey::Sensor { .. } => None,
            };
            let satellite = group.reference.map(|r| SatelliteContribution {
                source: r.source.clone(),
                value: r.value,
                uncertainty: r.uncertainty,
                quality: r.quality,
            });
            let site = FusionSite {
                pollutant,
                timestamp: group.window.start,
                location,
                cell,
            };
            self.push_point(site, &group.sensors, satellite.as_ref(), points);
        }

        for window in self.resolution.windows(span) {
            budget.check()?;
            let Some(best) = best_observation(&observations, &window) else {
                continue;
            };
            let Ok(grid) = best.grid() else {
                warn!("Skipping {} observation with unusable grid", best.source);
                continue;
            };
            let covered: HashSet<CellId> = fused_sites
                .get(&window.index)
                .map(|sites| sites.iter().filter_map(|p| grid.locate(p)).collect())
                .unwrap_or_default();
            for cell in grid.cells_within(bbox) {
                if covered.contains(&cell) {
                    continue;
                }
                let (Some(value), Some(location)) = (best.cells.get(&cell), grid.cell_center(cell)) else {
                    continue;
                };
                let satellite = SatelliteContribution {
                    source: best.source.clone(),
                    value: value.value,
                    uncertainty: value.uncertainty,
                    quality: best.quality,
                };
                let site = FusionSite {
                    pollutant,
                    timestamp: window.start,
                    location,
                    cell: Some(cell),
                };
                self.push_point(site, &[], Some(&satellite), points);
            }
        }
        Ok(())
    }

    fn push_point(
        &self,
        site: FusionSite,
        sensors: &[SensorContribution],
        satellite: Option<&SatelliteContribution>,
        points: &mut Vec<FusedDataPoint>,
    ) {
        match self.aggregator.fuse(site, sensors, satellite) {
            Ok(point) => points.push(point),
            Err(e) => debug!("No {} point at {:?} {}: {}", site.pollutant, site.cell, site.timestamp, e),
        }
    }

    /// One query per window and configured source
    fn gather_observations(
        &self,
        pollutant: Pollutant,
        bbox: &BoundingBox,
        span: &TimeRange,
        budget: Option<&RunBudget<'_>>,
    ) -> FusionResult<Vec<SatelliteObservation>> {
        let mut observations = Vec::new();
        for window in self.resolution.windows(span) {
            for source in &self.config.satellite_sources {
                let result = match budget {
                    Some(budget) => {
                        let satellites = Arc::clone(&self.satellites);
                        let (name, range, area) = (source.clone(), window.range(), *bbox);
                        budget.bounded(move || satellites.query(&name, pollutant, &range, &area))?
                    }
                    None => self.satellites.query(source, pollutant, &window.range(), bbox),
                };
                match result {
                    Ok(Some(obs)) => observations.push(obs),
                    Ok(None) => debug!("No {} {} observation for window {}", source, pollutant, window.index),
                    Err(e) => warn!("Satellite source {} failed for window {}: {}", source, window.index, e),
                }
            }
            if let Some(budget) = budget {
                budget.check()?;
            }
        }
        Ok(observations)
    }

    /// Cross-validate, fold verdicts into health, publish transitions
    fn record_validation(&self, alignment: &Alignment) -> HashMap<String, ValidationResult> {
        let results = self.validator.validate_alignment(alignment);
        let now = self.clock.now();

        let signals: Vec<_> = {
            let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
            results.iter().filter_map(|r| health.observe(r, now)).collect()
        };
        {
            let mut history = self.validations.lock().unwrap_or_else(PoisonError::into_inner);
            for r in &results {
                history.insert((r.sensor_id.clone(), r.pollutant, r.window.start, r.window.end), r.clone());
            }
        }
        for signal in signals {
            self.sink.publish(&EngineEvent::AnomalyDetected(signal));
        }

        results.into_iter().map(|r| (r.sensor_id.clone(), r)).collect()
    }

    fn contribution(&self, window: &SensorWindow, verdict: Option<&ValidationResult>) -> SensorContribution {
        let features = SensorFeatures::from_window(window);
        let (value, mut confidence) = match self.registry.predict(window.pollutant, &features) {
            Ok(prediction) => (prediction.value, prediction.confidence),
            Err(_) => (window.value, self.config.fusion.uncalibrated_confidence),
        };
        if window.sparse {
            confidence *= SPARSE_WINDOW_CONFIDENCE_FACTOR;
        }
        SensorContribution {
            sensor_id: window.sensor_id.clone(),
            value,
            raw: window.value,
            prediction_confidence: confidence,
            correlation: verdict.and_then(|v| v.correlation),
            is_valid: self.sensor_healthy(&window.sensor_id, window.pollutant),
            location: window.location,
        }
    }

    /// Whether the sensor currently passes cross-validation
    ///
    /// Sensors never validated, or only with too few pairs, count as healthy.
    pub fn sensor_healthy(&self, sensor_id: &str, pollutant: Pollutant) -> bool {
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_healthy(sensor_id, pollutant)
    }

    fn publish_completed(&self, report: &FusionReport) {
        let sources: BTreeSet<&str> = report
            .points
            .iter()
            .flat_map(|p| p.sources.iter().map(String::as_str))
            .collect();
        self.sink.publish(&EngineEvent::FusionCompleted {
            span: report.span,
            pollutants: report.pollutants.clone(),
            point_count: report.points.len(),
            average_confidence: report.summary_confidence,
            sources_used: sources.into_iter().map(str::to_string).collect(),
            complete: report.status.is_complete(),
            completed_at: self.clock.now(),
        });
    }

    /// Validation results whose horizon overlaps `range`
    pub fn validation_report(&self, range: &TimeRange) -> Vec<ValidationResult> {
        self.validations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|r| r.window.overlaps(range))
            .cloned()
            .collect()
    }

    /// Held-out metrics of the active model for `pollutant`
    pub fn calibration_metrics(&self, pollutant: Pollutant) -> EngineResult<CalibrationMetrics> {
        Ok(self.registry.metrics(pollutant)?)
    }

    /// Train on the trailing `window` ending now
    pub fn train_calibration(&self, pollutant: Pollutant, window: Duration) -> EngineResult<TrainingReport> {
        let range = TimeRange::trailing(self.clock.now(), window)?;
        self.train_calibration_at(pollutant, &range)
    }

    /// Train on aligned pairs within `range`
    ///
    /// Sensors failing cross-validation by anomaly rate are left out.
    /// `InsufficientData` and `AlreadyTraining` come back as report
    /// variants; storage failures are errors.
    pub fn train_calibration_at(&self, pollutant: Pollutant, range: &TimeRange) -> EngineResult<TrainingReport> {
        let lease = match self.registry.begin_training(pollutant) {
            Ok(lease) => lease,
            Err(CalibrationError::AlreadyTraining { .. }) => {
                info!("Skipping {} calibration: training already in progress", pollutant);
                return Ok(TrainingReport::AlreadyTraining { pollutant });
            }
            Err(e) => return Err(e.into()),
        };

        let samples = self.training_samples(pollutant, range)?;
        match lease.train(&samples, self.clock.now()) {
            Ok(outcome) => {
                self.sink.publish(&EngineEvent::CalibrationUpdated {
                    pollutant,
                    version: outcome.version,
                    promoted: outcome.promoted,
                    r_squared: outcome.metrics.r_squared,
                    rmse: outcome.metrics.rmse,
                    training_samples: outcome.sample_count,
                    trained_at: self.clock.now(),
                });
                Ok(TrainingReport::Trained(outcome))
            }
            Err(CalibrationError::InsufficientData { required, available, .. }) => {
                info!("Skipping {} calibration: {} of {} samples", pollutant, available, required);
                Ok(TrainingReport::InsufficientData {
                    pollutant,
                    required,
                    available,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Labelled samples in chronological order
    fn training_samples(&self, pollutant: Pollutant, range: &TimeRange) -> FusionResult<Vec<CalibrationSample>> {
        let span = self.resolution.snap(range);
        let readings = match self.readings.query(None, &span, None) {
            Ok(readings) => readings,
            Err(e) => {
                warn!("Sensor source failed while gathering {} training data: {}", pollutant, e);
                Vec::new()
            }
        };
        let locations: Vec<GeoPoint> = readings.iter().map(|r| r.location).collect();
        let Some(region) = BoundingBox::enclosing(&locations) else {
            return Ok(Vec::new());
        };

        let observations = self.gather_observations(pollutant, &region, &span, None)?;
        let alignment = self.aligner.align(pollutant, &readings, &observations, &span);

        let mut excluded: HashSet<String> = self
            .validator
            .validate_alignment(&alignment)
            .into_iter()
            .filter(|r| r.is_anomalous())
            .map(|r| r.sensor_id)
            .collect();
        excluded.extend(
            alignment
                .sensor_ids()
                .into_iter()
                .filter(|id| !self.sensor_healthy(id, pollutant))
                .map(str::to_string),
        );
        if !excluded.is_empty() {
            info!("Excluding {} drifting sensors from {} training: {:?}", excluded.len(), pollutant, excluded);
        }

        let mut samples: Vec<CalibrationSample> = alignment
            .windows
            .iter()
            .filter(|w| !excluded.contains(&w.sensor_id))
            .filter_map(CalibrationSample::from_window)
            .collect();
        samples.sort_by(|a, b| {
            a.features
                .timestamp
                .cmp(&b.features.timestamp)
                .then_with(|| a.sensor_id.cmp(&b.sensor_id))
        });
        Ok(samples)
    }
}

fn best_observation<'a>(observations: &'a [SatelliteObservation], window: &Window) -> Option<&'a SatelliteObservation> {
    observations
        .iter()
        .filter(|o| o.quality.is_usable() && window.contains(o.observed_at))
        .max_by_key(|o| (o.quality.rank(), o.observed_at))
}

fn cell_center(observations: &[SatelliteObservation], reference: &Reference) -> Option<GeoPoint> {
    observations
        .iter()
        .find(|o| o.source == reference.source && o.observed_at == reference.observed_at)
        .and_then(|o| o.grid().ok())
        .and_then(|g| g.cell_center(reference.cell))
}

fn mean_location(sensors: &[SensorContribution]) -> GeoPoint {
    let n = sensors.len().max(1) as f64;
    GeoPoint::new(
        sensors.iter().map(|s| s.location.lat).sum::<f64>() / n,
        sensors.iter().map(|s| s.location.lon).sum::<f64>() / n,
    )
}
