//! Event stream for downstream consumers
//!
//! The engine never talks to a notification transport directly. It
//! publishes [`EngineEvent`]s to an [`EventSink`]; the embedding service
//! decides whether they end up on a queue, in a log or in a test vector.
//!
//! ```text
//! FusionEngine ──publish──→ EventSink ──→ MemorySink   (tests, dashboards)
//!                                     └─→ ChannelSink  (std::sync::mpsc)
//! ```

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::model::{Pollutant, TimeRange};
use crate::validation::AnomalySignal;

/// Events published by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A sensor turned from valid to invalid
    AnomalyDetected(AnomalySignal),

    /// A fusion run finished
    FusionCompleted {
        /// Requested range snapped to windows
        span: TimeRange,
        /// Pollutants covered
        pollutants: Vec<Pollutant>,
        /// Points produced
        point_count: usize,
        /// Mean point confidence
        average_confidence: f64,
        /// Contributing source names
        sources_used: Vec<String>,
        /// Whether the run finished within budget
        complete: bool,
        /// Completion time
        completed_at: DateTime<Utc>,
    },

    /// A calibration model was trained
    CalibrationUpdated {
        /// Pollutant of the model
        pollutant: Pollutant,
        /// New version
        version: u32,
        /// Whether it became the active version
        promoted: bool,
        /// Held-out R²
        r_squared: f64,
        /// Held-out RMSE
        rmse: f64,
        /// Samples used
        training_samples: usize,
        /// Training time
        trained_at: DateTime<Utc>,
    },
}

/// Destination for engine events
pub trait EventSink: Send + Sync {
    /// Deliver one event; must not block on slow consumers
    fn publish(&self, event: &EngineEvent);
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: &EngineEvent) {}
}

/// Sink that keeps events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<EngineEvent>>,
}

impl MemorySink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event received so far
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Anomaly signals received so far
    pub fn anomalies(&self) -> Vec<AnomalySignal> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::AnomalyDetected(signal) => Some(signal),
                _ => None,
            })
            .collect()
    }

    /// Remove and return every event
    pub fn drain(&self) -> Vec<EngineEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: &EngineEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Sink that forwards events over an mpsc channel
///
/// `Sender` is `Sync`, so publishers on several threads share it directly.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Sender<EngineEvent>,
}

impl ChannelSink {
    /// Sink plus the receiving end of its channel
    pub fn new() -> (Self, Receiver<EngineEvent>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: &EngineEvent) {
        if self.sender.send(event.clone()).is_err() {
            debug!("Event receiver dropped; discarding event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn updated(version: u32) -> EngineEvent {
        EngineEvent::CalibrationUpdated {
            pollutant: Pollutant::Pm25,
            version,
            promoted: true,
            r_squared: 0.8,
            rmse: 2.1,
            training_samples: 40,
            trained_at: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn memory_sink_collects_and_drains() {
        let sink = MemorySink::new();
        sink.publish(&updated(1));
        sink.publish(&updated(2));
        assert_eq!(sink.events().len(), 2);
        assert!(sink.anomalies().is_empty());
        assert_eq!(sink.drain().len(), 2);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn channel_sink_forwards() {
        let (sink, rx) = ChannelSink::new();
        sink.publish(&updated(3));
        assert_eq!(rx.recv().unwrap(), updated(3));

        // Dropped receiver is not an error
        drop(rx);
        sink.publish(&updated(4));
    }

    #[test]
    fn channel_sink_is_shared_across_threads() {
        let (sink, rx) = ChannelSink::new();
        let sink = std::sync::Arc::new(sink);
        let handles: Vec<_> = (1..=4)
            .map(|v| {
                let sink = sink.clone();
                std::thread::spawn(move || sink.publish(&updated(v)))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut versions: Vec<u32> = rx
            .try_iter()
            .filter_map(|e| match e {
                EngineEvent::CalibrationUpdated { version, .. } => Some(version),
                _ => None,
            })
            .collect();
        versions.sort_unstable();
        assert_eq!(versions, vec![1, 2, 3, 4]);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(updated(1)).unwrap();
        assert_eq!(json["event_type"], "calibration_updated");
        assert_eq!(json["pollutant"], "pm25");
    }
}
