//! Deterministic generators for sensor networks and satellite grids
//!
//! Ground truth is a smooth diurnal curve; sensors see it through a linear
//! response plus a humidity artefact and bounded noise:
//! ```text
//! truth(h) = base + amplitude × sin(2π h / 24) + 1.5 × (h mod 5)
//! raw      = gain × truth + offset + humidity_coeff × (humidity - 50) + noise
//! ```

use std::f64::consts::PI;

use aerofuse_core::{BoundingBox, GeoPoint, Pollutant, QualityFlag, SatelliteObservation, SensorReading};
use chrono::{DateTime, Duration, Utc};

/// Xorshift generator; reproducible across platforms
pub struct TestRng {
    state: u32,
}

impl TestRng {
    pub fn new(seed: u32) -> Self {
        Self { state: seed.max(1) }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 17;
        self.state ^= self.state << 5;
        self.state
    }

    pub fn next_f64(&mut self) -> f64 {
        (self.next_u32() >> 8) as f64 / 16_777_216.0
    }

    pub fn gen_range(&mut self, min: f64, max: f64) -> f64 {
        min + self.next_f64() * (max - min)
    }
}

/// Diurnal ground truth
#[derive(Debug, Clone, Copy)]
pub struct Truth {
    pub base: f64,
    pub amplitude: f64,
}

impl Truth {
    pub fn at_hour(&self, hour: i64) -> f64 {
        self.base + self.amplitude * (2.0 * PI * hour as f64 / 24.0).sin() + 1.5 * hour.rem_euclid(5) as f64
    }
}

/// How one sensor responds to the truth
#[derive(Debug, Clone)]
pub struct SensorModel {
    pub id: String,
    pub location: GeoPoint,
    pub gain: f64,
    pub offset: f64,
    pub humidity_coeff: f64,
    pub noise: f64,
    pub age_days: f64,
}

impl SensorModel {
    pub fn new(id: &str, location: GeoPoint) -> Self {
        Self {
            id: id.to_string(),
            location,
            gain: 1.0,
            offset: 0.0,
            humidity_coeff: 0.0,
            noise: 0.0,
            age_days: 120.0,
        }
    }

    pub fn with_response(mut self, gain: f64, offset: f64) -> Self {
        self.gain = gain;
        self.offset = offset;
        self
    }

    pub fn with_humidity_coeff(mut self, coeff: f64) -> Self {
        self.humidity_coeff = coeff;
        self
    }

    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }
}

/// Humidity cycling through 30..70 % over five hours
pub fn humidity_at(hour: i64) -> f64 {
    30.0 + 10.0 * hour.rem_euclid(5) as f64
}

/// `per_hour` evenly spaced readings per hour for `hours` hours
pub fn sensor_series(
    model: &SensorModel,
    pollutant: Pollutant,
    truth: impl Fn(i64) -> f64,
    start: DateTime<Utc>,
    hours: i64,
    per_hour: i64,
    rng: &mut TestRng,
) -> Vec<SensorReading> {
    let step = 60 / per_hour.max(1);
    let mut readings = Vec::new();
    for hour in 0..hours {
        let humidity = humidity_at(hour);
        for k in 0..per_hour {
            let noise = if model.noise > 0.0 { rng.gen_range(-model.noise, model.noise) } else { 0.0 };
            let raw = model.gain * truth(hour) + model.offset + model.humidity_coeff * (humidity - 50.0) + noise;
            readings.push(
                SensorReading::new(model.id.clone(), model.location, start + Duration::hours(hour) + Duration::minutes(k * step))
                    .with_value(pollutant, raw)
                    .with_temperature(12.0 + hour.rem_euclid(24) as f64 * 0.4)
                    .with_humidity(humidity)
                    .with_age_days(model.age_days + hour as f64 / 24.0),
            );
        }
    }
    readings
}

/// One uniform observation per hour, taken at half past
pub fn hourly_observations(
    source: &str,
    pollutant: Pollutant,
    region: BoundingBox,
    cell_size: f64,
    truth: impl Fn(i64) -> f64,
    start: DateTime<Utc>,
    hours: i64,
) -> Vec<SatelliteObservation> {
    (0..hours)
        .filter_map(|hour| {
            SatelliteObservation::new(
                source,
                pollutant,
                start + Duration::hours(hour) + Duration::minutes(30),
                region,
                cell_size,
                cell_size,
                QualityFlag::Good,
            )
            .with_uniform(truth(hour), 1.5)
            .ok()
        })
        .collect()
}
