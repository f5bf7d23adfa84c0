//! Air Quality Index from pollutant concentrations
//!
//! ## Overview
//!
//! The AQI maps a concentration onto a 0-500 scale through piecewise-linear
//! breakpoint bands:
//! ```text
//!          I_high - I_low
//! I = ───────────────────── × (C - C_low) + I_low
//!          C_high - C_low
//! ```
//!
//! The default table is the US EPA one. Tables are plain data and can be
//! replaced per deployment (e.g. a national index with different bands).
//!
//! ## Lookup Rules
//!
//! - The first band whose upper bound is at or above the concentration wins
//! - EPA bands leave small gaps (12.0 → 12.1); a value in a gap snaps to the
//!   lower edge of the next band
//! - Above the top band the index saturates at 500
//! - Negative or non-finite concentrations have no index
//!
//! The composite index of a location is the maximum over pollutants; the
//! pollutant that sets it is reported as dominant.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::Pollutant;

/// Highest index value
pub const AQI_MAX: u32 = 500;

/// One piecewise-linear band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    /// Lowest concentration of the band
    pub c_low: f64,
    /// Highest concentration of the band
    pub c_high: f64,
    /// Index at `c_low`
    pub i_low: u32,
    /// Index at `c_high`
    pub i_high: u32,
}

impl Breakpoint {
    const fn new(c_low: f64, c_high: f64, i_low: u32, i_high: u32) -> Self {
        Self { c_low, c_high, i_low, i_high }
    }

    fn interpolate(&self, concentration: f64) -> u32 {
        let span = self.c_high - self.c_low;
        if span <= 0.0 {
            return self.i_high;
        }
        let c = concentration.clamp(self.c_low, self.c_high);
        let index = (self.i_high - self.i_low) as f64 / span * (c - self.c_low) + self.i_low as f64;
        index.round() as u32
    }
}

const EPA_PM25: [Breakpoint; 6] = [
    Breakpoint::new(0.0, 12.0, 0, 50),
    Breakpoint::new(12.1, 35.4, 51, 100),
    Breakpoint::new(35.5, 55.4, 101, 150),
    Breakpoint::new(55.5, 150.4, 151, 200),
    Breakpoint::new(150.5, 250.4, 201, 300),
    Breakpoint::new(250.5, 500.4, 301, 500),
];

const EPA_PM10: [Breakpoint; 6] = [
    Breakpoint::new(0.0, 54.0, 0, 50),
    Breakpoint::new(55.0, 154.0, 51, 100),
    Breakpoint::new(155.0, 254.0, 101, 150),
    Breakpoint::new(255.0, 354.0, 151, 200),
    Breakpoint::new(355.0, 424.0, 201, 300),
    Breakpoint::new(425.0, 604.0, 301, 500),
];

const EPA_NO2: [Breakpoint; 6] = [
    Breakpoint::new(0.0, 53.0, 0, 50),
    Breakpoint::new(54.0, 100.0, 51, 100),
    Breakpoint::new(101.0, 360.0, 101, 150),
    Breakpoint::new(361.0, 649.0, 151, 200),
    Breakpoint::new(650.0, 1249.0, 201, 300),
    Breakpoint::new(1250.0, 2049.0, 301, 500),
];

const EPA_SO2: [Breakpoint; 6] = [
    Breakpoint::new(0.0, 35.0, 0, 50),
    Breakpoint::new(36.0, 75.0, 51, 100),
    Breakpoint::new(76.0, 185.0, 101, 150),
    Breakpoint::new(186.0, 304.0, 151, 200),
    Breakpoint::new(305.0, 604.0, 201, 300),
    Breakpoint::new(605.0, 1004.0, 301, 500),
];

const EPA_O3: [Breakpoint; 6] = [
    Breakpoint::new(0.0, 108.0, 0, 50),
    Breakpoint::new(109.0, 140.0, 51, 100),
    Breakpoint::new(141.0, 170.0, 101, 150),
    Breakpoint::new(171.0, 210.0, 151, 200),
    Breakpoint::new(211.0, 410.0, 201, 300),
    Breakpoint::new(411.0, 610.0, 301, 500),
];

const EPA_CO: [Breakpoint; 6] = [
    Breakpoint::new(0.0, 4.4, 0, 50),
    Breakpoint::new(4.5, 9.4, 51, 100),
    Breakpoint::new(9.5, 12.4, 101, 150),
    Breakpoint::new(12.5, 15.4, 151, 200),
    Breakpoint::new(15.5, 30.4, 201, 300),
    Breakpoint::new(30.5, 50.4, 301, 500),
];

/// Health category of an index value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiCategory {
    /// 0-50
    Good,
    /// 51-100
    Moderate,
    /// 101-150
    UnhealthySensitive,
    /// 151-200
    Unhealthy,
    /// 201-300
    VeryUnhealthy,
    /// 301-500
    Hazardous,
}

impl AqiCategory {
    /// Category of an index value
    pub fn from_index(index: u32) -> Self {
        match index {
            0..=50 => Self::Good,
            51..=100 => Self::Moderate,
            101..=150 => Self::UnhealthySensitive,
            151..=200 => Self::Unhealthy,
            201..=300 => Self::VeryUnhealthy,
            _ => Self::Hazardous,
        }
    }

    /// Public-facing label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::UnhealthySensitive => "Unhealthy for Sensitive Groups",
            Self::Unhealthy => "Unhealthy",
            Self::VeryUnhealthy => "Very Unhealthy",
            Self::Hazardous => "Hazardous",
        }
    }

    /// Display colour as a hex triplet
    pub fn color(&self) -> &'static str {
        match self {
            Self::Good => "#00E400",
            Self::Moderate => "#FFFF00",
            Self::UnhealthySensitive => "#FF7E00",
            Self::Unhealthy => "#FF0000",
            Self::VeryUnhealthy => "#8F3F97",
            Self::Hazardous => "#7E0023",
        }
    }
}

/// Index computed for one pollutant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AqiReading {
    /// Pollutant the index belongs to
    pub pollutant: Pollutant,
    /// Input concentration
    pub concentration: f64,
    /// Index value
    pub index: u32,
    /// Health category
    pub category: AqiCategory,
}

/// Per-pollutant breakpoint bands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointTable {
    bands: BTreeMap<Pollutant, Vec<Breakpoint>>,
}

impl Default for BreakpointTable {
    fn default() -> Self {
        Self::epa()
    }
}

impl BreakpointTable {
    /// Table with no bands
    pub fn empty() -> Self {
        Self { bands: BTreeMap::new() }
    }

    /// US EPA bands for every pollutant
    pub fn epa() -> Self {
        Self::empty()
            .with_bands(Pollutant::Pm25, EPA_PM25.to_vec())
            .with_bands(Pollutant::Pm10, EPA_PM10.to_vec())
            .with_bands(Pollutant::No2, EPA_NO2.to_vec())
            .with_bands(Pollutant::So2, EPA_SO2.to_vec())
            .with_bands(Pollutant::O3, EPA_O3.to_vec())
            .with_bands(Pollutant::Co, EPA_CO.to_vec())
    }

    /// Replace the bands of one pollutant; bands are kept sorted
    pub fn with_bands(mut self, pollutant: Pollutant, mut bands: Vec<Breakpoint>) -> Self {
        bands.sort_by(|a, b| a.c_low.total_cmp(&b.c_low));
        self.bands.insert(pollutant, bands);
        self
    }

    /// Index for a concentration, `None` when undefined
    pub fn index(&self, pollutant: Pollutant, concentration: f64) -> Option<u32> {
        if !concentration.is_finite() || concentration < 0.0 {
            return None;
        }
        let bands = self.bands.get(&pollutant)?;
        let top = bands.last()?;
        if concentration > top.c_high {
            return Some(AQI_MAX);
        }
        bands
            .iter()
            .find(|band| concentration <= band.c_high)
            .map(|band| band.interpolate(concentration))
    }

    /// Index plus category
    pub fn reading(&self, pollutant: Pollutant, concentration: f64) -> Option<AqiReading> {
        self.index(pollutant, concentration).map(|index| AqiReading {
            pollutant,
            concentration,
            index,
            category: AqiCategory::from_index(index),
        })
    }
}

/// Highest index among `readings` and the pollutant behind it
pub fn composite(readings: &[AqiReading]) -> Option<AqiReading> {
    readings.iter().copied().max_by_key(|r| r.index)
}
