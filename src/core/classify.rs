//! Ordinal five-level flood risk classes.

use crate::types::{CLASS_NODATA, PROBABILITY_NODATA};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Risk level, stored in class rasters as 1..=5
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    VeryLow = 1,
    Low = 2,
    Moderate = 3,
    High = 4,
    VeryHigh = 5,
}

/// Lower bounds of levels 2..=5; each interval is closed below
pub const CLASS_BREAKS: [f32; 4] = [0.2, 0.4, 0.6, 0.8];

impl RiskLevel {
    pub const ALL: [RiskLevel; 5] = [
        RiskLevel::VeryLow,
        RiskLevel::Low,
        RiskLevel::Moderate,
        RiskLevel::High,
        RiskLevel::VeryHigh,
    ];

    pub fn from_probability(p: f32) -> Self {
        match CLASS_BREAKS.iter().filter(|&&b| p >= b).count() {
            0 => RiskLevel::VeryLow,
            1 => RiskLevel::Low,
            2 => RiskLevel::Moderate,
            3 => RiskLevel::High,
            _ => RiskLevel::VeryHigh,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.code() == code)
    }

    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::VeryLow => "Very Low",
            RiskLevel::Low => "Low",
            RiskLevel::Moderate => "Moderate",
            RiskLevel::High => "High",
            RiskLevel::VeryHigh => "Very High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Class code of a probability; no-data or non-finite input maps to [`CLASS_NODATA`]
pub fn classify_probability(p: f32) -> u8 {
    if p == PROBABILITY_NODATA || !p.is_finite() {
        CLASS_NODATA
    } else {
        RiskLevel::from_probability(p).code()
    }
}

pub fn classify_raster(probability: &Array2<f32>) -> Array2<u8> {
    probability.mapv(classify_probability)
}
