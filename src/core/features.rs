//! Covariate schema shared by sampling, training and inference.
//!
//! Every model feature resolves to a concrete raster band through
//! [`Feature::source`]; a [`FeatureSet`] is validated once when it is built
//! so a bad column name fails at startup instead of at first lookup.

use crate::types::{FloodError, FloodResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bands of the static covariate stack, in file order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StaticBand {
    Elevation,
    Slope,
    Aspect,
    Curvature,
    Relief,
    Twi,
    FlowAccumulation,
    DistanceToWater,
    WaterMask,
    LandCover,
    PrecipitationClimatology,
}

impl StaticBand {
    pub const ALL: [StaticBand; 11] = [
        StaticBand::Elevation,
        StaticBand::Slope,
        StaticBand::Aspect,
        StaticBand::Curvature,
        StaticBand::Relief,
        StaticBand::Twi,
        StaticBand::FlowAccumulation,
        StaticBand::DistanceToWater,
        StaticBand::WaterMask,
        StaticBand::LandCover,
        StaticBand::PrecipitationClimatology,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Zero-based position in the stack
    pub fn position(self) -> usize {
        self as usize
    }

    /// One-based band number in the static raster
    pub fn band_index(self) -> usize {
        self.position() + 1
    }

    pub fn column_name(self) -> &'static str {
        match self {
            StaticBand::Elevation => "elev",
            StaticBand::Slope => "slope",
            StaticBand::Aspect => "aspect",
            StaticBand::Curvature => "curv",
            StaticBand::Relief => "relief",
            StaticBand::Twi => "twi",
            StaticBand::FlowAccumulation => "flow_acc",
            StaticBand::DistanceToWater => "dist_water",
            StaticBand::WaterMask => "water_mask",
            StaticBand::LandCover => "lulc",
            StaticBand::PrecipitationClimatology => "precip_clim",
        }
    }
}

/// Rainfall variables stored per event in the rain stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RainVariable {
    /// 3-day antecedent rainfall
    Rain3Day,
    /// 7-day antecedent rainfall
    Rain7Day,
    /// Maximum 1-day rainfall
    RainMax,
    /// 14-day antecedent moisture proxy
    AntecedentMoisture14,
}

impl RainVariable {
    pub const ALL: [RainVariable; 4] = [
        RainVariable::Rain3Day,
        RainVariable::Rain7Day,
        RainVariable::RainMax,
        RainVariable::AntecedentMoisture14,
    ];

    pub const PER_EVENT: usize = Self::ALL.len();

    pub fn position(self) -> usize {
        self as usize
    }

    /// One-based band number of this variable for `event` (zero-based)
    pub fn band_index(self, event: usize) -> usize {
        event * Self::PER_EVENT + self.position() + 1
    }

    pub fn column_name(self) -> &'static str {
        match self {
            RainVariable::Rain3Day => "Rain_3D",
            RainVariable::Rain7Day => "Rain_7D",
            RainVariable::RainMax => "Rain_Max",
            RainVariable::AntecedentMoisture14 => "Rain_AM14",
        }
    }
}

/// Direction a model output may move as a feature increases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Monotonicity {
    Decreasing,
    Unconstrained,
    Increasing,
}

impl Monotonicity {
    pub fn as_i8(self) -> i8 {
        match self {
            Monotonicity::Decreasing => -1,
            Monotonicity::Unconstrained => 0,
            Monotonicity::Increasing => 1,
        }
    }
}

impl From<Monotonicity> for i8 {
    fn from(value: Monotonicity) -> Self {
        value.as_i8()
    }
}

impl TryFrom<i8> for Monotonicity {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Monotonicity::Decreasing),
            0 => Ok(Monotonicity::Unconstrained),
            1 => Ok(Monotonicity::Increasing),
            other => Err(format!("invalid monotone constraint {}", other)),
        }
    }
}

/// Where a feature's value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureSource {
    Static(StaticBand),
    Rain(RainVariable),
}

/// A single model input column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Feature {
    source: FeatureSource,
}

impl Feature {
    pub fn from_static(band: StaticBand) -> Self {
        Self {
            source: FeatureSource::Static(band),
        }
    }

    pub fn from_rain(variable: RainVariable) -> Self {
        Self {
            source: FeatureSource::Rain(variable),
        }
    }

    /// Resolve a training-table column name
    pub fn from_name(name: &str) -> FloodResult<Self> {
        if let Some(band) = StaticBand::ALL.iter().find(|b| b.column_name() == name) {
            return Ok(Self::from_static(*band));
        }
        if let Some(variable) = RainVariable::ALL.iter().find(|v| v.column_name() == name) {
            return Ok(Self::from_rain(*variable));
        }
        Err(FloodError::Config(format!("Unknown feature name '{}'", name)))
    }

    pub fn source(&self) -> FeatureSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        match self.source {
            FeatureSource::Static(band) => band.column_name(),
            FeatureSource::Rain(variable) => variable.column_name(),
        }
    }

    /// Relief is non-increasing, every rain variable non-decreasing
    pub fn monotonicity(&self) -> Monotonicity {
        match self.source {
            FeatureSource::Static(StaticBand::Relief) => Monotonicity::Decreasing,
            FeatureSource::Rain(_) => Monotonicity::Increasing,
            FeatureSource::Static(_) => Monotonicity::Unconstrained,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Ordered model inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSet {
    features: Vec<Feature>,
}

impl FeatureSet {
    pub fn new(features: Vec<Feature>) -> FloodResult<Self> {
        if features.is_empty() {
            return Err(FloodError::Config("Feature set is empty".to_string()));
        }
        for (i, feature) in features.iter().enumerate() {
            if features[..i].contains(feature) {
                return Err(FloodError::Config(format!(
                    "Feature '{}' listed more than once",
                    feature
                )));
            }
        }
        Ok(Self { features })
    }

    pub fn from_names<S: AsRef<str>>(names: &[S]) -> FloodResult<Self> {
        let features = names
            .iter()
            .map(|name| Feature::from_name(name.as_ref()))
            .collect::<FloodResult<Vec<_>>>()?;
        Self::new(features)
    }

    /// Terrain, land-cover and rain inputs used by the production model.
    /// Elevation and the water mask are left out as they duplicate relief.
    pub fn standard() -> Self {
        let mut features: Vec<Feature> = [
            StaticBand::Slope,
            StaticBand::Aspect,
            StaticBand::Curvature,
            StaticBand::Relief,
            StaticBand::Twi,
            StaticBand::FlowAccumulation,
            StaticBand::DistanceToWater,
            StaticBand::LandCover,
            StaticBand::PrecipitationClimatology,
        ]
        .into_iter()
        .map(Feature::from_static)
        .collect();
        features.extend(RainVariable::ALL.into_iter().map(Feature::from_rain));
        Self { features }
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn monotone_constraints(&self) -> Vec<Monotonicity> {
        self.features.iter().map(Feature::monotonicity).collect()
    }

    /// Fail with [`FloodError::FeatureOrder`] unless `names` matches this order exactly
    pub fn ensure_order(&self, names: &[String]) -> FloodResult<()> {
        let own = self.names();
        if own.as_slice() != names {
            return Err(FloodError::FeatureOrder {
                expected: names.to_vec(),
                found: own,
            });
        }
        Ok(())
    }
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self::standard()
    }
}
