//! Climate rainfall scenarios and their risk summaries.
//!
//! A scenario scales the rain covariates of one historical event by a
//! multiplier; every scenario is scored against the same static stack.

use crate::core::classify::RiskLevel;
use crate::core::inference::{InferenceEngine, RiskMaps};
use crate::core::model::ProbabilityModel;
use crate::io::raster::RasterSource;
use crate::types::{FloodError, FloodResult, PROBABILITY_NODATA};
use serde::{Deserialize, Serialize};

/// Rain event and multiplier to score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    /// Zero-based event in the rain stack
    pub event_index: usize,
    /// 1.0 reproduces the historical event
    pub rain_multiplier: f32,
}

impl Scenario {
    pub fn new(name: impl Into<String>, event_index: usize, rain_multiplier: f32) -> Self {
        Self {
            name: name.into(),
            event_index,
            rain_multiplier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub name: String,
    pub rain_multiplier: f32,
}

/// Named multipliers applied to one reference event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub event_index: usize,
    /// Scenario the others are compared against
    pub baseline: String,
    pub scenarios: Vec<ScenarioDefinition>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        let scenarios = [
            ("00_Baseline", 1.0),
            ("01_RCP45_2050", 1.12),
            ("02_RCP85_2050", 1.15),
            ("03_RCP45_2100", 1.18),
            ("04_RCP85_2100", 1.30),
        ]
        .into_iter()
        .map(|(name, rain_multiplier)| ScenarioDefinition {
            name: name.to_string(),
            rain_multiplier,
        })
        .collect();

        Self {
            // the 2020 flood season, the largest event on record
            event_index: 9,
            baseline: "00_Baseline".to_string(),
            scenarios,
        }
    }
}

impl ScenarioConfig {
    pub fn validate(&self) -> FloodResult<()> {
        if self.scenarios.is_empty() {
            return Err(FloodError::Config("No scenarios configured".to_string()));
        }
        for (i, definition) in self.scenarios.iter().enumerate() {
            if !(definition.rain_multiplier.is_finite() && definition.rain_multiplier >= 0.0) {
                return Err(FloodError::Config(format!(
                    "Scenario {} has invalid rain multiplier {}",
                    definition.name, definition.rain_multiplier
                )));
            }
            if self.scenarios[..i].iter().any(|d| d.name == definition.name) {
                return Err(FloodError::Config(format!(
                    "Scenario name {} used twice",
                    definition.name
                )));
            }
        }
        if !self.scenarios.iter().any(|d| d.name == self.baseline) {
            return Err(FloodError::Config(format!(
                "Baseline scenario {} is not configured",
                self.baseline
            )));
        }
        Ok(())
    }

    /// Scenarios to score, baseline first and the rest in configured order
    pub fn scenarios(&self) -> Vec<Scenario> {
        let (baseline, others): (Vec<_>, Vec<_>) =
            self.scenarios.iter().partition(|d| d.name == self.baseline);
        baseline
            .into_iter()
            .chain(others)
            .map(|d| Scenario::new(d.name.clone(), self.event_index, d.rain_multiplier))
            .collect()
    }
}

/// High-risk statistics of one scenario
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioSummary {
    pub scenario: String,
    pub rain_multiplier: f32,
    pub valid_pixels: usize,
    /// Pixels in class 4 or 5
    pub high_risk_pixels: usize,
    pub very_high_risk_pixels: usize,
    pub high_risk_area_ha: f64,
    /// Change of the high-risk pixel count relative to the baseline
    pub change_vs_baseline_percent: f64,
}

impl ScenarioSummary {
    fn from_maps(scenario: &Scenario, maps: &RiskMaps, pixel_area: f64) -> Self {
        let high_risk_pixels = maps.pixels_at_least(RiskLevel::High);
        Self {
            scenario: scenario.name.clone(),
            rain_multiplier: scenario.rain_multiplier,
            valid_pixels: maps.valid_pixels,
            high_risk_pixels,
            very_high_risk_pixels: maps.pixels_at_least(RiskLevel::VeryHigh),
            high_risk_area_ha: high_risk_pixels as f64 * pixel_area / 10_000.0,
            change_vs_baseline_percent: 0.0,
        }
    }
}

/// Score every configured scenario and summarise it
///
/// The baseline is always scored first. `on_maps` receives each scenario's rasters as soon as they exist, so
/// callers can write them out without holding all scenarios in memory.
pub fn run_scenarios<M, F>(
    engine: &InferenceEngine<'_, M>,
    rain: &dyn RasterSource,
    config: &ScenarioConfig,
    mut on_maps: F,
) -> FloodResult<Vec<ScenarioSummary>>
where
    M: ProbabilityModel,
    F: FnMut(&Scenario, &RiskMaps) -> FloodResult<()>,
{
    config.validate()?;
    let pixel_area = engine.statics().grid().transform.pixel_area();

    let mut summaries = Vec::with_capacity(config.scenarios.len());
    for scenario in config.scenarios() {
        log::info!(
            "Scenario {} (rain x{:.2}, event {})",
            scenario.name,
            scenario.rain_multiplier,
            scenario.event_index
        );
        let maps = engine.run_scenario(rain, &scenario)?;
        on_maps(&scenario, &maps)?;
        summaries.push(ScenarioSummary::from_maps(&scenario, &maps, pixel_area));
    }

    let baseline_count = summaries
        .iter()
        .find(|s| s.scenario == config.baseline)
        .map(|s| s.high_risk_pixels)
        .unwrap_or(0);
    for summary in &mut summaries {
        summary.change_vs_baseline_percent = if baseline_count == 0 {
            0.0
        } else {
            (summary.high_risk_pixels as f64 - baseline_count as f64) / baseline_count as f64 * 100.0
        };
        log::info!(
            "{}: {} high-risk pixels ({:.1} ha, {:+.2}% vs baseline)",
            summary.scenario,
            summary.high_risk_pixels,
            summary.high_risk_area_ha,
            summary.change_vs_baseline_percent
        );
    }

    Ok(summaries)
}

/// Probability change between two scenarios over pixels valid in both
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbabilityChange {
    pub compared_pixels: usize,
    pub mean_delta: f64,
    /// Share of compared pixels whose probability increased
    pub increased_fraction: f64,
}

/// Compare `scenario` against `reference`
pub fn compare_scenarios(reference: &RiskMaps, scenario: &RiskMaps) -> FloodResult<ProbabilityChange> {
    if reference.probability.dim() != scenario.probability.dim() {
        return Err(FloodError::GridMismatch(format!(
            "Cannot compare rasters of shape {:?} and {:?}",
            reference.probability.dim(),
            scenario.probability.dim()
        )));
    }

    let usable = |p: f32| p != PROBABILITY_NODATA && p.is_finite();
    let mut compared = 0usize;
    let mut increased = 0usize;
    let mut delta_sum = 0.0f64;
    for (&a, &b) in reference.probability.iter().zip(scenario.probability.iter()) {
        if !usable(a) || !usable(b) {
            continue;
        }
        let delta = b as f64 - a as f64;
        compared += 1;
        delta_sum += delta;
        if delta > 0.0 {
            increased += 1;
        }
    }

    let (mean_delta, increased_fraction) = if compared == 0 {
        (0.0, 0.0)
    } else {
        (delta_sum / compared as f64, increased as f64 / compared as f64)
    };
    Ok(ProbabilityChange {
        compared_pixels: compared,
        mean_delta,
        increased_fraction,
    })
}
