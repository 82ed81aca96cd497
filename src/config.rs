//! Pipeline configuration loaded from JSON.
//!
//! Every section falls back to its defaults, so a config file only needs the
//! keys it changes:
//!
//! ```json
//! {
//!   "paths": { "output_dir": "output" },
//!   "sampling": { "samples_per_class": 2000 },
//!   "scenarios": { "event_index": 3 }
//! }
//! ```

use crate::core::sampling::SamplingParams;
use crate::core::scenario::ScenarioConfig;
use crate::core::trainer::TrainingParams;
use crate::types::{FloodError, FloodResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Input rasters and output locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// 11-band static covariate stack
    pub static_stack: PathBuf,
    /// One flood mask band per event
    pub label_stack: PathBuf,
    /// Four rain bands per event
    pub rain_stack: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            static_stack: PathBuf::from("input/static_stack.tif"),
            label_stack: PathBuf::from("input/flood_stack.tif"),
            rain_stack: PathBuf::from("input/rain_stack.tif"),
            output_dir: PathBuf::from("output"),
        }
    }
}

impl PathConfig {
    pub fn training_table(&self) -> PathBuf {
        self.output_dir.join("training_samples.csv")
    }

    pub fn model(&self) -> PathBuf {
        self.output_dir.join("flood_model.json")
    }

    pub fn scenario_dir(&self) -> PathBuf {
        self.output_dir.join("scenarios")
    }

    pub fn probability_raster(&self, scenario: &str) -> PathBuf {
        self.scenario_dir().join(format!("{}.tif", scenario))
    }

    pub fn class_raster(&self, scenario: &str) -> PathBuf {
        self.scenario_dir().join(format!("{}_classes.tif", scenario))
    }

    pub fn scenario_summary(&self) -> PathBuf {
        self.scenario_dir().join("scenario_summary.csv")
    }

    pub fn validation_report(&self) -> PathBuf {
        self.output_dir.join("validation.json")
    }
}

/// Complete configuration of a sampling, training and mapping run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathConfig,
    pub sampling: SamplingParams,
    pub training: TrainingParams,
    pub scenarios: ScenarioConfig,
    /// Validate the baseline scenario against the label band of its event
    pub validate_baseline: bool,
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> FloodResult<Self> {
        let config: PipelineConfig = serde_json::from_str(text)
            .map_err(|e| FloodError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> FloodResult<Self> {
        log::info!("Loading configuration: {}", path.as_ref().display());
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> FloodResult<()> {
        fs::write(path.as_ref(), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> FloodResult<()> {
        self.sampling.validate()?;
        self.training.validate()?;
        self.scenarios.validate()
    }
}
