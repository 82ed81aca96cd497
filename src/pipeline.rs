//! Sampling, training and scenario mapping over a configured file layout.

use crate::config::PipelineConfig;
use crate::core::inference::{InferenceEngine, RiskMaps, StaticCovariates};
use crate::core::model::FloodModel;
use crate::core::sampling::{clean_samples, missing_value_report, SampleExtractor, SamplingReport};
use crate::core::scenario::{compare_scenarios, run_scenarios, ProbabilityChange, ScenarioSummary};
use crate::core::trainer::{log_feature_importance, ModelTrainer};
use crate::core::validation::{evaluate, ValidationReport};
use crate::io::raster::RasterSource;
use crate::io::table::{load_training_table, save_scenario_summary, save_training_table};
use anyhow::{Context, Result};
use std::fs;

/// The three raster stacks a run reads from
#[derive(Clone, Copy)]
pub struct RasterInputs<'a> {
    pub labels: &'a dyn RasterSource,
    pub statics: &'a dyn RasterSource,
    pub rain: &'a dyn RasterSource,
}

/// Everything the scenario stage produced
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub summaries: Vec<ScenarioSummary>,
    /// Probability change of every other scenario against the baseline
    pub changes: Vec<(String, ProbabilityChange)>,
    pub validation: Option<ValidationReport>,
}

/// Extract samples and write the raw training table
pub fn extract_samples(config: &PipelineConfig, inputs: RasterInputs<'_>) -> Result<SamplingReport> {
    fs::create_dir_all(&config.paths.output_dir).with_context(|| {
        format!("failed creating output directory {}", config.paths.output_dir.display())
    })?;

    let extractor = SampleExtractor::new(config.sampling.clone())?;
    let (samples, report) = extractor
        .extract(inputs.labels, inputs.statics, inputs.rain)
        .context("sample extraction failed")?;

    let table = config.paths.training_table();
    save_training_table(&table, &samples)
        .with_context(|| format!("failed writing training table {}", table.display()))?;
    Ok(report)
}

/// Train on the cleaned training table and save the model
pub fn train(config: &PipelineConfig) -> Result<FloodModel> {
    let table = config.paths.training_table();
    let samples = load_training_table(&table)
        .with_context(|| format!("failed reading training table {}", table.display()))?;

    missing_value_report(&samples);
    let (samples, _dropped) = clean_samples(samples);

    let trainer = ModelTrainer::from_params(&config.training)?;
    let model = trainer.train(&samples).context("model training failed")?;
    log_feature_importance(&model);

    let model_path = config.paths.model();
    model
        .save(&model_path)
        .with_context(|| format!("failed saving model {}", model_path.display()))?;
    Ok(model)
}

/// Score every configured scenario, write its rasters and summaries
///
/// With `validate_baseline` set, the baseline probabilities are also checked
/// against the label band of the scenario event.
pub fn map_scenarios(
    config: &PipelineConfig,
    model: &FloodModel,
    inputs: RasterInputs<'_>,
) -> Result<ScenarioOutcome> {
    let scenario_dir = config.paths.scenario_dir();
    fs::create_dir_all(&scenario_dir)
        .with_context(|| format!("failed creating {}", scenario_dir.display()))?;

    let statics = StaticCovariates::load(
        inputs.statics,
        config.sampling.min_valid_elevation,
        config.sampling.max_valid_elevation,
    )?;
    let engine = InferenceEngine::new(model, config.training.feature_set()?, statics)?;

    let mut baseline: Option<RiskMaps> = None;
    let mut changes = Vec::new();
    let summaries = run_scenarios(&engine, inputs.rain, &config.scenarios, |scenario, maps| {
        #[cfg(feature = "gdal")]
        maps.write(
            engine.statics().grid(),
            config.paths.probability_raster(&scenario.name),
            config.paths.class_raster(&scenario.name),
        )?;

        if scenario.name == config.scenarios.baseline {
            baseline = Some(maps.clone());
        } else if let Some(reference) = &baseline {
            let change = compare_scenarios(reference, maps)?;
            log::info!(
                "{} vs baseline: mean dP {:+.4}, {:.1}% of pixels increased",
                scenario.name,
                change.mean_delta,
                change.increased_fraction * 100.0
            );
            changes.push((scenario.name.clone(), change));
        }
        Ok(())
    })
    .context("scenario mapping failed")?;

    let summary_path = config.paths.scenario_summary();
    save_scenario_summary(&summary_path, &summaries)
        .with_context(|| format!("failed writing {}", summary_path.display()))?;

    let validation = match (&baseline, config.validate_baseline) {
        (Some(maps), true) => {
            let truth = inputs
                .labels
                .read_band(config.scenarios.event_index + 1)
                .context("failed reading ground-truth flood band")?;
            let report = evaluate(&maps.probability, &truth)?;
            let report_path = config.paths.validation_report();
            fs::write(&report_path, serde_json::to_string_pretty(&report)?)
                .with_context(|| format!("failed writing {}", report_path.display()))?;
            Some(report)
        }
        _ => None,
    };

    Ok(ScenarioOutcome {
        summaries,
        changes,
        validation,
    })
}

/// Full run from the GeoTIFF inputs named in `config`
#[cfg(feature = "gdal")]
pub fn run(config: &PipelineConfig) -> Result<ScenarioOutcome> {
    use crate::io::geotiff::GeoTiffRaster;

    config.validate()?;
    let labels = GeoTiffRaster::open(&config.paths.label_stack)
        .with_context(|| format!("failed opening label stack {}", config.paths.label_stack.display()))?;
    let statics = GeoTiffRaster::open(&config.paths.static_stack)
        .with_context(|| format!("failed opening static stack {}", config.paths.static_stack.display()))?;
    let rain = GeoTiffRaster::open(&config.paths.rain_stack)
        .with_context(|| format!("failed opening rain stack {}", config.paths.rain_stack.display()))?;
    let inputs = RasterInputs {
        labels: &labels,
        statics: &statics,
        rain: &rain,
    };

    let report = extract_samples(config, inputs)?;
    log::info!(
        "Sampling finished: {} rows, {} events skipped",
        report.total_rows(),
        report.skipped_events.len()
    );
    let model = train(config)?;
    map_scenarios(config, &model, inputs)
}
