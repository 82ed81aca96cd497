//! Core flood susceptibility modules

pub mod features;
pub mod resample;
pub mod sampling;
pub mod model;
pub mod boosting;
pub mod trainer;
pub mod classify;
pub mod inference;
pub mod scenario;
pub mod validation;

// Re-export main types
pub use features::{Feature, FeatureSet, FeatureSource, Monotonicity, RainVariable, StaticBand};
pub use resample::{remap_point_nearest, reproject_bilinear, REPROJECT_FILL};
pub use sampling::{
    clean_samples, missing_value_report, EventSampling, MissingValueReport, SampleExtractor,
    SamplingParams, SamplingReport, TrainingSample,
};
pub use model::{
    log_loss, permutation_importance, Classifier, FloodModel, ProbabilityModel,
    MODEL_FORMAT_VERSION,
};
pub use boosting::{Booster, BoostingParams, GradientBoostedTrees};
pub use trainer::{log_feature_importance, ModelTrainer, TrainingParams};
pub use classify::{classify_probability, classify_raster, RiskLevel};
pub use inference::{InferenceEngine, RiskMaps, StaticCovariates};
pub use scenario::{
    compare_scenarios, run_scenarios, ProbabilityChange, Scenario, ScenarioConfig, ScenarioSummary,
};
pub use validation::{evaluate, ConfusionMatrix, ThresholdScore, ValidationReport};
