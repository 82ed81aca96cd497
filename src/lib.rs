//! floodrisk: event-based flood susceptibility mapping
//!
//! This library extracts balanced training samples from historical flood
//! masks and terrain/rain raster stacks, trains a monotone-constrained
//! tree-ensemble classifier, and scores full scenes under historical and
//! climate-stressed rainfall into probability and risk-class rasters.

pub mod types;
pub mod io;
pub mod core;
pub mod config;
pub mod pipeline;

// Re-export main types and functions for easier access
pub use types::{
    Band, BoundingBox, FloodError, FloodResult, GeoTransform, PixelMask, CLASS_NODATA,
    PROBABILITY_NODATA,
};

pub use config::PipelineConfig;
pub use io::{GridSpec, RasterSource, RasterStack};
#[cfg(feature = "gdal")]
pub use io::GeoTiffRaster;

pub use crate::core::{
    FeatureSet, FloodModel, InferenceEngine, ModelTrainer, ProbabilityModel, RiskMaps,
    SampleExtractor, ScenarioConfig, StaticCovariates, TrainingSample, ValidationReport,
};
