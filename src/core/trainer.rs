//! Model training from the extracted sample table.

use crate::core::boosting::{BoostingParams, GradientBoostedTrees};
use crate::core::features::FeatureSet;
use crate::core::model::{Classifier, FloodModel};
use crate::core::sampling::TrainingSample;
use crate::types::{FloodError, FloodResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Feature selection and booster settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    /// Model inputs in training order
    pub features: Vec<String>,
    pub boosting: BoostingParams,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            features: FeatureSet::standard().names(),
            boosting: BoostingParams::default(),
        }
    }
}

impl TrainingParams {
    pub fn feature_set(&self) -> FloodResult<FeatureSet> {
        FeatureSet::from_names(self.features.as_slice())
    }

    pub fn validate(&self) -> FloodResult<()> {
        self.feature_set()?;
        self.boosting.validate()
    }
}

/// Fits a classifier on training samples using a fixed feature order
pub struct ModelTrainer<C: Classifier> {
    feature_set: FeatureSet,
    classifier: C,
}

impl ModelTrainer<GradientBoostedTrees> {
    pub fn from_params(params: &TrainingParams) -> FloodResult<Self> {
        Ok(Self::new(
            params.feature_set()?,
            GradientBoostedTrees::new(params.boosting.clone())?,
        ))
    }
}

impl<C: Classifier> ModelTrainer<C> {
    pub fn new(feature_set: FeatureSet, classifier: C) -> Self {
        Self {
            feature_set,
            classifier,
        }
    }

    pub fn feature_set(&self) -> &FeatureSet {
        &self.feature_set
    }

    /// Feature matrix (rows x features) and label vector
    ///
    /// Fails on any non-finite feature value or a non-binary label; run
    /// [`clean_samples`](crate::core::sampling::clean_samples) first.
    pub fn feature_matrix(&self, samples: &[TrainingSample]) -> FloodResult<(Array2<f32>, Vec<u8>)> {
        let features = self.feature_set.features();
        let matrix = Array2::from_shape_fn((samples.len(), features.len()), |(r, c)| {
            samples[r].feature_value(&features[c])
        });

        if let Some(((row, col), _)) = matrix.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(FloodError::Training(format!(
                "Missing or non-finite value in column {} of sample {}",
                features[col], row
            )));
        }

        let labels: Vec<u8> = samples.iter().map(|s| s.label).collect();
        if let Some(bad) = labels.iter().find(|&&l| l > 1) {
            return Err(FloodError::Training(format!(
                "Label column is not binary: found {}",
                bad
            )));
        }

        Ok((matrix, labels))
    }

    pub fn train(&self, samples: &[TrainingSample]) -> FloodResult<C::Model> {
        let (matrix, labels) = self.feature_matrix(samples)?;
        let positives = labels.iter().filter(|&&l| l == 1).count();
        log::info!(
            "Training on {} samples ({} flood, {} non-flood) with {} features",
            labels.len(),
            positives,
            labels.len() - positives,
            self.feature_set.len()
        );
        log::debug!("Feature order: {:?}", self.feature_set.names());

        self.classifier.fit(
            matrix.view(),
            &labels,
            &self.feature_set.names(),
            &self.feature_set.monotone_constraints(),
        )
    }
}

/// Log the normalised permutation importance of a trained model
pub fn log_feature_importance(model: &FloodModel) {
    log::info!("Feature importance (permutation):");
    for (name, share) in model.ranked_importance() {
        log::info!("  {:<12} {:.4}", name, share);
    }
}
