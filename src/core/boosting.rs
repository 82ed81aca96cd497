//! Gradient-boosted tree backend built on `forust-ml`.
//!
//! The booster is trained on the logistic loss with one monotone constraint
//! per feature column. Missing (NaN) inputs are handled by the booster's own
//! missing-value branches.

use crate::core::features::Monotonicity;
use crate::core::model::{permutation_importance, Classifier, FloodModel, MODEL_FORMAT_VERSION};
use crate::types::{FloodError, FloodResult};
use forust_ml::constraints::{Constraint, ConstraintMap};
use forust_ml::objective::ObjectiveType;
use forust_ml::{GradientBooster, Matrix};
use ndarray::ArrayView2;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Boosting hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// L2 penalty on leaf weights
    pub l2_regularization: f64,
    /// Minimum hessian sum in each child
    pub min_child_weight: f64,
    pub min_split_gain: f64,
    /// Fraction of rows drawn for each tree
    pub subsample: f64,
    /// Maximum histogram bins per feature
    pub max_bins: usize,
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 500,
            max_depth: 6,
            learning_rate: 0.05,
            l2_regularization: 1.0,
            min_child_weight: 1.0,
            min_split_gain: 0.0,
            subsample: 1.0,
            max_bins: 256,
            seed: 42,
        }
    }
}

impl BoostingParams {
    pub fn validate(&self) -> FloodResult<()> {
        if self.n_estimators == 0 || self.max_depth == 0 {
            return Err(FloodError::Config(
                "n_estimators and max_depth must be positive".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(FloodError::Config(format!(
                "Learning rate must lie in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(FloodError::Config(format!(
                "Subsample must lie in (0, 1], got {}",
                self.subsample
            )));
        }
        if self.max_bins < 2 || self.max_bins > u16::MAX as usize {
            return Err(FloodError::Config(format!(
                "max_bins must lie in [2, {}], got {}",
                u16::MAX,
                self.max_bins
            )));
        }
        if !(self.l2_regularization >= 0.0 && self.min_child_weight >= 0.0 && self.min_split_gain >= 0.0) {
            return Err(FloodError::Config(
                "Regularisation terms must be non-negative".to_string(),
            ));
        }
        // an empty child would otherwise get the weight -0/0
        if self.l2_regularization + self.min_child_weight <= 0.0 {
            return Err(FloodError::Config(
                "l2_regularization and min_child_weight cannot both be zero".to_string(),
            ));
        }
        Ok(())
    }

    fn to_booster(&self, constraints: &[Monotonicity]) -> GradientBooster {
        GradientBooster::default()
            .set_objective_type(ObjectiveType::LogLoss)
            .set_iterations(self.n_estimators)
            .set_max_depth(self.max_depth)
            .set_learning_rate(self.learning_rate as f32)
            .set_l2(self.l2_regularization as f32)
            .set_min_leaf_weight(self.min_child_weight as f32)
            .set_gamma(self.min_split_gain as f32)
            .set_subsample(self.subsample as f32)
            .set_nbins(self.max_bins as u16)
            .set_seed(self.seed)
            .set_parallel(cfg!(feature = "parallel"))
            .set_monotone_constraints(Some(constraint_map(constraints)))
    }
}

fn constraint_map(constraints: &[Monotonicity]) -> ConstraintMap {
    constraints
        .iter()
        .enumerate()
        .filter_map(|(feature, monotonicity)| match monotonicity {
            Monotonicity::Increasing => Some((feature, Constraint::Positive)),
            Monotonicity::Decreasing => Some((feature, Constraint::Negative)),
            Monotonicity::Unconstrained => None,
        })
        .collect()
}

/// Column-major `f64` copy of a feature matrix, the layout `forust_ml::Matrix` reads
fn column_major(features: ArrayView2<'_, f32>) -> Vec<f64> {
    features.t().iter().map(|&v| v as f64).collect()
}

fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

/// Trained booster; persisted as the booster's own JSON document
pub struct Booster {
    inner: GradientBooster,
}

impl Booster {
    /// Raw log-odds for every row
    pub fn margins(&self, features: ArrayView2<'_, f32>) -> Vec<f64> {
        let (rows, cols) = features.dim();
        if rows == 0 {
            return Vec::new();
        }
        let data = column_major(features);
        let matrix = Matrix::new(&data, rows, cols);
        self.inner.predict(&matrix, cfg!(feature = "parallel"))
    }

    pub fn predict_proba(&self, features: ArrayView2<'_, f32>) -> Vec<f32> {
        self.margins(features)
            .into_iter()
            .map(|margin| sigmoid(margin) as f32)
            .collect()
    }

    pub fn to_json(&self) -> FloodResult<String> {
        self.inner
            .json_dump()
            .map_err(|e| FloodError::InvalidFormat(format!("Cannot serialise booster: {}", e)))
    }

    pub fn from_json(text: &str) -> FloodResult<Self> {
        let inner = GradientBooster::from_json(text)
            .map_err(|e| FloodError::InvalidFormat(format!("Invalid booster document: {}", e)))?;
        Ok(Self { inner })
    }
}

impl fmt::Debug for Booster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Booster").finish_non_exhaustive()
    }
}

impl PartialEq for Booster {
    /// Compares the parsed documents, so map key order does not matter
    fn eq(&self, other: &Self) -> bool {
        let parse = |booster: &Booster| {
            booster
                .to_json()
                .ok()
                .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok())
        };
        match (parse(self), parse(other)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl Serialize for Booster {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let text = self.to_json().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }
}

impl<'de> Deserialize<'de> for Booster {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Booster::from_json(&text).map_err(serde::de::Error::custom)
    }
}

/// Monotone-constrained gradient boosting classifier
#[derive(Debug, Clone, Default)]
pub struct GradientBoostedTrees {
    params: BoostingParams,
}

impl GradientBoostedTrees {
    pub fn new(params: BoostingParams) -> FloodResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    /// Fit a booster on a rows x features matrix of binary labels
    pub fn fit_booster(
        &self,
        features: ArrayView2<'_, f32>,
        labels: &[u8],
        constraints: &[Monotonicity],
    ) -> FloodResult<Booster> {
        check_training_inputs(features, labels, constraints)?;
        let (n_rows, n_features) = features.dim();
        log::info!(
            "Boosting {} trees (depth {}, eta {}) on {} rows x {} features",
            self.params.n_estimators,
            self.params.max_depth,
            self.params.learning_rate,
            n_rows,
            n_features
        );

        let data = column_major(features);
        let matrix = Matrix::new(&data, n_rows, n_features);
        let targets: Vec<f64> = labels.iter().map(|&y| y as f64).collect();

        let mut inner = self.params.to_booster(constraints);
        inner
            .fit_unweighted(&matrix, &targets, None)
            .map_err(|e| FloodError::Training(format!("Booster training failed: {}", e)))?;
        Ok(Booster { inner })
    }
}

impl Classifier for GradientBoostedTrees {
    type Model = FloodModel;

    fn fit(
        &self,
        features: ArrayView2<'_, f32>,
        labels: &[u8],
        feature_names: &[String],
        constraints: &[Monotonicity],
    ) -> FloodResult<FloodModel> {
        if feature_names.len() != features.ncols() {
            return Err(FloodError::Training(format!(
                "{} feature names for {} feature columns",
                feature_names.len(),
                features.ncols()
            )));
        }
        let booster = self.fit_booster(features, labels, constraints)?;

        let mut model = FloodModel {
            format_version: MODEL_FORMAT_VERSION,
            feature_names: feature_names.to_vec(),
            monotone_constraints: constraints.to_vec(),
            trained_at: chrono::Utc::now(),
            params: self.params.clone(),
            feature_importance: Vec::new(),
            booster,
        };
        model.feature_importance = permutation_importance(&model, features, labels, self.params.seed)?;
        Ok(model)
    }
}

/// Reject non-finite features, non-binary labels and mismatched constraints
pub fn check_training_inputs(
    features: ArrayView2<'_, f32>,
    labels: &[u8],
    constraints: &[Monotonicity],
) -> FloodResult<()> {
    let (n_rows, n_features) = features.dim();
    if n_rows == 0 {
        return Err(FloodError::Training("Training table is empty".to_string()));
    }
    if labels.len() != n_rows {
        return Err(FloodError::Training(format!(
            "{} labels for {} rows",
            labels.len(),
            n_rows
        )));
    }
    if constraints.len() != n_features {
        return Err(FloodError::Training(format!(
            "{} monotone constraints for {} features",
            constraints.len(),
            n_features
        )));
    }
    if let Some(((row, col), value)) = features.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(FloodError::Training(format!(
            "Non-finite feature value {} at row {}, column {}",
            value, row, col
        )));
    }
    if let Some(label) = labels.iter().find(|&&y| y > 1) {
        return Err(FloodError::Training(format!(
            "Label column is not binary: found {}",
            label
        )));
    }
    let positives = labels.iter().filter(|&&y| y == 1).count();
    if positives == 0 || positives == n_rows {
        return Err(FloodError::Training(
            "Label column is not binary: only one class present".to_string(),
        ));
    }
    Ok(())
}
