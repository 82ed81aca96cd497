//! Classifier abstraction and the persisted model artifact.

use crate::core::boosting::{Booster, BoostingParams};
use crate::core::features::Monotonicity;
use crate::types::{FloodError, FloodResult};
use chrono::{DateTime, Utc};
use ndarray::ArrayView2;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Version written into, and required from, every model file
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// A trained model: fixed-order feature rows in, flood probability out
pub trait ProbabilityModel: Send + Sync {
    /// Feature order the model was trained with
    fn feature_names(&self) -> &[String];

    /// Probability in [0, 1] for every row of `features`
    fn predict_proba(&self, features: ArrayView2<'_, f32>) -> FloodResult<Vec<f32>>;
}

/// A training procedure producing a [`ProbabilityModel`]
pub trait Classifier {
    type Model: ProbabilityModel;

    fn fit(
        &self,
        features: ArrayView2<'_, f32>,
        labels: &[u8],
        feature_names: &[String],
        constraints: &[Monotonicity],
    ) -> FloodResult<Self::Model>;
}

/// Versioned envelope around a trained booster: feature order, constraints
/// and the booster's own serialised form
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct FloodModel {
    pub format_version: u32,
    pub feature_names: Vec<String>,
    pub monotone_constraints: Vec<Monotonicity>,
    pub trained_at: DateTime<Utc>,
    pub params: BoostingParams,
    /// Permutation importance per feature, in feature order
    pub feature_importance: Vec<f64>,
    pub booster: Booster,
}

impl FloodModel {
    pub fn to_json(&self) -> FloodResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> FloodResult<Self> {
        let model: FloodModel = serde_json::from_str(text)?;
        model.check_consistency()?;
        Ok(model)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> FloodResult<()> {
        log::info!("Saving model to {}", path.as_ref().display());
        fs::write(path.as_ref(), self.to_json()?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> FloodResult<Self> {
        log::info!("Loading model from {}", path.as_ref().display());
        let text = fs::read_to_string(path.as_ref())?;
        let model = Self::from_json(&text)?;
        log::debug!(
            "Model trained {} with {} estimators over {} features",
            model.trained_at,
            model.params.n_estimators,
            model.feature_names.len()
        );
        Ok(model)
    }

    fn check_consistency(&self) -> FloodResult<()> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(FloodError::InvalidFormat(format!(
                "Unsupported model format version {} (expected {})",
                self.format_version, MODEL_FORMAT_VERSION
            )));
        }
        let n = self.feature_names.len();
        if self.monotone_constraints.len() != n {
            return Err(FloodError::InvalidFormat(format!(
                "Model lists {} monotone constraints for {} features",
                self.monotone_constraints.len(),
                n
            )));
        }
        if !self.feature_importance.is_empty() && self.feature_importance.len() != n {
            return Err(FloodError::InvalidFormat(format!(
                "Model lists {} importance values for {} features",
                self.feature_importance.len(),
                n
            )));
        }
        Ok(())
    }

    /// Feature importance normalised to sum to 1, most important first
    pub fn ranked_importance(&self) -> Vec<(String, f64)> {
        let total: f64 = self.feature_importance.iter().sum();
        let mut ranked: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .zip(&self.feature_importance)
            .map(|(name, &importance)| {
                let share = if total > 0.0 { importance / total } else { 0.0 };
                (name.clone(), share)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

impl ProbabilityModel for FloodModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_proba(&self, features: ArrayView2<'_, f32>) -> FloodResult<Vec<f32>> {
        if features.ncols() != self.feature_names.len() {
            return Err(FloodError::InvalidFormat(format!(
                "Feature matrix has {} columns, model expects {}",
                features.ncols(),
                self.feature_names.len()
            )));
        }
        Ok(self.booster.predict_proba(features))
    }
}

/// Mean log loss of `probabilities` against binary `labels`
pub fn log_loss(probabilities: &[f32], labels: &[u8]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let eps = 1e-12;
    let total: f64 = probabilities
        .iter()
        .zip(labels)
        .map(|(&p, &y)| {
            let p = (p as f64).clamp(eps, 1.0 - eps);
            if y == 1 {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    total / labels.len() as f64
}

/// Increase in log loss when each feature column is shuffled, in feature order.
/// Negative increases are reported as zero.
pub fn permutation_importance<M: ProbabilityModel + ?Sized>(
    model: &M,
    features: ArrayView2<'_, f32>,
    labels: &[u8],
    seed: u64,
) -> FloodResult<Vec<f64>> {
    let reference = log_loss(&model.predict_proba(features)?, labels);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut shuffled = features.to_owned();
    let mut order: Vec<usize> = (0..features.nrows()).collect();
    let mut importance = Vec::with_capacity(features.ncols());

    for col in 0..features.ncols() {
        order.shuffle(&mut rng);
        for (row, &source) in order.iter().enumerate() {
            shuffled[[row, col]] = features[[source, col]];
        }
        let loss = log_loss(&model.predict_proba(shuffled.view())?, labels);
        importance.push((loss - reference).max(0.0));
        shuffled.column_mut(col).assign(&features.column(col));
    }
    Ok(importance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::boosting::GradientBoostedTrees;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    /// Risk rises with slope; Rain_7D is noise
    fn trained_model() -> FloodModel {
        let features = Array2::from_shape_fn((80, 2), |(r, c)| {
            if c == 0 {
                r as f32 * 0.5
            } else {
                ((r * 7) % 11) as f32
            }
        });
        let labels: Vec<u8> = (0..80).map(|r| u8::from(r >= 40)).collect();
        let names = vec!["slope".to_string(), "Rain_7D".to_string()];
        let trainer = GradientBoostedTrees::new(BoostingParams {
            n_estimators: 15,
            max_depth: 2,
            learning_rate: 0.3,
            ..BoostingParams::default()
        })
        .unwrap();
        trainer
            .fit(
                features.view(),
                &labels,
                &names,
                &[Monotonicity::Unconstrained, Monotonicity::Increasing],
            )
            .unwrap()
    }

    #[test]
    fn test_predict_proba() {
        let model = trained_model();
        let rows = array![[2.0f32, 5.0], [35.0, 5.0], [f32::NAN, 5.0]];
        let p = model.predict_proba(rows.view()).unwrap();

        assert_eq!(p.len(), 3);
        assert!(p.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(p[0] < 0.3, "p = {}", p[0]);
        assert!(p[1] > 0.7, "p = {}", p[1]);
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let model = trained_model();
        let rows = array![[1.0f32, 2.0, 3.0]];
        assert!(matches!(
            model.predict_proba(rows.view()),
            Err(FloodError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_json_roundtrip_keeps_constraints() {
        let model = trained_model();
        let text = model.to_json().unwrap();
        assert!(text.contains("\"format_version\": 1"));
        let loaded = FloodModel::from_json(&text).unwrap();
        assert_eq!(loaded, model);
        assert_eq!(
            loaded.monotone_constraints,
            vec![Monotonicity::Unconstrained, Monotonicity::Increasing]
        );

        let rows = array![[3.0f32, 1.0], [30.0, 9.0]];
        assert_eq!(
            loaded.predict_proba(rows.view()).unwrap(),
            model.predict_proba(rows.view()).unwrap()
        );
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let mut model = trained_model();
        model.format_version = 99;
        let text = serde_json::to_string(&model).unwrap();
        assert!(matches!(
            FloodModel::from_json(&text),
            Err(FloodError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_load_rejects_constraint_length_mismatch() {
        let mut model = trained_model();
        model.monotone_constraints.pop();
        let text = serde_json::to_string(&model).unwrap();
        assert!(matches!(
            FloodModel::from_json(&text),
            Err(FloodError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_load_rejects_corrupt_booster() {
        let model = trained_model();
        let mut value = serde_json::to_value(&model).unwrap();
        for corrupt in ["not a booster", "{\"trees\": [{\"nodes\": 3}]}"] {
            value["booster"] = serde_json::Value::String(corrupt.to_string());
            assert!(FloodModel::from_json(&value.to_string()).is_err());
        }
    }

    #[test]
    fn test_importance_favours_informative_feature() {
        let model = trained_model();
        assert_eq!(model.feature_importance.len(), 2);
        assert!(model.feature_importance[0] > model.feature_importance[1]);
        assert!(model.feature_importance.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_ranked_importance() {
        let mut model = trained_model();
        model.feature_importance = vec![3.0, 1.0];
        let ranked = model.ranked_importance();
        assert_eq!(ranked[0].0, "slope");
        assert_relative_eq!(ranked[0].1, 0.75);
        assert_relative_eq!(ranked[1].1, 0.25);
    }

    #[test]
    fn test_log_loss() {
        assert_relative_eq!(log_loss(&[0.5, 0.5], &[0, 1]), 2.0f64.ln(), epsilon = 1e-9);
        assert!(log_loss(&[0.99, 0.01], &[1, 0]) < log_loss(&[0.6, 0.4], &[1, 0]));
        assert_eq!(log_loss(&[], &[]), 0.0);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let model = trained_model();
        model.save(&path).unwrap();
        assert_eq!(FloodModel::load(&path).unwrap(), model);
    }
}
