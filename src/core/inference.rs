//! Full-scene flood probability and risk-class mapping.
//!
//! The static stack and its valid mask are read once; each scenario then
//! only reprojects four rain bands, assembles one feature matrix over the
//! valid pixels and hands it to the model in a single batch.

use crate::core::classify::{classify_probability, RiskLevel};
use crate::core::features::{FeatureSet, FeatureSource, RainVariable, StaticBand};
use crate::core::model::ProbabilityModel;
use crate::core::resample::reproject_bilinear;
use crate::core::sampling::valid_mask;
use crate::core::scenario::Scenario;
use crate::io::raster::{GridSpec, RasterSource};
use crate::types::{Band, FloodError, FloodResult, PixelMask, CLASS_NODATA, PROBABILITY_NODATA};
use ndarray::Array2;

/// Static covariates, valid mask and grid shared by every scenario
#[derive(Debug, Clone)]
pub struct StaticCovariates {
    grid: GridSpec,
    bands: Vec<Band>,
    valid: PixelMask,
    valid_count: usize,
}

impl StaticCovariates {
    /// Read all static bands; valid pixels have elevation within the given range
    pub fn load(statics: &dyn RasterSource, min_elevation: f32, max_elevation: f32) -> FloodResult<Self> {
        if statics.band_count() < StaticBand::COUNT {
            return Err(FloodError::Config(format!(
                "Static stack has {} bands, expected {}",
                statics.band_count(),
                StaticBand::COUNT
            )));
        }
        let grid = statics.grid().clone();
        let bands = StaticBand::ALL
            .iter()
            .map(|band| statics.read_band(band.band_index()))
            .collect::<FloodResult<Vec<Band>>>()?;

        let valid = valid_mask(
            &bands[StaticBand::Elevation.position()],
            &grid,
            min_elevation,
            max_elevation,
        );
        let valid_count = valid.iter().filter(|&&v| v).count();
        log::info!(
            "Static stack {}x{}: {} valid pixels",
            grid.height,
            grid.width,
            valid_count
        );

        Ok(Self {
            grid,
            bands,
            valid,
            valid_count,
        })
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn band(&self, band: StaticBand) -> &Band {
        &self.bands[band.position()]
    }

    pub fn valid_mask(&self) -> &PixelMask {
        &self.valid
    }

    pub fn valid_count(&self) -> usize {
        self.valid_count
    }
}

/// Probability and class rasters of one scenario, congruent with the static grid
#[derive(Debug, Clone, PartialEq)]
pub struct RiskMaps {
    /// Flood probability, [`PROBABILITY_NODATA`] outside the valid mask
    pub probability: Array2<f32>,
    /// Risk class 1..=5, [`CLASS_NODATA`] outside the valid mask
    pub classes: Array2<u8>,
    pub valid_pixels: usize,
}

impl RiskMaps {
    /// Pixels classified at `level` or above
    pub fn pixels_at_least(&self, level: RiskLevel) -> usize {
        self.classes
            .iter()
            .filter(|&&c| c != CLASS_NODATA && c >= level.code())
            .count()
    }

    /// Pixel count of every class 1..=5
    pub fn class_histogram(&self) -> [usize; 5] {
        let mut counts = [0usize; 5];
        for &c in self.classes.iter() {
            if let Some(level) = RiskLevel::from_code(c) {
                counts[level.code() as usize - 1] += 1;
            }
        }
        counts
    }

    #[cfg(feature = "gdal")]
    pub fn write<P: AsRef<std::path::Path>, Q: AsRef<std::path::Path>>(
        &self,
        grid: &GridSpec,
        probability_path: P,
        class_path: Q,
    ) -> FloodResult<()> {
        crate::io::geotiff::write_probability_raster(&self.probability, grid, probability_path)?;
        crate::io::geotiff::write_class_raster(&self.classes, grid, class_path)
    }
}

/// Scores scenarios with a trained model over a fixed static stack
pub struct InferenceEngine<'m, M: ProbabilityModel> {
    model: &'m M,
    feature_set: FeatureSet,
    statics: StaticCovariates,
}

impl<'m, M: ProbabilityModel> InferenceEngine<'m, M> {
    /// Fails with [`FloodError::FeatureOrder`] unless the model was trained on `feature_set`
    pub fn new(model: &'m M, feature_set: FeatureSet, statics: StaticCovariates) -> FloodResult<Self> {
        feature_set.ensure_order(model.feature_names())?;
        Ok(Self {
            model,
            feature_set,
            statics,
        })
    }

    pub fn statics(&self) -> &StaticCovariates {
        &self.statics
    }

    pub fn run_scenario(&self, rain: &dyn RasterSource, scenario: &Scenario) -> FloodResult<RiskMaps> {
        self.predict_event(rain, scenario.event_index, scenario.rain_multiplier)
    }

    /// Score every valid pixel for rain event `event_index`, scaled by `multiplier`
    pub fn predict_event(
        &self,
        rain: &dyn RasterSource,
        event_index: usize,
        multiplier: f32,
    ) -> FloodResult<RiskMaps> {
        let grid = &self.statics.grid;

        let rain_bands = RainVariable::ALL
            .iter()
            .map(|variable| -> FloodResult<Band> {
                let band = rain.read_band(variable.band_index(event_index))?;
                let mut resampled = reproject_bilinear(&band, rain.grid(), grid)?;
                resampled.mapv_inplace(|v| v * multiplier);
                Ok(resampled)
            })
            .collect::<FloodResult<Vec<Band>>>()?;

        let matrix = self.feature_matrix(&rain_bands);
        log::debug!(
            "Feature matrix {}x{} for event {}",
            matrix.nrows(),
            matrix.ncols(),
            event_index
        );

        let probabilities = self.model.predict_proba(matrix.view())?;
        if probabilities.len() != self.statics.valid_count {
            return Err(FloodError::InvalidFormat(format!(
                "Model returned {} probabilities for {} pixels",
                probabilities.len(),
                self.statics.valid_count
            )));
        }

        let mut probability = Array2::from_elem(grid.shape(), PROBABILITY_NODATA);
        let mut classes = Array2::from_elem(grid.shape(), CLASS_NODATA);
        let valid_pixels = self.statics.valid.indexed_iter().filter(|(_, v)| **v).map(|(ix, _)| ix);
        for ((row, col), p) in valid_pixels.zip(probabilities) {
            probability[[row, col]] = p;
            classes[[row, col]] = classify_probability(p);
        }

        Ok(RiskMaps {
            probability,
            classes,
            valid_pixels: self.statics.valid_count,
        })
    }

    /// Rows are valid pixels in row-major order, columns follow the feature set
    fn feature_matrix(&self, rain_bands: &[Band]) -> Array2<f32> {
        let features = self.feature_set.features();
        let mut matrix = Array2::zeros((self.statics.valid_count, features.len()));

        let valid_pixels = self.statics.valid.indexed_iter().filter(|(_, v)| **v).map(|(ix, _)| ix);
        for (mut out_row, (row, col)) in matrix.rows_mut().into_iter().zip(valid_pixels) {
            for (slot, feature) in out_row.iter_mut().zip(features) {
                *slot = match feature.source() {
                    FeatureSource::Static(band) => {
                        let value = self.statics.bands[band.position()][[row, col]];
                        if self.statics.grid.is_nodata(value) {
                            f32::NAN
                        } else {
                            value
                        }
                    }
                    FeatureSource::Rain(variable) => rain_bands[variable.position()][[row, col]],
                };
            }
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::features::Feature;
    use crate::io::raster::RasterStack;
    use crate::types::GeoTransform;
    use approx::assert_relative_eq;
    use ndarray::ArrayView2;

    /// p = 0.1 * slope + 0.01 * Rain_7D
    struct LinearModel {
        names: Vec<String>,
    }

    impl LinearModel {
        fn new() -> Self {
            Self {
                names: vec!["slope".to_string(), "Rain_7D".to_string()],
            }
        }
    }

    impl ProbabilityModel for LinearModel {
        fn feature_names(&self) -> &[String] {
            &self.names
        }

        fn predict_proba(&self, features: ArrayView2<'_, f32>) -> FloodResult<Vec<f32>> {
            Ok(features
                .rows()
                .into_iter()
                .map(|row| 0.1 * row[0] + 0.01 * row[1])
                .collect())
        }
    }

    fn feature_set() -> FeatureSet {
        FeatureSet::new(vec![
            Feature::from_static(StaticBand::Slope),
            Feature::from_rain(RainVariable::Rain7Day),
        ])
        .unwrap()
    }

    fn statics() -> StaticCovariates {
        let grid = GridSpec::new("EPSG:32648", GeoTransform::north_up(0.0, 100.0, 25.0, -25.0), 4, 4)
            .with_nodata(-9999.0);
        let mut bands = vec![Array2::zeros((4, 4)); StaticBand::COUNT];
        bands[StaticBand::Elevation.position()] = Array2::from_elem((4, 4), 10.0);
        bands[StaticBand::Elevation.position()][[0, 0]] = -9999.0;
        bands[StaticBand::Slope.position()] = Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as f32 * 0.5);
        let stack = RasterStack::new(grid, bands).unwrap();
        StaticCovariates::load(&stack, -100.0, 3000.0).unwrap()
    }

    /// 2x2 rain grid at 50 m over the 4x4 static grid
    fn rain_from(rain_7d: Array2<f32>) -> RasterStack {
        let grid = GridSpec::new("EPSG:32648", GeoTransform::north_up(0.0, 100.0, 50.0, -50.0), 2, 2);
        let mut bands = vec![Array2::from_elem((2, 2), 1.0f32); RainVariable::PER_EVENT];
        bands[RainVariable::Rain7Day.position()] = rain_7d;
        RasterStack::new(grid, bands).unwrap()
    }

    fn rain(rain_7d: f32) -> RasterStack {
        rain_from(Array2::from_elem((2, 2), rain_7d))
    }

    #[test]
    fn test_end_to_end_with_linear_model() {
        let model = LinearModel::new();
        let engine = InferenceEngine::new(&model, feature_set(), statics()).unwrap();
        let rain_7d = ndarray::array![[4.0f32, 8.0], [12.0, 16.0]];
        let maps = engine.predict_event(&rain_from(rain_7d), 0, 1.0).unwrap();

        // static pixel centres sit at fractional rain positions 0, 0.25, 0.75, 1
        // after edge clamping, so rain = 4 + 4 * fc + 8 * fr
        let frac = [0.0f32, 0.25, 0.75, 1.0];

        assert_eq!(maps.valid_pixels, 15);
        assert_eq!(maps.probability[[0, 0]], PROBABILITY_NODATA);
        assert_eq!(maps.classes[[0, 0]], CLASS_NODATA);

        for row in 0..4 {
            for col in 0..4 {
                if (row, col) == (0, 0) {
                    continue;
                }
                let slope = (row * 4 + col) as f32 * 0.5;
                let rain_7d = 4.0 + 4.0 * frac[col] + 8.0 * frac[row];
                let expected = 0.1 * slope + 0.01 * rain_7d;
                assert_relative_eq!(maps.probability[[row, col]], expected, epsilon = 1e-5);
                assert_eq!(maps.classes[[row, col]], classify_probability(expected));
            }
        }
        assert_relative_eq!(maps.probability[[0, 1]], 0.05 + 0.01 * 5.0, epsilon = 1e-5);
        assert_relative_eq!(maps.probability[[2, 1]], 0.45 + 0.01 * 11.0, epsilon = 1e-5);
        assert_eq!(maps.classes[[3, 3]], 5);
        assert_eq!(maps.class_histogram().iter().sum::<usize>(), 15);
    }

    #[test]
    fn test_rain_multiplier_scales_rain_features() {
        let model = LinearModel::new();
        let engine = InferenceEngine::new(&model, feature_set(), statics()).unwrap();
        let scenario = Scenario::new("wet", 0, 1.5);
        let maps = engine.run_scenario(&rain(4.0), &scenario).unwrap();

        assert_relative_eq!(maps.probability[[0, 1]], 0.1 * 0.5 + 0.01 * 6.0, epsilon = 1e-6);
    }

    #[test]
    fn test_feature_order_mismatch_is_rejected() {
        let model = LinearModel {
            names: vec!["Rain_7D".to_string(), "slope".to_string()],
        };
        assert!(matches!(
            InferenceEngine::new(&model, feature_set(), statics()),
            Err(FloodError::FeatureOrder { .. })
        ));
    }

    #[test]
    fn test_rain_in_other_crs_is_rejected() {
        let model = LinearModel::new();
        let engine = InferenceEngine::new(&model, feature_set(), statics()).unwrap();
        let mut grid = rain(1.0).grid().clone();
        grid.crs = "EPSG:4326".to_string();
        let other = RasterStack::new(grid, vec![Array2::zeros((2, 2)); 4]).unwrap();

        assert!(matches!(
            engine.predict_event(&other, 0, 1.0),
            Err(FloodError::GridMismatch(_))
        ));
    }

    #[test]
    fn test_missing_event_band() {
        let model = LinearModel::new();
        let engine = InferenceEngine::new(&model, feature_set(), statics()).unwrap();
        assert!(matches!(
            engine.predict_event(&rain(1.0), 1, 1.0),
            Err(FloodError::BandIndex { .. })
        ));
    }
}
