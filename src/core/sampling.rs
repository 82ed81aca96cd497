//! Event-based training sample extraction with hard-negative mining.
//!
//! For every flood event the extractor draws a class-balanced set of pixels:
//! flooded pixels as positives, and dry pixels split between a "hard" zone
//! (flat terrain close to water, which looks flood-prone) and the remaining
//! random zone. Static covariates are read at the pixel itself; rain
//! covariates are looked up in the coarser rain grid via the pixel centre.

use crate::core::features::{Feature, FeatureSource, RainVariable, StaticBand};
use crate::core::resample::remap_point_nearest;
use crate::io::raster::{GridSpec, RasterSource};
use crate::types::{Band, FloodError, FloodResult, PixelMask};
use ndarray::Array2;
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Sample extraction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    /// Maximum positives drawn per event; negatives match the positive count
    pub samples_per_class: usize,
    /// Share of negatives drawn from the hard zone
    pub hard_negative_fraction: f64,
    /// Seed of the sampling random source
    pub seed: u64,
    /// Elevation range (m) accepted as valid data
    pub min_valid_elevation: f32,
    pub max_valid_elevation: f32,
    /// Hard zone: slope below this (degrees)...
    pub hard_zone_max_slope: f32,
    /// ...and distance to water below this (m)
    pub hard_zone_max_distance: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            samples_per_class: 5000,
            hard_negative_fraction: 0.5,
            seed: 42,
            min_valid_elevation: -100.0,
            max_valid_elevation: 3000.0,
            hard_zone_max_slope: 5.0,
            hard_zone_max_distance: 1000.0,
        }
    }
}

impl SamplingParams {
    pub fn validate(&self) -> FloodResult<()> {
        if !(0.0..=1.0).contains(&self.hard_negative_fraction) {
            return Err(FloodError::Config(format!(
                "Hard negative fraction must lie in [0, 1], got {}",
                self.hard_negative_fraction
            )));
        }
        if self.samples_per_class == 0 {
            return Err(FloodError::Config(
                "Samples per class must be positive".to_string(),
            ));
        }
        if self.min_valid_elevation > self.max_valid_elevation {
            return Err(FloodError::Config(format!(
                "Invalid elevation range [{}, {}]",
                self.min_valid_elevation, self.max_valid_elevation
            )));
        }
        Ok(())
    }
}

/// One row of the training table
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub event_id: usize,
    pub event_name: String,
    pub x: f64,
    pub y: f64,
    pub label: u8,
    pub hard_negative: bool,
    /// Indexed by [`StaticBand::position`]; missing values are NaN
    pub static_values: [f32; StaticBand::COUNT],
    /// Indexed by [`RainVariable::position`]; missing values are NaN
    pub rain_values: [f32; RainVariable::PER_EVENT],
}

impl TrainingSample {
    pub fn feature_value(&self, feature: &Feature) -> f32 {
        match feature.source() {
            FeatureSource::Static(band) => self.static_values[band.position()],
            FeatureSource::Rain(variable) => self.rain_values[variable.position()],
        }
    }

    pub fn has_missing(&self) -> bool {
        !self.x.is_finite()
            || !self.y.is_finite()
            || self.static_values.iter().any(|v| !v.is_finite())
            || self.rain_values.iter().any(|v| !v.is_finite())
    }
}

/// Per-event sampling counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventSampling {
    pub event_id: usize,
    pub event_name: String,
    pub available_positives: usize,
    pub available_hard: usize,
    pub available_random: usize,
    pub positives: usize,
    pub hard_negatives: usize,
    pub random_negatives: usize,
}

impl EventSampling {
    pub fn negatives(&self) -> usize {
        self.hard_negatives + self.random_negatives
    }

    /// Negatives missing to balance the positives
    pub fn shortfall(&self) -> usize {
        self.positives.saturating_sub(self.negatives())
    }

    pub fn total(&self) -> usize {
        self.positives + self.negatives()
    }
}

/// Outcome of a full extraction run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SamplingReport {
    pub events: Vec<EventSampling>,
    /// Events without any flooded pixel, as `(event_id, event_name)`
    pub skipped_events: Vec<(usize, String)>,
}

impl SamplingReport {
    pub fn total_rows(&self) -> usize {
        self.events.iter().map(EventSampling::total).sum()
    }
}

/// How many pixels to draw from each pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleQuota {
    pub positives: usize,
    pub hard_negatives: usize,
    pub random_negatives: usize,
}

impl SampleQuota {
    /// Balance negatives against positives; a hard-zone shortfall is
    /// backfilled from random negatives, never the other way round.
    pub fn compute(
        available_positives: usize,
        available_hard: usize,
        available_random: usize,
        samples_per_class: usize,
        hard_fraction: f64,
    ) -> Self {
        let positives = available_positives.min(samples_per_class);
        let target_negatives = positives;
        let target_hard = (target_negatives as f64 * hard_fraction).round() as usize;
        let hard_negatives = available_hard.min(target_hard);
        let random_negatives = available_random.min(target_negatives - hard_negatives);

        Self {
            positives,
            hard_negatives,
            random_negatives,
        }
    }
}

/// Pixels with usable elevation inside the accepted range
pub fn valid_mask(elevation: &Band, grid: &GridSpec, min_elevation: f32, max_elevation: f32) -> PixelMask {
    elevation.mapv(|v| !grid.is_nodata(v) && v >= min_elevation && v <= max_elevation)
}

/// Flat, near-water pixels inside the valid mask
pub fn hard_zone_mask(
    slope: &Band,
    distance_to_water: &Band,
    valid: &PixelMask,
    max_slope: f32,
    max_distance: f32,
) -> PixelMask {
    let mut mask = Array2::from_elem(valid.dim(), false);
    ndarray::Zip::from(&mut mask)
        .and(slope)
        .and(distance_to_water)
        .and(valid)
        .for_each(|m, &s, &d, &v| *m = v && s < max_slope && d < max_distance);
    mask
}

/// Draws balanced training samples from label, static and rain stacks
pub struct SampleExtractor {
    params: SamplingParams,
}

impl SampleExtractor {
    pub fn new(params: SamplingParams) -> FloodResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &SamplingParams {
        &self.params
    }

    /// Extract samples for every event of `labels`, in band order
    pub fn extract(
        &self,
        labels: &dyn RasterSource,
        statics: &dyn RasterSource,
        rain: &dyn RasterSource,
    ) -> FloodResult<(Vec<TrainingSample>, SamplingReport)> {
        let static_grid = statics.grid();
        let rain_grid = rain.grid();
        let event_count = labels.band_count();

        log::info!("Extracting training samples for {} events", event_count);
        log::debug!("Sampling parameters: {:?}", self.params);

        if labels.grid().shape() != static_grid.shape() {
            return Err(FloodError::GridMismatch(format!(
                "Label stack shape {:?} differs from static stack shape {:?}",
                labels.grid().shape(),
                static_grid.shape()
            )));
        }
        if statics.band_count() < StaticBand::COUNT {
            return Err(FloodError::Config(format!(
                "Static stack has {} bands, expected {}",
                statics.band_count(),
                StaticBand::COUNT
            )));
        }
        let required_rain = event_count * RainVariable::PER_EVENT;
        if rain.band_count() < required_rain {
            return Err(FloodError::Config(format!(
                "Rain stack has {} bands, {} events need {}",
                rain.band_count(),
                event_count,
                required_rain
            )));
        }
        static_grid.ensure_compatible(rain_grid)?;

        let static_bands = StaticBand::ALL
            .iter()
            .map(|band| statics.read_band(band.band_index()))
            .collect::<FloodResult<Vec<Band>>>()?;

        let valid = valid_mask(
            &static_bands[StaticBand::Elevation.position()],
            static_grid,
            self.params.min_valid_elevation,
            self.params.max_valid_elevation,
        );
        let hard_zone = hard_zone_mask(
            &static_bands[StaticBand::Slope.position()],
            &static_bands[StaticBand::DistanceToWater.position()],
            &valid,
            self.params.hard_zone_max_slope,
            self.params.hard_zone_max_distance,
        );

        let valid_count = valid.iter().filter(|&&v| v).count();
        log::info!(
            "Valid pixels: {} / {} ({:.1}%)",
            valid_count,
            valid.len(),
            percent(valid_count, valid.len())
        );

        let mut rng = ChaCha8Rng::seed_from_u64(self.params.seed);
        let mut samples = Vec::new();
        let mut report = SamplingReport::default();

        for event_id in 0..event_count {
            let event_name = labels
                .band_description(event_id + 1)
                .unwrap_or_else(|| format!("Event_{}", event_id + 1));
            let flood = labels.read_band(event_id + 1)?;

            let mut positive_pool = Vec::new();
            let mut hard_pool = Vec::new();
            let mut random_pool = Vec::new();
            for ((row, col), &value) in flood.indexed_iter() {
                if !valid[[row, col]] {
                    continue;
                }
                if value == 1.0 {
                    positive_pool.push((row, col));
                } else if value == 0.0 {
                    if hard_zone[[row, col]] {
                        hard_pool.push((row, col));
                    } else {
                        random_pool.push((row, col));
                    }
                }
            }

            if positive_pool.is_empty() {
                log::warn!("{}: no flooded pixels, event skipped", event_name);
                report.skipped_events.push((event_id, event_name));
                continue;
            }

            let quota = SampleQuota::compute(
                positive_pool.len(),
                hard_pool.len(),
                random_pool.len(),
                self.params.samples_per_class,
                self.params.hard_negative_fraction,
            );

            let rain_bands = RainVariable::ALL
                .iter()
                .map(|variable| rain.read_band(variable.band_index(event_id)))
                .collect::<FloodResult<Vec<Band>>>()?;

            let draws = [
                (&positive_pool, quota.positives, 1u8, false),
                (&hard_pool, quota.hard_negatives, 0u8, true),
                (&random_pool, quota.random_negatives, 0u8, false),
            ];
            for (pool, amount, label, hard_negative) in draws {
                for i in index::sample(&mut rng, pool.len(), amount).into_iter() {
                    let (row, col) = pool[i];
                    let (x, y) = static_grid.forward_transform(row, col);
                    let (rain_row, rain_col) = remap_point_nearest(rain_grid, static_grid, row, col)?;

                    let mut static_values = [f32::NAN; StaticBand::COUNT];
                    for (slot, band) in static_values.iter_mut().zip(&static_bands) {
                        *slot = missing_as_nan(band[[row, col]], static_grid);
                    }
                    let mut rain_values = [f32::NAN; RainVariable::PER_EVENT];
                    for (slot, band) in rain_values.iter_mut().zip(&rain_bands) {
                        *slot = missing_as_nan(band[[rain_row, rain_col]], rain_grid);
                    }

                    samples.push(TrainingSample {
                        event_id,
                        event_name: event_name.clone(),
                        x,
                        y,
                        label,
                        hard_negative,
                        static_values,
                        rain_values,
                    });
                }
            }

            let stats = EventSampling {
                event_id,
                event_name,
                available_positives: positive_pool.len(),
                available_hard: hard_pool.len(),
                available_random: random_pool.len(),
                positives: quota.positives,
                hard_negatives: quota.hard_negatives,
                random_negatives: quota.random_negatives,
            };
            if stats.shortfall() > 0 {
                log::warn!(
                    "{}: only {} negatives available for {} positives",
                    stats.event_name,
                    stats.negatives(),
                    stats.positives
                );
            }
            log::debug!(
                "{}: pos={} hard={} rand={}",
                stats.event_name,
                stats.positives,
                stats.hard_negatives,
                stats.random_negatives
            );
            report.events.push(stats);
        }

        log::info!(
            "Extracted {} samples from {} events ({} skipped)",
            samples.len(),
            report.events.len(),
            report.skipped_events.len()
        );
        Ok((samples, report))
    }
}

fn missing_as_nan(value: f32, grid: &GridSpec) -> f32 {
    if grid.is_nodata(value) {
        f32::NAN
    } else {
        value
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Training table column names, in file order
pub fn table_columns() -> Vec<&'static str> {
    let mut columns = vec!["Event_ID", "Event_Name", "X", "Y", "Label", "Is_Hard_Neg"];
    columns.extend(StaticBand::ALL.iter().map(|b| b.column_name()));
    columns.extend(RainVariable::ALL.iter().map(|v| v.column_name()));
    columns
}

/// Missing values in one table column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMissing {
    pub column: String,
    pub missing: usize,
}

/// Per-column missing value counts of a training table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingValueReport {
    pub total_rows: usize,
    pub columns: Vec<ColumnMissing>,
}

impl MissingValueReport {
    pub fn percent(&self, column: &ColumnMissing) -> f64 {
        percent(column.missing, self.total_rows)
    }

    pub fn has_missing(&self) -> bool {
        self.columns.iter().any(|c| c.missing > 0)
    }
}

/// Count missing values per column and log the affected ones
pub fn missing_value_report(samples: &[TrainingSample]) -> MissingValueReport {
    let mut columns = vec![
        ColumnMissing {
            column: "X".to_string(),
            missing: samples.iter().filter(|s| !s.x.is_finite()).count(),
        },
        ColumnMissing {
            column: "Y".to_string(),
            missing: samples.iter().filter(|s| !s.y.is_finite()).count(),
        },
    ];
    for band in StaticBand::ALL {
        columns.push(ColumnMissing {
            column: band.column_name().to_string(),
            missing: samples
                .iter()
                .filter(|s| !s.static_values[band.position()].is_finite())
                .count(),
        });
    }
    for variable in RainVariable::ALL {
        columns.push(ColumnMissing {
            column: variable.column_name().to_string(),
            missing: samples
                .iter()
                .filter(|s| !s.rain_values[variable.position()].is_finite())
                .count(),
        });
    }

    let report = MissingValueReport {
        total_rows: samples.len(),
        columns,
    };
    for column in report.columns.iter().filter(|c| c.missing > 0) {
        log::warn!(
            "Column {}: {} missing ({:.2}%)",
            column.column,
            column.missing,
            report.percent(column)
        );
    }
    report
}

/// Drop rows holding any missing value, returning the kept rows and the drop count
pub fn clean_samples(samples: Vec<TrainingSample>) -> (Vec<TrainingSample>, usize) {
    let before = samples.len();
    let kept: Vec<TrainingSample> = samples.into_iter().filter(|s| !s.has_missing()).collect();
    let dropped = before - kept.len();
    if dropped > 0 {
        log::warn!("Dropped {} of {} rows with missing values", dropped, before);
    }
    (kept, dropped)
}
