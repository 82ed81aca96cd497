//! Moving values between two independently gridded rasters.
//!
//! Two operations with different semantics live here on purpose:
//! [`remap_point_nearest`] picks the source pixel containing a single point
//! (used when sampling), while [`reproject_bilinear`] resamples a whole band
//! onto another grid (used for full-scene inference).

use crate::io::raster::GridSpec;
use crate::types::{Band, FloodError, FloodResult};
use ndarray::Array2;

/// Value written where bilinear reprojection has no source data
pub const REPROJECT_FILL: f32 = 0.0;

/// Source pixel `(row, col)` containing the centre of target pixel `(row, col)`
pub fn remap_point_nearest(
    source_grid: &GridSpec,
    target_grid: &GridSpec,
    row: usize,
    col: usize,
) -> FloodResult<(usize, usize)> {
    let (x, y) = target_grid.forward_transform(row, col);
    source_grid.inverse_transform(x, y)
}

/// Resample `source` onto `target_grid` with bilinear interpolation
///
/// For each target pixel centre the geographic coordinate is mapped into the
/// source grid and the four surrounding source pixel centres are blended by
/// fractional distance. Neighbours beyond the grid edge are clamped to the
/// edge pixel, source no-data neighbours are dropped and the remaining
/// weights renormalised. Target pixels outside the source extent, or with
/// only no-data neighbours, receive [`REPROJECT_FILL`].
pub fn reproject_bilinear(
    source: &Band,
    source_grid: &GridSpec,
    target_grid: &GridSpec,
) -> FloodResult<Band> {
    source_grid.ensure_compatible(target_grid)?;
    if source.dim() != source_grid.shape() {
        return Err(FloodError::GridMismatch(format!(
            "Source band shape {:?} does not match its grid {:?}",
            source.dim(),
            source_grid.shape()
        )));
    }

    let (target_height, target_width) = target_grid.shape();
    let rows = resample_rows(source, source_grid, target_grid)?;

    let mut output = Array2::from_elem((target_height, target_width), REPROJECT_FILL);
    let mut unfilled = 0usize;
    for (row, (values, missing)) in rows.into_iter().enumerate() {
        output.row_mut(row).assign(&ndarray::ArrayView1::from(&values[..]));
        unfilled += missing;
    }

    if unfilled > 0 {
        log::warn!(
            "Reprojection left {} of {} target pixels without source data",
            unfilled,
            target_height * target_width
        );
    }
    log::debug!(
        "Reprojected {:?} -> {:?}",
        source_grid.shape(),
        target_grid.shape()
    );

    Ok(output)
}

/// One target row: interpolated values and the count left at the fill value
fn resample_row(
    source: &Band,
    source_grid: &GridSpec,
    target_grid: &GridSpec,
    row: usize,
) -> FloodResult<(Vec<f32>, usize)> {
    let width = target_grid.width;
    let mut values = vec![REPROJECT_FILL; width];
    let mut unfilled = 0usize;
    for (col, value) in values.iter_mut().enumerate() {
        let (x, y) = target_grid.forward_transform(row, col);
        let (src_col, src_row) = source_grid.fractional_pixel(x, y)?;
        match bilinear_sample(source, source_grid, src_col, src_row) {
            Some(sampled) => *value = sampled,
            None => unfilled += 1,
        }
    }
    Ok((values, unfilled))
}

#[cfg(feature = "parallel")]
fn resample_rows(
    source: &Band,
    source_grid: &GridSpec,
    target_grid: &GridSpec,
) -> FloodResult<Vec<(Vec<f32>, usize)>> {
    use rayon::prelude::*;

    (0..target_grid.height)
        .into_par_iter()
        .map(|row| resample_row(source, source_grid, target_grid, row))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn resample_rows(
    source: &Band,
    source_grid: &GridSpec,
    target_grid: &GridSpec,
) -> FloodResult<Vec<(Vec<f32>, usize)>> {
    (0..target_grid.height)
        .map(|row| resample_row(source, source_grid, target_grid, row))
        .collect()
}

/// Bilinear interpolation at continuous pixel position `(col, row)`
fn bilinear_sample(source: &Band, grid: &GridSpec, col: f64, row: f64) -> Option<f32> {
    let (height, width) = source.dim();
    if !(col >= 0.0 && row >= 0.0 && col < width as f64 && row < height as f64) {
        return None;
    }

    // pixel centres sit at half-integer positions
    let u = col - 0.5;
    let v = row - 0.5;
    let x0 = u.floor();
    let y0 = v.floor();
    let dx = u - x0;
    let dy = v - y0;

    let clamp_x = |x: f64| x.max(0.0).min((width - 1) as f64) as usize;
    let clamp_y = |y: f64| y.max(0.0).min((height - 1) as f64) as usize;
    let (x1, x2) = (clamp_x(x0), clamp_x(x0 + 1.0));
    let (y1, y2) = (clamp_y(y0), clamp_y(y0 + 1.0));

    let neighbours = [
        (source[[y1, x1]], (1.0 - dx) * (1.0 - dy)),
        (source[[y1, x2]], dx * (1.0 - dy)),
        (source[[y2, x1]], (1.0 - dx) * dy),
        (source[[y2, x2]], dx * dy),
    ];

    let mut weighted = 0.0f64;
    let mut weight_sum = 0.0f64;
    for (value, weight) in neighbours {
        if grid.is_nodata(value) || weight <= 0.0 {
            continue;
        }
        weighted += value as f64 * weight;
        weight_sum += weight;
    }

    if weight_sum > 0.0 {
        Some((weighted / weight_sum) as f32)
    } else {
        None
    }
}
