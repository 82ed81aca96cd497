use crate::types::{Band, BoundingBox, FloodError, FloodResult, GeoTransform};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Georeferencing of a raster: CRS, affine transform, size and no-data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// CRS identifier or WKT, compared verbatim
    pub crs: String,
    pub transform: GeoTransform,
    pub width: usize,
    pub height: usize,
    /// Declared no-data value shared by all bands
    pub nodata: Option<f64>,
}

impl GridSpec {
    pub fn new(crs: impl Into<String>, transform: GeoTransform, width: usize, height: usize) -> Self {
        Self {
            crs: crs.into(),
            transform,
            width,
            height,
            nodata: None,
        }
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    /// Array shape `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Geographic coordinate of the centre of pixel `(row, col)`
    pub fn forward_transform(&self, row: usize, col: usize) -> (f64, f64) {
        self.transform.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Continuous `(col, row)` pixel position of a geographic coordinate
    pub fn fractional_pixel(&self, x: f64, y: f64) -> FloodResult<(f64, f64)> {
        self.transform.invert(x, y)
    }

    /// Pixel index containing `(x, y)`, floored and clipped to the grid bounds
    pub fn inverse_transform(&self, x: f64, y: f64) -> FloodResult<(usize, usize)> {
        let (col, row) = self.fractional_pixel(x, y)?;
        Ok((
            clip_index(row.floor(), self.height),
            clip_index(col.floor(), self.width),
        ))
    }

    pub fn bounds(&self) -> BoundingBox {
        let corners = [
            self.transform.apply(0.0, 0.0),
            self.transform.apply(self.width as f64, 0.0),
            self.transform.apply(0.0, self.height as f64),
            self.transform.apply(self.width as f64, self.height as f64),
        ];

        let mut bbox = BoundingBox {
            min_x: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            min_y: f64::INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        for (x, y) in corners {
            bbox.min_x = bbox.min_x.min(x);
            bbox.max_x = bbox.max_x.max(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_y = bbox.max_y.max(y);
        }
        bbox
    }

    /// True when `value` is the declared no-data or not a finite number
    pub fn is_nodata(&self, value: f32) -> bool {
        if !value.is_finite() {
            return true;
        }
        matches!(self.nodata, Some(nodata) if value as f64 == nodata)
    }

    /// Fail unless both grids use the same CRS and cover overlapping extents
    pub fn ensure_compatible(&self, other: &GridSpec) -> FloodResult<()> {
        if self.crs.trim() != other.crs.trim() {
            return Err(FloodError::GridMismatch(format!(
                "CRS '{}' differs from '{}'; reprojection between reference systems is not supported",
                self.crs, other.crs
            )));
        }
        let (a, b) = (self.bounds(), other.bounds());
        if !a.intersects(&b) {
            return Err(FloodError::GridMismatch(format!(
                "Extents do not overlap: {:?} vs {:?}",
                a, b
            )));
        }
        Ok(())
    }
}

fn clip_index(value: f64, len: usize) -> usize {
    if value.is_nan() || value <= 0.0 {
        0
    } else {
        (value as usize).min(len.saturating_sub(1))
    }
}

/// Anything that exposes georeferenced bands for reading
///
/// Band indices are 1-based, as in GDAL.
pub trait RasterSource {
    fn grid(&self) -> &GridSpec;

    fn band_count(&self) -> usize;

    /// Band description, if the dataset carries one
    fn band_description(&self, index: usize) -> Option<String>;

    fn read_band(&self, index: usize) -> FloodResult<Band>;

    /// Fail with [`FloodError::BandIndex`] unless `index` addresses a band
    fn check_band_index(&self, index: usize) -> FloodResult<()> {
        let count = self.band_count();
        if index == 0 || index > count {
            return Err(FloodError::BandIndex { index, count });
        }
        Ok(())
    }
}

/// Multi-band raster held in memory
#[derive(Debug, Clone)]
pub struct RasterStack {
    grid: GridSpec,
    bands: Vec<Band>,
    descriptions: Vec<Option<String>>,
}

impl RasterStack {
    pub fn new(grid: GridSpec, bands: Vec<Band>) -> FloodResult<Self> {
        for (i, band) in bands.iter().enumerate() {
            if band.dim() != grid.shape() {
                return Err(FloodError::InvalidFormat(format!(
                    "Band {} has shape {:?}, grid expects {:?}",
                    i + 1,
                    band.dim(),
                    grid.shape()
                )));
            }
        }
        let descriptions = vec![None; bands.len()];
        Ok(Self {
            grid,
            bands,
            descriptions,
        })
    }

    /// Build a stack from bands of any primitive numeric type
    pub fn from_values<T: ToPrimitive + Copy>(
        grid: GridSpec,
        bands: Vec<ndarray::Array2<T>>,
    ) -> FloodResult<Self> {
        let converted = bands
            .into_iter()
            .map(|band| band.mapv(|v| v.to_f32().unwrap_or(f32::NAN)))
            .collect();
        Self::new(grid, converted)
    }

    pub fn with_descriptions(mut self, descriptions: Vec<Option<String>>) -> FloodResult<Self> {
        if descriptions.len() != self.bands.len() {
            return Err(FloodError::InvalidFormat(format!(
                "{} descriptions supplied for {} bands",
                descriptions.len(),
                self.bands.len()
            )));
        }
        self.descriptions = descriptions;
        Ok(self)
    }

    /// Borrow a band without copying
    pub fn band(&self, index: usize) -> FloodResult<&Band> {
        self.check_band_index(index)?;
        Ok(&self.bands[index - 1])
    }

    /// Read every band of `source` into memory
    pub fn load(source: &dyn RasterSource) -> FloodResult<Self> {
        let count = source.band_count();
        let mut bands = Vec::with_capacity(count);
        let mut descriptions = Vec::with_capacity(count);
        for index in 1..=count {
            bands.push(source.read_band(index)?);
            descriptions.push(source.band_description(index));
        }
        Self::new(source.grid().clone(), bands)?.with_descriptions(descriptions)
    }
}

impl RasterSource for RasterStack {
    fn grid(&self) -> &GridSpec {
        &self.grid
    }

    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn band_description(&self, index: usize) -> Option<String> {
        self.descriptions.get(index.checked_sub(1)?).cloned().flatten()
    }

    fn read_band(&self, index: usize) -> FloodResult<Band> {
        self.band(index).cloned()
    }
}
