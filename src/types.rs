use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Single-band raster values (row x col)
pub type Band = Array2<f32>;

/// Boolean pixel mask (row x col), `true` = usable pixel
pub type PixelMask = Array2<bool>;

/// No-data sentinel of the probability risk raster
pub const PROBABILITY_NODATA: f32 = -1.0;

/// No-data sentinel of the classified risk raster
pub const CLASS_NODATA: u8 = 0;

/// Affine pixel-to-geographic transform in GDAL coefficient order
///
/// `x = top_left_x + col * pixel_width + row * rotation_x`
/// `y = top_left_y + col * rotation_y + row * pixel_height`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform without rotation terms
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            top_left_x,
            pixel_width,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height,
        }
    }

    pub fn from_gdal(coefficients: [f64; 6]) -> Self {
        Self {
            top_left_x: coefficients[0],
            pixel_width: coefficients[1],
            rotation_x: coefficients[2],
            top_left_y: coefficients[3],
            rotation_y: coefficients[4],
            pixel_height: coefficients[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Apply the affine map to continuous pixel coordinates
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.top_left_x + col * self.pixel_width + row * self.rotation_x;
        let y = self.top_left_y + col * self.rotation_y + row * self.pixel_height;
        (x, y)
    }

    /// Exact algebraic inverse of [`GeoTransform::apply`], returns `(col, row)`
    pub fn invert(&self, x: f64, y: f64) -> FloodResult<(f64, f64)> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(FloodError::GridMismatch(format!(
                "Geotransform {:?} is not invertible",
                self
            )));
        }

        let dx = x - self.top_left_x;
        let dy = y - self.top_left_y;
        let col = (self.pixel_height * dx - self.rotation_x * dy) / det;
        let row = (self.pixel_width * dy - self.rotation_y * dx) / det;
        Ok((col, row))
    }

    pub fn determinant(&self) -> f64 {
        self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y
    }

    /// Ground area covered by one pixel, in squared CRS units
    pub fn pixel_area(&self) -> f64 {
        self.determinant().abs()
    }
}

/// Geographic extent in CRS units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }
}

/// Error types for flood risk processing
#[derive(Debug, thiserror::Error)]
pub enum FloodError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Band index {index} out of range (dataset has {count} bands)")]
    BandIndex { index: usize, count: usize },

    #[error("Grid mismatch: {0}")]
    GridMismatch(String),

    #[error("Feature order mismatch: model expects {expected:?}, engine assembles {found:?}")]
    FeatureOrder {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Training error: {0}")]
    Training(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

/// Result type for flood risk operations
pub type FloodResult<T> = Result<T, FloodError>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transform_inverse_with_rotation() {
        let transform = GeoTransform {
            top_left_x: 500_000.0,
            pixel_width: 30.0,
            rotation_x: 2.0,
            top_left_y: 2_000_000.0,
            rotation_y: -1.5,
            pixel_height: -30.0,
        };

        let (x, y) = transform.apply(12.25, 7.5);
        let (col, row) = transform.invert(x, y).unwrap();
        assert_relative_eq!(col, 12.25, epsilon = 1e-9);
        assert_relative_eq!(row, 7.5, epsilon = 1e-9);
    }

    #[test]
    fn test_singular_transform_is_rejected() {
        let transform = GeoTransform::north_up(0.0, 0.0, 0.0, -30.0);
        assert!(matches!(
            transform.invert(1.0, 1.0),
            Err(FloodError::GridMismatch(_))
        ));
    }

    #[test]
    fn test_pixel_area() {
        let transform = GeoTransform::north_up(0.0, 0.0, 30.0, -30.0);
        assert_relative_eq!(transform.pixel_area(), 900.0);
    }
}
