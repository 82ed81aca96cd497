use crate::io::raster::{GridSpec, RasterSource};
use crate::types::{Band, FloodError, FloodResult, GeoTransform, CLASS_NODATA, PROBABILITY_NODATA};
use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// GDAL-backed raster file
///
/// Only the path and georeferencing are kept. Every band read opens the
/// dataset again and closes it before returning.
pub struct GeoTiffRaster {
    path: PathBuf,
    grid: GridSpec,
    band_count: usize,
}

fn open_dataset(path: &Path) -> FloodResult<Dataset> {
    if !path.exists() {
        return Err(FloodError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Raster not found: {}", path.display()),
        )));
    }
    Dataset::open(path)
        .map_err(|e| FloodError::InvalidFormat(format!("Cannot open {}: {}", path.display(), e)))
}

impl GeoTiffRaster {
    /// Open a raster dataset and read its georeferencing
    pub fn open<P: AsRef<Path>>(path: P) -> FloodResult<Self> {
        let path = path.as_ref();
        log::info!("Opening raster: {}", path.display());

        let dataset = open_dataset(path)?;

        let geo_transform = dataset.geo_transform()?;
        let (width, height) = dataset.raster_size();
        let band_count = dataset.raster_count().max(0) as usize;
        if band_count == 0 {
            return Err(FloodError::InvalidFormat(format!(
                "{} contains no raster bands",
                path.display()
            )));
        }

        let nodata = dataset.rasterband(1)?.no_data_value();
        let grid = GridSpec {
            crs: dataset.projection(),
            transform: GeoTransform::from_gdal(geo_transform),
            width,
            height,
            nodata,
        };

        log::debug!("Raster size: {}x{}, {} bands", width, height, band_count);
        log::debug!("Geotransform: {:?}", grid.transform);

        Ok(Self {
            path: path.to_path_buf(),
            grid,
            band_count,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RasterSource for GeoTiffRaster {
    fn grid(&self) -> &GridSpec {
        &self.grid
    }

    fn band_count(&self) -> usize {
        self.band_count
    }

    fn band_description(&self, index: usize) -> Option<String> {
        self.check_band_index(index).ok()?;
        let dataset = open_dataset(&self.path).ok()?;
        let band = dataset.rasterband(index as isize).ok()?;
        band.description().ok().filter(|d| !d.trim().is_empty())
    }

    fn read_band(&self, index: usize) -> FloodResult<Band> {
        self.check_band_index(index)?;
        let (width, height) = (self.grid.width, self.grid.height);

        let dataset = open_dataset(&self.path)?;
        let rasterband = dataset.rasterband(index as isize)?;
        if rasterband.size() != (width, height) {
            return Err(FloodError::GridMismatch(format!(
                "Band {} of {} is {:?}, expected {:?}",
                index,
                self.path.display(),
                rasterband.size(),
                (width, height)
            )));
        }
        let band_data = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;

        Array2::from_shape_vec((height, width), band_data.data).map_err(|e| {
            FloodError::InvalidFormat(format!(
                "Failed to reshape band {} of {}: {}",
                index,
                self.path.display(),
                e
            ))
        })
    }
}

/// Write a probability raster (Float32, no-data -1)
pub fn write_probability_raster<P: AsRef<Path>>(
    probability: &Array2<f32>,
    grid: &GridSpec,
    output_path: P,
) -> FloodResult<()> {
    log::info!("Saving probability raster: {}", output_path.as_ref().display());
    check_shape(probability.dim(), grid)?;

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let (height, width) = probability.dim();
    let mut dataset = driver.create_with_band_type::<f32, _>(
        output_path.as_ref(),
        width as isize,
        height as isize,
        1,
    )?;
    dataset.set_geo_transform(&grid.transform.to_gdal())?;
    if !grid.crs.is_empty() {
        dataset.set_projection(&grid.crs)?;
    }

    let mut rasterband = dataset.rasterband(1)?;
    let buffer = Buffer::new((width, height), probability.iter().copied().collect());
    rasterband.write((0, 0), (width, height), &buffer)?;
    rasterband.set_no_data_value(Some(PROBABILITY_NODATA as f64))?;
    Ok(())
}

/// Write a classified risk raster (Byte, no-data 0)
pub fn write_class_raster<P: AsRef<Path>>(
    classes: &Array2<u8>,
    grid: &GridSpec,
    output_path: P,
) -> FloodResult<()> {
    log::info!("Saving classified raster: {}", output_path.as_ref().display());
    check_shape(classes.dim(), grid)?;

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let (height, width) = classes.dim();
    let mut dataset = driver.create_with_band_type::<u8, _>(
        output_path.as_ref(),
        width as isize,
        height as isize,
        1,
    )?;
    dataset.set_geo_transform(&grid.transform.to_gdal())?;
    if !grid.crs.is_empty() {
        dataset.set_projection(&grid.crs)?;
    }

    let mut rasterband = dataset.rasterband(1)?;
    let buffer = Buffer::new((width, height), classes.iter().copied().collect());
    rasterband.write((0, 0), (width, height), &buffer)?;
    rasterband.set_no_data_value(Some(CLASS_NODATA as f64))?;
    Ok(())
}

fn check_shape(shape: (usize, usize), grid: &GridSpec) -> FloodResult<()> {
    if shape != grid.shape() {
        return Err(FloodError::GridMismatch(format!(
            "Raster shape {:?} does not match grid {:?}",
            shape,
            grid.shape()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_grid() -> GridSpec {
        GridSpec::new(
            "",
            GeoTransform::north_up(105.0, 18.5, 0.001, -0.001),
            3,
            2,
        )
    }

    #[test]
    fn test_open_missing_file() {
        let result = GeoTiffRaster::open("/nonexistent/static_stack.tif");
        assert!(matches!(result, Err(FloodError::Io(_))));
    }

    #[test]
    fn test_probability_raster_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("probability.tif");
        let grid = test_grid();
        let probability =
            Array2::from_shape_vec((2, 3), vec![0.1, 0.5, -1.0, 0.9, 0.0, 1.0]).unwrap();

        write_probability_raster(&probability, &grid, &path).unwrap();

        let raster = GeoTiffRaster::open(&path).unwrap();
        assert_eq!(raster.band_count(), 1);
        assert_eq!(raster.grid().nodata, Some(-1.0));
        assert_eq!(raster.grid().transform, grid.transform);
        assert_eq!(raster.read_band(1).unwrap(), probability);
        assert!(matches!(
            raster.read_band(2),
            Err(FloodError::BandIndex { index: 2, count: 1 })
        ));
    }

    #[test]
    fn test_file_is_not_held_between_reads() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("probability.tif");
        let grid = test_grid();
        let first = Array2::from_shape_vec((2, 3), vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]).unwrap();
        write_probability_raster(&first, &grid, &path).unwrap();

        let raster = GeoTiffRaster::open(&path).unwrap();
        assert_eq!(raster.read_band(1).unwrap(), first);

        // replaced in place: the next read sees the new contents
        let second = first.mapv(|p| 1.0 - p);
        write_probability_raster(&second, &grid, &path).unwrap();
        assert_eq!(raster.read_band(1).unwrap(), second);

        // renamed away: reads fail, renamed back: reads work again
        let moved = temp_dir.path().join("moved.tif");
        std::fs::rename(&path, &moved).unwrap();
        assert!(matches!(raster.read_band(1), Err(FloodError::Io(_))));
        assert!(raster.band_description(1).is_none());
        std::fs::rename(&moved, &path).unwrap();
        assert_eq!(raster.read_band(1).unwrap(), second);

        std::fs::remove_file(&path).unwrap();
        assert!(!path.exists());
        assert!(matches!(raster.read_band(1), Err(FloodError::Io(_))));
        assert_eq!(raster.grid().shape(), (2, 3));
    }

    #[test]
    fn test_class_raster_shape_check() {
        let temp_dir = TempDir::new().unwrap();
        let classes = Array2::<u8>::zeros((3, 3));
        let result = write_class_raster(&classes, &test_grid(), temp_dir.path().join("c.tif"));
        assert!(matches!(result, Err(FloodError::GridMismatch(_))));
    }
}
