//! Raster and tabular I/O

pub mod raster;
pub mod table;
#[cfg(feature = "gdal")]
pub mod geotiff;

pub use raster::{GridSpec, RasterSource, RasterStack};
pub use table::{
    load_training_table, read_training_table, save_scenario_summary, save_training_table,
    write_scenario_summary, write_training_table,
};
#[cfg(feature = "gdal")]
pub use geotiff::{write_class_raster, write_probability_raster, GeoTiffRaster};
