//! Synthetic raster stacks shared by the integration tests.
//!
//! A 20x20 static grid (30 m) sits under a 4x4 rain grid (150 m). Event `e`
//! floods the columns left of `4 + 3e`; rain grows with the event index, so
//! bigger events are wetter and flood further inland.

#![allow(dead_code)]

use floodrisk::core::features::{RainVariable, StaticBand};
use floodrisk::{GeoTransform, GridSpec, RasterStack};
use ndarray::Array2;

pub const SIZE: usize = 20;
pub const EVENTS: usize = 3;
pub const STATIC_NODATA: f64 = -9999.0;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn static_grid(crs: &str) -> GridSpec {
    GridSpec::new(crs, GeoTransform::north_up(500_000.0, 2_000_600.0, 30.0, -30.0), SIZE, SIZE)
        .with_nodata(STATIC_NODATA)
}

pub fn rain_grid(crs: &str) -> GridSpec {
    GridSpec::new(crs, GeoTransform::north_up(500_000.0, 2_000_600.0, 150.0, -150.0), 4, 4)
}

pub fn static_stack(crs: &str) -> RasterStack {
    let bands = StaticBand::ALL
        .iter()
        .map(|band| {
            Array2::from_shape_fn((SIZE, SIZE), |(row, col)| {
                let (r, c) = (row as f32, col as f32);
                match band {
                    StaticBand::Elevation if row == SIZE - 1 && col == SIZE - 1 => STATIC_NODATA as f32,
                    StaticBand::Elevation => 2.0 + c * 1.5,
                    StaticBand::Slope => (row % 7) as f32,
                    StaticBand::Aspect => ((row * 37 + col * 11) % 360) as f32,
                    StaticBand::Curvature => ((row + col) % 3) as f32 - 1.0,
                    StaticBand::Relief => c * 2.0,
                    StaticBand::Twi => 12.0 - c * 0.4,
                    StaticBand::FlowAccumulation => r * 10.0,
                    StaticBand::DistanceToWater => c * 100.0,
                    StaticBand::WaterMask => 0.0,
                    StaticBand::LandCover => (row / 5) as f32,
                    StaticBand::PrecipitationClimatology => 2400.0 + r,
                }
            })
        })
        .collect();
    RasterStack::new(static_grid(crs), bands).expect("static stack")
}

pub fn label_stack(crs: &str) -> RasterStack {
    let bands: Vec<Array2<u8>> = (0..EVENTS)
        .map(|event| {
            Array2::from_shape_fn((SIZE, SIZE), |(row, col)| {
                if row == 0 && col == SIZE - 1 {
                    255 // unlabelled
                } else if col < 4 + 3 * event {
                    1
                } else {
                    0
                }
            })
        })
        .collect();
    RasterStack::from_values(static_grid(crs), bands).expect("label stack")
}

pub fn rain_value(event: usize, variable: RainVariable, row: usize) -> f32 {
    let base = match variable {
        RainVariable::Rain3Day => 30.0,
        RainVariable::Rain7Day => 50.0,
        RainVariable::RainMax => 20.0,
        RainVariable::AntecedentMoisture14 => 80.0,
    };
    base * (1.0 + event as f32) + row as f32
}

pub fn rain_stack(crs: &str) -> RasterStack {
    let mut bands = Vec::new();
    for event in 0..EVENTS {
        for variable in RainVariable::ALL {
            bands.push(Array2::from_shape_fn((4, 4), |(row, _)| rain_value(event, variable, row)));
        }
    }
    RasterStack::new(rain_grid(crs), bands).expect("rain stack")
}
