//! CSV persistence of the training table and scenario summaries.
//!
//! Missing values are written as empty cells and read back as NaN.

use crate::core::features::{RainVariable, StaticBand};
use crate::core::sampling::{table_columns, TrainingSample};
use crate::core::scenario::ScenarioSummary;
use crate::types::{FloodError, FloodResult};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

const FIXED_COLUMNS: usize = 6;

/// Write samples as CSV with a header row
pub fn write_training_table<W: Write>(writer: W, samples: &[TrainingSample]) -> FloodResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(table_columns())?;

    for sample in samples {
        let mut record = Vec::with_capacity(FIXED_COLUMNS + StaticBand::COUNT + RainVariable::PER_EVENT);
        record.push(sample.event_id.to_string());
        record.push(sample.event_name.clone());
        record.push(format_value(sample.x));
        record.push(format_value(sample.y));
        record.push(sample.label.to_string());
        record.push(u8::from(sample.hard_negative).to_string());
        record.extend(sample.static_values.iter().map(|v| format_value(*v as f64)));
        record.extend(sample.rain_values.iter().map(|v| format_value(*v as f64)));
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    Ok(())
}

pub fn save_training_table<P: AsRef<Path>>(path: P, samples: &[TrainingSample]) -> FloodResult<()> {
    log::info!(
        "Writing {} training samples to {}",
        samples.len(),
        path.as_ref().display()
    );
    let file = File::create(path.as_ref())?;
    write_training_table(file, samples)
}

/// Parse a training table written by [`write_training_table`]
pub fn read_training_table<R: Read>(reader: R) -> FloodResult<Vec<TrainingSample>> {
    let mut csv_reader = csv::Reader::from_reader(reader);

    let header = csv_reader.headers()?.clone();
    let expected = table_columns();
    if header.iter().ne(expected.iter().copied()) {
        return Err(FloodError::InvalidFormat(format!(
            "Unexpected training table header {:?}, expected {:?}",
            header.iter().collect::<Vec<_>>(),
            expected
        )));
    }

    let mut samples = Vec::new();
    for (line, record) in csv_reader.records().enumerate() {
        let record = record?;
        let row = line + 2;

        let label_value = parse_value(&record[4], row, "Label")?;
        let label = match label_value {
            v if v == 0.0 => 0,
            v if v == 1.0 => 1,
            other => {
                return Err(FloodError::Training(format!(
                    "Label column is not binary: value {} on row {}",
                    other, row
                )))
            }
        };

        let mut static_values = [f32::NAN; StaticBand::COUNT];
        for (i, slot) in static_values.iter_mut().enumerate() {
            let column = FIXED_COLUMNS + i;
            *slot = parse_value(&record[column], row, expected[column])? as f32;
        }
        let mut rain_values = [f32::NAN; RainVariable::PER_EVENT];
        for (i, slot) in rain_values.iter_mut().enumerate() {
            let column = FIXED_COLUMNS + StaticBand::COUNT + i;
            *slot = parse_value(&record[column], row, expected[column])? as f32;
        }

        samples.push(TrainingSample {
            event_id: record[0].trim().parse().map_err(|_| {
                FloodError::InvalidFormat(format!("Invalid Event_ID '{}' on row {}", &record[0], row))
            })?,
            event_name: record[1].to_string(),
            x: parse_value(&record[2], row, "X")?,
            y: parse_value(&record[3], row, "Y")?,
            label,
            hard_negative: parse_value(&record[5], row, "Is_Hard_Neg")? != 0.0,
            static_values,
            rain_values,
        });
    }

    Ok(samples)
}

pub fn load_training_table<P: AsRef<Path>>(path: P) -> FloodResult<Vec<TrainingSample>> {
    log::info!("Reading training table: {}", path.as_ref().display());
    let file = File::open(path.as_ref())?;
    let samples = read_training_table(file)?;
    log::info!("Loaded {} samples", samples.len());
    Ok(samples)
}

/// Write one CSV row per scenario summary, header from the field names
pub fn write_scenario_summary<W: Write>(writer: W, summaries: &[ScenarioSummary]) -> FloodResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for summary in summaries {
        csv_writer.serialize(summary)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn save_scenario_summary<P: AsRef<Path>>(path: P, summaries: &[ScenarioSummary]) -> FloodResult<()> {
    log::info!("Writing scenario summary to {}", path.as_ref().display());
    write_scenario_summary(File::create(path.as_ref())?, summaries)
}

fn format_value(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::new()
    }
}

fn parse_value(cell: &str, row: usize, column: &str) -> FloodResult<f64> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    cell.parse::<f64>().map_err(|_| {
        FloodError::InvalidFormat(format!(
            "Invalid value '{}' in column {} on row {}",
            cell, column, row
        ))
    })
}
