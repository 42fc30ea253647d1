//! Tabular I/O for sample records and metrics records (spec §6), via the
//! `csv` crate rather than manual string splitting.

use std::io::{Read, Write};

use crate::error::{CsvLoadError, CsvWriteError};
use crate::types::{LayerMetrics, Phase, Sample, SampleRecord};

/// Reads a sample record from CSV. Required columns (case-insensitive,
/// matched by substring so "Elapsed Time (s)", "Time (s)", "time_s" all
/// resolve): a time column, a position column, a force column. An optional
/// `Phase` column is read if present.
///
/// Rows with a missing or non-numeric cell in a required column are
/// rejected and counted rather than aborting the whole read. Returns the
/// record plus the number of rejected rows.
pub fn read_sample_record<R: Read>(reader: R, nominal_hz: f64) -> Result<(SampleRecord, usize), CsvLoadError> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let time_col = find_column(&headers, &["time"]).ok_or(CsvLoadError::MissingColumn("Elapsed Time (s)"))?;
    let position_col = find_column(&headers, &["position"]).ok_or(CsvLoadError::MissingColumn("Position (mm)"))?;
    let force_col = find_column(&headers, &["force"]).ok_or(CsvLoadError::MissingColumn("Force (N)"))?;
    let phase_col = find_column(&headers, &["phase"]);

    let mut samples = Vec::new();
    let mut rejected = 0usize;

    for result in rdr.records() {
        let record = result?;
        let parsed = (
            record.get(time_col).and_then(|v| v.trim().parse::<f64>().ok()),
            record.get(position_col).and_then(|v| v.trim().parse::<f64>().ok()),
            record.get(force_col).and_then(|v| v.trim().parse::<f64>().ok()),
        );
        match parsed {
            (Some(time_s), Some(position_mm), Some(force_n)) => {
                samples.push(Sample::new(time_s, position_mm, force_n));
                let _ = phase_col.and_then(|c| record.get(c)).and_then(|v| v.parse::<Phase>().ok());
            }
            _ => rejected += 1,
        }
    }

    if samples.is_empty() {
        return Err(CsvLoadError::Empty);
    }

    Ok((SampleRecord::new(samples, nominal_hz), rejected))
}

fn find_column(headers: &csv::StringRecord, needles: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let normalized = h.to_ascii_lowercase();
        needles.iter().any(|n| normalized.contains(n))
    })
}

/// Writes a metrics table to CSV with the exact 15-column schema and order
/// from spec §6. Missing/non-applicable values are empty cells, not `NaN`
/// literals.
pub fn write_metrics<W: Write>(writer: W, rows: &[LayerMetrics]) -> Result<(), CsvWriteError> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record([
        "Layer_Number",
        "Step_Speed_um_s",
        "Peak_Force_N",
        "Work_of_Adhesion_mJ",
        "Time_to_Peak_s",
        "Distance_to_Peak_mm",
        "Propagation_Time_s",
        "Propagation_Distance_mm",
        "Total_Peel_Time_s",
        "Total_Peel_Distance_mm",
        "Peak_Retraction_Force_N",
        "Effective_Stiffness_N_per_mm",
        "Stiffness_R2",
        "SNR",
        "Data_Quality_OK",
    ])?;

    for m in rows {
        wtr.write_record(&[
            m.layer_number.to_string(),
            cell(m.step_speed_um_per_s),
            cell(Some(m.peak_force_n)),
            cell(Some(m.work_of_adhesion_mj)),
            cell(Some(m.pre_init_duration_s)),
            cell(Some(m.distance_to_peak_mm)),
            cell(Some(m.propagation_duration_s)),
            cell(Some(m.propagation_distance_mm)),
            cell(Some(m.total_peel_duration_s)),
            cell(Some(m.total_peel_distance_mm)),
            cell(Some(m.peak_retraction_force_n)),
            cell(Some(m.effective_stiffness_n_per_mm)),
            cell(Some(m.stiffness_r2)),
            cell(Some(m.signal_to_noise_ratio)),
            m.data_quality_ok.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Renders an optional numeric field as an empty cell if absent or `NaN`.
fn cell(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => v.to_string(),
        _ => String::new(),
    }
}
