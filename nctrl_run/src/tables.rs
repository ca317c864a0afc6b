//! CSV inputs and output tables.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::Path;

use nalgebra::DMatrix;
use nctrl::batch::BatchReport;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RunError, RunResult};
use crate::paths::OutputPaths;

/// States grouped by subject, then by state label. Values are in region order.
pub type StatesBySubject = BTreeMap<String, BTreeMap<String, Vec<f64>>>;

#[derive(Debug, Deserialize)]
struct StateRow {
    subject: String,
    state: String,
    value: f64,
}

/// Long-format states table with header `subject,state,value`. Rows of one
/// (subject, state) appear in region order.
pub fn read_states<R: Read>(reader: R, path: &Path) -> RunResult<StatesBySubject> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut states = StatesBySubject::new();
    for row in rdr.deserialize::<StateRow>() {
        let row = row.map_err(|e| RunError::csv(path, e))?;
        states
            .entry(row.subject)
            .or_default()
            .entry(row.state)
            .or_default()
            .push(row.value);
    }
    Ok(states)
}

/// Header-less connectivity matrix. Shape problems other than ragged rows
/// are left to the normalizer, which rejects them per subject.
pub fn read_connectivity<R: Read>(reader: R, path: &Path) -> RunResult<DMatrix<f64>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut values = Vec::new();
    let mut rows = 0;
    let mut cols = None;
    for record in rdr.records() {
        let record = record.map_err(|e| RunError::csv(path, e))?;
        match cols {
            None => cols = Some(record.len()),
            Some(n) if n != record.len() => {
                return Err(RunError::input(
                    path,
                    format!("row {} has {} columns, expected {n}", rows + 1, record.len()),
                ))
            }
            Some(_) => {}
        }
        for (col, field) in record.iter().enumerate() {
            let v: f64 = field.parse().map_err(|_| {
                RunError::input(
                    path,
                    format!("row {} column {}: not a number: {field:?}", rows + 1, col + 1),
                )
            })?;
            values.push(v);
        }
        rows += 1;
    }

    Ok(DMatrix::from_row_slice(rows, cols.unwrap_or(0), &values))
}

pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> RunResult<()> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| RunError::csv(path, e))?;
    for row in rows {
        wtr.serialize(row).map_err(|e| RunError::csv(path, e))?;
    }
    wtr.flush().map_err(|e| RunError::io(path, e))
}

/// Write every table and one archive per subject.
pub fn write_report(paths: &OutputPaths, report: &BatchReport) -> RunResult<()> {
    write_rows(&paths.baseline_energy(), &report.baseline_rows())?;
    write_rows(&paths.perturbed_energy(), &report.perturbed_rows())?;
    write_rows(&paths.rerc(), &report.rerc_rows())?;
    write_rows(&paths.subject_rerc(), &report.subject_rerc_rows())?;
    write_rows(&paths.group_rerc(), &report.group_rows())?;
    write_rows(&paths.subject_summary(), &report.summary_rows())?;
    write_rows(&paths.failures(), &report.failures())?;

    for subject in &report.subjects {
        let path = paths.archive(&subject.subject);
        let file = File::create(&path).map_err(|e| RunError::io(&path, e))?;
        let mut w = BufWriter::new(file);
        subject
            .save_archive_to(&mut w)
            .map_err(|e| RunError::io(&path, e))?;
        std::io::Write::flush(&mut w).map_err(|e| RunError::io(&path, e))?;
    }
    info!(out = %paths.out_dir().display(), "results written");
    Ok(())
}
