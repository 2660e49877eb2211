//! CSV import of per-step input series.
//!
//! Site files carry `pv_kw`, `load_kw` and optionally `clipped_kw` columns.
//! Single-series files (custom battery power, target grid power) use their
//! first column.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

use crate::sim::types::SiteSeries;

/// Errors raised while importing a profile.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("cannot read profile: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing column \"{0}\"")]
    MissingColumn(&'static str),
    #[error("row {row}: cannot parse \"{value}\" as a number")]
    Parse { row: usize, value: String },
    #[error("profile has no rows")]
    Empty,
}

fn column(headers: &csv::StringRecord, name: &'static str) -> Option<usize> {
    headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name))
}

fn parse(value: &str, row: usize) -> Result<f64, ProfileError> {
    value.trim().parse().map_err(|_| ProfileError::Parse {
        row,
        value: value.to_string(),
    })
}

/// Reads PV, clipped PV and load series from CSV.
///
/// # Errors
///
/// Returns [`ProfileError::MissingColumn`] if `pv_kw` or `load_kw` is absent,
/// and [`ProfileError::Empty`] for a file with no data rows.
pub fn read_site(reader: impl Read) -> Result<SiteSeries, ProfileError> {
    let mut rdr = csv::ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();
    let pv_col = column(&headers, "pv_kw").ok_or(ProfileError::MissingColumn("pv_kw"))?;
    let load_col = column(&headers, "load_kw").ok_or(ProfileError::MissingColumn("load_kw"))?;
    let clipped_col = column(&headers, "clipped_kw");

    let mut site = SiteSeries::default();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let row = i + 1;
        site.pv_kw.push(parse(&record[pv_col], row)?);
        site.load_kw.push(parse(&record[load_col], row)?);
        let clipped = match clipped_col {
            Some(c) => parse(&record[c], row)?,
            None => 0.0,
        };
        site.clipped_kw.push(clipped);
    }

    if site.pv_kw.is_empty() {
        return Err(ProfileError::Empty);
    }
    Ok(site)
}

/// Reads one numeric series from the first column of a CSV with a header.
///
/// # Errors
///
/// Returns [`ProfileError::Empty`] for a file with no data rows.
pub fn read_series(reader: impl Read) -> Result<Vec<f64>, ProfileError> {
    let mut rdr = csv::ReaderBuilder::new().from_reader(reader);
    let mut out = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let value = record.get(0).unwrap_or("");
        out.push(parse(value, i + 1)?);
    }
    if out.is_empty() {
        return Err(ProfileError::Empty);
    }
    Ok(out)
}

/// Reads a site file from disk.
///
/// # Errors
///
/// See [`read_site`].
pub fn load_site(path: &Path) -> Result<SiteSeries, ProfileError> {
    read_site(File::open(path)?)
}

/// Reads a single-series file from disk.
///
/// # Errors
///
/// See [`read_series`].
pub fn load_series(path: &Path) -> Result<Vec<f64>, ProfileError> {
    read_series(File::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_site_columns_in_any_order() {
        let data = "load_kw,pv_kw,clipped_kw\n1.0,0.0,0.0\n2.0,3.5,0.5\n";
        let site = read_site(data.as_bytes()).unwrap();
        assert_eq!(site.load_kw, vec![1.0, 2.0]);
        assert_eq!(site.pv_kw, vec![0.0, 3.5]);
        assert_eq!(site.clipped_kw, vec![0.0, 0.5]);
    }

    #[test]
    fn clipped_column_is_optional() {
        let data = "pv_kw,load_kw\n1.0,2.0\n";
        let site = read_site(data.as_bytes()).unwrap();
        assert_eq!(site.clipped_kw, vec![0.0]);
    }

    #[test]
    fn missing_load_column() {
        let data = "pv_kw\n1.0\n";
        let err = read_site(data.as_bytes()).unwrap_err();
        assert!(matches!(err, ProfileError::MissingColumn("load_kw")));
    }

    #[test]
    fn bad_number_reports_row() {
        let data = "battery_kw\n1.0\nabc\n";
        let err = read_series(data.as_bytes()).unwrap_err();
        assert!(matches!(err, ProfileError::Parse { row: 2, .. }));
    }

    #[test]
    fn empty_series() {
        let err = read_series("target_kw\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ProfileError::Empty));
    }
}
