// SPDX-License-Identifier: AGPL-3.0-or-later
//! Comma-separated assay tables.
//!
//! Two layouts are read:
//!
//! - **Dose-response**: header row, first column the dose, remaining
//!   columns replicate responses. Blank or non-numeric replicate cells
//!   are skipped.
//!   ```text
//!   PQS,rep1,rep2,rep3
//!   0,100.2,98.7,101.5
//!   6.25,91.0,,93.4
//!   ```
//! - **Strain row**: one header row of strain names, one data row of
//!   measurements. The first column is a row label and is ignored.
//!   Replicate columns carry spreadsheet-style duplicate suffixes
//!   (`WT`, `WT.1`, `WT.2`) that are stripped to recover the strain.
//!   ```text
//!   sample,WT,WT.1,WT.2,dPQS,dPQS.1,dPQS.2
//!   PQS,12.1,11.8,12.6,3.2,2.9,3.4
//!   ```
//!
//! Both readers go through a [`csv::Reader`] with quoting, trimmed cells
//! and ragged rows allowed, so quoted names may contain commas.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::bio::dose_response;
use crate::error::{Error, Result};
use crate::stats::{groups_from_long, Group};

/// Dose column plus replicate responses per dose.
#[derive(Debug, Clone, PartialEq)]
pub struct DoseResponseTable {
    /// Header of the dose column.
    pub dose_label: String,
    /// Doses, one per row.
    pub doses: Vec<f64>,
    /// Parsed replicate responses, one vector per row.
    pub replicates: Vec<Vec<f64>>,
}

impl DoseResponseTable {
    /// Median response per dose.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a row has no numeric replicate.
    pub fn medians(&self) -> Result<Vec<f64>> {
        dose_response::replicate_medians(&self.replicates)
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn csv_reader<R: Read>(source: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(source)
}

/// I/O failures keep their kind; everything else is a parse error
/// located by line.
fn csv_error(origin: &Path, e: csv::Error) -> Error {
    let msg = match e.position() {
        Some(pos) => format!("{}:{}: {e}", origin.display(), pos.line()),
        None => format!("{}: {e}", origin.display()),
    };
    match e.into_kind() {
        csv::ErrorKind::Io(source) => Error::Io {
            path: origin.to_path_buf(),
            source,
        },
        _ => Error::Parse(msg),
    }
}

fn line_of(record: &csv::StringRecord) -> u64 {
    record.position().map_or(0, csv::Position::line)
}

fn number(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Read a dose-response table from disk.
///
/// # Errors
///
/// [`Error::Io`] if the file cannot be read, [`Error::Parse`] per
/// [`read_dose_response`].
pub fn parse_dose_response_csv(path: &Path) -> Result<DoseResponseTable> {
    read_dose_response(open(path)?, path)
}

/// Read a dose-response table from any reader; `origin` names it in
/// errors.
///
/// # Errors
///
/// Returns [`Error::Parse`] for malformed CSV, a missing header, a header
/// without replicate columns, no data rows, or a non-numeric dose.
pub fn read_dose_response<R: Read>(source: R, origin: &Path) -> Result<DoseResponseTable> {
    let mut rdr = csv_reader(source);
    let header = rdr.headers().map_err(|e| csv_error(origin, e))?.clone();
    if header.is_empty() {
        return Err(Error::Parse(format!("{}: empty table", origin.display())));
    }
    if header.len() < 2 {
        return Err(Error::Parse(format!(
            "{}: header needs a dose column and at least one replicate column",
            origin.display()
        )));
    }

    let mut doses = Vec::new();
    let mut replicates = Vec::new();
    for record in rdr.records() {
        let row = record.map_err(|e| csv_error(origin, e))?;
        let cell = row.get(0).unwrap_or_default();
        let dose: f64 = cell.parse().map_err(|_| {
            Error::Parse(format!(
                "{}:{}: dose '{cell}' is not a number",
                origin.display(),
                line_of(&row)
            ))
        })?;
        doses.push(dose);
        replicates.push(row.iter().skip(1).filter_map(number).collect());
    }
    if doses.is_empty() {
        return Err(Error::Parse(format!("{}: no data rows", origin.display())));
    }

    Ok(DoseResponseTable {
        dose_label: header[0].to_string(),
        doses,
        replicates,
    })
}

/// Strain name with a trailing `.N` duplicate suffix removed.
#[must_use]
pub fn strip_replicate_suffix(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((base, suffix))
            if !base.is_empty() && !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            base
        }
        _ => name,
    }
}

/// Read a one-row strain table from disk into groups, sorted by name.
///
/// # Errors
///
/// [`Error::Io`] if the file cannot be read, [`Error::Parse`] per
/// [`read_strain_row`].
pub fn parse_strain_row_csv(path: &Path) -> Result<Vec<Group>> {
    read_strain_row(open(path)?, path)
}

/// Read a one-row strain table from any reader.
///
/// Non-numeric cells are dropped; strains left without values are omitted.
///
/// # Errors
///
/// Returns [`Error::Parse`] for malformed CSV, a missing header or data
/// row, a header without strain columns, or no numeric cell.
pub fn read_strain_row<R: Read>(source: R, origin: &Path) -> Result<Vec<Group>> {
    let mut rdr = csv_reader(source);
    let header = rdr.headers().map_err(|e| csv_error(origin, e))?.clone();
    let mut records = rdr.records();
    let data = match records.next() {
        Some(record) => record.map_err(|e| csv_error(origin, e))?,
        None => {
            return Err(Error::Parse(format!(
                "{}: need a header row and a data row",
                origin.display()
            )))
        }
    };
    let extra = records.count();
    if extra > 0 {
        log::warn!(
            "{}: {extra} extra rows ignored; only the first data row is read",
            origin.display()
        );
    }
    if header.len() < 2 {
        return Err(Error::Parse(format!(
            "{}: header has no strain columns",
            origin.display()
        )));
    }

    let mut labels = Vec::new();
    let mut values = Vec::new();
    for (name, cell) in header.iter().zip(data.iter()).skip(1) {
        if let Some(v) = number(cell) {
            labels.push(strip_replicate_suffix(name));
            values.push(v);
        }
    }
    if values.is_empty() {
        return Err(Error::Parse(format!(
            "{}:{}: no numeric measurements",
            origin.display(),
            line_of(&data)
        )));
    }
    groups_from_long(&labels, &values)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn origin() -> &'static Path {
        Path::new("memory.csv")
    }

    #[test]
    fn dose_response_with_gaps() {
        let csv = "PQS,r1,r2,r3\n0,100,98,102\n\n6.25,91,,93\n12.5,80,x,82\n";
        let t = read_dose_response(Cursor::new(csv), origin()).unwrap();
        assert_eq!(t.dose_label, "PQS");
        assert_eq!(t.doses, vec![0.0, 6.25, 12.5]);
        assert_eq!(t.replicates[1], vec![91.0, 93.0]);
        assert_eq!(t.medians().unwrap(), vec![100.0, 92.0, 81.0]);
    }

    #[test]
    fn dose_response_errors() {
        assert!(matches!(
            read_dose_response(Cursor::new(""), origin()),
            Err(Error::Parse(_))
        ));
        assert!(read_dose_response(Cursor::new("PQS\n1\n"), origin()).is_err());
        assert!(read_dose_response(Cursor::new("PQS,r1\n"), origin()).is_err());
        let err = read_dose_response(Cursor::new("PQS,r1\nhigh,3\n"), origin()).unwrap_err();
        assert!(err.to_string().contains("memory.csv:2"), "{err}");
        let empty_row = read_dose_response(Cursor::new("PQS,r1\n1,\n"), origin()).unwrap();
        assert!(empty_row.medians().is_err());
    }

    #[test]
    fn suffix_stripping() {
        assert_eq!(strip_replicate_suffix("WT"), "WT");
        assert_eq!(strip_replicate_suffix("WT.1"), "WT");
        assert_eq!(strip_replicate_suffix("WT.12"), "WT");
        assert_eq!(strip_replicate_suffix("dPQS.a"), "dPQS.a");
        assert_eq!(strip_replicate_suffix("strain.2.3"), "strain.2");
        assert_eq!(strip_replicate_suffix(".1"), ".1");
        assert_eq!(strip_replicate_suffix("WT."), "WT.");
    }

    #[test]
    fn strain_row_groups() {
        let csv = "sample,WT,WT.1,WT.2,dPQS,dPQS.1,comp,comp.1\n\
                   PQS,12.1,11.8,12.6,3.2,n/a,7.5,7.9\n";
        let groups = read_strain_row(Cursor::new(csv), origin()).unwrap();
        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["WT", "comp", "dPQS"]);
        assert_eq!(groups[0].values, vec![12.1, 11.8, 12.6]);
        assert_eq!(groups[2].values, vec![3.2]);
    }

    #[test]
    fn strain_row_errors() {
        assert!(read_strain_row(Cursor::new("sample,WT\n"), origin()).is_err());
        assert!(read_strain_row(Cursor::new("sample\nPQS\n"), origin()).is_err());
        assert!(matches!(
            read_strain_row(Cursor::new("sample,WT\nPQS,none\n"), origin()),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn quoted_names_keep_their_commas() {
        let csv = "sample,\"WT, lot A\",\"WT, lot A.1\",dPQS,dPQS.1\n\
                   PQS,\"12.1\",11.8,3.2,\"2.9\"\n";
        let groups = read_strain_row(Cursor::new(csv), origin()).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "WT, lot A");
        assert_eq!(groups[0].values, vec![12.1, 11.8]);
        assert_eq!(groups[1].name, "dPQS");
        assert_eq!(groups[1].values, vec![3.2, 2.9]);
    }

    #[test]
    fn quoted_dose_cells_parse() {
        let csv = "\"PQS, uM\",r1,r2\n\"0\",\"100\",98\n\"6.25\", 91 ,\"93\"\n";
        let t = read_dose_response(Cursor::new(csv), origin()).unwrap();
        assert_eq!(t.dose_label, "PQS, uM");
        assert_eq!(t.doses, vec![0.0, 6.25]);
        assert_eq!(t.replicates, vec![vec![100.0, 98.0], vec![91.0, 93.0]]);
    }

    #[test]
    fn malformed_csv_reports_line() {
        let err = read_dose_response(Cursor::new("PQS,r1\n1,2\n\"3,4\n"), origin()).unwrap_err();
        assert!(matches!(err, Error::Parse(_)), "{err}");
        let bad_utf8: &[u8] = b"PQS,r1\n1,\xff\xfe\n";
        let err = read_dose_response(bad_utf8, origin()).unwrap_err();
        assert!(err.to_string().contains("memory.csv:2"), "{err}");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = parse_strain_row_csv(Path::new("/nonexistent/strains.csv")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
