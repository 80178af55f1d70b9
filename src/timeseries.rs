//! Regional time series: a samples × parcels matrix with one labeled column per atlas parcel.
//!
//! HalfPipe writes these tables without a header, one row per volume (TR), one column per
//! parcel in atlas order, and uses the literal `nan` for samples without signal.

use csv::{ReaderBuilder, WriterBuilder};
use ndarray::{Array2, Axis};

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::error::{Halfpipe2BidsError, Result};
use crate::util::{format_cell, open_text, parse_cell};


/// An atlas-defined brain region. The `index` is the parcel's value in the atlas volume.
#[derive(Debug, Clone, PartialEq)]
pub struct Parcel {
    pub index: usize,
    pub label: String,
    pub centroid: Option<[f64; 3]>,
}

impl Parcel {
    pub fn new<S: Into<String>>(index: usize, label: S) -> Parcel {
        Parcel {
            index,
            label: label.into(),
            centroid: None,
        }
    }
}


/// Models one subject's regional time series for a single (task, session, run, strategy, atlas) tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub labels: Vec<String>,
    pub data: Array2<f64>,
}

impl TimeSeries {

    /// Wrap a samples × parcels matrix.
    ///
    /// # Panics
    ///
    /// If the number of labels differs from the number of columns in `data`.
    pub fn new(labels: Vec<String>, data: Array2<f64>) -> TimeSeries {
        assert_eq!(labels.len(), data.ncols(), "one label per time series column is required");
        TimeSeries { labels, data }
    }


    /// Read a headerless HalfPipe time series table and label its columns with the atlas labels.
    /// If the file's name ends with ".gz", the file is assumed to need GZip decoding.
    ///
    /// A column count that differs from the number of `labels` yields
    /// [`Halfpipe2BidsError::ParcelCountMismatch`].
    pub fn from_file<P: AsRef<Path>>(path: P, labels: &[String]) -> Result<TimeSeries> {
        let path = path.as_ref();
        let data = read_matrix(path)?;
        if data.ncols() != labels.len() {
            return Err(Halfpipe2BidsError::ParcelCountMismatch(path.to_path_buf(), labels.len(), data.ncols()));
        }
        Ok(TimeSeries::new(labels.to_vec(), data))
    }

    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_parcels(&self) -> usize {
        self.data.ncols()
    }

    /// Position of the column with the given label.
    pub fn column_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Whether the parcel has no usable signal at all, i.e. every sample is missing.
    /// A table without samples counts as entirely missing.
    pub fn column_is_missing(&self, column: usize) -> bool {
        self.data.column(column).iter().all(|v| v.is_nan())
    }

    /// Number of missing cells.
    pub fn missing_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_nan()).count()
    }

    /// Fraction of missing cells over the whole table, 0 for an empty table.
    pub fn missing_fraction(&self) -> f64 {
        let total = self.data.len();
        if total == 0 {
            0.0
        } else {
            self.missing_count() as f64 / total as f64
        }
    }

    /// Fraction of parcels with at least one missing sample, 0 without parcels.
    pub fn parcels_with_missing_fraction(&self) -> f64 {
        let n = self.n_parcels();
        if n == 0 {
            return 0.0;
        }
        let affected = self
            .data
            .axis_iter(Axis(1))
            .filter(|col| col.iter().any(|v| v.is_nan()))
            .count();
        affected as f64 / n as f64
    }

    /// Restrict the table to the given labels, in the given order.
    ///
    /// Labels that are not part of this table produce an entirely missing column, so the result
    /// always has exactly one column per requested label.
    pub fn restrict_to(&self, labels: &[String]) -> TimeSeries {
        let mut data = Array2::from_elem((self.n_samples(), labels.len()), f64::NAN);
        for (target, label) in labels.iter().enumerate() {
            if let Some(source) = self.column_of(label) {
                data.column_mut(target).assign(&self.data.column(source));
            }
        }
        TimeSeries::new(labels.to_vec(), data)
    }


    /// Write the table as TSV. Columns are renumbered `0..n`; with `header` that numbering is
    /// written as the first row.
    pub fn to_writer<W: Write>(&self, output: W, header: bool) -> Result<()> {
        write_matrix(output, &self.data, header)
    }


    /// Write the table to a file, creating parent directories as needed.
    pub fn to_file<P: AsRef<Path>>(&self, path: P, header: bool) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.to_writer(BufWriter::new(File::create(path)?), header)
    }
}


impl fmt::Display for TimeSeries {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Time series with {} samples for {} parcels.", self.n_samples(), self.n_parcels())
    }
}


/// Read a headerless numeric TSV table into a samples × columns matrix.
pub fn read_matrix<P: AsRef<Path>>(path: P) -> Result<Array2<f64>> {
    let path = path.as_ref();
    matrix_from_reader(open_text(path)?, path)
}


/// Read a headerless numeric TSV table from the given byte stream. The `path` is only used to
/// describe errors.
pub fn matrix_from_reader<S: Read>(input: S, path: &Path) -> Result<Array2<f64>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .flexible(false)
        .from_reader(input);

    let mut values: Vec<f64> = Vec::new();
    let mut ncols: Option<usize> = None;
    let mut nrows = 0usize;
    for result in rdr.records() {
        let record = result.map_err(|e| Halfpipe2BidsError::InvalidTimeSeries(path.to_path_buf(), e.to_string()))?;
        ncols.get_or_insert(record.len());
        for (col, field) in record.iter().enumerate() {
            let value = parse_cell(field).ok_or_else(|| {
                Halfpipe2BidsError::InvalidTimeSeries(
                    path.to_path_buf(),
                    format!("non-numeric value '{}' at row {}, column {}", field, nrows, col),
                )
            })?;
            values.push(value);
        }
        nrows += 1;
    }

    let shape = (nrows, ncols.unwrap_or(0));
    Array2::from_shape_vec(shape, values)
        .map_err(|e| Halfpipe2BidsError::InvalidTimeSeries(path.to_path_buf(), e.to_string()))
}


/// Write a matrix as TSV with `nan` for missing values, optionally preceded by a row of column indices.
pub fn write_matrix<W: Write>(output: W, data: &Array2<f64>, header: bool) -> Result<()> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .from_writer(output);

    if header {
        wtr.write_record((0..data.ncols()).map(|i| i.to_string()))?;
    }
    for row in data.axis_iter(Axis(0)) {
        wtr.write_record(row.iter().map(|v| format_cell(*v)))?;
    }
    wtr.flush()?;
    Ok(())
}
