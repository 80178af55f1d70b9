//! Functional connectivity matrices computed from a cleaned time series.
//!
//! Matrices are indexed by the columns of the series they were computed from, in the same order.
//! A parcel whose column still contains a missing sample gets NaN in its whole row and column;
//! there is no pairwise deletion.

use ndarray::Array2;
use ndarray_stats::CorrelationExt;
use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::timeseries::{write_matrix, TimeSeries};


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityKind {
    Correlation,
    Covariance,
}

impl ConnectivityKind {

    /// The BIDS `meas-` entity value for this measure.
    pub fn measure(&self) -> &'static str {
        match self {
            ConnectivityKind::Correlation => "PearsonCorrelation",
            ConnectivityKind::Covariance => "Covariance",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ConnectivityKind::Correlation => "Pearson correlation",
            ConnectivityKind::Covariance => "Sample covariance",
        }
    }
}

impl fmt::Display for ConnectivityKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.measure())
    }
}


/// A square, symmetric parcel × parcel matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectivityMatrix {
    pub kind: ConnectivityKind,
    pub labels: Vec<String>,
    pub values: Array2<f64>,
}

impl ConnectivityMatrix {

    pub fn size(&self) -> usize {
        self.labels.len()
    }

    /// Value for a pair of parcels, by label.
    pub fn get(&self, row: &str, col: &str) -> Option<f64> {
        let i = self.labels.iter().position(|l| l == row)?;
        let j = self.labels.iter().position(|l| l == col)?;
        Some(self.values[[i, j]])
    }

    /// Write the full matrix as TSV with a header row of column indices `0..n`.
    pub fn to_writer<W: Write>(&self, output: W) -> Result<()> {
        write_matrix(output, &self.values, true)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.to_writer(BufWriter::new(File::create(path)?))
    }
}


/// Compute every requested connectivity matrix over the parcels of `series`.
pub fn compute(series: &TimeSeries, kinds: &BTreeSet<ConnectivityKind>) -> BTreeMap<ConnectivityKind, ConnectivityMatrix> {
    kinds
        .iter()
        .map(|&kind| (kind, compute_one(series, kind)))
        .collect()
}


/// Compute a single connectivity matrix.
///
/// With fewer than two samples neither measure is defined and the matrix is filled with NaN.
pub fn compute_one(series: &TimeSeries, kind: ConnectivityKind) -> ConnectivityMatrix {
    let n = series.n_parcels();
    let values = if n == 0 {
        Array2::zeros((0, 0))
    } else if series.n_samples() < 2 {
        tracing::warn!(samples = series.n_samples(), measure = %kind, "too few samples for connectivity");
        Array2::from_elem((n, n), f64::NAN)
    } else {
        // rows are random variables, columns observations
        let variables = series.data.t();
        let mut values = match kind {
            ConnectivityKind::Covariance => variables.cov(1.0),
            ConnectivityKind::Correlation => variables.pearson_correlation(),
        }
        .unwrap_or_else(|_| Array2::from_elem((n, n), f64::NAN));
        if kind == ConnectivityKind::Correlation {
            bound_correlations(&mut values);
        }
        symmetrize(&mut values);
        values
    };

    ConnectivityMatrix {
        kind,
        labels: series.labels.clone(),
        values,
    }
}


/// Clamp rounding noise into [-1, 1] and pin the defined diagonal entries to exactly 1.
fn bound_correlations(values: &mut Array2<f64>) {
    for ((i, j), v) in values.indexed_iter_mut() {
        if v.is_nan() {
            continue;
        }
        *v = if i == j { 1.0 } else { v.max(-1.0).min(1.0) };
    }
}


/// Mirror the upper triangle onto the lower one.
fn symmetrize(values: &mut Array2<f64>) {
    let n = values.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            values[[j, i]] = values[[i, j]];
        }
    }
}
