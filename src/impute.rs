//! Imputation of missing samples within one subject's time series.
//!
//! A missing sample is replaced by the grand mean across parcels at the same time point:
//!
//! `data[t, p] = mean(data[t, :])` over the non-missing entries of row `t`.
//!
//! Rows without any observed entry cannot be filled; they stay missing and are reported.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::timeseries::TimeSeries;
use crate::util::nan_mean;


/// Signal cleaning applied column by column after imputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostProcess {
    /// Keep the imputed values as they are.
    None,
    /// Remove the linear trend of every parcel, then z-score it with the sample standard deviation.
    DetrendStandardize,
}

impl Default for PostProcess {
    fn default() -> Self {
        PostProcess::DetrendStandardize
    }
}

impl PostProcess {
    pub fn apply(&self, data: &mut Array2<f64>) {
        match self {
            PostProcess::None => {}
            PostProcess::DetrendStandardize => {
                detrend_inplace(data);
                standardize_inplace(data);
            }
        }
    }
}


/// Result of imputing one time series.
#[derive(Debug, Clone, PartialEq)]
pub struct Imputed {
    pub series: TimeSeries,
    /// Number of cells that were filled with their row mean.
    pub filled: usize,
    /// Rows that had no observed entry and therefore still contain missing values.
    pub residual_rows: Vec<usize>,
}

impl Imputed {
    pub fn has_residual_missing(&self) -> bool {
        !self.residual_rows.is_empty()
    }
}


/// Fill missing samples with the mean of the observed entries of the same row, then apply `post`.
///
/// Row count and column order are preserved. A series without missing values is returned
/// unchanged when `post` is [`PostProcess::None`].
pub fn impute(series: &TimeSeries, post: PostProcess) -> Imputed {
    let mut data = series.data.clone();
    let mut filled = 0usize;
    let mut residual_rows = Vec::new();

    for (t, mut row) in data.axis_iter_mut(Axis(0)).enumerate() {
        if !row.iter().any(|v| v.is_nan()) {
            continue;
        }
        match nan_mean(row.iter()) {
            Some(mean) => {
                for v in row.iter_mut().filter(|v| v.is_nan()) {
                    *v = mean;
                    filled += 1;
                }
            }
            None => residual_rows.push(t),
        }
    }

    if !residual_rows.is_empty() {
        tracing::debug!(rows = ?residual_rows, "rows without any observed parcel stay missing");
    }

    post.apply(&mut data);

    Imputed {
        series: TimeSeries::new(series.labels.clone(), data),
        filled,
        residual_rows,
    }
}


/// Remove the least-squares linear trend (and with it the mean) from every column.
///
/// Missing samples are ignored by the fit and stay missing. A column with a single observed
/// sample is only mean-centered.
pub fn detrend_inplace(data: &mut Array2<f64>) {
    for mut col in data.axis_iter_mut(Axis(1)) {
        let valid: Vec<(f64, f64)> = col
            .iter()
            .enumerate()
            .filter(|(_, y)| !y.is_nan())
            .map(|(t, y)| (t as f64, *y))
            .collect();

        if valid.is_empty() {
            continue;
        }

        let (intercept, slope) = fit_linear(&valid).unwrap_or_else(|| {
            let mean = valid.iter().map(|(_, y)| y).sum::<f64>() / valid.len() as f64;
            (mean, 0.0)
        });

        for (t, v) in col.iter_mut().enumerate() {
            if !v.is_nan() {
                *v -= intercept + slope * t as f64;
            }
        }
    }
}


/// Z-score every column with its mean and sample standard deviation (`ddof = 1`).
///
/// Columns whose standard deviation is zero (or undefined) are only mean-centered.
pub fn standardize_inplace(data: &mut Array2<f64>) {
    for mut col in data.axis_iter_mut(Axis(1)) {
        let observed: Vec<f64> = col.iter().copied().filter(|v| !v.is_nan()).collect();
        let n = observed.len();
        if n == 0 {
            continue;
        }
        let mean = observed.iter().sum::<f64>() / n as f64;
        let std = if n > 1 {
            (observed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
        } else {
            0.0
        };
        let scale = if std < f64::EPSILON { 1.0 } else { std };

        for v in col.iter_mut() {
            *v = (*v - mean) / scale;
        }
    }
}


fn fit_linear(samples: &[(f64, f64)]) -> Option<(f64, f64)> {
    let m = samples.len() as f64;
    let (sum_t, sum_y, sum_tt, sum_ty) = samples
        .iter()
        .fold((0.0, 0.0, 0.0, 0.0), |(st, sy, stt, sty), (t, y)| {
            (st + *t, sy + *y, stt + t * t, sty + t * y)
        });
    let denom = m * sum_tt - sum_t * sum_t;
    if !denom.is_finite() || denom.abs() <= f64::EPSILON {
        return None;
    }
    let slope = (m * sum_ty - sum_t * sum_y) / denom;
    let intercept = (sum_y - slope * sum_t) / m;
    Some((intercept, slope))
}
