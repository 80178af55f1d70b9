//! Functions for fMRIPrep confound tables and the denoising regressors of a strategy.
//!
//! A confound table is a TSV file with a header row, one column per regressor and one row per
//! volume. Besides naming the regressors a strategy removed, it provides the motion summary
//! reported alongside every cleaned time series: framewise displacement and the number of
//! volumes flagged by `motion_outlier*` scrubbing columns.

use csv::ReaderBuilder;
use ndarray::Array2;
use regex::RegexSet;
use serde::{Deserialize, Serialize};

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Halfpipe2BidsError, Result};
use crate::util::{nan_mean, open_text, parse_cell};

pub const FRAMEWISE_DISPLACEMENT: &str = "framewise_displacement";
pub const MOTION_OUTLIER_PREFIX: &str = "motion_outlier";


/// Resolve regressor name patterns against the columns of a confound table.
///
/// Every pattern is a regular expression that must match a whole column name, so
/// `global_signal` does not select `global_signal_derivative1`. The result keeps the order of
/// `columns`, each column at most once.
///
/// # Examples
///
/// ```
/// let patterns = ["(trans|rot)_[xyz]", "global_signal"];
/// let columns = ["trans_x", "trans_x_derivative1", "global_signal", "white_matter"];
/// let matched = halfpipe2bids::regex_to_regressor(&patterns, &columns).unwrap();
/// assert_eq!(matched, vec!["trans_x", "global_signal"]);
/// ```
pub fn regex_to_regressor<P, C>(patterns: &[P], columns: &[C]) -> Result<Vec<String>>
where
    P: AsRef<str>,
    C: AsRef<str>,
{
    let anchored: Vec<String> = patterns
        .iter()
        .map(|p| format!("^(?:{})$", p.as_ref()))
        .collect();
    let set = RegexSet::new(&anchored)?;
    Ok(columns
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| set.is_match(c))
        .map(String::from)
        .collect())
}


/// A confound table: named columns of per-volume values, `n/a` read as missing.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfoundTable {
    pub path: PathBuf,
    pub columns: Vec<String>,
    pub data: Array2<f64>,
}

impl ConfoundTable {

    /// Read a confound table. If the file's name ends with ".gz", it is decoded on the fly.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ConfoundTable> {
        let path = path.as_ref();
        ConfoundTable::from_reader(open_text(path)?, path)
    }


    /// Read a confound table from the given byte stream. The `path` is used for error messages.
    pub fn from_reader<S: Read>(input: S, path: &Path) -> Result<ConfoundTable> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(b'\t')
            .flexible(false)
            .from_reader(input);

        let columns: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let mut values = Vec::new();
        let mut nrows = 0usize;
        for result in rdr.records() {
            let record = result?;
            for (col, field) in record.iter().enumerate() {
                let value = parse_cell(field).ok_or_else(|| {
                    Halfpipe2BidsError::MalformedConfoundTable(
                        path.to_path_buf(),
                        format!("non-numeric value '{}' in column '{}'", field, columns[col]),
                    )
                })?;
                values.push(value);
            }
            nrows += 1;
        }

        let data = Array2::from_shape_vec((nrows, columns.len()), values)
            .map_err(|e| Halfpipe2BidsError::MalformedConfoundTable(path.to_path_buf(), e.to_string()))?;
        Ok(ConfoundTable {
            path: path.to_path_buf(),
            columns,
            data,
        })
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.data.column(idx).to_vec())
    }

    /// Number of `motion_outlier*` columns, i.e. volumes discarded by scrubbing.
    pub fn scrubbed_volumes(&self) -> usize {
        self.columns
            .iter()
            .filter(|c| c.starts_with(MOTION_OUTLIER_PREFIX))
            .count()
    }


    /// Summarize subject motion.
    ///
    /// # Errors
    ///
    /// [`Halfpipe2BidsError::MalformedConfoundTable`] if there is no `framewise_displacement` column.
    pub fn motion_summary(&self) -> Result<MotionSummary> {
        let fd = self.column(FRAMEWISE_DISPLACEMENT).ok_or_else(|| {
            Halfpipe2BidsError::MalformedConfoundTable(
                self.path.clone(),
                format!("no '{}' column", FRAMEWISE_DISPLACEMENT),
            )
        })?;
        let max = fd
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));
        Ok(MotionSummary {
            mean_framewise_displacement: nan_mean(&fd),
            max_framewise_displacement: max,
            scrubbed_volumes: self.scrubbed_volumes(),
        })
    }
}


/// Motion quality metrics of one subject. The framewise displacement statistics skip missing
/// samples (the first volume has none) and are absent when no sample is available.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSummary {
    pub mean_framewise_displacement: Option<f64>,
    pub max_framewise_displacement: Option<f64>,
    pub scrubbed_volumes: usize,
}


/// Per-subject metadata attached to the cleaned outputs; serialized as the time series sidecar.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubjectReport {
    #[serde(rename = "ConfoundRegressors")]
    pub confound_regressors: Vec<String>,
    #[serde(rename = "NumberOfVolumesDiscardedByMotionScrubbing")]
    pub scrubbed_volumes: Option<usize>,
    #[serde(rename = "MeanFramewiseDisplacement")]
    pub mean_framewise_displacement: Option<f64>,
    #[serde(rename = "MaxFramewiseDisplacement")]
    pub max_framewise_displacement: Option<f64>,
    /// In Hz.
    #[serde(rename = "SamplingFrequency")]
    pub sampling_frequency: Option<f64>,
}

impl SubjectReport {

    /// Build the report from the strategy's regressor patterns and the subject's confound table.
    ///
    /// Without a table the patterns are reported as given. A table without framewise
    /// displacement still resolves regressors; its motion metrics are left absent.
    pub fn build(patterns: &[String], table: Option<&ConfoundTable>, sampling_frequency: Option<f64>) -> Result<SubjectReport> {
        let mut report = SubjectReport {
            sampling_frequency,
            ..SubjectReport::default()
        };
        match table {
            None => report.confound_regressors = patterns.to_vec(),
            Some(table) => {
                report.confound_regressors = regex_to_regressor(patterns, &table.columns)?;
                match table.motion_summary() {
                    Ok(motion) => {
                        report.scrubbed_volumes = Some(motion.scrubbed_volumes);
                        report.mean_framewise_displacement = motion.mean_framewise_displacement;
                        report.max_framewise_displacement = motion.max_framewise_displacement;
                    }
                    Err(e) => tracing::warn!(error = %e, "motion metrics unavailable"),
                }
            }
        }
        Ok(report)
    }
}
