//! Cohort cleaning.
//!
//! A cohort is cleaned in stages, each completing for all subjects before the next starts:
//!
//! ```text
//! COLLECTING        subject time series are added; missing files are recorded, not fatal
//!   │
//! COVERAGE_COMPUTED per parcel, proportion of subjects where it is entirely missing
//!   │
//! PARTITIONED       parcels above the threshold are dropped, for every subject alike
//!   │
//! IMPUTING          per subject, independently: restrict, impute, recompute connectivity
//!   │
//! DONE              cleaned series, matrices and diagnostics
//! ```
//!
//! Any stage may end in `FAILED`, which only affects this cohort.

use rayon::prelude::*;

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

use crate::config::{CleaningConfig, SubjectMissingness};
use crate::connectivity::{self, ConnectivityKind, ConnectivityMatrix};
use crate::coverage::{self, CohortCoverage, ParcelPartition};
use crate::error::{Halfpipe2BidsError, Result};
use crate::impute;
use crate::layout::CohortKey;
use crate::timeseries::{Parcel, TimeSeries};
use crate::util::format_cell;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CohortState {
    Collecting,
    CoverageComputed,
    Partitioned,
    Imputing,
    Done,
    Failed,
}

impl fmt::Display for CohortState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            CohortState::Collecting => "COLLECTING",
            CohortState::CoverageComputed => "COVERAGE_COMPUTED",
            CohortState::Partitioned => "PARTITIONED",
            CohortState::Imputing => "IMPUTING",
            CohortState::Done => "DONE",
            CohortState::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}


/// Outcome of a subject within a cohort, as listed in the subject report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectStatus {
    Kept,
    Excluded,
    NotFound,
    Failed,
}

impl SubjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectStatus::Kept => "kept",
            SubjectStatus::Excluded => "excluded",
            SubjectStatus::NotFound => "not_found",
            SubjectStatus::Failed => "failed",
        }
    }
}


/// One subject after cleaning.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedSubject {
    /// Restricted to the kept parcels, imputed and post-processed.
    pub series: TimeSeries,
    pub connectivity: BTreeMap<ConnectivityKind, ConnectivityMatrix>,
    /// Missing-data fraction of the kept parcels before imputation, see [`SubjectMissingness`].
    pub na_ratio: f64,
    /// Number of imputed cells.
    pub imputed: usize,
    /// Rows left missing because no parcel had signal at that time point.
    pub residual_rows: Vec<usize>,
}


/// Restrict one subject to the kept parcels, impute it and recompute its connectivity.
///
/// This is a pure function of its inputs; subjects of a cohort can be cleaned in any order.
pub fn clean_subject(series: &TimeSeries, kept: &[String], config: &CleaningConfig) -> CleanedSubject {
    let restricted = series.restrict_to(kept);
    let na_ratio = match config.subject_missingness {
        SubjectMissingness::Entries => restricted.missing_fraction(),
        SubjectMissingness::Parcels => restricted.parcels_with_missing_fraction(),
    };

    let (cleaned, imputed, residual_rows) = if config.impute {
        let out = impute::impute(&restricted, config.post_process);
        (out.series, out.filled, out.residual_rows)
    } else {
        let mut data = restricted.data;
        config.post_process.apply(&mut data);
        (TimeSeries::new(restricted.labels, data), 0, Vec::new())
    };

    let connectivity = connectivity::compute(&cleaned, &config.kinds);
    CleanedSubject {
        series: cleaned,
        connectivity,
        na_ratio,
        imputed,
        residual_rows,
    }
}


/// Everything a finished cohort produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortOutput {
    pub key: CohortKey,
    pub coverage: CohortCoverage,
    pub partition: ParcelPartition,
    /// Subjects in the outputs.
    pub subjects: BTreeMap<String, CleanedSubject>,
    /// Subjects left out by the subject filter, with their missing-data fraction.
    pub excluded: BTreeMap<String, f64>,
    pub not_found: Vec<String>,
    /// Subjects whose input could not be used, with the reason.
    pub failed: BTreeMap<String, String>,
}

impl CohortOutput {

    /// Per atlas parcel: `index, label, na_ratio, status` where status is `kept` or `dropped`.
    pub fn write_parcel_report<W: Write>(&self, output: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_writer(output);
        wtr.write_record(&["index", "label", "na_ratio", "status"])?;
        for (parcel, proportion) in self.coverage.parcels.iter().zip(&self.coverage.missing_proportion) {
            let status = if self.partition.is_dropped(&parcel.label) { "dropped" } else { "kept" };
            wtr.write_record(&[
                parcel.index.to_string(),
                parcel.label.clone(),
                format_cell(*proportion),
                String::from(status),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }


    /// Per subject of the dataset: `subject, na_ratio, status`. The ratio is `n/a` for subjects
    /// without usable input.
    pub fn write_subject_report<W: Write>(&self, output: W) -> Result<()> {
        let mut rows: Vec<(String, Option<f64>, SubjectStatus)> = Vec::new();
        rows.extend(self.subjects.iter().map(|(s, c)| (s.clone(), Some(c.na_ratio), SubjectStatus::Kept)));
        rows.extend(self.excluded.iter().map(|(s, r)| (s.clone(), Some(*r), SubjectStatus::Excluded)));
        rows.extend(self.not_found.iter().map(|s| (s.clone(), None, SubjectStatus::NotFound)));
        rows.extend(self.failed.keys().map(|s| (s.clone(), None, SubjectStatus::Failed)));
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_writer(output);
        wtr.write_record(&["subject", "na_ratio", "status"])?;
        for (subject, ratio, status) in rows {
            let ratio = ratio.map(format_cell).unwrap_or_else(|| String::from("n/a"));
            wtr.write_record(&[subject, ratio, String::from(status.as_str())])?;
        }
        wtr.flush()?;
        Ok(())
    }
}


/// Cleans one cohort. Subjects are added with [`collect`](CohortCleaningPipeline::collect), then
/// [`run`](CohortCleaningPipeline::run) performs all remaining stages.
#[derive(Debug)]
pub struct CohortCleaningPipeline<'a> {
    config: &'a CleaningConfig,
    key: CohortKey,
    parcels: Vec<Parcel>,
    state: CohortState,
    subjects: BTreeMap<String, TimeSeries>,
    not_found: Vec<String>,
    failed: BTreeMap<String, String>,
}

impl<'a> CohortCleaningPipeline<'a> {

    pub fn new(key: CohortKey, parcels: Vec<Parcel>, config: &'a CleaningConfig) -> Self {
        CohortCleaningPipeline {
            config,
            key,
            parcels,
            state: CohortState::Collecting,
            subjects: BTreeMap::new(),
            not_found: Vec::new(),
            failed: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> CohortState {
        self.state
    }

    pub fn key(&self) -> &CohortKey {
        &self.key
    }

    pub fn num_collected(&self) -> usize {
        self.subjects.len()
    }


    /// Add the result of reading one subject's time series.
    ///
    /// A missing file puts the subject on the not-found list, any other error on the failed
    /// list; neither stops the cohort. Ignored once the pipeline has left `COLLECTING`.
    pub fn collect(&mut self, subject: &str, series: Result<TimeSeries>) {
        if self.state != CohortState::Collecting {
            tracing::warn!(cohort = %self.key, subject, state = %self.state, "subject added after collection ended, ignored");
            return;
        }
        match series {
            Ok(series) => {
                self.subjects.insert(subject.to_string(), series);
            }
            Err(Halfpipe2BidsError::MissingFile(path)) => {
                tracing::warn!(cohort = %self.key, subject, path = %path.display(), "time series file not found");
                self.not_found.push(subject.to_string());
            }
            Err(e) => {
                tracing::warn!(cohort = %self.key, subject, error = %e, "time series unusable, subject skipped");
                self.failed.insert(subject.to_string(), e.to_string());
            }
        }
    }

    /// Record a subject of the dataset that has no file for this cohort.
    pub fn mark_not_found(&mut self, subject: &str) {
        if self.state == CohortState::Collecting {
            self.not_found.push(subject.to_string());
        }
    }


    /// Run coverage, partition and per-subject cleaning on the collected subjects.
    ///
    /// # Errors
    ///
    /// * [`Halfpipe2BidsError::EmptyCohort`] if no subject was collected.
    /// * [`Halfpipe2BidsError::InvalidThreshold`] for an out-of-range parcel threshold.
    ///
    /// Either leaves the pipeline in `FAILED`.
    ///
    /// [`Halfpipe2BidsError::InvalidStateTransition`] if the pipeline already ran; its state is
    /// left unchanged.
    pub fn run(&mut self) -> Result<CohortOutput> {
        if self.state != CohortState::Collecting {
            return Err(Halfpipe2BidsError::InvalidStateTransition(self.key.to_string(), self.state.to_string()));
        }
        match self.run_stages() {
            Ok(output) => {
                self.transition(CohortState::Done);
                Ok(output)
            }
            Err(e) => {
                tracing::error!(cohort = %self.key, state = %self.state, error = %e, "cohort failed");
                self.transition(CohortState::Failed);
                Err(e)
            }
        }
    }

    fn run_stages(&mut self) -> Result<CohortOutput> {
        let subjects = std::mem::take(&mut self.subjects);
        tracing::info!(cohort = %self.key, subjects = subjects.len(), not_found = self.not_found.len(), "cleaning cohort");

        let coverage = coverage::compute_coverage(subjects.values(), &self.parcels).map_err(|e| match e {
            Halfpipe2BidsError::EmptyCohort(_) => Halfpipe2BidsError::EmptyCohort(self.key.to_string()),
            other => other,
        })?;
        self.transition(CohortState::CoverageComputed);

        let partition = coverage::partition(&coverage, self.config.parcel_threshold)?;
        if !partition.dropped.is_empty() {
            tracing::info!(
                cohort = %self.key,
                dropped = partition.dropped.len(),
                kept = partition.kept.len(),
                "dropping parcels missing in too many subjects"
            );
        }
        self.transition(CohortState::Partitioned);

        self.transition(CohortState::Imputing);
        let kept = partition.kept_labels();
        let config = self.config;
        let cleaned: Vec<(String, CleanedSubject)> = subjects
            .into_par_iter()
            .map(|(subject, series)| {
                let cleaned = clean_subject(&series, &kept, config);
                (subject, cleaned)
            })
            .collect();

        let mut kept_subjects = BTreeMap::new();
        let mut excluded = BTreeMap::new();
        for (subject, result) in cleaned {
            if result.has_residual_missing() {
                tracing::warn!(
                    cohort = %self.key,
                    subject = subject.as_str(),
                    rows = ?result.residual_rows,
                    "missing values remain after imputation"
                );
            }
            match self.config.subject_threshold {
                Some(threshold) if result.na_ratio > threshold => {
                    tracing::info!(cohort = %self.key, subject = subject.as_str(), na_ratio = result.na_ratio, "subject excluded");
                    excluded.insert(subject, result.na_ratio);
                }
                _ => {
                    kept_subjects.insert(subject, result);
                }
            }
        }

        Ok(CohortOutput {
            key: self.key.clone(),
            coverage,
            partition,
            subjects: kept_subjects,
            excluded,
            not_found: self.not_found.clone(),
            failed: self.failed.clone(),
        })
    }

    fn transition(&mut self, next: CohortState) {
        tracing::debug!(cohort = %self.key, from = %self.state, to = %next, "cohort state");
        self.state = next;
    }
}


impl CleanedSubject {
    pub fn has_residual_missing(&self) -> bool {
        !self.residual_rows.is_empty()
    }
}
