//! Cleaning configuration.
//!
//! [`CleaningConfig`] holds every tunable parameter of a cohort cleaning run. The defaults
//! correspond to the `--impute-nans` behavior of the command line tool;
//! [`CleaningConfig::passthrough`] reproduces the plain conversion.

use std::collections::BTreeSet;

use crate::connectivity::ConnectivityKind;
use crate::coverage::{validate_threshold, DEFAULT_PARCEL_THRESHOLD};
use crate::error::Result;
use crate::impute::PostProcess;
use crate::sidecar::SamplingFrequencyUnit;

/// Subjects with more missing data than this (see [`SubjectMissingness`]) are excluded.
pub const DEFAULT_SUBJECT_THRESHOLD: f64 = 0.2;


/// How the missing-data fraction of a subject is measured, on its kept parcels before imputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectMissingness {
    /// Fraction of missing cells.
    Entries,
    /// Fraction of parcels with at least one missing sample.
    Parcels,
}

impl Default for SubjectMissingness {
    fn default() -> Self {
        SubjectMissingness::Entries
    }
}


/// Configuration of a cohort cleaning run.
///
/// All fields are `pub`, so struct-update syntax works:
///
/// ```
/// use halfpipe2bids::CleaningConfig;
///
/// let cfg = CleaningConfig {
///     subject_threshold: None,   // keep every subject
///     ..CleaningConfig::default()
/// };
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CleaningConfig {
    /// Parcels entirely missing in more than this proportion of a cohort's subjects are dropped
    /// from every subject of the cohort. A proportion equal to the threshold is kept.
    ///
    /// Default: `0.5`.
    pub parcel_threshold: f64,

    /// Subjects whose missing-data fraction exceeds this value are left out of the cohort's
    /// outputs. `None` switches the subject filter off.
    ///
    /// Default: `Some(0.2)`.
    pub subject_threshold: Option<f64>,

    /// Default: [`SubjectMissingness::Entries`].
    pub subject_missingness: SubjectMissingness,

    /// Fill missing samples with the row mean of their time point.
    ///
    /// Default: `true`.
    pub impute: bool,

    /// Column-wise cleaning applied after imputation.
    ///
    /// Default: [`PostProcess::DetrendStandardize`].
    pub post_process: PostProcess,

    /// Connectivity measures computed for every subject.
    ///
    /// Default: Pearson correlation only.
    pub kinds: BTreeSet<ConnectivityKind>,

    /// Unit of `SamplingFrequency` in the HalfPipe sidecars.
    ///
    /// Default: [`SamplingFrequencyUnit::Seconds`].
    pub sampling_frequency_unit: SamplingFrequencyUnit,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        CleaningConfig {
            parcel_threshold: DEFAULT_PARCEL_THRESHOLD,
            subject_threshold: Some(DEFAULT_SUBJECT_THRESHOLD),
            subject_missingness: SubjectMissingness::default(),
            impute: true,
            post_process: PostProcess::default(),
            kinds: std::iter::once(ConnectivityKind::Correlation).collect(),
            sampling_frequency_unit: SamplingFrequencyUnit::default(),
        }
    }
}

impl CleaningConfig {

    /// Convert without cleaning: every parcel and subject is kept, missing values are left as
    /// they are and propagate into the connectivity matrices.
    pub fn passthrough() -> Self {
        CleaningConfig {
            parcel_threshold: 1.0,
            subject_threshold: None,
            impute: false,
            post_process: PostProcess::None,
            ..CleaningConfig::default()
        }
    }

    /// Check both thresholds lie within [0, 1].
    pub fn validate(&self) -> Result<()> {
        validate_threshold("parcel", self.parcel_threshold)?;
        if let Some(t) = self.subject_threshold {
            validate_threshold("subject", t)?;
        }
        Ok(())
    }
}
