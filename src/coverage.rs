//! Cohort-level parcel coverage.
//!
//! A parcel is lost for a subject when every sample of its column is missing. Parcels lost for
//! more than a threshold proportion of the cohort are dropped for every subject of that cohort,
//! so all cleaned time series of a cohort share the same columns in the same order.

use std::collections::BTreeSet;

use crate::error::{Halfpipe2BidsError, Result};
use crate::timeseries::{Parcel, TimeSeries};

/// Parcels missing in more than this proportion of subjects are dropped.
pub const DEFAULT_PARCEL_THRESHOLD: f64 = 0.5;


/// Per parcel (in atlas order), the proportion of subjects for which the parcel is entirely missing.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortCoverage {
    pub parcels: Vec<Parcel>,
    pub missing_proportion: Vec<f64>,
    pub num_subjects: usize,
}

impl CohortCoverage {

    /// Missing proportion for the parcel with the given label.
    pub fn proportion_of(&self, label: &str) -> Option<f64> {
        self.parcels
            .iter()
            .position(|p| p.label == label)
            .map(|i| self.missing_proportion[i])
    }
}


/// The kept parcels (atlas order) and the dropped ones. Together they cover the atlas exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelPartition {
    pub kept: Vec<Parcel>,
    pub dropped: Vec<Parcel>,
}

impl ParcelPartition {

    pub fn kept_labels(&self) -> Vec<String> {
        self.kept.iter().map(|p| p.label.clone()).collect()
    }

    pub fn dropped_labels(&self) -> BTreeSet<String> {
        self.dropped.iter().map(|p| p.label.clone()).collect()
    }

    pub fn is_dropped(&self, label: &str) -> bool {
        self.dropped.iter().any(|p| p.label == label)
    }
}


/// Compute the cohort coverage of every parcel.
///
/// Only entirely missing columns count as lost; partial missingness is left to imputation. A
/// parcel that is absent from a subject's table counts as missing for that subject.
///
/// # Errors
///
/// [`Halfpipe2BidsError::EmptyCohort`] if `cohort` yields no subject.
pub fn compute_coverage<'a, I>(cohort: I, parcels: &[Parcel]) -> Result<CohortCoverage>
where
    I: IntoIterator<Item = &'a TimeSeries>,
{
    let mut missing_counts = vec![0usize; parcels.len()];
    let mut num_subjects = 0usize;

    for series in cohort {
        num_subjects += 1;
        for (count, parcel) in missing_counts.iter_mut().zip(parcels) {
            let lost = match series.column_of(&parcel.label) {
                Some(column) => series.column_is_missing(column),
                None => true,
            };
            if lost {
                *count += 1;
            }
        }
    }

    if num_subjects == 0 {
        return Err(Halfpipe2BidsError::EmptyCohort(String::from("coverage")));
    }

    Ok(CohortCoverage {
        parcels: parcels.to_vec(),
        missing_proportion: missing_counts
            .iter()
            .map(|&c| c as f64 / num_subjects as f64)
            .collect(),
        num_subjects,
    })
}


/// Check that a threshold lies within [0, 1].
pub fn validate_threshold(name: &'static str, threshold: f64) -> Result<()> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(Halfpipe2BidsError::InvalidThreshold(name, threshold))
    }
}


/// Split the parcels into kept and dropped ones. A parcel is dropped iff its missing proportion
/// is strictly greater than `threshold`; a proportion equal to the threshold is kept.
///
/// # Errors
///
/// [`Halfpipe2BidsError::InvalidThreshold`] if `threshold` is outside [0, 1] (NaN included).
pub fn partition(coverage: &CohortCoverage, threshold: f64) -> Result<ParcelPartition> {
    validate_threshold("parcel", threshold)?;

    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    for (parcel, &proportion) in coverage.parcels.iter().zip(&coverage.missing_proportion) {
        if proportion > threshold {
            dropped.push(parcel.clone());
        } else {
            kept.push(parcel.clone());
        }
    }
    Ok(ParcelPartition { kept, dropped })
}
