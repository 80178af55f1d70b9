//! Conversion of a HalfPipe output directory into a BIDS-style connectivity derivative.
//!
//! Time series are discovered below the HalfPipe directory and grouped into cohorts. Each cohort
//! runs through a [`CohortCleaningPipeline`]; its outputs, reports and metadata are written below
//! the output directory. A cohort that fails is reported in the [`RunSummary`] and does not stop
//! the others.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::atlas::{read_atlases, Atlas};
use crate::config::CleaningConfig;
use crate::confounds::{ConfoundTable, SubjectReport};
use crate::error::{Halfpipe2BidsError, Result};
use crate::layout::{is_timeseries_file, sidecar_path, CohortKey, Entities};
use crate::pipeline::{CleanedSubject, CohortCleaningPipeline, CohortOutput};
use crate::sidecar::{self, read_sampling_frequency, read_strategy_confounds, write_json};
use crate::timeseries::{read_matrix, TimeSeries};
use crate::util::{find_files, has_name};

/// Name of the HalfPipe configuration file at the root of its output directory.
pub const HALFPIPE_SPEC_FILE: &str = "spec.json";


/// Time series found below a HalfPipe directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    /// Per cohort, the time series file of every subject that has one.
    pub cohorts: BTreeMap<CohortKey, BTreeMap<String, PathBuf>>,
    /// Every subject seen in any cohort.
    pub subjects: BTreeSet<String>,
}


/// Find and group all HalfPipe time series below `halfpipe_dir`.
///
/// # Errors
///
/// [`Halfpipe2BidsError::InvalidHalfpipeDir`] if the directory does not exist, is empty or
/// contains no time series file.
pub fn discover<P: AsRef<Path>>(halfpipe_dir: P) -> Result<Dataset> {
    let halfpipe_dir = halfpipe_dir.as_ref();
    if !halfpipe_dir.is_dir() {
        return Err(Halfpipe2BidsError::InvalidHalfpipeDir(halfpipe_dir.to_path_buf(), String::from("not a directory")));
    }
    if fs::read_dir(halfpipe_dir)?.next().is_none() {
        return Err(Halfpipe2BidsError::InvalidHalfpipeDir(halfpipe_dir.to_path_buf(), String::from("directory is empty")));
    }

    let files = find_files(halfpipe_dir, "*_timeseries.tsv*")?;
    let mut dataset = Dataset::default();
    for file in files.into_iter().filter(|f| has_name(f, is_timeseries_file)) {
        let entities = match Entities::from_path(&file) {
            Some(e) => e,
            None => {
                tracing::warn!(path = %file.display(), "time series name lacks sub, task, feature or atlas, skipped");
                continue;
            }
        };
        let cohort = dataset.cohorts.entry(entities.cohort()).or_insert_with(BTreeMap::new);
        if let Some(previous) = cohort.insert(entities.subject.clone(), file.clone()) {
            tracing::warn!(
                subject = entities.subject.as_str(),
                kept = %file.display(),
                ignored = %previous.display(),
                "several time series for one subject and cohort"
            );
        }
        dataset.subjects.insert(entities.subject);
    }

    if dataset.cohorts.is_empty() {
        return Err(Halfpipe2BidsError::InvalidHalfpipeDir(
            halfpipe_dir.to_path_buf(),
            String::from("no HalfPipe time series found"),
        ));
    }
    tracing::info!(cohorts = dataset.cohorts.len(), subjects = dataset.subjects.len(), "discovered HalfPipe outputs");
    Ok(dataset)
}


/// What a conversion did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub cohorts_processed: usize,
    /// Cohort and reason.
    pub cohorts_failed: Vec<(String, String)>,
    pub subjects_written: usize,
    pub subjects_excluded: usize,
    /// Subjects whose outputs could not be written, with the reason.
    pub subjects_failed: Vec<(String, String)>,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.cohorts_failed.is_empty() && self.subjects_failed.is_empty()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} cohorts processed, {} failed; {} subject outputs written, {} subjects excluded, {} failed.",
            self.cohorts_processed,
            self.cohorts_failed.len(),
            self.subjects_written,
            self.subjects_excluded,
            self.subjects_failed.len()
        )
    }
}


/// Convert the HalfPipe outputs in `halfpipe_dir` into a BIDS derivative in `output_dir`.
///
/// Atlas label tables are read from `atlas_dir` when given; cohorts with an unknown atlas get
/// numbered parcels.
///
/// # Errors
///
/// Fails before any cohort is processed if `config` is invalid, the HalfPipe directory is
/// unusable or the dataset-level files cannot be written. Later failures are reported in the
/// returned [`RunSummary`].
pub fn convert<P: AsRef<Path>, Q: AsRef<Path>>(
    halfpipe_dir: P,
    output_dir: Q,
    atlas_dir: Option<&Path>,
    config: &CleaningConfig,
) -> Result<RunSummary> {
    config.validate()?;
    let halfpipe_dir = halfpipe_dir.as_ref();
    let output_dir = output_dir.as_ref();
    let dataset = discover(halfpipe_dir)?;

    let atlases = match atlas_dir {
        Some(dir) => read_atlases(dir)?,
        None => BTreeMap::new(),
    };
    let strategies = read_strategies(halfpipe_dir);
    let confound_tables: BTreeMap<String, PathBuf> = find_files(halfpipe_dir, "*_desc-confounds_timeseries.tsv*")?
        .into_iter()
        .filter(|p| has_name(p, |name| name.ends_with(".tsv") || name.ends_with(".tsv.gz")))
        .filter_map(|p| Some((p.file_name()?.to_string_lossy().into_owned(), p)))
        .collect();

    write_dataset_metadata(output_dir, config)?;

    let conversion = Conversion {
        halfpipe_dir,
        output_dir,
        config,
        strategies,
        confound_tables,
    };

    let mut summary = RunSummary::default();
    for (key, files) in &dataset.cohorts {
        let atlas = match atlases.get(&key.atlas) {
            Some(atlas) => atlas.clone(),
            None => numbered_atlas(key, files),
        };

        let mut pipeline = CohortCleaningPipeline::new(key.clone(), atlas.parcels.clone(), config);
        let labels = atlas.labels();
        for (subject, path) in files {
            pipeline.collect(subject, TimeSeries::from_file(path, &labels));
        }
        for subject in dataset.subjects.iter().filter(|s| !files.contains_key(*s)) {
            pipeline.mark_not_found(subject);
        }

        let output = match pipeline.run() {
            Ok(output) => output,
            Err(e) => {
                summary.cohorts_failed.push((key.to_string(), e.to_string()));
                continue;
            }
        };

        for (subject, cleaned) in &output.subjects {
            match conversion.write_subject(key, subject, cleaned, &files[subject]) {
                Ok(()) => summary.subjects_written += 1,
                Err(e) => {
                    tracing::error!(cohort = %key, subject = subject.as_str(), error = %e, "writing subject outputs failed");
                    summary.subjects_failed.push((subject.clone(), e.to_string()));
                }
            }
        }
        if let Err(e) = conversion.write_reports(&output) {
            summary.cohorts_failed.push((key.to_string(), e.to_string()));
            continue;
        }
        summary.subjects_excluded += output.excluded.len();
        summary.cohorts_processed += 1;
    }

    tracing::info!(
        cohorts_processed = summary.cohorts_processed,
        cohorts_failed = summary.cohorts_failed.len(),
        subjects_written = summary.subjects_written,
        subjects_excluded = summary.subjects_excluded,
        "conversion finished"
    );
    for (cohort, reason) in &summary.cohorts_failed {
        tracing::warn!(cohort = cohort.as_str(), reason = reason.as_str(), "cohort not converted");
    }
    Ok(summary)
}


/// Shared inputs of all cohorts of one conversion.
struct Conversion<'a> {
    halfpipe_dir: &'a Path,
    output_dir: &'a Path,
    config: &'a CleaningConfig,
    strategies: BTreeMap<String, Vec<String>>,
    /// Confound tables anywhere below the HalfPipe directory, by file name.
    confound_tables: BTreeMap<String, PathBuf>,
}

impl<'a> Conversion<'a> {

    fn write_subject(&self, key: &CohortKey, subject: &str, cleaned: &CleanedSubject, source: &Path) -> Result<()> {
        let stem = key.subject_stem(subject, cleaned.series.n_parcels());
        let dir = key.subject_func_dir(self.output_dir, subject);

        cleaned.series.to_file(dir.join(format!("{}_timeseries.tsv", stem)), false)?;
        for (kind, matrix) in &cleaned.connectivity {
            matrix.to_file(dir.join(format!("{}_meas-{}_relmat.tsv", stem, kind.measure())))?;
        }
        let report = self.subject_report(key, subject, source);
        write_json(dir.join(format!("{}_timeseries.json", stem)), &report)?;
        tracing::debug!(cohort = %key, subject, stem = stem.as_str(), "subject outputs written");
        Ok(())
    }

    /// Metadata of one subject. Missing or unreadable companion files leave the affected
    /// fields empty.
    fn subject_report(&self, key: &CohortKey, subject: &str, source: &Path) -> SubjectReport {
        let sampling_frequency = match read_sampling_frequency(sidecar_path(source)) {
            Ok(Some(value)) => {
                let hertz = self.config.sampling_frequency_unit.to_hertz(value);
                if hertz.is_none() {
                    tracing::warn!(subject, value, "unusable SamplingFrequency in sidecar");
                }
                hertz
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(subject, error = %e, "time series sidecar unavailable");
                None
            }
        };

        let patterns = self.strategies.get(&key.strategy).cloned().unwrap_or_default();
        let table = self.confounds_path(key, subject).and_then(|path| match ConfoundTable::from_file(&path) {
            Ok(table) => Some(table),
            Err(e) => {
                tracing::warn!(subject, error = %e, "confound table unreadable");
                None
            }
        });
        if table.is_none() {
            tracing::debug!(cohort = %key, subject, "no confound table, reporting regressor patterns");
        }

        SubjectReport::build(&patterns, table.as_ref(), sampling_frequency).unwrap_or_else(|e| {
            tracing::warn!(cohort = %key, subject, error = %e, "confound patterns could not be resolved");
            SubjectReport {
                confound_regressors: patterns.clone(),
                sampling_frequency,
                ..SubjectReport::default()
            }
        })
    }

    fn confounds_path(&self, key: &CohortKey, subject: &str) -> Option<PathBuf> {
        let expected = key.confounds_path(self.halfpipe_dir, subject);
        if expected.is_file() {
            return Some(expected);
        }
        let name = key.confounds_file_name(subject);
        self.confound_tables
            .get(&name)
            .or_else(|| self.confound_tables.get(&format!("{}.gz", name)))
            .cloned()
    }

    fn write_reports(&self, output: &CohortOutput) -> Result<()> {
        fs::create_dir_all(self.output_dir)?;
        let stem = output.key.report_stem();
        let parcels = File::create(self.output_dir.join(format!("{}_parcels.tsv", stem)))?;
        output.write_parcel_report(BufWriter::new(parcels))?;
        let subjects = File::create(self.output_dir.join(format!("{}_subjects.tsv", stem)))?;
        output.write_subject_report(BufWriter::new(subjects))?;
        Ok(())
    }
}


/// Strategy name to regressor patterns, from the HalfPipe `spec.json`. An absent or unreadable
/// file yields no patterns.
fn read_strategies(halfpipe_dir: &Path) -> BTreeMap<String, Vec<String>> {
    let path = halfpipe_dir.join(HALFPIPE_SPEC_FILE);
    if !path.is_file() {
        tracing::warn!(path = %path.display(), "no HalfPipe spec.json, confound regressors unknown");
        return BTreeMap::new();
    }
    read_strategy_confounds(&path).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "HalfPipe spec.json unreadable, confound regressors unknown");
        BTreeMap::new()
    })
}


/// Parcels numbered after the column count of the first readable subject.
fn numbered_atlas(key: &CohortKey, files: &BTreeMap<String, PathBuf>) -> Atlas {
    let num_parcels = files
        .values()
        .find_map(|p| read_matrix(p).ok())
        .map(|m| m.ncols())
        .unwrap_or(0);
    tracing::warn!(cohort = %key, atlas = key.atlas.as_str(), num_parcels, "no label table for atlas, numbering parcels");
    Atlas::numbered(key.atlas.clone(), num_parcels)
}


fn write_dataset_metadata(output_dir: &Path, config: &CleaningConfig) -> Result<()> {
    fs::create_dir_all(output_dir)?;
    write_json(output_dir.join("dataset_description.json"), &sidecar::dataset_description())?;
    for kind in &config.kinds {
        write_json(
            output_dir.join(sidecar::measure_description_name(*kind)),
            &sidecar::measure_description(*kind),
        )?;
    }
    Ok(())
}
