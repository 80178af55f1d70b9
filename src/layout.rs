//! File naming on both sides of the conversion.
//!
//! HalfPipe names its time series like
//! `sub-01_task-rest_run-1_feature-corrMatrix1_atlas-schaefer400_timeseries.tsv`. The entities in
//! such a name determine the subject and the cohort a file belongs to; the same entities,
//! rearranged, name the BIDS outputs.

use std::fmt;
use std::path::{Path, PathBuf};

pub const TIMESERIES_SUFFIX: &str = "_timeseries.tsv";


/// The entities of a HalfPipe time series file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entities {
    pub subject: String,
    pub session: Option<String>,
    pub task: String,
    pub run: Option<String>,
    pub strategy: String,
    pub atlas: String,
}

impl Entities {

    /// Parse the entities of a time series path. The session may also come from a `ses-`
    /// directory. Returns `None` unless subject, task, feature and atlas are all present.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Entities> {
        let path = path.as_ref();
        let file_name = path.file_name()?.to_string_lossy().into_owned();

        let entity = |key: &str| -> Option<String> {
            let prefix = format!("{}-", key);
            file_name
                .split('_')
                .find_map(|token| token.strip_prefix(prefix.as_str()))
                .map(|v| v.split('.').next().unwrap_or(v).to_string())
                .filter(|v| !v.is_empty())
        };

        let session = entity("ses").or_else(|| {
            path.parent()?
                .components()
                .filter_map(|c| c.as_os_str().to_str())
                .find_map(|c| c.strip_prefix("ses-"))
                .map(String::from)
        });

        Some(Entities {
            subject: entity("sub")?,
            session,
            task: entity("task")?,
            run: entity("run"),
            strategy: entity("feature")?,
            atlas: entity("atlas")?,
        })
    }

    pub fn cohort(&self) -> CohortKey {
        CohortKey {
            atlas: self.atlas.clone(),
            strategy: self.strategy.clone(),
            task: self.task.clone(),
            session: self.session.clone(),
            run: self.run.clone(),
        }
    }
}


/// Identifies a cohort: all subjects sharing atlas, strategy, task, session and run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CohortKey {
    pub atlas: String,
    pub strategy: String,
    pub task: String,
    pub session: Option<String>,
    pub run: Option<String>,
}

impl CohortKey {

    /// `task-T[_ses-S][_run-R]_seg-<atlas>_desc-denoise<strategy>`, the stem of dataset-level cohort reports.
    pub fn report_stem(&self) -> String {
        let mut stem = format!("task-{}", self.task);
        push_optional(&mut stem, "ses", &self.session);
        push_optional(&mut stem, "run", &self.run);
        format!("{}_seg-{}_desc-denoise{}", stem, self.atlas, self.strategy)
    }

    /// `sub-X[_ses-S]_task-T[_run-R]_seg-<atlas><nparcels>_desc-denoise<strategy>`, the stem of
    /// every per-subject output.
    pub fn subject_stem(&self, subject: &str, num_parcels: usize) -> String {
        let mut stem = format!("sub-{}", subject);
        push_optional(&mut stem, "ses", &self.session);
        stem.push_str(&format!("_task-{}", self.task));
        push_optional(&mut stem, "run", &self.run);
        format!("{}_seg-{}{}_desc-denoise{}", stem, self.atlas, num_parcels, self.strategy)
    }

    /// `<root>/sub-X[/ses-S]/func`
    pub fn subject_func_dir<P: AsRef<Path>>(&self, root: P, subject: &str) -> PathBuf {
        let mut dir = root.as_ref().join(format!("sub-{}", subject));
        if let Some(session) = &self.session {
            dir.push(format!("ses-{}", session));
        }
        dir.join("func")
    }

    /// File name of the fMRIPrep confound table matching a subject of this cohort.
    pub fn confounds_file_name(&self, subject: &str) -> String {
        let mut name = format!("sub-{}", subject);
        push_optional(&mut name, "ses", &self.session);
        name.push_str(&format!("_task-{}", self.task));
        push_optional(&mut name, "run", &self.run);
        name.push_str("_desc-confounds_timeseries.tsv");
        name
    }

    /// Expected location of the fMRIPrep confound table below a HalfPipe output directory.
    pub fn confounds_path<P: AsRef<Path>>(&self, halfpipe_dir: P, subject: &str) -> PathBuf {
        self.subject_func_dir(halfpipe_dir.as_ref().join("derivatives").join("fmriprep"), subject)
            .join(self.confounds_file_name(subject))
    }
}

impl fmt::Display for CohortKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "atlas-{}_feature-{}_task-{}", self.atlas, self.strategy, self.task)?;
        if let Some(session) = &self.session {
            write!(f, "_ses-{}", session)?;
        }
        if let Some(run) = &self.run {
            write!(f, "_run-{}", run)?;
        }
        Ok(())
    }
}


fn push_optional(stem: &mut String, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        stem.push_str(&format!("_{}-{}", key, value));
    }
}


/// Whether a file name looks like a HalfPipe time series table. fMRIPrep confound tables share
/// the suffix and are excluded.
pub fn is_timeseries_file(file_name: &str) -> bool {
    let suffixed = file_name.ends_with(TIMESERIES_SUFFIX) || file_name.ends_with("_timeseries.tsv.gz");
    suffixed && !file_name.contains("_desc-confounds_")
}


/// The JSON sidecar next to a time series table: same stem, `.json` extension.
pub fn sidecar_path<P: AsRef<Path>>(timeseries: P) -> PathBuf {
    let path = timeseries.as_ref();
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let stem = name
        .strip_suffix(".tsv.gz")
        .or_else(|| name.strip_suffix(".tsv"))
        .unwrap_or(name.as_str());
    path.with_file_name(format!("{}.json", stem))
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn entities_are_parsed_from_halfpipe_names() {
        let e = Entities::from_path(
            "/data/derivatives/halfpipe/sub-10159/func/task-rest/sub-10159_task-rest_feature-corrMatrix1_atlas-schaefer400_timeseries.tsv",
        )
        .unwrap();
        assert_eq!("10159", e.subject);
        assert_eq!("rest", e.task);
        assert_eq!("corrMatrix1", e.strategy);
        assert_eq!("schaefer400", e.atlas);
        assert_eq!(None, e.session);
        assert_eq!(None, e.run);
    }

    #[test]
    fn session_may_come_from_directory() {
        let e = Entities::from_path("/d/sub-01/ses-pre/func/sub-01_task-rest_run-2_feature-a_atlas-b_timeseries.tsv").unwrap();
        assert_eq!(Some(String::from("pre")), e.session);
        assert_eq!(Some(String::from("2")), e.run);
    }

    #[test]
    fn names_without_required_entities_are_rejected() {
        assert_eq!(None, Entities::from_path("sub-01_task-rest_atlas-b_timeseries.tsv"));
        assert_eq!(None, Entities::from_path("task-rest_feature-a_atlas-b_timeseries.tsv"));
    }

    #[test]
    fn output_names_follow_bids_entity_order() {
        let key = CohortKey {
            atlas: String::from("schaefer400"),
            strategy: String::from("corrMatrix1"),
            task: String::from("rest"),
            session: Some(String::from("pre")),
            run: Some(String::from("1")),
        };
        assert_eq!(
            "sub-01_ses-pre_task-rest_run-1_seg-schaefer400432_desc-denoisecorrMatrix1",
            key.subject_stem("01", 432)
        );
        assert_eq!("task-rest_ses-pre_run-1_seg-schaefer400_desc-denoisecorrMatrix1", key.report_stem());
        assert_eq!(PathBuf::from("/out/sub-01/ses-pre/func"), key.subject_func_dir("/out", "01"));
        assert_eq!(
            PathBuf::from("/hp/derivatives/fmriprep/sub-01/ses-pre/func/sub-01_ses-pre_task-rest_run-1_desc-confounds_timeseries.tsv"),
            key.confounds_path("/hp", "01")
        );
        assert_eq!("atlas-schaefer400_feature-corrMatrix1_task-rest_ses-pre_run-1", key.to_string());
    }

    #[test]
    fn sidecars_sit_next_to_the_table() {
        assert_eq!(PathBuf::from("/a/x_timeseries.json"), sidecar_path("/a/x_timeseries.tsv"));
        assert_eq!(PathBuf::from("/a/x_timeseries.json"), sidecar_path("/a/x_timeseries.tsv.gz"));
        assert!(is_timeseries_file("x_timeseries.tsv"));
        assert!(is_timeseries_file("x_timeseries.tsv.gz"));
        assert!(!is_timeseries_file("sub-01_task-rest_desc-confounds_timeseries.tsv"));
        assert!(!is_timeseries_file("x_timeseries.json"));
    }
}
