use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use halfpipe2bids::{convert, CleaningConfig, ConnectivityKind};

const SAMPLES: usize = 8;
const SPEC_JSON: &str = r#"{
    "settings": [{"name": "corrMatrix1Setting", "confounds_removal": ["trans_[xyz]", "global_signal"]}],
    "features": [{"name": "corrMatrix1", "type": "atlas_based_connectivity", "setting": "corrMatrix1Setting"}]
}"#;
const CONFOUNDS: &str = "global_signal\tframewise_displacement\ttrans_x\ttrans_x_derivative1\tmotion_outlier00\n\
                         1.0\tn/a\t0.1\tn/a\t0\n\
                         2.0\t0.2\t0.2\t0.1\t1\n\
                         3.0\t0.6\t0.1\t-0.1\t0\n";

fn write(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A headerless time series with three parcels, optionally without signal in the third.
fn timeseries(seed: usize, lose_third: bool) -> String {
    let mut tsv = String::new();
    for t in 0..SAMPLES {
        let row: Vec<String> = (0..3)
            .map(|p| {
                if lose_third && p == 2 {
                    String::from("nan")
                } else {
                    format!("{}", ((t * (p + 2) + seed) as f64 * 0.37).sin())
                }
            })
            .collect();
        tsv.push_str(&row.join("\t"));
        tsv.push('\n');
    }
    tsv
}

fn gzip(content: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

/// HalfPipe directory with subjects 01-03 in task `rest` and subject 04 in task `other` only.
fn fixture(root: &Path) -> (PathBuf, PathBuf) {
    let hp = root.join("halfpipe");
    let atlas_dir = root.join("atlases");
    write(&hp.join("spec.json"), SPEC_JSON.as_bytes());
    write(&atlas_dir.join("atlas-tiny_dseg.tsv"), b"1\tVis_1\n2\tVis_2\n3\tLimbic_1\n");

    let func = |sub: &str, task: &str| hp.join("derivatives").join("halfpipe").join(format!("sub-{}", sub)).join("func").join(format!("task-{}", task));
    let stem = |sub: &str, task: &str| format!("sub-{}_task-{}_feature-corrMatrix1_atlas-tiny", sub, task);

    for (sub, lose) in &[("01", false), ("02", true), ("03", true)] {
        let dir = func(sub, "rest");
        let data = timeseries(sub.parse().unwrap(), *lose);
        if *sub == "03" {
            write(&dir.join(format!("{}_timeseries.tsv.gz", stem(sub, "rest"))), &gzip(&data));
        } else {
            write(&dir.join(format!("{}_timeseries.tsv", stem(sub, "rest"))), data.as_bytes());
        }
        write(&dir.join(format!("{}_timeseries.json", stem(sub, "rest"))), br#"{"SamplingFrequency": 2.0}"#);
    }
    let dir = func("04", "other");
    write(&dir.join(format!("{}_timeseries.tsv", stem("04", "other"))), timeseries(4, false).as_bytes());

    write(
        &hp.join("derivatives/fmriprep/sub-01/func/sub-01_task-rest_desc-confounds_timeseries.tsv"),
        CONFOUNDS.as_bytes(),
    );
    (hp, atlas_dir)
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn a_halfpipe_directory_can_be_converted() {
    let tmp = tempfile::tempdir().unwrap();
    let (hp, atlas_dir) = fixture(tmp.path());
    let out = tmp.path().join("bids");

    let mut config = CleaningConfig::default();
    config.kinds.insert(ConnectivityKind::Covariance);
    let summary = convert(&hp, &out, Some(&atlas_dir), &config).unwrap();

    assert_eq!(2, summary.cohorts_processed);
    assert!(summary.cohorts_failed.is_empty());
    assert_eq!(4, summary.subjects_written);

    assert_eq!("derivative", read_json(&out.join("dataset_description.json"))["DatasetType"]);
    assert!(out.join("meas-PearsonCorrelation_relmat.json").is_file());
    assert!(out.join("meas-Covariance_relmat.json").is_file());

    // Limbic_1 has no signal in 2 of 3 subjects and is dropped, leaving two parcels
    let func = out.join("sub-01").join("func");
    let base = "sub-01_task-rest_seg-tiny2_desc-denoisecorrMatrix1";
    let series = fs::read_to_string(func.join(format!("{}_timeseries.tsv", base))).unwrap();
    assert_eq!(SAMPLES, series.lines().count());
    assert!(series.lines().all(|l| l.split('\t').count() == 2));

    let relmat = fs::read_to_string(func.join(format!("{}_meas-PearsonCorrelation_relmat.tsv", base))).unwrap();
    let mut lines = relmat.lines();
    assert_eq!(Some("0\t1"), lines.next());
    assert_eq!(2, lines.count());
    assert!(func.join(format!("{}_meas-Covariance_relmat.tsv", base)).is_file());

    let sidecar = read_json(&func.join(format!("{}_timeseries.json", base)));
    assert_eq!(0.5, sidecar["SamplingFrequency"]);
    assert_eq!(serde_json::json!(["global_signal", "trans_x"]), sidecar["ConfoundRegressors"]);
    assert_eq!(1, sidecar["NumberOfVolumesDiscardedByMotionScrubbing"]);
    assert_eq!(0.6, sidecar["MaxFramewiseDisplacement"]);

    // no confound table for 02: the strategy's patterns are reported as they are
    let sidecar = read_json(
        &out.join("sub-02/func/sub-02_task-rest_seg-tiny2_desc-denoisecorrMatrix1_timeseries.json"),
    );
    assert_eq!(serde_json::json!(["trans_[xyz]", "global_signal"]), sidecar["ConfoundRegressors"]);
    assert!(sidecar["NumberOfVolumesDiscardedByMotionScrubbing"].is_null());

    // gzipped input, sidecar found next to it
    assert!(out.join("sub-03/func/sub-03_task-rest_seg-tiny2_desc-denoisecorrMatrix1_timeseries.tsv").is_file());

    // cohort with all three parcels kept
    assert!(out.join("sub-04/func/sub-04_task-other_seg-tiny3_desc-denoisecorrMatrix1_timeseries.tsv").is_file());
}

#[test]
fn cohort_reports_list_parcels_and_subjects() {
    let tmp = tempfile::tempdir().unwrap();
    let (hp, atlas_dir) = fixture(tmp.path());
    let out = tmp.path().join("bids");
    convert(&hp, &out, Some(&atlas_dir), &CleaningConfig::default()).unwrap();

    let parcels = fs::read_to_string(out.join("task-rest_seg-tiny_desc-denoisecorrMatrix1_parcels.tsv")).unwrap();
    let rows: Vec<Vec<&str>> = parcels.lines().map(|l| l.split('\t').collect()).collect();
    assert_eq!(vec!["index", "label", "na_ratio", "status"], rows[0]);
    assert_eq!(vec!["1", "Vis_1", "0", "kept"], rows[1]);
    assert_eq!("Limbic_1", rows[3][1]);
    assert_eq!("dropped", rows[3][3]);

    let subjects = fs::read_to_string(out.join("task-rest_seg-tiny_desc-denoisecorrMatrix1_subjects.tsv")).unwrap();
    assert!(subjects.lines().any(|l| l == "01\t0\tkept"));
    assert!(subjects.lines().any(|l| l == "04\tn/a\tnot_found"));

    let other = fs::read_to_string(out.join("task-other_seg-tiny_desc-denoisecorrMatrix1_subjects.tsv")).unwrap();
    assert_eq!(5, other.lines().count());
}

#[test]
fn parcels_are_numbered_without_a_label_table() {
    let tmp = tempfile::tempdir().unwrap();
    let (hp, _) = fixture(tmp.path());
    let out = tmp.path().join("bids");
    convert(&hp, &out, None, &CleaningConfig::passthrough()).unwrap();

    let parcels = fs::read_to_string(out.join("task-rest_seg-tiny_desc-denoisecorrMatrix1_parcels.tsv")).unwrap();
    assert!(parcels.lines().any(|l| l.starts_with("3\t3\t")));
    // nothing is dropped without cleaning
    assert!(out.join("sub-02/func/sub-02_task-rest_seg-tiny3_desc-denoisecorrMatrix1_timeseries.tsv").is_file());
}

#[test]
fn mismatching_column_counts_fail_only_the_subject() {
    let tmp = tempfile::tempdir().unwrap();
    let (hp, atlas_dir) = fixture(tmp.path());
    write(
        &hp.join("derivatives/halfpipe/sub-02/func/task-rest/sub-02_task-rest_feature-corrMatrix1_atlas-tiny_timeseries.tsv"),
        b"1\t2\n3\t4\n",
    );
    let out = tmp.path().join("bids");
    let summary = convert(&hp, &out, Some(&atlas_dir), &CleaningConfig::default()).unwrap();

    assert_eq!(2, summary.cohorts_processed);
    let subjects = fs::read_to_string(out.join("task-rest_seg-tiny_desc-denoisecorrMatrix1_subjects.tsv")).unwrap();
    assert!(subjects.lines().any(|l| l == "02\tn/a\tfailed"));
    assert!(!out.join("sub-02").exists());
}

#[test]
fn confound_tables_are_found_outside_the_fmriprep_layout() {
    let tmp = tempfile::tempdir().unwrap();
    let (hp, atlas_dir) = fixture(tmp.path());
    write(
        &hp.join("derivatives/confounds-moved/sub-02_task-rest_desc-confounds_timeseries.tsv"),
        CONFOUNDS.as_bytes(),
    );
    let out = tmp.path().join("bids");
    convert(&hp, &out, Some(&atlas_dir), &CleaningConfig::default()).unwrap();

    let sidecar = read_json(
        &out.join("sub-02/func/sub-02_task-rest_seg-tiny2_desc-denoisecorrMatrix1_timeseries.json"),
    );
    assert_eq!(serde_json::json!(["global_signal", "trans_x"]), sidecar["ConfoundRegressors"]);
    assert_eq!(1, sidecar["NumberOfVolumesDiscardedByMotionScrubbing"]);
}
