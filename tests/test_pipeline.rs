use approx::assert_abs_diff_eq;
use ndarray::Array2;

use halfpipe2bids::{
    CleaningConfig, CohortCleaningPipeline, CohortKey, CohortState, ConnectivityKind, Parcel, PostProcess,
    SubjectMissingness, TimeSeries,
};

const SAMPLES: usize = 20;

fn parcels() -> Vec<Parcel> {
    vec![
        Parcel::new(1, "Vis_1"),
        Parcel::new(2, "Vis_2"),
        Parcel::new(3, "Limbic_1"),
        Parcel::new(4, "Default_1"),
    ]
}

fn labels() -> Vec<String> {
    parcels().into_iter().map(|p| p.label).collect()
}

fn key() -> CohortKey {
    CohortKey {
        atlas: String::from("tiny"),
        strategy: String::from("corrMatrix1"),
        task: String::from("rest"),
        session: None,
        run: Some(String::from("1")),
    }
}

/// Smooth, parcel-specific signal without missing values.
fn signal(seed: usize) -> Array2<f64> {
    Array2::from_shape_fn((SAMPLES, 4), |(t, p)| {
        let t = t as f64;
        let f = 0.3 + 0.17 * (p + seed) as f64;
        (f * t).sin() + 0.05 * t * (p as f64 + 1.0) + seed as f64
    })
}

/// Five subjects:
///  * `01`..`03` have no signal in `Limbic_1` (3 of 5, above the parcel threshold),
///  * `04` lacks half the samples of `Vis_2`,
///  * `05` has no signal in `Vis_1` (a third of its kept cells, above the subject threshold).
fn cohort() -> Vec<(String, TimeSeries)> {
    let mut subjects = Vec::new();
    for s in 1..=5 {
        let mut data = signal(s);
        match s {
            1 | 2 | 3 => data.column_mut(2).fill(f64::NAN),
            4 => {
                for t in 0..SAMPLES / 2 {
                    data[[t * 2, 1]] = f64::NAN;
                }
            }
            _ => data.column_mut(0).fill(f64::NAN),
        }
        subjects.push((format!("{:02}", s), TimeSeries::new(labels(), data)));
    }
    subjects
}

fn run(config: &CleaningConfig) -> halfpipe2bids::CohortOutput {
    let mut pipeline = CohortCleaningPipeline::new(key(), parcels(), config);
    for (subject, series) in cohort() {
        pipeline.collect(&subject, Ok(series));
    }
    pipeline.mark_not_found("06");
    let output = pipeline.run().unwrap();
    assert_eq!(CohortState::Done, pipeline.state());
    output
}

#[test]
fn sparse_parcels_are_dropped_and_sparse_subjects_excluded() {
    let config = CleaningConfig {
        post_process: PostProcess::None,
        ..CleaningConfig::default()
    };
    let out = run(&config);

    assert_abs_diff_eq!(0.6, out.coverage.proportion_of("Limbic_1").unwrap(), epsilon = 1e-12);
    assert_abs_diff_eq!(0.2, out.coverage.proportion_of("Vis_1").unwrap(), epsilon = 1e-12);
    assert_eq!(0.0, out.coverage.proportion_of("Vis_2").unwrap());
    assert_eq!(vec!["Limbic_1"], out.partition.dropped.iter().map(|p| p.label.as_str()).collect::<Vec<&str>>());

    let kept = vec![String::from("Vis_1"), String::from("Vis_2"), String::from("Default_1")];
    assert_eq!(kept, out.partition.kept_labels());

    assert_eq!(vec!["01", "02", "03", "04"], out.subjects.keys().map(|s| s.as_str()).collect::<Vec<&str>>());
    assert_abs_diff_eq!(1.0 / 3.0, out.excluded["05"], epsilon = 1e-12);
    assert_eq!(vec!["06"], out.not_found);
    assert!(out.failed.is_empty());

    for subject in out.subjects.values() {
        assert_eq!(kept, subject.series.labels);
        assert_eq!(0, subject.series.missing_count());
        let corr = &subject.connectivity[&ConnectivityKind::Correlation];
        assert_eq!(kept, corr.labels);
        for i in 0..corr.size() {
            assert_eq!(1.0, corr.values[[i, i]]);
            for j in 0..corr.size() {
                assert_eq!(corr.values[[i, j]], corr.values[[j, i]]);
            }
        }
    }
}

#[test]
fn missing_samples_are_filled_with_the_row_mean() {
    let config = CleaningConfig {
        post_process: PostProcess::None,
        ..CleaningConfig::default()
    };
    let out = run(&config);

    let raw = signal(4);
    let cleaned = &out.subjects["04"];
    assert_eq!(SAMPLES / 2, cleaned.imputed);
    assert_abs_diff_eq!(0.5 / 3.0, cleaned.na_ratio, epsilon = 1e-12);
    for t in 0..SAMPLES {
        let expected = if t % 2 == 0 { (raw[[t, 0]] + raw[[t, 3]]) / 2.0 } else { raw[[t, 1]] };
        assert_abs_diff_eq!(expected, cleaned.series.data[[t, 1]], epsilon = 1e-12);
    }
}

#[test]
fn cleaned_series_are_detrended_and_standardized_by_default() {
    let out = run(&CleaningConfig::default());

    for subject in out.subjects.values() {
        for col in subject.series.data.axis_iter(ndarray::Axis(1)) {
            let n = col.len() as f64;
            let mean = col.sum() / n;
            let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            assert_abs_diff_eq!(0.0, mean, epsilon = 1e-9);
            assert_abs_diff_eq!(1.0, var, epsilon = 1e-9);
        }
        let cov = subject.connectivity.get(&ConnectivityKind::Covariance);
        assert!(cov.is_none());
    }
}

#[test]
fn parcel_measure_excludes_partially_missing_subjects() {
    let config = CleaningConfig {
        subject_missingness: SubjectMissingness::Parcels,
        ..CleaningConfig::default()
    };
    let out = run(&config);

    // 04 has one of three kept parcels affected
    assert!(out.excluded.contains_key("04"));
    assert!(out.excluded.contains_key("05"));
    assert_eq!(3, out.subjects.len());
}

#[test]
fn disabled_subject_filter_keeps_everyone() {
    let mut config = CleaningConfig::default();
    config.subject_threshold = None;
    config.kinds.insert(ConnectivityKind::Covariance);
    let out = run(&config);

    assert_eq!(5, out.subjects.len());
    assert!(out.excluded.is_empty());
    let five = &out.subjects["05"];
    assert_eq!(2, five.connectivity.len());
    // Vis_1 has no signal at all; filled from the other parcels it is no longer missing
    assert_eq!(0, five.series.missing_count());
}

#[test]
fn passthrough_keeps_all_parcels_and_missing_values() {
    let out = run(&CleaningConfig::passthrough());

    assert!(out.partition.dropped.is_empty());
    assert_eq!(5, out.subjects.len());
    let first = &out.subjects["01"];
    assert_eq!(labels(), first.series.labels);
    assert!(first.series.column_is_missing(2));
    let corr = &first.connectivity[&ConnectivityKind::Correlation];
    assert!(corr.get("Limbic_1", "Vis_1").unwrap().is_nan());
    assert!(!corr.get("Vis_1", "Vis_2").unwrap().is_nan());
}
