use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array2;

use halfpipe2bids::connectivity::compute_one;
use halfpipe2bids::{impute, CleaningConfig, CohortCleaningPipeline, CohortKey, ConnectivityKind, Parcel, PostProcess, TimeSeries};

const SAMPLES: usize = 300;
const PARCELS: usize = 400;

fn series(seed: usize) -> TimeSeries {
    let mut data = Array2::from_shape_fn((SAMPLES, PARCELS), |(t, p)| (((t + 1) * (p + seed + 1)) as f64 * 0.013).sin());
    for p in (seed % 7..PARCELS).step_by(37) {
        data.column_mut(p).fill(f64::NAN);
    }
    for t in (0..SAMPLES).step_by(11) {
        data[[t, (t + seed) % PARCELS]] = f64::NAN;
    }
    let labels = (1..=PARCELS).map(|i| i.to_string()).collect();
    TimeSeries::new(labels, data)
}

fn bench_clean(c: &mut Criterion) {
    let one = series(3);
    c.bench_function("impute_detrend_standardize", |b| {
        b.iter(|| impute(black_box(&one), PostProcess::DetrendStandardize))
    });

    let filled = impute(&one, PostProcess::None).series;
    c.bench_function("pearson_correlation", |b| {
        b.iter(|| compute_one(black_box(&filled), ConnectivityKind::Correlation))
    });

    let cohort: Vec<TimeSeries> = (0..16).map(series).collect();
    let parcels: Vec<Parcel> = (1..=PARCELS).map(|i| Parcel::new(i, i.to_string())).collect();
    let key = CohortKey {
        atlas: String::from("schaefer400"),
        strategy: String::from("corrMatrix1"),
        task: String::from("rest"),
        session: None,
        run: None,
    };
    let config = CleaningConfig::default();
    c.bench_function("cohort_16_subjects", |b| {
        b.iter(|| {
            let mut pipeline = CohortCleaningPipeline::new(key.clone(), parcels.clone(), &config);
            for (i, s) in cohort.iter().enumerate() {
                pipeline.collect(&i.to_string(), Ok(s.clone()));
            }
            pipeline.run().unwrap()
        })
    });
}

criterion_group!(benches, bench_clean);
criterion_main!(benches);
