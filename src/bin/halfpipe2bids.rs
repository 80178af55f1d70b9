use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use halfpipe2bids::{CleaningConfig, ConnectivityKind, PostProcess, SamplingFrequencyUnit, SubjectMissingness};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AnalysisLevel {
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MissingnessArg {
    Entries,
    Parcels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum UnitArg {
    Seconds,
    Hertz,
}

#[derive(Debug, Parser)]
#[command(
    name = "halfpipe2bids",
    version,
    about = "Convert HalfPipe time series into a BIDS connectivity derivative"
)]
struct Cli {
    #[arg(help = "HalfPipe output directory")]
    halfpipe_dir: PathBuf,

    #[arg(help = "Output directory of the BIDS derivative")]
    output_dir: PathBuf,

    #[arg(value_enum, default_value_t = AnalysisLevel::Group)]
    analysis_level: AnalysisLevel,

    #[arg(long, help = "Directory with atlas-<Name>_dseg.tsv label tables")]
    atlas_dir: Option<PathBuf>,

    #[arg(long, default_value_t = false, help = "Drop sparse parcels and impute missing values")]
    impute_nans: bool,

    #[arg(long, requires = "impute_nans", help = "Drop parcels missing in more than this proportion of subjects [default: 0.5]")]
    parcel_threshold: Option<f64>,

    #[arg(long, requires = "impute_nans", help = "Exclude subjects with more missing data than this [default: 0.2]")]
    subject_threshold: Option<f64>,

    #[arg(long, default_value_t = false, conflicts_with = "subject_threshold")]
    no_subject_exclusion: bool,

    #[arg(long, value_enum, default_value_t = MissingnessArg::Entries)]
    subject_missingness: MissingnessArg,

    #[arg(long, default_value_t = false, help = "Skip detrending and z-scoring after imputation")]
    no_detrend_standardize: bool,

    #[arg(long, default_value_t = false, help = "Also write covariance matrices")]
    covariance: bool,

    #[arg(long, value_enum, default_value_t = UnitArg::Seconds, help = "Unit of SamplingFrequency in HalfPipe sidecars")]
    sampling_frequency_unit: UnitArg,

    #[arg(long, help = "Log level or filter, e.g. debug [default: RUST_LOG or info]")]
    verbosity: Option<String>,
}

impl Cli {
    fn cleaning_config(&self) -> CleaningConfig {
        let mut config = if self.impute_nans {
            CleaningConfig::default()
        } else {
            CleaningConfig::passthrough()
        };
        if let Some(t) = self.parcel_threshold {
            config.parcel_threshold = t;
        }
        if let Some(t) = self.subject_threshold {
            config.subject_threshold = Some(t);
        }
        if self.no_subject_exclusion {
            config.subject_threshold = None;
        }
        config.subject_missingness = match self.subject_missingness {
            MissingnessArg::Entries => SubjectMissingness::Entries,
            MissingnessArg::Parcels => SubjectMissingness::Parcels,
        };
        if self.no_detrend_standardize {
            config.post_process = PostProcess::None;
        }
        if self.covariance {
            config.kinds.insert(ConnectivityKind::Covariance);
        }
        config.sampling_frequency_unit = match self.sampling_frequency_unit {
            UnitArg::Seconds => SamplingFrequencyUnit::Seconds,
            UnitArg::Hertz => SamplingFrequencyUnit::Hertz,
        };
        config
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.verbosity {
        Some(level) => EnvFilter::try_new(level).with_context(|| format!("invalid --verbosity '{}'", level))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.cleaning_config();
    config.validate().context("invalid cleaning configuration")?;
    tracing::info!(
        halfpipe_dir = %cli.halfpipe_dir.display(),
        output_dir = %cli.output_dir.display(),
        level = ?cli.analysis_level,
        impute = config.impute,
        "starting conversion"
    );

    let summary = halfpipe2bids::convert(&cli.halfpipe_dir, &cli.output_dir, cli.atlas_dir.as_deref(), &config)
        .with_context(|| format!("converting {}", cli.halfpipe_dir.display()))?;

    println!("{}", summary);
    for (cohort, reason) in &summary.cohorts_failed {
        println!("  failed cohort {}: {}", cohort, reason);
    }
    Ok(())
}
