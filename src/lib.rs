//! Conversion of HalfPipe regional time series into a BIDS-style connectivity derivative.
//!
//! The focus of this package is the handling of parcels without signal: parcels missing in too
//! many subjects of a cohort are dropped for the whole cohort, remaining gaps are imputed from
//! the row mean, and connectivity matrices are recomputed from the cleaned series.

pub mod atlas;
pub mod config;
pub mod confounds;
pub mod connectivity;
pub mod convert;
pub mod coverage;
pub mod error;
pub mod impute;
pub mod layout;
pub mod pipeline;
pub mod sidecar;
pub mod timeseries;
pub mod util;

pub use atlas::{Atlas, CoordinateProvider};
pub use config::{CleaningConfig, SubjectMissingness};
pub use confounds::{regex_to_regressor, ConfoundTable, SubjectReport};
pub use connectivity::{ConnectivityKind, ConnectivityMatrix};
pub use convert::{convert, RunSummary};
pub use coverage::{compute_coverage, partition, CohortCoverage, ParcelPartition};
pub use error::{Halfpipe2BidsError, Result};
pub use impute::{impute, PostProcess};
pub use layout::CohortKey;
pub use pipeline::{CohortCleaningPipeline, CohortOutput, CohortState};
pub use sidecar::SamplingFrequencyUnit;
pub use timeseries::{Parcel, TimeSeries};
