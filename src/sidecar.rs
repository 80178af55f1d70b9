//! JSON metadata: HalfPipe sidecars and `spec.json` on the input side, BIDS sidecars and
//! dataset-level descriptions on the output side.

use serde::{Deserialize, Serialize};
use serde_json::json;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use crate::connectivity::ConnectivityKind;
use crate::error::Result;
use crate::util::open_text;

pub const CODE_URL: &str = "https://github.com/pbergeret12/HalfPipe2Bids";
pub const BIDS_VERSION: &str = "1.9.0";


/// Unit of the `SamplingFrequency` value found in HalfPipe time series sidecars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingFrequencyUnit {
    /// Seconds per sample (the repetition time); inverted to obtain Hz.
    Seconds,
    /// Already in Hz.
    Hertz,
}

impl Default for SamplingFrequencyUnit {
    fn default() -> Self {
        SamplingFrequencyUnit::Seconds
    }
}

impl SamplingFrequencyUnit {

    /// Convert a sidecar value to Hz. Non-positive or non-finite values have no frequency.
    pub fn to_hertz(&self, value: f64) -> Option<f64> {
        if !value.is_finite() || value <= 0.0 {
            return None;
        }
        match self {
            SamplingFrequencyUnit::Seconds => Some(1.0 / value),
            SamplingFrequencyUnit::Hertz => Some(value),
        }
    }
}


#[derive(Debug, Clone, Default, Deserialize)]
struct TimeSeriesSidecar {
    #[serde(rename = "SamplingFrequency")]
    sampling_frequency: Option<f64>,
}


/// Read the raw `SamplingFrequency` of a HalfPipe time series sidecar, in the unit HalfPipe wrote it.
pub fn read_sampling_frequency<P: AsRef<Path>>(path: P) -> Result<Option<f64>> {
    let sidecar: TimeSeriesSidecar = serde_json::from_reader(open_text(path)?)?;
    Ok(sidecar.sampling_frequency)
}


#[derive(Debug, Clone, Default, Deserialize)]
struct HalfpipeSpec {
    #[serde(default)]
    settings: Vec<Setting>,
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Setting {
    name: String,
    #[serde(default)]
    confounds_removal: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Feature {
    name: String,
    #[serde(default)]
    setting: Option<String>,
}


/// Read a HalfPipe `spec.json` and map every feature (denoising strategy) to the regressor
/// patterns removed by its setting. Features without a known setting map to no regressors.
pub fn read_strategy_confounds<P: AsRef<Path>>(path: P) -> Result<BTreeMap<String, Vec<String>>> {
    let spec: HalfpipeSpec = serde_json::from_reader(open_text(path)?)?;
    Ok(strategy_confounds(&spec))
}

fn strategy_confounds(spec: &HalfpipeSpec) -> BTreeMap<String, Vec<String>> {
    let by_setting: BTreeMap<&str, &Vec<String>> = spec
        .settings
        .iter()
        .map(|s| (s.name.as_str(), &s.confounds_removal))
        .collect();

    spec.features
        .iter()
        .map(|f| {
            let confounds = f
                .setting
                .as_deref()
                .and_then(|s| by_setting.get(s))
                .map(|c| c.to_vec())
                .unwrap_or_default();
            (f.name.clone(), confounds)
        })
        .collect()
}


/// Write a value as pretty-printed JSON, creating parent directories as needed.
pub fn write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    serde_json::to_writer_pretty(BufWriter::new(File::create(path)?), value)?;
    Ok(())
}


/// The BIDS `dataset_description.json` of the derivative dataset.
pub fn dataset_description() -> serde_json::Value {
    json!({
        "BIDSVersion": BIDS_VERSION,
        "License": null,
        "Name": null,
        "ReferencesAndLinks": [],
        "DatasetDOI": null,
        "DatasetType": "derivative",
        "GeneratedBy": [
            {
                "Name": "halfpipe2bids",
                "Version": env!("CARGO_PKG_VERSION"),
                "CodeURL": CODE_URL,
            }
        ],
        "HowToAcknowledge": format!("Please refer to our repository: {}", CODE_URL),
    })
}


/// Dataset-level sidecar describing all `_meas-<kind>_relmat.tsv` files.
pub fn measure_description(kind: ConnectivityKind) -> serde_json::Value {
    json!({
        "Measure": kind.description(),
        "MeasureDescription": kind.description(),
        "Weighted": false,
        "Directed": false,
        "ValidDiagonal": true,
        "StorageFormat": "Full",
        "NonNegative": "",
        "Code": CODE_URL,
    })
}


/// File name of the dataset-level sidecar for a measure.
pub fn measure_description_name(kind: ConnectivityKind) -> String {
    format!("meas-{}_relmat.json", kind.measure())
}
