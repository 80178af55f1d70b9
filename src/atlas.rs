//! Functions for reading atlas label tables.
//!
//! An atlas label table is a headerless TSV file named `atlas-<Name>_dseg.tsv` with the parcel
//! index in the first column and the parcel label in the second. The parcel order of the table
//! is the column order of every time series extracted with that atlas.
//!
//! Label tables carry no coordinates. [`CoordinateProvider`] and [`Atlas::with_coordinates`] are
//! a library-only seam for callers that compute parcel centroids themselves, e.g. from an atlas
//! volume; the converter neither reads nor writes centroids.

use csv::ReaderBuilder;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use crate::error::{Halfpipe2BidsError, Result};
use crate::timeseries::Parcel;
use crate::util::{find_files, has_name, open_text};


/// Supplies anatomical centroid coordinates for parcels, e.g. computed from an atlas volume.
pub trait CoordinateProvider {
    fn centroid(&self, parcel: &Parcel) -> Option<[f64; 3]>;
}

impl CoordinateProvider for HashMap<String, [f64; 3]> {
    fn centroid(&self, parcel: &Parcel) -> Option<[f64; 3]> {
        self.get(&parcel.label).copied()
    }
}


/// An ordered list of parcels, named after the atlas it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Atlas {
    pub name: String,
    pub parcels: Vec<Parcel>,
}

impl Atlas {

    /// Read an atlas label table. The atlas name is derived from the file name.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Atlas> {
        let path = path.as_ref();
        let name = atlas_name_from_path(path).unwrap_or_default();

        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(open_text(path)?);

        let mut parcels = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record = result?;
            let index = record.get(0).and_then(|v| v.trim().parse::<usize>().ok());
            let label = record.get(1).map(|v| v.trim().to_string());
            match (index, label) {
                (Some(index), Some(label)) => parcels.push(Parcel::new(index, label)),
                _ => {
                    return Err(Halfpipe2BidsError::InvalidAtlas(
                        path.to_path_buf(),
                        format!("atlas row {} needs an integer index and a label", row),
                    ))
                }
            }
        }
        Ok(Atlas { name, parcels })
    }


    /// An atlas without a label table: parcels are labeled `1..=n` in column order.
    pub fn numbered<S: Into<String>>(name: S, num_parcels: usize) -> Atlas {
        Atlas {
            name: name.into(),
            parcels: (1..=num_parcels).map(|i| Parcel::new(i, i.to_string())).collect(),
        }
    }

    pub fn labels(&self) -> Vec<String> {
        self.parcels.iter().map(|p| p.label.clone()).collect()
    }

    pub fn num_parcels(&self) -> usize {
        self.parcels.len()
    }

    /// Attach centroids from the given provider to every parcel it knows.
    pub fn with_coordinates(mut self, provider: &dyn CoordinateProvider) -> Atlas {
        for parcel in self.parcels.iter_mut() {
            parcel.centroid = provider.centroid(parcel);
        }
        self
    }
}

impl fmt::Display for Atlas {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Atlas '{}' with {} parcels.", self.name, self.parcels.len())
    }
}


/// Extract the atlas name from a label table path, e.g. `Schaefer2018Combined` from
/// `atlas-Schaefer2018Combined_dseg.tsv`.
pub fn atlas_name_from_path<P: AsRef<Path>>(path: P) -> Option<String> {
    let file_name = path.as_ref().file_name()?.to_string_lossy().into_owned();
    let rest = file_name.strip_prefix("atlas-")?;
    let end = rest.find(|c: char| c == '_' || c == '.').unwrap_or_else(|| rest.len());
    if end == 0 {
        None
    } else {
        Some(rest[..end].to_string())
    }
}


/// Read all `atlas-*.tsv` label tables in a directory, keyed by atlas name. Empty tables are skipped.
pub fn read_atlases<P: AsRef<Path>>(atlas_dir: P) -> Result<BTreeMap<String, Atlas>> {
    let atlas_dir = atlas_dir.as_ref();
    if !atlas_dir.is_dir() {
        return Err(Halfpipe2BidsError::InvalidAtlas(atlas_dir.to_path_buf(), String::from("not a directory")));
    }
    let files = find_files(atlas_dir, "atlas-*.tsv*")?
        .into_iter()
        .filter(|f| has_name(f, |name| name.ends_with(".tsv") || name.ends_with(".tsv.gz")));

    let mut atlases = BTreeMap::new();
    for file in files {
        tracing::debug!(path = %file.display(), "reading atlas label table");
        let atlas = Atlas::from_file(&file)?;
        if atlas.num_parcels() > 0 {
            atlases.insert(atlas.name.clone(), atlas);
        }
    }
    Ok(atlases)
}
