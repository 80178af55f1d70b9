//! Utility functions used in all other halfpipe2bids modules.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::bufread::GzDecoder;
use glob::{glob, Pattern};

use crate::error::{Halfpipe2BidsError, Result};

/// Check whether the file extension ends with ".gz".
pub fn is_gz_file<P>(path: P) -> bool
where
    P: AsRef<Path>,
{
    path.as_ref()
        .file_name()
        .map(|a| a.to_string_lossy().ends_with(".gz"))
        .unwrap_or(false)
}


/// Open a text file for reading, transparently decoding it if the file name ends with ".gz".
///
/// A file that does not exist is reported as [`Halfpipe2BidsError::MissingFile`] so callers can
/// treat it as a soft, per-subject failure.
pub fn open_text<P: AsRef<Path>>(path: P) -> Result<Box<dyn Read>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Halfpipe2BidsError::MissingFile(path.to_path_buf()));
    }
    let file = BufReader::new(File::open(path)?);
    if is_gz_file(path) {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}


/// Recursively collect all files below `root` whose name matches the glob `file_pattern`, e.g.
/// `*_timeseries.tsv*`. The result is sorted.
pub fn find_files<P: AsRef<Path>>(root: P, file_pattern: &str) -> Result<Vec<PathBuf>> {
    let root = Pattern::escape(&root.as_ref().to_string_lossy());
    let pattern = format!("{}/**/{}", root.trim_end_matches('/'), file_pattern);
    let mut found = glob(&pattern)?
        .collect::<std::result::Result<Vec<PathBuf>, _>>()?
        .into_iter()
        .filter(|p| p.is_file())
        .collect::<Vec<PathBuf>>();
    found.sort();
    Ok(found)
}

/// Whether the file name of `path` satisfies `accept`.
pub fn has_name<F: Fn(&str) -> bool>(path: &Path, accept: F) -> bool {
    path.file_name().map(|n| accept(&n.to_string_lossy())).unwrap_or(false)
}


/// Parse one cell of a numeric table. Empty cells and the BIDS `n/a` token are missing values,
/// `nan` is accepted in any case.
pub fn parse_cell(field: &str) -> Option<f64> {
    let field = field.trim();
    if field.is_empty() || field.eq_ignore_ascii_case("n/a") {
        return Some(f64::NAN);
    }
    field.parse::<f64>().ok()
}


/// Format a value for a TSV cell, writing missing values as the literal `nan`.
pub fn format_cell(value: f64) -> String {
    if value.is_nan() {
        String::from("nan")
    } else {
        format!("{}", value)
    }
}


/// Mean of the non-NaN values, `None` if there are none.
pub fn nan_mean<'a, I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a f64>,
{
    let (sum, count) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}
