use quick_error::quick_error;
use std::io::Error as IOError;
use std::path::PathBuf;

quick_error! {
    /// Error type for all error variants originated by this crate.
    #[derive(Debug)]
    pub enum Halfpipe2BidsError {
        /// No subject time series could be ingested for a cohort.
        EmptyCohort(cohort: String) {
            display("No subjects available for cohort {}", cohort)
        }

        /// A cohort pipeline asked to run from a state other than collecting.
        InvalidStateTransition(cohort: String, state: String) {
            display("Cohort {} cannot run again from state {}", cohort, state)
        }

        /// A threshold outside of the closed interval [0, 1].
        InvalidThreshold(name: &'static str, value: f64) {
            display("Invalid {} threshold {}: must lie within [0, 1]", name, value)
        }

        MissingFile(path: PathBuf) {
            display("Missing file: {}", path.display())
        }

        /// Confound table without the columns needed for the motion summary.
        MalformedConfoundTable(path: PathBuf, reason: String) {
            display("Malformed confound table {}: {}", path.display(), reason)
        }

        /// Time series whose column count does not match the atlas.
        ParcelCountMismatch(path: PathBuf, expected: usize, found: usize) {
            display("Time series {} has {} columns, the atlas defines {} parcels", path.display(), found, expected)
        }

        InvalidTimeSeries(path: PathBuf, reason: String) {
            display("Invalid time series file {}: {}", path.display(), reason)
        }

        /// Atlas label table with a row that is not `index<TAB>label`.
        InvalidAtlas(path: PathBuf, reason: String) {
            display("Invalid atlas label table {}: {}", path.display(), reason)
        }

        InvalidHalfpipeDir(path: PathBuf, reason: String) {
            display("Invalid HalfPipe output directory {}: {}", path.display(), reason)
        }

        /// I/O Error
        Io(err: IOError) {
            display("I/O error: {}", err)
            from()
            source(err)
        }

        Csv(err: csv::Error) {
            display("TSV error: {}", err)
            from()
            source(err)
        }

        Json(err: serde_json::Error) {
            display("JSON error: {}", err)
            from()
            source(err)
        }

        Pattern(err: glob::PatternError) {
            display("Invalid file pattern: {}", err)
            from()
            source(err)
        }

        /// Directory entry that could not be read during discovery.
        Glob(err: glob::GlobError) {
            display("File discovery error: {}", err)
            from()
            source(err)
        }

        /// Confound pattern that is not a valid regular expression.
        Regex(err: regex::Error) {
            display("Invalid regressor pattern: {}", err)
            from()
            source(err)
        }
    }
}

/// Alias type for results originated from this crate.
pub type Result<T> = ::std::result::Result<T, Halfpipe2BidsError>;
