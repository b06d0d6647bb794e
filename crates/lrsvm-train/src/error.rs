//! Error types for lrsvm-train.

use std::fmt;
use std::io;
use std::path::PathBuf;

use lrsvm_mesh::MeshError;

/// Problems reading or validating a labelled CSV table.
#[derive(Debug)]
pub enum DataError {
    /// The file could not be opened.
    Io { path: PathBuf, source: io::Error },
    /// The CSV reader itself failed.
    Csv { origin: String, source: csv::Error },
    /// A field is not a decimal number.
    Parse { origin: String, line: u64, column: usize, value: String },
    /// A row with a different number of fields than the first row.
    Ragged { origin: String, line: u64, expected: usize, got: usize },
    /// No rows.
    Empty { origin: String },
    /// Only a label column.
    NoFeatures { origin: String },
    /// A label other than −1 or +1.
    BadLabel { origin: String, row: usize, value: f64 },
    /// Feature rows and labels disagree in count.
    LengthMismatch { rows: usize, labels: usize },
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "cannot read {}: {source}", path.display()),
            Self::Csv { origin, source } => write!(f, "{origin}: {source}"),
            Self::Parse { origin, line, column, value } => {
                write!(f, "{origin}:{line}: column {column} is not a number: {value:?}")
            }
            Self::Ragged { origin, line, expected, got } => {
                write!(f, "{origin}:{line}: expected {expected} fields, found {got}")
            }
            Self::Empty { origin } => write!(f, "{origin}: no rows"),
            Self::NoFeatures { origin } => write!(f, "{origin}: no feature columns before the label"),
            Self::BadLabel { origin, row, value } => {
                write!(f, "{origin}: row {row} has label {value}, expected -1 or 1")
            }
            Self::LengthMismatch { rows, labels } => {
                write!(f, "{rows} feature rows but {labels} labels")
            }
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors surfaced by a training run.
#[derive(Debug)]
pub enum TrainError {
    Data(DataError),
    Mesh(MeshError),
    /// The report file could not be written.
    Report { path: PathBuf, source: io::Error },
    /// This rank's partition has a different width than the coordinator's.
    DimensionMismatch { rank: usize, expected: usize, got: usize },
    /// The coordinator's holdout has a different width than the training data.
    HoldoutDimensionMismatch { expected: usize, got: usize },
    /// Another rank failed a check made before training starts.
    PeerFailed { ranks: usize },
}

impl fmt::Display for TrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(e) => write!(f, "data error: {e}"),
            Self::Mesh(e) => write!(f, "mesh error: {e}"),
            Self::Report { path, source } => {
                write!(f, "cannot write report {}: {source}", path.display())
            }
            Self::DimensionMismatch { rank, expected, got } => write!(
                f,
                "rank {rank} has {got} columns (bias included), coordinator has {expected}"
            ),
            Self::HoldoutDimensionMismatch { expected, got } => write!(
                f,
                "holdout has {got} columns (bias included), training data has {expected}"
            ),
            Self::PeerFailed { ranks } => {
                write!(f, "{ranks} rank(s) failed the checks before training")
            }
        }
    }
}

impl std::error::Error for TrainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Data(e) => Some(e),
            Self::Mesh(e) => Some(e),
            Self::Report { source, .. } => Some(source),
            Self::DimensionMismatch { .. }
            | Self::HoldoutDimensionMismatch { .. }
            | Self::PeerFailed { .. } => None,
        }
    }
}

impl From<DataError> for TrainError {
    fn from(e: DataError) -> Self {
        Self::Data(e)
    }
}

impl From<MeshError> for TrainError {
    fn from(e: MeshError) -> Self {
        Self::Mesh(e)
    }
}
