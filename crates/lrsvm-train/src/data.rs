//! Labelled tables and the per-rank partitions built from them.
//!
//! Files are headerless CSV, one sample per row, the ±1 label in the last
//! column.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use lrsvm_la::{DMat, DVec};

use crate::error::DataError;

/// File holding rank `rank`'s rows inside a partition directory.
pub fn partition_path(dir: impl AsRef<Path>, rank: usize) -> PathBuf {
    dir.as_ref().join(format!("data_part_{rank}.csv"))
}

/// Holdout file for a dataset name: `<dataset>_test.csv`.
pub fn holdout_path(dataset: &str) -> PathBuf {
    PathBuf::from(format!("{dataset}_test.csv"))
}

/// Raw features and labels, as read from a file.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    features: DMat,
    labels: DVec,
}

impl Dataset {
    pub fn new(features: DMat, labels: DVec) -> Result<Self, DataError> {
        if features.nrows() != labels.len() {
            return Err(DataError::LengthMismatch { rows: features.nrows(), labels: labels.len() });
        }
        Ok(Self { features, labels })
    }

    pub fn read_csv(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file, &path.display().to_string())
    }

    /// Parse CSV from any reader. `origin` names the source in errors.
    pub fn from_reader(reader: impl Read, origin: &str) -> Result<Self, DataError> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut width = None;
        let mut rows: Vec<f64> = Vec::new();
        let mut labels = Vec::new();

        for record in csv.records() {
            let record = record.map_err(|source| DataError::Csv {
                origin: origin.to_string(),
                source,
            })?;
            let line = record.position().map_or(0, |p| p.line());
            if record.iter().all(str::is_empty) {
                continue;
            }

            let expected = *width.get_or_insert(record.len());
            if record.len() != expected {
                return Err(DataError::Ragged {
                    origin: origin.to_string(),
                    line,
                    expected,
                    got: record.len(),
                });
            }
            if expected < 2 {
                return Err(DataError::NoFeatures { origin: origin.to_string() });
            }

            for (column, field) in record.iter().enumerate() {
                let value: f64 = field.parse().map_err(|_| DataError::Parse {
                    origin: origin.to_string(),
                    line,
                    column,
                    value: field.to_string(),
                })?;
                if column + 1 == expected {
                    labels.push(value);
                } else {
                    rows.push(value);
                }
            }
        }

        let Some(width) = width else {
            return Err(DataError::Empty { origin: origin.to_string() });
        };

        if let Some((row, &value)) = labels
            .iter()
            .enumerate()
            .find(|(_, &l)| l != 1.0 && l != -1.0)
        {
            return Err(DataError::BadLabel { origin: origin.to_string(), row, value });
        }

        let features = DMat::from_row_slice(labels.len(), width - 1, &rows);
        Self::new(features, DVec::from_vec(labels))
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of feature columns (no bias).
    pub fn dim(&self) -> usize {
        self.features.ncols()
    }

    pub fn features(&self) -> &DMat {
        &self.features
    }

    pub fn labels(&self) -> &DVec {
        &self.labels
    }

    /// Contiguous row blocks, one per rank. The first `len % parts` blocks
    /// get one extra row.
    pub fn split(&self, parts: usize) -> Vec<Dataset> {
        let n = self.len();
        let parts = parts.max(1);
        let (base, extra) = (n / parts, n % parts);
        let mut start = 0;
        (0..parts)
            .map(|p| {
                let len = base + usize::from(p < extra);
                let block = Dataset {
                    features: self.features.rows(start, len),
                    labels: DVec::from_slice(&self.labels.as_slice()[start..start + len]),
                };
                start += len;
                block
            })
            .collect()
    }

    /// Fold in the bias column and sign the rows.
    pub fn into_partition(self) -> Partition {
        Partition::new(self)
    }
}

/// One rank's training rows, ready for the solver.
///
/// `x` carries a trailing column of ones so the bias is learned as an
/// ordinary weight; `x_hat = diag(labels) · x`.
#[derive(Clone, Debug)]
pub struct Partition {
    x: DMat,
    labels: DVec,
    x_hat: DMat,
}

impl Partition {
    pub fn new(data: Dataset) -> Self {
        let n = data.len();
        let x = data.features.hstack(&DMat::filled(n, 1, 1.0));
        let x_hat = x.scale_rows(&data.labels);
        Self { x, labels: data.labels, x_hat }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataError> {
        Ok(Dataset::read_csv(path)?.into_partition())
    }

    /// Rows held by this rank.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Column count including the bias column.
    pub fn dim(&self) -> usize {
        self.x.ncols()
    }

    pub fn x(&self) -> &DMat {
        &self.x
    }

    pub fn labels(&self) -> &DVec {
        &self.labels
    }

    pub fn x_hat(&self) -> &DMat {
        &self.x_hat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Dataset, DataError> {
        Dataset::from_reader(text.as_bytes(), "inline")
    }

    #[test]
    fn last_column_is_label() {
        let ds = parse("1.0, 2.0, 1\n3.5,-4,-1\n").unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.dim(), 2);
        assert_eq!(ds.features().row_vec(1).as_slice(), &[3.5, -4.0]);
        assert_eq!(ds.labels().as_slice(), &[1.0, -1.0]);
    }

    #[test]
    fn partition_appends_bias_and_signs_rows() {
        let p = parse("1,2,1\n3,4,-1\n").unwrap().into_partition();
        assert_eq!(p.dim(), 3);
        assert_eq!(p.x().row_vec(0).as_slice(), &[1.0, 2.0, 1.0]);
        assert_eq!(p.x_hat().row_vec(1).as_slice(), &[-3.0, -4.0, -1.0]);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(parse(""), Err(DataError::Empty { .. })));
        assert!(matches!(parse("1\n-1\n"), Err(DataError::NoFeatures { .. })));
        assert!(matches!(
            parse("1,2,1\n3,1\n"),
            Err(DataError::Ragged { line: 2, expected: 3, got: 2, .. })
        ));
        assert!(matches!(
            parse("1,x,1\n"),
            Err(DataError::Parse { line: 1, column: 1, .. })
        ));
        assert!(matches!(
            parse("1,2,1\n3,4,0\n"),
            Err(DataError::BadLabel { row: 1, value, .. }) if value == 0.0
        ));
    }

    #[test]
    fn split_is_contiguous_and_balanced() {
        let features = DMat::from_fn(7, 1, |i, _| i as f64);
        let labels = DVec::from_fn(7, |i| if i % 2 == 0 { 1.0 } else { -1.0 });
        let ds = Dataset::new(features, labels).unwrap();
        let parts = ds.split(3);
        let sizes: Vec<usize> = parts.iter().map(Dataset::len).collect();
        assert_eq!(sizes, vec![3, 2, 2]);
        assert_eq!(parts[1].features().get(0, 0), 3.0);
        assert_eq!(parts[2].labels()[1], 1.0);
    }

    #[test]
    fn partition_file_names() {
        assert_eq!(partition_path("parts", 2), Path::new("parts").join("data_part_2.csv"));
        assert_eq!(holdout_path("iris"), PathBuf::from("iris_test.csv"));
    }
}
