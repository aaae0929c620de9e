//! Structured on-disk records for piecewise bases and engine state
//!
//! A basis file is one [`BasisFileRecord`]: the interval count followed by an
//! ordered sequence of per-interval records. Each process writes its own file,
//! suffixed with its zero-padded rank (see [`rank_file_name`]).
//!
//! Two encodings of the same records are supported:
//! - [`DatabaseFormat::Binary`]: `bincode`, values round-trip bit-exactly
//! - [`DatabaseFormat::Json`]: `serde_json`, human-readable

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use nalgebra::DMatrix;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::linalg::to_row_major;

/// Error types for basis and state persistence
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Binary encoding error on {path}: {source}")]
    Binary {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },
    #[error("JSON encoding error on {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Interval count encoding mismatch: expected {expected}, found {found}")]
    CountEncoding {
        expected: &'static str,
        found: &'static str,
    },
    #[error("Invalid interval count {0}")]
    InvalidCount(f64),
    #[error("Interval count {declared} does not match {actual} interval records")]
    CountMismatch { declared: usize, actual: usize },
    #[error("Matrix record {name} declares {rows}x{cols} but holds {len} values")]
    ShapeMismatch {
        name: String,
        rows: usize,
        cols: usize,
        len: usize,
    },
    #[error("Interval start times are not strictly increasing at interval {0}")]
    UnorderedStartTimes(usize),
    #[error("Interval {index} has non-finite start time {start_time}")]
    NonFiniteStartTime { index: usize, start_time: f64 },
    #[error("Matrix record {name} has invalid extent {extent}")]
    InvalidExtent { name: String, extent: f64 },
}

/// On-disk encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseFormat {
    #[default]
    Binary,
    Json,
}

/// Build the per-rank file name: `base.000042`
pub fn rank_file_name(base_file_name: &str, rank: usize) -> String {
    format!("{}.{:06}", base_file_name, rank)
}

/// Interval count as stored in the file
///
/// Current files store an integer; legacy files store a floating value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum IntervalCount {
    Integer(u64),
    Float(f64),
}

impl IntervalCount {
    fn kind(&self) -> &'static str {
        match self {
            IntervalCount::Integer(_) => "integer",
            IntervalCount::Float(_) => "float",
        }
    }

    /// Decode an integer count
    pub fn as_integer(&self) -> Result<usize, DatabaseError> {
        match *self {
            IntervalCount::Integer(n) => Ok(n as usize),
            IntervalCount::Float(_) => Err(DatabaseError::CountEncoding {
                expected: "integer",
                found: self.kind(),
            }),
        }
    }

    /// Decode a legacy floating count
    pub fn as_legacy_float(&self) -> Result<usize, DatabaseError> {
        match *self {
            IntervalCount::Float(x) => {
                if !(x >= 0.0 && x.fract() == 0.0 && x.is_finite()) {
                    return Err(DatabaseError::InvalidCount(x));
                }
                Ok(x as usize)
            }
            IntervalCount::Integer(_) => Err(DatabaseError::CountEncoding {
                expected: "float",
                found: self.kind(),
            }),
        }
    }
}

/// Dense matrix with row-major values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixRecord {
    pub num_rows: usize,
    pub num_cols: usize,
    pub values: Vec<f64>,
}

impl MatrixRecord {
    pub fn from_matrix(m: &DMatrix<f64>) -> Self {
        Self {
            num_rows: m.nrows(),
            num_cols: m.ncols(),
            values: to_row_major(m),
        }
    }

    /// Allocate a fresh matrix of the recorded shape, filled row by row
    pub fn to_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.num_rows, self.num_cols, &self.values)
    }

    fn validate(&self, name: &str) -> Result<(), DatabaseError> {
        if self.values.len() != self.num_rows * self.num_cols {
            return Err(DatabaseError::ShapeMismatch {
                name: name.to_string(),
                rows: self.num_rows,
                cols: self.num_cols,
                len: self.values.len(),
            });
        }
        Ok(())
    }
}

/// Dense matrix whose extents are stored as floating values
///
/// Layout of spatial bases exported from MATLAB; values are row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatlabMatrixRecord {
    pub num_rows: f64,
    pub num_cols: f64,
    pub values: Vec<f64>,
}

impl MatlabMatrixRecord {
    pub fn from_matrix(m: &DMatrix<f64>) -> Self {
        Self {
            num_rows: m.nrows() as f64,
            num_cols: m.ncols() as f64,
            values: to_row_major(m),
        }
    }

    /// Allocate a fresh matrix of the recorded shape, filled row by row
    ///
    /// # Panics
    /// Panics if the record has not passed validation
    pub fn to_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.num_rows as usize, self.num_cols as usize, &self.values)
    }

    fn validate(&self, name: &str) -> Result<(), DatabaseError> {
        for extent in [self.num_rows, self.num_cols] {
            if !(extent >= 0.0 && extent.is_finite() && extent.fract() == 0.0) {
                return Err(DatabaseError::InvalidExtent {
                    name: name.to_string(),
                    extent,
                });
            }
        }
        let (rows, cols) = (self.num_rows as usize, self.num_cols as usize);
        if self.values.len() != rows * cols {
            return Err(DatabaseError::ShapeMismatch {
                name: name.to_string(),
                rows,
                cols,
                len: self.values.len(),
            });
        }
        Ok(())
    }
}

/// One time interval of a piecewise basis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalRecord {
    pub start_time: f64,
    pub spatial_basis: MatrixRecord,
    pub temporal_basis: Option<MatrixRecord>,
    pub singular_values: MatrixRecord,
    /// Spatial basis in MATLAB layout, if one was exported
    pub matlab_spatial_basis: Option<MatlabMatrixRecord>,
}

/// Complete contents of one rank's basis file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasisFileRecord {
    pub num_time_intervals: IntervalCount,
    pub intervals: Vec<IntervalRecord>,
}

/// Borrowed view of a [`BasisFileRecord`] with the same encoding
#[derive(Debug, Serialize)]
pub struct BasisFileRecordRef<'a> {
    pub num_time_intervals: IntervalCount,
    pub intervals: &'a [IntervalRecord],
}

/// Check that start times are finite and strictly increasing
pub fn check_start_times(start_times: &[f64]) -> Result<(), DatabaseError> {
    for (i, &start_time) in start_times.iter().enumerate() {
        if !start_time.is_finite() {
            return Err(DatabaseError::NonFiniteStartTime {
                index: i,
                start_time,
            });
        }
        if i > 0 && start_time <= start_times[i - 1] {
            return Err(DatabaseError::UnorderedStartTimes(i));
        }
    }
    Ok(())
}

impl BasisFileRecord {
    /// Check record shapes and start-time ordering against a decoded count
    pub fn validate(&self, declared: usize) -> Result<(), DatabaseError> {
        if declared != self.intervals.len() {
            return Err(DatabaseError::CountMismatch {
                declared,
                actual: self.intervals.len(),
            });
        }
        let start_times: Vec<f64> = self.intervals.iter().map(|r| r.start_time).collect();
        check_start_times(&start_times)?;
        for (i, interval) in self.intervals.iter().enumerate() {
            interval
                .spatial_basis
                .validate(&format!("spatial_basis[{}]", i))?;
            interval
                .singular_values
                .validate(&format!("singular_values[{}]", i))?;
            if let Some(temporal) = &interval.temporal_basis {
                temporal.validate(&format!("temporal_basis[{}]", i))?;
            }
            if let Some(matlab) = &interval.matlab_spatial_basis {
                matlab.validate(&format!("matlab_spatial_basis[{}]", i))?;
            }
        }
        Ok(())
    }
}

/// Snapshot of an incremental SVD engine for save/restore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStateRecord {
    pub dim: usize,
    pub num_samples: usize,
    pub u: MatrixRecord,
    /// Pending rotation of the fast-update variant
    pub up: Option<MatrixRecord>,
    pub singular_values: Vec<f64>,
    pub w: Option<MatrixRecord>,
    pub start_times: Vec<f64>,
}

/// Serialize `record` to `path` in `format`
pub fn write_record<T: Serialize>(
    path: &Path,
    format: DatabaseFormat,
    record: &T,
) -> Result<(), DatabaseError> {
    let io_err = |source| DatabaseError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    match format {
        DatabaseFormat::Binary => {
            bincode::serialize_into(&mut writer, record).map_err(|source| DatabaseError::Binary {
                path: path.to_path_buf(),
                source,
            })?
        }
        DatabaseFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, record).map_err(|source| {
                DatabaseError::Json {
                    path: path.to_path_buf(),
                    source,
                }
            })?
        }
    }
    writer.flush().map_err(io_err)
}

/// Deserialize a record of type `T` from `path` in `format`
pub fn read_record<T: DeserializeOwned>(
    path: &Path,
    format: DatabaseFormat,
) -> Result<T, DatabaseError> {
    let file = File::open(path).map_err(|source| DatabaseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    match format {
        DatabaseFormat::Binary => {
            bincode::deserialize_from(reader).map_err(|source| DatabaseError::Binary {
                path: path.to_path_buf(),
                source,
            })
        }
        DatabaseFormat::Json => {
            serde_json::from_reader(reader).map_err(|source| DatabaseError::Json {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(rows: usize, cols: usize) -> MatrixRecord {
        MatrixRecord {
            num_rows: rows,
            num_cols: cols,
            values: (0..rows * cols).map(|v| v as f64).collect(),
        }
    }

    fn interval(start_time: f64) -> IntervalRecord {
        IntervalRecord {
            start_time,
            spatial_basis: record(4, 2),
            temporal_basis: None,
            singular_values: record(2, 2),
            matlab_spatial_basis: None,
        }
    }

    #[test]
    fn test_rank_file_name() {
        assert_eq!(rank_file_name("basis", 0), "basis.000000");
        assert_eq!(rank_file_name("out/basis", 42), "out/basis.000042");
    }

    #[test]
    fn test_count_encodings() {
        assert_eq!(IntervalCount::Integer(3).as_integer().unwrap(), 3);
        assert_eq!(IntervalCount::Float(3.0).as_legacy_float().unwrap(), 3);
        assert!(matches!(
            IntervalCount::Float(3.0).as_integer(),
            Err(DatabaseError::CountEncoding { expected: "integer", .. })
        ));
        assert!(matches!(
            IntervalCount::Integer(3).as_legacy_float(),
            Err(DatabaseError::CountEncoding { expected: "float", .. })
        ));
        assert!(matches!(
            IntervalCount::Float(2.5).as_legacy_float(),
            Err(DatabaseError::InvalidCount(_))
        ));
    }

    #[test]
    fn test_matrix_record_row_major() {
        let m = record(2, 3).to_matrix();
        assert_eq!(m[(0, 2)], 2.0);
        assert_eq!(m[(1, 0)], 3.0);
        assert_eq!(MatrixRecord::from_matrix(&m), record(2, 3));
    }

    #[test]
    fn test_validate() {
        let mut file = BasisFileRecord {
            num_time_intervals: IntervalCount::Integer(2),
            intervals: vec![interval(0.0), interval(1.0)],
        };
        assert!(file.validate(2).is_ok());
        assert!(matches!(
            file.validate(3),
            Err(DatabaseError::CountMismatch { declared: 3, actual: 2 })
        ));

        file.intervals[1].start_time = 0.0;
        assert!(matches!(
            file.validate(2),
            Err(DatabaseError::UnorderedStartTimes(1))
        ));

        file.intervals[1].start_time = 1.0;
        file.intervals[1].spatial_basis.values.pop();
        assert!(matches!(
            file.validate(2),
            Err(DatabaseError::ShapeMismatch { rows: 4, cols: 2, len: 7, .. })
        ));
    }

    #[test]
    fn test_non_finite_start_times_are_errors() {
        let mut file = BasisFileRecord {
            num_time_intervals: IntervalCount::Integer(2),
            intervals: vec![interval(0.0), interval(f64::NAN)],
        };
        assert!(matches!(
            file.validate(2),
            Err(DatabaseError::NonFiniteStartTime { index: 1, .. })
        ));

        file.intervals[0].start_time = f64::NAN;
        file.intervals[1].start_time = 1.0;
        assert!(matches!(
            file.validate(2),
            Err(DatabaseError::NonFiniteStartTime { index: 0, .. })
        ));

        assert!(check_start_times(&[0.0, f64::INFINITY]).is_err());
        assert!(check_start_times(&[0.0, 0.5, 0.5]).is_err());
        assert!(check_start_times(&[0.0, 0.5, 2.0]).is_ok());
    }

    #[test]
    fn test_matlab_extents() {
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let record = MatlabMatrixRecord::from_matrix(&m);
        assert_eq!(record.num_rows, 2.0);
        assert!(record.validate("m").is_ok());
        assert_eq!(record.to_matrix(), m);

        let fractional = MatlabMatrixRecord {
            num_rows: 1.5,
            ..record.clone()
        };
        assert!(matches!(
            fractional.validate("m"),
            Err(DatabaseError::InvalidExtent { extent, .. }) if extent == 1.5
        ));

        let short = MatlabMatrixRecord {
            values: vec![1.0; 5],
            ..record
        };
        assert!(matches!(
            short.validate("m"),
            Err(DatabaseError::ShapeMismatch { rows: 2, cols: 3, len: 5, .. })
        ));
    }

    #[test]
    fn test_borrowed_view_encodes_like_owned_record() {
        let owned = BasisFileRecord {
            num_time_intervals: IntervalCount::Float(2.0),
            intervals: vec![interval(0.0), interval(1.0)],
        };
        let view = BasisFileRecordRef {
            num_time_intervals: owned.num_time_intervals,
            intervals: &owned.intervals,
        };
        assert_eq!(
            bincode::serialize(&view).unwrap(),
            bincode::serialize(&owned).unwrap()
        );
        assert_eq!(
            serde_json::to_string(&view).unwrap(),
            serde_json::to_string(&owned).unwrap()
        );
    }
}
