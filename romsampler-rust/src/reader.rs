//! Offline reader for piecewise basis files
//!
//! Opens the file written for this process's rank and serves the basis of
//! the interval owning a query time. Each getter builds a fresh matrix and
//! replaces the cached matrix of that kind, so a returned borrow is only
//! valid until the next call on the reader.

use std::path::Path;

use log::{debug, info};
use nalgebra::DMatrix;

use crate::comm::Communicator;
use crate::database::{
    self, BasisFileRecord, DatabaseError, DatabaseFormat, IntervalRecord, rank_file_name,
};
use crate::interval::TimeIntervals;
use crate::sampler::BasisSource;

/// Reader for the bases written by [`BasisWriter`](crate::BasisWriter)
#[derive(Debug)]
pub struct BasisReader {
    intervals: Vec<IntervalRecord>,
    start_times: TimeIntervals,
    spatial_basis: Option<DMatrix<f64>>,
    temporal_basis: Option<DMatrix<f64>>,
    singular_values: Option<DMatrix<f64>>,
    last_basis_index: Option<usize>,
}

/// Which decoding of the interval count a file is expected to carry
#[derive(Debug, Clone, Copy)]
enum CountKind {
    Integer,
    LegacyFloat,
}

impl BasisReader {
    /// Open `base_file_name` suffixed with this process's rank
    ///
    /// The interval count must be stored as an integer.
    ///
    /// # Panics
    /// Panics if `base_file_name` is empty
    pub fn open(
        base_file_name: &str,
        format: DatabaseFormat,
        comm: &dyn Communicator,
    ) -> Result<Self, DatabaseError> {
        let file = load(base_file_name, format, comm, CountKind::Integer)?;
        Ok(Self::from_file(file))
    }

    /// Open a file whose interval count is stored as a floating value
    ///
    /// # Panics
    /// Panics if `base_file_name` is empty
    pub fn open_legacy(
        base_file_name: &str,
        format: DatabaseFormat,
        comm: &dyn Communicator,
    ) -> Result<Self, DatabaseError> {
        let file = load(base_file_name, format, comm, CountKind::LegacyFloat)?;
        Ok(Self::from_file(file))
    }

    /// Replace the loaded bases with those of another legacy-count file
    ///
    /// On error the reader keeps its previous contents.
    ///
    /// # Panics
    /// Panics if `base_file_name` is empty
    pub fn read_basis(
        &mut self,
        base_file_name: &str,
        format: DatabaseFormat,
        comm: &dyn Communicator,
    ) -> Result<(), DatabaseError> {
        let file = load(base_file_name, format, comm, CountKind::LegacyFloat)?;
        *self = Self::from_file(file);
        Ok(())
    }

    fn from_file(file: BasisFileRecord) -> Self {
        let start_times =
            TimeIntervals::from_start_times(file.intervals.iter().map(|r| r.start_time).collect());
        Self {
            intervals: file.intervals,
            start_times,
            spatial_basis: None,
            temporal_basis: None,
            singular_values: None,
            last_basis_index: None,
        }
    }

    pub fn num_time_intervals(&self) -> usize {
        self.intervals.len()
    }

    pub fn time_interval_start_times(&self) -> &[f64] {
        self.start_times.start_times()
    }

    /// Interval index resolved by the most recent getter call
    pub fn last_basis_index(&self) -> Option<usize> {
        self.last_basis_index
    }

    fn select(&mut self, time: f64) -> &IntervalRecord {
        let i = self.start_times.locate(time);
        self.last_basis_index = Some(i);
        debug!("Reading basis of interval {} for t = {}", i, time);
        &self.intervals[i]
    }

    /// Spatial basis of the interval owning `time`
    ///
    /// # Panics
    /// Panics if no interval was loaded or `time` is negative
    pub fn spatial_basis(&mut self, time: f64) -> &DMatrix<f64> {
        let m = self.select(time).spatial_basis.to_matrix();
        self.spatial_basis.insert(m)
    }

    /// Temporal basis of the interval owning `time`, if one was written
    ///
    /// # Panics
    /// Panics if no interval was loaded or `time` is negative
    pub fn temporal_basis(&mut self, time: f64) -> Option<&DMatrix<f64>> {
        let m = self
            .select(time)
            .temporal_basis
            .as_ref()
            .map(|record| record.to_matrix());
        self.temporal_basis = m;
        self.temporal_basis.as_ref()
    }

    /// Singular values of the interval owning `time`, as a square diagonal
    /// matrix
    ///
    /// # Panics
    /// Panics if no interval was loaded or `time` is negative
    pub fn singular_values(&mut self, time: f64) -> &DMatrix<f64> {
        let m = self.select(time).singular_values.to_matrix();
        self.singular_values.insert(m)
    }

    /// Spatial basis of the interval owning `time`, read from its MATLAB
    /// layout record
    ///
    /// Shares the cache of [`spatial_basis`](Self::spatial_basis). Returns
    /// `None` and keeps the cache if the interval has no MATLAB record.
    ///
    /// # Panics
    /// Panics if no interval was loaded or `time` is negative
    pub fn matlab_basis(&mut self, time: f64) -> Option<&DMatrix<f64>> {
        let m = self
            .select(time)
            .matlab_spatial_basis
            .as_ref()
            .map(|record| record.to_matrix())?;
        Some(self.spatial_basis.insert(m))
    }
}

impl BasisSource for BasisReader {
    fn spatial_basis(&mut self, time: f64) -> &DMatrix<f64> {
        BasisReader::spatial_basis(self, time)
    }

    fn temporal_basis(&mut self, time: f64) -> Option<&DMatrix<f64>> {
        BasisReader::temporal_basis(self, time)
    }

    fn singular_values(&mut self, time: f64) -> &DMatrix<f64> {
        BasisReader::singular_values(self, time)
    }
}

fn load(
    base_file_name: &str,
    format: DatabaseFormat,
    comm: &dyn Communicator,
    kind: CountKind,
) -> Result<BasisFileRecord, DatabaseError> {
    assert!(!base_file_name.is_empty(), "Basis file name must not be empty");
    let full_file_name = rank_file_name(base_file_name, comm.rank());
    let file: BasisFileRecord = database::read_record(Path::new(&full_file_name), format)?;
    let declared = match kind {
        CountKind::Integer => file.num_time_intervals.as_integer()?,
        CountKind::LegacyFloat => file.num_time_intervals.as_legacy_float()?,
    };
    file.validate(declared)?;
    info!(
        "Opened {} with {} time interval(s)",
        full_file_name, declared
    );
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SingleProcess;
    use crate::database::{IntervalCount, MatlabMatrixRecord, MatrixRecord, write_record};

    fn temp_base(tag: &str) -> String {
        let dir = std::env::temp_dir();
        format!(
            "{}/romsampler_reader_{}_{}",
            dir.display(),
            tag,
            std::process::id()
        )
    }

    fn interval(start_time: f64, rows: usize, cols: usize, fill: f64) -> IntervalRecord {
        let values = (0..rows * cols).map(|i| fill + i as f64).collect();
        IntervalRecord {
            start_time,
            spatial_basis: MatrixRecord {
                num_rows: rows,
                num_cols: cols,
                values,
            },
            temporal_basis: None,
            singular_values: MatrixRecord {
                num_rows: cols,
                num_cols: cols,
                values: vec![0.0; cols * cols],
            },
            matlab_spatial_basis: None,
        }
    }

    fn write_file(base: &str, count: IntervalCount, intervals: Vec<IntervalRecord>) {
        let file = BasisFileRecord {
            num_time_intervals: count,
            intervals,
        };
        write_record(
            Path::new(&rank_file_name(base, 0)),
            DatabaseFormat::Binary,
            &file,
        )
        .unwrap();
    }

    #[test]
    fn test_getters_follow_interval_location() {
        let base = temp_base("locate");
        write_file(
            &base,
            IntervalCount::Integer(3),
            vec![
                interval(0.0, 2, 1, 10.0),
                interval(1.0, 2, 2, 20.0),
                interval(2.5, 3, 1, 30.0),
            ],
        );
        let mut reader = BasisReader::open(&base, DatabaseFormat::Binary, &SingleProcess).unwrap();
        assert_eq!(reader.num_time_intervals(), 3);
        assert_eq!(reader.last_basis_index(), None);

        assert_eq!(reader.spatial_basis(0.5)[(0, 0)], 10.0);
        assert_eq!(reader.last_basis_index(), Some(0));

        let b = reader.spatial_basis(1.2);
        assert_eq!(b.shape(), (2, 2));
        // Row-major fill
        assert_eq!(b[(0, 1)], 21.0);
        assert_eq!(b[(1, 0)], 22.0);
        assert_eq!(reader.last_basis_index(), Some(1));

        assert_eq!(reader.spatial_basis(10.0).shape(), (3, 1));
        assert_eq!(reader.last_basis_index(), Some(2));

        assert!(reader.temporal_basis(0.0).is_none());
        assert_eq!(reader.singular_values(1.5).shape(), (2, 2));

        std::fs::remove_file(rank_file_name(&base, 0)).ok();
    }

    #[test]
    fn test_count_mismatch_is_rejected() {
        let base = temp_base("mismatch");
        write_file(
            &base,
            IntervalCount::Integer(2),
            vec![interval(0.0, 1, 1, 0.0)],
        );
        let err = BasisReader::open(&base, DatabaseFormat::Binary, &SingleProcess).unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::CountMismatch {
                declared: 2,
                actual: 1
            }
        ));
        std::fs::remove_file(rank_file_name(&base, 0)).ok();
    }

    #[test]
    fn test_read_basis_replaces_contents() {
        let first = temp_base("first");
        let second = temp_base("second");
        write_file(
            &first,
            IntervalCount::Float(1.0),
            vec![interval(0.0, 2, 1, 1.0)],
        );
        write_file(
            &second,
            IntervalCount::Float(2.0),
            vec![interval(0.0, 4, 1, 5.0), interval(3.0, 4, 2, 7.0)],
        );
        let mut reader =
            BasisReader::open_legacy(&first, DatabaseFormat::Binary, &SingleProcess).unwrap();
        assert_eq!(reader.spatial_basis(0.0).nrows(), 2);

        reader
            .read_basis(&second, DatabaseFormat::Binary, &SingleProcess)
            .unwrap();
        assert_eq!(reader.num_time_intervals(), 2);
        assert_eq!(reader.last_basis_index(), None);
        assert_eq!(reader.time_interval_start_times(), &[0.0, 3.0]);
        assert_eq!(reader.spatial_basis(4.0).shape(), (4, 2));

        std::fs::remove_file(rank_file_name(&first, 0)).ok();
        std::fs::remove_file(rank_file_name(&second, 0)).ok();
    }

    #[test]
    fn test_matlab_basis_follows_interval_location() {
        let base = temp_base("matlab");
        let mut first = interval(0.0, 2, 1, 1.0);
        first.matlab_spatial_basis = Some(MatlabMatrixRecord {
            num_rows: 2.0,
            num_cols: 3.0,
            values: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        });
        write_file(
            &base,
            IntervalCount::Integer(2),
            vec![first, interval(1.0, 2, 1, 9.0)],
        );
        let mut reader = BasisReader::open(&base, DatabaseFormat::Binary, &SingleProcess).unwrap();

        let m = reader.matlab_basis(0.5).unwrap();
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m[(0, 2)], 3.0);
        assert_eq!(m[(1, 0)], 4.0);
        assert_eq!(reader.last_basis_index(), Some(0));

        assert!(reader.matlab_basis(1.5).is_none());
        assert_eq!(reader.last_basis_index(), Some(1));

        std::fs::remove_file(rank_file_name(&base, 0)).ok();
    }

    #[test]
    fn test_corrupt_start_time_is_an_error() {
        let base = temp_base("nan_start");
        write_file(
            &base,
            IntervalCount::Integer(2),
            vec![interval(0.0, 1, 1, 0.0), interval(f64::NAN, 1, 1, 0.0)],
        );
        let result = std::panic::catch_unwind(|| {
            BasisReader::open(&base, DatabaseFormat::Binary, &SingleProcess)
        });
        assert!(matches!(
            result,
            Ok(Err(DatabaseError::NonFiniteStartTime { index: 1, .. }))
        ));
        std::fs::remove_file(rank_file_name(&base, 0)).ok();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = BasisReader::open(
            &temp_base("does_not_exist"),
            DatabaseFormat::Json,
            &SingleProcess,
        )
        .unwrap_err();
        assert!(matches!(err, DatabaseError::Io { .. }));
    }

    #[test]
    #[should_panic(expected = "must not be empty")]
    fn test_empty_file_name() {
        let _ = BasisReader::open("", DatabaseFormat::Binary, &SingleProcess);
    }
}
