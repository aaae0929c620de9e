//! Writer for piecewise basis files
//!
//! Collects one [`IntervalRecord`] per time interval and rewrites this
//! rank's file after every interval so the file on disk is always complete.

use std::path::Path;

use log::info;
use nalgebra::{DMatrix, DVector};

use crate::database::{
    self, BasisFileRecordRef, DatabaseError, DatabaseFormat, IntervalCount, IntervalRecord,
    MatrixRecord, rank_file_name,
};

/// How the interval count is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountEncoding {
    #[default]
    Integer,
    /// Floating count read by [`BasisReader::open_legacy`](crate::BasisReader::open_legacy)
    LegacyFloat,
}

/// Writes the bases of successive time intervals to one per-rank file
#[derive(Debug)]
pub struct BasisWriter {
    full_file_name: String,
    format: DatabaseFormat,
    encoding: CountEncoding,
    intervals: Vec<IntervalRecord>,
}

impl BasisWriter {
    /// Create a writer for `base_file_name` suffixed with `rank`
    ///
    /// # Panics
    /// Panics if `base_file_name` is empty
    pub fn new(base_file_name: &str, format: DatabaseFormat, rank: usize) -> Self {
        assert!(!base_file_name.is_empty(), "Basis file name must not be empty");
        Self {
            full_file_name: rank_file_name(base_file_name, rank),
            format,
            encoding: CountEncoding::Integer,
            intervals: Vec::new(),
        }
    }

    pub fn with_count_encoding(mut self, encoding: CountEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Full per-rank file name
    pub fn file_name(&self) -> &str {
        &self.full_file_name
    }

    /// Number of intervals written so far
    pub fn num_intervals(&self) -> usize {
        self.intervals.len()
    }

    /// Record the basis of the interval starting at `start_time` and rewrite
    /// the file
    ///
    /// Writing again with the start time of the last recorded interval
    /// replaces that interval.
    ///
    /// # Panics
    /// Panics if `start_time` precedes the last recorded interval
    pub fn write_basis(
        &mut self,
        start_time: f64,
        spatial_basis: &DMatrix<f64>,
        temporal_basis: Option<&DMatrix<f64>>,
        singular_values: &[f64],
    ) -> Result<(), DatabaseError> {
        let sv = DMatrix::from_diagonal(&DVector::from_column_slice(singular_values));
        let record = IntervalRecord {
            start_time,
            spatial_basis: MatrixRecord::from_matrix(spatial_basis),
            temporal_basis: temporal_basis.map(MatrixRecord::from_matrix),
            singular_values: MatrixRecord::from_matrix(&sv),
            matlab_spatial_basis: None,
        };

        match self.intervals.last() {
            Some(last) if last.start_time == start_time => {
                let idx = self.intervals.len() - 1;
                self.intervals[idx] = record;
            }
            Some(last) => {
                assert!(
                    start_time > last.start_time,
                    "Interval start {} precedes last written interval {}",
                    start_time,
                    last.start_time
                );
                self.intervals.push(record);
            }
            None => self.intervals.push(record),
        }
        self.flush()
    }

    /// Rewrite the file with every interval recorded so far
    pub fn flush(&self) -> Result<(), DatabaseError> {
        let n = self.intervals.len();
        let num_time_intervals = match self.encoding {
            CountEncoding::Integer => IntervalCount::Integer(n as u64),
            CountEncoding::LegacyFloat => IntervalCount::Float(n as f64),
        };
        let file = BasisFileRecordRef {
            num_time_intervals,
            intervals: &self.intervals,
        };
        database::write_record(Path::new(&self.full_file_name), self.format, &file)?;
        info!("Wrote {} time interval(s) to {}", n, self.full_file_name);
        Ok(())
    }
}
