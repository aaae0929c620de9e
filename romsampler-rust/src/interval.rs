//! Piecewise time-interval bookkeeping
//!
//! A basis decomposition is valid over a half-open interval
//! `[start_time_i, start_time_{i+1})`; the last interval is open-ended.
//! Both the live engine and the offline reader resolve query times through
//! [`TimeIntervals::locate`] so they always agree on the owning interval.

/// Ascending sequence of time-interval start times
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeIntervals {
    start_times: Vec<f64>,
}

impl TimeIntervals {
    /// Create an empty interval sequence
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from existing start times
    ///
    /// # Panics
    /// Panics if the start times are not strictly increasing
    pub fn from_start_times(start_times: Vec<f64>) -> Self {
        for pair in start_times.windows(2) {
            assert!(
                pair[0] < pair[1],
                "Time interval start times must be strictly increasing: {} then {}",
                pair[0],
                pair[1]
            );
        }
        Self { start_times }
    }

    /// Begin a new interval at `start_time`
    ///
    /// # Panics
    /// Panics if `start_time` does not exceed the last recorded start time
    pub fn push(&mut self, start_time: f64) {
        if let Some(&last) = self.start_times.last() {
            assert!(
                start_time > last,
                "New time interval start {} must be after previous start {}",
                start_time,
                last
            );
        }
        self.start_times.push(start_time);
    }

    /// Number of intervals
    pub fn len(&self) -> usize {
        self.start_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.start_times.is_empty()
    }

    pub fn start_times(&self) -> &[f64] {
        &self.start_times
    }

    /// Start time of interval `index`
    pub fn start_time(&self, index: usize) -> f64 {
        self.start_times[index]
    }

    /// Locate the interval owning `time`
    ///
    /// Scans from the first interval for `start_i <= time < start_{i+1}`;
    /// when no interior interval matches, the scan ends on the last one.
    /// A time before the first start resolves to interval 0.
    ///
    /// # Panics
    /// Panics if there are no intervals or `time` is negative
    pub fn locate(&self, time: f64) -> usize {
        assert!(!self.is_empty(), "No time intervals have been recorded");
        assert!(time >= 0.0, "Query time must be non-negative, got {}", time);

        if time < self.start_times[0] {
            return 0;
        }

        let count = self.start_times.len();
        let mut i = 0;
        while i + 1 < count {
            if self.start_times[i] <= time && time < self.start_times[i + 1] {
                break;
            }
            i += 1;
        }
        i
    }
}
