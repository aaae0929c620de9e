//! Process-group context for partitioned state vectors
//!
//! Each process owns a disjoint slice of the physical state. Quantities that
//! depend on the whole vector (norms, projections, the worst-case error) are
//! combined through a [`Communicator`]. Every rank must enter each
//! collective the same number of times and in the same order; a missing
//! participant blocks all others.
//!
//! # Design
//! - [`SingleProcess`]: rank 0 of 1, reductions are identities
//! - [`ThreadGroup`]: `n` ranks inside one process, one per thread, sharing
//!   a slot table and a barrier

use std::sync::{Arc, Barrier, Mutex, PoisonError};

/// Process-group operations needed by the sampler and the engines
pub trait Communicator {
    /// Rank of this process within the group
    fn rank(&self) -> usize;

    /// Number of processes in the group
    fn size(&self) -> usize;

    /// Blocking maximum over all ranks
    fn all_reduce_max(&self, value: f64) -> f64;

    /// Blocking element-wise sum over all ranks, in place
    fn all_reduce_sum(&self, values: &mut [f64]);
}

/// Group of one: no distributed runtime is active
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_max(&self, value: f64) -> f64 {
        value
    }

    fn all_reduce_sum(&self, _values: &mut [f64]) {}
}

//==============================================================================
// In-process thread group
//==============================================================================

struct SharedSlots {
    barrier: Barrier,
    slots: Mutex<Vec<Vec<f64>>>,
}

/// Factory for an in-process group of ranks
///
/// # Example
/// ```
/// use romsampler_rust::comm::{Communicator, ThreadGroup};
///
/// let handles: Vec<_> = ThreadGroup::new(3)
///     .into_iter()
///     .map(|comm| std::thread::spawn(move || comm.all_reduce_max(comm.rank() as f64)))
///     .collect();
/// for h in handles {
///     assert_eq!(h.join().unwrap(), 2.0);
/// }
/// ```
pub struct ThreadGroup;

impl ThreadGroup {
    /// Create `size` communicators, one per rank
    ///
    /// # Panics
    /// Panics if `size` is zero
    #[allow(clippy::new_ret_no_self)]
    pub fn new(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "Thread group must have at least one rank");
        let shared = Arc::new(SharedSlots {
            barrier: Barrier::new(size),
            slots: Mutex::new(vec![Vec::new(); size]),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

/// One rank of a [`ThreadGroup`]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    shared: Arc<SharedSlots>,
}

impl ThreadComm {
    fn all_reduce(&self, values: &mut [f64], op: fn(f64, f64) -> f64) {
        {
            let mut slots = self.shared.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots[self.rank] = values.to_vec();
        }
        self.shared.barrier.wait();
        {
            let slots = self.shared.slots.lock().unwrap_or_else(PoisonError::into_inner);
            for (i, value) in values.iter_mut().enumerate() {
                *value = slots
                    .iter()
                    .map(|slot| slot[i])
                    .reduce(op)
                    .unwrap_or(*value);
            }
        }
        // Nobody may overwrite a slot before every rank has read it
        self.shared.barrier.wait();
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_reduce_max(&self, value: f64) -> f64 {
        let mut buf = [value];
        self.all_reduce(&mut buf, f64::max);
        buf[0]
    }

    fn all_reduce_sum(&self, values: &mut [f64]) {
        self.all_reduce(values, |a, b| a + b);
    }
}
