//! Dense helpers over partitioned vectors
//!
//! Basis matrices hold this process's rows only. Inner products over the
//! full physical dimension therefore need a sum over all ranks; the helpers
//! here issue that collective only when the group has more than one rank.

use nalgebra::{DMatrix, DVector};

use crate::comm::Communicator;

/// Compute `Bᵗ·x` summed over all ranks
///
/// # Panics
/// Panics if `x.len() != basis.nrows()`
pub fn transpose_mult(comm: &dyn Communicator, basis: &DMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    assert_eq!(
        basis.nrows(),
        x.len(),
        "Basis rows ({}) must match vector length ({})",
        basis.nrows(),
        x.len()
    );
    let mut l = basis.tr_mul(x);
    if comm.size() > 1 {
        comm.all_reduce_sum(l.as_mut_slice());
    }
    l
}

/// Residual of `x` after projection onto the span of `basis`: `x − B·(Bᵗx)`
pub fn project_residual(comm: &dyn Communicator, basis: &DMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    let l = transpose_mult(comm, basis, x);
    x - basis * l
}

/// Largest absolute component of this rank's slice
pub fn linf_norm(x: &DVector<f64>) -> f64 {
    x.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
}

/// Euclidean norm over all ranks
pub fn global_norm(comm: &dyn Communicator, x: &DVector<f64>) -> f64 {
    let mut sq = [x.norm_squared()];
    if comm.size() > 1 {
        comm.all_reduce_sum(&mut sq);
    }
    sq[0].sqrt()
}

/// Inner product over all ranks
pub fn global_dot(comm: &dyn Communicator, a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    let mut d = [a.dot(b)];
    if comm.size() > 1 {
        comm.all_reduce_sum(&mut d);
    }
    d[0]
}

/// SVD of a small square core matrix with singular values in descending order
///
/// Returns `(A, sigma, B)` such that `q = A · diag(sigma) · Bᵗ`.
pub fn ordered_svd(q: &DMatrix<f64>) -> (DMatrix<f64>, Vec<f64>, DMatrix<f64>) {
    let n = q.ncols();
    let svd = q.clone().svd(true, true);
    let u = svd.u.expect("SVD was requested with left singular vectors");
    let v_t = svd.v_t.expect("SVD was requested with right singular vectors");

    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&i, &j| svd.singular_values[j].total_cmp(&svd.singular_values[i]));

    let sigma: Vec<f64> = order.iter().map(|&i| svd.singular_values[i]).collect();
    let a = DMatrix::from_fn(u.nrows(), order.len(), |r, c| u[(r, order[c])]);
    let b = DMatrix::from_fn(n, order.len(), |r, c| v_t[(order[c], r)]);
    (a, sigma, b)
}

/// Re-orthonormalize the columns of `basis` by modified Gram-Schmidt
///
/// Dot products are taken over all ranks so every rank applies the same
/// coefficients to its slice.
pub fn orthogonalize(comm: &dyn Communicator, basis: &mut DMatrix<f64>) {
    for work in 0..basis.ncols() {
        // Two passes give orthogonality to working precision
        for _ in 0..2 {
            for col in 0..work {
                let prev = basis.column(col).into_owned();
                let cur = basis.column(work).into_owned();
                let factor = global_dot(comm, &prev, &cur);
                basis.column_mut(work).axpy(-factor, &prev, 1.0);
            }
        }
        let cur = basis.column(work).into_owned();
        let norm = global_norm(comm, &cur);
        if norm > 0.0 {
            basis.column_mut(work).scale_mut(1.0 / norm);
        }
    }
}

/// Flatten a matrix in row-major order
pub fn to_row_major(m: &DMatrix<f64>) -> Vec<f64> {
    m.transpose().as_slice().to_vec()
}
