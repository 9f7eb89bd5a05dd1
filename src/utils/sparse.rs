//! Sparse kernels over `nalgebra-sparse` CSR matrices.
//!
//! Row-wise products write each output entry from exactly one row, so the
//! parallel path needs no synchronization: every worker owns a disjoint slice
//! of the output.

use nalgebra_sparse::CsrMatrix;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::utils::math::Real;

/// `out = A * x`
pub fn spmv(a: &CsrMatrix<Real>, x: &[Real], out: &mut [Real]) {
    debug_assert_eq!(a.ncols(), x.len());
    debug_assert_eq!(a.nrows(), out.len());

    let offsets = a.row_offsets();
    let cols = a.col_indices();
    let vals = a.values();
    let row = |i: usize| -> Real {
        (offsets[i]..offsets[i + 1])
            .map(|k| vals[k] * x[cols[k]])
            .sum()
    };

    #[cfg(feature = "parallel")]
    out.par_iter_mut()
        .enumerate()
        .for_each(|(i, value)| *value = row(i));

    #[cfg(not(feature = "parallel"))]
    for (i, value) in out.iter_mut().enumerate() {
        *value = row(i);
    }
}

/// Dot product of row `i` of `a` with row `j` of `b` (sorted column indices).
pub fn row_dot(a: &CsrMatrix<Real>, i: usize, b: &CsrMatrix<Real>, j: usize) -> Real {
    let ra = a.row(i);
    let rb = b.row(j);
    let (ca, va) = (ra.col_indices(), ra.values());
    let (cb, vb) = (rb.col_indices(), rb.values());

    let (mut p, mut q, mut sum) = (0, 0, 0.0);
    while p < ca.len() && q < cb.len() {
        match ca[p].cmp(&cb[q]) {
            std::cmp::Ordering::Less => p += 1,
            std::cmp::Ordering::Greater => q += 1,
            std::cmp::Ordering::Equal => {
                sum += va[p] * vb[q];
                p += 1;
                q += 1;
            }
        }
    }
    sum
}

/// Dot product of row `i` of `a` with a dense vector.
pub fn row_dot_dense(a: &CsrMatrix<Real>, i: usize, x: &[Real]) -> Real {
    let row = a.row(i);
    row.col_indices()
        .iter()
        .zip(row.values())
        .map(|(&c, &v)| v * x[c])
        .sum()
}

/// `out += alpha * A[i, :]`
pub fn row_axpy(a: &CsrMatrix<Real>, i: usize, alpha: Real, out: &mut [Real]) {
    let row = a.row(i);
    for (&c, &v) in row.col_indices().iter().zip(row.values()) {
        out[c] += alpha * v;
    }
}

/// Applies `f` to consecutive `chunk`-sized blocks, in parallel when enabled.
pub fn for_each_block<T, F>(values: &mut [T], chunk: usize, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Send + Sync,
{
    if chunk == 0 {
        return;
    }

    #[cfg(feature = "parallel")]
    values
        .par_chunks_mut(chunk)
        .enumerate()
        .for_each(|(index, block)| f(index, block));

    #[cfg(not(feature = "parallel"))]
    for (index, block) in values.chunks_mut(chunk).enumerate() {
        f(index, block);
    }
}
