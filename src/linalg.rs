//! Dense solves for the small (at most 3x3) step systems.
//!
//! The matrices are copied from `ndarray` into `nalgebra` for the decomposition and the
//! solution is copied back. At this size the copies cost nothing next to an FFT.

use crate::error::SingularSystem;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, ArrayView1, ArrayView2};

/// Pivots smaller than this fraction of the largest matrix entry count as zero.
pub const PIVOT_TOLERANCE: f64 = 1e-12;

/// Singular values smaller than this fraction of the largest one are dropped.
pub const SVD_TOLERANCE: f64 = 1e-12;

fn to_nalgebra(a: ArrayView2<f64>, b: ArrayView1<f64>) -> (DMatrix<f64>, DVector<f64>) {
    assert_eq!(a.nrows(), a.ncols(), "step system must be square");
    assert_eq!(a.nrows(), b.len(), "right-hand side must match the system");
    let dim = b.len();
    let matrix = DMatrix::from_fn(dim, dim, |i, j| a[[i, j]]);
    let rhs = DVector::from_iterator(dim, b.iter().copied());
    (matrix, rhs)
}

/// Solves `a x = b` by LU decomposition with partial pivoting.
///
/// # Panics
/// If `a` is not square or `b` does not match its size.
pub fn solve_small(a: ArrayView2<f64>, b: ArrayView1<f64>) -> Result<Array1<f64>, SingularSystem> {
    let (matrix, rhs) = to_nalgebra(a, b);
    let dim = rhs.len();
    let finite = matrix.iter().chain(rhs.iter()).all(|v| v.is_finite());
    if !finite {
        return Err(SingularSystem {
            dim,
            pivot: 0.0,
            scale: 0.0,
        });
    }

    let scale = matrix.amax();
    let lu = matrix.lu();
    let pivot = lu.u().diagonal().amin();
    if scale == 0.0 || pivot <= PIVOT_TOLERANCE * scale {
        return Err(SingularSystem { dim, pivot, scale });
    }

    lu.solve(&rhs)
        .map(|x| x.iter().copied().collect())
        .ok_or(SingularSystem { dim, pivot, scale })
}

/// Minimum-norm least-squares solution of `a x = b` via the SVD pseudo-inverse.
///
/// Returns zeros when the decomposition does not produce a solution, so the caller
/// always gets a usable, if degraded, step.
///
/// # Panics
/// If `a` is not square or `b` does not match its size.
pub fn solve_least_squares(a: ArrayView2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    let (matrix, rhs) = to_nalgebra(a, b);
    let dim = rhs.len();
    if matrix.iter().chain(rhs.iter()).any(|v| !v.is_finite()) {
        return Array1::zeros(dim);
    }
    let svd = matrix.svd(true, true);
    let eps = SVD_TOLERANCE * svd.singular_values.max().max(f64::MIN_POSITIVE);
    match svd.solve(&rhs, eps) {
        Ok(x) => x.iter().copied().collect(),
        Err(reason) => {
            log::debug!("pseudo-inverse failed ({reason}), using a zero step");
            Array1::zeros(dim)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn solves_a_well_conditioned_system() {
        let a = array![[4.0, 1.0, 0.0], [1.0, 3.0, 1.0], [0.0, 1.0, 2.0]];
        let x_true = array![1.0, -2.0, 0.5];
        let b = a.dot(&x_true);
        let x = solve_small(a.view(), b.view()).unwrap();
        for (v, w) in x.iter().zip(x_true.iter()) {
            assert_abs_diff_eq!(*v, *w, epsilon = 1e-12);
        }
    }

    #[test]
    fn needs_pivoting() {
        let a = array![[0.0, 1.0], [1.0, 0.0]];
        let x = solve_small(a.view(), array![2.0, 3.0].view()).unwrap();
        assert_abs_diff_eq!(x[0], 3.0, epsilon = 1e-15);
        assert_abs_diff_eq!(x[1], 2.0, epsilon = 1e-15);
    }

    #[test]
    fn reports_rank_deficient_system() {
        let a = array![[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 1.0, 1.0]];
        let err = solve_small(a.view(), array![1.0, 2.0, 3.0].view()).unwrap_err();
        assert_eq!(err.dim, 3);
        assert!(err.pivot <= PIVOT_TOLERANCE * err.scale);
    }

    #[test]
    fn reports_zero_and_non_finite_systems() {
        assert!(solve_small(ndarray::Array2::zeros((2, 2)).view(), array![1.0, 1.0].view()).is_err());
        let a = array![[f64::NAN, 0.0], [0.0, 1.0]];
        assert!(solve_small(a.view(), array![1.0, 1.0].view()).is_err());
    }

    #[test]
    fn least_squares_gives_minimum_norm_solution() {
        // x0 + x1 = 2 has minimum-norm solution (1, 1)
        let a = array![[1.0, 1.0], [1.0, 1.0]];
        let x = solve_least_squares(a.view(), array![2.0, 2.0].view());
        assert_abs_diff_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn least_squares_of_zero_matrix_is_zero() {
        let x = solve_least_squares(ndarray::Array2::zeros((3, 3)).view(), array![1.0, 1.0, 1.0].view());
        assert!(x.iter().all(|v| *v == 0.0));
    }
}
