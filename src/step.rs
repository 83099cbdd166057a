//! Quantities on the search subspace: the step solve (CHINOW), the entropy-metric length of a
//! step (DIST) and mean removal along one search direction (PROJECT).

use crate::error::{MaxentError, MaxentResult};
use crate::linalg::{solve_least_squares, solve_small};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut2, Axis};
use serde::{Deserialize, Serialize};

/// Gradients and curvatures of entropy (`s1`, `s2`) and of the relative chi-squared
/// (`c1`, `c2`) along the search directions. Rebuilt every iteration.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchCurvature {
    pub c1: Array1<f64>,
    pub c2: Array2<f64>,
    pub s1: Array1<f64>,
    pub s2: Array2<f64>,
}

impl SearchCurvature {
    pub fn new(
        c1: Array1<f64>,
        c2: Array2<f64>,
        s1: Array1<f64>,
        s2: Array2<f64>,
    ) -> MaxentResult<Self> {
        let m = c1.len();
        if m == 0 || m > 3 {
            return Err(MaxentError::shape("search directions", "1 to 3", m));
        }
        if s1.len() != m {
            return Err(MaxentError::shape("s1", m, s1.len()));
        }
        for (what, matrix) in [("c2", &c2), ("s2", &s2)] {
            if matrix.dim() != (m, m) {
                return Err(MaxentError::shape(
                    what,
                    format!("({m}, {m})"),
                    format!("{:?}", matrix.dim()),
                ));
            }
        }
        Ok(SearchCurvature { c1, c2, s1, s2 })
    }

    pub fn zeros(m: usize) -> Self {
        SearchCurvature {
            c1: Array1::zeros(m),
            c2: Array2::zeros((m, m)),
            s1: Array1::zeros(m),
            s2: Array2::zeros((m, m)),
        }
    }

    pub fn dim(&self) -> usize {
        self.c1.len()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    Exact,
    /// The system was singular and the step is a pseudo-inverse best effort.
    Degraded,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StepSolution {
    /// Predicted chi-squared relative to the current one.
    pub objective: f64,
    pub beta: Array1<f64>,
    pub status: SolveStatus,
}

/// CHINOW: solves the step blended between chi-squared descent (`ax = 0`) and entropy ascent
/// (`ax = 1`) and predicts the relative chi-squared it reaches.
///
/// The system is `((1 - ax) c2 - ax s2) beta = -((1 - ax) c1 - ax s1)` and the prediction
/// `1 + beta . (c1 + c2 beta / 2)`.
pub fn chinow(ax: f64, curvature: &SearchCurvature) -> StepSolution {
    let bx = 1.0 - ax;
    let a = &curvature.c2 * bx - &curvature.s2 * ax;
    let b = -(&curvature.c1 * bx - &curvature.s1 * ax);

    let (beta, status) = match solve_small(a.view(), b.view()) {
        Ok(beta) => (beta, SolveStatus::Exact),
        Err(err) => {
            log::debug!("chinow(ax = {ax}): {err}, falling back to pseudo-inverse");
            (solve_least_squares(a.view(), b.view()), SolveStatus::Degraded)
        }
    };

    let objective = 1.0 + beta.dot(&(&curvature.c1 + &(curvature.c2.dot(&beta) * 0.5)));
    StepSolution {
        objective,
        beta,
        status,
    }
}

/// DIST: `-beta^T s2 beta`, the squared length of a step in the entropy metric.
/// Non-positive whenever `s2` is positive semi-definite.
pub fn dist(beta: ArrayView1<f64>, s2: ArrayView2<f64>) -> f64 {
    -beta.dot(&s2.dot(&beta))
}

fn column_mean(k: usize, n: usize, xi: &ArrayView2<f64>) -> f64 {
    assert!(n > 0, "cannot project over zero rows");
    assert!(n <= xi.nrows(), "n = {n} exceeds {} rows", xi.nrows());
    assert!(k < xi.ncols(), "column {k} out of {} columns", xi.ncols());
    xi.column(k).iter().take(n).sum::<f64>() / n as f64
}

/// PROJECT, in place: subtracts the mean of `xi[..n, k]` from every entry of column `k`.
///
/// # Panics
/// If `n == 0`, `n` exceeds the number of rows or `k` is not a column of `xi`.
pub fn project_in_place(k: usize, n: usize, mut xi: ArrayViewMut2<f64>) {
    let mean = column_mean(k, n, &xi.view());
    xi.index_axis_mut(Axis(1), k).mapv_inplace(|v| v - mean);
}

/// PROJECT, returning a projected copy and leaving `xi` untouched.
///
/// # Panics
/// Same conditions as [`project_in_place`].
pub fn project(k: usize, n: usize, xi: ArrayView2<f64>) -> Array2<f64> {
    let mut projected = xi.to_owned();
    project_in_place(k, n, projected.view_mut());
    projected
}
