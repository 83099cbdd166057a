//! Refits the per-group mixing coefficients against the current image.
//!
//! With the image fixed, each group's prediction is linear in its two coefficients:
//! `ox[t, g] = a[g] p[t] + b[g] q[t]` with `p = e Re y` and `q = e Im y`. Every group is a
//! weighted two-parameter least-squares fit.

use crate::detector::DetectorCoefficients;
use crate::linalg::solve_small;
use crate::maxent::MaxentProblem;
use crate::operators::MaxentOperator;
use crate::prepare::DEAD_SIGMA;
use ndarray::{array, ArrayView1, Zip};

/// Returns coefficients fitted to `problem`'s data for the fixed `image`, starting from the
/// ones `operator` currently uses.
///
/// Groups whose fit is singular, and dead groups, keep their coefficients. The result is
/// rescaled so that the summed group amplitudes stay as before, otherwise the image and the
/// coefficients could trade scale freely between cycles.
pub fn refit_coefficients(
    problem: &MaxentProblem,
    operator: &MaxentOperator,
    image: ArrayView1<f64>,
) -> DetectorCoefficients {
    let current = operator.coefficients();
    let y = operator.time_signal(image);
    let p = Zip::from(&y).and(&current.e).map_collect(|y, &e| y.re * e);
    let q = Zip::from(&y).and(&current.e).map_collect(|y, &e| y.im * e);

    let mut fitted = current.clone();
    let datum = problem.datum();
    let sigma = problem.sigma();
    for g in 0..current.ngroups() {
        if sigma.column(g).iter().all(|s| *s >= DEAD_SIGMA) {
            continue;
        }
        let (mut pp, mut pq, mut qq, mut pd, mut qd) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for t in 0..p.len() {
            let w = 1.0 / (sigma[[t, g]] * sigma[[t, g]]);
            let d = datum[[t, g]];
            pp += w * p[t] * p[t];
            pq += w * p[t] * q[t];
            qq += w * q[t] * q[t];
            pd += w * p[t] * d;
            qd += w * q[t] * d;
        }
        match solve_small(array![[pp, pq], [pq, qq]].view(), array![pd, qd].view()) {
            Ok(ab) => {
                fitted.a[g] = ab[0];
                fitted.b[g] = ab[1];
            }
            Err(err) => log::warn!("group {g}: phase refit failed ({err}), keeping coefficients"),
        }
    }

    let before = current.amplitudes().sum();
    let after = fitted.amplitudes().sum();
    if after > 0.0 && before > 0.0 {
        let scale = before / after;
        fitted.a *= scale;
        fitted.b *= scale;
    }
    log::debug!(
        "refit group phases: {:?}",
        fitted.phases().iter().map(|p| p.to_degrees()).collect::<Vec<_>>()
    );
    fitted
}
