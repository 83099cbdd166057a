//! MOVE: picks the blend `ax` between chi-squared descent and entropy ascent so that the
//! predicted chi-squared lands on this iteration's target, then caps the step length.

use crate::config::MaxentConfig;
use crate::step::{chinow, dist, SearchCurvature, SolveStatus};
use ndarray::Array1;

#[derive(Clone, Debug, PartialEq)]
pub struct StepChoice {
    pub ax: f64,
    pub beta: Array1<f64>,
    /// Target chi-squared relative to the current one.
    pub relative_target: f64,
    /// Absolute chi-squared the step aims for.
    pub chi_target: f64,
    pub bisections: usize,
    /// The step was shortened to respect the entropy-metric distance limit.
    pub capped: bool,
    /// The solve that produced `beta` fell back to the pseudo-inverse.
    pub degraded: bool,
}

/// Chooses the step for one iteration.
///
/// * `chisq`: current chi-squared;
/// * `chizer`: the chi-squared the reconstruction should finally reach;
/// * `total`: current image sum, which scales the allowed step length.
pub fn choose_step(
    curvature: &SearchCurvature,
    chisq: f64,
    chizer: f64,
    total: f64,
    config: &MaxentConfig,
) -> StepChoice {
    let lowest = chinow(0.0, curvature);
    let cmin = lowest.objective;
    // never ask for more than half of what the subspace can still gain
    let relative_target = if cmin * chisq > chizer {
        0.5 * (1.0 + cmin)
    } else {
        chizer / chisq
    };

    let highest = chinow(1.0, curvature);
    let mut f1 = cmin - relative_target;
    let mut f2 = highest.objective - relative_target;

    let mut bisections = 0;
    let (ax, chosen) = if f1 * f2 > 0.0 {
        // target not bracketed: take the endpoint on the right side of it
        if f2 <= 0.0 {
            (1.0, highest)
        } else {
            (0.0, lowest)
        }
    } else {
        let (mut a1, mut a2) = (0.0, 1.0);
        loop {
            let anew = 0.5 * (a1 + a2);
            let step = chinow(anew, curvature);
            let fx = step.objective - relative_target;
            bisections += 1;
            if f1 * fx > 0.0 {
                a1 = anew;
                f1 = fx;
            }
            if f2 * fx > 0.0 {
                a2 = anew;
                f2 = fx;
            }
            if fx.abs() < config.bisection_tolerance {
                break (anew, step);
            }
            if bisections >= config.max_bisections {
                log::warn!(
                    "step bisection stopped after {bisections} steps, {fx:e} away from the target"
                );
                break (anew, step);
            }
        }
    };
    // only the solve behind the returned step counts, not the bracketing ones
    let degraded = chosen.status == SolveStatus::Degraded;
    let mut beta = chosen.beta;

    let limit = config.max_step_fraction * total;
    let w = dist(beta.view(), curvature.s2.view());
    let capped = w > limit;
    if capped {
        beta *= (limit / w).sqrt();
    }

    StepChoice {
        ax,
        beta,
        relative_target,
        chi_target: relative_target * chisq,
        bisections,
        capped,
        degraded,
    }
}
