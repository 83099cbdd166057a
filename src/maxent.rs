//! The maximum entropy iteration.
//!
//! Each iteration predicts the data from the current image (OPUS), back-projects the weighted
//! residual into a chi-squared gradient (TROPUS), builds three search directions from the
//! entropy and chi-squared gradients, measures both functions' curvature along them and lets
//! MOVE pick the step. The image is updated in place and floored to stay positive.
//!
//! A run stops when the chi-squared sits on its target and the two gradients are parallel
//! (converged), when the iteration cap is hit, or when the abort flag is raised. The last two
//! are reported through [`StopReason`], not as errors.

use crate::config::MaxentConfig;
use crate::detector::DetectorCoefficients;
use crate::error::{MaxentError, MaxentResult};
use crate::line_search::choose_step;
use crate::operators::{check_operator_inputs, MaxentOperator};
use crate::phase_fit::refit_coefficients;
use crate::prepare::DEAD_SIGMA;
use crate::step::{project_in_place, SearchCurvature};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Completed fraction of a run, `None` before it starts.
pub type ProgressLock = Arc<RwLock<Option<f32>>>;

/// Number of search directions.
const DIRECTIONS: usize = 3;

/// Everything that defines one reconstruction: the data, its errors and the instrument model.
#[derive(Clone, Debug)]
pub struct MaxentProblem {
    datum: Array2<f64>,
    sigma: Array2<f64>,
    coefficients: DetectorCoefficients,
    convol: Array1<Complex64>,
    i2: usize,
}

impl MaxentProblem {
    /// `datum` and `sigma` are `(npts, ngroups)`, matching the coefficients; `convol` has one
    /// entry per image channel and `i2` is the padded transform length.
    pub fn new(
        datum: Array2<f64>,
        sigma: Array2<f64>,
        coefficients: DetectorCoefficients,
        convol: Array1<Complex64>,
        i2: usize,
    ) -> MaxentResult<Self> {
        let shape = (coefficients.npts(), coefficients.ngroups());
        if datum.dim() != shape {
            return Err(MaxentError::shape(
                "datum",
                format!("{shape:?}"),
                format!("{:?}", datum.dim()),
            ));
        }
        if sigma.dim() != shape {
            return Err(MaxentError::shape(
                "sigma",
                format!("{shape:?}"),
                format!("{:?}", sigma.dim()),
            ));
        }
        if let Some(&value) = datum.iter().find(|v| !v.is_finite()) {
            return Err(MaxentError::InvalidParameter {
                name: "datum",
                value,
                reason: "all data must be finite",
            });
        }
        if let Some(&value) = sigma.iter().find(|v| !v.is_finite() || **v <= 0.0) {
            return Err(MaxentError::InvalidParameter {
                name: "sigma",
                value,
                reason: "all errors must be positive and finite",
            });
        }
        check_operator_inputs(i2, &convol, &coefficients)?;

        Ok(MaxentProblem {
            datum,
            sigma,
            coefficients,
            convol,
            i2,
        })
    }

    pub fn datum(&self) -> ArrayView2<'_, f64> {
        self.datum.view()
    }

    pub fn sigma(&self) -> ArrayView2<'_, f64> {
        self.sigma.view()
    }

    pub fn coefficients(&self) -> &DetectorCoefficients {
        &self.coefficients
    }

    pub fn convol(&self) -> &Array1<Complex64> {
        &self.convol
    }

    pub fn i2(&self) -> usize {
        self.i2
    }

    /// Number of image channels.
    pub fn n(&self) -> usize {
        self.convol.len()
    }

    pub fn npts(&self) -> usize {
        self.datum.nrows()
    }

    pub fn ngroups(&self) -> usize {
        self.datum.ncols()
    }

    /// Data points that carry information, i.e. not flagged dead through a huge sigma.
    pub fn live_points(&self) -> usize {
        self.sigma.iter().filter(|s| **s < DEAD_SIGMA).count()
    }

    /// Inverse variances `1 / sigma^2`.
    pub fn weights(&self) -> Array2<f64> {
        self.sigma.mapv(|s| 1.0 / (s * s))
    }

    pub fn operator(&self) -> MaxentResult<MaxentOperator> {
        MaxentOperator::new(self.i2, self.convol.clone(), self.coefficients.clone())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconstructionState {
    Initializing,
    Predicting,
    ComputingResidual,
    BackProjecting,
    SolvingStep,
    LineSearching,
    Converged,
    MaxIterationsReached,
    Aborted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    Converged,
    MaxIterationsReached,
    Aborted,
}

impl From<StopReason> for ReconstructionState {
    fn from(stop: StopReason) -> Self {
        match stop {
            StopReason::Converged => ReconstructionState::Converged,
            StopReason::MaxIterationsReached => ReconstructionState::MaxIterationsReached,
            StopReason::Aborted => ReconstructionState::Aborted,
        }
    }
}

/// Diagnostics of one completed iteration, taken before its step was applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub cycle: usize,
    pub iteration: usize,
    pub chisq: f64,
    pub test: f64,
    pub entropy: f64,
    pub ax: f64,
    pub chi_target: f64,
    pub capped: bool,
    pub degraded: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reconstruction {
    pub image: Array1<f64>,
    /// OPUS of the final image.
    pub fit: Array2<f64>,
    pub chisq: f64,
    /// The chi-squared the run aimed for.
    pub chi_target: f64,
    pub entropy: f64,
    /// Iterations over all cycles.
    pub iterations: usize,
    pub stop: StopReason,
    pub history: Vec<IterationRecord>,
    /// Detector coefficients at the end of the run, refit if requested.
    pub coefficients: DetectorCoefficients,
}

/// Entropy of `f` relative to the flat default `def`.
pub fn entropy(f: ArrayView1<f64>, def: f64) -> f64 {
    f.iter().map(|&v| v - def - v * (v / def).ln()).sum()
}

fn chi_squared(fit: &Array2<f64>, datum: ArrayView2<f64>, weights: &Array2<f64>) -> f64 {
    let residual = fit - &datum;
    (&residual * &residual * weights).sum()
}

/// Inner product in the entropy metric, `sum(u v / f)`.
fn metric_dot(u: ArrayView1<f64>, v: ArrayView1<f64>, f: ArrayView1<f64>) -> f64 {
    Zip::from(u)
        .and(v)
        .and(f)
        .fold(0.0, |acc, &a, &b, &w| acc + a * b / w)
}

/// Squared metric norm a direction must keep, relative to its own, after removing its
/// components along the directions before it.
const DEPENDENCE_TOLERANCE: f64 = 1e-10;

/// Gram-Schmidt in the entropy metric over the columns of `xi`. Columns that are numerically
/// combinations of earlier ones are dropped, so the step system stays regular when gradients
/// line up (always on the flat starting image, and near the solution).
fn independent_directions(xi: ArrayView2<f64>, f: ArrayView1<f64>) -> Array2<f64> {
    let mut kept: Vec<Array1<f64>> = Vec::with_capacity(xi.ncols());
    for column in xi.columns() {
        let norm = metric_dot(column, column, f);
        if !(norm > 0.0) {
            continue;
        }
        let mut w = column.to_owned();
        for u in &kept {
            let overlap = metric_dot(w.view(), u.view(), f) / metric_dot(u.view(), u.view(), f);
            w.scaled_add(-overlap, u);
        }
        if metric_dot(w.view(), w.view(), f) > DEPENDENCE_TOLERANCE * norm {
            kept.push(w);
        }
    }

    let mut basis = Array2::zeros((xi.nrows(), kept.len()));
    for (k, w) in kept.iter().enumerate() {
        basis.column_mut(k).assign(w);
    }
    basis
}

enum Advance {
    Stepped(IterationRecord),
    Converged { chisq: f64, test: f64 },
}

/// Consecutive iterations whose step came from a singular system.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct SingularStreak {
    count: usize,
    limit: usize,
}

impl SingularStreak {
    fn new(limit: usize) -> Self {
        SingularStreak { count: 0, limit }
    }

    /// Counts a degraded iteration or resets on an exact one. Fails once more than `limit`
    /// degraded iterations follow each other.
    fn record(&mut self, degraded: bool, iteration: usize) -> MaxentResult<()> {
        if !degraded {
            self.count = 0;
            return Ok(());
        }
        self.count += 1;
        log::warn!(
            "iteration {iteration}: singular step system ({} in a row)",
            self.count
        );
        if self.count > self.limit {
            return Err(MaxentError::RepeatedSingular {
                iterations: self.count,
            });
        }
        Ok(())
    }
}

/// One reconstruction cycle's worth of state.
struct Iteration<'a> {
    problem: &'a MaxentProblem,
    config: &'a MaxentConfig,
    operator: MaxentOperator,
    weights: Array2<f64>,
    chizer: f64,
    state: ReconstructionState,
    singular_streak: SingularStreak,
}

impl Iteration<'_> {
    fn enter(&mut self, state: ReconstructionState) {
        log::trace!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn advance(
        &mut self,
        f: &mut Array1<f64>,
        cycle: usize,
        iteration: usize,
    ) -> MaxentResult<Advance> {
        let def = self.config.default_level;
        let n = f.len();

        self.enter(ReconstructionState::Predicting);
        let ox = self.operator.opus(f.view());

        self.enter(ReconstructionState::ComputingResidual);
        let residual = &ox - &self.problem.datum;
        let chisq = (&residual * &residual * &self.weights).sum();
        if !chisq.is_finite() {
            return Err(MaxentError::NonFinite {
                what: "chi-squared",
                iteration,
            });
        }
        if chisq <= f64::MIN_POSITIVE {
            log::warn!("data fitted exactly at iteration {iteration}, nothing left to do");
            return Ok(Advance::Converged { chisq, test: 0.0 });
        }

        self.enter(ReconstructionState::BackProjecting);
        let cgrad = self
            .operator
            .tropus((&residual * &self.weights * 2.0).view());
        let sgrad = f.mapv(|v| -(v / def).ln());
        let snorm = (&sgrad * &sgrad * &*f).sum().sqrt();
        let cnorm = (&cgrad * &cgrad * &*f).sum().sqrt();
        let tnorm = (&sgrad * &cgrad * &*f).sum();
        if cnorm == 0.0 {
            log::warn!("chi-squared gradient vanished at iteration {iteration}");
            return Ok(Advance::Converged { chisq, test: 0.0 });
        }

        // the entropy gradient is zero on the flat starting image
        let entropy_flat = snorm == 0.0;
        let (test, alpha, gamma) = if entropy_flat {
            (1.0, 1.0, 1.0 / cnorm)
        } else {
            let test = (0.5 * (1.0 - tnorm / (snorm * cnorm)).abs()).sqrt();
            if test > 0.0 {
                (test, 1.0 / (2.0 * test * snorm), 1.0 / (2.0 * test * cnorm))
            } else {
                (test, 1.0 / snorm, 1.0 / cnorm)
            }
        };

        if test < self.config.test_tolerance
            && (chisq / self.chizer - 1.0).abs() < self.config.chi_tolerance
        {
            return Ok(Advance::Converged { chisq, test });
        }

        self.enter(ReconstructionState::SolvingStep);
        let mut xi = Array2::<f64>::zeros((n, DIRECTIONS));
        xi.column_mut(0).assign(&(&*f * &cgrad / cnorm));
        xi.column_mut(1)
            .assign(&(&*f * &(&sgrad * alpha - &cgrad * gamma)));
        if self.config.fix_total {
            project_in_place(0, n, xi.view_mut());
            project_in_place(1, n, xi.view_mut());
        }

        let eta1 = self.operator.opus(xi.column(1));
        let mut third = &*f * &self.operator.tropus((&eta1 * &self.weights).view());
        let third_norm = metric_dot(third.view(), third.view(), f.view()).sqrt();
        if third_norm > 0.0 {
            third /= third_norm;
        }
        xi.column_mut(2).assign(&third);
        if self.config.fix_total {
            project_in_place(2, n, xi.view_mut());
        }

        let basis = independent_directions(xi.view(), f.view());
        let m = basis.ncols();
        if m == 0 {
            log::warn!("no usable search direction at iteration {iteration}");
            return Ok(Advance::Converged { chisq, test });
        }
        let eta: Vec<Array2<f64>> = basis
            .columns()
            .into_iter()
            .map(|direction| self.operator.opus(direction))
            .collect();

        let mut curvature = SearchCurvature::zeros(m);
        for k in 0..m {
            curvature.s1[k] = basis.column(k).dot(&sgrad);
            curvature.c1[k] = basis.column(k).dot(&cgrad) / chisq;
            for l in 0..=k {
                let s = -metric_dot(basis.column(k), basis.column(l), f.view());
                let c = 2.0 * (&eta[k] * &eta[l] * &self.weights).sum() / chisq;
                curvature.s2[[k, l]] = s;
                curvature.s2[[l, k]] = s;
                curvature.c2[[k, l]] = c;
                curvature.c2[[l, k]] = c;
            }
        }

        self.enter(ReconstructionState::LineSearching);
        let choice = choose_step(&curvature, chisq, self.chizer, f.sum(), self.config);
        if choice.beta.iter().any(|b| !b.is_finite()) {
            return Err(MaxentError::NonFinite {
                what: "step",
                iteration,
            });
        }

        self.singular_streak.record(choice.degraded, iteration)?;

        let record = IterationRecord {
            cycle,
            iteration,
            chisq,
            test,
            entropy: entropy(f.view(), def),
            ax: choice.ax,
            chi_target: choice.chi_target,
            capped: choice.capped,
            degraded: choice.degraded,
        };

        *f += &basis.dot(&choice.beta);
        let floor = self.config.floor();
        f.mapv_inplace(|v| v.max(floor));

        log::debug!(
            "cycle {cycle} iteration {iteration}: chisq {chisq:.4e} (target {:.4e}), test {test:.4}, ax {:.4}",
            choice.chi_target,
            choice.ax
        );
        Ok(Advance::Stepped(record))
    }
}

/// Fraction of the iteration budget used after `iteration` of `cycle` completed.
fn progress_fraction(cycle: usize, iteration: usize, config: &MaxentConfig) -> f32 {
    let total = config.cycles.saturating_mul(config.max_iterations);
    let done = cycle
        .saturating_mul(config.max_iterations)
        .saturating_add(iteration + 1);
    (done as f64 / total.max(1) as f64) as f32
}

fn set_progress(progress: &ProgressLock, value: f32) {
    if let Ok(mut p) = progress.write() {
        *p = Some(value);
    }
}

/// Runs the reconstruction, starting from the flat image at `config.default_level`.
///
/// `progress` receives the completed fraction; setting `abort_flag` stops the run at the next
/// iteration boundary and returns the image reached so far with [`StopReason::Aborted`].
pub fn reconstruct(
    problem: &MaxentProblem,
    config: &MaxentConfig,
    progress: &ProgressLock,
    abort_flag: &Arc<AtomicBool>,
) -> MaxentResult<Reconstruction> {
    config.validate()?;
    let start = Instant::now();

    let live = problem.live_points();
    if live == 0 {
        return Err(MaxentError::InvalidParameter {
            name: "sigma",
            value: DEAD_SIGMA,
            reason: "every data point is flagged dead",
        });
    }
    let chizer = config.chi_target_factor * live as f64;
    log::info!(
        "maxent: {} channels, {} bins x {} groups (i2 = {}), target chi-squared {chizer}",
        problem.n(),
        problem.npts(),
        problem.ngroups(),
        problem.i2()
    );
    set_progress(progress, 0.0);

    let mut run = Iteration {
        problem,
        config,
        operator: problem.operator()?,
        weights: problem.weights(),
        chizer,
        state: ReconstructionState::Initializing,
        singular_streak: SingularStreak::new(config.max_singular_steps),
    };
    let mut f = Array1::from_elem(problem.n(), config.default_level);
    let mut history = Vec::new();
    let mut stop = StopReason::MaxIterationsReached;

    'cycles: for cycle in 0..config.cycles {
        stop = StopReason::MaxIterationsReached;
        for iteration in 0..config.max_iterations {
            if abort_flag.load(Relaxed) {
                stop = StopReason::Aborted;
                break 'cycles;
            }
            match run.advance(&mut f, cycle, iteration)? {
                Advance::Stepped(record) => history.push(record),
                Advance::Converged { chisq, test } => {
                    log::debug!(
                        "cycle {cycle} converged at iteration {iteration}: chisq {chisq:.4e}, test {test:.4}"
                    );
                    stop = StopReason::Converged;
                    break;
                }
            }
            set_progress(progress, progress_fraction(cycle, iteration, config));
        }

        let last_cycle = cycle + 1 == config.cycles;
        if last_cycle {
            break;
        }
        if config.refit_phases {
            let coefficients = refit_coefficients(problem, &run.operator, f.view());
            run.operator = MaxentOperator::new(
                problem.i2(),
                problem.convol().clone(),
                coefficients,
            )?;
        } else if stop == StopReason::Converged {
            // nothing changes between cycles, another one would stop immediately
            break;
        }
    }
    run.enter(stop.into());

    let fit = run.operator.opus(f.view());
    let chisq = chi_squared(&fit, problem.datum(), &run.weights);
    let entropy = entropy(f.view(), config.default_level);
    set_progress(progress, 1.0);
    log::info!(
        "maxent finished after {} iterations ({stop:?}): chisq {chisq:.4e}, entropy {entropy:.4e}. This took {:?}",
        history.len(),
        start.elapsed()
    );

    Ok(Reconstruction {
        image: f,
        fit,
        chisq,
        chi_target: chizer,
        entropy,
        iterations: history.len(),
        stop,
        history,
        coefficients: run.operator.coefficients().clone(),
    })
}

/// [`reconstruct`] without progress reporting or cancellation.
pub fn reconstruct_simple(
    problem: &MaxentProblem,
    config: &MaxentConfig,
) -> MaxentResult<Reconstruction> {
    let progress = Arc::new(RwLock::new(None));
    let abort_flag = Arc::new(AtomicBool::new(false));
    reconstruct(problem, config, &progress, &abort_flag)
}
