//! Turns raw histogram counts into the data the reconstruction fits.
//!
//! Each group's counts follow `n0 * exp(-t / tau) * (1 + asymmetry)`. The decay envelope is
//! estimated per group and subtracted, leaving the oscillating part as `datum` with Poisson
//! errors. The envelope shape itself becomes the efficiency vector `e` shared by all groups.

use crate::detector::{decay_weights, DetectorCoefficients};
use crate::error::{MaxentError, MaxentResult};
use crate::maxent::MaxentProblem;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use num_complex::Complex64;

/// Muon lifetime in microseconds.
pub const MUON_LIFETIME_US: f64 = 2.196_981;

/// Error assigned to points that must not contribute to chi-squared.
pub const DEAD_SIGMA: f64 = 1e15;

/// Background-subtracted, error-weighted histograms ready for [`MaxentProblem`].
#[derive(Clone, Debug, PartialEq)]
pub struct MuonData {
    /// Oscillating part of the counts, `(npts, ngroups)`.
    pub datum: Array2<f64>,
    pub sigma: Array2<f64>,
    /// Decay weights, one per time bin.
    pub e: Array1<f64>,
    /// Fitted normalisation of each group, zero for dead groups.
    pub n0: Array1<f64>,
}

impl MuonData {
    /// `counts` is `(npts, ngroups)` with bin start times `time_us`.
    pub fn from_counts(
        counts: ArrayView2<f64>,
        time_us: ArrayView1<f64>,
        lifetime_us: f64,
    ) -> MaxentResult<Self> {
        let (npts, ngroups) = counts.dim();
        if npts == 0 || ngroups == 0 {
            return Err(MaxentError::shape(
                "counts",
                "at least one bin and one group",
                format!("{:?}", counts.dim()),
            ));
        }
        if time_us.len() != npts {
            return Err(MaxentError::shape("bin times", npts, time_us.len()));
        }
        if !lifetime_us.is_finite() || lifetime_us <= 0.0 {
            return Err(MaxentError::InvalidParameter {
                name: "lifetime",
                value: lifetime_us,
                reason: "must be positive and finite",
            });
        }
        if let Some(&value) = counts.iter().find(|c| !c.is_finite() || **c < 0.0) {
            return Err(MaxentError::InvalidParameter {
                name: "counts",
                value,
                reason: "counts must be finite and non-negative",
            });
        }

        let e = decay_weights(time_us, lifetime_us);
        let weight_sum = e.sum();
        let n0 = counts.sum_axis(Axis(0)) / weight_sum;

        let mut datum = Array2::zeros((npts, ngroups));
        let mut sigma = Array2::zeros((npts, ngroups));
        for (g, &norm) in n0.iter().enumerate() {
            if norm == 0.0 {
                log::debug!("group {g} has no counts, excluding it from the fit");
                sigma.column_mut(g).fill(DEAD_SIGMA);
                continue;
            }
            for t in 0..npts {
                let c = counts[[t, g]];
                datum[[t, g]] = c - norm * e[t];
                sigma[[t, g]] = c.max(1.0).sqrt();
            }
        }

        Ok(MuonData {
            datum,
            sigma,
            e,
            n0,
        })
    }

    pub fn npts(&self) -> usize {
        self.datum.nrows()
    }

    pub fn ngroups(&self) -> usize {
        self.datum.ncols()
    }

    /// Groups that carry counts.
    pub fn live_groups(&self) -> usize {
        self.n0.iter().filter(|n| **n > 0.0).count()
    }

    /// Mixing coefficients for groups at `phases` (radians) seeing a common `asymmetry`,
    /// scaled by each group's normalisation.
    pub fn coefficients(
        &self,
        asymmetry: f64,
        phases: ArrayView1<f64>,
    ) -> MaxentResult<DetectorCoefficients> {
        if phases.len() != self.ngroups() {
            return Err(MaxentError::shape("group phases", self.ngroups(), phases.len()));
        }
        let amplitudes = &self.n0 * asymmetry;
        DetectorCoefficients::from_phases(amplitudes.view(), phases, self.e.clone())
    }

    pub fn into_problem(
        self,
        coefficients: DetectorCoefficients,
        convol: Array1<Complex64>,
        i2: usize,
    ) -> MaxentResult<MaxentProblem> {
        MaxentProblem::new(self.datum, self.sigma, coefficients, convol, i2)
    }
}
