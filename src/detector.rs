//! Per-group mixing coefficients and per-bin efficiency weights.
//!
//! A detector group `g` sees the real and imaginary parts of the precessing signal mixed as
//! `a[g] * Re + b[g] * Im`, which for a group at phase `phi` with amplitude `A` is
//! `a = A cos(phi)` and `b = A sin(phi)`. The efficiency vector `e` is shared by all groups and
//! carries one weight per time bin, usually the muon decay `exp(-t / tau)`.

use crate::error::{MaxentError, MaxentResult};
use ndarray::{Array1, ArrayView1, Zip};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorCoefficients {
    /// Real-part mixing, one entry per group.
    pub a: Array1<f64>,
    /// Imaginary-part mixing, one entry per group.
    pub b: Array1<f64>,
    /// Efficiency weight, one entry per time bin.
    pub e: Array1<f64>,
}

impl DetectorCoefficients {
    pub fn new(a: Array1<f64>, b: Array1<f64>, e: Array1<f64>) -> MaxentResult<Self> {
        if a.is_empty() {
            return Err(MaxentError::shape("detector groups", "at least 1", 0));
        }
        if b.len() != a.len() {
            return Err(MaxentError::shape("coefficient b", a.len(), b.len()));
        }
        if e.is_empty() {
            return Err(MaxentError::shape("efficiency e", "at least 1", 0));
        }
        let finite = a.iter().chain(b.iter()).chain(e.iter()).all(|v| v.is_finite());
        if !finite {
            return Err(MaxentError::InvalidParameter {
                name: "detector coefficients",
                value: f64::NAN,
                reason: "all coefficients must be finite",
            });
        }
        Ok(DetectorCoefficients { a, b, e })
    }

    /// Builds the mixing coefficients from group amplitudes and phases (radians).
    pub fn from_phases(
        amplitudes: ArrayView1<f64>,
        phases: ArrayView1<f64>,
        e: Array1<f64>,
    ) -> MaxentResult<Self> {
        if amplitudes.len() != phases.len() {
            return Err(MaxentError::shape("group phases", amplitudes.len(), phases.len()));
        }
        let mut a = Array1::zeros(phases.len());
        let mut b = Array1::zeros(phases.len());
        Zip::from(&mut a)
            .and(&mut b)
            .and(amplitudes)
            .and(phases)
            .for_each(|a, b, &amp, &phi| {
                *a = amp * phi.cos();
                *b = amp * phi.sin();
            });
        Self::new(a, b, e)
    }

    pub fn ngroups(&self) -> usize {
        self.a.len()
    }

    pub fn npts(&self) -> usize {
        self.e.len()
    }

    /// Group phases in radians, `atan2(b, a)`.
    pub fn phases(&self) -> Array1<f64> {
        Zip::from(&self.a)
            .and(&self.b)
            .map_collect(|&a, &b| b.atan2(a))
    }

    /// Group amplitudes, `sqrt(a^2 + b^2)`.
    pub fn amplitudes(&self) -> Array1<f64> {
        Zip::from(&self.a)
            .and(&self.b)
            .map_collect(|&a, &b| a.hypot(b))
    }
}

/// Muon decay weights `exp(-t / lifetime)` for the given bin times.
pub fn decay_weights(time: ArrayView1<f64>, lifetime: f64) -> Array1<f64> {
    time.mapv(|t| (-t / lifetime).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn phases_round_trip_through_mixing_coefficients() {
        let amplitudes = array![1.0, 2.0, 0.5];
        let phases = array![0.0, FRAC_PI_2, -1.0];
        let coefficients =
            DetectorCoefficients::from_phases(amplitudes.view(), phases.view(), array![1.0, 1.0])
                .unwrap();

        assert_abs_diff_eq!(coefficients.a[1], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(coefficients.b[1], 2.0, epsilon = 1e-12);
        for g in 0..3 {
            assert_abs_diff_eq!(coefficients.phases()[g], phases[g], epsilon = 1e-12);
            assert_abs_diff_eq!(coefficients.amplitudes()[g], amplitudes[g], epsilon = 1e-12);
        }
        assert_eq!(coefficients.ngroups(), 3);
        assert_eq!(coefficients.npts(), 2);
    }

    #[test]
    fn rejects_mismatched_group_lengths() {
        let result = DetectorCoefficients::new(array![1.0, 1.0], array![0.0], array![1.0]);
        assert!(matches!(result, Err(MaxentError::ShapeMismatch { .. })));
    }

    #[test]
    fn decay_weights_follow_lifetime() {
        let w = decay_weights(array![0.0, 2.0].view(), 2.0);
        assert_abs_diff_eq!(w[0], 1.0);
        assert_abs_diff_eq!(w[1], (-1.0f64).exp(), epsilon = 1e-15);
    }
}
