//! Planned complex FFTs of the padded length `i2`.
//!
//! rustfft leaves both directions unnormalized. That matches the forward operator, which
//! needs the inverse transform multiplied by `i2`, and the transpose operator, which uses the
//! plain forward transform. Nothing here rescales, so the pair stays exactly adjoint.

use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Returns the padded transform length for `npts` time bins and `n` image channels:
/// the next power of two of the larger of the two.
pub fn padded_length(npts: usize, n: usize) -> usize {
    npts.max(n).max(1).next_power_of_two()
}

/// Forward and inverse transforms planned once per reconstruction.
#[derive(Clone)]
pub struct FftPair {
    len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl Debug for FftPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftPair").field("len", &self.len).finish()
    }
}

impl FftPair {
    pub fn new(len: usize) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        FftPair {
            len,
            forward: planner.plan_fft_forward(len),
            inverse: planner.plan_fft_inverse(len),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// In-place `y[k] = sum_t x[t] exp(-2 pi i k t / len)`.
    pub fn forward(&self, buffer: &mut [Complex64]) {
        debug_assert_eq!(buffer.len(), self.len);
        self.forward.process(buffer);
    }

    /// In-place `y[t] = sum_k x[k] exp(+2 pi i k t / len)`, without the `1/len` factor.
    pub fn inverse_unscaled(&self, buffer: &mut [Complex64]) {
        debug_assert_eq!(buffer.len(), self.len);
        self.inverse.process(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn padded_length_is_power_of_two() {
        assert_eq!(padded_length(100, 50), 128);
        assert_eq!(padded_length(64, 64), 64);
        assert_eq!(padded_length(3, 17), 32);
        assert_eq!(padded_length(0, 0), 1);
    }

    #[test]
    fn inverse_of_delta_is_flat_and_unscaled() {
        let pair = FftPair::new(8);
        let mut buffer = vec![Complex64::new(0.0, 0.0); 8];
        buffer[0] = Complex64::new(1.0, 0.0);
        pair.inverse_unscaled(&mut buffer);
        for v in &buffer {
            assert_abs_diff_eq!(v.re, 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(v.im, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn round_trip_scales_by_length() {
        let pair = FftPair::new(16);
        let original: Vec<Complex64> = (0..16)
            .map(|i| Complex64::new(i as f64, -(i as f64) * 0.5))
            .collect();
        let mut buffer = original.clone();
        pair.forward(&mut buffer);
        pair.inverse_unscaled(&mut buffer);
        for (v, o) in buffer.iter().zip(original.iter()) {
            assert_abs_diff_eq!(v.re, 16.0 * o.re, epsilon = 1e-9);
            assert_abs_diff_eq!(v.im, 16.0 * o.im, epsilon = 1e-9);
        }
    }
}
