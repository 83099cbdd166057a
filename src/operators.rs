//! Forward (OPUS) and transpose (TROPUS) operators between the frequency image and the
//! grouped time-domain data.
//!
//! The two are exact adjoints with respect to the real inner product:
//! `sum(opus(x) * ox) == sum(x * tropus(ox))` up to rounding. The maximum entropy iteration
//! relies on this to turn residuals into chi-squared gradients, so any change to the scaling
//! or sign convention of one must be mirrored in the other.

use crate::detector::DetectorCoefficients;
use crate::error::{MaxentError, MaxentResult};
use crate::fft::FftPair;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use num_complex::Complex64;
use num_traits::Zero;

/// Checks that `convol`, `coefficients` and the padded length `i2` describe a usable operator,
/// without planning any transform.
pub fn check_operator_inputs(
    i2: usize,
    convol: &Array1<Complex64>,
    coefficients: &DetectorCoefficients,
) -> MaxentResult<()> {
    if convol.is_empty() {
        return Err(MaxentError::shape("pulse shape", "at least 1 channel", 0));
    }
    if i2 < convol.len() {
        return Err(MaxentError::shape(
            "padded length i2",
            format!(">= {} image channels", convol.len()),
            i2,
        ));
    }
    if i2 < coefficients.npts() {
        return Err(MaxentError::shape(
            "padded length i2",
            format!(">= {} time bins", coefficients.npts()),
            i2,
        ));
    }
    if convol.iter().any(|c| !c.re.is_finite() || !c.im.is_finite()) {
        return Err(MaxentError::InvalidParameter {
            name: "pulse shape",
            value: f64::NAN,
            reason: "all entries must be finite",
        });
    }
    Ok(())
}

/// OPUS/TROPUS with the transforms planned once and the problem data attached.
#[derive(Clone, Debug)]
pub struct MaxentOperator {
    fft: FftPair,
    convol: Array1<Complex64>,
    coefficients: DetectorCoefficients,
}

impl MaxentOperator {
    pub fn new(
        i2: usize,
        convol: Array1<Complex64>,
        coefficients: DetectorCoefficients,
    ) -> MaxentResult<Self> {
        check_operator_inputs(i2, &convol, &coefficients)?;
        Ok(MaxentOperator {
            fft: FftPair::new(i2),
            convol,
            coefficients,
        })
    }

    /// Number of image channels `n`.
    pub fn n(&self) -> usize {
        self.convol.len()
    }

    /// Number of time bins `npts`.
    pub fn npts(&self) -> usize {
        self.coefficients.npts()
    }

    pub fn ngroups(&self) -> usize {
        self.coefficients.ngroups()
    }

    /// Padded transform length `i2`.
    pub fn i2(&self) -> usize {
        self.fft.len()
    }

    pub fn convol(&self) -> &Array1<Complex64> {
        &self.convol
    }

    pub fn coefficients(&self) -> &DetectorCoefficients {
        &self.coefficients
    }

    /// The first `npts` samples of the unscaled inverse transform of `x * convol`.
    ///
    /// # Panics
    /// If `x.len() != self.n()`.
    pub fn time_signal(&self, x: ArrayView1<f64>) -> Array1<Complex64> {
        assert_eq!(x.len(), self.n(), "image length must match the pulse shape");
        let mut buffer = vec![Complex64::zero(); self.i2()];
        for (slot, (&xi, &c)) in buffer.iter_mut().zip(x.iter().zip(self.convol.iter())) {
            *slot = c * xi;
        }
        self.fft.inverse_unscaled(&mut buffer);
        buffer.truncate(self.npts());
        Array1::from(buffer)
    }

    /// OPUS: predicted signal `ox[t, g] = (Re y[t] a[g] + Im y[t] b[g]) e[t]`.
    ///
    /// # Panics
    /// If `x.len() != self.n()`.
    pub fn opus(&self, x: ArrayView1<f64>) -> Array2<f64> {
        let y = self.time_signal(x);
        let DetectorCoefficients { a, b, e } = &self.coefficients;
        Array2::from_shape_fn((self.npts(), self.ngroups()), |(t, g)| {
            (y[t].re * a[g] + y[t].im * b[g]) * e[t]
        })
    }

    /// TROPUS: back-projects a `(npts, ngroups)` matrix into image space.
    ///
    /// # Panics
    /// If `ox` is not `(npts, ngroups)`.
    pub fn tropus(&self, ox: ArrayView2<f64>) -> Array1<f64> {
        assert_eq!(
            ox.dim(),
            (self.npts(), self.ngroups()),
            "data matrix must be (npts, ngroups)"
        );
        let DetectorCoefficients { a, b, e } = &self.coefficients;
        let along_a = ox.dot(a);
        let along_b = ox.dot(b);

        let mut buffer = vec![Complex64::zero(); self.i2()];
        for t in 0..self.npts() {
            buffer[t] = Complex64::new(along_a[t] * e[t], along_b[t] * e[t]);
        }
        self.fft.forward(&mut buffer);

        Array1::from_shape_fn(self.n(), |k| {
            buffer[k].re * self.convol[k].re + buffer[k].im * self.convol[k].im
        })
    }
}

/// OPUS on loose inputs. Plans a transform per call; use [`MaxentOperator`] in loops.
pub fn opus(
    x: ArrayView1<f64>,
    i2: usize,
    convol: &Array1<Complex64>,
    coefficients: &DetectorCoefficients,
) -> MaxentResult<Array2<f64>> {
    if x.len() != convol.len() {
        return Err(MaxentError::shape("image", convol.len(), x.len()));
    }
    let operator = MaxentOperator::new(i2, convol.clone(), coefficients.clone())?;
    Ok(operator.opus(x))
}

/// TROPUS on loose inputs. Plans a transform per call; use [`MaxentOperator`] in loops.
pub fn tropus(
    ox: ArrayView2<f64>,
    i2: usize,
    convol: &Array1<Complex64>,
    coefficients: &DetectorCoefficients,
) -> MaxentResult<Array1<f64>> {
    let expected = (coefficients.npts(), coefficients.ngroups());
    if ox.dim() != expected {
        return Err(MaxentError::shape(
            "data matrix",
            format!("{expected:?}"),
            format!("{:?}", ox.dim()),
        ));
    }
    let operator = MaxentOperator::new(i2, convol.clone(), coefficients.clone())?;
    Ok(operator.tropus(ox))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::f64::consts::FRAC_1_SQRT_2;

    fn delta_pulse(n: usize) -> Array1<Complex64> {
        let mut convol = Array1::from_elem(n, Complex64::zero());
        convol[0] = Complex64::new(1.0, 0.0);
        convol
    }

    #[test]
    fn opus_of_dc_image_with_delta_pulse() {
        let coefficients =
            DetectorCoefficients::new(array![1.0, 1.0], array![0.0, 0.0], array![1.0, 1.0])
                .unwrap();
        let ox = opus(array![1.0, 0.0, 0.0, 0.0].view(), 8, &delta_pulse(4), &coefficients)
            .unwrap();
        assert_eq!(ox.dim(), (2, 2));
        for v in ox.iter() {
            assert_abs_diff_eq!(*v, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn opus_samples_a_pure_tone() {
        // channel 1 of an 8-point transform rotates by pi/4 per bin
        let coefficients =
            DetectorCoefficients::new(array![1.0, 0.0], array![0.0, 1.0], array![1.0, 0.5])
                .unwrap();
        let convol = Array1::from_elem(4, Complex64::new(1.0, 0.0));
        let ox = opus(array![0.0, 1.0, 0.0, 0.0].view(), 8, &convol, &coefficients).unwrap();

        let expected = array![[1.0, 0.0], [0.5 * FRAC_1_SQRT_2, 0.5 * FRAC_1_SQRT_2]];
        for (v, w) in ox.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*v, *w, epsilon = 1e-12);
        }
    }

    #[test]
    fn tropus_of_single_bin_is_a_cosine() {
        let coefficients =
            DetectorCoefficients::new(array![1.0, 1.0], array![0.0, 0.0], array![1.0, 1.0])
                .unwrap();
        let convol = Array1::from_elem(4, Complex64::new(1.0, 0.0));
        let x = tropus(array![[0.0, 0.0], [1.0, 0.0]].view(), 8, &convol, &coefficients).unwrap();

        let expected = [1.0, FRAC_1_SQRT_2, 0.0, -FRAC_1_SQRT_2];
        for (v, w) in x.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*v, *w, epsilon = 1e-12);
        }
    }

    #[test]
    fn zero_inputs_map_to_zero() {
        let coefficients =
            DetectorCoefficients::new(array![0.3, -1.2], array![0.7, 0.4], array![1.0, 0.9, 0.8])
                .unwrap();
        let convol = Array1::from_elem(4, Complex64::new(0.5, -0.25));
        let operator = MaxentOperator::new(8, convol, coefficients).unwrap();

        assert!(operator.opus(Array1::zeros(4).view()).iter().all(|v| *v == 0.0));
        assert!(operator
            .tropus(Array2::zeros((3, 2)).view())
            .iter()
            .all(|v| *v == 0.0));
    }

    #[test]
    fn adjoint_on_fixed_inputs() {
        let coefficients = DetectorCoefficients::new(
            array![0.9, -0.4, 0.1],
            array![0.2, 0.8, -0.6],
            array![1.0, 0.8, 0.6, 0.5, 0.3],
        )
        .unwrap();
        let convol = array![
            Complex64::new(1.0, 0.0),
            Complex64::new(0.8, 0.3),
            Complex64::new(0.4, -0.5),
            Complex64::new(-0.2, 0.1),
        ];
        let operator = MaxentOperator::new(8, convol, coefficients).unwrap();
        let x = array![0.5, 1.5, -0.25, 2.0];
        let ox = Array2::from_shape_fn((5, 3), |(t, g)| ((t * 3 + g) as f64 * 0.37).sin());

        let lhs = (&operator.opus(x.view()) * &ox).sum();
        let rhs = x.dot(&operator.tropus(ox.view()));
        assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-10);
    }

    #[test]
    fn rejects_short_padding() {
        let coefficients =
            DetectorCoefficients::new(array![1.0], array![0.0], Array1::ones(16)).unwrap();
        let result = MaxentOperator::new(8, delta_pulse(4), coefficients);
        assert!(matches!(result, Err(MaxentError::ShapeMismatch { .. })));
    }

    #[test]
    fn input_check_matches_constructor() {
        let coefficients =
            DetectorCoefficients::new(array![1.0], array![0.0], Array1::ones(6)).unwrap();
        assert!(check_operator_inputs(8, &delta_pulse(4), &coefficients).is_ok());
        assert!(check_operator_inputs(4, &delta_pulse(4), &coefficients).is_err());
        assert!(check_operator_inputs(8, &Array1::zeros(0), &coefficients).is_err());

        let mut convol = delta_pulse(4);
        convol[2] = Complex64::new(f64::INFINITY, 0.0);
        assert!(matches!(
            check_operator_inputs(8, &convol, &coefficients),
            Err(MaxentError::InvalidParameter { name: "pulse shape", .. })
        ));
        assert!(MaxentOperator::new(8, convol, coefficients).is_err());
    }

    #[test]
    fn loose_functions_check_shapes() {
        let coefficients =
            DetectorCoefficients::new(array![1.0], array![0.0], array![1.0, 1.0]).unwrap();
        assert!(opus(array![1.0, 2.0].view(), 8, &delta_pulse(4), &coefficients).is_err());
        assert!(tropus(Array2::zeros((3, 1)).view(), 8, &delta_pulse(4), &coefficients).is_err());
    }
}
