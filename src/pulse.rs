//! Fourier transform of the muon pulse, applied channel by channel to the image.

use crate::error::{MaxentError, MaxentResult};
use ndarray::Array1;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PulseShape {
    /// Instantaneous pulse, no broadening.
    Delta,
    /// Parabolic pulse with full base width `width_us`.
    Parabolic { width_us: f64 },
    /// Two parabolic pulses centred at `-separation_us / 2` and `+separation_us / 2`.
    DoubleParabolic { width_us: f64, separation_us: f64 },
}

impl Display for PulseShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PulseShape::Delta => write!(f, "Delta"),
            PulseShape::Parabolic { width_us } => write!(f, "Parabolic ({width_us} us)"),
            PulseShape::DoubleParabolic {
                width_us,
                separation_us,
            } => write!(f, "Double parabolic ({width_us} us, {separation_us} us apart)"),
        }
    }
}

/// Transform of a unit-area parabola of base width `w` at frequency `f`.
fn parabolic_response(f: f64, w: f64) -> f64 {
    let x = PI * f * w;
    if x.abs() < 1e-4 {
        // series expansion, the closed form cancels catastrophically near zero
        1.0 - x * x / 10.0
    } else {
        3.0 * (x.sin() - x * x.cos()) / (x * x * x)
    }
}

fn check_width(name: &'static str, value: f64) -> MaxentResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(MaxentError::InvalidParameter {
            name,
            value,
            reason: "must be finite and non-negative",
        });
    }
    Ok(())
}

impl PulseShape {
    /// Pulse-shape vector `convol` for `n` channels spaced `fperchan` MHz apart.
    pub fn convolution(&self, n: usize, fperchan: f64) -> MaxentResult<Array1<Complex64>> {
        check_width("frequency resolution", fperchan)?;
        let response: Box<dyn Fn(f64) -> f64> = match *self {
            PulseShape::Delta => Box::new(|_| 1.0),
            PulseShape::Parabolic { width_us } => {
                check_width("pulse width", width_us)?;
                Box::new(move |f| parabolic_response(f, width_us))
            }
            PulseShape::DoubleParabolic {
                width_us,
                separation_us,
            } => {
                check_width("pulse width", width_us)?;
                check_width("pulse separation", separation_us)?;
                Box::new(move |f| parabolic_response(f, width_us) * (PI * f * separation_us).cos())
            }
        };
        Ok(Array1::from_shape_fn(n, |k| {
            Complex64::new(response(k as f64 * fperchan), 0.0)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn delta_pulse_is_flat() {
        let convol = PulseShape::Delta.convolution(8, 0.5).unwrap();
        assert!(convol.iter().all(|c| *c == Complex64::new(1.0, 0.0)));
    }

    #[test]
    fn parabolic_pulse_starts_at_one_and_decays() {
        let convol = PulseShape::Parabolic { width_us: 0.05 }
            .convolution(64, 0.5)
            .unwrap();
        assert_abs_diff_eq!(convol[0].re, 1.0, epsilon = 1e-12);
        assert!(convol[10].re < convol[1].re);
        assert!(convol.iter().all(|c| c.im == 0.0));
    }

    #[test]
    fn series_and_closed_form_agree_near_zero() {
        let w = 1.0;
        let f = 5e-5 / PI;
        let x = PI * f * w;
        let closed = 3.0 * (x.sin() - x * x.cos()) / (x * x * x);
        assert_abs_diff_eq!(parabolic_response(f, w), closed, epsilon = 1e-6);
    }

    #[test]
    fn double_pulse_has_zero_at_half_inverse_separation() {
        let separation_us = 0.32;
        let fperchan = 1.0 / (2.0 * separation_us);
        let convol = PulseShape::DoubleParabolic {
            width_us: 0.0,
            separation_us,
        }
        .convolution(2, fperchan)
        .unwrap();
        assert_abs_diff_eq!(convol[1].re, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn rejects_negative_width() {
        assert!(PulseShape::Parabolic { width_us: -1.0 }
            .convolution(4, 1.0)
            .is_err());
    }
}
