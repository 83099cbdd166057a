//! Frequency and field axes for a reconstructed image.

use crate::error::{MaxentError, MaxentResult};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// Muon gyromagnetic ratio over 2 pi, MHz per gauss.
pub const MUON_GAMMA_MHZ_PER_GAUSS: f64 = 0.013_553_88;

/// Channel spacing in MHz for time bins `bin_width_us` wide padded to `i2` points.
pub fn frequency_resolution(bin_width_us: f64, i2: usize) -> MaxentResult<f64> {
    if !bin_width_us.is_finite() || bin_width_us <= 0.0 {
        return Err(MaxentError::InvalidParameter {
            name: "bin width",
            value: bin_width_us,
            reason: "must be positive and finite",
        });
    }
    if i2 == 0 {
        return Err(MaxentError::shape("padded length i2", "at least 1", 0));
    }
    Ok(1.0 / (bin_width_us * i2 as f64))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub frequencies_mhz: Array1<f64>,
    pub amplitudes: Array1<f64>,
}

impl Spectrum {
    pub fn from_image(image: ArrayView1<f64>, fperchan: f64) -> Self {
        Spectrum {
            frequencies_mhz: Array1::from_shape_fn(image.len(), |k| k as f64 * fperchan),
            amplitudes: image.to_owned(),
        }
    }

    pub fn len(&self) -> usize {
        self.amplitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amplitudes.is_empty()
    }

    /// The frequency axis expressed as muon precession fields.
    pub fn fields_gauss(&self) -> Array1<f64> {
        self.frequencies_mhz.mapv(|f| f / MUON_GAMMA_MHZ_PER_GAUSS)
    }

    /// `(frequency, amplitude)` of the highest channel.
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.amplitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, &amplitude)| (self.frequencies_mhz[k], amplitude))
    }
}
