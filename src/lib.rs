//! Maximum entropy reconstruction of muon spin rotation frequency spectra.
//!
//! The unknown is a positive frequency image `f`. The forward operator ([`opus`]) turns it
//! into the time-domain signal of every detector group, the transpose ([`tropus`]) carries
//! time-domain residuals back to the image. [`reconstruct`] iterates towards the image of
//! maximum entropy whose prediction fits the data to the expected chi-squared.
//!
//! ```no_run
//! use muon_maxent::prelude::*;
//! # fn run(counts: ndarray::Array2<f64>, time_us: ndarray::Array1<f64>) -> MaxentResult<()> {
//! let data = MuonData::from_counts(counts.view(), time_us.view(), MUON_LIFETIME_US)?;
//! let n = 512;
//! let i2 = padded_length(data.npts(), n);
//! let fperchan = frequency_resolution(time_us[1] - time_us[0], i2)?;
//! let phases = ndarray::Array1::linspace(0.0, 1.5 * std::f64::consts::PI, data.ngroups());
//! let coefficients = data.coefficients(0.2, phases.view())?;
//! let convol = PulseShape::Parabolic { width_us: 0.05 }.convolution(n, fperchan)?;
//!
//! let problem = data.into_problem(coefficients, convol, i2)?;
//! let result = reconstruct_simple(&problem, &MaxentConfig::default())?;
//! let spectrum = Spectrum::from_image(result.image.view(), fperchan);
//! if let Some((frequency, _)) = spectrum.peak() {
//!     log::info!("strongest line at {frequency:.3} MHz");
//! }
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod detector;
pub mod error;
pub mod fft;
pub mod line_search;
pub mod linalg;
pub mod maxent;
pub mod operators;
pub mod phase_fit;
pub mod prepare;
pub mod pulse;
pub mod spectrum;
pub mod step;

pub use batch::reconstruct_batch;
pub use config::MaxentConfig;
pub use detector::DetectorCoefficients;
pub use error::{MaxentError, MaxentResult, SingularSystem};
pub use maxent::{
    reconstruct, reconstruct_simple, IterationRecord, MaxentProblem, ProgressLock,
    Reconstruction, ReconstructionState, StopReason,
};
pub use operators::{opus, tropus, MaxentOperator};
pub use step::{chinow, dist, project, project_in_place, SearchCurvature, SolveStatus};

pub mod prelude {
    pub use crate::batch::reconstruct_batch;
    pub use crate::config::MaxentConfig;
    pub use crate::detector::DetectorCoefficients;
    pub use crate::error::{MaxentError, MaxentResult};
    pub use crate::fft::padded_length;
    pub use crate::maxent::{reconstruct, reconstruct_simple, MaxentProblem, StopReason};
    pub use crate::prepare::{MuonData, MUON_LIFETIME_US};
    pub use crate::pulse::PulseShape;
    pub use crate::spectrum::{frequency_resolution, Spectrum};
}
