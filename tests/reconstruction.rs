//! End-to-end reconstructions of synthetic muon histograms.

use muon_maxent::prelude::*;
use ndarray::{Array1, Array2};
use std::f64::consts::{FRAC_PI_2, PI};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

const NPTS: usize = 256;
const CHANNELS: usize = 128;
const BIN_US: f64 = 0.016;
const ASYMMETRY: f64 = 0.2;

fn group_phases() -> Array1<f64> {
    Array1::from_shape_fn(4, |g| g as f64 * FRAC_PI_2)
}

/// Expected counts of four groups seeing a precession that falls exactly on `channel`.
fn histogram(channel: usize) -> (Array2<f64>, Array1<f64>) {
    let time = Array1::from_shape_fn(NPTS, |t| t as f64 * BIN_US);
    let i2 = padded_length(NPTS, CHANNELS);
    let fperchan = frequency_resolution(BIN_US, i2).unwrap();
    let omega = 2.0 * PI * channel as f64 * fperchan;
    let phases = group_phases();
    let counts = Array2::from_shape_fn((NPTS, 4), |(t, g)| {
        let decay = (-time[t] / MUON_LIFETIME_US).exp();
        1e4 * decay * (1.0 + ASYMMETRY * (omega * time[t] - phases[g]).cos())
    });
    (counts, time)
}

fn problem(channel: usize) -> (MaxentProblem, f64) {
    let (counts, time) = histogram(channel);
    let data = MuonData::from_counts(counts.view(), time.view(), MUON_LIFETIME_US).unwrap();
    let i2 = padded_length(data.npts(), CHANNELS);
    let fperchan = frequency_resolution(BIN_US, i2).unwrap();
    let coefficients = data.coefficients(ASYMMETRY, group_phases().view()).unwrap();
    let convol = PulseShape::Delta.convolution(CHANNELS, fperchan).unwrap();
    (data.into_problem(coefficients, convol, i2).unwrap(), fperchan)
}

fn peak_channel(image: &Array1<f64>) -> usize {
    image
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(k, _)| k)
        .unwrap()
}

#[test]
fn finds_the_precession_frequency() {
    let (problem, fperchan) = problem(20);
    let config = MaxentConfig {
        max_iterations: 50,
        ..MaxentConfig::default()
    };
    let result = reconstruct_simple(&problem, &config).unwrap();

    assert_ne!(result.stop, StopReason::Aborted);
    assert!(result.chisq < result.history[0].chisq);
    assert_eq!(peak_channel(&result.image), 20);

    let spectrum = Spectrum::from_image(result.image.view(), fperchan);
    let (frequency, _) = spectrum.peak().unwrap();
    assert!((frequency - 20.0 * fperchan).abs() < 1e-12);
    assert!(spectrum.fields_gauss()[20] > 0.0);
}

#[test]
fn history_is_serializable() {
    let (problem, _) = problem(12);
    let config = MaxentConfig {
        max_iterations: 3,
        ..MaxentConfig::default()
    };
    let result = reconstruct_simple(&problem, &config).unwrap();
    let json = serde_json::to_string(&result.history).unwrap();
    assert!(json.contains("\"chisq\""));
    assert_eq!(result.history.len(), 3);
}

#[test]
fn phase_refit_stays_near_true_phases() {
    let (problem, _) = problem(30);
    let config = MaxentConfig {
        max_iterations: 30,
        cycles: 2,
        refit_phases: true,
        ..MaxentConfig::default()
    };
    let result = reconstruct_simple(&problem, &config).unwrap();
    let phases = result.coefficients.phases();
    for (fitted, truth) in phases.iter().zip(group_phases().iter()) {
        let mut delta = (fitted - truth).rem_euclid(2.0 * PI);
        if delta > PI {
            delta -= 2.0 * PI;
        }
        assert!(delta.abs() < 0.3, "phase {fitted} against {truth}");
    }
    assert_eq!(peak_channel(&result.image), 30);
}

#[test]
fn batch_reconstructs_each_spectrum() {
    let channels = [8, 40];
    let problems: Vec<_> = channels.iter().map(|&c| problem(c).0).collect();
    let config = MaxentConfig {
        max_iterations: 40,
        ..MaxentConfig::default()
    };
    let abort_flag = Arc::new(AtomicBool::new(false));
    let results = reconstruct_batch(&problems, &config, &abort_flag, true);

    assert_eq!(results.len(), 2);
    for ((index, result), channel) in results.iter().zip(channels) {
        let result = result.as_ref().unwrap();
        assert_eq!(peak_channel(&result.image), channel, "spectrum {index}");
    }
}
