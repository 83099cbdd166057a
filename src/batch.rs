//! Reconstruction of many independent spectra, e.g. one per temperature or field point.
//!
//! Runs are independent so they go to the Rayon pool whole; a single reconstruction stays
//! sequential.

use crate::config::MaxentConfig;
use crate::error::MaxentResult;
use crate::maxent::{reconstruct, MaxentProblem, Reconstruction};
use cancellable_loops::{map_cancellable, par_map_cancellable};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Reconstructs every problem with the same configuration.
///
/// The abort flag is shared with the runs: raising it stops the running ones at their next
/// iteration (they report [`crate::StopReason::Aborted`]) and skips those that had not started.
/// Skipped problems are missing from the result, which is ordered by problem index.
pub fn reconstruct_batch(
    problems: &[MaxentProblem],
    config: &MaxentConfig,
    abort_flag: &Arc<AtomicBool>,
    parallel: bool,
) -> Vec<(usize, MaxentResult<Reconstruction>)> {
    let start = Instant::now();
    let run = |i: usize, problem: &MaxentProblem| {
        let progress = Arc::new(RwLock::new(None));
        let result = reconstruct(problem, config, &progress, abort_flag);
        if let Err(err) = &result {
            log::error!("spectrum {i}: {err}");
        }
        result
    };

    let results = if parallel {
        par_map_cancellable(problems, abort_flag, run)
    } else {
        map_cancellable(problems, abort_flag, run)
    };

    let finished: Vec<_> = results
        .into_iter()
        .enumerate()
        .filter_map(|(i, result)| result.map(|r| (i, r)))
        .collect();
    log::info!(
        "reconstructed {} of {} spectra. This took {:?}",
        finished.len(),
        problems.len(),
        start.elapsed()
    );
    finished
}
