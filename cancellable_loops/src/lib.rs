//! # cancellable_loops
//!
//! A small utility crate for running a closure over a slice of independent jobs, either
//! sequentially or in parallel with Rayon, while allowing the whole run to be cancelled.
//!
//! Every job is checked against an abort flag before it starts. Jobs that already started
//! run to completion; jobs that had not started when the flag was raised are skipped and
//! reported as `None`. Results keep the order of the input slice, so the caller can tell
//! which jobs finished.
//!
//! ## Example
//!
//! ```
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use cancellable_loops::map_cancellable;
//!
//! let abort_flag = AtomicBool::new(false);
//! let spectra = [1.0, 2.0, 3.0, 4.0];
//!
//! let results = map_cancellable(&spectra, &abort_flag, |i, value| {
//!     if i == 1 {
//!         abort_flag.store(true, Ordering::Relaxed);
//!     }
//!     value * 2.0
//! });
//!
//! assert_eq!(results, vec![Some(2.0), Some(4.0), None, None]);
//! ```

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// Maps `func` over `items` in order, stopping as soon as the abort flag is set.
///
/// `func` receives the index of the item and a reference to it. The returned vector has
/// the same length as `items`; entries whose job was skipped are `None`.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::AtomicBool;
/// use cancellable_loops::map_cancellable;
///
/// let abort_flag = AtomicBool::new(false);
/// let squares = map_cancellable(&[1, 2, 3], &abort_flag, |_, v| v * v);
/// assert_eq!(squares, vec![Some(1), Some(4), Some(9)]);
/// ```
pub fn map_cancellable<T, R, F>(items: &[T], abort_flag: &AtomicBool, mut func: F) -> Vec<Option<R>>
where
    F: FnMut(usize, &T) -> R,
{
    let mut results = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        if abort_flag.load(Ordering::Relaxed) {
            break;
        }
        results.push(Some(func(i, item)));
    }
    results.resize_with(items.len(), || None);
    results
}

/// Parallel version of [`map_cancellable`].
///
/// Jobs are distributed over the Rayon thread pool. A job that has not been picked up
/// before the abort flag is set is skipped and yields `None`. The output order matches
/// the input order regardless of the order in which the jobs ran.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use cancellable_loops::par_map_cancellable;
///
/// let abort_flag = AtomicBool::new(false);
/// let doubled = par_map_cancellable(&[1.0, 2.0, 3.0], &abort_flag, |_, v| v * 2.0);
/// assert_eq!(doubled, vec![Some(2.0), Some(4.0), Some(6.0)]);
///
/// // Nothing runs once the flag is raised.
/// abort_flag.store(true, Ordering::Relaxed);
/// let skipped = par_map_cancellable(&[1.0, 2.0], &abort_flag, |_, v| v * 2.0);
/// assert_eq!(skipped, vec![None, None]);
/// ```
pub fn par_map_cancellable<T, R, F>(items: &[T], abort_flag: &AtomicBool, func: F) -> Vec<Option<R>>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> R + Sync + Send,
{
    items
        .par_iter()
        .enumerate()
        .map(|(i, item)| {
            if abort_flag.load(Ordering::Relaxed) {
                None
            } else {
                Some(func(i, item))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_map_stops_after_abort() {
        let abort_flag = AtomicBool::new(false);
        let items: Vec<usize> = (0..10).collect();
        let results = map_cancellable(&items, &abort_flag, |i, v| {
            if i == 3 {
                abort_flag.store(true, Ordering::Relaxed);
            }
            v + 1
        });
        assert_eq!(results.len(), 10);
        assert_eq!(results.iter().filter(|r| r.is_some()).count(), 4);
        assert_eq!(results[3], Some(4));
        assert!(results[4..].iter().all(|r| r.is_none()));
    }

    #[test]
    fn parallel_map_preserves_order() {
        let abort_flag = AtomicBool::new(false);
        let items: Vec<u64> = (0..256).collect();
        let results = par_map_cancellable(&items, &abort_flag, |i, v| (i as u64) * 1000 + v);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(*r, Some(i as u64 * 1001));
        }
    }
}
