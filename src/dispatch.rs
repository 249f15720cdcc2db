//! # Parallel Dispatcher
//!
//! Fan-out/fan-in primitive shared by the refinement driver and the
//! prefix compactor's file scans. Runs a worker function over N items with
//! a bounded degree of parallelism, draining every task before re-raising
//! the first failure.
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use log::info;
use rayon::prelude::*;

/// Runs `worker` over every item in `items`, using up to `cpu_count`
/// threads (rayon's default, usually the number of logical CPUs, when
/// unset). All items are processed regardless of individual failures; the
/// first error encountered (in item order) is returned after every task has
/// finished.
pub fn dispatch<T, R, F>(items: &[T], cpu_count: Option<usize>, worker: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R> + Sync,
{
    let pool = match cpu_count {
        Some(n) => rayon::ThreadPoolBuilder::new().num_threads(n).build()?,
        None => rayon::ThreadPoolBuilder::new().build()?,
    };

    let total = items.len();
    let completed = AtomicUsize::new(0);

    let results: Vec<Result<R>> = pool.install(|| {
        items
            .par_iter()
            .map(|item| {
                let result = worker(item);
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                info!("completed {done}/{total} dispatched jobs");
                result
            })
            .collect()
    });

    let mut first_error = None;
    let mut outputs = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(value) => outputs.push(value),
            Err(err) if first_error.is_none() => first_error = Some(err),
            Err(_) => {}
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(outputs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn runs_every_item_and_collects_results() {
        let items = vec![1, 2, 3, 4, 5];
        let results = dispatch(&items, Some(2), |i| Ok::<_, anyhow::Error>(i * 2)).unwrap();
        let mut sorted = results;
        sorted.sort();
        assert_eq!(sorted, vec![2, 4, 6, 8, 10]);
    }

    #[test]
    fn surfaces_first_failure_after_draining() {
        let items = vec![1, 2, 3];
        let err = dispatch(&items, Some(2), |i| {
            if *i == 2 {
                Err(anyhow!("boom on {i}"))
            } else {
                Ok(*i)
            }
        })
        .unwrap_err();
        assert!(err.to_string().contains("boom on 2"));
    }
}
