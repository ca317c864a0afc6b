use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Batch-wide cancellation flag.
///
/// Cancelling stops the dispatch of tasks that have not started yet; a task
/// already inside a matrix exponential runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Run independent tasks, in parallel when the `parallel` feature is on.
///
/// Output order matches input order. `max_threads` caps the pool size;
/// `None` uses rayon's global pool.
#[cfg(feature = "parallel")]
pub fn map_tasks<T, R, F>(items: Vec<T>, max_threads: Option<usize>, f: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync + Send,
{
    if items.len() <= 1 || max_threads == Some(1) {
        return items.into_iter().map(f).collect();
    }
    match max_threads {
        Some(threads) => match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(|| items.into_par_iter().map(&f).collect()),
            Err(e) => {
                tracing::warn!("worker pool unavailable ({e}); using the global pool");
                items.into_par_iter().map(&f).collect()
            }
        },
        None => items.into_par_iter().map(&f).collect(),
    }
}

#[cfg(not(feature = "parallel"))]
pub fn map_tasks<T, R, F>(items: Vec<T>, _max_threads: Option<usize>, f: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync + Send,
{
    items.into_iter().map(f).collect()
}
