use crate::foundation::error::{SplashError, SplashResult};

/// Dedicated pool for one batch run. `None` uses rayon's default thread count.
pub(crate) fn build_thread_pool(threads: Option<usize>) -> SplashResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(SplashError::validation("'threads' must be >= 1 when set"));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| SplashError::validation(format!("failed to build rayon thread pool: {e}")))
}
