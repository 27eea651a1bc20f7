/// Thread pool for parallel trace expansion.
/// By default half of the cores are used so an editor or language server
/// running next to the tracer stays responsive.

use anyhow::{Context, Result};
use log::info;

/// Worker count used when none is configured: half the cores, minimum 1.
pub fn default_workers() -> usize {
    std::cmp::max(1, num_cpus::get() / 2)
}

/// Build a dedicated rayon pool. Traces run inside it with `ThreadPool::install`,
/// which leaves the global pool untouched.
pub fn trace_pool(threads: Option<usize>) -> Result<rayon::ThreadPool> {
    let workers = threads.filter(|n| *n > 0).unwrap_or_else(default_workers);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("calltrace-{}", i))
        .build()
        .context("Failed to build trace thread pool")?;

    info!(
        "initialized trace pool: {} workers (system has {} cores)",
        workers,
        num_cpus::get()
    );
    Ok(pool)
}
