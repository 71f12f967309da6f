//! Process-wide tokio runtime.
//!
//! The query path is synchronous (one OS thread per host request), while the
//! connection layer is async. Every client call crosses over through
//! [`block_on`]; background work (keep-alive pings, cluster slot refresh)
//! runs on the same worker pool via [`spawn`].

use std::sync::OnceLock;
use tokio::runtime::Runtime;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Get (or initialize) the shared runtime.
///
/// Worker count defaults to the number of cores; override it with
/// `REDIS_DATASOURCE_RUNTIME_THREADS`.
pub fn get_runtime() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all();

        if let Some(n) = std::env::var("REDIS_DATASOURCE_RUNTIME_THREADS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
        {
            builder.worker_threads(n);
        }

        match builder.thread_name("redis-ds-rt").build() {
            Ok(rt) => rt,
            // Nothing can run without the runtime (e.g. thread ulimit hit)
            Err(e) => panic!("failed to create tokio runtime: {e}"),
        }
    })
}

/// Block the calling thread on a future.
///
/// Must not be called from inside an async context.
pub fn block_on<F: std::future::Future>(future: F) -> F::Output {
    get_runtime().block_on(future)
}

/// Spawn a future on the shared runtime.
pub fn spawn<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    get_runtime().spawn(future)
}

// ── Tests ──────────────────────────────────────────────────────────
